//! Line rendering for the JSON and text formats.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use super::attr::{Attr, AttrMap, AttrValue};

/// Hook applied to every leaf attribute before it is rendered.
///
/// Receives the enclosing group path and the attribute; returning `None`
/// drops the attribute from the record.
pub type ReplaceAttr = Arc<dyn Fn(&[&str], Attr) -> Option<Attr> + Send + Sync>;

/// Output format of a [`Logger`](super::Logger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// One JSON object per line.
    Json,
    /// `key=value` pairs, one record per line.
    #[default]
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("log format must be 'json' or 'text', got '{0}'")]
pub struct ParseFormatError(String);

impl FromStr for Format {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "text" => Ok(Format::Text),
            _ => Err(ParseFormatError(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Json => "json",
            Format::Text => "text",
        })
    }
}

/// Runs the replace hook over `attrs` and drops groups left empty.
pub(crate) fn prepare(attrs: Vec<Attr>, replace: Option<&ReplaceAttr>) -> Vec<Attr> {
    let mut groups = Vec::new();
    prepare_in(attrs, replace, &mut groups)
}

fn prepare_in(
    attrs: Vec<Attr>,
    replace: Option<&ReplaceAttr>,
    groups: &mut Vec<String>,
) -> Vec<Attr> {
    let mut out = Vec::with_capacity(attrs.len());
    for attr in attrs {
        match attr.value {
            AttrValue::Group(children) => {
                groups.push(attr.key.clone());
                let children = prepare_in(children, replace, groups);
                groups.pop();
                if !children.is_empty() {
                    out.push(Attr::group(attr.key, children));
                }
            }
            value => {
                let attr = Attr { key: attr.key, value };
                let attr = match replace {
                    Some(replace) => {
                        let path: Vec<&str> = groups.iter().map(String::as_str).collect();
                        replace(&path, attr)
                    }
                    None => Some(attr),
                };
                out.extend(attr.filter(|a| !a.value.is_empty_group()));
            }
        }
    }
    out
}

/// Renders prepared attributes as a single newline-terminated line.
///
/// # Errors
///
/// Returns the JSON encoder's error; text rendering cannot fail.
pub(crate) fn render(format: Format, attrs: &[Attr]) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    match format {
        Format::Json => serde_json::to_writer(&mut out, &AttrMap(attrs))?,
        Format::Text => {
            let mut line = String::with_capacity(128);
            write_text_attrs(&mut line, "", attrs);
            out.extend_from_slice(line.as_bytes());
        }
    }
    out.push(b'\n');
    Ok(out)
}

fn write_text_attrs(out: &mut String, prefix: &str, attrs: &[Attr]) {
    for attr in attrs {
        if let AttrValue::Group(children) = &attr.value {
            write_text_attrs(out, &format!("{prefix}{}.", attr.key), children);
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        write_text_token(out, &format!("{prefix}{}", attr.key));
        out.push('=');
        write_text_token(out, &attr.value.to_string());
    }
}

fn write_text_token(out: &mut String, s: &str) {
    if needs_quoting(s) {
        out.push_str(&format!("{s:?}"));
    } else {
        out.push_str(s);
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '"' || c == '=')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn line(format: Format, attrs: &[Attr]) -> String {
        String::from_utf8(render(format, attrs).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("json".parse::<Format>(), Ok(Format::Json));
        assert_eq!("TEXT".parse::<Format>(), Ok(Format::Text));
        assert!("yaml".parse::<Format>().is_err());
    }

    #[test]
    fn test_json_nested_groups() {
        let attrs = vec![
            Attr::string("msg", "hi"),
            Attr::group(
                "error",
                vec![
                    Attr::string("code", "internal"),
                    Attr::group("attrs", vec![Attr::int("n", 3)]),
                ],
            ),
        ];

        assert_eq!(
            line(Format::Json, &prepare(attrs, None)),
            "{\"msg\":\"hi\",\"error\":{\"code\":\"internal\",\"attrs\":{\"n\":3}}}\n"
        );
    }

    #[test]
    fn test_json_scalar_values() {
        let attrs = vec![
            Attr::uint("u", 7),
            Attr::float("f", 1.5),
            Attr::float("nan", f64::NAN),
            Attr::bool("b", false),
            Attr::duration("d", Duration::from_millis(2)),
            Attr::string("quote", "say \"hi\""),
        ];

        assert_eq!(
            line(Format::Json, &attrs),
            "{\"u\":7,\"f\":1.5,\"nan\":\"NaN\",\"b\":false,\"d\":2000000,\"quote\":\"say \\\"hi\\\"\"}\n"
        );
    }

    #[test]
    fn test_json_keeps_duplicate_keys_in_order() {
        let attrs = vec![Attr::string("layer", "a"), Attr::string("layer", "b")];
        assert_eq!(
            line(Format::Json, &attrs),
            "{\"layer\":\"a\",\"layer\":\"b\"}\n"
        );
    }

    #[test]
    fn test_json_escapes_keys_and_control_characters() {
        let attrs = vec![
            Attr::string("a\"b", "line\nbreak\ttab"),
            Attr::group("g", vec![Attr::float("inf", f64::INFINITY)]),
        ];

        let rendered = line(Format::Json, &attrs);
        assert_eq!(
            rendered,
            "{\"a\\\"b\":\"line\\nbreak\\ttab\",\"g\":{\"inf\":\"inf\"}}\n"
        );
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["a\"b"], "line\nbreak\ttab");
    }

    #[test]
    fn test_text_flattens_groups_and_quotes() {
        let attrs = vec![
            Attr::string("level", "INFO"),
            Attr::string("msg", "hello world"),
            Attr::group("error", vec![Attr::string("code", "internal")]),
            Attr::string("empty", ""),
            Attr::int("n", 5),
        ];

        assert_eq!(
            line(Format::Text, &attrs),
            "level=INFO msg=\"hello world\" error.code=internal empty=\"\" n=5\n"
        );
    }

    #[test]
    fn test_prepare_drops_empty_groups() {
        let attrs = vec![
            Attr::group("outer", vec![Attr::group("inner", Vec::new())]),
            Attr::bool("kept", true),
        ];

        assert_eq!(prepare(attrs, None), vec![Attr::bool("kept", true)]);
    }

    #[test]
    fn test_prepare_passes_group_path_to_hook() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);
        let hook: ReplaceAttr = Arc::new(move |groups, attr| {
            recorded
                .lock()
                .unwrap()
                .push(format!("{}:{}", groups.join("."), attr.key));
            (attr.key != "secret").then_some(attr)
        });

        let attrs = vec![
            Attr::string("top", "1"),
            Attr::group(
                "req",
                vec![Attr::string("secret", "x"), Attr::string("id", "7")],
            ),
        ];
        let prepared = prepare(attrs, Some(&hook));

        assert_eq!(
            prepared,
            vec![
                Attr::string("top", "1"),
                Attr::group("req", vec![Attr::string("id", "7")]),
            ]
        );
        assert_eq!(*seen.lock().unwrap(), [":top", "req:secret", "req:id"]);
    }
}
