#![allow(dead_code)]

use rpc_scaffold::apperr::{ApplicationError, ResultExt};
use rpc_scaffold::codes::StatusCode;
use rpc_scaffold::interceptor::RpcRequest;
use rpc_scaffold::logging::{Attr, Format, Logger, MemoryWriter};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
pub const SPAN_ID: &str = "00f067aa0ba902b7";
pub const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

/// JSON logger without timestamps writing into the returned sink.
pub fn capture_logger(level: LevelFilter) -> (Logger, MemoryWriter) {
    let sink = MemoryWriter::new();
    let logger = Logger::builder()
        .level(level)
        .format(Format::Json)
        .writer(sink.clone())
        .without_time()
        .build();
    (logger, sink)
}

/// Records with the given `msg`.
pub fn records(sink: &MemoryWriter, msg: &str) -> Vec<serde_json::Value> {
    sink.json_lines()
        .unwrap()
        .into_iter()
        .filter(|line| line["msg"] == msg)
        .collect()
}

/// Driver error a storage layer would surface for an empty result.
#[derive(Debug, Error, PartialEq)]
#[error("sql: no rows in result set")]
pub struct NoRows;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUserRequest {
    pub id: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
}

fn select_user(id: u64) -> Result<User, NoRows> {
    match id {
        1 => Ok(User {
            id,
            email: "ada@example.com".to_string(),
        }),
        _ => Err(NoRows),
    }
}

/// Repository-level lookup: a missing row is `not_found`.
pub fn find_user(id: u64) -> Result<User, ApplicationError> {
    select_user(id).wrap_err(
        StatusCode::NotFound,
        "user not found",
        vec![Attr::uint("user_id", id)],
    )
}

pub async fn create_user(req: RpcRequest<CreateUserRequest>) -> Result<User, ApplicationError> {
    let email = &req.message().email;
    if !email.contains('@') {
        return Err(ApplicationError::new(
            StatusCode::InvalidArgument,
            "invalid email",
            vec![Attr::string("field", "email")],
        ));
    }

    Ok(User {
        id: 2,
        email: email.clone(),
    })
}

pub async fn get_user(req: RpcRequest<GetUserRequest>) -> Result<User, ApplicationError> {
    find_user(req.message().id)
}

/// Use-case level lookup: any failure to load the profile is internal.
pub async fn get_profile(req: RpcRequest<GetUserRequest>) -> Result<User, ApplicationError> {
    find_user(req.message().id).wrap_err(StatusCode::Internal, "failed to fetch", vec![])
}

pub async fn explode(_req: RpcRequest<Empty>) -> Result<User, ApplicationError> {
    panic!("postgres://admin:hunter2@db/users unreachable");
}
