//! CLI usage errors

use thiserror::Error;

/// Problems with the command line itself. Everything past parsing is
/// reported through `anyhow`.
#[derive(Error, Debug, PartialEq)]
pub enum UsageError {
    #[error("no command given")]
    MissingCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("missing value for {0}")]
    MissingValue(&'static str),

    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("request body is not valid JSON: {0}")]
    InvalidBody(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

pub const USAGE: &str = "usage: school-admin [--config PATH] <login | logout | status | request METHOD PATH [JSON]>";
