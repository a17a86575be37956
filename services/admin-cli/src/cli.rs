//! Command-line parsing
//!
//! ```text
//! school-admin [--config PATH] login
//! school-admin [--config PATH] logout
//! school-admin [--config PATH] status
//! school-admin [--config PATH] request METHOD PATH [JSON]
//! ```

use reqwest::Method;
use serde_json::Value;

use crate::error::UsageError;

#[derive(Debug, PartialEq)]
pub struct Cli {
    pub config: Option<String>,
    pub command: Command,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Login,
    Logout,
    Status,
    Request {
        method: Method,
        path: String,
        body: Option<Value>,
    },
}

impl Cli {
    /// Parse arguments, program name excluded.
    pub fn parse<I>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = None;
        let mut rest = Vec::new();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "--config" {
                config = Some(args.next().ok_or(UsageError::MissingValue("--config"))?);
            } else {
                rest.push(arg);
            }
        }

        let mut rest = rest.into_iter();
        let command = match rest.next().as_deref() {
            Some("login") => Command::Login,
            Some("logout") => Command::Logout,
            Some("status") => Command::Status,
            Some("request") => {
                let method = rest.next().ok_or(UsageError::MissingValue("METHOD"))?;
                let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| UsageError::InvalidMethod(method))?;
                let path = rest.next().ok_or(UsageError::MissingValue("PATH"))?;
                let body = rest
                    .next()
                    .map(|raw| serde_json::from_str(&raw))
                    .transpose()
                    .map_err(|e| UsageError::InvalidBody(e.to_string()))?;
                Command::Request { method, path, body }
            }
            Some(other) => return Err(UsageError::UnknownCommand(other.to_string())),
            None => return Err(UsageError::MissingCommand),
        };

        if let Some(extra) = rest.next() {
            return Err(UsageError::UnexpectedArgument(extra));
        }

        Ok(Self { config, command })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(args: &[&str]) -> Result<Cli, UsageError> {
        Cli::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse(&["login"]).unwrap().command, Command::Login);
        assert_eq!(parse(&["logout"]).unwrap().command, Command::Logout);
        assert_eq!(parse(&["status"]).unwrap().command, Command::Status);
    }

    #[test]
    fn config_flag_anywhere() {
        let cli = parse(&["--config", "/etc/school-admin.toml", "status"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/etc/school-admin.toml"));

        let cli = parse(&["status", "--config", "local.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("local.toml"));
        assert_eq!(cli.command, Command::Status);
    }

    #[test]
    fn request_with_body() {
        let cli = parse(&["request", "post", "/classes", r#"{"name":"7B"}"#]).unwrap();
        assert_eq!(
            cli.command,
            Command::Request {
                method: Method::POST,
                path: "/classes".into(),
                body: Some(json!({ "name": "7B" })),
            }
        );
    }

    #[test]
    fn request_without_body() {
        let cli = parse(&["request", "GET", "/students"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Request {
                method: Method::GET,
                path: "/students".into(),
                body: None,
            }
        );
    }

    #[test]
    fn usage_errors() {
        assert_eq!(parse(&[]).unwrap_err(), UsageError::MissingCommand);
        assert_eq!(
            parse(&["enrol"]).unwrap_err(),
            UsageError::UnknownCommand("enrol".into())
        );
        assert_eq!(
            parse(&["status", "--config"]).unwrap_err(),
            UsageError::MissingValue("--config")
        );
        assert_eq!(
            parse(&["request", "GET"]).unwrap_err(),
            UsageError::MissingValue("PATH")
        );
        assert_eq!(
            parse(&["status", "now"]).unwrap_err(),
            UsageError::UnexpectedArgument("now".into())
        );
        assert!(matches!(
            parse(&["request", "POST", "/classes", "{oops"]).unwrap_err(),
            UsageError::InvalidBody(_)
        ));
        assert!(matches!(
            parse(&["request", "GE T", "/classes"]).unwrap_err(),
            UsageError::InvalidMethod(_)
        ));
    }
}
