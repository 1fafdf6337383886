//! Errors for transit recorder
//!
//! Variants that wrap another error leave its text out of their own message.
//! Use [`error_chain`] to log an error together with every cause.
use std::error::Error as StdError;

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Feed request failed")]
    Transport(#[source] reqwest::Error),

    #[error("Feed returned HTTP {status} for {url}")]
    Http { url: String, status: StatusCode },

    #[error("Feed decode error")]
    Decode(#[from] DecodeError),

    #[error("Configuration error")]
    Config(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Unsupported database URL: {0}")]
    UnsupportedDatabaseUrl(String),

    #[error("Database connection error")]
    DatabaseConnection(#[source] sqlx::Error),

    #[error("Schema initialization failed for {object}")]
    Schema {
        object: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Transaction error")]
    Transaction(#[from] sqlx::Error),
}

/// Failure to turn a feed payload into vehicle positions
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON payload")]
    Json(#[from] serde_json::Error),

    #[error("all-routes payload contained no route map")]
    EmptyRoutes,
}

/// Error message followed by each `source()` cause, separated by `: `.
///
/// A cause whose text already ends the message is skipped, since some
/// library errors print their source themselves.
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn chain_includes_root_cause() {
        let error = RecorderError::Schema {
            object: "vehicles".to_string(),
            source: sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )),
        };

        let message = error_chain(&error);
        assert!(message.starts_with("Schema initialization failed for vehicles: "));
        assert!(message.ends_with("connection refused"), "{}", message);
        assert_eq!(message.matches("connection refused").count(), 1, "{}", message);
    }

    #[test]
    fn chain_does_not_repeat_causes() {
        let json = serde_json::from_str::<u32>("nope").unwrap_err();
        let json_message = json.to_string();
        let error = RecorderError::from(DecodeError::from(json));

        let message = error_chain(&error);
        assert_eq!(
            message,
            format!("Feed decode error: invalid JSON payload: {}", json_message)
        );
    }

    #[test]
    fn chain_without_source() {
        let error = RecorderError::UnsupportedDatabaseUrl("mysql".to_string());
        assert_eq!(error_chain(&error), "Unsupported database URL: mysql");
    }
}
