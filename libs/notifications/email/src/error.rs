//! Error types for the notification pipeline.
//!
//! [`NotificationError`] is what callers of the notifier see. [`TransportError`]
//! covers a single SMTP attempt and is what the retry loop inspects.

use thiserror::Error;

/// Boxed error used at collaborator boundaries (token generator, transports).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur while building or delivering a notification.
#[derive(Error, Debug)]
pub enum NotificationError {
    /// Template resource couldn't be read at construction
    #[error("can't read {kind} template {path:?}: {source}")]
    TemplateRead {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Template resource couldn't be parsed at construction
    #[error("can't parse {kind} template: {source}")]
    TemplateParse {
        kind: &'static str,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    /// Template execution failed, nothing was sent
    #[error("error executing template to build {kind} message: {source}")]
    Render {
        kind: &'static str,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    /// Unsubscribe token generation failed, nothing was sent
    #[error("error creating token for unsubscribe link: {source}")]
    Token {
        #[source]
        source: BoxError,
    },

    /// Cancellation was signalled before or between delivery attempts
    #[error("sending message to {to:?} aborted due to canceled context")]
    Cancelled { to: String },

    /// Every delivery attempt failed; carries the last attempt's error
    #[error("failed to send message to {to:?}: {source}")]
    Delivery {
        to: String,
        #[source]
        source: TransportError,
    },
}

impl NotificationError {
    /// Whether the error is the result of a cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Errors raised by a single SMTP session. All of them are retryable.
#[derive(Error, Debug)]
pub enum TransportError {
    /// TCP dial, TLS handshake or greeting failed
    #[error("failed to connect to smtp server {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: BoxError,
    },

    /// PLAIN authentication was rejected
    #[error("failed to auth to smtp {addr}: {source}")]
    Auth {
        addr: String,
        #[source]
        source: BoxError,
    },

    /// MAIL FROM was rejected or the address is malformed
    #[error("bad from address {address:?}: {source}")]
    BadFrom {
        address: String,
        #[source]
        source: BoxError,
    },

    /// RCPT TO was rejected or the address is malformed
    #[error("bad to address {address:?}: {source}")]
    BadTo {
        address: String,
        #[source]
        source: BoxError,
    },

    /// DATA was rejected
    #[error("can't make email writer: {source}")]
    Data {
        #[source]
        source: BoxError,
    },

    /// Writing or flushing the message body failed
    #[error("failed to send email body to {to:?}: {source}")]
    Body {
        to: String,
        #[source]
        source: BoxError,
    },

    /// QUIT or forced close failed; only ever logged
    #[error("failed to terminate smtp session: {source}")]
    Terminate {
        #[source]
        source: BoxError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_message_names_recipient() {
        let err = NotificationError::Cancelled {
            to: "user@example.com".to_string(),
        };
        assert!(err.is_cancelled());
        assert_eq!(
            err.to_string(),
            r#"sending message to "user@example.com" aborted due to canceled context"#
        );
    }

    #[test]
    fn test_delivery_error_keeps_transport_context() {
        let err = NotificationError::Delivery {
            to: "user@example.com".to_string(),
            source: TransportError::BadTo {
                address: "user@example.com".to_string(),
                source: "550 no such user".into(),
            },
        };
        assert!(!err.is_cancelled());
        let message = err.to_string();
        assert!(message.contains("bad to address"));
        assert!(message.contains("550 no such user"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
