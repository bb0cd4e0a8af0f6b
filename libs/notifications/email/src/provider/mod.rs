//! SMTP session abstraction
//!
//! A delivery attempt needs only a handful of SMTP verbs. They are modelled as
//! traits so tests can swap the network client for a recording double:
//!
//! ```text
//! SessionFactory::create ─> SmtpSession ─ mail ─ rcpt ─ data ─> BodyWriter ─ write ─ close
//!                                       └─ quit (falls back to close)
//! ```

pub mod mock;
pub mod smtp;

pub use mock::{FailOn, MockSmtp, SmtpCall};
pub use smtp::SmtpClientFactory;

use crate::config::SmtpParams;
use crate::error::TransportError;
use async_trait::async_trait;

/// Opens SMTP sessions
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Connect, greet and authenticate when credentials are present.
    async fn create(&self, params: &SmtpParams) -> Result<Box<dyn SmtpSession>, TransportError>;

    /// Get factory name
    fn name(&self) -> &'static str;
}

/// One connected SMTP session
#[async_trait]
pub trait SmtpSession: Send {
    /// MAIL FROM
    async fn mail(&mut self, from: &str) -> Result<(), TransportError>;

    /// RCPT TO
    async fn rcpt(&mut self, to: &str) -> Result<(), TransportError>;

    /// DATA; the returned writer must be closed to flush the message.
    async fn data<'a>(&'a mut self) -> Result<Box<dyn BodyWriter + 'a>, TransportError>;

    /// QUIT
    async fn quit(&mut self) -> Result<(), TransportError>;

    /// Drop the connection without a polite goodbye.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Message body sink opened by DATA
#[async_trait]
pub trait BodyWriter: Send {
    async fn write(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    /// Finish the body and wait for the server to accept it.
    async fn close(&mut self) -> Result<(), TransportError>;
}
