//! Comment notification emails over SMTP
//!
//! This library renders reply and verification notifications from Handlebars
//! templates and delivers them to an SMTP server with a bounded number of
//! retries that can be cancelled.
//!
//! ## Components
//!
//! - **Models**: `Request`, `Comment`, `User`, `Locator`, `VerificationMetadata`
//! - **Messages**: `MessageBuilder` renders complete quoted-printable messages
//! - **Templates**: `TemplateEngine` with `BuiltinTemplates` or `FsTemplates`
//! - **Providers**: `SessionFactory`/`SmtpSession`/`BodyWriter` traits, a lettre
//!   backed `SmtpClientFactory` and a recording `MockSmtp`
//! - **Retry**: `Repeater`, fixed delay and a `watch` cancellation signal
//! - **Notifier**: `EmailNotifier`, also usable as a `Destination`
//!
//! ## Usage
//!
//! ```ignore
//! use notify_email::{EmailNotifier, EmailParams, Request, SmtpParams};
//! use tokio::sync::watch;
//!
//! let params = EmailParams::new("noreply@example.com")
//!     .with_unsubscribe_url("https://example.com/email/unsubscribe")
//!     .with_token_gen(|user, email, site| Ok(make_token(user, email, site)?));
//! let notifier = EmailNotifier::new(params, SmtpParams::new("smtp.example.com", 465).with_tls(true))?;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! notifier.send(&shutdown_rx, &Request::reply(email, comment, parent)).await?;
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod models;
pub mod notifier;
pub mod provider;
pub mod retry;
pub mod templates;

pub use config::{EmailParams, SmtpParams, TokenGenFn};
pub use error::{BoxError, NotificationError, NotificationResult, TransportError};
pub use message::{MessageBuilder, RenderedMessage};
pub use models::{Comment, Locator, Request, User, VerificationMetadata};
pub use notifier::{Destination, EmailNotifier};
pub use provider::{
    BodyWriter, FailOn, MockSmtp, SessionFactory, SmtpCall, SmtpClientFactory, SmtpSession,
};
pub use retry::{Repeater, RetryError};
pub use templates::{BuiltinTemplates, FsTemplates, TemplateEngine, TemplateSource};
