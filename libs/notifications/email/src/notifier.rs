//! Email notifier: builds a message for a request and delivers it over SMTP.
//!
//! Each delivery attempt opens its own session, runs MAIL/RCPT/DATA, writes the
//! whole message and ends with QUIT (or a plain close if QUIT fails). Attempts
//! are retried by a [`Repeater`] until one succeeds, attempts run out or the
//! cancellation signal fires.

use crate::config::{EmailParams, SmtpParams};
use crate::error::{NotificationError, NotificationResult, TransportError};
use crate::message::{MessageBuilder, RenderedMessage};
use crate::models::Request;
use crate::provider::{SessionFactory, SmtpClientFactory, SmtpSession};
use crate::retry::{Repeater, RetryError};
use crate::templates::{BuiltinTemplates, TemplateEngine, TemplateSource};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Something a notification request can be delivered to
#[async_trait]
pub trait Destination: Send + Sync + fmt::Display {
    /// Deliver `req`, giving up once `cancel` becomes `true`.
    async fn send(&self, cancel: &watch::Receiver<bool>, req: &Request) -> NotificationResult<()>;
}

/// Sends reply and verification notifications by email
pub struct EmailNotifier {
    from: String,
    smtp_params: SmtpParams,
    builder: MessageBuilder,
    smtp: Arc<dyn SessionFactory>,
    retry: Repeater,
}

impl EmailNotifier {
    /// Create a notifier using the built-in templates and a real SMTP client.
    pub fn new(params: EmailParams, smtp_params: SmtpParams) -> NotificationResult<Self> {
        Self::with_templates(params, smtp_params, &BuiltinTemplates::new())
    }

    /// Create a notifier reading its templates from `source`.
    ///
    /// Fails if either template can't be read or parsed.
    pub fn with_templates(
        params: EmailParams,
        smtp_params: SmtpParams,
        source: &dyn TemplateSource,
    ) -> NotificationResult<Self> {
        let params = params.with_defaults();
        let smtp_params = smtp_params.with_defaults();

        let templates = TemplateEngine::load(
            source,
            &params.reply_template_path,
            &params.verification_template_path,
        )?;

        let notifier = Self {
            from: params.from.clone(),
            builder: MessageBuilder::new(&params, templates),
            smtp_params,
            smtp: Arc::new(SmtpClientFactory::new()),
            retry: Repeater::default(),
        };
        debug!(notifier = %notifier, "Created email notifier");
        Ok(notifier)
    }

    /// Replace the session factory, e.g. with a mock.
    pub fn with_transport(mut self, smtp: Arc<dyn SessionFactory>) -> Self {
        self.smtp = smtp;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: Repeater) -> Self {
        self.retry = retry;
        self
    }

    /// Deliver `req` by email.
    ///
    /// A verification token takes precedence over a comment. Requests without
    /// a recipient, self-replies and requests carrying neither a verification
    /// token nor a comment are skipped with `Ok`.
    /// Rendering errors are returned without retrying.
    pub async fn send(&self, cancel: &watch::Receiver<bool>, req: &Request) -> NotificationResult<()> {
        if req.email.is_empty() {
            return Ok(());
        }

        if *cancel.borrow() {
            return Err(NotificationError::Cancelled {
                to: req.email.clone(),
            });
        }

        let message = if !req.verification.token.is_empty() {
            debug!(
                notifier = %self,
                user = %req.verification.user,
                "Sending verification"
            );
            self.builder.build_verification_message(
                &req.verification.user,
                &req.email,
                &req.verification.token,
                &req.verification.site_id,
            )?
        } else if !req.comment.id.is_empty() {
            if req.is_self_reply() && !req.for_admin {
                debug!(comment_id = %req.comment.id, "Skipping reply to own comment");
                return Ok(());
            }
            debug!(
                notifier = %self,
                comment_id = %req.comment.id,
                "Sending notification"
            );
            self.builder.build_reply_message(req, req.for_admin)?
        } else {
            debug!(to = %req.email, "Nothing to send");
            return Ok(());
        };

        self.deliver(cancel, &req.email, &message).await
    }

    async fn deliver(
        &self,
        cancel: &watch::Receiver<bool>,
        to: &str,
        message: &RenderedMessage,
    ) -> NotificationResult<()> {
        let result = self
            .retry
            .run(cancel, move |attempt| self.send_message(attempt, to, message))
            .await;

        match result {
            Ok(()) => {
                info!(to = %to, server = %self.smtp_params.address(), "Email sent");
                Ok(())
            }
            Err(RetryError::Cancelled) => Err(NotificationError::Cancelled { to: to.to_string() }),
            Err(RetryError::Failed(source)) => Err(NotificationError::Delivery {
                to: to.to_string(),
                source,
            }),
        }
    }

    /// One full connect, send, quit cycle.
    async fn send_message(
        &self,
        attempt: usize,
        to: &str,
        message: &RenderedMessage,
    ) -> Result<(), TransportError> {
        debug!(attempt, transport = self.smtp.name(), to = %to, "Sending email");

        let mut session = self.smtp.create(&self.smtp_params).await?;
        let result = self.write_message(session.as_mut(), to, message).await;
        self.terminate(session.as_mut()).await;
        result
    }

    async fn write_message(
        &self,
        session: &mut dyn SmtpSession,
        to: &str,
        message: &RenderedMessage,
    ) -> Result<(), TransportError> {
        session.mail(&self.from).await?;
        session.rcpt(to).await?;

        let mut writer = session.data().await?;
        let written = writer.write(message.as_bytes()).await;
        let closed = writer.close().await;

        match (written, closed) {
            (Err(e), Err(close_err)) => {
                warn!(error = %close_err, "Can't close smtp body writer");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), closed) => closed,
        }
    }

    async fn terminate(&self, session: &mut dyn SmtpSession) {
        if let Err(e) = session.quit().await {
            warn!(
                server = %self.smtp_params.address(),
                error = %e,
                "Failed to send quit command"
            );
            if let Err(e) = session.close().await {
                warn!(error = %e, "Can't close smtp connection");
            }
        }
    }
}

impl fmt::Display for EmailNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "email: from {:?} with username '{}' at server {}:{}",
            self.from, self.smtp_params.username, self.smtp_params.host, self.smtp_params.port
        )
    }
}

#[async_trait]
impl Destination for EmailNotifier {
    async fn send(&self, cancel: &watch::Receiver<bool>, req: &Request) -> NotificationResult<()> {
        EmailNotifier::send(self, cancel, req).await
    }
}
