//! Sender and SMTP settings.
//!
//! Both are built once and shared read-only by every send. Empty or zero
//! fields are replaced with the documented defaults by `with_defaults`.

use crate::error::BoxError;
use crate::templates::{DEFAULT_REPLY_TEMPLATE_PATH, DEFAULT_VERIFICATION_TEMPLATE_PATH};
use core_config::{env_flag, env_or_default, env_parse, env_required, ConfigError, FromEnv};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_VERIFICATION_SUBJECT: &str = "Email verification";
pub const DEFAULT_EMAIL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SMTP_HOST: &str = "localhost";
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Unsubscribe token generator: `(user_id, email, site_id) -> token`.
pub type TokenGenFn = Arc<dyn Fn(&str, &str, &str) -> Result<String, BoxError> + Send + Sync>;

/// Settings for building messages
#[derive(Clone, Default)]
pub struct EmailParams {
    /// From address
    pub from: String,
    /// Subject of verification messages
    pub verification_subject: String,
    /// Template path of verification messages
    pub verification_template_path: String,
    /// Template path of reply messages
    pub reply_template_path: String,
    /// Full subscribe handler URL, the token is appended by the template
    pub subscribe_url: String,
    /// Full unsubscribe handler URL
    pub unsubscribe_url: String,
    /// Unsubscribe token generator, required for reply messages
    pub token_gen: Option<TokenGenFn>,
}

impl EmailParams {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            ..Default::default()
        }
    }

    pub fn with_token_gen<F>(mut self, token_gen: F) -> Self
    where
        F: Fn(&str, &str, &str) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.token_gen = Some(Arc::new(token_gen));
        self
    }

    pub fn with_verification_subject(mut self, subject: impl Into<String>) -> Self {
        self.verification_subject = subject.into();
        self
    }

    pub fn with_subscribe_url(mut self, url: impl Into<String>) -> Self {
        self.subscribe_url = url.into();
        self
    }

    pub fn with_unsubscribe_url(mut self, url: impl Into<String>) -> Self {
        self.unsubscribe_url = url.into();
        self
    }

    pub fn with_template_paths(
        mut self,
        reply: impl Into<String>,
        verification: impl Into<String>,
    ) -> Self {
        self.reply_template_path = reply.into();
        self.verification_template_path = verification.into();
        self
    }

    /// Fill empty subject and template paths with defaults.
    pub fn with_defaults(mut self) -> Self {
        if self.verification_subject.is_empty() {
            self.verification_subject = DEFAULT_VERIFICATION_SUBJECT.to_string();
        }
        if self.reply_template_path.is_empty() {
            self.reply_template_path = DEFAULT_REPLY_TEMPLATE_PATH.to_string();
        }
        if self.verification_template_path.is_empty() {
            self.verification_template_path = DEFAULT_VERIFICATION_TEMPLATE_PATH.to_string();
        }
        self
    }
}

impl fmt::Debug for EmailParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailParams")
            .field("from", &self.from)
            .field("verification_subject", &self.verification_subject)
            .field("verification_template_path", &self.verification_template_path)
            .field("reply_template_path", &self.reply_template_path)
            .field("subscribe_url", &self.subscribe_url)
            .field("unsubscribe_url", &self.unsubscribe_url)
            .field("token_gen", &self.token_gen.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl FromEnv for EmailParams {
    /// Reads `NOTIFY_EMAIL_*` and `NOTIFY_*_URL` variables; `NOTIFY_EMAIL_FROM`
    /// is required. The token generator can't come from the environment and
    /// is left unset.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            from: env_required("NOTIFY_EMAIL_FROM")?,
            verification_subject: env_or_default(
                "NOTIFY_EMAIL_VERIFICATION_SUBJ",
                DEFAULT_VERIFICATION_SUBJECT,
            ),
            verification_template_path: env_or_default(
                "NOTIFY_EMAIL_VERIFICATION_TEMPLATE",
                DEFAULT_VERIFICATION_TEMPLATE_PATH,
            ),
            reply_template_path: env_or_default(
                "NOTIFY_EMAIL_REPLY_TEMPLATE",
                DEFAULT_REPLY_TEMPLATE_PATH,
            ),
            subscribe_url: env_or_default("NOTIFY_SUBSCRIBE_URL", ""),
            unsubscribe_url: env_or_default("NOTIFY_UNSUBSCRIBE_URL", ""),
            token_gen: None,
        })
    }
}

/// SMTP server connection settings
#[derive(Clone)]
pub struct SmtpParams {
    pub host: String,
    pub port: u16,
    /// Implicit TLS (SMTPS); STARTTLS isn't used
    pub tls: bool,
    pub username: String,
    pub password: String,
    /// TCP connection timeout
    pub timeout: Duration,
}

impl SmtpParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace a zero timeout with the default one.
    pub fn with_defaults(mut self) -> Self {
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_EMAIL_TIMEOUT;
        }
        self
    }

    /// Whether PLAIN auth should be performed; needs both username and password.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for SmtpParams {
    fn default() -> Self {
        Self {
            host: DEFAULT_SMTP_HOST.to_string(),
            port: DEFAULT_SMTP_PORT,
            tls: false,
            username: String::new(),
            password: String::new(),
            timeout: DEFAULT_EMAIL_TIMEOUT,
        }
    }
}

impl fmt::Debug for SmtpParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl FromEnv for SmtpParams {
    /// Reads `SMTP_HOST`, `SMTP_PORT`, `SMTP_TLS`, `SMTP_USERNAME`,
    /// `SMTP_PASSWORD` and `SMTP_TIMEOUT_SECS`.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env_or_default("SMTP_HOST", DEFAULT_SMTP_HOST),
            port: env_parse("SMTP_PORT", DEFAULT_SMTP_PORT)?,
            tls: env_flag("SMTP_TLS", false)?,
            username: env_or_default("SMTP_USERNAME", ""),
            password: env_or_default("SMTP_PASSWORD", ""),
            timeout: Duration::from_secs(env_parse(
                "SMTP_TIMEOUT_SECS",
                DEFAULT_EMAIL_TIMEOUT.as_secs(),
            )?),
        }
        .with_defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_params_defaults() {
        let params = EmailParams::new("noreply@example.com").with_defaults();
        assert_eq!(params.verification_subject, "Email verification");
        assert_eq!(params.reply_template_path, DEFAULT_REPLY_TEMPLATE_PATH);
        assert_eq!(
            params.verification_template_path,
            DEFAULT_VERIFICATION_TEMPLATE_PATH
        );
        assert!(params.token_gen.is_none());
    }

    #[test]
    fn test_email_params_keeps_explicit_values() {
        let params = EmailParams::new("noreply@example.com")
            .with_verification_subject("Confirm your email")
            .with_template_paths("reply.tmpl", "verify.tmpl")
            .with_defaults();
        assert_eq!(params.verification_subject, "Confirm your email");
        assert_eq!(params.reply_template_path, "reply.tmpl");
        assert_eq!(params.verification_template_path, "verify.tmpl");
    }

    #[test]
    fn test_smtp_params_zero_timeout_defaults() {
        let params = SmtpParams::new("mail.example.com", 465)
            .with_timeout(Duration::ZERO)
            .with_defaults();
        assert_eq!(params.timeout, Duration::from_secs(10));
        assert_eq!(params.address(), "mail.example.com:465");
    }

    #[test]
    fn test_smtp_params_credentials_need_both_parts() {
        assert!(!SmtpParams::default().has_credentials());
        assert!(!SmtpParams::default().with_credentials("user", "").has_credentials());
        assert!(SmtpParams::default().with_credentials("user", "secret").has_credentials());
    }

    #[test]
    fn test_smtp_params_debug_hides_password() {
        let params = SmtpParams::default().with_credentials("user", "secret");
        let debug = format!("{:?}", params);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_smtp_params_from_env() {
        temp_env::with_vars(
            [
                ("SMTP_HOST", Some("smtp.example.com")),
                ("SMTP_PORT", Some("465")),
                ("SMTP_TLS", Some("true")),
                ("SMTP_USERNAME", Some("user")),
                ("SMTP_PASSWORD", Some("secret")),
                ("SMTP_TIMEOUT_SECS", Some("0")),
            ],
            || {
                let params = SmtpParams::from_env().unwrap();
                assert_eq!(params.host, "smtp.example.com");
                assert_eq!(params.port, 465);
                assert!(params.tls);
                assert!(params.has_credentials());
                assert_eq!(params.timeout, DEFAULT_EMAIL_TIMEOUT);
            },
        );
    }

    #[test]
    fn test_smtp_params_from_env_bad_port() {
        temp_env::with_var("SMTP_PORT", Some("smtp"), || {
            let err = SmtpParams::from_env().unwrap_err();
            assert!(err.to_string().contains("SMTP_PORT"));
        });
    }

    #[test]
    fn test_email_params_from_env_defaults() {
        temp_env::with_vars(
            [
                ("NOTIFY_EMAIL_FROM", Some("noreply@example.com")),
                ("NOTIFY_EMAIL_VERIFICATION_SUBJ", None),
                ("NOTIFY_EMAIL_REPLY_TEMPLATE", None),
                ("NOTIFY_EMAIL_VERIFICATION_TEMPLATE", None),
            ],
            || {
                let params = EmailParams::from_env().unwrap();
                assert_eq!(params.from, "noreply@example.com");
                assert_eq!(params.verification_subject, DEFAULT_VERIFICATION_SUBJECT);
                assert_eq!(params.reply_template_path, DEFAULT_REPLY_TEMPLATE_PATH);
            },
        );
    }

    #[test]
    fn test_email_params_from_env_requires_from() {
        temp_env::with_var_unset("NOTIFY_EMAIL_FROM", || {
            let err = EmailParams::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "NOTIFY_EMAIL_FROM"));
        });
    }
}
