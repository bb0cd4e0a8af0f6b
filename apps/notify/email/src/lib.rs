//! notify-email
//!
//! Sends a single verification or reply notification through the configured
//! SMTP server. Useful to check credentials and templates before wiring the
//! notifier into a service.
//!
//! ## Configuration
//!
//! Read from the environment:
//!
//! - `NOTIFY_EMAIL_FROM` (required), `NOTIFY_EMAIL_VERIFICATION_SUBJ`,
//!   `NOTIFY_EMAIL_REPLY_TEMPLATE`, `NOTIFY_EMAIL_VERIFICATION_TEMPLATE`,
//!   `NOTIFY_SUBSCRIBE_URL`, `NOTIFY_UNSUBSCRIBE_URL`
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_TLS`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
//!   `SMTP_TIMEOUT_SECS`
//! - `APP_ENV` and `RUST_LOG` for logging
//!
//! Ctrl+C (or SIGTERM) stops pending retries.

use chrono::Utc;
use clap::{Parser, Subcommand};
use core_config::tracing::init_tracing;
use core_config::{Environment, FromEnv};
use eyre::{Result, WrapErr};
use notify_email::{
    Comment, EmailNotifier, EmailParams, FsTemplates, Locator, Request, SmtpParams, User,
};
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "notify-email")]
#[command(about = "Send a test comment notification email over SMTP")]
pub struct Cli {
    /// Directory with custom templates. Built-in templates are used when omitted.
    #[arg(long)]
    pub template_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send an email verification message
    Verify {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// User name shown in the message
        #[arg(long)]
        user: String,

        /// Verification token
        #[arg(long)]
        token: String,

        #[arg(long, default_value = "remark")]
        site: String,
    },

    /// Send a notification about a reply to the recipient's comment
    Reply {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// Name of the reply author
        #[arg(long, default_value = "Test author")]
        author: String,

        /// Reply text (HTML)
        #[arg(long, default_value = "This is a test reply.")]
        text: String,

        /// Text of the comment being replied to
        #[arg(long, default_value = "This is the original comment.")]
        parent_text: String,

        #[arg(long, default_value = "")]
        post_title: String,

        /// Post page URL
        #[arg(long, default_value = "https://example.com/post")]
        url: String,

        #[arg(long, default_value = "remark")]
        site: String,

        /// Token placed into the unsubscribe link
        #[arg(long, default_value = "test")]
        unsubscribe_token: String,

        /// Send the administrator variant (no unsubscribe link)
        #[arg(long)]
        admin: bool,
    },
}

impl Command {
    /// Build the notification request for this command
    pub fn request(&self) -> Request {
        match self {
            Command::Verify {
                to,
                user,
                token,
                site,
            } => Request::verification(to.as_str(), user.as_str(), site.as_str(), token.as_str()),
            Command::Reply {
                to,
                author,
                text,
                parent_text,
                post_title,
                url,
                site,
                admin,
                ..
            } => {
                let locator = Locator {
                    site_id: site.clone(),
                    url: url.clone(),
                };
                let parent = Comment {
                    id: "parent".to_string(),
                    user: User {
                        id: "recipient".to_string(),
                        name: to.clone(),
                        picture: String::new(),
                    },
                    text: parent_text.clone(),
                    timestamp: Utc::now(),
                    post_title: post_title.clone(),
                    locator: locator.clone(),
                    ..Default::default()
                };
                let reply = Comment {
                    id: "reply".to_string(),
                    parent_id: parent.id.clone(),
                    user: User {
                        id: "author".to_string(),
                        name: author.clone(),
                        picture: String::new(),
                    },
                    text: text.clone(),
                    timestamp: Utc::now(),
                    post_title: post_title.clone(),
                    locator,
                };

                let req = Request::reply(to.as_str(), reply, parent);
                if *admin { req.for_admin() } else { req }
            }
        }
    }

    fn unsubscribe_token(&self) -> String {
        match self {
            Command::Reply {
                unsubscribe_token, ..
            } => unsubscribe_token.clone(),
            Command::Verify { .. } => String::new(),
        }
    }
}

/// Load configuration from the environment and build the notifier
pub fn build_notifier(cli: &Cli) -> Result<EmailNotifier> {
    let token = cli.command.unsubscribe_token();
    let params = EmailParams::from_env()
        .wrap_err("Failed to load email configuration")?
        .with_token_gen(move |_user, _email, _site| Ok(token.clone()));
    if params.from.is_empty() {
        eyre::bail!("NOTIFY_EMAIL_FROM is not set");
    }

    let smtp = SmtpParams::from_env().wrap_err("Failed to load SMTP configuration")?;

    let notifier = match &cli.template_dir {
        Some(dir) => EmailNotifier::with_templates(params, smtp, &FsTemplates::new(dir)),
        None => EmailNotifier::new(params, smtp),
    }
    .wrap_err("Failed to create email notifier")?;

    Ok(notifier)
}

/// Run the command
pub async fn run(cli: Cli) -> Result<()> {
    let environment = Environment::from_env();
    init_tracing(&environment);

    let notifier = build_notifier(&cli)?;
    info!(notifier = %notifier, "Starting notify-email");

    // Set up a shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
            return;
        }
        let _ = shutdown_tx.send(true);
    });

    let req = cli.command.request();
    notifier
        .send(&shutdown_rx, &req)
        .await
        .wrap_err_with(|| format!("Failed to notify {}", req.email))?;

    info!(to = %req.email, "Notification sent");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.wrap_err("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install signal handler")?
            .recv()
            .await;
        Ok::<(), eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, cancelling pending retries...");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM, cancelling pending retries...");
        },
    }

    Ok(())
}
