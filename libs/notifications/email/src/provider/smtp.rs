//! SMTP sessions over lettre's low-level async connection

use super::{BodyWriter, SessionFactory, SmtpSession};
use crate::config::SmtpParams;
use crate::error::{BoxError, TransportError};
use async_trait::async_trait;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::commands::{Data, Mail, Rcpt};
use lettre::transport::smtp::extension::ClientId;
use lettre::address::AddressError;
use lettre::Address;
use tracing::debug;

/// Creates real network sessions, one fresh connection per call
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpClientFactory;

impl SmtpClientFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionFactory for SmtpClientFactory {
    async fn create(&self, params: &SmtpParams) -> Result<Box<dyn SmtpSession>, TransportError> {
        let addr = params.address();
        let connect_err = |e: lettre::transport::smtp::Error| TransportError::Connect {
            addr: addr.clone(),
            source: e.into(),
        };

        // implicit TLS with certificate and server name verification
        let tls = if params.tls {
            Some(TlsParameters::new(params.host.clone()).map_err(connect_err)?)
        } else {
            None
        };

        let mut conn = AsyncSmtpConnection::connect_tokio1(
            (params.host.as_str(), params.port),
            Some(params.timeout),
            &ClientId::default(),
            tls,
            None,
        )
        .await
        .map_err(connect_err)?;

        debug!(server = %addr, tls = params.tls, "Connected to smtp server");

        if params.has_credentials() {
            let credentials = Credentials::new(params.username.clone(), params.password.clone());
            if let Err(e) = conn.auth(&[Mechanism::Plain], &credentials).await {
                conn.abort().await;
                return Err(TransportError::Auth {
                    addr,
                    source: e.into(),
                });
            }
        }

        Ok(Box::new(LettreSession {
            conn,
            recipient: String::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

struct LettreSession {
    conn: AsyncSmtpConnection,
    recipient: String,
}

#[async_trait]
impl SmtpSession for LettreSession {
    async fn mail(&mut self, from: &str) -> Result<(), TransportError> {
        let bad_from = |source: BoxError| TransportError::BadFrom {
            address: from.to_string(),
            source,
        };
        let address: Address = from
            .parse()
            .map_err(|e: AddressError| bad_from(e.into()))?;
        self.conn
            .command(Mail::new(Some(address), vec![]))
            .await
            .map_err(|e| bad_from(e.into()))?;
        Ok(())
    }

    async fn rcpt(&mut self, to: &str) -> Result<(), TransportError> {
        let bad_to = |source: BoxError| TransportError::BadTo {
            address: to.to_string(),
            source,
        };
        let address: Address = to
            .parse()
            .map_err(|e: AddressError| bad_to(e.into()))?;
        self.conn
            .command(Rcpt::new(address, vec![]))
            .await
            .map_err(|e| bad_to(e.into()))?;
        self.recipient = to.to_string();
        Ok(())
    }

    async fn data<'a>(&'a mut self) -> Result<Box<dyn BodyWriter + 'a>, TransportError> {
        self.conn
            .command(Data)
            .await
            .map_err(|e| TransportError::Data { source: e.into() })?;
        Ok(Box::new(LettreBodyWriter {
            conn: &mut self.conn,
            to: &self.recipient,
            buf: Vec::new(),
            closed: false,
        }))
    }

    async fn quit(&mut self) -> Result<(), TransportError> {
        self.conn
            .quit()
            .await
            .map_err(|e| TransportError::Terminate { source: e.into() })?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.conn.abort().await;
        Ok(())
    }
}

/// Buffers the message; `close` sends it with dot-stuffing and the final `.`
struct LettreBodyWriter<'a> {
    conn: &'a mut AsyncSmtpConnection,
    to: &'a str,
    buf: Vec<u8>,
    closed: bool,
}

#[async_trait]
impl<'a> BodyWriter for LettreBodyWriter<'a> {
    async fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Body {
                to: self.to.to_string(),
                source: "write to a closed body writer".into(),
            });
        }
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.conn
            .message(&self.buf)
            .await
            .map_err(|e| TransportError::Body {
                to: self.to.to_string(),
                source: e.into(),
            })?;
        Ok(())
    }
}
