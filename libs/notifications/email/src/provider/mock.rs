//! Mock SMTP sessions for testing

use super::{BodyWriter, SessionFactory, SmtpSession};
use crate::config::SmtpParams;
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A single verb recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCall {
    Mail(String),
    Rcpt(String),
    Data,
    Write(String),
    CloseBody,
    Quit,
    Close,
}

/// Session step a mock can be told to reject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOn {
    Mail,
    Rcpt,
    Data,
    Write,
    CloseBody,
}

#[derive(Debug, Default)]
struct MockState {
    connections: Vec<Instant>,
    calls: Vec<SmtpCall>,
}

/// Mock session factory that records every connection and verb
#[derive(Debug, Clone)]
pub struct MockSmtp {
    state: Arc<Mutex<MockState>>,
    failed_connects: usize,
    fail_on: Vec<FailOn>,
    fail_quit: bool,
}

impl MockSmtp {
    /// Create a mock that accepts everything
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            failed_connects: 0,
            fail_on: Vec::new(),
            fail_quit: false,
        }
    }

    /// Refuse the first `n` connections
    pub fn failing_connects(mut self, n: usize) -> Self {
        self.failed_connects = n;
        self
    }

    /// Refuse every connection
    pub fn unreachable() -> Self {
        Self::new().failing_connects(usize::MAX)
    }

    /// Reject `step` in every session; can be called for several steps
    pub fn fail_on(mut self, step: FailOn) -> Self {
        self.fail_on.push(step);
        self
    }

    /// Reject QUIT so the session has to fall back to close
    pub fn failing_quit(mut self) -> Self {
        self.fail_quit = true;
        self
    }

    /// Get the number of connection attempts, failed ones included
    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Get the instants of all connection attempts
    pub async fn connection_times(&self) -> Vec<Instant> {
        self.state.lock().await.connections.clone()
    }

    /// Get all recorded verbs, in order, across sessions
    pub async fn calls(&self) -> Vec<SmtpCall> {
        self.state.lock().await.calls.clone()
    }

    /// Get everything written to message bodies
    pub async fn written(&self) -> String {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|c| match c {
                SmtpCall::Write(s) => Some(s.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Default for MockSmtp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionFactory for MockSmtp {
    async fn create(&self, params: &SmtpParams) -> Result<Box<dyn SmtpSession>, TransportError> {
        let mut state = self.state.lock().await;
        state.connections.push(Instant::now());

        if state.connections.len() <= self.failed_connects {
            return Err(TransportError::Connect {
                addr: params.address(),
                source: "mock connection refused".into(),
            });
        }

        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            fail_on: self.fail_on.clone(),
            fail_quit: self.fail_quit,
            to: String::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

struct MockSession {
    state: Arc<Mutex<MockState>>,
    fail_on: Vec<FailOn>,
    fail_quit: bool,
    to: String,
}

impl MockSession {
    async fn record(&self, call: SmtpCall) {
        self.state.lock().await.calls.push(call);
    }

    fn fails(&self, step: FailOn) -> bool {
        self.fail_on.contains(&step)
    }
}

#[async_trait]
impl SmtpSession for MockSession {
    async fn mail(&mut self, from: &str) -> Result<(), TransportError> {
        self.record(SmtpCall::Mail(from.to_string())).await;
        if self.fails(FailOn::Mail) {
            return Err(TransportError::BadFrom {
                address: from.to_string(),
                source: "mock MAIL rejected".into(),
            });
        }
        Ok(())
    }

    async fn rcpt(&mut self, to: &str) -> Result<(), TransportError> {
        self.record(SmtpCall::Rcpt(to.to_string())).await;
        if self.fails(FailOn::Rcpt) {
            return Err(TransportError::BadTo {
                address: to.to_string(),
                source: "mock RCPT rejected".into(),
            });
        }
        self.to = to.to_string();
        Ok(())
    }

    async fn data<'a>(&'a mut self) -> Result<Box<dyn BodyWriter + 'a>, TransportError> {
        self.record(SmtpCall::Data).await;
        if self.fails(FailOn::Data) {
            return Err(TransportError::Data {
                source: "mock DATA rejected".into(),
            });
        }
        Ok(Box::new(MockBodyWriter {
            state: Arc::clone(&self.state),
            fail_on: self.fail_on.clone(),
            to: self.to.clone(),
        }))
    }

    async fn quit(&mut self) -> Result<(), TransportError> {
        self.record(SmtpCall::Quit).await;
        if self.fail_quit {
            return Err(TransportError::Terminate {
                source: "mock QUIT rejected".into(),
            });
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.record(SmtpCall::Close).await;
        Ok(())
    }
}

struct MockBodyWriter {
    state: Arc<Mutex<MockState>>,
    fail_on: Vec<FailOn>,
    to: String,
}

#[async_trait]
impl BodyWriter for MockBodyWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.state
            .lock()
            .await
            .calls
            .push(SmtpCall::Write(String::from_utf8_lossy(buf).into_owned()));
        if self.fail_on.contains(&FailOn::Write) {
            return Err(TransportError::Body {
                to: self.to.clone(),
                source: "mock write failed".into(),
            });
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().await.calls.push(SmtpCall::CloseBody);
        if self.fail_on.contains(&FailOn::CloseBody) {
            return Err(TransportError::Body {
                to: self.to.clone(),
                source: "mock message rejected".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn full_session(mock: &MockSmtp) -> Result<(), TransportError> {
        let mut session = mock.create(&SmtpParams::default()).await?;
        session.mail("from@example.com").await?;
        session.rcpt("to@example.com").await?;
        {
            let mut writer = session.data().await?;
            writer.write(b"Subject: hi\r\n\r\nbody").await?;
            writer.close().await?;
        }
        session.quit().await
    }

    #[tokio::test]
    async fn test_mock_records_session() {
        let mock = MockSmtp::new();
        full_session(&mock).await.unwrap();

        assert_eq!(mock.connection_count().await, 1);
        assert_eq!(
            mock.calls().await,
            vec![
                SmtpCall::Mail("from@example.com".to_string()),
                SmtpCall::Rcpt("to@example.com".to_string()),
                SmtpCall::Data,
                SmtpCall::Write("Subject: hi\r\n\r\nbody".to_string()),
                SmtpCall::CloseBody,
                SmtpCall::Quit,
            ]
        );
        assert_eq!(mock.written().await, "Subject: hi\r\n\r\nbody");
    }

    #[tokio::test]
    async fn test_mock_failing_connects() {
        let mock = MockSmtp::new().failing_connects(2);

        assert!(matches!(
            full_session(&mock).await,
            Err(TransportError::Connect { .. })
        ));
        assert!(full_session(&mock).await.is_err());
        assert!(full_session(&mock).await.is_ok());
        assert_eq!(mock.connection_count().await, 3);
    }

    #[tokio::test]
    async fn test_mock_fail_on_rcpt() {
        let mock = MockSmtp::new().fail_on(FailOn::Rcpt);

        let err = full_session(&mock).await.unwrap_err();
        assert!(matches!(err, TransportError::BadTo { .. }));
        assert!(!mock.calls().await.contains(&SmtpCall::Data));
    }

    #[tokio::test]
    async fn test_mock_shares_state_between_clones() {
        let mock = MockSmtp::unreachable();
        let clone = mock.clone();

        assert!(full_session(&clone).await.is_err());
        assert_eq!(mock.connection_count().await, 1);
    }
}
