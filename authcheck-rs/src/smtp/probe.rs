//! SMTP relay and STARTTLS probing
//!
//! For each mail exchanger the prober walks the configured ports in order
//! until one accepts a connection, then runs a short conversation:
//!
//! 1. Read the greeting, send `EHLO` (falling back to `HELO`)
//! 2. If `STARTTLS` is advertised, try to upgrade and re-`EHLO`
//! 3. Open an envelope from an unrelated sender to an unrelated recipient
//!    and record whether `RCPT TO` is accepted
//! 4. `RSET` and `QUIT`
//!
//! No message body is ever sent. Negative replies are findings, not
//! errors; only transport failures end a session early.

use futures::future::join_all;
use serde::Serialize;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use super::commands::ProbeCommand;
use super::reply::SmtpReply;
use super::session::ProbeSession;
use super::tls::client_connector;
use crate::config::RelayConfig;
use crate::error::{AuthCheckError, Result};

/// Outcome of one (host, port) attempt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayProbeResult {
    pub host: String,
    pub port: u16,
    pub connected: bool,
    /// The server accepted EHLO or HELO, so its capabilities are known
    pub greeted: bool,
    pub starttls_offered: bool,
    pub tls_established: bool,
    /// The server accepted a recipient for an unauthenticated, unrelated sender
    pub relay_accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl RelayProbeResult {
    fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Default::default()
        }
    }

    fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.detail = Some(match self.detail.take() {
            Some(existing) => format!("{}; {}", existing, message),
            None => message,
        });
    }
}

/// Relay prober
pub struct RelayProber {
    config: RelayConfig,
    connector: TlsConnector,
}

impl RelayProber {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            connector: client_connector(),
        }
    }

    /// Probe every host concurrently; results keep host order
    pub async fn probe(&self, hosts: &[String]) -> Vec<RelayProbeResult> {
        info!("Probing {} mail exchanger(s) for relay exposure", hosts.len());

        join_all(hosts.iter().map(|host| self.probe_host(host)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Try ports in order until one connects.
    ///
    /// Every attempt, failed or not, is reported.
    pub async fn probe_host(&self, host: &str) -> Vec<RelayProbeResult> {
        let mut results = Vec::new();

        for &port in &self.config.ports {
            let result = self.probe_port(host, port).await;
            let connected = result.connected;
            results.push(result);
            if connected {
                break;
            }
        }

        results
    }

    async fn probe_port(&self, host: &str, port: u16) -> RelayProbeResult {
        let mut result = RelayProbeResult::new(host, port);

        let session = match ProbeSession::connect(host, port, self.config.timeout()).await {
            Ok(session) => session,
            Err(e) => {
                debug!("{}:{} unreachable: {}", host, port, e);
                result.note(e.to_string());
                return result;
            }
        };
        result.connected = true;

        if let Err(e) = self.run_session(session, host, port, &mut result).await {
            warn!("Probe of {}:{} ended early: {}", host, port, e);
            result.note(e.to_string());
        }

        info!(
            "{}:{}: starttls_offered={}, tls_established={}, relay_accepted={}",
            host, port, result.starttls_offered, result.tls_established, result.relay_accepted
        );
        result
    }

    async fn run_session(
        &self,
        mut session: ProbeSession,
        host: &str,
        port: u16,
        result: &mut RelayProbeResult,
    ) -> Result<()> {
        let Some(ehlo) = self.open(&mut session, result).await? else {
            return Ok(());
        };
        result.starttls_offered = ehlo.has_capability("STARTTLS");

        if result.starttls_offered && self.config.attempt_starttls {
            session = self.start_tls(session, host, port, result).await?;
        }

        self.test_relay(&mut session, result).await?;

        // Leave cleanly; the verdict is already recorded
        if let Err(e) = session.send(&ProbeCommand::Rset).await {
            debug!("RSET to {} failed: {}", session.peer(), e);
        }
        if let Err(e) = session.send(&ProbeCommand::Quit).await {
            debug!("QUIT to {} failed: {}", session.peer(), e);
        }

        Ok(())
    }

    /// Greeting plus EHLO/HELO. `None` when the server refuses to talk.
    async fn open(
        &self,
        session: &mut ProbeSession,
        result: &mut RelayProbeResult,
    ) -> Result<Option<SmtpReply>> {
        let greeting = session.read_reply().await?;
        result.banner = Some(greeting.message());
        if !greeting.is_positive() {
            result.note(format!("Greeting refused: {}", greeting.message()));
            return Ok(None);
        }

        self.greet(session, result).await
    }

    async fn greet(
        &self,
        session: &mut ProbeSession,
        result: &mut RelayProbeResult,
    ) -> Result<Option<SmtpReply>> {
        let name = self.config.helo_name.clone();

        let ehlo = session.send(&ProbeCommand::Ehlo(name.clone())).await?;
        if ehlo.is_positive() {
            result.greeted = true;
            return Ok(Some(ehlo));
        }

        debug!("EHLO refused by {} ({}), trying HELO", session.peer(), ehlo.code);
        let helo = session.send(&ProbeCommand::Helo(name)).await?;
        if helo.is_positive() {
            result.greeted = true;
            return Ok(Some(helo));
        }

        result.note(format!("HELO refused: {}", helo.message()));
        Ok(None)
    }

    /// Negotiate STARTTLS. Returns the session to continue on, which is a
    /// fresh plaintext connection if the handshake broke the old one.
    async fn start_tls(
        &self,
        mut session: ProbeSession,
        host: &str,
        port: u16,
        result: &mut RelayProbeResult,
    ) -> Result<ProbeSession> {
        let reply = session.send(&ProbeCommand::StartTls).await?;
        if reply.code != 220 {
            result.note(format!("STARTTLS refused: {}", reply.message()));
            return Ok(session);
        }

        match session.upgrade(&self.connector, host).await {
            Ok(mut upgraded) => {
                result.tls_established = true;
                if self.greet(&mut upgraded, result).await?.is_none() {
                    result.note("EHLO refused after STARTTLS");
                }
                Ok(upgraded)
            }
            Err(e) => {
                warn!("STARTTLS with {}:{} failed: {}", host, port, e);
                result.note(e.to_string());

                let mut session = ProbeSession::connect(host, port, self.config.timeout()).await?;
                if self.open(&mut session, result).await?.is_none() {
                    return Err(AuthCheckError::SmtpProtocol(format!(
                        "{}:{} refused the plaintext session after a failed STARTTLS",
                        host, port
                    )));
                }
                Ok(session)
            }
        }
    }

    async fn test_relay(
        &self,
        session: &mut ProbeSession,
        result: &mut RelayProbeResult,
    ) -> Result<()> {
        let mail = session
            .send(&ProbeCommand::MailFrom(self.config.probe_sender.clone()))
            .await?;
        if !mail.is_positive() {
            result.note(format!("MAIL FROM rejected: {}", mail.message()));
            return Ok(());
        }

        let rcpt = session
            .send(&ProbeCommand::RcptTo(self.config.probe_recipient.clone()))
            .await?;
        result.relay_accepted = rcpt.is_positive();

        if result.relay_accepted {
            warn!(
                "{} accepted a relay recipient for an unauthenticated sender",
                session.peer()
            );
        } else {
            result.note(format!("RCPT TO rejected: {}", rcpt.message()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notes_accumulate() {
        let mut result = RelayProbeResult::new("mx.example.com", 25);
        result.note("STARTTLS refused: 454 TLS not available");
        result.note("RCPT TO rejected: 550 Relaying denied");
        assert_eq!(
            result.detail.as_deref(),
            Some("STARTTLS refused: 454 TLS not available; RCPT TO rejected: 550 Relaying denied")
        );
    }

    #[tokio::test]
    async fn test_unreachable_ports_are_each_reported() {
        // Bind then drop to get ports nothing listens on
        let closed: Vec<u16> = {
            let a = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            let b = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            vec![a.local_addr().unwrap().port(), b.local_addr().unwrap().port()]
        };

        let prober = RelayProber::new(RelayConfig {
            ports: closed.clone(),
            timeout_secs: 1,
            ..Default::default()
        });
        let results = prober.probe(&["127.0.0.1".to_string()]).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.connected && r.detail.is_some()));
        assert_eq!(results[0].port, closed[0]);
        assert_eq!(results[1].port, closed[1]);
    }
}
