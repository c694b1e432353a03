use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::commands::ProbeCommand;
use super::reply::SmtpReply;
use super::tls::server_name;
use crate::error::{AuthCheckError, Result};

/// Upper bound on lines accepted for one reply
const MAX_REPLY_LINES: usize = 128;

/// Byte stream a probe session can run over (plain TCP or TLS)
pub trait ProbeStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ProbeStream for T {}

/// Client side of one SMTP conversation.
///
/// Every read and write is bounded by `timeout`; an unresponsive peer
/// surfaces as [`AuthCheckError::Timeout`].
pub struct ProbeSession {
    stream: BufReader<Box<dyn ProbeStream>>,
    peer: String,
    timeout: Duration,
}

impl ProbeSession {
    /// Open a TCP connection to `host:port`
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let peer = format!("{}:{}", host, port);
        debug!("Connecting to {}", peer);

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| AuthCheckError::Timeout(format!("connect to {}", peer)))??;

        Ok(Self::new(Box::new(stream), peer, timeout))
    }

    pub fn new(stream: Box<dyn ProbeStream>, peer: String, timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            peer,
            timeout,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Read one line including the line terminator
    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = tokio::time::timeout(self.timeout, self.stream.read_line(&mut line))
            .await
            .map_err(|_| AuthCheckError::Timeout(format!("reply from {}", self.peer)))??;

        if read == 0 {
            return Err(AuthCheckError::SmtpProtocol(format!(
                "{} closed the connection",
                self.peer
            )));
        }
        Ok(line)
    }

    /// Read a complete reply, following continuation lines
    pub async fn read_reply(&mut self) -> Result<SmtpReply> {
        let mut lines = Vec::new();

        loop {
            let line = self.read_line().await?;
            debug!("< {}", line.trim_end());

            let (_, more, _) = SmtpReply::split_line(&line)?;
            lines.push(line);

            if !more {
                break;
            }
            if lines.len() >= MAX_REPLY_LINES {
                return Err(AuthCheckError::SmtpProtocol(format!(
                    "Reply from {} exceeds {} lines",
                    self.peer, MAX_REPLY_LINES
                )));
            }
        }

        SmtpReply::from_lines(&lines)
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        debug!("> {}", line);
        let timeout = self.timeout;
        let bytes = format!("{}\r\n", line);
        let writer = self.stream.get_mut();
        let write = async move {
            writer.write_all(bytes.as_bytes()).await?;
            writer.flush().await
        };

        tokio::time::timeout(timeout, write)
            .await
            .map_err(|_| AuthCheckError::Timeout(format!("write to {}", self.peer)))??;
        Ok(())
    }

    /// Send `command` and wait for its reply
    pub async fn send(&mut self, command: &ProbeCommand) -> Result<SmtpReply> {
        self.write_line(&command.to_line()).await?;
        self.read_reply().await
    }

    /// Run the TLS handshake over this connection after a `220` to STARTTLS.
    ///
    /// Consumes the session; on failure the connection is unusable.
    pub async fn upgrade(self, connector: &TlsConnector, host: &str) -> Result<Self> {
        let name = server_name(host)?;
        let peer = self.peer;
        let timeout = self.timeout;
        let inner = self.stream.into_inner();

        let tls = tokio::time::timeout(timeout, connector.connect(name, inner))
            .await
            .map_err(|_| AuthCheckError::Timeout(format!("TLS handshake with {}", peer)))?
            .map_err(|e| {
                AuthCheckError::Tls(format!("TLS handshake with {} failed: {}", peer, e))
            })?;

        debug!("TLS established with {}", peer);
        Ok(Self::new(Box::new(tls), peer, timeout))
    }
}
