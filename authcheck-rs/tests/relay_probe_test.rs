//! Integration tests for relay probing against an in-process SMTP server

use authcheck_rs::config::RelayConfig;
use authcheck_rs::smtp::{ProbeCommand, RelayProber};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// How the fake server answers
#[derive(Clone)]
struct Behavior {
    greeting: &'static str,
    advertise_starttls: bool,
    /// Reply to STARTTLS; 220 makes the server hang up, as a broken TLS stack would
    starttls_reply: &'static str,
    rcpt_reply: &'static str,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            greeting: "220 fake.test ESMTP",
            advertise_starttls: false,
            starttls_reply: "454 4.7.0 TLS not available",
            rcpt_reply: "550 5.7.1 Relaying denied",
        }
    }
}

/// Start a fake SMTP server; returns its port and the log of received lines
async fn spawn_server(behavior: Behavior) -> (u16, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let log = Arc::new(Mutex::new(Vec::new()));

    let server_log = log.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let behavior = behavior.clone();
            let log = server_log.clone();

            tokio::spawn(async move {
                let (reader, mut writer) = stream.into_split();
                let mut reader = BufReader::new(reader);
                writer
                    .write_all(format!("{}\r\n", behavior.greeting).as_bytes())
                    .await
                    .unwrap();
                if !behavior.greeting.starts_with("220") {
                    return;
                }

                let mut line = String::new();
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                        return;
                    }
                    let command = line.trim_end().to_string();
                    log.lock().unwrap().push(command.clone());

                    let verb = command
                        .split_whitespace()
                        .next()
                        .unwrap_or("")
                        .to_uppercase();
                    let reply = match verb.as_str() {
                        "EHLO" if behavior.advertise_starttls => {
                            "250-fake.test\r\n250-STARTTLS\r\n250 8BITMIME".to_string()
                        }
                        "EHLO" => "250-fake.test\r\n250 8BITMIME".to_string(),
                        "HELO" => "250 fake.test".to_string(),
                        "STARTTLS" if behavior.starttls_reply.starts_with("220") => {
                            let _ = writer
                                .write_all(format!("{}\r\n", behavior.starttls_reply).as_bytes())
                                .await;
                            return;
                        }
                        "STARTTLS" => behavior.starttls_reply.to_string(),
                        "MAIL" => "250 2.1.0 OK".to_string(),
                        "RCPT" => behavior.rcpt_reply.to_string(),
                        "DATA" => "354 Go ahead".to_string(),
                        "RSET" => "250 2.0.0 OK".to_string(),
                        "QUIT" => {
                            let _ = writer.write_all(b"221 2.0.0 Bye\r\n").await;
                            return;
                        }
                        _ => "500 5.5.2 Unrecognized".to_string(),
                    };
                    if writer.write_all(format!("{}\r\n", reply).as_bytes()).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    (port, log)
}

fn prober(port: u16) -> RelayProber {
    RelayProber::new(RelayConfig {
        ports: vec![port],
        timeout_secs: 2,
        ..Default::default()
    })
}

fn received(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_rejected_recipient_is_not_a_relay() {
    let (port, log) = spawn_server(Behavior::default()).await;

    let results = prober(port).probe(&["127.0.0.1".to_string()]).await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.connected);
    assert!(result.greeted);
    assert!(!result.relay_accepted);
    assert!(!result.starttls_offered);
    assert_eq!(result.banner.as_deref(), Some("220 fake.test ESMTP"));
    assert!(result.detail.as_deref().unwrap().contains("550 5.7.1 Relaying denied"));

    let commands = received(&log);
    assert!(commands.iter().any(|c| c.starts_with("MAIL FROM:")));
    assert!(commands.iter().any(|c| c.starts_with("RCPT TO:")));
    assert!(!commands.iter().any(|c| c.eq_ignore_ascii_case("DATA")));
}

#[tokio::test]
async fn test_refused_greeting_leaves_capabilities_unknown() {
    let (port, log) = spawn_server(Behavior {
        greeting: "554 5.7.1 No service",
        ..Default::default()
    })
    .await;

    let results = prober(port).probe(&["127.0.0.1".to_string()]).await;

    let result = &results[0];
    assert!(result.connected);
    assert!(!result.greeted);
    assert!(!result.starttls_offered);
    assert!(!result.relay_accepted);
    assert!(result.detail.as_deref().unwrap().contains("Greeting refused: 554"));
    assert!(received(&log).is_empty());
}

#[tokio::test]
async fn test_accepted_recipient_is_reported_and_no_data_sent() {
    let (port, log) = spawn_server(Behavior {
        rcpt_reply: "250 2.1.5 OK",
        ..Default::default()
    })
    .await;

    let results = prober(port).probe(&["127.0.0.1".to_string()]).await;
    assert!(results[0].relay_accepted);

    let commands = received(&log);
    for command in &commands {
        // Everything the prober sends must be part of the probe vocabulary
        assert!(ProbeCommand::parse(command).is_ok(), "unexpected command {}", command);
    }
    assert_eq!(commands.last().map(String::as_str), Some("QUIT"));
    assert!(commands.contains(&"RSET".to_string()));
}

#[tokio::test]
async fn test_refused_starttls_continues_in_plaintext() {
    let (port, log) = spawn_server(Behavior {
        advertise_starttls: true,
        ..Default::default()
    })
    .await;

    let results = prober(port).probe(&["127.0.0.1".to_string()]).await;
    let result = &results[0];

    assert!(result.starttls_offered);
    assert!(!result.tls_established);
    assert!(result.detail.as_deref().unwrap().contains("STARTTLS refused: 454"));
    assert!(received(&log).iter().any(|c| c.starts_with("RCPT TO:")));
}

#[tokio::test]
async fn test_failed_handshake_reconnects_in_plaintext() {
    let (port, log) = spawn_server(Behavior {
        advertise_starttls: true,
        starttls_reply: "220 2.0.0 Ready to start TLS",
        ..Default::default()
    })
    .await;

    let results = prober(port).probe(&["127.0.0.1".to_string()]).await;
    let result = &results[0];

    assert!(result.starttls_offered);
    assert!(!result.tls_established);
    assert!(!result.relay_accepted);

    let commands = received(&log);
    let ehlo_count = commands.iter().filter(|c| c.starts_with("EHLO")).count();
    assert_eq!(ehlo_count, 2);
    assert!(commands.iter().any(|c| c.starts_with("RCPT TO:")));
}

#[tokio::test]
async fn test_starttls_not_attempted_when_disabled() {
    let (port, log) = spawn_server(Behavior {
        advertise_starttls: true,
        ..Default::default()
    })
    .await;

    let prober = RelayProber::new(RelayConfig {
        ports: vec![port],
        timeout_secs: 2,
        attempt_starttls: false,
        ..Default::default()
    });
    let results = prober.probe(&["127.0.0.1".to_string()]).await;

    assert!(results[0].starttls_offered);
    assert!(!received(&log).iter().any(|c| c == "STARTTLS"));
}

#[tokio::test]
async fn test_falls_back_to_next_port() {
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (open, _log) = spawn_server(Behavior::default()).await;

    let prober = RelayProber::new(RelayConfig {
        ports: vec![closed, open],
        timeout_secs: 2,
        ..Default::default()
    });
    let results = prober.probe(&["127.0.0.1".to_string()]).await;

    assert_eq!(results.len(), 2);
    assert!(!results[0].connected);
    assert_eq!(results[1].port, open);
    assert!(results[1].connected);
}
