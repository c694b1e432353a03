//! Resolver-backed record fetcher
//!
//! Wraps a `trust-dns-resolver` instance configured for auditing: no answer
//! cache, a short per-query timeout, and a bounded number of attempts. Each
//! call is additionally guarded by `tokio::time::timeout` so a stuck upstream
//! can never hold a check open past the configured budget.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::proto::rr::{RData, RecordType as WireType};
use trust_dns_resolver::TokioAsyncResolver;

use super::{DomainName, LookupError, RecordFetcher, RecordType};
use crate::config::DnsConfig;
use crate::error::{AuthCheckError, Result};

/// Production [`RecordFetcher`]
pub struct DnsFetcher {
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl DnsFetcher {
    /// Create a fetcher from the `[dns]` configuration section
    ///
    /// An empty `nameservers` list uses the host's resolver configuration.
    pub fn new(config: &DnsConfig) -> Result<Self> {
        let (resolver_config, mut opts) = if config.nameservers.is_empty() {
            trust_dns_resolver::system_conf::read_system_conf().map_err(|e| {
                AuthCheckError::Config(format!("Failed to read system resolver config: {}", e))
            })?
        } else {
            let group = NameServerConfigGroup::from_ips_clear(&config.nameservers, 53, true);
            (
                ResolverConfig::from_parts(None, vec![], group),
                ResolverOpts::default(),
            )
        };

        opts.timeout = config.timeout();
        opts.attempts = config.attempts;
        opts.cache_size = 0;

        debug!(
            "DNS fetcher: timeout={:?}, attempts={}, nameservers={:?}",
            opts.timeout, opts.attempts, config.nameservers
        );

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
            // Outer guard covers every attempt plus a little scheduling slack
            timeout: config.timeout() * config.attempts as u32 + Duration::from_secs(1),
        })
    }

    fn wire_type(record_type: RecordType) -> WireType {
        match record_type {
            RecordType::Txt => WireType::TXT,
            RecordType::A => WireType::A,
            RecordType::Aaaa => WireType::AAAA,
            RecordType::Mx => WireType::MX,
        }
    }

    fn extract_values(record_type: RecordType, rdata: Vec<RData>) -> Vec<String> {
        match record_type {
            RecordType::Mx => {
                let mut exchanges: Vec<(u16, String)> = rdata
                    .iter()
                    .filter_map(|rdata| match rdata {
                        RData::MX(mx) => Some((
                            mx.preference(),
                            mx.exchange()
                                .to_utf8()
                                .trim_end_matches('.')
                                .to_ascii_lowercase(),
                        )),
                        _ => None,
                    })
                    // A root exchange is a null MX: the domain accepts no mail
                    .filter(|(_, host)| !host.is_empty())
                    .collect();
                // Lower preference first; stable for equal preferences
                exchanges.sort_by_key(|(preference, _)| *preference);
                exchanges.into_iter().map(|(_, host)| host).collect()
            }
            _ => rdata
                .iter()
                .filter_map(|rdata| match rdata {
                    // TXT records can contain multiple strings - join them
                    RData::TXT(txt) => Some(
                        txt.iter()
                            .map(|bytes| String::from_utf8_lossy(bytes).to_string())
                            .collect::<Vec<String>>()
                            .join(""),
                    ),
                    RData::A(a) => Some(a.to_string()),
                    RData::AAAA(aaaa) => Some(aaaa.to_string()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Sort resolver errors into "nothing published" and "could not ask"
    fn classify(
        name: &DomainName,
        record_type: RecordType,
        error: ResolveError,
    ) -> std::result::Result<Vec<String>, LookupError> {
        match error.kind() {
            ResolveErrorKind::NoRecordsFound { response_code, .. }
                if matches!(response_code, ResponseCode::NoError | ResponseCode::NXDomain) =>
            {
                debug!("No {} records for {} ({})", record_type, name, response_code);
                Ok(Vec::new())
            }
            ResolveErrorKind::Timeout => {
                warn!("{} lookup timed out for {}", record_type, name);
                Err(LookupError::Timeout {
                    name: name.to_string(),
                    record_type,
                })
            }
            _ => {
                warn!("Failed to lookup {} records for {}: {}", record_type, name, error);
                Err(LookupError::Transport {
                    name: name.to_string(),
                    record_type,
                    reason: error.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl RecordFetcher for DnsFetcher {
    async fn fetch(
        &self,
        name: &DomainName,
        record_type: RecordType,
    ) -> std::result::Result<Vec<String>, LookupError> {
        let lookup = self
            .resolver
            .lookup(name.fqdn(), Self::wire_type(record_type));

        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(answer)) => {
                let values = Self::extract_values(record_type, answer.iter().cloned().collect());
                debug!("{} {} -> {} value(s)", record_type, name, values.len());
                Ok(values)
            }
            Ok(Err(e)) => Self::classify(name, record_type, e),
            Err(_) => {
                warn!("{} lookup for {} exceeded {:?}", record_type, name, self.timeout);
                Err(LookupError::Timeout {
                    name: name.to_string(),
                    record_type,
                })
            }
        }
    }
}
