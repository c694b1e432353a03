//! Domain audit
//!
//! [`DomainAuditor`] runs every check for one domain and folds the results
//! into an [`AuthenticationReport`]. SPF, DKIM, DMARC and the MX lookup run
//! concurrently; relay probing then uses the MX hosts from that single
//! lookup.
//!
//! # Example
//! ```no_run
//! use authcheck_rs::audit::DomainAuditor;
//! use authcheck_rs::config::Config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let auditor = DomainAuditor::from_config(&Config::default())?;
//! let report = auditor.audit("example.com").await?;
//!
//! for line in &report.summary.recommendations {
//!     println!("{}", line);
//! }
//! # Ok(())
//! # }
//! ```

pub mod report;

pub use report::{
    AuthenticationReport, Checks, EmailRelay, HostRecords, MxCheck, Summary, ALL_GOOD,
};

use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::authentication::{DkimProber, DmarcEvaluator, SpfEvaluator};
use crate::config::Config;
use crate::dns::{DnsFetcher, DomainName, LookupError, RecordFetcher, RecordType};
use crate::error::{AuthCheckError, Result};
use crate::smtp::{RelayProbeResult, RelayProber};

const NO_MX_NOTE: &str = "No MX records found; there is no relay surface to test";
const RELAY_DISABLED_NOTE: &str = "Relay probing is disabled by configuration";

/// Runs the full set of checks for a domain
pub struct DomainAuditor {
    fetcher: Arc<dyn RecordFetcher>,
    spf: SpfEvaluator,
    dkim: DkimProber,
    dmarc: DmarcEvaluator,
    relay: Option<RelayProber>,
    subdomains: Vec<String>,
}

impl DomainAuditor {
    /// Build an auditor over any record source
    pub fn new(fetcher: Arc<dyn RecordFetcher>, config: &Config) -> Self {
        Self {
            spf: SpfEvaluator::new(fetcher.clone()),
            dkim: DkimProber::new(fetcher.clone(), config.dkim.selectors.clone()),
            dmarc: DmarcEvaluator::new(fetcher.clone()),
            relay: config
                .relay
                .enabled
                .then(|| RelayProber::new(config.relay.clone())),
            subdomains: config.relay.subdomains.clone(),
            fetcher,
        }
    }

    /// Build an auditor backed by the live resolver
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = DnsFetcher::new(&config.dns)?;
        Ok(Self::new(Arc::new(fetcher), config))
    }

    /// Audit `domain`.
    ///
    /// # Errors
    /// - [`AuthCheckError::InvalidDomain`] if `domain` is not a usable name
    /// - [`AuthCheckError::Unresolvable`] if the SPF, DMARC and MX lookups
    ///   all failed, i.e. nothing at all could be learned about the domain
    pub async fn audit(&self, domain: &str) -> Result<AuthenticationReport> {
        let domain = DomainName::parse(domain)?;
        info!("Auditing {}", domain);

        let (spf, dkim, dmarc, mx) = tokio::join!(
            self.spf.evaluate(&domain),
            self.dkim.probe(&domain),
            self.dmarc.evaluate(&domain),
            self.fetcher.fetch(&domain, RecordType::Mx),
        );

        if spf.error.is_some() && dmarc.error.is_some() && mx.is_err() {
            warn!("Every root lookup failed for {}", domain);
            return Err(AuthCheckError::Unresolvable(domain.to_string()));
        }

        let mx = match mx.map(mail_exchangers) {
            Ok(records) => MxCheck {
                exists: !records.is_empty(),
                records,
                error: None,
            },
            Err(e) => MxCheck {
                error: Some(e.to_string()),
                ..Default::default()
            },
        };

        let (probes, (base_domain, subdomains)) =
            tokio::join!(self.probe_relay(&mx.records), self.host_records(&domain, &mx));

        let note = match (&self.relay, mx.exists) {
            (None, _) => Some(RELAY_DISABLED_NOTE.to_string()),
            (Some(_), false) => Some(NO_MX_NOTE.to_string()),
            (Some(_), true) => None,
        };

        let summary = Summary::build(&[&spf, &dkim, &dmarc], &probes);
        let overall_configured =
            base_domain.configured || subdomains.values().any(|h| h.configured);

        info!(
            "Audit of {} finished: all_pass={}, {} relay probe(s)",
            domain,
            summary.all_pass,
            probes.len()
        );

        Ok(AuthenticationReport {
            domain,
            checked_at: Utc::now(),
            checks: Checks {
                spf,
                dkim,
                dmarc,
                mx,
            },
            email_relay: EmailRelay {
                probes,
                note,
                base_domain,
                subdomains,
                overall_configured,
            },
            summary,
        })
    }

    async fn probe_relay(&self, hosts: &[String]) -> Vec<RelayProbeResult> {
        match &self.relay {
            Some(prober) if !hosts.is_empty() => prober.probe(hosts).await,
            _ => Vec::new(),
        }
    }

    /// MX/A presence for the domain and its conventional mail subdomains
    async fn host_records(
        &self,
        domain: &DomainName,
        mx: &MxCheck,
    ) -> (HostRecords, BTreeMap<String, HostRecords>) {
        let base_a = self.values_or_empty(domain, RecordType::A);

        let names: Vec<(String, DomainName)> = self
            .subdomains
            .iter()
            .filter_map(|label| match domain.child(label) {
                Ok(name) => Some((label.clone(), name)),
                Err(e) => {
                    warn!("Skipping subdomain {:?}: {}", label, e);
                    None
                }
            })
            .collect();

        let subdomain_records = join_all(names.iter().map(|(_, name)| async move {
            let (mx, a) = tokio::join!(
                self.values_or_empty(name, RecordType::Mx),
                self.values_or_empty(name, RecordType::A)
            );
            HostRecords::new(mail_exchangers(mx), a)
        }));

        let (base_a, subdomain_records) = tokio::join!(base_a, subdomain_records);

        let subdomains = names
            .into_iter()
            .map(|(label, _)| label)
            .zip(subdomain_records)
            .collect();

        (HostRecords::new(mx.records.clone(), base_a), subdomains)
    }

    async fn values_or_empty(&self, name: &DomainName, record_type: RecordType) -> Vec<String> {
        self.fetcher
            .fetch(name, record_type)
            .await
            .unwrap_or_else(|e: LookupError| {
                warn!("{}", e);
                Vec::new()
            })
    }
}

/// Drop null MX targets (`MX 0 .`); a domain publishing only those accepts no mail
fn mail_exchangers(records: Vec<String>) -> Vec<String> {
    records
        .into_iter()
        .filter(|host| !host.trim().trim_end_matches('.').is_empty())
        .collect()
}
