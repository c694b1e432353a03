//! DMARC policy evaluation
//!
//! Reads the policy published at `_dmarc.<domain>` and classifies how
//! strictly it tells receivers to treat unauthenticated mail. Only
//! `p=quarantine` and `p=reject` count as enforcing; `p=none` is reported
//! as published but not enforcing.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use super::types::{parse_tag_list, tag_value, CheckOutcome, Mechanism};
use crate::dns::{DomainName, RecordFetcher, RecordType};

/// Requested receiver action (`p=` tag)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DmarcPolicy {
    None,
    Quarantine,
    Reject,
}

impl DmarcPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Some(DmarcPolicy::None),
            "quarantine" => Some(DmarcPolicy::Quarantine),
            "reject" => Some(DmarcPolicy::Reject),
            _ => None,
        }
    }

    pub fn is_enforcing(&self) -> bool {
        matches!(self, DmarcPolicy::Quarantine | DmarcPolicy::Reject)
    }
}

impl fmt::Display for DmarcPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DmarcPolicy::None => write!(f, "none"),
            DmarcPolicy::Quarantine => write!(f, "quarantine"),
            DmarcPolicy::Reject => write!(f, "reject"),
        }
    }
}

/// Outcome of one DMARC evaluation
#[derive(Debug, Clone, Default, Serialize)]
pub struct DmarcCheck {
    pub exists: bool,
    /// Record text as published
    pub record: Option<String>,
    pub valid: bool,
    pub policy: Option<DmarcPolicy>,
    /// Subdomain policy (`sp=`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subdomain_policy: Option<DmarcPolicy>,
    /// Aggregate report destinations (`rua=`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub report_uris: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckOutcome for DmarcCheck {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Dmarc
    }

    fn exists(&self) -> bool {
        self.exists
    }

    fn valid(&self) -> bool {
        self.valid
    }

    fn records(&self) -> Vec<String> {
        self.record.iter().cloned().collect()
    }

    fn remediation(&self) -> &'static str {
        "Add a DMARC record with p=quarantine or p=reject"
    }
}

fn is_dmarc_record(txt: &str) -> bool {
    let tags = parse_tag_list(txt);
    tags.first()
        .map(|(tag, value)| tag == "v" && value.eq_ignore_ascii_case("DMARC1"))
        .unwrap_or(false)
}

/// DMARC evaluator
pub struct DmarcEvaluator {
    fetcher: Arc<dyn RecordFetcher>,
}

impl DmarcEvaluator {
    pub fn new(fetcher: Arc<dyn RecordFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn evaluate(&self, domain: &DomainName) -> DmarcCheck {
        let name = match domain.child("_dmarc") {
            Ok(name) => name,
            Err(e) => {
                warn!("Cannot build DMARC name for {}: {}", domain, e);
                return DmarcCheck {
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let txt = match self.fetcher.fetch(&name, RecordType::Txt).await {
            Ok(txt) => txt,
            Err(e) => {
                warn!("DMARC lookup failed for {}: {}", domain, e);
                return DmarcCheck {
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let record = txt
            .into_iter()
            .map(|r| r.trim().to_string())
            .find(|r| is_dmarc_record(r));
        let record = match record {
            Some(record) => record,
            None => {
                info!("No DMARC record for {}", domain);
                return DmarcCheck::default();
            }
        };

        let tags = parse_tag_list(&record);
        let policy = tag_value(&tags, "p").and_then(DmarcPolicy::parse);
        let subdomain_policy = tag_value(&tags, "sp").and_then(DmarcPolicy::parse);
        let report_uris = tag_value(&tags, "rua")
            .map(|rua| {
                rua.split(',')
                    .map(|uri| uri.trim().to_string())
                    .filter(|uri| !uri.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let valid = policy.map(|p| p.is_enforcing()).unwrap_or(false);
        info!("DMARC for {}: policy={:?}, valid={}", domain, policy, valid);

        DmarcCheck {
            exists: true,
            record: Some(record),
            valid,
            policy,
            subdomain_policy,
            report_uris,
            error: None,
        }
    }
}
