//! DKIM selector discovery
//!
//! DNS offers no way to list the selectors published under
//! `_domainkey.<domain>`, so the prober asks for each label of a configured
//! catalog and keeps every one that answers with a DKIM key record. All
//! hits are reported; a domain signing through several providers usually
//! publishes one selector per provider.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{parse_tag_list, tag_value, CheckOutcome, Mechanism};
use crate::dns::{DomainName, RecordFetcher, RecordType};

/// A selector that answered with a DKIM key record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DkimFinding {
    pub selector: String,
    pub record: String,
}

impl DkimFinding {
    /// `k=rsa`, or no `k=` tag at all (RSA is the default key type)
    pub fn is_rsa(&self) -> bool {
        let tags = parse_tag_list(&self.record);
        tag_value(&tags, "k")
            .map(|k| k.eq_ignore_ascii_case("rsa"))
            .unwrap_or(true)
    }

    /// Public key data; an empty `p=` means the key was revoked
    pub fn public_key(&self) -> Option<String> {
        let tags = parse_tag_list(&self.record);
        tag_value(&tags, "p").map(|p| p.split_whitespace().collect())
    }

    /// An RSA key that has not been revoked
    pub fn is_usable(&self) -> bool {
        self.is_rsa() && self.public_key().map(|p| !p.is_empty()).unwrap_or(false)
    }
}

/// Outcome of probing the selector catalog
#[derive(Debug, Clone, Default, Serialize)]
pub struct DkimCheck {
    pub exists: bool,
    /// Findings in catalog order
    pub records: Vec<DkimFinding>,
    pub valid: bool,
    /// Selectors probed
    pub selectors_checked: usize,
    /// Selectors whose lookup failed rather than answered
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_selectors: Vec<String>,
}

impl CheckOutcome for DkimCheck {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Dkim
    }

    fn exists(&self) -> bool {
        self.exists
    }

    fn valid(&self) -> bool {
        self.valid
    }

    fn records(&self) -> Vec<String> {
        self.records.iter().map(|f| f.record.clone()).collect()
    }

    fn remediation(&self) -> &'static str {
        "Configure a DKIM selector publishing a valid RSA key (v=DKIM1; k=rsa)"
    }
}

fn is_dkim_record(txt: &str) -> bool {
    let tags = parse_tag_list(txt);
    tag_value(&tags, "v")
        .map(|v| v.eq_ignore_ascii_case("DKIM1"))
        .unwrap_or(false)
}

/// DKIM prober over a fixed selector catalog
pub struct DkimProber {
    fetcher: Arc<dyn RecordFetcher>,
    selectors: Vec<String>,
}

impl DkimProber {
    pub fn new(fetcher: Arc<dyn RecordFetcher>, selectors: Vec<String>) -> Self {
        Self { fetcher, selectors }
    }

    /// Probe every selector of the catalog under `domain`
    pub async fn probe(&self, domain: &DomainName) -> DkimCheck {
        info!(
            "Probing {} DKIM selector(s) for {}",
            self.selectors.len(),
            domain
        );

        let answers = join_all(
            self.selectors
                .iter()
                .map(|selector| self.probe_selector(domain, selector)),
        )
        .await;

        let mut check = DkimCheck {
            selectors_checked: self.selectors.len(),
            ..Default::default()
        };

        for (selector, answer) in self.selectors.iter().zip(answers) {
            match answer {
                Ok(records) => check.records.extend(records.into_iter().map(|record| DkimFinding {
                    selector: selector.clone(),
                    record,
                })),
                Err(()) => check.failed_selectors.push(selector.clone()),
            }
        }

        check.exists = !check.records.is_empty();
        check.valid = check.records.iter().any(DkimFinding::is_usable);

        info!(
            "DKIM for {}: {} selector(s) found, valid={}",
            domain,
            check.records.len(),
            check.valid
        );
        check
    }

    async fn probe_selector(&self, domain: &DomainName, selector: &str) -> Result<Vec<String>, ()> {
        let name = match domain.child(&format!("{}._domainkey", selector)) {
            Ok(name) => name,
            Err(e) => {
                warn!("Skipping DKIM selector {:?}: {}", selector, e);
                return Err(());
            }
        };

        match self.fetcher.fetch(&name, RecordType::Txt).await {
            Ok(txt) => {
                let records: Vec<String> = txt
                    .into_iter()
                    .map(|r| r.trim().to_string())
                    .filter(|r| is_dkim_record(r))
                    .collect();
                if !records.is_empty() {
                    debug!("DKIM selector {} found at {}", selector, name);
                }
                Ok(records)
            }
            Err(e) => {
                warn!("DKIM selector {} skipped: {}", selector, e);
                Err(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::StaticFetcher;

    fn prober(fetcher: StaticFetcher, selectors: &[&str]) -> DkimProber {
        DkimProber::new(
            Arc::new(fetcher),
            selectors.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn domain() -> DomainName {
        DomainName::parse("example.com").unwrap()
    }

    #[tokio::test]
    async fn test_no_selectors_found() {
        let check = prober(StaticFetcher::new(), &["default", "google"])
            .probe(&domain())
            .await;

        assert!(!check.exists);
        assert!(!check.valid);
        assert_eq!(check.selectors_checked, 2);
        assert!(check.failed_selectors.is_empty());
    }

    #[tokio::test]
    async fn test_all_hits_reported_in_catalog_order() {
        let fetcher = StaticFetcher::new()
            .with_records(
                "selector2._domainkey.example.com",
                RecordType::Txt,
                &["v=DKIM1; k=rsa; p=MIIBIjANBgkq"],
            )
            .with_records(
                "google._domainkey.example.com",
                RecordType::Txt,
                &["v=DKIM1; p=MIGfMA0GCSqG"],
            );
        let check = prober(fetcher, &["google", "selector1", "selector2"])
            .probe(&domain())
            .await;

        let selectors: Vec<&str> = check.records.iter().map(|f| f.selector.as_str()).collect();
        assert_eq!(selectors, vec!["google", "selector2"]);
        assert!(check.exists);
        assert!(check.valid);
    }

    #[tokio::test]
    async fn test_non_rsa_key_is_present_but_invalid() {
        let fetcher = StaticFetcher::new().with_records(
            "default._domainkey.example.com",
            RecordType::Txt,
            &["v=DKIM1; k=ed25519; p=11qYAYKxCrfVS/7TyWQHOg7hcvPapiMlrwIaaPcHURo="],
        );
        let check = prober(fetcher, &["default"]).probe(&domain()).await;

        assert!(check.exists);
        assert!(!check.valid);
    }

    #[tokio::test]
    async fn test_revoked_key_is_present_but_invalid() {
        let fetcher = StaticFetcher::new().with_records(
            "default._domainkey.example.com",
            RecordType::Txt,
            &["v=DKIM1; k=rsa; p="],
        );
        let check = prober(fetcher, &["default"]).probe(&domain()).await;

        assert!(check.exists);
        assert_eq!(check.records[0].public_key().as_deref(), Some(""));
        assert!(!check.valid);
    }

    #[tokio::test]
    async fn test_revoked_key_does_not_mask_a_live_one() {
        let fetcher = StaticFetcher::new()
            .with_records(
                "old._domainkey.example.com",
                RecordType::Txt,
                &["v=DKIM1; p= "],
            )
            .with_records(
                "new._domainkey.example.com",
                RecordType::Txt,
                &["v=DKIM1; k=rsa; p=MIGfMA0G"],
            );
        let check = prober(fetcher, &["old", "new"]).probe(&domain()).await;

        assert_eq!(check.records.len(), 2);
        assert!(check.valid);
    }

    #[tokio::test]
    async fn test_records_without_version_are_ignored() {
        let fetcher = StaticFetcher::new().with_records(
            "default._domainkey.example.com",
            RecordType::Txt,
            &["some-verification-token=abc"],
        );
        let check = prober(fetcher, &["default"]).probe(&domain()).await;

        assert!(!check.exists);
    }

    #[tokio::test]
    async fn test_failed_selector_does_not_abort() {
        let fetcher = StaticFetcher::new()
            .with_timeout("default._domainkey.example.com", RecordType::Txt)
            .with_records(
                "mail._domainkey.example.com",
                RecordType::Txt,
                &["v=DKIM1; k=rsa; p=MIGf"],
            );
        let check = prober(fetcher, &["default", "mail"]).probe(&domain()).await;

        assert!(check.valid);
        assert_eq!(check.records.len(), 1);
        assert_eq!(check.failed_selectors, vec!["default"]);
    }

    #[test]
    fn test_public_key_and_key_type() {
        let finding = DkimFinding {
            selector: "s1".to_string(),
            record: "v=DKIM1; K=RSA; p=MIGf MA0G".to_string(),
        };
        assert!(finding.is_rsa());
        assert_eq!(finding.public_key().as_deref(), Some("MIGfMA0G"));
        assert!(finding.is_usable());

        let keyless = DkimFinding {
            selector: "s1".to_string(),
            record: "v=DKIM1; k=rsa".to_string(),
        };
        assert!(keyless.public_key().is_none());
        assert!(!keyless.is_usable());
    }
}
