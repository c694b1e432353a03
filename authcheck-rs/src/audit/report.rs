use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::authentication::{CheckOutcome, DkimCheck, DmarcCheck, SpfCheck};
use crate::dns::DomainName;
use crate::smtp::RelayProbeResult;

/// Recommendation list when nothing needs fixing
pub const ALL_GOOD: &str = "All records are properly configured";

/// Full audit of one domain, serialized as the API response
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationReport {
    pub domain: DomainName,
    pub checked_at: DateTime<Utc>,
    pub checks: Checks,
    pub email_relay: EmailRelay,
    pub summary: Summary,
}

#[derive(Debug, Clone, Serialize)]
pub struct Checks {
    pub spf: SpfCheck,
    pub dkim: DkimCheck,
    pub dmarc: DmarcCheck,
    pub mx: MxCheck,
}

/// Mail exchangers of the audited domain, by preference
#[derive(Debug, Clone, Default, Serialize)]
pub struct MxCheck {
    pub exists: bool,
    pub records: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// MX and A presence for one name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostRecords {
    pub mx_exists: bool,
    pub a_exists: bool,
    pub mx_records: Vec<String>,
    pub a_records: Vec<String>,
    pub configured: bool,
}

impl HostRecords {
    pub fn new(mx_records: Vec<String>, a_records: Vec<String>) -> Self {
        let mx_exists = !mx_records.is_empty();
        let a_exists = !a_records.is_empty();
        Self {
            mx_exists,
            a_exists,
            mx_records,
            a_records,
            configured: mx_exists || a_exists,
        }
    }
}

/// Relay exposure findings
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmailRelay {
    pub probes: Vec<RelayProbeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub base_domain: HostRecords,
    /// Conventional mail subdomains keyed by label
    pub subdomains: BTreeMap<String, HostRecords>,
    pub overall_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub all_pass: bool,
    pub recommendations: Vec<String>,
}

impl Summary {
    /// Verdict over the authentication checks plus relay advisories.
    ///
    /// `all_pass` only looks at `checks`; relay findings add
    /// recommendations but never flip the verdict.
    pub fn build(checks: &[&dyn CheckOutcome], probes: &[RelayProbeResult]) -> Self {
        let all_pass = checks.iter().all(|c| c.valid());

        let mut recommendations: Vec<String> = checks
            .iter()
            .filter(|c| !c.valid())
            .map(|c| c.remediation().to_string())
            .collect();

        for probe in probes {
            if probe.relay_accepted {
                recommendations.push(format!(
                    "Mail exchanger {} accepted a relay attempt; \
                     restrict relaying to authenticated senders",
                    probe.host
                ));
            } else if probe.greeted && !probe.starttls_offered {
                recommendations.push(format!(
                    "Mail exchanger {} does not offer STARTTLS",
                    probe.host
                ));
            }
        }

        if recommendations.is_empty() {
            recommendations.push(ALL_GOOD.to_string());
        }

        Self {
            all_pass,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spf(valid: bool) -> SpfCheck {
        SpfCheck {
            exists: true,
            valid,
            ..Default::default()
        }
    }

    fn dkim(valid: bool) -> DkimCheck {
        DkimCheck {
            exists: valid,
            valid,
            ..Default::default()
        }
    }

    fn dmarc(valid: bool) -> DmarcCheck {
        DmarcCheck {
            exists: true,
            valid,
            ..Default::default()
        }
    }

    #[test]
    fn test_all_valid_gives_sentinel() {
        let (s, k, d) = (spf(true), dkim(true), dmarc(true));
        let summary = Summary::build(&[&s, &k, &d], &[]);

        assert!(summary.all_pass);
        assert_eq!(summary.recommendations, vec![ALL_GOOD]);
    }

    #[test]
    fn test_one_recommendation_per_failing_check() {
        let (s, k, d) = (spf(false), dkim(true), dmarc(false));
        let summary = Summary::build(&[&s, &k, &d], &[]);

        assert!(!summary.all_pass);
        assert_eq!(
            summary.recommendations,
            vec![s.remediation().to_string(), d.remediation().to_string()]
        );
    }

    #[test]
    fn test_relay_findings_do_not_change_verdict() {
        let (s, k, d) = (spf(true), dkim(true), dmarc(true));
        let probes = vec![
            RelayProbeResult {
                host: "open.example.com".into(),
                port: 25,
                connected: true,
                starttls_offered: true,
                relay_accepted: true,
                ..Default::default()
            },
            RelayProbeResult {
                host: "plain.example.com".into(),
                port: 25,
                connected: true,
                greeted: true,
                ..Default::default()
            },
            RelayProbeResult {
                host: "down.example.com".into(),
                port: 25,
                ..Default::default()
            },
        ];
        let summary = Summary::build(&[&s, &k, &d], &probes);

        assert!(summary.all_pass);
        assert_eq!(summary.recommendations.len(), 2);
        assert!(summary.recommendations[0].contains("open.example.com"));
        assert!(summary.recommendations[1].contains("does not offer STARTTLS"));
    }

    #[test]
    fn test_no_starttls_advice_without_capabilities() {
        let (s, k, d) = (spf(true), dkim(true), dmarc(true));
        let attempts = vec![RelayProbeResult {
            host: "refusing.example.com".into(),
            port: 25,
            connected: true,
            banner: Some("554 5.7.1 No service".into()),
            detail: Some("Greeting refused: 554 5.7.1 No service".into()),
            ..Default::default()
        }];
        let summary = Summary::build(&[&s, &k, &d], &attempts);

        assert_eq!(summary.recommendations, vec![ALL_GOOD]);
    }

    #[test]
    fn test_host_records_configured() {
        assert!(HostRecords::new(vec!["mx.example.com".into()], vec![]).configured);
        assert!(HostRecords::new(vec![], vec!["192.0.2.1".into()]).configured);
        assert!(!HostRecords::new(vec![], vec![]).configured);
    }
}
