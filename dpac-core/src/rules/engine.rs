//! First-match-wins rule evaluation

use super::decision::Decision;
use super::matcher::{Condition, HostPattern, HostProbe, MatchSubject, Outcome};
use super::subnet::SubnetRule;
use crate::config::schema::{ConditionConfig, Profile, RuleConfig, SubjectConfig};
use crate::error::{PacError, Result, ValidationError};
use crate::host::HostEnvironment;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// What to do when a subnet rule cannot resolve the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveFailure {
    /// Treat the rule as not matching and continue
    #[default]
    FallThrough,
    /// Stop and return the profile's fallback
    Fallback,
}

/// A condition and the decision it produces
#[derive(Debug, Clone)]
pub struct Rule {
    pub condition: Condition,
    pub action: Decision,
}

impl Rule {
    pub fn new(condition: Condition, action: Decision) -> Self {
        Self { condition, action }
    }

    pub fn direct(condition: Condition) -> Self {
        Self::new(condition, Decision::Direct)
    }

    /// Build a rule from its config form
    pub fn compile(config: &RuleConfig) -> std::result::Result<Self, ValidationError> {
        let condition = match &config.condition {
            ConditionConfig::PlainHost => Condition::PlainHost,
            ConditionConfig::DnsDomainIs { domain } => {
                if domain.is_empty() {
                    return Err(ValidationError::InvalidPattern {
                        pattern: domain.clone(),
                    });
                }
                Condition::DnsDomainIs(domain.clone())
            }
            ConditionConfig::InNet {
                network,
                mask,
                cidr,
            } => Condition::InNet(compile_subnet(network, mask, cidr)?),
            ConditionConfig::MyIp => Condition::MyIp,
            ConditionConfig::ShExpMatch { pattern, subject } => {
                if pattern.is_empty() || pattern.contains('\0') || pattern.contains('\n') {
                    return Err(ValidationError::InvalidPattern {
                        pattern: pattern.clone(),
                    });
                }
                match subject {
                    SubjectConfig::Host => Condition::ShExpMatch {
                        subject: MatchSubject::Host,
                        pattern: HostPattern::new(&pattern.to_ascii_lowercase()),
                    },
                    SubjectConfig::Url => Condition::ShExpMatch {
                        subject: MatchSubject::Url,
                        pattern: HostPattern::new(pattern),
                    },
                }
            }
            ConditionConfig::Always => Condition::Always,
        };

        Ok(Self::new(condition, config.action.parse()?))
    }
}

fn compile_subnet(
    network: &Option<String>,
    mask: &Option<String>,
    cidr: &Option<String>,
) -> std::result::Result<SubnetRule, ValidationError> {
    match (network, mask, cidr) {
        (Some(network), Some(mask), None) => SubnetRule::from_parts(network, mask),
        (None, None, Some(cidr)) => cidr.parse(),
        _ => Err(ValidationError::InvalidSubnet {
            subnet: format!(
                "network={:?} mask={:?} cidr={:?} (use network+mask or cidr)",
                network, mask, cidr
            ),
        }),
    }
}

/// An ordered rule list evaluated first-match-wins
#[derive(Debug, Clone)]
pub struct RuleSet {
    name: String,
    rules: Vec<Rule>,
    fallback: Decision,
    on_resolve_failure: ResolveFailure,
}

impl RuleSet {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>, fallback: Decision) -> Self {
        Self {
            name: name.into(),
            rules,
            fallback,
            on_resolve_failure: ResolveFailure::default(),
        }
    }

    pub fn with_resolve_failure(mut self, policy: ResolveFailure) -> Self {
        self.on_resolve_failure = policy;
        self
    }

    /// Compile a named profile
    pub fn from_profile(name: &str, profiles: &IndexMap<String, Profile>) -> Result<Self> {
        let profile = profiles.get(name).ok_or_else(|| PacError::ProfileNotFound {
            profile: name.to_string(),
        })?;
        Ok(Self::compile(name, profile)?)
    }

    pub fn compile(name: &str, profile: &Profile) -> std::result::Result<Self, ValidationError> {
        let rules = profile
            .rules
            .iter()
            .map(Rule::compile)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if profile.fallback.is_empty() {
            return Err(ValidationError::EmptyFallback {
                profile: name.to_string(),
            });
        }
        let fallback = Decision::try_from(profile.fallback.as_slice())?;

        Ok(Self::new(name, rules, fallback).with_resolve_failure(profile.on_resolve_failure))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn fallback(&self) -> &Decision {
        &self.fallback
    }

    pub fn on_resolve_failure(&self) -> ResolveFailure {
        self.on_resolve_failure
    }

    /// Decide how a connection to `host` (requested as `url`) should be made
    pub fn decide(&self, url: &str, host: &str, env: &dyn HostEnvironment) -> Decision {
        let probe = HostProbe::new(url, host, env);

        for (index, rule) in self.rules.iter().enumerate() {
            match rule.condition.evaluate(&probe) {
                Outcome::Match => {
                    debug!(
                        "{}: rule {} ({:?}) matched {}",
                        self.name, index, rule.condition, host
                    );
                    return rule.action.clone();
                }
                Outcome::NoMatch => {}
                Outcome::Unresolved => {
                    if self.on_resolve_failure == ResolveFailure::Fallback {
                        debug!(
                            "{}: could not resolve {}, using fallback",
                            self.name, host
                        );
                        return self.fallback.clone();
                    }
                }
            }
        }

        debug!("{}: no rule matched {}, using fallback", self.name, host);
        self.fallback.clone()
    }

    /// Like [`decide`](Self::decide), taking the host from the URL
    pub fn decide_url(&self, url: &str, env: &dyn HostEnvironment) -> Result<Decision> {
        let host = host_from_url(url)?;
        Ok(self.decide(url, &host, env))
    }

    /// Render as a `FindProxyForURL` script
    pub fn to_script(&self) -> String {
        crate::pac::render_script(self)
    }
}

/// Extract the host a PAC client would pass alongside `url`
pub fn host_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|source| PacError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    parsed
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| PacError::NoHost {
            url: url.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use crate::host::StaticHost;
    use std::net::Ipv4Addr;

    const FALLBACK: &str = "PROXY proxy1.example.com:3128; PROXY proxy1b.example.com:3128";

    fn builtin() -> RuleSet {
        let config = ConfigLoader::load_builtin().unwrap();
        RuleSet::from_profile("proxy1", &config.profiles).unwrap()
    }

    fn env() -> StaticHost {
        StaticHost::new()
            .with_host("www.external.com", Ipv4Addr::new(93, 184, 216, 34))
            .with_host("files.lan", Ipv4Addr::new(192, 168, 4, 2))
            .with_host("workstation.corp.net", Ipv4Addr::new(198, 51, 100, 20))
            .with_my_ip(Ipv4Addr::new(198, 51, 100, 20))
    }

    #[test]
    fn test_plain_hosts_are_direct() {
        let rules = builtin();
        for host in ["localhost", "intranet", "wiki", ""] {
            assert!(rules.decide("http://x/", host, &env()).is_direct(), "{host}");
        }
    }

    #[test]
    fn test_example_com_suffix_is_direct() {
        let rules = builtin();
        for host in ["www.example.com", "a.b.example.com", "PROXY1.EXAMPLE.COM"] {
            assert!(rules.decide("http://x/", host, &env()).is_direct(), "{host}");
        }
    }

    #[test]
    fn test_private_and_loopback_ranges_are_direct() {
        let rules = builtin();
        for host in ["10.1.2.3", "172.16.0.1", "172.31.0.1", "192.168.0.10", "127.0.0.1", "files.lan"] {
            assert!(rules.decide("http://x/", host, &env()).is_direct(), "{host}");
        }
    }

    #[test]
    fn test_outside_172_16_slash_12_is_proxied() {
        let rules = builtin();
        assert_eq!(rules.decide("http://x/", "172.32.0.1", &env()).to_string(), FALLBACK);
    }

    #[test]
    fn test_own_address_is_direct() {
        let rules = builtin();
        assert!(rules.decide("http://x/", "198.51.100.20", &env()).is_direct());
        assert!(rules
            .decide("http://x/", "workstation.corp.net", &env())
            .is_direct());
        assert!(!rules.decide("http://x/", "198.51.100.21", &env()).is_direct());
    }

    #[test]
    fn test_external_host_gets_proxy_list() {
        let rules = builtin();
        let decision = rules.decide("http://www.external.com/", "www.external.com", &env());
        assert_eq!(decision.to_string(), FALLBACK);
    }

    #[test]
    fn test_unresolvable_falls_through_to_fallback() {
        let rules = builtin();
        let decision = rules.decide("http://x/", "nowhere.invalid", &env());
        assert_eq!(decision.to_string(), FALLBACK);
    }

    #[test]
    fn test_resolve_failure_fallback_policy_stops_early() {
        let rules = RuleSet::new(
            "strict",
            vec![
                Rule::direct(Condition::InNet("10.0.0.0/8".parse().unwrap())),
                Rule::direct(Condition::Always),
            ],
            "PROXY p.example.net:8080".parse().unwrap(),
        );

        assert!(rules.decide("http://x/", "nowhere.invalid", &env()).is_direct());

        let strict = rules.with_resolve_failure(ResolveFailure::Fallback);
        assert_eq!(
            strict.decide("http://x/", "nowhere.invalid", &env()).to_string(),
            "PROXY p.example.net:8080"
        );
        assert!(strict.decide("http://x/", "8.8.8.8", &env()).is_direct());
    }

    #[test]
    fn test_rule_order_first_match_wins() {
        let rules = RuleSet::new(
            "ordered",
            vec![
                Rule::new(
                    Condition::DnsDomainIs(".corp.net".to_string()),
                    "SOCKS5 socks.corp.net:1080".parse().unwrap(),
                ),
                Rule::direct(Condition::MyIp),
            ],
            Decision::Direct,
        );
        let decision = rules.decide("http://x/", "workstation.corp.net", &env());
        assert_eq!(decision.to_string(), "SOCKS5 socks.corp.net:1080");
    }

    #[test]
    fn test_decide_url_extracts_host() {
        let rules = builtin();
        assert!(rules
            .decide_url("https://intranet:8443/login", &env())
            .unwrap()
            .is_direct());
        assert_eq!(
            rules
                .decide_url("http://www.external.com/index.html", &env())
                .unwrap()
                .to_string(),
            FALLBACK
        );
        // hosts taken from a URL arrive lowercased, as a browser passes them
        assert_eq!(host_from_url("http://WWW.Example.COM/").unwrap(), "www.example.com");
        assert!(rules
            .decide_url("http://WWW.Example.COM/", &env())
            .unwrap()
            .is_direct());
        assert!(rules.decide_url("not a url", &env()).is_err());
        assert!(rules.decide_url("mailto:user@example.com", &env()).is_err());
    }

    #[test]
    fn test_compile_rejects_ambiguous_subnet() {
        let config = RuleConfig {
            condition: ConditionConfig::InNet {
                network: Some("10.0.0.0".to_string()),
                mask: None,
                cidr: Some("10.0.0.0/8".to_string()),
            },
            action: "DIRECT".to_string(),
        };
        assert!(Rule::compile(&config).is_err());
    }

    #[test]
    fn test_compile_rejects_empty_fallback() {
        let profile = Profile {
            description: String::new(),
            rules: vec![],
            fallback: vec![],
            on_resolve_failure: ResolveFailure::FallThrough,
        };
        assert_eq!(
            RuleSet::compile("empty", &profile).unwrap_err(),
            ValidationError::EmptyFallback {
                profile: "empty".to_string()
            }
        );
    }

    #[test]
    fn test_profile_not_found() {
        let config = ConfigLoader::load_builtin().unwrap();
        assert!(matches!(
            RuleSet::from_profile("missing", &config.profiles),
            Err(PacError::ProfileNotFound { .. })
        ));
    }
}
