//! Configuration schema types

use crate::rules::ResolveFailure;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Complete dpac configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub common: CommonConfig,
    /// Named rule profiles, in declaration order
    #[serde(default)]
    pub profiles: IndexMap<String, Profile>,
    /// Client network routes, first match wins
    #[serde(default)]
    pub networks: Vec<NetworkEntry>,
}

/// Settings shared by every subcommand
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommonConfig {
    #[serde(default = "default_config_version")]
    pub config_version: String,
    #[serde(default)]
    pub verbose: bool,
    /// Profile used by `decide` and `render` when none is named
    #[serde(default = "default_profile")]
    pub default_profile: String,
    /// Local address override for `my_ip` rules
    #[serde(default)]
    pub my_ip: Option<Ipv4Addr>,
}

fn default_config_version() -> String {
    "1.0".to_string()
}

fn default_profile() -> String {
    "proxy1".to_string()
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            verbose: false,
            default_profile: default_profile(),
            my_ip: None,
        }
    }
}

/// An ordered rule list with a fallback decision
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    /// Directives returned when no rule matches, e.g. `["PROXY host:3128"]`
    #[serde(default)]
    pub fallback: Vec<String>,
    #[serde(default)]
    pub on_resolve_failure: ResolveFailure,
}

/// One rule: a condition plus the decision returned when it matches
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    #[serde(flatten)]
    pub condition: ConditionConfig,
    #[serde(default = "default_action")]
    pub action: String,
}

fn default_action() -> String {
    "DIRECT".to_string()
}

/// Rule condition as written in TOML, discriminated by `kind`
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionConfig {
    PlainHost,
    DnsDomainIs {
        domain: String,
    },
    InNet {
        #[serde(default)]
        network: Option<String>,
        #[serde(default)]
        mask: Option<String>,
        /// Alternative to network/mask: `a.b.c.d/bits`
        #[serde(default)]
        cidr: Option<String>,
    },
    MyIp,
    ShExpMatch {
        pattern: String,
        #[serde(default)]
        subject: SubjectConfig,
    },
    Always,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SubjectConfig {
    #[default]
    Host,
    Url,
}

/// Maps a client network to the PAC it is served
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkEntry {
    /// `a.b.c.d/bits`, or `*` for every client
    pub cidr: String,
    /// Render this profile
    #[serde(default)]
    pub profile: Option<String>,
    /// Serve this file verbatim
    #[serde(default)]
    pub pac_file: Option<PathBuf>,
}
