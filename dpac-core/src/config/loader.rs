//! Configuration file loading and merging

use super::schema::Config;
use crate::error::{PacError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const BUILTIN_TOML: &str = include_str!("../builtin-profiles.toml");

pub struct ConfigLoader;

impl ConfigLoader {
    /// Find user config by checking environment and standard locations
    pub fn find_user_config() -> Option<PathBuf> {
        // 1. $DPAC_CONFIG
        if let Ok(path) = env::var("DPAC_CONFIG") {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }

        // 2. $XDG_CONFIG_HOME/dpac/config.toml
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            let p = PathBuf::from(xdg).join("dpac/config.toml");
            if p.exists() {
                return Some(p);
            }
        }

        // 3. ~/.config/dpac/config.toml
        if let Ok(home) = env::var("HOME") {
            let p = PathBuf::from(home).join(".config/dpac/config.toml");
            if p.exists() {
                return Some(p);
            }
        }

        None
    }

    /// Load config from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| PacError::ConfigLoad {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load built-in configuration embedded in the binary
    pub fn load_builtin() -> Result<Config> {
        let config: Config = toml::from_str(BUILTIN_TOML)?;
        Ok(config)
    }

    /// Merge user config on top of built-in config
    /// Profiles are extended or replaced by name; a non-empty network list
    /// replaces the built-in routes since route order is significant
    pub fn merge_configs(mut base: Config, user: Config) -> Config {
        for (name, profile) in user.profiles {
            base.profiles.insert(name, profile);
        }

        if !user.networks.is_empty() {
            base.networks = user.networks;
        }

        base.common = user.common;

        base
    }

    /// Load config with built-in as lowest-priority fallback
    /// Priority: User config > Built-in config
    pub fn load_with_builtins() -> Result<Config> {
        let builtin = Self::load_builtin()?;

        match Self::find_user_config() {
            Some(path) => {
                tracing::debug!("Loading user config from {:?}", path);
                let user = Self::load_from_file(&path)?;
                Ok(Self::merge_configs(builtin, user))
            }
            None => {
                tracing::debug!("No user config found, using built-in defaults");
                Ok(builtin)
            }
        }
    }

    /// Load config from optional path or default with built-in merge
    /// Priority: Explicit path > User config > Built-in config
    pub fn load_or_default(path: Option<PathBuf>) -> Result<Config> {
        if let Some(p) = path {
            let user = Self::load_from_file(&p)?;
            let builtin = Self::load_builtin()?;
            Ok(Self::merge_configs(builtin, user))
        } else {
            Self::load_with_builtins()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ConditionConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.common.config_version, "1.0");
        assert_eq!(config.common.default_profile, "proxy1");
        assert!(!config.common.verbose);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_builtin_profile() {
        let config = ConfigLoader::load_builtin().unwrap();
        let profile = &config.profiles["proxy1"];
        assert_eq!(profile.rules.len(), 7);
        assert_eq!(profile.rules[0].condition, ConditionConfig::PlainHost);
        assert_eq!(profile.rules[6].condition, ConditionConfig::MyIp);
        assert!(profile.rules.iter().all(|r| r.action == "DIRECT"));
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.networks[0].cidr, "*");
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[common]
verbose = true
default_profile = "branch"
my_ip = "10.20.0.5"

[profiles.branch]
description = "Branch office"
on_resolve_failure = "fallback"
fallback = ["SOCKS5 gw.branch.example.org:1080"]

[[profiles.branch.rules]]
kind = "sh_exp_match"
pattern = "*.branch.example.org"

[[profiles.branch.rules]]
kind = "in_net"
cidr = "10.20.0.0/16"
action = "PROXY local.branch.example.org:3128"

[[networks]]
cidr = "10.20.0.0/16"
profile = "branch"

[[networks]]
cidr = "*"
pac_file = "/srv/pac/default.js"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.common.verbose);
        assert_eq!(config.common.my_ip, Some("10.20.0.5".parse().unwrap()));
        let branch = &config.profiles["branch"];
        assert_eq!(branch.rules.len(), 2);
        assert_eq!(branch.rules[1].action, "PROXY local.branch.example.org:3128");
        assert_eq!(
            branch.rules[1].condition,
            ConditionConfig::InNet {
                network: None,
                mask: None,
                cidr: Some("10.20.0.0/16".to_string()),
            }
        );
        assert_eq!(config.networks[1].pac_file, Some(PathBuf::from("/srv/pac/default.js")));
    }

    #[test]
    fn test_merge_keeps_builtin_profiles() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[profiles.lab]
fallback = ["DIRECT"]

[[networks]]
cidr = "10.9.0.0/16"
profile = "lab"
"#
        )
        .unwrap();

        let config = ConfigLoader::load_or_default(Some(file.path().to_path_buf())).unwrap();
        assert!(config.profiles.contains_key("proxy1"));
        assert!(config.profiles.contains_key("lab"));
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.networks[0].profile.as_deref(), Some("lab"));
    }

    #[test]
    fn test_merge_without_networks_keeps_builtin_routes() {
        let builtin = ConfigLoader::load_builtin().unwrap();
        let merged = ConfigLoader::merge_configs(builtin, Config::default());
        assert_eq!(merged.networks.len(), 1);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = ConfigLoader::load_from_file("/nonexistent/dpac.toml").unwrap_err();
        assert!(matches!(err, PacError::ConfigLoad { .. }));
        assert!(err.to_string().contains("/nonexistent/dpac.toml"));
    }
}
