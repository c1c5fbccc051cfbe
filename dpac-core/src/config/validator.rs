//! Configuration validation

use super::schema::Config;
use crate::error::{Result, ValidationError};
use crate::networks::NetworkMatch;
use crate::rules::RuleSet;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate entire configuration
    pub fn validate(config: &Config) -> Result<()> {
        Self::validate_profiles(config)?;
        Self::validate_networks(config)?;
        Self::validate_default_profile(config)?;
        Ok(())
    }

    /// Every profile must compile: valid subnets, patterns, directives and a fallback
    fn validate_profiles(config: &Config) -> Result<()> {
        for (name, profile) in &config.profiles {
            RuleSet::compile(name, profile)?;
        }
        Ok(())
    }

    /// Every route needs a valid network and exactly one existing target
    fn validate_networks(config: &Config) -> Result<()> {
        for entry in &config.networks {
            entry.cidr.parse::<NetworkMatch>()?;

            match (&entry.profile, &entry.pac_file) {
                (Some(profile), None) => {
                    if !config.profiles.contains_key(profile) {
                        return Err(ValidationError::UnknownProfile {
                            profile: format!("{} (network {})", profile, entry.cidr),
                        }
                        .into());
                    }
                }
                (None, Some(_)) => {}
                _ => {
                    return Err(ValidationError::InvalidRoute {
                        route: format!("{} needs exactly one of profile or pac_file", entry.cidr),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }

    fn validate_default_profile(config: &Config) -> Result<()> {
        let name = &config.common.default_profile;
        if !config.profiles.contains_key(name) {
            return Err(ValidationError::UnknownProfile {
                profile: format!("{} (default_profile)", name),
            }
            .into());
        }
        Ok(())
    }
}
