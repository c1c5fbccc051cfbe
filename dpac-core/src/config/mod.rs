//! Configuration management

pub mod loader;
pub mod schema;
pub mod validator;

pub use loader::ConfigLoader;
pub use schema::{CommonConfig, ConditionConfig, Config, NetworkEntry, Profile, RuleConfig};
pub use validator::ConfigValidator;
