//! Error types for PAC configuration and delivery

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PacError>;

#[derive(Debug, Error)]
pub enum PacError {
    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Profile not found: {profile}")]
    ProfileNotFound { profile: String },

    #[error("No network route matches client {client}")]
    NoRoute { client: String },

    #[error("Invalid client address: {addr}")]
    InvalidClient { addr: String },

    #[error("Failed to load config from {path}: {source}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to read PAC file {path}: {source}")]
    PacFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read network table {path}: {source}")]
    NetworkTable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("URL has no host: {url}")]
    NoHost { url: String },

    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid subnet: {subnet}")]
    InvalidSubnet { subnet: String },

    #[error("Invalid IPv4 address: {addr}")]
    InvalidAddress { addr: String },

    #[error("Invalid wildcard pattern: {pattern}")]
    InvalidPattern { pattern: String },

    #[error("Invalid proxy directive: {directive}")]
    InvalidDirective { directive: String },

    #[error("Unknown profile reference: {profile}")]
    UnknownProfile { profile: String },

    #[error("Profile {profile} has an empty fallback")]
    EmptyFallback { profile: String },

    #[error("Invalid network route: {route}")]
    InvalidRoute { route: String },
}
