//! Minimal runtime configuration helpers.
//! Defaults expect `haier.json` in the working directory.

use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "haier.json";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// JSON document declaring peripherals and climate entries.
    pub config_path: PathBuf,
    /// Stop after validation and wiring; skip setup.
    pub validate_only: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let config_path = match lookup("HAIER_CONFIG") {
            Some(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        };

        let validate_only = match lookup("VALIDATE_ONLY") {
            None => false,
            Some(s) => match s.trim() {
                "1" | "true" | "TRUE" => true,
                "" | "0" | "false" | "FALSE" => false,
                other => return Err(format!("VALIDATE_ONLY must be a boolean, got \"{}\"", other)),
            },
        };

        Ok(Config {
            config_path,
            validate_only,
        })
    }
}
