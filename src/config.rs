//! Runtime configuration.
//!
//! Values come from a `.env` file (if present), then the process
//! environment, then the OS credential store for the hosted backend's URL and
//! anon key.

use chrono::{FixedOffset, Offset, Utc};
use std::path::PathBuf;
use tracing::info;

use crate::credentials::{self, mask_secret};
use crate::error::{PosError, PosResult};

const DEFAULT_DATA_DIR: &str = "./pos-data";
const DEFAULT_PUBLIC_ORIGIN: &str = "http://localhost:5173";
/// Asia/Bangkok.
const DEFAULT_UTC_OFFSET_MINUTES: i32 = 7 * 60;
const DEFAULT_BCRYPT_COST: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMode {
    /// SQLite under the data dir; accounts are local.
    Local,
    /// Hosted tables, auth and storage.
    Remote { url: String, anon_key: String },
}

#[derive(Debug, Clone)]
pub struct PosConfig {
    pub backend: BackendMode,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Origin used when building QR links to the public ordering page.
    pub public_origin: String,
    pub utc_offset_minutes: i32,
    pub bcrypt_cost: u32,
}

impl PosConfig {
    /// Load from `.env`, the environment, and the OS keyring.
    pub fn from_env() -> PosResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            info!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| match key {
                    "SUPABASE_URL" => credentials::get_credential(credentials::KEY_BACKEND_URL),
                    "SUPABASE_ANON_KEY" => credentials::get_credential(credentials::KEY_ANON_KEY),
                    _ => None,
                })
        })
    }

    /// Build a config from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> PosResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mode = get("POS_BACKEND").unwrap_or_else(|| "local".to_string());
        let backend = match mode.to_ascii_lowercase().as_str() {
            "local" => BackendMode::Local,
            "remote" => {
                let url = get("SUPABASE_URL")
                    .ok_or_else(|| PosError::Config("SUPABASE_URL is required for remote backend".into()))?;
                let anon_key = get("SUPABASE_ANON_KEY").ok_or_else(|| {
                    PosError::Config("SUPABASE_ANON_KEY is required for remote backend".into())
                })?;
                BackendMode::Remote { url, anon_key }
            }
            other => {
                return Err(PosError::Config(format!(
                    "POS_BACKEND must be 'local' or 'remote', got '{other}'"
                )))
            }
        };

        let data_dir = PathBuf::from(get("POS_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()));
        let log_dir = get("POS_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("logs"));

        let public_origin = get("POS_PUBLIC_ORIGIN")
            .unwrap_or_else(|| DEFAULT_PUBLIC_ORIGIN.into())
            .trim_end_matches('/')
            .to_string();

        let utc_offset_minutes = match get("POS_UTC_OFFSET_MINUTES") {
            Some(raw) => raw.parse::<i32>().map_err(|_| {
                PosError::Config(format!("POS_UTC_OFFSET_MINUTES is not a number: {raw}"))
            })?,
            None => DEFAULT_UTC_OFFSET_MINUTES,
        };
        if utc_offset_minutes.abs() >= 24 * 60 {
            return Err(PosError::Config(format!(
                "POS_UTC_OFFSET_MINUTES out of range: {utc_offset_minutes}"
            )));
        }

        let bcrypt_cost = match get("POS_BCRYPT_COST") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|c| (4..=31).contains(c))
                .ok_or_else(|| PosError::Config(format!("POS_BCRYPT_COST must be 4..=31, got {raw}")))?,
            None => DEFAULT_BCRYPT_COST,
        };

        let config = Self {
            backend,
            data_dir,
            log_dir,
            public_origin,
            utc_offset_minutes,
            bcrypt_cost,
        };
        config.log_summary();
        Ok(config)
    }

    /// Display timezone for dates and "today" boundaries.
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    fn log_summary(&self) {
        match &self.backend {
            BackendMode::Local => info!(data_dir = %self.data_dir.display(), "backend: local sqlite"),
            BackendMode::Remote { url, anon_key } => info!(
                url = %url,
                anon_key = %mask_secret(anon_key),
                "backend: remote"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_local_backend() {
        let config = PosConfig::from_lookup(lookup_from(&[])).expect("config");
        assert_eq!(config.backend, BackendMode::Local);
        assert_eq!(config.data_dir, PathBuf::from("./pos-data"));
        assert_eq!(config.log_dir, PathBuf::from("./pos-data").join("logs"));
        assert_eq!(config.utc_offset_minutes, 420);
        assert_eq!(config.display_offset().local_minus_utc(), 7 * 3600);
    }

    #[test]
    fn remote_requires_url_and_key() {
        let missing = PosConfig::from_lookup(lookup_from(&[("POS_BACKEND", "remote")]));
        assert!(matches!(missing, Err(PosError::Config(_))));

        let config = PosConfig::from_lookup(lookup_from(&[
            ("POS_BACKEND", "remote"),
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("POS_PUBLIC_ORIGIN", "https://pos.example.com/"),
        ]))
        .expect("remote config");
        assert_eq!(
            config.backend,
            BackendMode::Remote {
                url: "https://abc.supabase.co".into(),
                anon_key: "anon".into()
            }
        );
        assert_eq!(config.public_origin, "https://pos.example.com");
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(PosConfig::from_lookup(lookup_from(&[("POS_UTC_OFFSET_MINUTES", "abc")])).is_err());
        assert!(PosConfig::from_lookup(lookup_from(&[("POS_UTC_OFFSET_MINUTES", "5000")])).is_err());
        assert!(PosConfig::from_lookup(lookup_from(&[("POS_BCRYPT_COST", "2")])).is_err());
        assert!(PosConfig::from_lookup(lookup_from(&[("POS_BACKEND", "cloud")])).is_err());
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        std::env::set_var("POS_BACKEND", "local");
        std::env::set_var("POS_DATA_DIR", "/tmp/shop-pos-test");
        std::env::set_var("POS_BCRYPT_COST", "4");
        let config = PosConfig::from_env().expect("config from env");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/shop-pos-test"));
        assert_eq!(config.bcrypt_cost, 4);
        std::env::remove_var("POS_BACKEND");
        std::env::remove_var("POS_DATA_DIR");
        std::env::remove_var("POS_BCRYPT_COST");
    }
}
