//! Process configuration, read once at startup and passed explicitly to the gate,
//! the services and the router.
use anyhow::{Context, bail};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DATABASE_PATH: &str = "data/payments.db";
pub const DEFAULT_VERIFIER_ID: &str = "admin";
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: usize = 30;
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    pub admin_token: String,
    pub verifier_id: String,
    pub allowed_origins: Vec<String>,
    pub rate_limit_per_minute: usize,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; unset or blank keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        // compared byte for byte, so kept untrimmed
        let Some(admin_token) = lookup("ADMIN_TOKEN").filter(|v| !v.trim().is_empty()) else {
            bail!("ADMIN_TOKEN must be set to a non-empty secret");
        };

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned())
            .parse::<SocketAddr>()
            .context("BIND_ADDR is not a socket address")?;

        let rate_limit_per_minute = match var("RATE_LIMIT_PER_MINUTE") {
            Some(v) => v.parse::<usize>().context("RATE_LIMIT_PER_MINUTE is not a number")?,
            None => DEFAULT_RATE_LIMIT_PER_MINUTE,
        };
        if rate_limit_per_minute == 0 {
            bail!("RATE_LIMIT_PER_MINUTE must be at least 1");
        }

        let max_body_bytes = match var("MAX_BODY_BYTES") {
            Some(v) => v.parse::<usize>().context("MAX_BODY_BYTES is not a number")?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            database_path: var("DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_owned())
                .into(),
            admin_token,
            verifier_id: var("VERIFIER_ID").unwrap_or_else(|| DEFAULT_VERIFIER_ID.to_owned()),
            allowed_origins,
            rate_limit_per_minute,
            max_body_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("ADMIN_TOKEN", "s3cret")]).unwrap();

        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(cfg.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
        assert_eq!(cfg.verifier_id, DEFAULT_VERIFIER_ID);
        assert_eq!(cfg.rate_limit_per_minute, DEFAULT_RATE_LIMIT_PER_MINUTE);
        assert_eq!(cfg.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert!(cfg.allowed_origins.is_empty());
    }

    #[test]
    fn admin_token_is_required() {
        assert!(config(&[]).is_err());
        assert!(config(&[("ADMIN_TOKEN", "   ")]).is_err());
    }

    #[test]
    fn admin_token_is_kept_verbatim() {
        let cfg = config(&[("ADMIN_TOKEN", " s3cret ")]).unwrap();

        assert_eq!(cfg.admin_token, " s3cret ");
        assert!(!crate::gate::token_matches(Some("s3cret"), &cfg.admin_token));
        assert!(crate::gate::token_matches(Some(" s3cret "), &cfg.admin_token));
    }

    #[test]
    fn parses_origin_list_and_limits() {
        let cfg = config(&[
            ("ADMIN_TOKEN", "s3cret"),
            ("ALLOWED_ORIGINS", "https://shop.example, https://admin.example,"),
            ("RATE_LIMIT_PER_MINUTE", "5"),
            ("MAX_BODY_BYTES", "2048"),
            ("BIND_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();

        assert_eq!(
            cfg.allowed_origins,
            vec!["https://shop.example", "https://admin.example"]
        );
        assert_eq!(cfg.rate_limit_per_minute, 5);
        assert_eq!(cfg.max_body_bytes, 2048);
        assert_eq!(cfg.bind_addr.port(), 9000);
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!(config(&[("ADMIN_TOKEN", "s3cret"), ("RATE_LIMIT_PER_MINUTE", "lots")]).is_err());
        assert!(config(&[("ADMIN_TOKEN", "s3cret"), ("RATE_LIMIT_PER_MINUTE", "0")]).is_err());
    }
}
