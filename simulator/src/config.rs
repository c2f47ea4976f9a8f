//! Simulator settings, read from the environment.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use pn7150::Config;

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub driver: Config,
    /// How many times to run the whole handshake before giving up
    pub attempts: u32,
    /// Number of leading attempts whose CORE_RESET the chip rejects
    pub reject_resets: u32,
}

impl SimConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut driver = Config::default();
        if let Some(raw) = lookup("PN7150_ADDRESS") {
            driver = driver.with_address(parse_address(&raw)?);
        }
        if let Some(raw) = lookup("PN7150_RESPONSE_TIMEOUT_MS") {
            let timeout = match raw.trim() {
                "" | "none" => None,
                value => Some(parse("PN7150_RESPONSE_TIMEOUT_MS", value)?),
            };
            driver = driver.with_response_timeout(timeout);
        }
        if let Some(raw) = lookup("PN7150_POLL_SLICE_MS") {
            driver = driver.with_poll_slice(parse("PN7150_POLL_SLICE_MS", &raw)?);
        }

        let attempts = match lookup("SIM_ATTEMPTS") {
            Some(raw) => parse::<u32>("SIM_ATTEMPTS", &raw)?.max(1),
            None => 3,
        };
        let reject_resets = match lookup("SIM_REJECT_RESETS") {
            Some(raw) => parse("SIM_REJECT_RESETS", &raw)?,
            None => 1,
        };

        Ok(Self {
            driver,
            attempts,
            reject_resets,
        })
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("invalid {key}: {raw:?}"))
}

/// Accepts `0x28` or `40`.
fn parse_address(raw: &str) -> Result<u8> {
    let raw = raw.trim();
    let address = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse(),
    }
    .with_context(|| format!("invalid PN7150_ADDRESS: {raw:?}"))?;
    anyhow::ensure!(address < 0x80, "PN7150_ADDRESS 0x{address:02x} is not a 7-bit address");
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<SimConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SimConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.driver, Config::default());
        assert_eq!(config.attempts, 3);
        assert_eq!(config.reject_resets, 1);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PN7150_ADDRESS", "0x29"),
            ("PN7150_RESPONSE_TIMEOUT_MS", "100"),
            ("PN7150_POLL_SLICE_MS", "2"),
            ("SIM_ATTEMPTS", "0"),
        ])
        .unwrap();
        assert_eq!(config.driver.address, 0x29);
        assert_eq!(config.driver.response_timeout_ms, Some(100));
        assert_eq!(config.driver.poll_slice_ms, 2);
        assert_eq!(config.attempts, 1);
    }

    #[test]
    fn test_decimal_address_and_unbounded_timeout() {
        let config = load(&[("PN7150_ADDRESS", "40"), ("PN7150_RESPONSE_TIMEOUT_MS", "none")]).unwrap();
        assert_eq!(config.driver.address, 0x28);
        assert_eq!(config.driver.response_timeout_ms, None);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(load(&[("PN7150_ADDRESS", "0x80")]).is_err());
        assert!(load(&[("PN7150_ADDRESS", "nfc")]).is_err());
        assert!(load(&[("SIM_REJECT_RESETS", "-1")]).is_err());
    }
}
