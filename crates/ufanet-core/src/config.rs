use crate::error::{Error, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://dom.ufanet.ru/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const ENV_CONTRACT: &str = "CONTRACT";
pub const ENV_PASSWORD: &str = "PASSWORD";
pub const ENV_BASE_URL: &str = "UFANET_BASE_URL";
pub const ENV_TIMEOUT: &str = "UFANET_TIMEOUT";
pub const ENV_BIND: &str = "UFANET_BIND";

/// Runtime configuration resolved from environment and optional config file.
#[derive(Clone)]
pub struct Config {
    pub contract: String,
    pub password: String,
    pub base_url: String,
    pub timeout: Duration,
    pub bind: SocketAddr,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ConfigFile {
    contract: Option<String>,
    password: Option<String>,
    base_url: Option<String>,
    timeout: Option<String>,
    bind: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigDoctor {
    pub contract: String,
    pub password_redacted: String,
    pub base_url: String,
    pub timeout: String,
    pub bind: String,
    pub source: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("contract", &self.contract)
            .field("password", &crate::redact::MASK)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("bind", &self.bind)
            .finish()
    }
}

impl Config {
    /// Config for the production API with the given credentials.
    pub fn new(contract: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            password: password.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            bind: default_bind(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn load() -> Result<Self> {
        let file_config = config_path()
            .and_then(|path| fs::read_to_string(path).ok())
            .map(|contents| toml::from_str::<ConfigFile>(&contents))
            .transpose()
            .map_err(|err| Error::InvalidConfig(format!("config parse error: {err}")))?;
        Self::resolve(|key| std::env::var(key).ok(), file_config.as_ref())
    }

    fn resolve(
        env: impl Fn(&str) -> Option<String>,
        file_config: Option<&ConfigFile>,
    ) -> Result<Self> {
        let contract = env(ENV_CONTRACT)
            .or_else(|| file_config.and_then(|c| c.contract.clone()))
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig(format!("{ENV_CONTRACT} is not set")))?;

        let password = env(ENV_PASSWORD)
            .or_else(|| file_config.and_then(|c| c.password.clone()))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::InvalidConfig(format!("{ENV_PASSWORD} is not set")))?;

        let base_url = env(ENV_BASE_URL)
            .or_else(|| file_config.and_then(|c| c.base_url.clone()))
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout = env(ENV_TIMEOUT)
            .or_else(|| file_config.and_then(|c| c.timeout.clone()))
            .map(|raw| {
                humantime::parse_duration(raw.trim())
                    .map_err(|err| Error::InvalidConfig(format!("invalid timeout {raw:?}: {err}")))
            })
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be positive".into()));
        }

        let bind = env(ENV_BIND)
            .or_else(|| file_config.and_then(|c| c.bind.clone()))
            .map(|raw| {
                raw.trim()
                    .parse::<SocketAddr>()
                    .map_err(|err| Error::InvalidConfig(format!("invalid bind {raw:?}: {err}")))
            })
            .transpose()?
            .unwrap_or_else(default_bind);

        Ok(Self {
            contract,
            password,
            base_url,
            timeout,
            bind,
        })
    }

    pub fn doctor(&self) -> ConfigDoctor {
        let source = if std::env::var(ENV_CONTRACT).is_ok() || std::env::var(ENV_PASSWORD).is_ok()
        {
            "environment".to_string()
        } else {
            "config file / defaults".to_string()
        };
        ConfigDoctor {
            contract: self.contract.clone(),
            password_redacted: redact(&self.password),
            base_url: self.base_url.clone(),
            timeout: humantime::format_duration(self.timeout).to_string(),
            bind: self.bind.to_string(),
            source,
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("ufanet").join("config.toml"))
}

fn redact(secret: &str) -> String {
    if secret.len() <= 8 {
        return "****".to_string();
    }
    let tail: usize = secret.chars().rev().take(2).map(char::len_utf8).sum();
    format!("****{}", &secret[secret.len() - tail..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn environment_wins_over_file() {
        let file = ConfigFile {
            contract: Some("file-contract".into()),
            password: Some("file-pass".into()),
            base_url: Some("https://file.example/".into()),
            timeout: Some("10s".into()),
            bind: None,
        };
        let cfg = Config::resolve(
            env_from(&[(ENV_CONTRACT, "env-contract"), (ENV_TIMEOUT, "2m")]),
            Some(&file),
        )
        .unwrap();
        assert_eq!(cfg.contract, "env-contract");
        assert_eq!(cfg.password, "file-pass");
        assert_eq!(cfg.base_url, "https://file.example/");
        assert_eq!(cfg.timeout, Duration::from_secs(120));
        assert_eq!(cfg.bind.to_string(), DEFAULT_BIND);
    }

    #[test]
    fn defaults_apply_when_only_credentials_given() {
        let cfg = Config::resolve(
            env_from(&[(ENV_CONTRACT, "C-1"), (ENV_PASSWORD, "pw")]),
            None,
        )
        .unwrap();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn missing_contract_is_rejected() {
        let err = Config::resolve(env_from(&[(ENV_PASSWORD, "pw")]), None).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(msg) if msg.contains(ENV_CONTRACT)));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err = Config::resolve(
            env_from(&[
                (ENV_CONTRACT, "C-1"),
                (ENV_PASSWORD, "pw"),
                (ENV_TIMEOUT, "soon"),
            ]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn debug_and_doctor_hide_password() {
        let cfg = Config::new("C-1", "very-secret-pw");
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("very-secret-pw"));
        let doctor = cfg.doctor();
        assert_eq!(doctor.password_redacted, "****pw");
    }
}
