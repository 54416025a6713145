//! Harness configuration

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, HarnessError, HarnessResult};
use crate::spec::{ANONYMOUS_PROFILE, DEFAULT_PROFILE};

/// Service under test when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "https://api.qa.2plus6.uz/api/v1/";

/// Overrides `base_url` from the environment
pub const BASE_URL_ENV: &str = "APICHECK_BASE_URL";
pub const PASSWORD_ENV: &str = "APICHECK_PASSWORD";
pub const PHONE_ENV: &str = "APICHECK_PHONE";
pub const OTP_ENV: &str = "APICHECK_OTP";

/// Longest accepted per-case timeout or run deadline, in seconds
pub const MAX_SECONDS: f64 = 24.0 * 60.0 * 60.0;

/// Top-level configuration of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Base URL every endpoint path is joined onto
    pub base_url: String,

    /// Named auth profiles referenced by suites
    pub auth: BTreeMap<String, AuthConfig>,

    /// Execution settings
    pub run: RunSettings,

    /// Which suites to load
    pub suites: SuiteSelection,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        let mut auth = BTreeMap::new();
        auth.insert(
            DEFAULT_PROFILE.to_string(),
            AuthConfig::Otp {
                login_path: "users/mobile/auth/login/".to_string(),
                confirm_path: "users/mobile/auth/login/confirm/".to_string(),
                phone: "+998990660699".to_string(),
                otp: Some("111111".to_string()),
                otp_env: None,
            },
        );
        auth.insert(
            "agency".to_string(),
            AuthConfig::Password {
                login_path: "agency/auth/login/".to_string(),
                username: "yiaadmin@2plus6.uz".to_string(),
                password: None,
                password_env: Some("APICHECK_AGENCY_PASSWORD".to_string()),
            },
        );

        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth,
            run: RunSettings::default(),
            suites: SuiteSelection::default(),
        }
    }
}

/// How cases are executed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Per-case timeout in seconds
    pub timeout_secs: f64,

    /// Worker pool size; 1 runs sequentially
    pub concurrency: usize,

    /// Run-level deadline in seconds
    pub deadline_secs: Option<f64>,

    /// Maximum redirects followed per request
    pub max_redirects: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10.0,
            concurrency: 1,
            deadline_secs: None,
            max_redirects: 5,
        }
    }
}

impl RunSettings {
    /// Falls back to the default timeout when the setting is not a usable
    /// number of seconds
    pub fn timeout(&self) -> Duration {
        seconds(self.timeout_secs).unwrap_or(crate::executor::DEFAULT_CASE_TIMEOUT)
    }

    /// Unusable deadlines are clamped to [`MAX_SECONDS`]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs
            .map(|secs| seconds(secs).unwrap_or(Duration::from_secs_f64(MAX_SECONDS)))
    }

    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }
}

fn seconds(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 && secs <= MAX_SECONDS {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

fn check_seconds(setting: &str, secs: f64) -> HarnessResult<()> {
    if seconds(secs).is_none() {
        return Err(HarnessError::Config(format!(
            "{} must be a positive number of seconds up to {}, got {}",
            setting, MAX_SECONDS, secs
        )));
    }
    Ok(())
}

/// Suite sources and filters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteSelection {
    /// Include the suites compiled into the harness
    pub builtin: bool,

    /// Directory of additional YAML suite files
    pub dir: Option<PathBuf>,

    /// Only run suites with these names (all when empty)
    pub names: Vec<String>,

    /// Only run suites or endpoints carrying one of these tags
    pub tags: Vec<String>,
}

impl Default for SuiteSelection {
    fn default() -> Self {
        Self {
            builtin: true,
            dir: None,
            names: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// One auth profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AuthConfig {
    None,
    Password {
        login_path: String,
        username: String,
        #[serde(default, skip_serializing)]
        password: Option<String>,
        #[serde(default)]
        password_env: Option<String>,
    },
    Otp {
        login_path: String,
        confirm_path: String,
        phone: String,
        #[serde(default, skip_serializing)]
        otp: Option<String>,
        #[serde(default)]
        otp_env: Option<String>,
    },
}

impl AuthConfig {
    /// Password from the profile's env var, `APICHECK_PASSWORD`, or the file
    pub fn password(&self, profile: &str) -> Result<String, AuthError> {
        match self {
            AuthConfig::Password {
                password,
                password_env,
                ..
            } => secret(profile, "password", password_env.as_deref(), PASSWORD_ENV, password),
            _ => Err(AuthError::MissingSetting {
                profile: profile.to_string(),
                setting: "password",
            }),
        }
    }

    /// OTP from the profile's env var, `APICHECK_OTP`, or the file
    pub fn otp(&self, profile: &str) -> Result<String, AuthError> {
        match self {
            AuthConfig::Otp { otp, otp_env, .. } => secret(profile, "otp", otp_env.as_deref(), OTP_ENV, otp),
            _ => Err(AuthError::MissingSetting {
                profile: profile.to_string(),
                setting: "otp",
            }),
        }
    }
}

fn secret(
    profile: &str,
    setting: &'static str,
    named_env: Option<&str>,
    fallback_env: &str,
    inline: &Option<String>,
) -> Result<String, AuthError> {
    named_env
        .into_iter()
        .chain(std::iter::once(fallback_env))
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .or_else(|| inline.clone())
        .ok_or_else(|| AuthError::MissingSetting {
            profile: profile.to_string(),
            setting,
        })
}

impl SuiteConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> HarnessResult<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from a file, or defaults when it does not exist
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let mut config = Self::from_toml(&content)?;
            // Relative suite dirs are resolved against the config file
            if let (Some(dir), Some(parent)) = (config.suites.dir.as_ref(), path.parent()) {
                if dir.is_relative() {
                    config.suites.dir = Some(parent.join(dir));
                }
            }
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `APICHECK_BASE_URL` and `APICHECK_PHONE`
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
        if let Ok(number) = std::env::var(PHONE_ENV) {
            if !number.trim().is_empty() {
                for profile in self.auth.values_mut() {
                    if let AuthConfig::Otp { phone, .. } = profile {
                        *phone = number.clone();
                    }
                }
            }
        }
        self
    }

    /// Auth config for a profile name; `none` is always anonymous
    pub fn profile(&self, name: &str) -> HarnessResult<AuthConfig> {
        if name == ANONYMOUS_PROFILE {
            return Ok(AuthConfig::None);
        }
        self.auth
            .get(name)
            .cloned()
            .ok_or_else(|| HarnessError::Config(format!("unknown auth profile '{}'", name)))
    }

    pub fn validate(&self) -> HarnessResult<()> {
        check_seconds("run.timeout_secs", self.run.timeout_secs)?;
        if let Some(deadline) = self.run.deadline_secs {
            check_seconds("run.deadline_secs", deadline)?;
        }
        crate::executor::normalize_base(&self.base_url)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = SuiteConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.run.concurrency, 1);
        assert_eq!(config.run.timeout(), Duration::from_secs(10));
        assert!(config.run.deadline().is_none());
        assert!(config.suites.builtin);
        assert!(matches!(config.profile(DEFAULT_PROFILE).unwrap(), AuthConfig::Otp { .. }));
        assert!(matches!(config.profile("agency").unwrap(), AuthConfig::Password { .. }));
        assert_eq!(config.profile(ANONYMOUS_PROFILE).unwrap(), AuthConfig::None);
        assert!(config.profile("missing").is_err());
    }

    #[test]
    fn test_from_toml() {
        let config = SuiteConfig::from_toml(
            r#"
base_url = "http://localhost:8080/api/v1/"

[run]
concurrency = 4
deadline_secs = 30

[suites]
builtin = false
dir = "suites"
tags = ["smoke"]

[auth.default]
method = "password"
login_path = "auth/login/"
username = "qa@example.test"
password = "hunter2"

[auth.public]
method = "none"
"#,
        )
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:8080/api/v1/");
        assert_eq!(config.run.workers(), 4);
        assert_eq!(config.run.timeout_secs, 10.0);
        assert_eq!(config.run.deadline(), Some(Duration::from_secs(30)));
        assert!(!config.suites.builtin);
        assert_eq!(config.suites.tags, vec!["smoke"]);
        assert_eq!(config.profile("public").unwrap(), AuthConfig::None);
        assert!(!config.auth.contains_key("agency"));
        config.validate().unwrap();
    }

    #[test]
    fn test_inline_secret_used_without_env() {
        let profile = AuthConfig::Password {
            login_path: "login/".to_string(),
            username: "u".to_string(),
            password: Some("inline".to_string()),
            password_env: Some("APICHECK_TEST_UNSET_PASSWORD_VAR".to_string()),
        };
        // APICHECK_PASSWORD may be set on a developer machine
        if std::env::var(PASSWORD_ENV).is_err() {
            assert_eq!(profile.password("default").unwrap(), "inline");
        }
        assert!(profile.otp("default").is_err());
    }

    #[test]
    fn test_missing_secret() {
        let profile = AuthConfig::Otp {
            login_path: "login/".to_string(),
            confirm_path: "login/confirm/".to_string(),
            phone: "+998900000000".to_string(),
            otp: None,
            otp_env: None,
        };
        if std::env::var(OTP_ENV).is_err() {
            let err = profile.otp("mobile").unwrap_err();
            assert!(err.to_string().contains("mobile"));
        }
    }

    #[test]
    fn test_load_resolves_relative_suite_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apicheck.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[suites]\ndir = \"suites\"").unwrap();

        let config = SuiteConfig::load(&path).unwrap();
        assert_eq!(config.suites.dir, Some(dir.path().join("suites")));
        // Sections left out of the file keep their defaults
        assert!(config.auth.contains_key(DEFAULT_PROFILE));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SuiteConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SuiteConfig::default();
        config.run.timeout_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = SuiteConfig::default();
        config.base_url = "::nope::".to_string();
        assert!(config.validate().is_err());
    }

    #[test_case(f64::INFINITY ; "infinite")]
    #[test_case(f64::NAN ; "not a number")]
    #[test_case(-1.0 ; "negative")]
    #[test_case(1e300 ; "absurdly large")]
    fn test_validate_rejects_unusable_seconds(secs: f64) {
        let mut config = SuiteConfig::default();
        config.run.timeout_secs = secs;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)), "{err}");
        // Never panics, even when validation was skipped
        assert_eq!(config.run.timeout(), crate::executor::DEFAULT_CASE_TIMEOUT);

        let mut config = SuiteConfig::default();
        config.run.deadline_secs = Some(secs);
        assert!(config.validate().is_err());
        assert_eq!(config.run.deadline(), Some(Duration::from_secs_f64(MAX_SECONDS)));
    }

    #[test]
    fn test_fractional_timeout_kept() {
        let mut config = SuiteConfig::default();
        config.run.timeout_secs = 2.5;
        config.validate().unwrap();
        assert_eq!(config.run.timeout(), Duration::from_millis(2500));
    }
}
