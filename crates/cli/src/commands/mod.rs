//! CLI Commands

pub mod cases;
pub mod list;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use apicheck_harness::SuiteConfig;
use clap::Args;

/// Where the configuration comes from
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the TOML config file
    #[arg(short, long, env = "APICHECK_CONFIG", default_value = "apicheck.toml")]
    pub config: PathBuf,

    /// Additional directory of YAML suite files
    #[arg(long)]
    pub suite_dir: Option<PathBuf>,

    /// Skip the built-in suites
    #[arg(long)]
    pub no_builtin: bool,
}

impl ConfigArgs {
    /// Load the config file (defaults when absent) with env and flag overrides
    pub fn load(&self) -> Result<SuiteConfig> {
        let mut config = load_config(&self.config)?;
        if let Some(dir) = &self.suite_dir {
            config.suites.dir = Some(dir.clone());
        }
        if self.no_builtin {
            config.suites.builtin = false;
        }
        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<SuiteConfig> {
    let config = SuiteConfig::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    Ok(config.apply_env())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn args(config: PathBuf) -> ConfigArgs {
        ConfigArgs {
            config,
            suite_dir: None,
            no_builtin: false,
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = args(dir.path().join("absent.toml")).load().unwrap();
        assert!(config.suites.builtin);
        assert_eq!(config.run.concurrency, 1);
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apicheck.toml");
        fs::write(
            &path,
            r#"
[run]
concurrency = 3

[suites]
dir = "suites"
"#,
        )
        .unwrap();

        let mut flags = args(path);
        flags.no_builtin = true;
        let config = flags.load().unwrap();
        assert!(!config.suites.builtin);
        assert_eq!(config.run.concurrency, 3);
        assert_eq!(config.suites.dir, Some(dir.path().join("suites")));

        flags.suite_dir = Some(PathBuf::from("/tmp/other"));
        let config = flags.load().unwrap();
        assert_eq!(config.suites.dir, Some(PathBuf::from("/tmp/other")));
    }
}
