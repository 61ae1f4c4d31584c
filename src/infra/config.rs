use crate::domain::VerificationTolerance;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE_NAME: &str = "pg-upgrader.toml";

pub fn default_config_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/root"))
        .join(".config/pg-upgrader")
}

#[derive(Deserialize, Debug, Default)]
pub struct RuntimeConfig {
    pub binary: Option<String>,
    pub container_user: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct BackupConfig {
    pub file_prefix: Option<String>,
    pub env_file: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct MountConfig {
    pub restart_attempts: Option<u32>,
    pub delay_secs: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct VerificationConfig {
    pub row_tolerance_percent: Option<f64>,
    pub size_tolerance_percent: Option<f64>,
    pub min_backup_bytes: Option<u64>,
    pub table_marker_tolerance: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub mount: MountConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
}

impl AppConfig {
    /// Merges another AppConfig into self.
    /// Values from `other` overwrite values in `self` if present.
    pub fn merge(&mut self, other: AppConfig) {
        if let Some(binary) = other.runtime.binary {
            self.runtime.binary = Some(binary);
        }
        if let Some(user) = other.runtime.container_user {
            self.runtime.container_user = Some(user);
        }
        if let Some(prefix) = other.backup.file_prefix {
            self.backup.file_prefix = Some(prefix);
        }
        if let Some(env_file) = other.backup.env_file {
            self.backup.env_file = Some(env_file);
        }
        if let Some(attempts) = other.mount.restart_attempts {
            self.mount.restart_attempts = Some(attempts);
        }
        if let Some(delay) = other.mount.delay_secs {
            self.mount.delay_secs = Some(delay);
        }
        if let Some(rows) = other.verification.row_tolerance_percent {
            self.verification.row_tolerance_percent = Some(rows);
        }
        if let Some(size) = other.verification.size_tolerance_percent {
            self.verification.size_tolerance_percent = Some(size);
        }
        if let Some(min) = other.verification.min_backup_bytes {
            self.verification.min_backup_bytes = Some(min);
        }
        if let Some(markers) = other.verification.table_marker_tolerance {
            self.verification.table_marker_tolerance = Some(markers);
        }
    }

    /// Fills in defaults and resolves paths relative to the project directory
    pub fn into_settings(self, project_dir: &Path) -> Result<UpgradeSettings> {
        let env_file = self.backup.env_file.unwrap_or_else(|| ".env".to_string());
        let env_file = shellexpand::full(&env_file)
            .with_context(|| format!("expandindo caminho {env_file}"))?;
        let env_file = PathBuf::from(env_file.into_owned());
        let env_file = if env_file.is_absolute() {
            env_file
        } else {
            project_dir.join(env_file)
        };

        let defaults = VerificationTolerance::default();

        Ok(UpgradeSettings {
            runtime_binary: self.runtime.binary.unwrap_or_else(|| "docker".to_string()),
            container_user: self
                .runtime
                .container_user
                .unwrap_or_else(|| "postgres".to_string()),
            file_prefix: self
                .backup
                .file_prefix
                .unwrap_or_else(|| "backup".to_string()),
            env_file,
            mount: MountPolicy {
                restart_attempts: self.mount.restart_attempts.unwrap_or(3),
                delay: Duration::from_secs(self.mount.delay_secs.unwrap_or(2)),
            },
            tolerance: VerificationTolerance {
                row_percent: self
                    .verification
                    .row_tolerance_percent
                    .unwrap_or(defaults.row_percent),
                size_percent: self
                    .verification
                    .size_tolerance_percent
                    .unwrap_or(defaults.size_percent),
                min_backup_bytes: self
                    .verification
                    .min_backup_bytes
                    .unwrap_or(defaults.min_backup_bytes),
                table_markers: self
                    .verification
                    .table_marker_tolerance
                    .unwrap_or(defaults.table_markers),
            },
        })
    }
}

/// Bounds of the mount verifier's restart loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountPolicy {
    pub restart_attempts: u32,
    pub delay: Duration,
}

impl Default for MountPolicy {
    fn default() -> Self {
        Self {
            restart_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Fully resolved settings for one invocation
#[derive(Debug, Clone)]
pub struct UpgradeSettings {
    pub runtime_binary: String,
    pub container_user: String,
    pub file_prefix: String,
    pub env_file: PathBuf,
    pub mount: MountPolicy,
    pub tolerance: VerificationTolerance,
}

impl Default for UpgradeSettings {
    fn default() -> Self {
        Self {
            runtime_binary: "docker".to_string(),
            container_user: "postgres".to_string(),
            file_prefix: "backup".to_string(),
            env_file: PathBuf::from(".env"),
            mount: MountPolicy::default(),
            tolerance: VerificationTolerance::default(),
        }
    }
}

fn read_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path).with_context(|| format!("lendo {:?}", path))?;
    toml::from_str(&content).with_context(|| format!("parse de {:?}", path))
}

/// Loads the global config (`~/.config/pg-upgrader/config.toml`), then the
/// project-local one (or `explicit`), later files overriding earlier ones.
pub fn load_app_config(project_dir: &Path, explicit: Option<&Path>) -> Result<AppConfig> {
    let mut app_config = AppConfig::default();

    let global = default_config_dir().join("config.toml");
    if global.exists() {
        debug!("Carregando config global {:?}", global);
        app_config.merge(read_config(&global)?);
    }

    let local = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| project_dir.join(DEFAULT_CONFIG_FILE_NAME));
    if local.exists() {
        debug!("Carregando config local {:?}", local);
        app_config.merge(read_config(&local)?);
    } else if explicit.is_some() {
        anyhow::bail!("Arquivo de configuração {:?} não encontrado", local);
    }

    Ok(app_config)
}

pub fn load_settings(project_dir: &Path, explicit: Option<&Path>) -> Result<UpgradeSettings> {
    load_app_config(project_dir, explicit)?.into_settings(project_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_config() {
        let toml = r#"
[runtime]
binary = "podman"

[mount]
restart_attempts = 5
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let settings = config.into_settings(Path::new("/srv/app")).unwrap();

        assert_eq!(settings.runtime_binary, "podman");
        assert_eq!(settings.container_user, "postgres");
        assert_eq!(settings.mount.restart_attempts, 5);
        assert_eq!(settings.mount.delay, Duration::from_secs(2));
        assert_eq!(settings.env_file, PathBuf::from("/srv/app/.env"));
        assert_eq!(settings.tolerance, VerificationTolerance::default());
    }

    #[test]
    fn later_config_overrides_earlier() {
        let mut base: AppConfig = toml::from_str(
            r#"
[backup]
file_prefix = "nightly"
[verification]
row_tolerance_percent = 5.0
"#,
        )
        .unwrap();
        let local: AppConfig = toml::from_str(
            r#"
[verification]
row_tolerance_percent = 20.0
table_marker_tolerance = 0
"#,
        )
        .unwrap();

        base.merge(local);

        assert_eq!(base.backup.file_prefix.as_deref(), Some("nightly"));
        assert_eq!(base.verification.row_tolerance_percent, Some(20.0));
        assert_eq!(base.verification.table_marker_tolerance, Some(0));
    }

    #[test]
    fn rejects_unparsable_values() {
        let result = toml::from_str::<AppConfig>("[mount]\nrestart_attempts = \"many\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn loads_local_file_from_project_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE_NAME),
            "[backup]\nenv_file = \"config/db.env\"\n",
        )?;

        let settings = load_settings(dir.path(), None)?;
        assert_eq!(settings.env_file, dir.path().join("config/db.env"));
        Ok(())
    }

    #[test]
    fn missing_explicit_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("nope.toml");
        assert!(load_app_config(dir.path(), Some(&missing)).is_err());
        Ok(())
    }
}
