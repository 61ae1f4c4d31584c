use super::error::{RuntimeResult, UpgradeError};

/// Default data directory of the official postgres image.
pub const POSTGRES_DATA_DIR: &str = "/var/lib/postgresql/data";

/// A named volume mounted into a compose service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Source name as written in the compose file (e.g. `database`)
    pub name: String,
    /// Mount path inside the container
    pub path: String,
    /// Project-prefixed volume name known to the runtime (e.g. `myapp_database`)
    pub resolved_name: String,
}

impl VolumeMount {
    pub fn new(name: &str, path: &str, resolved_name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            resolved_name: resolved_name.to_string(),
        }
    }
}

/// Where the new engine image comes from during an upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Pull(String),
    Build,
}

/// The service being upgraded and the two volumes chosen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSelection {
    pub service: String,
    pub main_volume: VolumeMount,
    pub backup_volume: VolumeMount,
    pub image_source: ImageSource,
}

impl ServiceSelection {
    /// Builds a selection, rejecting volume pairs that would make the upgrade
    /// destroy its own backup.
    pub fn new(
        service: &str,
        main_volume: VolumeMount,
        backup_volume: VolumeMount,
        image_source: ImageSource,
    ) -> RuntimeResult<Self> {
        if service.trim().is_empty() {
            return Err(UpgradeError::Configuration(
                "nome de serviço vazio".to_string(),
            ));
        }

        if main_volume.name == backup_volume.name {
            return Err(UpgradeError::Configuration(format!(
                "volume principal e volume de backup são o mesmo ({})",
                main_volume.name
            )));
        }

        let main_path = main_volume.path.trim_end_matches('/');
        let backup_path = backup_volume.path.trim_end_matches('/');

        if backup_path == POSTGRES_DATA_DIR {
            return Err(UpgradeError::Configuration(format!(
                "{POSTGRES_DATA_DIR} não pode ser usado como destino de backup, todos os dados seriam removidos"
            )));
        }

        if backup_path == main_path || backup_path.starts_with(&format!("{main_path}/")) {
            return Err(UpgradeError::Configuration(format!(
                "caminho de backup {backup_path} está dentro do volume principal {main_path}"
            )));
        }

        Ok(Self {
            service: service.to_string(),
            main_volume,
            backup_volume,
            image_source,
        })
    }

    /// Container-side directory that receives backup files
    pub fn backup_dir(&self) -> &str {
        self.backup_volume.path.trim_end_matches('/')
    }
}

/// Database login used for dump and restore. Lives for one invocation only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub database: String,
}

impl Credentials {
    pub fn new(user: &str, database: &str) -> Self {
        Self {
            user: user.to_string(),
            database: database.to_string(),
        }
    }
}
