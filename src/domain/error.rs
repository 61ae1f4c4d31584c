use thiserror::Error;

pub type RuntimeResult<T> = std::result::Result<T, UpgradeError>;

/// Failures raised by the upgrade core. Each variant belongs to one component
/// and carries what is needed to diagnose it without re-running.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("runtime de containers indisponível: {output}")]
    RuntimeUnavailable { output: String },

    #[error("falha ao {action} a imagem {target}: {output}")]
    ImageOperation {
        action: String,
        target: String,
        output: String,
    },

    #[error("falha ao remover o volume {volume}: {output}")]
    VolumeOperation { volume: String, output: String },

    #[error("falha ao {action} o container {service}: {output}")]
    ContainerOperation {
        action: String,
        service: String,
        output: String,
    },

    #[error("falha ao iniciar o serviço {service}: {output}")]
    ContainerStart { service: String, output: String },

    #[error("comando `{command}` falhou em {service} (status {exit_code:?}): {output}")]
    Exec {
        service: String,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("falha ao criar backup {path} em {service}: {reason}")]
    BackupCreation {
        service: String,
        path: String,
        reason: String,
    },

    #[error("backup {path} não passou na verificação de integridade: {}", issues.join("; "))]
    BackupIntegrity { path: String, issues: Vec<String> },

    #[error(
        "volume de backup {expected_path} não está visível em {service} após {attempts} verificações (montagens: {observed:?})"
    )]
    MountVerification {
        service: String,
        expected_path: String,
        attempts: u32,
        observed: Vec<String>,
    },

    #[error("falha ao importar {path} em {service} (status {exit_code:?}): {output}")]
    Import {
        service: String,
        path: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("verificação pós-importação falhou: {}", deltas.join("; "))]
    ImportVerification { deltas: Vec<String> },

    #[error("falha ao atualizar a collation de {database}: {output}")]
    Collation { database: String, output: String },

    #[error("configuração inválida: {0}")]
    Configuration(String),
}

impl UpgradeError {
    /// Exit code and captured output of a failed in-container command, if any.
    pub fn exec_details(&self) -> Option<(Option<i32>, &str)> {
        match self {
            Self::Exec {
                exit_code, output, ..
            } => Some((*exit_code, output.as_str())),
            _ => None,
        }
    }
}
