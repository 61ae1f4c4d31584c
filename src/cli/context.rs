use anyhow::{Context, Result};
use clap::Args;
use pg_upgrader::domain::{Credentials, ServiceSelection};
use pg_upgrader::infra::config::load_settings;
use pg_upgrader::infra::credentials::{
    ComposeEnvironmentSource, EnvFileSource, resolve_credentials,
};
use pg_upgrader::infra::{ComposeProject, DockerAdapter, UpgradeSettings};
use pg_upgrader::services::{ExplicitSelection, SelectionProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Which service and volumes to operate on. Omitted names are inferred.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Serviço Postgres no compose
    #[arg(long, global = true)]
    pub service: Option<String>,
    /// Volume montado em /var/lib/postgresql/data
    #[arg(long, global = true)]
    pub main_volume: Option<String>,
    /// Volume onde os backups são gravados
    #[arg(long, global = true)]
    pub backup_volume: Option<String>,
}

impl From<SelectionArgs> for ExplicitSelection {
    fn from(args: SelectionArgs) -> Self {
        Self {
            service: args.service,
            main_volume: args.main_volume,
            backup_volume: args.backup_volume,
        }
    }
}

/// Everything resolved up front, before any workflow touches the runtime
pub struct UpgradeContext {
    pub settings: UpgradeSettings,
    pub selection: ServiceSelection,
    pub credentials: Credentials,
    pub runtime: Arc<DockerAdapter>,
}

impl UpgradeContext {
    pub fn load(
        project_dir: &Path,
        config: Option<&Path>,
        selection: SelectionArgs,
    ) -> Result<Self> {
        let project_dir = absolute(project_dir)?;
        let settings = load_settings(&project_dir, config)?;
        debug!("Configuração: {:?}", settings);

        let project = ComposeProject::load(&settings.runtime_binary, &project_dir)?;
        let provider = ExplicitSelection::from(selection);
        let selection = provider.select(&project)?;

        let service = project
            .service(&selection.service)
            .with_context(|| format!("Serviço '{}' sumiu do compose", selection.service))?;
        let env_file = EnvFileSource::new(&settings.env_file);
        let compose_env = ComposeEnvironmentSource::new(&service.name, &service.environment);
        let credentials = resolve_credentials(&[&env_file, &compose_env])?;

        let runtime = Arc::new(DockerAdapter::new(&settings.runtime_binary, &project_dir));

        Ok(Self {
            settings,
            selection,
            credentials,
            runtime,
        })
    }
}

fn absolute(dir: &Path) -> Result<PathBuf> {
    dir.canonicalize()
        .with_context(|| format!("Diretório do projeto {:?} inválido", dir))
}
