use crate::domain::service::POSTGRES_DATA_DIR;
use crate::domain::{ServiceSelection, VolumeMount};
use crate::infra::{ComposeProject, ComposeService};
use anyhow::{Context, Result, bail};
use tracing::info;

/// Chooses the service and the main/backup volume pair to operate on
pub trait SelectionProvider {
    fn select(&self, project: &ComposeProject) -> Result<ServiceSelection>;
}

/// Selection from explicit names, falling back to the only sensible candidate
/// when a name is omitted.
#[derive(Debug, Clone, Default)]
pub struct ExplicitSelection {
    pub service: Option<String>,
    pub main_volume: Option<String>,
    pub backup_volume: Option<String>,
}

impl ExplicitSelection {
    fn pick_service<'a>(&self, project: &'a ComposeProject) -> Result<&'a ComposeService> {
        if let Some(name) = &self.service {
            return project
                .service(name)
                .with_context(|| format!("Serviço '{name}' não existe no compose"));
        }

        let candidates: Vec<&ComposeService> = project
            .services
            .values()
            .filter(|s| s.volumes.len() >= 2)
            .collect();

        match candidates.as_slice() {
            [only] => Ok(*only),
            [] => bail!("Nenhum serviço com pelo menos dois volumes nomeados"),
            many => bail!(
                "Vários serviços candidatos ({}); use --service",
                names(many.iter().map(|s| s.name.as_str()))
            ),
        }
    }

    fn pick_main<'a>(&self, service: &'a ComposeService) -> Result<&'a VolumeMount> {
        if let Some(name) = &self.main_volume {
            return find_volume(service, name);
        }

        service
            .volumes
            .iter()
            .find(|v| v.path.trim_end_matches('/') == POSTGRES_DATA_DIR)
            .with_context(|| {
                format!(
                    "Nenhum volume em {POSTGRES_DATA_DIR} em '{}'; use --main-volume ({})",
                    service.name,
                    names(service.volumes.iter().map(|v| v.name.as_str()))
                )
            })
    }

    fn pick_backup<'a>(
        &self,
        service: &'a ComposeService,
        main: &VolumeMount,
    ) -> Result<&'a VolumeMount> {
        if let Some(name) = &self.backup_volume {
            return find_volume(service, name);
        }

        let others: Vec<&VolumeMount> = service
            .volumes
            .iter()
            .filter(|v| v.name != main.name)
            .collect();

        match others.as_slice() {
            [only] => Ok(*only),
            _ => bail!(
                "Não foi possível escolher o volume de backup de '{}'; use --backup-volume ({})",
                service.name,
                names(others.iter().map(|v| v.name.as_str()))
            ),
        }
    }
}

impl SelectionProvider for ExplicitSelection {
    fn select(&self, project: &ComposeProject) -> Result<ServiceSelection> {
        let service = self.pick_service(project)?;
        let main = self.pick_main(service)?;
        let backup = self.pick_backup(service, main)?;

        let selection = ServiceSelection::new(
            &service.name,
            main.clone(),
            backup.clone(),
            service.image_source()?,
        )?;

        info!(
            " Serviço '{}': dados em {} ({}), backups em {} ({})",
            selection.service,
            selection.main_volume.path,
            selection.main_volume.resolved_name,
            selection.backup_volume.path,
            selection.backup_volume.resolved_name
        );
        Ok(selection)
    }
}

fn find_volume<'a>(service: &'a ComposeService, name: &str) -> Result<&'a VolumeMount> {
    service
        .volumes
        .iter()
        .find(|v| v.name == name || v.resolved_name == name)
        .with_context(|| {
            format!(
                "Volume '{name}' não está montado em '{}' ({})",
                service.name,
                names(service.volumes.iter().map(|v| v.name.as_str()))
            )
        })
}

fn names<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(", ")
}
