use crate::domain::{
    BackupArtifact, BaselineOrigin, ContainerRuntime, Credentials, DatabaseStatistics, ImageSource,
    RuntimeResult, ServiceSelection, UpgradeError, WorkflowKind, WorkflowOutcome, WorkflowState,
    WorkflowStep,
};
use crate::infra::UpgradeSettings;
use crate::services::backup_engine::backup_file_path;
use crate::services::{BackupEngine, ContainerService, MountVerifier, RuntimeSession};
use chrono::Local;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Which dump the `import` workflow restores
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImportSource {
    /// Newest `<prefix>-*.sql` in the backup volume
    #[default]
    Latest,
    /// A file name (relative to the backup volume) or absolute container path
    File(String),
}

/// Mutable state threaded through the steps of one invocation
struct WorkflowContext<'a> {
    kind: WorkflowKind,
    selection: &'a ServiceSelection,
    credentials: &'a Credentials,
    source: ImportSource,
    baseline: Option<DatabaseStatistics>,
    baseline_origin: BaselineOrigin,
    artifact: Option<BackupArtifact>,
    warnings: Vec<String>,
}

/// Sequences backup, teardown, rebuild and restore into the `export`,
/// `import` and `upgrade` workflows.
///
/// The first failing step ends the workflow. Nothing already done is undone:
/// a stopped container stays stopped, a removed volume stays removed and the
/// backup file stays on the backup volume for manual recovery.
pub struct UpgradeOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    containers: Arc<ContainerService>,
    backups: BackupEngine,
    mounts: MountVerifier,
    file_prefix: String,
}

impl UpgradeOrchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: &UpgradeSettings) -> Self {
        let containers = Arc::new(ContainerService::new(runtime.clone()));
        let backups = BackupEngine::new(
            runtime.clone(),
            Some(settings.container_user.as_str()).filter(|u| !u.is_empty()),
            settings.tolerance,
        );
        let mounts = MountVerifier::new(runtime.clone(), containers.clone(), settings.mount);

        Self {
            runtime,
            containers,
            backups,
            mounts,
            file_prefix: settings.file_prefix.clone(),
        }
    }

    pub fn export(&self, selection: &ServiceSelection, credentials: &Credentials) -> WorkflowOutcome {
        self.run(WorkflowKind::Export, selection, credentials, ImportSource::Latest)
    }

    pub fn import(
        &self,
        selection: &ServiceSelection,
        credentials: &Credentials,
        source: ImportSource,
    ) -> WorkflowOutcome {
        self.run(WorkflowKind::Import, selection, credentials, source)
    }

    pub fn upgrade(&self, selection: &ServiceSelection, credentials: &Credentials) -> WorkflowOutcome {
        self.run(WorkflowKind::Upgrade, selection, credentials, ImportSource::Latest)
    }

    fn run(
        &self,
        kind: WorkflowKind,
        selection: &ServiceSelection,
        credentials: &Credentials,
        source: ImportSource,
    ) -> WorkflowOutcome {
        let mut ctx = WorkflowContext {
            kind,
            selection,
            credentials,
            source,
            baseline: None,
            baseline_origin: BaselineOrigin::Measured,
            artifact: None,
            warnings: Vec::new(),
        };
        let mut completed = Vec::new();

        info!(" Workflow {kind} para o serviço '{}'", selection.service);

        let _session = match RuntimeSession::acquire(self.runtime.as_ref()) {
            Ok(session) => session,
            Err(error) => return failed(ctx, completed, WorkflowStep::Connect, error),
        };

        for &step in kind.steps() {
            info!("▶ {step}");
            if let Err(error) = self.execute(step, &mut ctx) {
                return failed(ctx, completed, step, error);
            }
            completed.push(step);
        }

        info!(" Workflow {kind} concluído");
        WorkflowOutcome {
            workflow: kind,
            state: WorkflowState::Completed,
            artifact: ctx.artifact,
            completed_steps: completed,
            warnings: ctx.warnings,
        }
    }

    fn execute(&self, step: WorkflowStep, ctx: &mut WorkflowContext) -> RuntimeResult<()> {
        let service = ctx.selection.service.as_str();

        match step {
            WorkflowStep::Connect => Ok(()),
            WorkflowStep::CollectStatistics => {
                let stats = self.backups.collect_statistics(service, ctx.credentials)?;
                info!(
                    "   Banco atual: {} tabelas, {} bytes, ~{} linhas",
                    stats.table_count, stats.size_bytes, stats.row_count
                );
                ctx.baseline = Some(stats);
                Ok(())
            }
            WorkflowStep::CreateBackup => {
                let destination =
                    backup_file_path(ctx.selection.backup_dir(), &self.file_prefix, &Local::now());
                let artifact = self
                    .backups
                    .create_backup(service, ctx.credentials, &destination)?;
                ctx.artifact = Some(artifact);
                Ok(())
            }
            WorkflowStep::VerifyBackupIntegrity => {
                let artifact = require(ctx.artifact.as_ref(), "backup")?;
                let report = self
                    .backups
                    .verify_backup_integrity(artifact, ctx.baseline.as_ref());

                if report.passed() {
                    info!(
                        "   Backup verificado: {} bytes, ~{} tabelas",
                        report.size_bytes, report.table_markers
                    );
                    return Ok(());
                }

                // Fatal in upgrade only; export reports them as warnings.
                if ctx.kind == WorkflowKind::Upgrade {
                    return Err(UpgradeError::BackupIntegrity {
                        path: report.path,
                        issues: report.issues,
                    });
                }
                ctx.warnings.extend(report.issues);
                Ok(())
            }
            WorkflowStep::StopContainer => self.containers.stop(service),
            WorkflowStep::RemoveContainer => self.containers.remove(service),
            WorkflowStep::PullOrBuildImage => match &ctx.selection.image_source {
                ImageSource::Pull(image) => {
                    info!(" Baixando imagem {image}...");
                    self.runtime.pull_image(image)
                }
                ImageSource::Build => {
                    info!(" Construindo imagem de {service}...");
                    self.runtime.build_image(service)
                }
            },
            WorkflowStep::RemoveDataVolume => {
                let volume = &ctx.selection.main_volume.resolved_name;
                info!(" Removendo volume de dados {volume}...");
                self.runtime.remove_volume(volume)
            }
            WorkflowStep::StartService => self.containers.start(service),
            WorkflowStep::VerifyMount => self.mounts.verify(service, ctx.selection.backup_dir()),
            WorkflowStep::ImportBackup => {
                if ctx.artifact.is_none() {
                    ctx.artifact = Some(self.resolve_import_artifact(ctx)?);
                }
                let artifact = require(ctx.artifact.as_ref(), "backup")?;
                if ctx.baseline.is_none() {
                    ctx.baseline = Some(DatabaseStatistics::from_artifact(artifact));
                    ctx.baseline_origin = BaselineOrigin::DumpEstimate;
                }
                self.backups
                    .import_backup(service, ctx.credentials, &artifact.path)
            }
            WorkflowStep::VerifyImport => {
                let baseline = *require(ctx.baseline.as_ref(), "estatísticas de referência")?;
                let verification = self
                    .backups
                    .verify_import(service, ctx.credentials, &baseline, ctx.baseline_origin)?;
                ctx.warnings.extend(verification.warnings);
                Ok(())
            }
            WorkflowStep::UpdateCollation => {
                self.backups.update_collation(service, ctx.credentials)
            }
        }
    }

    fn resolve_import_artifact(&self, ctx: &WorkflowContext) -> RuntimeResult<BackupArtifact> {
        let service = ctx.selection.service.as_str();
        let dir = ctx.selection.backup_dir();

        let path = match &ctx.source {
            ImportSource::File(file) if file.starts_with('/') => file.clone(),
            ImportSource::File(file) => format!("{dir}/{file}"),
            ImportSource::Latest => self
                .backups
                .list_backups(service, dir, &self.file_prefix)?
                .pop()
                .ok_or_else(|| UpgradeError::Import {
                    service: service.to_string(),
                    path: dir.to_string(),
                    exit_code: None,
                    output: format!("nenhum arquivo {}-*.sql no volume de backup", self.file_prefix),
                })?,
        };

        let artifact = self.backups.inspect_artifact(service, &path)?;
        if !artifact.is_valid() {
            return Err(UpgradeError::Import {
                service: service.to_string(),
                path,
                exit_code: None,
                output: "arquivo de backup vazio".to_string(),
            });
        }

        info!(
            "   Backup selecionado: {} ({} bytes, ~{} tabelas)",
            artifact.path, artifact.size_bytes, artifact.estimated_table_count
        );
        Ok(artifact)
    }
}

fn require<'a, T>(value: Option<&'a T>, what: &str) -> RuntimeResult<&'a T> {
    value.ok_or_else(|| UpgradeError::Configuration(format!("{what} indisponível neste ponto")))
}

fn failed(
    ctx: WorkflowContext,
    completed: Vec<WorkflowStep>,
    step: WorkflowStep,
    error: UpgradeError,
) -> WorkflowOutcome {
    error!(" Workflow {} falhou em {step}: {error}", ctx.kind);
    if ctx.kind == WorkflowKind::Upgrade && completed.contains(&WorkflowStep::StopContainer) {
        warn!("  Etapas destrutivas já executadas não foram revertidas; recuperação manual necessária");
    }
    if let Some(artifact) = &ctx.artifact {
        warn!("  Backup preservado em {}", artifact.path);
    }

    WorkflowOutcome {
        workflow: ctx.kind,
        state: WorkflowState::Failed { step, error },
        artifact: ctx.artifact,
        completed_steps: completed,
        warnings: ctx.warnings,
    }
}
