use super::context::UpgradeContext;
use anyhow::{Result, bail};
use clap::Subcommand;
use pg_upgrader::domain::{WorkflowOutcome, WorkflowState};
use pg_upgrader::services::{ImportSource, UpgradeOrchestrator};
use tracing::{info, warn};

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowCommand {
    /// Cria e verifica um backup do banco atual
    Export,
    /// Restaura um backup no serviço (recria o container se necessário)
    Import {
        /// Arquivo no volume de backup (default: o mais recente)
        #[arg(long)]
        file: Option<String>,
    },
    /// Backup, recriação do serviço com a nova imagem e restauração
    Upgrade,
}

pub fn run(command: WorkflowCommand, ctx: &UpgradeContext) -> Result<()> {
    let orchestrator = UpgradeOrchestrator::new(ctx.runtime.clone(), &ctx.settings);

    let outcome = match command {
        WorkflowCommand::Export => orchestrator.export(&ctx.selection, &ctx.credentials),
        WorkflowCommand::Import { file } => {
            let source = file.map(ImportSource::File).unwrap_or_default();
            orchestrator.import(&ctx.selection, &ctx.credentials, source)
        }
        WorkflowCommand::Upgrade => orchestrator.upgrade(&ctx.selection, &ctx.credentials),
    };

    report(&outcome)
}

/// Logs the outcome and turns a failed workflow into an error
fn report(outcome: &WorkflowOutcome) -> Result<()> {
    for warning in &outcome.warnings {
        warn!("  {warning}");
    }

    match &outcome.state {
        WorkflowState::Completed => {
            if let Some(path) = outcome.artifact_path() {
                info!(" Backup: {path}");
            }
            Ok(())
        }
        WorkflowState::Failed { step, error } => {
            if let Some(path) = outcome.artifact_path() {
                info!(" Backup disponível para recuperação manual: {path}");
            }
            bail!("{} falhou em {step}: {error}", outcome.workflow)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pg_upgrader::domain::{UpgradeError, WorkflowKind, WorkflowStep};

    fn outcome(state: WorkflowState) -> WorkflowOutcome {
        WorkflowOutcome {
            workflow: WorkflowKind::Upgrade,
            state,
            artifact: None,
            completed_steps: Vec::new(),
            warnings: vec!["linhas estimadas: original 10, atual 5 (delta -5)".into()],
        }
    }

    #[test]
    fn test_completed_outcome_is_ok() {
        assert!(report(&outcome(WorkflowState::Completed)).is_ok());
    }

    #[test]
    fn test_failed_outcome_names_step_and_reason() {
        let err = report(&outcome(WorkflowState::Failed {
            step: WorkflowStep::VerifyMount,
            error: UpgradeError::Configuration("volume ausente".into()),
        }))
        .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("upgrade falhou em VerifyMount"));
        assert!(message.contains("volume ausente"));
    }
}
