use super::backup::BackupArtifact;
use super::error::UpgradeError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    Export,
    Import,
    Upgrade,
}

/// One step of a workflow. The order of each plan is fixed; see [`WorkflowKind::steps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    /// Acquiring the runtime connection. Not part of any plan, reported only
    /// when the connection cannot be established.
    Connect,
    CollectStatistics,
    CreateBackup,
    VerifyBackupIntegrity,
    StopContainer,
    RemoveContainer,
    PullOrBuildImage,
    RemoveDataVolume,
    StartService,
    VerifyMount,
    ImportBackup,
    VerifyImport,
    UpdateCollation,
}

const EXPORT_STEPS: &[WorkflowStep] = &[
    WorkflowStep::CollectStatistics,
    WorkflowStep::CreateBackup,
    WorkflowStep::VerifyBackupIntegrity,
];

const IMPORT_STEPS: &[WorkflowStep] = &[
    WorkflowStep::StartService,
    WorkflowStep::VerifyMount,
    WorkflowStep::ImportBackup,
    WorkflowStep::VerifyImport,
    WorkflowStep::UpdateCollation,
];

// The container is stopped and removed before its data volume goes away.
const UPGRADE_STEPS: &[WorkflowStep] = &[
    WorkflowStep::CollectStatistics,
    WorkflowStep::CreateBackup,
    WorkflowStep::VerifyBackupIntegrity,
    WorkflowStep::StopContainer,
    WorkflowStep::RemoveContainer,
    WorkflowStep::PullOrBuildImage,
    WorkflowStep::RemoveDataVolume,
    WorkflowStep::StartService,
    WorkflowStep::VerifyMount,
    WorkflowStep::ImportBackup,
    WorkflowStep::VerifyImport,
    WorkflowStep::UpdateCollation,
];

impl WorkflowKind {
    pub fn steps(&self) -> &'static [WorkflowStep] {
        match self {
            Self::Export => EXPORT_STEPS,
            Self::Import => IMPORT_STEPS,
            Self::Upgrade => UPGRADE_STEPS,
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Export => write!(f, "export"),
            Self::Import => write!(f, "import"),
            Self::Upgrade => write!(f, "upgrade"),
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connect => "Connect",
            Self::CollectStatistics => "CollectStatistics",
            Self::CreateBackup => "CreateBackup",
            Self::VerifyBackupIntegrity => "VerifyBackupIntegrity",
            Self::StopContainer => "StopContainer",
            Self::RemoveContainer => "RemoveContainer",
            Self::PullOrBuildImage => "PullOrBuildImage",
            Self::RemoveDataVolume => "RemoveDataVolume",
            Self::StartService => "StartService",
            Self::VerifyMount => "VerifyMount",
            Self::ImportBackup => "ImportBackup",
            Self::VerifyImport => "VerifyImport",
            Self::UpdateCollation => "UpdateCollation",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug)]
pub enum WorkflowState {
    Completed,
    Failed {
        step: WorkflowStep,
        error: UpgradeError,
    },
}

/// Terminal result of one workflow invocation.
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub workflow: WorkflowKind,
    pub state: WorkflowState,
    /// Dump produced or consumed by the workflow. Left on disk on failure.
    pub artifact: Option<BackupArtifact>,
    pub completed_steps: Vec<WorkflowStep>,
    pub warnings: Vec<String>,
}

impl WorkflowOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.state, WorkflowState::Completed)
    }

    pub fn failed_step(&self) -> Option<WorkflowStep> {
        match &self.state {
            WorkflowState::Completed => None,
            WorkflowState::Failed { step, .. } => Some(*step),
        }
    }

    pub fn error(&self) -> Option<&UpgradeError> {
        match &self.state {
            WorkflowState::Completed => None,
            WorkflowState::Failed { error, .. } => Some(error),
        }
    }

    pub fn artifact_path(&self) -> Option<&str> {
        self.artifact.as_ref().map(|a| a.path.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_plan_removes_volume_after_container() {
        let steps = WorkflowKind::Upgrade.steps();
        let position = |step| steps.iter().position(|s| *s == step).unwrap();

        assert!(position(WorkflowStep::StopContainer) < position(WorkflowStep::RemoveDataVolume));
        assert!(
            position(WorkflowStep::RemoveContainer) < position(WorkflowStep::RemoveDataVolume)
        );
        assert!(position(WorkflowStep::RemoveDataVolume) < position(WorkflowStep::StartService));
    }

    #[test]
    fn test_upgrade_plan_is_export_then_import() {
        let upgrade = WorkflowKind::Upgrade.steps();
        assert!(upgrade.starts_with(WorkflowKind::Export.steps()));
        assert!(upgrade.ends_with(WorkflowKind::Import.steps()));
    }

    #[test]
    fn test_connect_is_not_planned() {
        for kind in [WorkflowKind::Export, WorkflowKind::Import, WorkflowKind::Upgrade] {
            assert!(!kind.steps().contains(&WorkflowStep::Connect));
        }
    }
}
