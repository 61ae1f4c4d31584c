pub mod backup;
mod container;
pub mod error;
pub mod service;
pub mod traits;
pub mod workflow;

pub use backup::{
    BackupArtifact, BackupIntegrityReport, BaselineOrigin, DatabaseStatistics, ImportVerification,
    VerificationTolerance,
};
pub use container::{Container, ContainerState, ExecCommand, ExecOutput};
pub use error::{RuntimeResult, UpgradeError};
pub use service::{Credentials, ImageSource, ServiceSelection, VolumeMount};
pub use traits::ContainerRuntime;
pub use workflow::{WorkflowKind, WorkflowOutcome, WorkflowState, WorkflowStep};
