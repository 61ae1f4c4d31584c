pub mod domain;
pub mod infra;
pub mod services;

// Make test_support available for integration tests
pub mod test_support;

pub use domain::{
    BackupArtifact, ContainerRuntime, ContainerState, Credentials, ServiceSelection,
    UpgradeError, WorkflowKind, WorkflowOutcome, WorkflowStep,
};
pub use infra::{DockerAdapter, UpgradeSettings};
pub use services::{ContainerService, ImportSource, UpgradeOrchestrator};
