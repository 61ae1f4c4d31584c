pub mod backup_engine;
mod container_service;
pub mod mount_verifier;
mod orchestrator;
pub mod selection;
mod session;

pub use backup_engine::BackupEngine;
pub use container_service::ContainerService;
pub use mount_verifier::{MountDecision, MountVerifier};
pub use orchestrator::{ImportSource, UpgradeOrchestrator};
pub use selection::{ExplicitSelection, SelectionProvider};
pub use session::RuntimeSession;
