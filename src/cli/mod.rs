pub mod context;
pub mod workflow;

pub use context::{SelectionArgs, UpgradeContext};
pub use workflow::WorkflowCommand;
