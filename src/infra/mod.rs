pub mod compose;
pub mod config;
pub mod credentials;
pub mod docker_adapter;

pub use compose::{ComposeProject, ComposeService};
pub use config::{MountPolicy, UpgradeSettings};
pub use docker_adapter::DockerAdapter;
