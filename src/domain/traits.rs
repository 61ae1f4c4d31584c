use super::error::RuntimeResult;
use super::{Container, ExecCommand, ExecOutput};
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Single point of contact with the container runtime. Everything else in the
/// crate goes through this trait, never through the runtime directly.
pub trait ContainerRuntime: Send + Sync + Debug {
    /// Acquire the runtime connection for one workflow invocation
    fn connect(&self) -> RuntimeResult<()>;

    /// Release the runtime connection. Must be safe to call on any exit path.
    fn disconnect(&self);

    /// Get the current state of a service's container
    fn get_container(&self, service: &str) -> RuntimeResult<Container>;

    /// Stop a service's container. Succeeds if it is already stopped or absent.
    fn stop_container(&self, service: &str) -> RuntimeResult<()>;

    /// Remove a service's container. Succeeds if it is already gone.
    fn remove_container(&self, service: &str) -> RuntimeResult<()>;

    /// Create (if needed) and start a service's container
    fn start_container(&self, service: &str) -> RuntimeResult<()>;

    /// Pull an image by reference
    fn pull_image(&self, image: &str) -> RuntimeResult<()>;

    /// Build the image of a service from its compose build section
    fn build_image(&self, service: &str) -> RuntimeResult<()>;

    /// Remove a named volume. Fails while a running container still uses it.
    fn remove_volume(&self, volume: &str) -> RuntimeResult<()>;

    /// Run a command inside a running service container and capture stdout.
    /// A non-zero exit is reported as `UpgradeError::Exec`.
    fn exec_in_container(&self, service: &str, command: &ExecCommand)
    -> RuntimeResult<ExecOutput>;

    /// Mount destinations currently visible in the service container.
    /// Read-only: never changes the container's running state.
    fn inspect_mounts(&self, service: &str) -> RuntimeResult<BTreeSet<String>>;
}
