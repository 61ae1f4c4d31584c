use crate::domain::{ContainerRuntime, RuntimeResult};
use tracing::debug;

/// Holds the runtime connection for one workflow invocation and releases it
/// when dropped, whichever way the workflow exits.
pub struct RuntimeSession<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> RuntimeSession<'a> {
    pub fn acquire(runtime: &'a dyn ContainerRuntime) -> RuntimeResult<Self> {
        runtime.connect()?;
        debug!("Sessão com o runtime adquirida");
        Ok(Self { runtime })
    }
}

impl Drop for RuntimeSession<'_> {
    fn drop(&mut self) {
        self.runtime.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRuntime;

    #[test]
    fn test_release_on_drop() {
        let mock = MockRuntime::new();
        {
            let _session = RuntimeSession::acquire(&mock).unwrap();
            assert_eq!(mock.get_commands(), vec!["connect"]);
        }
        assert_eq!(mock.get_commands(), vec!["connect", "disconnect"]);
    }

    #[test]
    fn test_failed_connect_does_not_disconnect() {
        let mock = MockRuntime::new();
        mock.set_fail_on("connect");

        assert!(RuntimeSession::acquire(&mock).is_err());
        assert_eq!(mock.get_commands(), vec!["connect"]);
    }
}
