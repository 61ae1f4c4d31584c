use crate::domain::{ContainerRuntime, ContainerState, RuntimeResult};
use std::sync::Arc;
use tracing::{info, warn};

/// State-aware container lifecycle on top of a [`ContainerRuntime`]
pub struct ContainerService {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerService {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn start(&self, name: &str) -> RuntimeResult<()> {
        info!(" Iniciando {name}...");
        self.runtime.start_container(name)
    }

    pub fn stop(&self, name: &str) -> RuntimeResult<()> {
        let container = self.runtime.get_container(name)?;

        match container.state {
            ContainerState::Running => {
                info!(" Parando {name}...");
                self.runtime.stop_container(name)
            }
            ContainerState::Stopped | ContainerState::NotCreated => {
                warn!("  {name} já está parado ou não foi criado");
                Ok(())
            }
        }
    }

    pub fn remove(&self, name: &str) -> RuntimeResult<()> {
        let container = self.runtime.get_container(name)?;

        match container.state {
            ContainerState::NotCreated => {
                warn!("  {name} já foi removido");
                Ok(())
            }
            ContainerState::Running | ContainerState::Stopped => {
                info!(" Removendo container {name}...");
                self.runtime.remove_container(name)
            }
        }
    }

    /// Stop followed by start
    pub fn restart(&self, name: &str) -> RuntimeResult<()> {
        self.stop(name)?;
        self.start(name)
    }
}
