use crate::domain::{
    Container, ContainerRuntime, ContainerState, ExecCommand, ExecOutput, RuntimeResult,
    UpgradeError,
};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::{debug, warn};

const MOUNTS_FORMAT: &str = "{{range .Mounts}}{{.Destination}}\n{{end}}";

/// `ContainerRuntime` backed by the docker (or podman) CLI and its compose plugin,
/// run from the compose project directory.
#[derive(Debug, Clone)]
pub struct DockerAdapter {
    binary: String,
    project_dir: PathBuf,
}

impl DockerAdapter {
    pub fn new(binary: &str, project_dir: &Path) -> Self {
        Self {
            binary: binary.to_string(),
            project_dir: project_dir.to_path_buf(),
        }
    }

    fn run<I, S>(&self, args: I) -> std::io::Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args
            .into_iter()
            .map(|item| item.as_ref().to_os_string())
            .collect();
        debug!("{} {:?}", self.binary, args);

        Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .output()
    }

    fn compose<I, S>(&self, args: I) -> std::io::Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut full = vec![OsStr::new("compose").to_os_string()];
        full.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self.run(full)
    }

    fn container_id(&self, service: &str) -> RuntimeResult<Option<String>> {
        let output = self
            .compose(["ps", "-q", service])
            .map_err(|e| container_error("localizar", service, e.to_string()))?;

        if !output.status.success() {
            return Err(container_error("localizar", service, combined(&output)));
        }

        let id = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        Ok(id)
    }
}

impl ContainerRuntime for DockerAdapter {
    fn connect(&self) -> RuntimeResult<()> {
        let output = self
            .run(["info", "--format", "{{.ServerVersion}}"])
            .map_err(|e| UpgradeError::RuntimeUnavailable {
                output: format!("{}: {e}", self.binary),
            })?;

        if !output.status.success() {
            return Err(UpgradeError::RuntimeUnavailable {
                output: combined(&output),
            });
        }

        debug!(
            "Conectado ao runtime {} {}",
            self.binary,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    fn disconnect(&self) {
        // No persistent handle to release.
        debug!("Sessão com {} encerrada", self.binary);
    }

    fn get_container(&self, service: &str) -> RuntimeResult<Container> {
        let output = self
            .compose(["ps", "-a", "--format", "{{.State}}", service])
            .map_err(|e| container_error("inspecionar", service, e.to_string()))?;

        if !output.status.success() {
            return Err(container_error("inspecionar", service, combined(&output)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Container::new(service.to_string(), parse_state(&stdout)))
    }

    fn stop_container(&self, service: &str) -> RuntimeResult<()> {
        if self.get_container(service)?.state != ContainerState::Running {
            debug!("{service} já está parado");
            return Ok(());
        }

        let output = self
            .compose(["stop", service])
            .map_err(|e| container_error("parar", service, e.to_string()))?;
        ensure_success(&output, || container_error("parar", service, combined(&output)))
    }

    fn remove_container(&self, service: &str) -> RuntimeResult<()> {
        if self.get_container(service)?.state == ContainerState::NotCreated {
            debug!("{service} já foi removido");
            return Ok(());
        }

        let output = self
            .compose(["rm", "-f", "-s", service])
            .map_err(|e| container_error("remover", service, e.to_string()))?;
        ensure_success(&output, || container_error("remover", service, combined(&output)))
    }

    fn start_container(&self, service: &str) -> RuntimeResult<()> {
        let output = self
            .compose(["up", "-d", "--wait", service])
            .map_err(|e| UpgradeError::ContainerStart {
                service: service.to_string(),
                output: e.to_string(),
            })?;
        ensure_success(&output, || UpgradeError::ContainerStart {
            service: service.to_string(),
            output: combined(&output),
        })
    }

    fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let output = self
            .run(["pull", image])
            .map_err(|e| image_error("baixar", image, e.to_string()))?;
        ensure_success(&output, || image_error("baixar", image, combined(&output)))
    }

    fn build_image(&self, service: &str) -> RuntimeResult<()> {
        let output = self
            .compose(["build", "--pull", service])
            .map_err(|e| image_error("construir", service, e.to_string()))?;
        ensure_success(&output, || image_error("construir", service, combined(&output)))
    }

    fn remove_volume(&self, volume: &str) -> RuntimeResult<()> {
        let output = self
            .run(["volume", "rm", volume])
            .map_err(|e| UpgradeError::VolumeOperation {
                volume: volume.to_string(),
                output: e.to_string(),
            })?;
        ensure_success(&output, || UpgradeError::VolumeOperation {
            volume: volume.to_string(),
            output: combined(&output),
        })
    }

    fn exec_in_container(
        &self,
        service: &str,
        command: &ExecCommand,
    ) -> RuntimeResult<ExecOutput> {
        let mut args: Vec<String> = vec!["exec".into(), "-T".into()];
        if let Some(user) = &command.user {
            args.push("-u".into());
            args.push(user.clone());
        }
        args.push(service.into());
        args.extend(command.args.iter().cloned());

        let exec_error = |exit_code: Option<i32>, output: String| UpgradeError::Exec {
            service: service.to_string(),
            command: command.display(),
            exit_code,
            output,
        };

        let output = self
            .compose(&args)
            .map_err(|e| exec_error(None, e.to_string()))?;

        if !output.status.success() {
            return Err(exec_error(output.status.code(), combined(&output)));
        }

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_code: output.status.code().unwrap_or_default(),
        })
    }

    fn inspect_mounts(&self, service: &str) -> RuntimeResult<BTreeSet<String>> {
        let Some(id) = self.container_id(service)? else {
            warn!("Nenhum container em execução para {service}");
            return Ok(BTreeSet::new());
        };

        let output = self
            .run(["inspect", "--format", MOUNTS_FORMAT, &id])
            .map_err(|e| container_error("inspecionar", service, e.to_string()))?;

        if !output.status.success() {
            return Err(container_error("inspecionar", service, combined(&output)));
        }

        Ok(parse_mounts(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_state(stdout: &str) -> ContainerState {
    match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
        None => ContainerState::NotCreated,
        Some(state) if state.eq_ignore_ascii_case("running") => ContainerState::Running,
        Some(_) => ContainerState::Stopped,
    }
}

fn parse_mounts(stdout: &str) -> BTreeSet<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn combined(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = format!("{} {}", stderr.trim(), stdout.trim());
    let text = text.trim();
    if text.is_empty() {
        format!("status {:?}", output.status.code())
    } else {
        text.to_string()
    }
}

fn ensure_success<F>(output: &Output, error: F) -> RuntimeResult<()>
where
    F: FnOnce() -> UpgradeError,
{
    if output.status.success() {
        return Ok(());
    }
    Err(error())
}

fn container_error(action: &str, service: &str, output: String) -> UpgradeError {
    UpgradeError::ContainerOperation {
        action: action.to_string(),
        service: service.to_string(),
        output,
    }
}

fn image_error(action: &str, target: &str, output: String) -> UpgradeError {
    UpgradeError::ImageOperation {
        action: action.to_string(),
        target: target.to_string(),
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state(""), ContainerState::NotCreated);
        assert_eq!(parse_state("running\n"), ContainerState::Running);
        assert_eq!(parse_state("exited\n"), ContainerState::Stopped);
        assert_eq!(parse_state("\ncreated\n"), ContainerState::Stopped);
    }

    #[test]
    fn test_parse_mounts_skips_blank_lines() {
        let mounts = parse_mounts("/var/lib/postgresql/data\n\n/var/lib/postgresql/backups\n");
        assert_eq!(mounts.len(), 2);
        assert!(mounts.contains("/var/lib/postgresql/backups"));
    }

    #[test]
    fn test_connect_fails_for_missing_binary() {
        let adapter = DockerAdapter::new("pg-upgrader-no-such-runtime", Path::new("."));
        let result = adapter.connect();
        assert!(matches!(result, Err(UpgradeError::RuntimeUnavailable { .. })));
    }
}
