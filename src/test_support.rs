use crate::domain::{
    Container, ContainerRuntime, ContainerState, ExecCommand, ExecOutput, RuntimeResult,
    UpgradeError,
};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::RwLock;

/// Scripted reply for an in-container command
#[derive(Debug, Clone)]
pub enum ExecReply {
    Output(String),
    Failure { exit_code: i32, output: String },
}

/// In-memory runtime that records every call as `"op:target"`.
///
/// Exec replies are matched by substring against the rendered command; the
/// first matching rule wins. A rule with several replies hands them out in
/// order and then keeps repeating the last one. Unmatched commands succeed
/// with empty output.
#[derive(Debug)]
pub struct MockRuntime {
    containers: RwLock<HashMap<String, ContainerState>>,
    volumes: RwLock<HashMap<String, String>>,
    mounts: RwLock<HashMap<String, BTreeSet<String>>>,
    mount_views: RwLock<VecDeque<BTreeSet<String>>>,
    exec_rules: RwLock<Vec<(String, VecDeque<ExecReply>)>>,
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<Option<String>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            volumes: RwLock::new(HashMap::new()),
            mounts: RwLock::new(HashMap::new()),
            mount_views: RwLock::new(VecDeque::new()),
            exec_rules: RwLock::new(Vec::new()),
            commands: RwLock::new(Vec::new()),
            fail_on: RwLock::new(None),
        }
    }

    pub fn add_container(&self, name: &str, state: ContainerState) {
        self.containers
            .write()
            .unwrap()
            .insert(name.to_string(), state);
    }

    /// Registers a named volume used by `service`
    pub fn add_volume(&self, volume: &str, service: &str) {
        self.volumes
            .write()
            .unwrap()
            .insert(volume.to_string(), service.to_string());
    }

    pub fn volume_exists(&self, volume: &str) -> bool {
        self.volumes.read().unwrap().contains_key(volume)
    }

    /// Mount set reported by `inspect_mounts` once scripted views run out
    pub fn set_mounts(&self, service: &str, paths: &[&str]) {
        self.mounts.write().unwrap().insert(
            service.to_string(),
            paths.iter().map(|p| p.to_string()).collect(),
        );
    }

    /// Queues a one-shot mount set for the next `inspect_mounts` call
    pub fn push_mount_view(&self, paths: &[&str]) {
        self.mount_views
            .write()
            .unwrap()
            .push_back(paths.iter().map(|p| p.to_string()).collect());
    }

    pub fn on_exec(&self, pattern: &str, reply: ExecReply) {
        let mut rules = self.exec_rules.write().unwrap();
        match rules.iter_mut().find(|(p, _)| p == pattern) {
            Some((_, replies)) => replies.push_back(reply),
            None => rules.push((pattern.to_string(), VecDeque::from([reply]))),
        }
    }

    pub fn on_exec_output(&self, pattern: &str, stdout: &str) {
        self.on_exec(pattern, ExecReply::Output(stdout.to_string()));
    }

    pub fn set_fail_on(&self, operation: &str) {
        *self.fail_on.write().unwrap() = Some(operation.to_string());
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    pub fn count_commands(&self, prefix: &str) -> usize {
        self.commands
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn get_state(&self, name: &str) -> Option<ContainerState> {
        self.containers.read().unwrap().get(name).cloned()
    }

    fn record_command(&self, cmd: &str) {
        self.commands.write().unwrap().push(cmd.to_string());
    }

    fn check_fail(&self, operation: &str, target: &str) -> RuntimeResult<()> {
        let fail_on = self.fail_on.read().unwrap();
        if fail_on.as_deref() != Some(operation) {
            return Ok(());
        }

        let output = format!("Mock failure on: {operation}");
        Err(match operation {
            "connect" => UpgradeError::RuntimeUnavailable { output },
            "start" => UpgradeError::ContainerStart {
                service: target.to_string(),
                output,
            },
            "pull_image" | "build_image" => UpgradeError::ImageOperation {
                action: operation.to_string(),
                target: target.to_string(),
                output,
            },
            "remove_volume" => UpgradeError::VolumeOperation {
                volume: target.to_string(),
                output,
            },
            _ => UpgradeError::ContainerOperation {
                action: operation.to_string(),
                service: target.to_string(),
                output,
            },
        })
    }

    fn next_reply(&self, rendered: &str) -> Option<ExecReply> {
        let mut rules = self.exec_rules.write().unwrap();
        let (_, replies) = rules
            .iter_mut()
            .find(|(pattern, _)| rendered.contains(pattern.as_str()))?;

        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime for MockRuntime {
    fn connect(&self) -> RuntimeResult<()> {
        self.record_command("connect");
        self.check_fail("connect", "runtime")
    }

    fn disconnect(&self) {
        self.record_command("disconnect");
    }

    fn get_container(&self, name: &str) -> RuntimeResult<Container> {
        self.record_command(&format!("get_container:{name}"));
        self.check_fail("get_container", name)?;

        let state = self.get_state(name).unwrap_or(ContainerState::NotCreated);
        Ok(Container::new(name.to_string(), state))
    }

    fn stop_container(&self, name: &str) -> RuntimeResult<()> {
        self.record_command(&format!("stop:{name}"));
        self.check_fail("stop", name)?;

        if let Some(state) = self.containers.write().unwrap().get_mut(name) {
            *state = ContainerState::Stopped;
        }
        Ok(())
    }

    fn remove_container(&self, name: &str) -> RuntimeResult<()> {
        self.record_command(&format!("remove:{name}"));
        self.check_fail("remove", name)?;

        self.containers.write().unwrap().remove(name);
        Ok(())
    }

    fn start_container(&self, name: &str) -> RuntimeResult<()> {
        self.record_command(&format!("start:{name}"));
        self.check_fail("start", name)?;

        self.containers
            .write()
            .unwrap()
            .insert(name.to_string(), ContainerState::Running);
        Ok(())
    }

    fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        self.record_command(&format!("pull_image:{image}"));
        self.check_fail("pull_image", image)
    }

    fn build_image(&self, service: &str) -> RuntimeResult<()> {
        self.record_command(&format!("build_image:{service}"));
        self.check_fail("build_image", service)
    }

    fn remove_volume(&self, volume: &str) -> RuntimeResult<()> {
        self.record_command(&format!("remove_volume:{volume}"));
        self.check_fail("remove_volume", volume)?;

        let owner = self.volumes.read().unwrap().get(volume).cloned();
        match owner {
            None => Err(UpgradeError::VolumeOperation {
                volume: volume.to_string(),
                output: "no such volume".to_string(),
            }),
            Some(service) if self.get_state(&service) == Some(ContainerState::Running) => {
                Err(UpgradeError::VolumeOperation {
                    volume: volume.to_string(),
                    output: format!("volume is in use by running container {service}"),
                })
            }
            Some(_) => {
                self.volumes.write().unwrap().remove(volume);
                Ok(())
            }
        }
    }

    fn exec_in_container(
        &self,
        service: &str,
        command: &ExecCommand,
    ) -> RuntimeResult<ExecOutput> {
        let rendered = command.display();
        self.record_command(&format!("exec:{service}:{rendered}"));
        self.check_fail("exec", service)?;

        if self.get_state(service) != Some(ContainerState::Running) {
            return Err(UpgradeError::Exec {
                service: service.to_string(),
                command: rendered,
                exit_code: None,
                output: format!("container {service} is not running"),
            });
        }

        match self.next_reply(&rendered) {
            None => Ok(ExecOutput::success("")),
            Some(ExecReply::Output(stdout)) => Ok(ExecOutput::success(&stdout)),
            Some(ExecReply::Failure { exit_code, output }) => Err(UpgradeError::Exec {
                service: service.to_string(),
                command: rendered,
                exit_code: Some(exit_code),
                output,
            }),
        }
    }

    fn inspect_mounts(&self, service: &str) -> RuntimeResult<BTreeSet<String>> {
        self.record_command(&format!("inspect_mounts:{service}"));
        self.check_fail("inspect_mounts", service)?;

        if let Some(view) = self.mount_views.write().unwrap().pop_front() {
            return Ok(view);
        }

        Ok(self
            .mounts
            .read()
            .unwrap()
            .get(service)
            .cloned()
            .unwrap_or_default())
    }
}
