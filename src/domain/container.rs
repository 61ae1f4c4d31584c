#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
    NotCreated,
}

#[derive(Debug, Clone)]
pub struct Container {
    pub name: String,
    pub state: ContainerState,
}

impl Container {
    pub fn new(name: String, state: ContainerState) -> Self {
        Self { name, state }
    }
}

/// A command to run inside a service container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCommand {
    /// User to run as inside the container (`-u`)
    pub user: Option<String>,
    pub args: Vec<String>,
}

impl ExecCommand {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user: None,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn as_user(mut self, user: Option<&str>) -> Self {
        self.user = user.map(str::to_string);
        self
    }

    /// Single-line rendering used in logs and error messages
    pub fn display(&self) -> String {
        self.args.join(" ")
    }
}

/// Captured result of an [`ExecCommand`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            exit_code: 0,
        }
    }
}
