use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Immutable description of one supervised invocation.
///
/// Environment overrides are captured when the `RunSpec` is built and are
/// applied only to the spawned child; the supervisor never touches its own
/// process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    executable: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    stall_timeout: Duration,
}

impl RunSpec {
    pub fn new(executable: impl Into<String>, stall_timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            stall_timeout,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn env_overrides(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn stall_timeout(&self) -> Duration {
        self.stall_timeout
    }

    /// Command line for display, e.g. `python3 extract.py --pop_size 20`.
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
