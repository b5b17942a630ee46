use std::env;
use std::fmt;
use std::str::FromStr;

/// Where the engine runs, which decides whether logs reach the console.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExecutionContext {
    /// Linked into a host application that owns the terminal.
    #[default]
    Embedded,
    /// Long-running service; console only when configured.
    Service,
    /// Developer running the engine from a workspace.
    LocalDev,
}

impl ExecutionContext {
    /// Returns `true` when console sinks are off unless explicitly configured.
    pub fn disables_console(self) -> bool {
        matches!(self, ExecutionContext::Embedded | ExecutionContext::Service)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionContext::Embedded => "embedded",
            ExecutionContext::Service => "service",
            ExecutionContext::LocalDev => "local_dev",
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionContext {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "embedded" => Ok(ExecutionContext::Embedded),
            "service" => Ok(ExecutionContext::Service),
            "local_dev" | "local-dev" | "dev" => Ok(ExecutionContext::LocalDev),
            other => Err(format!(
                "invalid execution context '{}'; supported values are embedded, service, local_dev",
                other
            )),
        }
    }
}

/// Read the context from `DOCFLOW_EXECUTION_CONTEXT`, falling back to `Embedded`.
pub fn detect_context() -> ExecutionContext {
    env::var("DOCFLOW_EXECUTION_CONTEXT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or_default()
}
