use thiserror::Error;

/// Errors that decide process fate or must be told apart by callers.
/// Plumbing-level failures stay `anyhow` with context; these are the cases
/// the CLI maps to distinct exit codes and the prompt builder reports as
/// hard defects.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Neither a hosted key nor a reachable local daemon at startup.
    #[error("no model provider available")]
    ProviderUnavailable(String),

    /// Local daemon reachable but lists zero usable models.
    #[error("no local models found")]
    NoModelsFound,

    /// Prompt assembly invoked without a mandatory template variable.
    #[error("missing required template variable: {0}")]
    MissingRequiredVariable(&'static str),
}

impl ChatError {
    /// Process exit code for fatal startup errors. Success / no-op is 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            ChatError::ProviderUnavailable(_) => 1,
            ChatError::NoModelsFound => 4,
            ChatError::MissingRequiredVariable(_) => 1,
        }
    }
}
