/// Binary-level error: a message plus the process exit code.
///
/// Exit codes:
/// - `2` input / configuration problems
/// - `3` insufficient or degenerate data
/// - `4` internal failures
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Errors raised by the fitting core.
///
/// Only `MalformedInput` is expected to leave the core in steady state; the
/// other variants are resolved by the selector into fallbacks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("degenerate {complex} window: {reason}")]
    DegenerateWindow { complex: String, reason: String },

    #[error("reduced chi-square undefined: {n_points} points for {n_free} free parameters")]
    UndefinedReducedChiSquare { n_points: usize, n_free: usize },

    #[error("invalid tie on '{param}': {reason}")]
    InvalidTie { param: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let exit_code = match &err {
            FitError::MalformedInput(_) | FitError::InvalidConfig(_) => 2,
            FitError::DegenerateWindow { .. } | FitError::UndefinedReducedChiSquare { .. } => 3,
            FitError::InvalidTie { .. } => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}
