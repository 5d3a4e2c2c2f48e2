use thiserror::Error;

/// Errors that can occur while a trajectory is set up or propagated.
#[derive(Error, Debug)]
pub enum SurfaceHoppingError {
    /// Missing or inconsistent energies, gradients or couplings of the backend.
    /// The current step is aborted and the trajectory halts.
    #[error("backend data error at step {step}: {message}")]
    BackendData { step: usize, message: String },

    /// The density matrix lost its unit trace or its hermiticity.
    /// The engine recovers from this error by renormalization.
    #[error(
        "numerical drift of the density matrix (trace deviation {trace_deviation:.3e}, \
         hermiticity deviation {hermiticity_deviation:.3e})"
    )]
    NumericalDrift {
        trace_deviation: f64,
        hermiticity_deviation: f64,
    },

    /// The couplings are so large that the electronic integration would need
    /// more small steps than allowed. The trajectory halts.
    #[error("electronic integration needs {required:e} small steps, the limit is {limit}")]
    IntegrationLimit { required: f64, limit: usize },

    /// Invalid settings, detected before the first step.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SurfaceHoppingError {
    pub fn backend(step: usize, message: impl Into<String>) -> Self {
        SurfaceHoppingError::BackendData {
            step,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        SurfaceHoppingError::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, SurfaceHoppingError>;
