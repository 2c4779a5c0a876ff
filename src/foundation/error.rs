pub type MatrixResult<T> = Result<T, MatrixError>;

#[derive(thiserror::Error, Debug)]
pub enum MatrixError {
    #[error("canceled")]
    Canceled,

    #[error("controller closed")]
    Closed,

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("layer error: {0}")]
    Layer(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MatrixError {
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn layer(msg: impl Into<String>) -> Self {
        Self::Layer(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors that mean "stop": a canceled token or a closed controller.
    /// These are propagated and never retried.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Canceled | Self::Closed)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
