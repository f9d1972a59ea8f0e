use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrbactError {
    #[error("server not reachable: {0}")]
    NotReachable(String),

    #[error("server start failed: {0}")]
    StartFailure(String),

    #[error("restart of server '{0}' suppressed by crash backoff")]
    BackoffActive(String),

    #[error("server '{0}' did not exit within the stop bound")]
    StopTimeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OrbactError>;
