use thiserror::Error;

pub type C189Result<T> = Result<T, C189Error>;

#[derive(Debug, Error)]
pub enum C189Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("transfer error: {0}")]
    Transfer(String),

    #[error("task error: {0}")]
    Task(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
