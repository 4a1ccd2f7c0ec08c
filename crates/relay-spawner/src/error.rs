use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("worker {0} is already active")]
    AlreadyExists(String),

    #[error("spawner is at capacity ({0} workers)")]
    AtCapacity(u32),

    #[error("worker {0} did not register within the registration window")]
    FailedToRegister(String),

    #[error("failed to launch pty for {name} running {command}: {source}")]
    Launch {
        name: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pty write failed: {0}")]
    Write(std::io::Error),

    #[error("failed to open log file {0:?}: {1}")]
    LogFile(PathBuf, std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
