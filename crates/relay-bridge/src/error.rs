#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("socket missing for project {project_id}: {path}")]
    SocketMissing { project_id: String, path: String },

    #[error("handshake timed out for project {project_id} after {secs}s")]
    ConnectionTimeout { project_id: String, secs: u64 },

    #[error("transport error for project {project_id}: {source}")]
    TransportError {
        project_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown project: {0}")]
    UnknownProject(String),
}
