use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database not initialized - call init_db first")]
    NotInitialized,
    /// The process is already connected to a different endpoint.
    #[error("Database already initialized")]
    AlreadyInitialized,
    #[error("Connection error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Artifact storage error: {0}")]
    Storage(#[from] storage::StorageError),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}
