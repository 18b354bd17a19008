//! Persistence for the job execution manager.
//!
//! [`JobDao`] is the write side the manager depends on. [`SurrealJobDao`]
//! implements it on SurrealDB, which holds job requests, status history and
//! output metadata, while output bytes and captured console output go to the
//! artifact store. The same type exposes the read side.
//!
//! # Features
//!
//! - `memory` (default): in-process `mem://` engine, used by tests
//! - `rocksdb`: persistent `rocksdb://` engine

mod connection;
mod dao;
mod error;
mod schema;
mod surreal_dao;
pub mod repositories;

pub use connection::{Database, DbConfig, DbCredentials, get_db, init_db};
pub use dao::{DaoFuture, JobDao};
pub use error::DbError;
pub use schema::init_schema;
pub use surreal_dao::SurrealJobDao;

/// Connect and make sure the schema exists. Safe to call repeatedly with the
/// same config.
pub async fn init(config: DbConfig) -> Result<(), DbError> {
    init_db(config).await?;
    init_schema().await
}
