//! The process-wide SurrealDB connection.
//!
//! Job state is shared by everything in the process, so there is exactly one
//! connection. It is opened by [`init_db`] and handed out by [`get_db`].

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;
use tokio::sync::OnceCell;

use crate::DbError;

pub type Database = Surreal<Any>;

struct Connection {
    endpoint: String,
    db: Database,
}

static CONNECTION: OnceCell<Connection> = OnceCell::const_new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// `mem://`, `rocksdb://<path>`, `ws://<host>`...
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    /// Root sign-in, for remote servers.
    pub credentials: Option<DbCredentials>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl DbConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: "jobs".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }

    /// In-process storage that disappears with the process.
    pub fn memory() -> Self {
        Self::new("mem://")
    }

    /// Local persistent storage; needs the `rocksdb` feature.
    pub fn rocksdb(path: impl AsRef<str>) -> Self {
        Self::new(format!("rocksdb://{}", path.as_ref()))
    }

    /// Creates configuration from environment variables
    ///
    /// - DATABASE_URL (optional, default: mem://)
    /// - DATABASE_NAMESPACE (optional, default: jobs)
    /// - DATABASE_NAME (optional, default: main)
    /// - DATABASE_USER / DATABASE_PASSWORD (optional, both or neither)
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let mut config = var("DATABASE_URL").map_or_else(Self::memory, Self::new);
        if let Some(namespace) = var("DATABASE_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Some(database) = var("DATABASE_NAME") {
            config.database = database;
        }
        if let (Some(username), Some(password)) = (var("DATABASE_USER"), var("DATABASE_PASSWORD")) {
            config.credentials = Some(DbCredentials { username, password });
        }
        config
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(DbCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

/// Open the process-wide connection.
///
/// Only the first call connects. Later calls for the same endpoint return the
/// existing connection; a different endpoint fails with
/// [`DbError::AlreadyInitialized`].
pub async fn init_db(config: DbConfig) -> Result<&'static Database, DbError> {
    let connection = CONNECTION.get_or_try_init(|| open(&config)).await?;
    if connection.endpoint != config.endpoint {
        return Err(DbError::AlreadyInitialized);
    }
    Ok(&connection.db)
}

async fn open(config: &DbConfig) -> Result<Connection, DbError> {
    tracing::info!("Connecting to database: {}", config.endpoint);
    let db = connect(config.endpoint.as_str()).await?;

    if let Some(credentials) = &config.credentials {
        db.signin(Root {
            username: &credentials.username,
            password: &credentials.password,
        })
        .await?;
    }
    db.use_ns(&config.namespace).use_db(&config.database).await?;

    tracing::info!("Using database {}/{}", config.namespace, config.database);
    Ok(Connection {
        endpoint: config.endpoint.clone(),
        db,
    })
}

pub fn get_db() -> Result<&'static Database, DbError> {
    CONNECTION
        .get()
        .map(|connection| &connection.db)
        .ok_or(DbError::NotInitialized)
}
