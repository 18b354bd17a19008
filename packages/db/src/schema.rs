//! Database schema definitions using SurrealQL.

use crate::{DbError, get_db};

/// Initialize the database schema.
///
/// Every statement is idempotent, so this is safe to run on each start.
pub async fn init_schema() -> Result<(), DbError> {
    let db = get_db()?;

    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;
    db.query(JOB_STATUS_SCHEMA).await?.check()?;
    db.query(JOB_OUTPUT_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Persisted job requests, keyed by job id.
const JOB_SCHEMA: &str = r#"
-- Spec and inputs are free-form, so the table stays schemaless
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS owner ON job TYPE string;
DEFINE FIELD IF NOT EXISTS name ON job TYPE string;
DEFINE FIELD IF NOT EXISTS spec ON job FLEXIBLE TYPE object;
DEFINE FIELD IF NOT EXISTS inputs ON job FLEXIBLE TYPE object;

DEFINE INDEX IF NOT EXISTS job_job_id ON job FIELDS job_id UNIQUE;
DEFINE INDEX IF NOT EXISTS job_owner ON job FIELDS owner;
"#;

/// Append-only status history, one row per transition.
const JOB_STATUS_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job_status SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON job_status TYPE string;
DEFINE FIELD IF NOT EXISTS status ON job_status TYPE string;
DEFINE FIELD IF NOT EXISTS message ON job_status TYPE string;
DEFINE FIELD IF NOT EXISTS sequence ON job_status TYPE int;
DEFINE FIELD IF NOT EXISTS timestamp ON job_status TYPE string;

DEFINE INDEX IF NOT EXISTS job_status_job ON job_status FIELDS job_id;
DEFINE INDEX IF NOT EXISTS job_status_order ON job_status FIELDS job_id, sequence;
"#;

/// Output metadata; the bytes themselves live in the artifact store.
const JOB_OUTPUT_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job_output SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON job_output TYPE string;
DEFINE FIELD IF NOT EXISTS output_id ON job_output TYPE string;
DEFINE FIELD IF NOT EXISTS mime_type ON job_output TYPE string;
DEFINE FIELD IF NOT EXISTS size_bytes ON job_output TYPE int;
DEFINE FIELD IF NOT EXISTS name ON job_output TYPE option<string>;
DEFINE FIELD IF NOT EXISTS description ON job_output TYPE option<string>;
DEFINE FIELD IF NOT EXISTS metadata ON job_output FLEXIBLE TYPE object;

DEFINE INDEX IF NOT EXISTS job_output_key ON job_output FIELDS job_id, output_id UNIQUE;
"#;
