//! PostgreSQL system of record
//!
//! Connection pooling via deadpool-postgres. The `clients` table carries the
//! uniqueness constraints (`id` primary key, `email` unique) that turn a lost
//! check-then-insert race into a detectable conflict. Deleted ids are kept
//! in `deleted_clients` so a replayed creation cannot bring a row back.

use crate::ClientRepository;
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use wellness_core::{
    ClientId, ClientRecord, ConfigError, NewClient, StorageError, StoreKind, WellnessError,
    WellnessResult,
};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "wellness".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("WELLNESS_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("WELLNESS_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("WELLNESS_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("WELLNESS_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("WELLNESS_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("WELLNESS_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("WELLNESS_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> WellnessResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(self.max_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ConfigError::InvalidValue {
                field: "WELLNESS_DB_*".to_string(),
                value: format!("{}:{}/{}", self.host, self.port, self.dbname),
                reason: e.to_string(),
            })?;

        Ok(pool)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

const CREATE_CLIENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS clients (
    id                  BIGSERIAL PRIMARY KEY,
    full_name           TEXT NOT NULL,
    email               TEXT NOT NULL UNIQUE,
    phone               TEXT NOT NULL,
    advertising_channel TEXT NOT NULL DEFAULT '',
    specialist_id       BIGINT,
    meeting_place       TEXT NOT NULL DEFAULT '',
    occupation          TEXT NOT NULL DEFAULT '',
    gender              TEXT NOT NULL DEFAULT '',
    age                 INTEGER NOT NULL DEFAULT 0,
    reason_for_visit    TEXT NOT NULL DEFAULT '',
    specialist_notes    TEXT NOT NULL DEFAULT '',
    created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS deleted_clients (
    id                  BIGINT PRIMARY KEY,
    deleted_at          TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Advance the id sequence past an explicitly inserted id. Never moves it
/// backwards, so ids handed out earlier are not reissued.
const ADVANCE_ID_SEQUENCE: &str =
    "SELECT setval('clients_id_seq', GREATEST($1::BIGINT, last_value)) FROM clients_id_seq";

const COLUMNS: &str = "id, full_name, email, phone, advertising_channel, specialist_id, \
     meeting_place, occupation, gender, age, reason_for_visit, specialist_notes, \
     created_at, updated_at";

// ============================================================================
// REPOSITORY
// ============================================================================

/// Client repository over a deadpool-postgres pool.
#[derive(Clone)]
pub struct PgClientRepository {
    pool: Pool,
}

impl PgClientRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the `clients` and `deleted_clients` tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> WellnessResult<()> {
        let conn = self.conn().await?;
        conn.batch_execute(CREATE_CLIENTS_TABLE)
            .await
            .map_err(|e| map_pg_error(0, e))?;
        tracing::info!("clients table ready");
        Ok(())
    }

    async fn conn(&self) -> WellnessResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            StorageError::Unavailable {
                store: StoreKind::SystemOfRecord,
                reason: format!("Failed to get connection: {}", e),
            }
            .into()
        })
    }
}

fn map_pg_error(id: ClientId, err: tokio_postgres::Error) -> WellnessError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        let reason = err
            .as_db_error()
            .map(|db| db.message().to_string())
            .unwrap_or_else(|| err.to_string());
        return StorageError::Conflict {
            store: StoreKind::SystemOfRecord,
            id,
            reason,
        }
        .into();
    }
    if err.is_closed() {
        return StorageError::Unavailable {
            store: StoreKind::SystemOfRecord,
            reason: err.to_string(),
        }
        .into();
    }
    StorageError::OperationFailed {
        store: StoreKind::SystemOfRecord,
        reason: err.to_string(),
    }
    .into()
}

fn to_db_id(id: ClientId) -> WellnessResult<i64> {
    i64::try_from(id).map_err(|_| {
        StorageError::OperationFailed {
            store: StoreKind::SystemOfRecord,
            reason: format!("id {} exceeds BIGINT range", id),
        }
        .into()
    })
}

fn to_db_specialist(specialist_id: Option<u64>) -> Option<i64> {
    specialist_id.and_then(|id| i64::try_from(id).ok())
}

fn to_db_age(age: u32) -> i32 {
    i32::try_from(age).unwrap_or(i32::MAX)
}

fn row_to_record(row: &Row) -> WellnessResult<ClientRecord> {
    let column = |e: tokio_postgres::Error| -> WellnessError {
        StorageError::Serialization {
            store: StoreKind::SystemOfRecord,
            reason: e.to_string(),
        }
        .into()
    };

    let id: i64 = row.try_get("id").map_err(column)?;
    let specialist_id: Option<i64> = row.try_get("specialist_id").map_err(column)?;
    let age: i32 = row.try_get("age").map_err(column)?;

    Ok(ClientRecord {
        id: id.max(0) as ClientId,
        full_name: row.try_get("full_name").map_err(column)?,
        email: row.try_get("email").map_err(column)?,
        phone: row.try_get("phone").map_err(column)?,
        advertising_channel: row.try_get("advertising_channel").map_err(column)?,
        specialist_id: specialist_id.map(|s| s.max(0) as u64),
        meeting_place: row.try_get("meeting_place").map_err(column)?,
        occupation: row.try_get("occupation").map_err(column)?,
        gender: row.try_get("gender").map_err(column)?,
        age: age.max(0) as u32,
        reason_for_visit: row.try_get("reason_for_visit").map_err(column)?,
        specialist_notes: row.try_get("specialist_notes").map_err(column)?,
        created_at: row.try_get("created_at").map_err(column)?,
        updated_at: row.try_get("updated_at").map_err(column)?,
    })
}

#[async_trait]
impl ClientRepository for PgClientRepository {
    async fn create(&self, draft: &NewClient) -> WellnessResult<ClientRecord> {
        let conn = self.conn().await?;
        let sql = format!(
            "INSERT INTO clients (full_name, email, phone, advertising_channel, specialist_id, \
             meeting_place, occupation, gender, age, reason_for_visit, specialist_notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {}",
            COLUMNS
        );
        let row = conn
            .query_one(
                sql.as_str(),
                &[
                    &draft.full_name,
                    &draft.email,
                    &draft.phone,
                    &draft.advertising_channel,
                    &to_db_specialist(draft.specialist_id),
                    &draft.meeting_place,
                    &draft.occupation,
                    &draft.gender,
                    &to_db_age(draft.age),
                    &draft.reason_for_visit,
                    &draft.specialist_notes,
                ],
            )
            .await
            .map_err(|e| map_pg_error(0, e))?;
        row_to_record(&row)
    }

    async fn insert(&self, record: &ClientRecord) -> WellnessResult<()> {
        let conn = self.conn().await?;
        let id = to_db_id(record.id)?;
        let inserted = conn
            .execute(
                "INSERT INTO clients (id, full_name, email, phone, advertising_channel, \
                 specialist_id, meeting_place, occupation, gender, age, reason_for_visit, \
                 specialist_notes, created_at, updated_at) \
                 SELECT $1::BIGINT, $2::TEXT, $3::TEXT, $4::TEXT, $5::TEXT, $6::BIGINT, \
                 $7::TEXT, $8::TEXT, $9::TEXT, $10::INTEGER, $11::TEXT, $12::TEXT, \
                 COALESCE($13::TIMESTAMPTZ, now()), COALESCE($14::TIMESTAMPTZ, now()) \
                 WHERE NOT EXISTS (SELECT 1 FROM deleted_clients WHERE id = $1)",
                &[
                    &id,
                    &record.full_name,
                    &record.email,
                    &record.phone,
                    &record.advertising_channel,
                    &to_db_specialist(record.specialist_id),
                    &record.meeting_place,
                    &record.occupation,
                    &record.gender,
                    &to_db_age(record.age),
                    &record.reason_for_visit,
                    &record.specialist_notes,
                    &record.created_at,
                    &record.updated_at,
                ],
            )
            .await
            .map_err(|e| map_pg_error(record.id, e))?;

        if inserted == 0 {
            return Err(StorageError::Conflict {
                store: StoreKind::SystemOfRecord,
                id: record.id,
                reason: format!("client {} was deleted", record.id),
            }
            .into());
        }

        conn.execute(ADVANCE_ID_SEQUENCE, &[&id])
            .await
            .map_err(|e| map_pg_error(record.id, e))?;
        Ok(())
    }

    async fn get(&self, id: ClientId) -> WellnessResult<Option<ClientRecord>> {
        let conn = self.conn().await?;
        let db_id = to_db_id(id)?;
        let sql = format!("SELECT {} FROM clients WHERE id = $1", COLUMNS);
        let row = conn
            .query_opt(sql.as_str(), &[&db_id])
            .await
            .map_err(|e| map_pg_error(id, e))?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn update(&self, record: &ClientRecord) -> WellnessResult<ClientRecord> {
        let conn = self.conn().await?;
        let id = to_db_id(record.id)?;
        let sql = format!(
            "UPDATE clients SET full_name = $2, email = $3, phone = $4, \
             advertising_channel = $5, specialist_id = $6, meeting_place = $7, \
             occupation = $8, gender = $9, age = $10, reason_for_visit = $11, \
             specialist_notes = $12, updated_at = COALESCE($13, now()) \
             WHERE id = $1 RETURNING {}",
            COLUMNS
        );
        let row = conn
            .query_opt(
                sql.as_str(),
                &[
                    &id,
                    &record.full_name,
                    &record.email,
                    &record.phone,
                    &record.advertising_channel,
                    &to_db_specialist(record.specialist_id),
                    &record.meeting_place,
                    &record.occupation,
                    &record.gender,
                    &to_db_age(record.age),
                    &record.reason_for_visit,
                    &record.specialist_notes,
                    &record.updated_at,
                ],
            )
            .await
            .map_err(|e| map_pg_error(record.id, e))?;

        match row {
            Some(row) => row_to_record(&row),
            None => Err(StorageError::NotFound {
                store: StoreKind::SystemOfRecord,
                id: record.id,
            }
            .into()),
        }
    }

    async fn delete(&self, id: ClientId) -> WellnessResult<ClientRecord> {
        let conn = self.conn().await?;
        let db_id = to_db_id(id)?;
        let sql = format!(
            "WITH gone AS (DELETE FROM clients WHERE id = $1 RETURNING {cols}), \
             marked AS (INSERT INTO deleted_clients (id) SELECT id FROM gone \
             ON CONFLICT (id) DO NOTHING) \
             SELECT {cols} FROM gone",
            cols = COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&db_id])
            .await
            .map_err(|e| map_pg_error(id, e))?;

        match row {
            Some(row) => row_to_record(&row),
            None => Err(StorageError::NotFound {
                store: StoreKind::SystemOfRecord,
                id,
            }
            .into()),
        }
    }

    async fn ping(&self) -> WellnessResult<()> {
        let conn = self.conn().await?;
        conn.execute("SELECT 1", &[])
            .await
            .map_err(|e| map_pg_error(0, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "wellness");
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_id_conversion_bounds() {
        assert_eq!(to_db_id(42).expect("small id converts"), 42);
        assert!(to_db_id(u64::MAX).is_err());
        assert_eq!(to_db_specialist(Some(u64::MAX)), None);
        assert_eq!(to_db_age(u32::MAX), i32::MAX);
    }

    #[test]
    fn test_schema_declares_uniqueness() {
        assert!(CREATE_CLIENTS_TABLE.contains("id                  BIGSERIAL PRIMARY KEY"));
        assert!(CREATE_CLIENTS_TABLE.contains("email               TEXT NOT NULL UNIQUE"));
        assert!(CREATE_CLIENTS_TABLE.contains("CREATE TABLE IF NOT EXISTS deleted_clients"));
    }

    #[test]
    fn test_sequence_advance_never_rewinds() {
        assert!(ADVANCE_ID_SEQUENCE.contains("GREATEST($1::BIGINT, last_value)"));
        assert!(!ADVANCE_ID_SEQUENCE.contains("MAX(id)"));
    }
}
