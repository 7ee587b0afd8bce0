use crate::types::{AppError, Result};
use libsql::{Builder, Connection, Database, Transaction};
use std::{ops::Deref, path::Path, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS departments (
    department_id INTEGER PRIMARY KEY AUTOINCREMENT,
    department_code TEXT NOT NULL UNIQUE,
    department_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_accounts (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    user_type TEXT NOT NULL
        CHECK (user_type IN ('ADMIN', 'HOD', 'STAFF', 'FACULTY', 'STUDENT')),
    department_id INTEGER REFERENCES departments(department_id),
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS degree_levels (
    degree_level_id INTEGER PRIMARY KEY AUTOINCREMENT,
    level_name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS programmes (
    programme_id INTEGER PRIMARY KEY AUTOINCREMENT,
    programme_name TEXT NOT NULL UNIQUE,
    degree_level_id INTEGER NOT NULL REFERENCES degree_levels(degree_level_id),
    minimum_duration_years INTEGER NOT NULL,
    maximum_duration_years INTEGER,
    department_id INTEGER NOT NULL REFERENCES departments(department_id),
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS batches (
    batch_id INTEGER PRIMARY KEY AUTOINCREMENT,
    programme_id INTEGER NOT NULL REFERENCES programmes(programme_id),
    department_id INTEGER NOT NULL REFERENCES departments(department_id),
    batch_name TEXT NOT NULL,
    start_year INTEGER NOT NULL,
    start_semester TEXT NOT NULL CHECK (start_semester IN ('SPRING', 'AUTUMN')),
    is_active INTEGER NOT NULL DEFAULT 1,
    UNIQUE (programme_id, batch_name)
);

CREATE TABLE IF NOT EXISTS student_profiles (
    user_id INTEGER PRIMARY KEY REFERENCES user_accounts(user_id) ON DELETE CASCADE,
    department_id INTEGER NOT NULL REFERENCES departments(department_id),
    batch_id INTEGER REFERENCES batches(batch_id),
    roll_number TEXT UNIQUE,
    date_of_birth TEXT,
    phone_number_self TEXT,
    phone_number_guardian TEXT,
    current_address TEXT,
    permanent_address TEXT
);

CREATE TABLE IF NOT EXISTS faculty_profiles (
    user_id INTEGER PRIMARY KEY REFERENCES user_accounts(user_id) ON DELETE CASCADE,
    department_id INTEGER NOT NULL REFERENCES departments(department_id)
);

CREATE TABLE IF NOT EXISTS association_types (
    association_type_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS faculty_student_associations (
    faculty_id INTEGER NOT NULL REFERENCES user_accounts(user_id) ON DELETE CASCADE,
    student_id INTEGER NOT NULL REFERENCES user_accounts(user_id) ON DELETE CASCADE,
    association_type_id INTEGER NOT NULL REFERENCES association_types(association_type_id),
    PRIMARY KEY (faculty_id, student_id, association_type_id)
);

CREATE TABLE IF NOT EXISTS revoked_tokens (
    token_hash TEXT PRIMARY KEY,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_user_accounts_department ON user_accounts(department_id);
CREATE INDEX IF NOT EXISTS idx_batches_programme ON batches(programme_id);
CREATE INDEX IF NOT EXISTS idx_student_profiles_batch ON student_profiles(batch_id);
CREATE INDEX IF NOT EXISTS idx_associations_student ON faculty_student_associations(student_id);
";

/// libsql-backed credential and academic record store.
///
/// A `:memory:` database lives only as long as its connection, so that mode
/// keeps one shared connection. Every write goes through the write gate,
/// either as a transaction ([`DbClient::begin`]) or a single statement
/// ([`DbClient::writer`]), so no write lands inside another request's
/// transaction.
pub struct DbClient {
    db: Database,
    shared: Option<Connection>,
    write_gate: Arc<Mutex<()>>,
}

/// An open transaction holding the write gate until it is finished.
pub struct DbTx {
    tx: Transaction,
    _gate: OwnedMutexGuard<()>,
}

impl Deref for DbTx {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}

/// A connection holding the write gate, for writes that need no transaction.
pub struct DbWriter {
    conn: Connection,
    _gate: OwnedMutexGuard<()>,
}

impl Deref for DbWriter {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DbClient {
    /// Opens the database named by `url` and creates the schema.
    ///
    /// Accepts `:memory:`, a plain path, or a `file:` prefixed path.
    pub async fn new(url: &str) -> Result<Self> {
        if url == ":memory:" {
            return Self::new_memory().await;
        }
        Self::new_local(url.strip_prefix("file:").unwrap_or(url)).await
    }

    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open in-memory database: {}", e)))?;
        let conn = db
            .connect()
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))?;
        Self::configure(&conn).await?;

        let client = Self {
            db,
            shared: Some(conn),
            write_gate: Arc::new(Mutex::new(())),
        };
        client.initialize_schema().await?;

        Ok(client)
    }

    pub async fn new_local(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Database(format!("Failed to create database directory: {}", e))
            })?;
        }

        let db = Builder::new_local(path).build().await.map_err(|e| {
            AppError::Database(format!("Failed to open database {}: {}", path.display(), e))
        })?;

        let client = Self {
            db,
            shared: None,
            write_gate: Arc::new(Mutex::new(())),
        };
        client.initialize_schema().await?;

        Ok(client)
    }

    async fn configure(conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| AppError::Database(format!("Failed to enable foreign keys: {}", e)))?;
        Ok(())
    }

    /// Returns a connection with foreign key enforcement enabled.
    pub async fn connection(&self) -> Result<Connection> {
        if let Some(conn) = &self.shared {
            return Ok(conn.clone());
        }

        let conn = self
            .db
            .connect()
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))?;
        Self::configure(&conn).await?;
        conn.query("PRAGMA busy_timeout = 5000", ())
            .await
            .map_err(|e| AppError::Database(format!("Failed to set busy timeout: {}", e)))?;

        Ok(conn)
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection().await?;

        conn.execute_batch(SCHEMA)
            .await
            .map_err(|e| AppError::Database(format!("Failed to create schema: {}", e)))?;

        Ok(())
    }

    /// Connection for a standalone write. `last_insert_rowid` is reliable
    /// while it is held.
    pub async fn writer(&self) -> Result<DbWriter> {
        let gate = self.write_gate.clone().lock_owned().await;
        let conn = self.connection().await?;
        Ok(DbWriter { conn, _gate: gate })
    }

    /// Starts a transaction. Pair with [`DbClient::finish`].
    pub async fn begin(&self) -> Result<DbTx> {
        let gate = self.write_gate.clone().lock_owned().await;
        let conn = self.connection().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        Ok(DbTx { tx, _gate: gate })
    }

    /// Commits when `outcome` is `Ok`, rolls back otherwise.
    pub async fn finish<T>(&self, tx: DbTx, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                tx.tx
                    .commit()
                    .await
                    .map_err(|e| AppError::Database(format!("Failed to commit: {}", e)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = tx.tx.rollback().await {
                    tracing::error!(error = %e, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Maps a UNIQUE violation onto a 409 with `message`; other failures stay
/// database errors.
pub(crate) fn conflict_on_unique(err: libsql::Error, message: &str) -> AppError {
    if err.to_string().contains("UNIQUE constraint failed") {
        AppError::Conflict(message.to_string())
    } else {
        AppError::Database(err.to_string())
    }
}

pub(crate) fn db_err(err: libsql::Error) -> AppError {
    AppError::Database(err.to_string())
}
