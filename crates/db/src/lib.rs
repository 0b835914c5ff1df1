use std::{path::Path, str::FromStr, time::Duration};

use sqlx::{
    Error, Executor, Pool, Sqlite,
    sqlite::{
        SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
        SqliteSynchronous,
    },
};
use tracing::info;
use utils::assets::database_path;

pub mod database_stats;
pub mod models;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use database_stats::{DatabaseStats, get_database_stats};

// ============================================================================
// Connection Pool Configuration
// ============================================================================

/// The importer is sequential; a couple of connections cover the walker plus
/// the occasional export stream.
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Connection acquisition timeout in seconds.
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Apply performance pragmas to a SQLite connection.
/// These pragmas are applied on every new connection via `after_connect`.
///
/// - `temp_store = MEMORY` (2): Store temporary tables in memory
/// - `cache_size = -64000`: 64MB page cache (negative = KB)
/// - `wal_autocheckpoint = 2000`: Checkpoint every ~8MB instead of default 4MB.
///   Multi-day comment imports write continuously, fewer checkpoints help.
async fn apply_performance_pragmas(conn: &mut SqliteConnection) -> Result<(), Error> {
    conn.execute("PRAGMA temp_store = 2").await?;
    conn.execute("PRAGMA cache_size = -64000").await?;
    conn.execute("PRAGMA wal_autocheckpoint = 2000").await?;
    Ok(())
}

#[derive(Clone)]
pub struct DBService {
    pub pool: Pool<Sqlite>,
}

impl DBService {
    /// Open the database at the default location (see [`database_path`]) and
    /// run pending migrations.
    pub async fn new() -> Result<DBService, Error> {
        Self::connect(&database_path()).await
    }

    /// Open (creating if needed) the database file at `db_path` and run
    /// pending migrations.
    pub async fn connect(db_path: &Path) -> Result<DBService, Error> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        info!(
            path = %db_path.display(),
            max_connections = DEFAULT_MAX_CONNECTIONS,
            "Initializing SQLite connection pool"
        );

        let options = SqliteConnectOptions::from_str(&database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS));

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS))
            .after_connect(|conn, _meta| {
                Box::pin(async move { apply_performance_pragmas(conn).await })
            })
            .connect_with(options)
            .await?;

        if has_pending_migrations(&pool).await {
            info!("Pending migrations detected, applying");
            sqlx::migrate!("./migrations").run(&pool).await?;
        }

        Ok(DBService { pool })
    }
}

/// Check if there are pending migrations to run.
///
/// Compares the migrations in the codebase against the `_sqlx_migrations` table
/// to determine if any migrations need to be applied.
async fn has_pending_migrations(pool: &Pool<Sqlite>) -> bool {
    let migrator = sqlx::migrate!("./migrations");
    let applied: Vec<i64> = match sqlx::query_scalar::<_, i64>(
        "SELECT version FROM _sqlx_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await
    {
        Ok(versions) => versions,
        Err(_) => {
            // Table doesn't exist or query failed - assume we need migrations
            return true;
        }
    };

    migrator
        .iter()
        .any(|migration| !applied.contains(&migration.version))
}
