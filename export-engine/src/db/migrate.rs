use crate::db::connection::DbPool;

// `snapshot` keeps its legacy name; it holds both backups and snapshots.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshot (
  pk INTEGER PRIMARY KEY AUTOINCREMENT,
  slug TEXT NOT NULL DEFAULT '',
  created TEXT NOT NULL,
  path TEXT NOT NULL,
  packed INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS distillery (
  pk INTEGER PRIMARY KEY AUTOINCREMENT,
  created TEXT NOT NULL DEFAULT (datetime('now')),
  slug TEXT NOT NULL UNIQUE,
  owner_email TEXT NOT NULL DEFAULT '',
  filesystem_base TEXT NOT NULL,
  sql_database TEXT NOT NULL DEFAULT '',
  sql_user TEXT NOT NULL DEFAULT '',
  graphdb_repository TEXT NOT NULL DEFAULT '',
  graphdb_user TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS locks (
  slug TEXT PRIMARY KEY,
  created TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_snapshot_slug ON snapshot(slug);
"#;

pub fn migrate(pool: &DbPool) -> crate::Result<()> {
    tracing::info!("[DB] Starting database migration...");

    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;

    tracing::info!("[DB] Migration completed successfully");
    Ok(())
}
