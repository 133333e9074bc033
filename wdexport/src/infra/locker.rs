use async_trait::async_trait;
use export_engine::db::connection::DbPool;
use export_engine::{ExportError, InstanceLocker};
use rusqlite::{params, ErrorCode};

/// Instance locks stored as rows of the `locks` table.
///
/// The slug is the primary key, so a second insert for the same instance
/// fails until the first lock is removed.
#[derive(Clone)]
pub struct SqlLocker {
    pool: DbPool,
}

impl SqlLocker {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstanceLocker for SqlLocker {
    async fn try_lock(&self, slug: &str) -> export_engine::Result<()> {
        let pool = self.pool.clone();
        let slug = slug.to_string();
        tokio::task::spawn_blocking(move || -> export_engine::Result<()> {
            let conn = pool.get()?;
            match conn.execute("INSERT INTO locks (slug) VALUES (?1)", params![slug]) {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Err(ExportError::Locked)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }

    async fn unlock(&self, slug: &str) -> export_engine::Result<()> {
        let pool = self.pool.clone();
        let slug = slug.to_string();
        tokio::task::spawn_blocking(move || -> export_engine::Result<()> {
            let conn = pool.get()?;
            let removed = conn.execute("DELETE FROM locks WHERE slug = ?1", params![slug])?;
            if removed == 0 {
                return Err(ExportError::NotLocked);
            }
            Ok(())
        })
        .await?
    }
}
