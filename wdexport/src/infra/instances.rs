use async_trait::async_trait;
use export_engine::db::connection::DbPool;
use export_engine::models::instance;
use export_engine::{InstanceRecord, InstanceSource};

/// Instances registered in the `distillery` table.
#[derive(Clone)]
pub struct SqlInstances {
    pool: DbPool,
}

impl SqlInstances {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Look up a single instance by slug.
    pub async fn find(&self, slug: &str) -> export_engine::Result<Option<InstanceRecord>> {
        let pool = self.pool.clone();
        let slug = slug.to_string();
        tokio::task::spawn_blocking(move || -> export_engine::Result<Option<InstanceRecord>> {
            let conn = pool.get()?;
            instance::find_by_slug(&conn, &slug)
        })
        .await?
    }
}

#[async_trait]
impl InstanceSource for SqlInstances {
    async fn all(&self) -> export_engine::Result<Vec<InstanceRecord>> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> export_engine::Result<Vec<InstanceRecord>> {
            let conn = pool.get()?;
            instance::find_all(&conn)
        })
        .await?
    }
}
