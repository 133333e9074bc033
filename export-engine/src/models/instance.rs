use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

/// Persisted record of a single WissKI instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub pk: i64,
    pub created: DateTime<Utc>,
    pub slug: String,
    pub owner_email: String,
    /// Directory holding the instance's compose stack and data
    pub filesystem_base: String,
    pub sql_database: String,
    pub sql_user: String,
    pub graphdb_repository: String,
    pub graphdb_user: String,
}

fn row_to_instance(row: &Row) -> rusqlite::Result<InstanceRecord> {
    Ok(InstanceRecord {
        pk: row.get("pk")?,
        created: row.get("created")?,
        slug: row.get("slug")?,
        owner_email: row.get("owner_email")?,
        filesystem_base: row.get("filesystem_base")?,
        sql_database: row.get("sql_database")?,
        sql_user: row.get("sql_user")?,
        graphdb_repository: row.get("graphdb_repository")?,
        graphdb_user: row.get("graphdb_user")?,
    })
}

pub fn find_all(conn: &Connection) -> crate::Result<Vec<InstanceRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM distillery ORDER BY slug")?;
    let rows = stmt.query_map([], row_to_instance)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn find_by_slug(conn: &Connection, slug: &str) -> crate::Result<Option<InstanceRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM distillery WHERE slug = ?")?;
    let mut rows = stmt.query_map(params![slug], row_to_instance)?;
    Ok(rows.next().transpose()?)
}

#[derive(Debug, Clone, Default)]
pub struct CreateInstanceData {
    pub slug: String,
    pub owner_email: String,
    pub filesystem_base: String,
    pub sql_database: String,
    pub sql_user: String,
    pub graphdb_repository: String,
    pub graphdb_user: String,
}

pub fn create(conn: &Connection, data: &CreateInstanceData) -> crate::Result<InstanceRecord> {
    conn.execute(
        "INSERT INTO distillery (created, slug, owner_email, filesystem_base, sql_database, sql_user, graphdb_repository, graphdb_user)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            Utc::now(),
            data.slug,
            data.owner_email,
            data.filesystem_base,
            data.sql_database,
            data.sql_user,
            data.graphdb_repository,
            data.graphdb_user,
        ],
    )?;
    find_by_slug(conn, &data.slug)?.ok_or_else(|| {
        crate::ExportError::Config(format!("failed to retrieve created instance {}", data.slug))
    })
}
