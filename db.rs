use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use crate::error::{Error, Result};
use crate::schema;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

/// Builds a new catalog for `path` and fills it with `fill`.
///
/// The catalog is built in a temporary file next to `path` and moved into
/// place only after `fill` succeeds, so a failed import leaves any existing
/// file untouched. An existing file is replaced only when `replace` is set;
/// replacing is destructive: every market, review and user in the old file
/// is lost.
pub fn create_database<T>(
    path: &Path,
    replace: bool,
    fill: impl FnOnce(&mut Connection) -> Result<T>,
) -> Result<T> {
    if path.is_file() && !replace {
        return Err(Error::DatabaseExists(path.display().to_string()));
    }

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    // Removed on drop unless persisted.
    let building = tempfile::Builder::new()
        .prefix(".markets-")
        .suffix(".db")
        .tempfile_in(dir)?
        .into_temp_path();

    let value = {
        let mut connection = Connection::open(&building)?;
        configure_connection(&mut connection)?;
        apply_schema(&connection)?;
        fill(&mut connection)?
    };

    if path.is_file() {
        log::warn!("Replacing existing database at {}", path.display());
    }
    building.persist(path).map_err(|e| e.error)?;
    log::info!("Created catalog database at {}", path.display());
    Ok(value)
}

/// Opens an existing catalog database without modifying it.
pub fn open_database(path: &Path) -> Result<DbPool> {
    if !path.is_file() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no database at {}; run `create` first", path.display()),
        )));
    }
    log::debug!("Database path: {}", path.display());
    build_pool(path)
}

fn build_pool(path: &Path) -> Result<DbPool> {
    // One connection: the catalog has a single writer and the import's temp
    // staging table is connection-scoped.
    let manager = SqliteConnectionManager::file(path).with_init(configure_connection);
    let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
    Ok(pool)
}

pub fn configure_connection(connection: &mut Connection) -> rusqlite::Result<()> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")
}

fn apply_schema(connection: &Connection) -> Result<()> {
    log::info!("Applying catalog schema...");
    connection.execute_batch(schema::CATALOG)?;
    Ok(())
}

#[cfg(test)]
pub fn memory_catalog() -> Connection {
    let mut connection = Connection::open_in_memory().unwrap();
    configure_connection(&mut connection).unwrap();
    apply_schema(&connection).unwrap();
    connection
}
