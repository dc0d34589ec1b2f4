mod browse;
mod covers;
mod prune;
mod scan;
mod schema;
mod store;
mod userdata;
mod users;
mod walk;

use std::fs;
use std::path::{Path, PathBuf};

use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

pub use browse::{AlbumListType, GenreCount, IndexGroup, SearchOffsets, SearchResults, Starred};
pub use scan::{CancelToken, ScanStatus, ScanSummary, Scanner};

pub type Pool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Handle to the catalog: a SQLite pool plus the data directory that holds
/// the cover cache. Cheap to clone; all state lives in the database.
#[derive(Clone)]
pub struct Library {
    pool: Pool,
    data_dir: PathBuf,
}

impl Library {
    /// Opens (creating if needed) the catalog database and applies pending
    /// schema migrations.
    pub fn open(db_path: &Path, data_dir: &Path) -> Result<Self, LibraryError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )
        });
        let pool = r2d2::Pool::builder().build(manager)?;
        {
            let conn = pool.get()?;
            let applied = schema::migrate(&conn)?;
            if applied > 0 {
                info!("Applied {} schema migration(s)", applied);
            }
        }
        Ok(Self {
            pool,
            data_dir: data_dir.to_path_buf(),
        })
    }

    /// In-memory catalog for tests; shares nothing with disk.
    pub fn open_in_memory(data_dir: &Path) -> Result<Self, LibraryError> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });
        // A single connection so every handle sees the same in-memory db.
        let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
        {
            let conn = pool.get()?;
            schema::migrate(&conn)?;
        }
        Ok(Self {
            pool,
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn conn(&self) -> Result<PooledConnection, LibraryError> {
        Ok(self.pool.get()?)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn covers_dir(&self) -> PathBuf {
        covers::covers_dir(&self.data_dir)
    }
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Sqlite(rusqlite::Error),
    Pool(r2d2::Error),
    Metadata(metadata::MetadataError),
    NotFound(String),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Sqlite(err) => write!(f, "db error: {}", err),
            LibraryError::Pool(err) => write!(f, "db pool error: {}", err),
            LibraryError::Metadata(err) => write!(f, "metadata error: {}", err),
            LibraryError::NotFound(what) => write!(f, "not found: {}", what),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<rusqlite::Error> for LibraryError {
    fn from(err: rusqlite::Error) -> Self {
        LibraryError::Sqlite(err)
    }
}

impl From<r2d2::Error> for LibraryError {
    fn from(err: r2d2::Error) -> Self {
        LibraryError::Pool(err)
    }
}

impl From<metadata::MetadataError> for LibraryError {
    fn from(err: metadata::MetadataError) -> Self {
        LibraryError::Metadata(err)
    }
}
