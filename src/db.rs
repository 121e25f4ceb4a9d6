use rusqlite::{Connection, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type DbConnection = Arc<Mutex<Connection>>;

pub fn establish_connection(path: &str) -> Result<DbConnection> {
    init(Connection::open(path)?)
}

#[cfg(test)]
pub fn in_memory() -> DbConnection {
    init(Connection::open_in_memory().unwrap()).unwrap()
}

fn init(conn: Connection) -> Result<DbConnection> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            uid TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            display_name TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // A password hash exists exactly when the artifact is private.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            email TEXT NOT NULL,
            file_url TEXT NOT NULL,
            privacy TEXT NOT NULL CHECK (privacy IN ('public', 'private')),
            password_hash TEXT,
            uploaded_at TEXT NOT NULL,
            updated_at TEXT,
            CHECK ((privacy = 'private') = (password_hash IS NOT NULL))
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS texts (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            email TEXT NOT NULL,
            content TEXT NOT NULL,
            privacy TEXT NOT NULL CHECK (privacy IN ('public', 'private')),
            password_hash TEXT,
            text_link TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT,
            CHECK ((privacy = 'private') = (password_hash IS NOT NULL))
        )",
        [],
    )?;

    conn.execute("CREATE INDEX IF NOT EXISTS files_email ON files (email)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS texts_email ON texts (email)", [])?;

    Ok(Arc::new(Mutex::new(conn)))
}
