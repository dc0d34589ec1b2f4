use rusqlite::Connection;

use crate::LibraryError;

/// Ordered migration list. Append only; `user_version` tracks how far a
/// database has advanced.
const MIGRATIONS: &[&str] = &[
    // v1: full catalog schema.
    "
    CREATE TABLE music_folders (
        id    INTEGER PRIMARY KEY,
        name  TEXT NOT NULL,
        path  TEXT NOT NULL UNIQUE
    );

    CREATE TABLE children (
        id              TEXT PRIMARY KEY,
        parent          TEXT NOT NULL DEFAULT '',
        is_dir          INTEGER NOT NULL DEFAULT 0,
        title           TEXT NOT NULL DEFAULT '',
        path            TEXT NOT NULL UNIQUE,
        size            INTEGER NOT NULL DEFAULT 0,
        suffix          TEXT NOT NULL DEFAULT '',
        content_type    TEXT NOT NULL DEFAULT '',
        music_folder_id INTEGER NOT NULL DEFAULT 0,
        created         INTEGER NOT NULL DEFAULT 0,
        album           TEXT NOT NULL DEFAULT '',
        artist          TEXT NOT NULL DEFAULT '',
        genre           TEXT NOT NULL DEFAULT '',
        track           INTEGER,
        disc            INTEGER,
        year            INTEGER,
        duration        INTEGER,
        bitrate         INTEGER,
        album_id        TEXT NOT NULL DEFAULT '',
        artist_id       TEXT NOT NULL DEFAULT '',
        cover_art       TEXT NOT NULL DEFAULT '',
        lyrics          TEXT NOT NULL DEFAULT '',
        starred         INTEGER,
        user_rating     INTEGER,
        play_count      INTEGER NOT NULL DEFAULT 0,
        last_played     INTEGER,
        media_type      TEXT NOT NULL DEFAULT 'music'
    );
    CREATE INDEX idx_children_parent ON children(parent);
    CREATE INDEX idx_children_album ON children(album_id);
    CREATE INDEX idx_children_artist ON children(artist_id);
    CREATE INDEX idx_children_title ON children(title);

    CREATE TABLE artists (
        id               TEXT PRIMARY KEY,
        name             TEXT NOT NULL,
        cover_art        TEXT,
        artist_image_url TEXT,
        starred          INTEGER,
        user_rating      INTEGER
    );
    CREATE INDEX idx_artists_name ON artists(name);

    CREATE TABLE albums (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL,
        artist      TEXT NOT NULL DEFAULT '',
        artist_id   TEXT NOT NULL DEFAULT '',
        cover_art   TEXT,
        created     INTEGER NOT NULL DEFAULT 0,
        starred     INTEGER,
        user_rating INTEGER,
        year        INTEGER,
        genre       TEXT
    );
    CREATE INDEX idx_albums_name ON albums(name);
    CREATE INDEX idx_albums_artist ON albums(artist_id);

    CREATE TABLE genres (
        name TEXT PRIMARY KEY
    );

    CREATE TABLE song_artists (
        song_id   TEXT NOT NULL,
        artist_id TEXT NOT NULL,
        PRIMARY KEY (song_id, artist_id)
    );
    CREATE TABLE album_artists (
        album_id  TEXT NOT NULL,
        artist_id TEXT NOT NULL,
        PRIMARY KEY (album_id, artist_id)
    );
    CREATE TABLE song_genres (
        song_id TEXT NOT NULL,
        genre   TEXT NOT NULL,
        PRIMARY KEY (song_id, genre)
    );
    CREATE TABLE album_genres (
        album_id TEXT NOT NULL,
        genre    TEXT NOT NULL,
        PRIMARY KEY (album_id, genre)
    );

    CREATE TABLE playlists (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        name       TEXT NOT NULL,
        comment    TEXT,
        owner      TEXT NOT NULL,
        public     INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE TABLE playlist_songs (
        playlist_id INTEGER NOT NULL,
        song_id     TEXT NOT NULL,
        position    INTEGER NOT NULL,
        PRIMARY KEY (playlist_id, position)
    );

    CREATE TABLE bookmarks (
        username   TEXT NOT NULL,
        song_id    TEXT NOT NULL,
        position   INTEGER NOT NULL DEFAULT 0,
        comment    TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (username, song_id)
    );

    CREATE TABLE play_queues (
        username   TEXT PRIMARY KEY,
        current    TEXT,
        position   INTEGER NOT NULL DEFAULT 0,
        changed_by TEXT NOT NULL DEFAULT '',
        changed_at INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE play_queue_songs (
        username TEXT NOT NULL,
        song_id  TEXT NOT NULL,
        position INTEGER NOT NULL,
        PRIMARY KEY (username, position)
    );

    CREATE TABLE users (
        username           TEXT PRIMARY KEY,
        password           TEXT NOT NULL,
        email              TEXT,
        is_admin           INTEGER NOT NULL DEFAULT 0,
        stream_role        INTEGER NOT NULL DEFAULT 1,
        download_role      INTEGER NOT NULL DEFAULT 1,
        playlist_role      INTEGER NOT NULL DEFAULT 1,
        cover_art_role     INTEGER NOT NULL DEFAULT 1,
        comment_role       INTEGER NOT NULL DEFAULT 1,
        share_role         INTEGER NOT NULL DEFAULT 0,
        scrobbling_enabled INTEGER NOT NULL DEFAULT 1,
        max_bit_rate       INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE system_settings (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE identities (
        username TEXT PRIMARY KEY,
        uuid     TEXT NOT NULL DEFAULT '',
        password TEXT NOT NULL DEFAULT '',
        url      TEXT NOT NULL DEFAULT ''
    );
    ",
];

/// Applies pending migrations, returning how many ran.
pub fn migrate(conn: &Connection) -> Result<usize, LibraryError> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let current = current.max(0) as usize;
    let mut applied = 0;
    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current) {
        conn.execute_batch(&format!("BEGIN; {} COMMIT;", sql))?;
        conn.pragma_update(None, "user_version", (index + 1) as i64)?;
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_once() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(migrate(&conn).unwrap(), MIGRATIONS.len());
        assert_eq!(migrate(&conn).unwrap(), 0);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'children'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
