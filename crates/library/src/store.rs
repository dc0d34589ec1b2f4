use std::time::{SystemTime, UNIX_EPOCH};

use common::{Album, Artist, Child, MusicFolder};
use metadata::TagInfo;
use rusqlite::{params, Connection, Row};

use crate::{Library, LibraryError};

/// Column list shared by every `children` SELECT so row mapping stays in
/// one place.
pub(crate) const CHILD_COLUMNS: &str = "id, parent, is_dir, title, path, size, suffix, \
     content_type, music_folder_id, created, album, artist, genre, track, disc, year, \
     duration, bitrate, album_id, artist_id, cover_art, lyrics, starred, user_rating, \
     play_count, last_played, media_type";

/// Columns the scanner owns. User state (starred, rating, play counts) is
/// deliberately absent: an upsert must never clobber it.
const SCAN_COLUMNS: [&str; 23] = [
    "id",
    "parent",
    "is_dir",
    "title",
    "path",
    "size",
    "suffix",
    "content_type",
    "music_folder_id",
    "created",
    "album",
    "artist",
    "genre",
    "track",
    "disc",
    "year",
    "duration",
    "bitrate",
    "album_id",
    "artist_id",
    "cover_art",
    "lyrics",
    "media_type",
];

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub(crate) fn child_from_row(row: &Row<'_>) -> rusqlite::Result<Child> {
    Ok(Child {
        id: row.get(0)?,
        parent: row.get(1)?,
        is_dir: row.get::<_, i64>(2)? != 0,
        title: row.get(3)?,
        path: row.get(4)?,
        size: row.get::<_, i64>(5)?.max(0) as u64,
        suffix: row.get(6)?,
        content_type: row.get(7)?,
        music_folder_id: row.get(8)?,
        created: row.get(9)?,
        album: row.get(10)?,
        artist: row.get(11)?,
        genre: row.get(12)?,
        track: row.get(13)?,
        disc: row.get(14)?,
        year: row.get(15)?,
        duration: row.get(16)?,
        bitrate: row.get(17)?,
        album_id: row.get(18)?,
        artist_id: row.get(19)?,
        cover_art: row.get(20)?,
        lyrics: row.get(21)?,
        starred: row.get(22)?,
        user_rating: row.get(23)?,
        play_count: row.get(24)?,
        last_played: row.get(25)?,
        media_type: row.get(26)?,
    })
}

pub(crate) fn artist_from_row(row: &Row<'_>) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get(0)?,
        name: row.get(1)?,
        cover_art: row.get(2)?,
        artist_image_url: row.get(3)?,
        starred: row.get(4)?,
        user_rating: row.get(5)?,
    })
}

pub(crate) fn album_from_row(row: &Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        name: row.get(1)?,
        artist: row.get(2)?,
        artist_id: row.get(3)?,
        cover_art: row.get(4)?,
        created: row.get(5)?,
        starred: row.get(6)?,
        user_rating: row.get(7)?,
        year: row.get(8)?,
        genre: row.get(9)?,
    })
}

/// Upserts a batch of children in a single statement. Conflicting rows
/// keep their user state; everything the scanner owns is replaced.
pub(crate) fn upsert_children(conn: &Connection, batch: &[Child]) -> Result<usize, LibraryError> {
    if batch.is_empty() {
        return Ok(0);
    }
    let row_placeholders = format!("({})", vec!["?"; SCAN_COLUMNS.len()].join(", "));
    let placeholders = vec![row_placeholders.as_str(); batch.len()].join(", ");
    let updates = SCAN_COLUMNS
        .iter()
        .skip(1)
        .map(|col| format!("{col} = excluded.{col}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO children ({}) VALUES {} ON CONFLICT(id) DO UPDATE SET {}",
        SCAN_COLUMNS.join(", "),
        placeholders,
        updates
    );

    let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(batch.len() * SCAN_COLUMNS.len());
    for child in batch {
        values.push(child.id.clone().into());
        values.push(child.parent.clone().into());
        values.push((child.is_dir as i64).into());
        values.push(child.title.clone().into());
        values.push(child.path.clone().into());
        values.push((child.size as i64).into());
        values.push(child.suffix.clone().into());
        values.push(child.content_type.clone().into());
        values.push(child.music_folder_id.into());
        values.push(child.created.into());
        values.push(child.album.clone().into());
        values.push(child.artist.clone().into());
        values.push(child.genre.clone().into());
        values.push(option_u32(child.track));
        values.push(option_u32(child.disc));
        values.push(option_i64(child.year.map(i64::from)));
        values.push(option_u32(child.duration));
        values.push(option_u32(child.bitrate));
        values.push(child.album_id.clone().into());
        values.push(child.artist_id.clone().into());
        values.push(child.cover_art.clone().into());
        values.push(child.lyrics.clone().into());
        values.push(child.media_type.clone().into());
    }

    let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
    Ok(affected)
}

fn option_u32(value: Option<u32>) -> rusqlite::types::Value {
    match value {
        Some(v) => rusqlite::types::Value::Integer(i64::from(v)),
        None => rusqlite::types::Value::Null,
    }
}

fn option_i64(value: Option<i64>) -> rusqlite::types::Value {
    match value {
        Some(v) => rusqlite::types::Value::Integer(v),
        None => rusqlite::types::Value::Null,
    }
}

/// Creates the artist row if it is new; existing rows keep their image and
/// user state.
pub(crate) fn upsert_artist(conn: &Connection, id: &str, name: &str) -> Result<(), LibraryError> {
    conn.execute(
        "INSERT INTO artists (id, name) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
        params![id, name],
    )?;
    Ok(())
}

/// Inserts or refreshes an album. The cover only moves forward: a scan
/// that found no embedded art must not erase one stored earlier.
pub(crate) fn upsert_album(conn: &Connection, album: &Album) -> Result<(), LibraryError> {
    conn.execute(
        "INSERT INTO albums (id, name, artist, artist_id, cover_art, created, year, genre)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             artist = excluded.artist,
             artist_id = excluded.artist_id,
             cover_art = COALESCE(excluded.cover_art, albums.cover_art),
             year = COALESCE(excluded.year, albums.year),
             genre = COALESCE(excluded.genre, albums.genre)",
        params![
            album.id,
            album.name,
            album.artist,
            album.artist_id,
            album.cover_art,
            album.created,
            album.year,
            album.genre
        ],
    )?;
    Ok(())
}

pub(crate) fn set_album_cover(
    conn: &Connection,
    album_id: &str,
    cover_art: &str,
) -> Result<(), LibraryError> {
    conn.execute(
        "UPDATE albums SET cover_art = ?1 WHERE id = ?2",
        params![cover_art, album_id],
    )?;
    Ok(())
}

pub(crate) fn ensure_genre(conn: &Connection, name: &str) -> Result<(), LibraryError> {
    conn.execute(
        "INSERT OR IGNORE INTO genres (name) VALUES (?1)",
        params![name],
    )?;
    Ok(())
}

pub(crate) fn link_song_artist(
    conn: &Connection,
    song_id: &str,
    artist_id: &str,
) -> Result<(), LibraryError> {
    conn.execute(
        "INSERT OR IGNORE INTO song_artists (song_id, artist_id) VALUES (?1, ?2)",
        params![song_id, artist_id],
    )?;
    Ok(())
}

pub(crate) fn link_album_artist(
    conn: &Connection,
    album_id: &str,
    artist_id: &str,
) -> Result<(), LibraryError> {
    conn.execute(
        "INSERT OR IGNORE INTO album_artists (album_id, artist_id) VALUES (?1, ?2)",
        params![album_id, artist_id],
    )?;
    Ok(())
}

pub(crate) fn link_song_genre(
    conn: &Connection,
    song_id: &str,
    genre: &str,
) -> Result<(), LibraryError> {
    conn.execute(
        "INSERT OR IGNORE INTO song_genres (song_id, genre) VALUES (?1, ?2)",
        params![song_id, genre],
    )?;
    Ok(())
}

pub(crate) fn link_album_genre(
    conn: &Connection,
    album_id: &str,
    genre: &str,
) -> Result<(), LibraryError> {
    conn.execute(
        "INSERT OR IGNORE INTO album_genres (album_id, genre) VALUES (?1, ?2)",
        params![album_id, genre],
    )?;
    Ok(())
}

/// Merges a tag record into a minimal child built by the scanner worker.
/// Zero tag values leave scanner-derived fallbacks (file stem title) in
/// place.
pub fn merge_tags_into_child(child: &mut Child, tags: &TagInfo) {
    if let Some(title) = &tags.title {
        if !title.trim().is_empty() {
            child.title = title.clone();
        }
    }
    child.artist = tags.artist_display();
    if let Some(album) = &tags.album {
        child.album = album.clone();
    }
    child.genre = tags.genre_display();
    child.track = tags.track_no;
    child.disc = tags.disc_no;
    child.year = tags.year;
    child.duration = tags.duration_secs;
    child.bitrate = tags.bitrate_kbps;
    if let Some(lyrics) = &tags.lyrics {
        child.lyrics = lyrics.clone();
    }
    if let Some(first) = tags.artists.first() {
        child.artist_id = common::artist_id(first);
    }
}

impl Library {
    /// Returns the folder row for a configured root, creating it on first
    /// sight. Folders are never auto-deleted.
    pub fn ensure_music_folder(&self, name: &str, path: &str) -> Result<MusicFolder, LibraryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO music_folders (name, path) VALUES (?1, ?2)
             ON CONFLICT(path) DO UPDATE SET name = excluded.name",
            params![name, path],
        )?;
        let folder = conn.query_row(
            "SELECT id, name, path FROM music_folders WHERE path = ?1",
            params![path],
            |row| {
                Ok(MusicFolder {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    path: row.get(2)?,
                })
            },
        )?;
        Ok(folder)
    }

    pub fn music_folders(&self) -> Result<Vec<MusicFolder>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, path FROM music_folders ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(MusicFolder {
                id: row.get(0)?,
                name: row.get(1)?,
                path: row.get(2)?,
            })
        })?;
        let mut folders = Vec::new();
        for folder in rows {
            folders.push(folder?);
        }
        Ok(folders)
    }

    pub fn child(&self, id: &str) -> Result<Option<Child>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM children WHERE id = ?1",
            CHILD_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], child_from_row)?;
        match rows.next() {
            Some(child) => Ok(Some(child?)),
            None => Ok(None),
        }
    }

    pub fn child_by_path(&self, path: &str) -> Result<Option<Child>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM children WHERE path = ?1",
            CHILD_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![path], child_from_row)?;
        match rows.next() {
            Some(child) => Ok(Some(child?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_library() -> Library {
        Library::open_in_memory(std::path::Path::new("/tmp")).unwrap()
    }

    fn song(id: &str, path: &str) -> Child {
        Child {
            id: id.to_string(),
            title: format!("title {}", id),
            path: path.to_string(),
            suffix: "mp3".to_string(),
            content_type: "audio/mpeg".to_string(),
            music_folder_id: 1,
            created: 100,
            media_type: "music".to_string(),
            ..Child::default()
        }
    }

    #[test]
    fn batch_upsert_inserts_then_updates() {
        let library = test_library();
        let conn = library.conn().unwrap();

        let mut first = song("a", "/music/a.mp3");
        upsert_children(&conn, &[first.clone(), song("b", "/music/b.mp3")]).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM children", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);

        first.title = "renamed".to_string();
        first.created = 200;
        upsert_children(&conn, &[first]).unwrap();

        let (title, created): (String, i64) = conn
            .query_row(
                "SELECT title, created FROM children WHERE id = 'a'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(title, "renamed");
        assert_eq!(created, 200);
    }

    #[test]
    fn upsert_preserves_user_state() {
        let library = test_library();
        let conn = library.conn().unwrap();

        let track = song("a", "/music/a.mp3");
        upsert_children(&conn, &[track.clone()]).unwrap();
        conn.execute(
            "UPDATE children SET starred = 123, play_count = 5 WHERE id = 'a'",
            [],
        )
        .unwrap();

        upsert_children(&conn, &[track]).unwrap();
        let (starred, play_count): (Option<i64>, i64) = conn
            .query_row(
                "SELECT starred, play_count FROM children WHERE id = 'a'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(starred, Some(123));
        assert_eq!(play_count, 5);
    }

    #[test]
    fn album_cover_never_regresses() {
        let library = test_library();
        let conn = library.conn().unwrap();

        let mut album = Album {
            id: "alb".to_string(),
            name: "X".to_string(),
            artist: "A".to_string(),
            artist_id: "art".to_string(),
            cover_art: Some("alb".to_string()),
            created: 1,
            starred: None,
            user_rating: None,
            year: Some(2001),
            genre: None,
        };
        upsert_album(&conn, &album).unwrap();

        album.cover_art = None;
        upsert_album(&conn, &album).unwrap();

        let cover: Option<String> = conn
            .query_row("SELECT cover_art FROM albums WHERE id = 'alb'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(cover, Some("alb".to_string()));
    }

    #[test]
    fn music_folder_created_once() {
        let library = test_library();
        let first = library.ensure_music_folder("Music", "/music").unwrap();
        let second = library.ensure_music_folder("Music", "/music").unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(library.music_folders().unwrap().len(), 1);
    }
}
