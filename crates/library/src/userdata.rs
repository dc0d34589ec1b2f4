use common::{Bookmark, Child, PlayQueue, Playlist};
use rusqlite::{params, Connection, OptionalExtension};

use crate::store::{child_from_row, now_secs, CHILD_COLUMNS};
use crate::{Library, LibraryError};

const PLAYLIST_COLUMNS: &str = "id, name, comment, owner, public, created_at, updated_at";

fn playlist_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Playlist> {
    Ok(Playlist {
        id: row.get(0)?,
        name: row.get(1)?,
        comment: row.get(2)?,
        owner: row.get(3)?,
        public: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Rewrites a playlist's positions as 0..N-1 in current order. Runs inside
/// the caller's transaction.
fn reindex_playlist(conn: &Connection, playlist_id: i64) -> Result<(), LibraryError> {
    let mut stmt =
        conn.prepare("SELECT song_id FROM playlist_songs WHERE playlist_id = ?1 ORDER BY position")?;
    let rows = stmt.query_map(params![playlist_id], |row| row.get::<_, String>(0))?;
    let mut song_ids = Vec::new();
    for id in rows {
        song_ids.push(id?);
    }
    conn.execute(
        "DELETE FROM playlist_songs WHERE playlist_id = ?1",
        params![playlist_id],
    )?;
    let mut insert = conn
        .prepare("INSERT INTO playlist_songs (playlist_id, song_id, position) VALUES (?1, ?2, ?3)")?;
    for (position, song_id) in song_ids.iter().enumerate() {
        insert.execute(params![playlist_id, song_id, position as i64])?;
    }
    Ok(())
}

impl Library {
    /// Playlists the requester may see: their own plus public ones, with
    /// an optional owner filter.
    pub fn playlists_for(
        &self,
        requester: &str,
        owner: Option<&str>,
    ) -> Result<Vec<(Playlist, i64, i64)>, LibraryError> {
        let conn = self.conn()?;
        let mut sql = format!(
            "SELECT {}, \
             (SELECT COUNT(*) FROM playlist_songs ps WHERE ps.playlist_id = playlists.id), \
             (SELECT COALESCE(SUM(c.duration), 0) FROM playlist_songs ps \
              JOIN children c ON c.id = ps.song_id WHERE ps.playlist_id = playlists.id) \
             FROM playlists WHERE (owner = ?1 OR public = 1)",
            PLAYLIST_COLUMNS
        );
        if owner.is_some() {
            sql.push_str(" AND owner = ?2");
        }
        sql.push_str(" ORDER BY name");
        let mut stmt = conn.prepare(&sql)?;
        let map = |row: &rusqlite::Row<'_>| {
            Ok((playlist_from_row(row)?, row.get(7)?, row.get(8)?))
        };
        let mut playlists = Vec::new();
        match owner {
            Some(owner) => {
                let rows = stmt.query_map(params![requester, owner], map)?;
                for item in rows {
                    playlists.push(item?);
                }
            }
            None => {
                let rows = stmt.query_map(params![requester], map)?;
                for item in rows {
                    playlists.push(item?);
                }
            }
        }
        Ok(playlists)
    }

    pub fn playlist(&self, id: i64) -> Result<Option<Playlist>, LibraryError> {
        let conn = self.conn()?;
        let playlist = conn
            .query_row(
                &format!("SELECT {} FROM playlists WHERE id = ?1", PLAYLIST_COLUMNS),
                params![id],
                playlist_from_row,
            )
            .optional()?;
        Ok(playlist)
    }

    pub fn playlist_songs(&self, id: i64) -> Result<Vec<Child>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM children
             JOIN playlist_songs ps ON ps.song_id = children.id
             WHERE ps.playlist_id = ?1 ORDER BY ps.position",
            CHILD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![id], child_from_row)?;
        let mut songs = Vec::new();
        for song in rows {
            songs.push(song?);
        }
        Ok(songs)
    }

    pub fn create_playlist(
        &self,
        owner: &str,
        name: &str,
        song_ids: &[String],
    ) -> Result<Playlist, LibraryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_secs();
        tx.execute(
            "INSERT INTO playlists (name, owner, public, created_at, updated_at)
             VALUES (?1, ?2, 0, ?3, ?3)",
            params![name, owner, now],
        )?;
        let id = tx.last_insert_rowid();
        {
            let mut insert = tx.prepare(
                "INSERT INTO playlist_songs (playlist_id, song_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (position, song_id) in song_ids.iter().enumerate() {
                insert.execute(params![id, song_id, position as i64])?;
            }
        }
        tx.commit()?;
        Ok(Playlist {
            id,
            name: name.to_string(),
            comment: None,
            owner: owner.to_string(),
            public: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces the entire song list, used by createPlaylist-with-id.
    pub fn replace_playlist_songs(
        &self,
        id: i64,
        song_ids: &[String],
    ) -> Result<(), LibraryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM playlist_songs WHERE playlist_id = ?1",
            params![id],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO playlist_songs (playlist_id, song_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (position, song_id) in song_ids.iter().enumerate() {
                insert.execute(params![id, song_id, position as i64])?;
            }
        }
        tx.execute(
            "UPDATE playlists SET updated_at = ?1 WHERE id = ?2",
            params![now_secs(), id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Applies an updatePlaylist request in one transaction: metadata
    /// edits, removals by index, then appends, then a contiguous
    /// re-index.
    pub fn update_playlist(
        &self,
        id: i64,
        name: Option<&str>,
        comment: Option<&str>,
        public: Option<bool>,
        add_song_ids: &[String],
        remove_indexes: &[u32],
    ) -> Result<(), LibraryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if let Some(name) = name {
            tx.execute(
                "UPDATE playlists SET name = ?1 WHERE id = ?2",
                params![name, id],
            )?;
        }
        if let Some(comment) = comment {
            tx.execute(
                "UPDATE playlists SET comment = ?1 WHERE id = ?2",
                params![comment, id],
            )?;
        }
        if let Some(public) = public {
            tx.execute(
                "UPDATE playlists SET public = ?1 WHERE id = ?2",
                params![public as i64, id],
            )?;
        }
        for index in remove_indexes {
            tx.execute(
                "DELETE FROM playlist_songs WHERE playlist_id = ?1 AND position = ?2",
                params![id, *index as i64],
            )?;
        }
        reindex_playlist(&tx, id)?;
        if !add_song_ids.is_empty() {
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM playlist_songs WHERE playlist_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO playlist_songs (playlist_id, song_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (offset, song_id) in add_song_ids.iter().enumerate() {
                insert.execute(params![id, song_id, next + offset as i64])?;
            }
        }
        tx.execute(
            "UPDATE playlists SET updated_at = ?1 WHERE id = ?2",
            params![now_secs(), id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn delete_playlist(&self, id: i64) -> Result<bool, LibraryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM playlist_songs WHERE playlist_id = ?1",
            params![id],
        )?;
        let deleted = tx.execute("DELETE FROM playlists WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Toggles the starred timestamp across the three target kinds in one
    /// transaction; returns false when no row matched the id.
    pub fn set_starred(&self, id: &str, starred: bool) -> Result<bool, LibraryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let value: Option<i64> = if starred { Some(now_secs()) } else { None };
        let mut updated = tx.execute(
            "UPDATE children SET starred = ?1 WHERE id = ?2",
            params![value, id],
        )?;
        if updated == 0 {
            updated = tx.execute(
                "UPDATE albums SET starred = ?1 WHERE id = ?2",
                params![value, id],
            )?;
        }
        if updated == 0 {
            updated = tx.execute(
                "UPDATE artists SET starred = ?1 WHERE id = ?2",
                params![value, id],
            )?;
        }
        tx.commit()?;
        Ok(updated > 0)
    }

    /// Rating 0 clears; first matching target kind wins.
    pub fn set_rating(&self, id: &str, rating: i32) -> Result<bool, LibraryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let value: Option<i64> = if rating == 0 {
            None
        } else {
            Some(i64::from(rating))
        };
        let mut updated = tx.execute(
            "UPDATE children SET user_rating = ?1 WHERE id = ?2",
            params![value, id],
        )?;
        if updated == 0 {
            updated = tx.execute(
                "UPDATE albums SET user_rating = ?1 WHERE id = ?2",
                params![value, id],
            )?;
        }
        if updated == 0 {
            updated = tx.execute(
                "UPDATE artists SET user_rating = ?1 WHERE id = ?2",
                params![value, id],
            )?;
        }
        tx.commit()?;
        Ok(updated > 0)
    }

    /// Submission scrobbles bump the play counter; now-playing-only calls
    /// do not touch the catalog.
    pub fn scrobble(&self, id: &str, time_secs: Option<i64>) -> Result<bool, LibraryError> {
        let conn = self.conn()?;
        let played = time_secs.unwrap_or_else(now_secs);
        let updated = conn.execute(
            "UPDATE children SET play_count = play_count + 1, last_played = ?1
             WHERE id = ?2 AND is_dir = 0",
            params![played, id],
        )?;
        Ok(updated > 0)
    }

    pub fn bookmarks(&self, username: &str) -> Result<Vec<(Bookmark, Option<Child>)>, LibraryError> {
        let mut records = Vec::new();
        {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT username, song_id, position, comment, created_at, updated_at
                 FROM bookmarks WHERE username = ?1 ORDER BY updated_at DESC",
            )?;
            let rows = stmt.query_map(params![username], |row| {
                Ok(Bookmark {
                    username: row.get(0)?,
                    song_id: row.get(1)?,
                    position: row.get(2)?,
                    comment: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })?;
            for bookmark in rows {
                records.push(bookmark?);
            }
        }
        let mut bookmarks = Vec::with_capacity(records.len());
        for bookmark in records {
            let child = self.child(&bookmark.song_id)?;
            bookmarks.push((bookmark, child));
        }
        Ok(bookmarks)
    }

    pub fn upsert_bookmark(
        &self,
        username: &str,
        song_id: &str,
        position: i64,
        comment: Option<&str>,
    ) -> Result<(), LibraryError> {
        let conn = self.conn()?;
        let now = now_secs();
        conn.execute(
            "INSERT INTO bookmarks (username, song_id, position, comment, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(username, song_id) DO UPDATE SET
                 position = excluded.position,
                 comment = excluded.comment,
                 updated_at = excluded.updated_at",
            params![username, song_id, position, comment, now],
        )?;
        Ok(())
    }

    pub fn delete_bookmark(&self, username: &str, song_id: &str) -> Result<bool, LibraryError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM bookmarks WHERE username = ?1 AND song_id = ?2",
            params![username, song_id],
        )?;
        Ok(deleted > 0)
    }

    pub fn play_queue(&self, username: &str) -> Result<Option<PlayQueue>, LibraryError> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT username, current, position, changed_by, changed_at
                 FROM play_queues WHERE username = ?1",
                params![username],
                |row| {
                    Ok(PlayQueue {
                        username: row.get(0)?,
                        current: row.get(1)?,
                        position: row.get(2)?,
                        changed_by: row.get(3)?,
                        changed_at: row.get(4)?,
                        song_ids: Vec::new(),
                    })
                },
            )
            .optional()?;
        let mut queue = match record {
            Some(queue) => queue,
            None => return Ok(None),
        };
        let mut stmt = conn.prepare(
            "SELECT song_id FROM play_queue_songs WHERE username = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![username], |row| row.get::<_, String>(0))?;
        for id in rows {
            queue.song_ids.push(id?);
        }
        Ok(Some(queue))
    }

    /// Upserts the queue record, then rewrites the song rows with
    /// contiguous 0-based positions, all in one transaction.
    pub fn save_play_queue(&self, queue: &PlayQueue) -> Result<(), LibraryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO play_queues (username, current, position, changed_by, changed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(username) DO UPDATE SET
                 current = excluded.current,
                 position = excluded.position,
                 changed_by = excluded.changed_by,
                 changed_at = excluded.changed_at",
            params![
                queue.username,
                queue.current,
                queue.position,
                queue.changed_by,
                queue.changed_at
            ],
        )?;
        tx.execute(
            "DELETE FROM play_queue_songs WHERE username = ?1",
            params![queue.username],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO play_queue_songs (username, song_id, position) VALUES (?1, ?2, ?3)",
            )?;
            for (position, song_id) in queue.song_ids.iter().enumerate() {
                insert.execute(params![queue.username, song_id, position as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_library() -> Library {
        Library::open_in_memory(std::path::Path::new("/tmp")).unwrap()
    }

    fn positions(library: &Library, id: i64) -> Vec<i64> {
        let conn = library.conn().unwrap();
        let mut stmt = conn
            .prepare("SELECT position FROM playlist_songs WHERE playlist_id = ?1 ORDER BY position")
            .unwrap();
        let rows = stmt.query_map(params![id], |row| row.get(0)).unwrap();
        rows.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn playlist_round_trip_keeps_order() {
        let library = test_library();
        let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let playlist = library.create_playlist("alice", "mix", &ids).unwrap();

        let conn = library.conn().unwrap();
        let mut stmt = conn
            .prepare("SELECT song_id FROM playlist_songs WHERE playlist_id = ?1 ORDER BY position")
            .unwrap();
        let stored: Vec<String> = stmt
            .query_map(params![playlist.id], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(stored, ids);
    }

    #[test]
    fn removal_reindexes_contiguously() {
        let library = test_library();
        let ids: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let playlist = library.create_playlist("alice", "mix", &ids).unwrap();

        library
            .update_playlist(playlist.id, None, None, None, &[], &[1, 2])
            .unwrap();
        assert_eq!(positions(&library, playlist.id), vec![0, 1]);

        let songs: Vec<String> = {
            let conn = library.conn().unwrap();
            let mut stmt = conn
                .prepare(
                    "SELECT song_id FROM playlist_songs WHERE playlist_id = ?1 ORDER BY position",
                )
                .unwrap();
            stmt.query_map(params![playlist.id], |row| row.get(0))
                .unwrap()
                .map(|r| r.unwrap())
                .collect()
        };
        assert_eq!(songs, vec!["a".to_string(), "d".to_string()]);
    }

    #[test]
    fn append_lands_after_existing_entries() {
        let library = test_library();
        let ids: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let playlist = library.create_playlist("alice", "mix", &ids).unwrap();
        library
            .update_playlist(playlist.id, None, None, None, &["c".to_string()], &[])
            .unwrap();
        assert_eq!(positions(&library, playlist.id), vec![0, 1, 2]);
    }

    #[test]
    fn star_round_trip_restores_null() {
        let library = test_library();
        let conn = library.conn().unwrap();
        conn.execute(
            "INSERT INTO children (id, path, is_dir) VALUES ('s', '/m/s.mp3', 0)",
            [],
        )
        .unwrap();
        drop(conn);

        assert!(library.set_starred("s", true).unwrap());
        let conn = library.conn().unwrap();
        let starred: Option<i64> = conn
            .query_row("SELECT starred FROM children WHERE id = 's'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert!(starred.is_some());
        drop(conn);

        assert!(library.set_starred("s", false).unwrap());
        let conn = library.conn().unwrap();
        let starred: Option<i64> = conn
            .query_row("SELECT starred FROM children WHERE id = 's'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(starred, None);
    }

    #[test]
    fn star_unknown_id_reports_missing() {
        let library = test_library();
        assert!(!library.set_starred("nope", true).unwrap());
    }

    #[test]
    fn play_queue_save_is_idempotent() {
        let library = test_library();
        let queue = PlayQueue {
            username: "alice".to_string(),
            current: Some("b".to_string()),
            position: 1500,
            changed_by: "client".to_string(),
            changed_at: 42,
            song_ids: vec!["a".to_string(), "b".to_string()],
        };
        library.save_play_queue(&queue).unwrap();
        library.save_play_queue(&queue).unwrap();

        let loaded = library.play_queue("alice").unwrap().unwrap();
        assert_eq!(loaded.song_ids, queue.song_ids);
        let conn = library.conn().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM play_queue_songs WHERE username = 'alice'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn bookmark_upsert_then_delete() {
        let library = test_library();
        library
            .upsert_bookmark("alice", "s", 1000, Some("half way"))
            .unwrap();
        library.upsert_bookmark("alice", "s", 2000, None).unwrap();
        let bookmarks = library.bookmarks("alice").unwrap();
        assert_eq!(bookmarks.len(), 1);
        assert_eq!(bookmarks[0].0.position, 2000);

        assert!(library.delete_bookmark("alice", "s").unwrap());
        assert!(library.bookmarks("alice").unwrap().is_empty());
    }
}
