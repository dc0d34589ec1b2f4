use common::{Album, AlbumStats, Artist, Child};
use rusqlite::{params, params_from_iter, types::Value};

use crate::store::{album_from_row, artist_from_row, child_from_row, CHILD_COLUMNS};
use crate::{Library, LibraryError};

const ARTIST_COLUMNS: &str = "id, name, cover_art, artist_image_url, starred, user_rating";
const ALBUM_COLUMNS: &str =
    "id, name, artist, artist_id, cover_art, created, starred, user_rating, year, genre";

/// One letter bucket of an index listing.
#[derive(Clone, Debug)]
pub struct IndexGroup<T> {
    pub name: String,
    pub entries: Vec<T>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlbumListType {
    Random,
    Newest,
    Frequent,
    Recent,
    Starred,
    AlphabeticalByName,
    AlphabeticalByArtist,
    ByYear,
    ByGenre,
}

impl AlbumListType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "random" => Some(Self::Random),
            "newest" => Some(Self::Newest),
            "frequent" => Some(Self::Frequent),
            "recent" => Some(Self::Recent),
            "starred" => Some(Self::Starred),
            "alphabeticalByName" => Some(Self::AlphabeticalByName),
            "alphabeticalByArtist" => Some(Self::AlphabeticalByArtist),
            "byYear" => Some(Self::ByYear),
            "byGenre" => Some(Self::ByGenre),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SearchOffsets {
    pub artist_count: u32,
    pub artist_offset: u32,
    pub album_count: u32,
    pub album_offset: u32,
    pub song_count: u32,
    pub song_offset: u32,
}

impl Default for SearchOffsets {
    fn default() -> Self {
        Self {
            artist_count: 20,
            artist_offset: 0,
            album_count: 20,
            album_offset: 0,
            song_count: 20,
            song_offset: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SearchResults {
    pub artists: Vec<Artist>,
    pub albums: Vec<Album>,
    pub songs: Vec<Child>,
}

#[derive(Clone, Debug, Default)]
pub struct Starred {
    pub artists: Vec<Artist>,
    pub albums: Vec<Album>,
    pub songs: Vec<Child>,
}

#[derive(Clone, Debug)]
pub struct GenreCount {
    pub name: String,
    pub song_count: i64,
    pub album_count: i64,
}

/// Sort key for index grouping: articles stripped, first rune uppercased,
/// non-alphabetic bucketed under `#`.
fn index_key(title: &str, articles: &[String]) -> String {
    let mut rest = title.trim();
    for article in articles {
        let prefix_len = article.len();
        let (head, tail) = match (rest.get(..prefix_len), rest.get(prefix_len..)) {
            (Some(head), Some(tail)) => (head, tail),
            _ => continue,
        };
        if head.eq_ignore_ascii_case(article) && tail.starts_with(' ') {
            rest = tail.trim_start();
            break;
        }
    }
    match rest.chars().next() {
        Some(ch) if ch.is_alphabetic() => ch.to_uppercase().to_string(),
        Some(_) => "#".to_string(),
        None => "#".to_string(),
    }
}

fn group_by_index<T, F>(items: Vec<T>, articles: &[String], title_of: F) -> Vec<IndexGroup<T>>
where
    F: Fn(&T) -> &str,
{
    let mut groups: Vec<IndexGroup<T>> = Vec::new();
    for item in items {
        let key = index_key(title_of(&item), articles);
        match groups.iter_mut().find(|g| g.name == key) {
            Some(group) => group.entries.push(item),
            None => groups.push(IndexGroup {
                name: key,
                entries: vec![item],
            }),
        }
    }
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    for group in &mut groups {
        group.entries.sort_by(|a, b| title_of(a).cmp(title_of(b)));
    }
    groups
}

impl Library {
    /// File-mode indexes: top-level directories of each root, bucketed by
    /// first letter.
    pub fn indexes(
        &self,
        music_folder: Option<i64>,
        articles: &[String],
    ) -> Result<Vec<IndexGroup<Child>>, LibraryError> {
        let conn = self.conn()?;
        let mut sql = format!(
            "SELECT {} FROM children WHERE parent = '' AND is_dir = 1",
            CHILD_COLUMNS
        );
        let mut values: Vec<Value> = Vec::new();
        if let Some(folder) = music_folder {
            sql.push_str(" AND music_folder_id = ?1");
            values.push(folder.into());
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), child_from_row)?;
        let mut children = Vec::new();
        for child in rows {
            children.push(child?);
        }
        Ok(group_by_index(children, articles, |c| c.title.as_str()))
    }

    /// Tag-mode indexes over artists that actually have songs.
    pub fn artist_indexes(
        &self,
        articles: &[String],
    ) -> Result<Vec<IndexGroup<(Artist, i64)>>, LibraryError> {
        let artists = self.artists_with_album_counts()?;
        Ok(group_by_index(artists, articles, |(artist, _)| {
            artist.name.as_str()
        }))
    }

    pub fn artists_with_album_counts(&self) -> Result<Vec<(Artist, i64)>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT a.id, a.name, a.cover_art, a.artist_image_url, a.starred, a.user_rating,
                    (SELECT COUNT(*) FROM album_artists aa WHERE aa.artist_id = a.id)
             FROM artists a
             WHERE EXISTS (SELECT 1 FROM song_artists sa WHERE sa.artist_id = a.id)
             ORDER BY a.name",
        )?;
        let rows = stmt.query_map([], |row| Ok((artist_from_row(row)?, row.get(6)?)))?;
        let mut artists = Vec::new();
        for artist in rows {
            artists.push(artist?);
        }
        Ok(artists)
    }

    /// Direct children of a directory row, directories first.
    pub fn directory(&self, id: &str) -> Result<Option<(Child, Vec<Child>)>, LibraryError> {
        let dir = match self.child(id)? {
            Some(dir) => dir,
            None => return Ok(None),
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM children WHERE parent = ?1 ORDER BY is_dir DESC, title",
            CHILD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![id], child_from_row)?;
        let mut children = Vec::new();
        for child in rows {
            children.push(child?);
        }
        Ok(Some((dir, children)))
    }

    pub fn artist(&self, id: &str) -> Result<Option<Artist>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM artists WHERE id = ?1",
            ARTIST_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], artist_from_row)?;
        match rows.next() {
            Some(artist) => Ok(Some(artist?)),
            None => Ok(None),
        }
    }

    pub fn artist_albums(&self, artist_id: &str) -> Result<Vec<Album>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM albums
             WHERE id IN (SELECT album_id FROM album_artists WHERE artist_id = ?1)
                OR artist_id = ?1
             ORDER BY year, name",
            ALBUM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![artist_id], album_from_row)?;
        let mut albums = Vec::new();
        for album in rows {
            albums.push(album?);
        }
        Ok(albums)
    }

    pub fn album(&self, id: &str) -> Result<Option<Album>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM albums WHERE id = ?1",
            ALBUM_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], album_from_row)?;
        match rows.next() {
            Some(album) => Ok(Some(album?)),
            None => Ok(None),
        }
    }

    /// Songs of an album in playback order.
    pub fn album_songs(&self, album_id: &str) -> Result<Vec<Child>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM children WHERE album_id = ?1 AND is_dir = 0
             ORDER BY disc IS NULL, disc, track IS NULL, track, title",
            CHILD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![album_id], child_from_row)?;
        let mut songs = Vec::new();
        for song in rows {
            songs.push(song?);
        }
        Ok(songs)
    }

    /// songCount/duration/playCount/lastPlayed are projections over the
    /// album's songs, never stored.
    pub fn album_stats(&self, album_id: &str) -> Result<AlbumStats, LibraryError> {
        let conn = self.conn()?;
        let stats = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(duration), 0), COALESCE(SUM(play_count), 0),
                    MAX(last_played)
             FROM children WHERE album_id = ?1 AND is_dir = 0",
            params![album_id],
            |row| {
                Ok(AlbumStats {
                    song_count: row.get::<_, i64>(0)?.max(0) as u32,
                    duration: row.get::<_, i64>(1)?.max(0) as u32,
                    play_count: row.get(2)?,
                    last_played: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }

    pub fn album_list(
        &self,
        kind: AlbumListType,
        size: u32,
        offset: u32,
        genre: Option<&str>,
        from_year: Option<i32>,
        to_year: Option<i32>,
        music_folder: Option<i64>,
    ) -> Result<Vec<Album>, LibraryError> {
        let conn = self.conn()?;
        let mut wheres: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(folder) = music_folder {
            values.push(folder.into());
            wheres.push(format!(
                "EXISTS (SELECT 1 FROM children c WHERE c.album_id = albums.id \
                 AND c.music_folder_id = ?{})",
                values.len()
            ));
        }
        match kind {
            AlbumListType::Starred => wheres.push("starred IS NOT NULL".to_string()),
            AlbumListType::ByYear => {
                let lo = from_year.unwrap_or(0).min(to_year.unwrap_or(9999));
                let hi = from_year.unwrap_or(0).max(to_year.unwrap_or(9999));
                values.push(i64::from(lo).into());
                wheres.push(format!("year >= ?{}", values.len()));
                values.push(i64::from(hi).into());
                wheres.push(format!("year <= ?{}", values.len()));
            }
            AlbumListType::ByGenre => {
                let genre = genre.unwrap_or("");
                values.push(genre.to_string().into());
                wheres.push(format!(
                    "(genre = ?{n} OR EXISTS (SELECT 1 FROM album_genres ag \
                     WHERE ag.album_id = albums.id AND ag.genre = ?{n}))",
                    n = values.len()
                ));
            }
            AlbumListType::Frequent => {
                wheres.push(
                    "(SELECT COALESCE(SUM(play_count), 0) FROM children c \
                     WHERE c.album_id = albums.id) > 0"
                        .to_string(),
                );
            }
            AlbumListType::Recent => {
                wheres.push(
                    "(SELECT MAX(last_played) FROM children c WHERE c.album_id = albums.id) \
                     IS NOT NULL"
                        .to_string(),
                );
            }
            _ => {}
        }

        let order = match kind {
            AlbumListType::Random => "RANDOM()",
            AlbumListType::Newest => "created DESC",
            AlbumListType::Frequent => {
                "(SELECT COALESCE(SUM(play_count), 0) FROM children c \
                 WHERE c.album_id = albums.id) DESC"
            }
            AlbumListType::Recent => {
                "(SELECT MAX(last_played) FROM children c WHERE c.album_id = albums.id) DESC"
            }
            AlbumListType::Starred => "starred DESC",
            AlbumListType::AlphabeticalByName => "name",
            AlbumListType::AlphabeticalByArtist => "artist, name",
            AlbumListType::ByYear => "year DESC, name",
            AlbumListType::ByGenre => "name",
        };

        let where_clause = if wheres.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", wheres.join(" AND "))
        };
        values.push(i64::from(size).into());
        let limit_pos = values.len();
        values.push(i64::from(offset).into());
        let offset_pos = values.len();
        let sql = format!(
            "SELECT {} FROM albums{} ORDER BY {} LIMIT ?{} OFFSET ?{}",
            ALBUM_COLUMNS, where_clause, order, limit_pos, offset_pos
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), album_from_row)?;
        let mut albums = Vec::new();
        for album in rows {
            albums.push(album?);
        }
        Ok(albums)
    }

    pub fn random_songs(
        &self,
        size: u32,
        genre: Option<&str>,
        from_year: Option<i32>,
        to_year: Option<i32>,
        music_folder: Option<i64>,
    ) -> Result<Vec<Child>, LibraryError> {
        let conn = self.conn()?;
        let mut sql = format!(
            "SELECT {} FROM children WHERE is_dir = 0",
            CHILD_COLUMNS
        );
        let mut values: Vec<Value> = Vec::new();
        if let Some(genre) = genre {
            values.push(genre.to_string().into());
            sql.push_str(&format!(
                " AND (genre = ?{n} OR EXISTS (SELECT 1 FROM song_genres sg \
                 WHERE sg.song_id = children.id AND sg.genre = ?{n}))",
                n = values.len()
            ));
        }
        if let Some(from_year) = from_year {
            values.push(i64::from(from_year).into());
            sql.push_str(&format!(" AND year >= ?{}", values.len()));
        }
        if let Some(to_year) = to_year {
            values.push(i64::from(to_year).into());
            sql.push_str(&format!(" AND year <= ?{}", values.len()));
        }
        if let Some(folder) = music_folder {
            values.push(folder.into());
            sql.push_str(&format!(" AND music_folder_id = ?{}", values.len()));
        }
        values.push(i64::from(size).into());
        sql.push_str(&format!(" ORDER BY RANDOM() LIMIT ?{}", values.len()));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), child_from_row)?;
        let mut songs = Vec::new();
        for song in rows {
            songs.push(song?);
        }
        Ok(songs)
    }

    pub fn songs_by_genre(
        &self,
        genre: &str,
        count: u32,
        offset: u32,
        music_folder: Option<i64>,
    ) -> Result<Vec<Child>, LibraryError> {
        let conn = self.conn()?;
        let mut sql = format!(
            "SELECT {} FROM children WHERE is_dir = 0
             AND (genre = ?1 OR EXISTS (SELECT 1 FROM song_genres sg \
                  WHERE sg.song_id = children.id AND sg.genre = ?1))",
            CHILD_COLUMNS
        );
        let mut values: Vec<Value> = vec![genre.to_string().into()];
        if let Some(folder) = music_folder {
            values.push(folder.into());
            sql.push_str(&format!(" AND music_folder_id = ?{}", values.len()));
        }
        values.push(i64::from(count).into());
        let limit_pos = values.len();
        values.push(i64::from(offset).into());
        sql.push_str(&format!(
            " ORDER BY title LIMIT ?{} OFFSET ?{}",
            limit_pos,
            values.len()
        ));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), child_from_row)?;
        let mut songs = Vec::new();
        for song in rows {
            songs.push(song?);
        }
        Ok(songs)
    }

    /// LIKE-substring search over titles, album names, and artist names.
    pub fn search(&self, query: &str, offsets: SearchOffsets) -> Result<SearchResults, LibraryError> {
        let conn = self.conn()?;
        let pattern = format!("%{}%", like_escape(query));
        let mut results = SearchResults::default();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM artists WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name \
             LIMIT ?2 OFFSET ?3",
            ARTIST_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![pattern, offsets.artist_count, offsets.artist_offset],
            artist_from_row,
        )?;
        for artist in rows {
            results.artists.push(artist?);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM albums WHERE name LIKE ?1 ESCAPE '\\' OR artist LIKE ?1 ESCAPE '\\' \
             ORDER BY name LIMIT ?2 OFFSET ?3",
            ALBUM_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![pattern, offsets.album_count, offsets.album_offset],
            album_from_row,
        )?;
        for album in rows {
            results.albums.push(album?);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM children WHERE is_dir = 0 AND \
             (title LIKE ?1 ESCAPE '\\' OR album LIKE ?1 ESCAPE '\\' OR artist LIKE ?1 ESCAPE '\\') \
             ORDER BY title LIMIT ?2 OFFSET ?3",
            CHILD_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![pattern, offsets.song_count, offsets.song_offset],
            child_from_row,
        )?;
        for song in rows {
            results.songs.push(song?);
        }

        Ok(results)
    }

    pub fn starred(&self) -> Result<Starred, LibraryError> {
        let conn = self.conn()?;
        let mut starred = Starred::default();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM artists WHERE starred IS NOT NULL ORDER BY starred DESC",
            ARTIST_COLUMNS
        ))?;
        let rows = stmt.query_map([], artist_from_row)?;
        for artist in rows {
            starred.artists.push(artist?);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM albums WHERE starred IS NOT NULL ORDER BY starred DESC",
            ALBUM_COLUMNS
        ))?;
        let rows = stmt.query_map([], album_from_row)?;
        for album in rows {
            starred.albums.push(album?);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM children WHERE is_dir = 0 AND starred IS NOT NULL \
             ORDER BY starred DESC",
            CHILD_COLUMNS
        ))?;
        let rows = stmt.query_map([], child_from_row)?;
        for song in rows {
            starred.songs.push(song?);
        }

        Ok(starred)
    }

    /// Genres with derived song and album counts.
    pub fn genres(&self) -> Result<Vec<GenreCount>, LibraryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT g.name,
                    (SELECT COUNT(*) FROM song_genres sg WHERE sg.genre = g.name),
                    (SELECT COUNT(*) FROM album_genres ag WHERE ag.genre = g.name)
             FROM genres g ORDER BY g.name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(GenreCount {
                name: row.get(0)?,
                song_count: row.get(1)?,
                album_count: row.get(2)?,
            })
        })?;
        let mut genres = Vec::new();
        for genre in rows {
            genres.push(genre?);
        }
        Ok(genres)
    }
}

fn like_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_key_strips_articles() {
        let articles = vec!["The".to_string(), "El".to_string()];
        assert_eq!(index_key("The Beatles", &articles), "B");
        assert_eq!(index_key("El Camino", &articles), "C");
        assert_eq!(index_key("Therapy?", &articles), "T");
        assert_eq!(index_key("99 Luftballons", &articles), "#");
        assert_eq!(index_key("", &articles), "#");
    }

    #[test]
    fn groups_sorted_by_name() {
        let articles: Vec<String> = Vec::new();
        let groups = group_by_index(
            vec!["Zebra".to_string(), "Apple".to_string(), "Avocado".to_string()],
            &articles,
            |s| s.as_str(),
        );
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "A");
        assert_eq!(groups[0].entries, vec!["Apple".to_string(), "Avocado".to_string()]);
        assert_eq!(groups[1].name, "Z");
    }

    #[test]
    fn like_escape_handles_wildcards() {
        assert_eq!(like_escape("50%_off"), "50\\%\\_off");
    }
}
