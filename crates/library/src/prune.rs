use std::collections::HashSet;

use rusqlite::{params_from_iter, types::Value, Connection};
use tracing::info;

use crate::LibraryError;

const SEEN_BATCH: usize = 500;

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PruneStats {
    pub children: usize,
    pub albums: usize,
    pub artists: usize,
    pub genres: usize,
}

/// Removes catalog rows that were not observed by the scan, then the
/// aggregates they uniquely supported. Must run on the same connection
/// for the lifetime of the temp table. `path_prefix` scopes the child
/// delete for subtree rescans.
pub(crate) fn prune(
    conn: &Connection,
    seen: &HashSet<String>,
    path_prefix: Option<&str>,
) -> Result<PruneStats, LibraryError> {
    conn.execute("CREATE TEMP TABLE seen_ids (id TEXT PRIMARY KEY)", [])?;

    let result = prune_inner(conn, seen, path_prefix);
    // The temp table must not outlive the prune even on error.
    let _ = conn.execute("DROP TABLE seen_ids", []);
    result
}

fn prune_inner(
    conn: &Connection,
    seen: &HashSet<String>,
    path_prefix: Option<&str>,
) -> Result<PruneStats, LibraryError> {
    let ids: Vec<&String> = seen.iter().collect();
    for chunk in ids.chunks(SEEN_BATCH) {
        let placeholders = vec!["(?)"; chunk.len()].join(", ");
        let sql = format!("INSERT OR IGNORE INTO seen_ids (id) VALUES {}", placeholders);
        let values: Vec<Value> = chunk.iter().map(|id| (*id).clone().into()).collect();
        conn.execute(&sql, params_from_iter(values))?;
    }

    let mut stats = PruneStats::default();

    stats.children = match path_prefix {
        Some(prefix) => {
            let pattern = format!("{}/%", prefix.trim_end_matches('/'));
            conn.execute(
                "DELETE FROM children WHERE path LIKE ?1
                 AND id NOT IN (SELECT id FROM seen_ids)",
                [pattern],
            )?
        }
        None => conn.execute(
            "DELETE FROM children WHERE id NOT IN (SELECT id FROM seen_ids)",
            [],
        )?,
    };
    info!("prune: removed {} children", stats.children);

    stats.albums = conn.execute(
        "DELETE FROM albums WHERE id NOT IN
             (SELECT DISTINCT album_id FROM children WHERE album_id != '')",
        [],
    )?;
    info!("prune: removed {} albums", stats.albums);

    let song_artist_links = conn.execute(
        "DELETE FROM song_artists WHERE song_id NOT IN (SELECT id FROM children)",
        [],
    )?;
    let album_artist_links = conn.execute(
        "DELETE FROM album_artists WHERE album_id NOT IN (SELECT id FROM albums)",
        [],
    )?;
    let song_genre_links = conn.execute(
        "DELETE FROM song_genres WHERE song_id NOT IN (SELECT id FROM children)",
        [],
    )?;
    let album_genre_links = conn.execute(
        "DELETE FROM album_genres WHERE album_id NOT IN (SELECT id FROM albums)",
        [],
    )?;
    info!(
        "prune: removed {} dangling link rows",
        song_artist_links + album_artist_links + song_genre_links + album_genre_links
    );

    stats.artists = conn.execute(
        "DELETE FROM artists WHERE id NOT IN (SELECT artist_id FROM children WHERE artist_id != '')
             AND id NOT IN (SELECT artist_id FROM albums WHERE artist_id != '')
             AND id NOT IN (SELECT artist_id FROM song_artists)
             AND id NOT IN (SELECT artist_id FROM album_artists)",
        [],
    )?;
    info!("prune: removed {} artists", stats.artists);

    stats.genres = conn.execute(
        "DELETE FROM genres WHERE name NOT IN (SELECT genre FROM song_genres)
             AND name NOT IN (SELECT genre FROM album_genres)",
        [],
    )?;
    info!("prune: removed {} genres", stats.genres);

    Ok(stats)
}
