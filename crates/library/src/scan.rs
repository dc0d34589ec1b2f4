use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::UNIX_EPOCH;

use common::{
    album_id, artist_id, audio_suffix, child_id, content_type_for, join_display, parent_id,
    relpath_from, Album, Child, MusicFolder, UNKNOWN_ARTIST,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use metadata::{read_tags, TagInfo};
use rusqlite::params;
use tracing::{debug, info, warn};

use crate::prune::prune;
use crate::store::{
    ensure_genre, link_album_artist, link_album_genre, link_song_artist, link_song_genre,
    merge_tags_into_child, now_secs, set_album_cover, upsert_album, upsert_artist,
    upsert_children,
};
use crate::walk::{walk_folders, WalkTask};
use crate::{Library, LibraryError};

const CHILD_BATCH: usize = 100;

/// Cooperative cancellation flag shared between the walker, the workers,
/// and whoever requested the scan.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Observable scan state; shared with the HTTP layer.
#[derive(Default)]
pub struct ScanStatus {
    scanning: AtomicBool,
    count: AtomicU64,
    last_scan: AtomicI64,
}

impl ScanStatus {
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Seconds since epoch of the last completed scan; zero means never.
    pub fn last_scan_time(&self) -> i64 {
        self.last_scan.load(Ordering::SeqCst)
    }

    fn try_start(&self) -> bool {
        self.scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn finish(&self) {
        self.scanning.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ScanSummary {
    /// Non-directory rows observed, including incremental skips.
    pub scanned: u64,
    /// Rows actually written.
    pub updated: u64,
    pub pruned_children: usize,
    pub pruned_albums: usize,
    pub pruned_artists: usize,
}

/// What a worker hands to the saver.
enum ScanItem {
    Dir(Child),
    /// Incremental skip: the id exists and is current; nothing to write.
    Seen(String),
    Song(Child, Option<TagInfo>),
}

#[derive(Clone)]
pub struct Scanner {
    library: Library,
    /// Configured roots as (name, path).
    folders: Vec<(String, String)>,
    status: Arc<ScanStatus>,
    cancel: CancelToken,
}

impl Scanner {
    pub fn new(library: Library, folders: Vec<(String, String)>) -> Self {
        Self {
            library,
            folders,
            status: Arc::new(ScanStatus::default()),
            cancel: CancelToken::new(),
        }
    }

    pub fn status(&self) -> Arc<ScanStatus> {
        Arc::clone(&self.status)
    }

    pub fn is_scanning(&self) -> bool {
        self.status.is_scanning()
    }

    pub fn scan_count(&self) -> u64 {
        self.status.count()
    }

    pub fn last_scan_time(&self) -> i64 {
        self.status.last_scan_time()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Scans every configured root. Concurrent calls collapse: when
    /// another scan is already running the call returns `Ok(None)`
    /// immediately.
    pub fn scan_all(&self, incremental: bool) -> Result<Option<ScanSummary>, LibraryError> {
        let mut roots = Vec::new();
        for (name, path) in &self.folders {
            let folder = self.library.ensure_music_folder(name, path)?;
            let walk_root = PathBuf::from(&folder.path);
            if !walk_root.exists() {
                warn!("music folder missing on disk, skipping: {:?}", walk_root);
                continue;
            }
            roots.push((folder, walk_root));
        }
        self.run_scan(roots, incremental, None)
    }

    /// Rescans only the subtree rooted at a directory row.
    pub fn scan_by_id(&self, id: &str) -> Result<Option<ScanSummary>, LibraryError> {
        let child = self
            .library
            .child(id)?
            .ok_or_else(|| LibraryError::NotFound(format!("directory {}", id)))?;
        if !child.is_dir {
            return Err(LibraryError::NotFound(format!("directory {}", id)));
        }
        let folders = self.library.music_folders()?;
        let folder = folders
            .into_iter()
            .find(|f| f.id == child.music_folder_id)
            .ok_or_else(|| {
                LibraryError::NotFound(format!("music folder {}", child.music_folder_id))
            })?;
        let subtree = PathBuf::from(&child.path);
        let prefix = child.path.clone();
        self.run_scan(vec![(folder, subtree)], true, Some(prefix))
    }

    fn run_scan(
        &self,
        roots: Vec<(MusicFolder, PathBuf)>,
        incremental: bool,
        prune_prefix: Option<String>,
    ) -> Result<Option<ScanSummary>, LibraryError> {
        if !self.status.try_start() {
            debug!("scan already running, collapsing request");
            return Ok(None);
        }
        self.cancel.reset();
        self.status.count.store(0, Ordering::SeqCst);

        let result = self.run_scan_inner(roots, incremental, prune_prefix);
        self.status.finish();
        result.map(Some)
    }

    fn run_scan_inner(
        &self,
        roots: Vec<(MusicFolder, PathBuf)>,
        incremental: bool,
        prune_prefix: Option<String>,
    ) -> Result<ScanSummary, LibraryError> {
        let started = std::time::Instant::now();
        info!(
            "scan started ({} root(s), incremental={})",
            roots.len(),
            incremental
        );
        if roots.is_empty() {
            // Nothing was walked, so nothing may be pruned either.
            warn!("no scannable roots; skipping scan and prune");
            return Ok(ScanSummary::default());
        }

        self.library.ensure_covers_dir()?;

        let snapshot = if incremental {
            self.created_snapshot()?
        } else {
            HashMap::new()
        };

        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .max(4);
        let (task_tx, task_rx) = bounded::<WalkTask>(workers * 2);
        let (item_tx, item_rx) = bounded::<ScanItem>(workers * 4);

        // One dedicated connection: the saver is the only writer, and the
        // prune temp table must live on the same connection.
        let conn = self.library.conn()?;

        let summary = thread::scope(|scope| -> Result<ScanSummary, LibraryError> {
            let cancel = self.cancel.clone();
            let walk_folders_list = roots.clone();
            scope.spawn(move || {
                let folders: Vec<MusicFolder> =
                    walk_folders_list.iter().map(|(f, _)| f.clone()).collect();
                let walk_roots: Vec<PathBuf> =
                    walk_folders_list.iter().map(|(_, p)| p.clone()).collect();
                walk_subtrees(&folders, &walk_roots, task_tx, &cancel);
            });

            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let item_tx = item_tx.clone();
                let cancel = self.cancel.clone();
                let snapshot = &snapshot;
                scope.spawn(move || {
                    worker_loop(task_rx, item_tx, snapshot, incremental, &cancel);
                });
            }
            // The saver's receive loop ends when every worker clone drops.
            drop(task_rx);
            drop(item_tx);

            let mut saver = Saver::new(&self.library, &conn, &self.status);
            saver.run(item_rx);

            let mut summary = ScanSummary {
                scanned: saver.scanned,
                updated: saver.updated,
                ..ScanSummary::default()
            };

            if self.cancel.is_cancelled() {
                info!("scan cancelled; skipping prune");
                return Ok(summary);
            }

            let stats = prune(&conn, &saver.seen_ids, prune_prefix.as_deref())?;
            summary.pruned_children = stats.children;
            summary.pruned_albums = stats.albums;
            summary.pruned_artists = stats.artists;
            Ok(summary)
        })?;

        self.status.last_scan.store(now_secs(), Ordering::SeqCst);
        info!(
            "scan finished in {:.1}s: {} files ({} updated), pruned {} children / {} albums / {} artists",
            started.elapsed().as_secs_f64(),
            summary.scanned,
            summary.updated,
            summary.pruned_children,
            summary.pruned_albums,
            summary.pruned_artists
        );
        Ok(summary)
    }

    /// `{id -> created}` for every non-directory child, used to skip
    /// unchanged files on incremental scans.
    fn created_snapshot(&self) -> Result<HashMap<String, i64>, LibraryError> {
        let conn = self.library.conn()?;
        let mut stmt = conn.prepare("SELECT id, created FROM children WHERE is_dir = 0")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut map = HashMap::new();
        for row in rows {
            let (id, created) = row?;
            map.insert(id, created);
        }
        Ok(map)
    }

    /// Re-reads one file's tags after an external tag write and
    /// propagates the changes, including aggregate rows.
    pub fn update_song_metadata(&self, id: &str) -> Result<Child, LibraryError> {
        let mut child = self
            .library
            .child(id)?
            .ok_or_else(|| LibraryError::NotFound(format!("song {}", id)))?;
        if child.is_dir {
            return Err(LibraryError::NotFound(format!("song {}", id)));
        }
        let path = PathBuf::from(&child.path);
        let tags = read_tags(&path)?;
        if let Ok(meta) = fs::metadata(&path) {
            child.size = meta.len();
            child.created = file_mtime(&meta);
        }

        let conn = self.library.conn()?;
        apply_song_tags(&self.library, &conn, &mut child, &tags, &mut SaverCaches::default())?;
        upsert_children(&conn, &[child.clone()])?;
        Ok(child)
    }

    /// Writes a cover blob and points the matching album or child row at
    /// it.
    pub fn save_cover_art(&self, id: &str, bytes: &[u8]) -> Result<(), LibraryError> {
        self.library.save_cover_blob(id, bytes)?;
        let conn = self.library.conn()?;
        let updated = conn.execute(
            "UPDATE albums SET cover_art = ?1 WHERE id = ?1",
            params![id],
        )?;
        if updated == 0 {
            conn.execute(
                "UPDATE children SET cover_art = ?1 WHERE id = ?1",
                params![id],
            )?;
        }
        Ok(())
    }
}

fn file_mtime(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Walker wrapper pairing each walk root with its owning folder.
fn walk_subtrees(
    folders: &[MusicFolder],
    walk_roots: &[PathBuf],
    tx: Sender<WalkTask>,
    cancel: &CancelToken,
) {
    for (folder, walk_root) in folders.iter().zip(walk_roots) {
        let scoped = MusicFolder {
            id: folder.id,
            name: folder.name.clone(),
            path: folder.path.clone(),
        };
        walk_one(&scoped, walk_root, &tx, cancel);
        if cancel.is_cancelled() {
            return;
        }
    }
}

fn walk_one(folder: &MusicFolder, walk_root: &Path, tx: &Sender<WalkTask>, cancel: &CancelToken) {
    // Whole-folder walks reuse the plain walker; subtree walks root the
    // traversal deeper but keep ids relative to the folder.
    if walk_root == Path::new(&folder.path) {
        walk_folders(std::slice::from_ref(folder), tx.clone(), cancel);
        return;
    }
    for entry in walkdir::WalkDir::new(walk_root).follow_links(false) {
        if cancel.is_cancelled() {
            return;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry: {}", err);
                continue;
            }
        };
        let task = WalkTask {
            path: entry.path().to_path_buf(),
            is_dir: entry.file_type().is_dir(),
            folder: folder.clone(),
        };
        if tx.send(task).is_err() {
            return;
        }
    }
}

fn worker_loop(
    tasks: Receiver<WalkTask>,
    items: Sender<ScanItem>,
    snapshot: &HashMap<String, i64>,
    incremental: bool,
    cancel: &CancelToken,
) {
    for task in tasks.iter() {
        if cancel.is_cancelled() {
            // Finish the current task set without starting new work.
            break;
        }
        match process_task(&task, snapshot, incremental) {
            Some(item) => {
                if items.send(item).is_err() {
                    break;
                }
            }
            None => continue,
        }
    }
}

fn process_task(
    task: &WalkTask,
    snapshot: &HashMap<String, i64>,
    incremental: bool,
) -> Option<ScanItem> {
    let root = Path::new(&task.folder.path);
    let rel = relpath_from(root, &task.path)?;
    if rel.is_empty() {
        return None;
    }
    let id = child_id(task.folder.id, &rel);
    let parent = parent_id(task.folder.id, &rel);
    let title = task
        .path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if task.is_dir {
        return Some(ScanItem::Dir(Child {
            id,
            parent,
            is_dir: true,
            title,
            path: task.path.to_string_lossy().to_string(),
            music_folder_id: task.folder.id,
            created: fs::metadata(&task.path).map(|m| file_mtime(&m)).unwrap_or(0),
            ..Child::default()
        }));
    }

    let suffix = audio_suffix(&task.path)?;
    let meta = match fs::metadata(&task.path) {
        Ok(meta) => meta,
        Err(err) => {
            warn!("stat failed for {:?}: {}", task.path, err);
            return None;
        }
    };
    let mtime = file_mtime(&meta);

    if incremental {
        if let Some(created) = snapshot.get(&id) {
            if *created >= mtime {
                return Some(ScanItem::Seen(id));
            }
        }
    }

    let stem = task
        .path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| title.clone());
    let child = Child {
        id,
        parent,
        is_dir: false,
        title: stem,
        path: task.path.to_string_lossy().to_string(),
        size: meta.len(),
        content_type: content_type_for(&suffix).to_string(),
        suffix,
        music_folder_id: task.folder.id,
        created: mtime,
        media_type: "music".to_string(),
        ..Child::default()
    };

    match read_tags(&task.path) {
        Ok(tags) => Some(ScanItem::Song(child, Some(tags))),
        Err(err) => {
            warn!("tag read failed for {:?}: {}", task.path, err);
            Some(ScanItem::Song(child, None))
        }
    }
}

/// Per-scan dedupe sets so aggregates are upserted once each.
#[derive(Default)]
struct SaverCaches {
    artists: HashSet<String>,
    genres: HashSet<String>,
    albums: HashSet<String>,
    albums_with_cover: HashSet<String>,
}

struct Saver<'a> {
    library: &'a Library,
    conn: &'a rusqlite::Connection,
    status: &'a ScanStatus,
    caches: SaverCaches,
    batch: Vec<Child>,
    seen_ids: HashSet<String>,
    scanned: u64,
    updated: u64,
}

impl<'a> Saver<'a> {
    fn new(library: &'a Library, conn: &'a rusqlite::Connection, status: &'a ScanStatus) -> Self {
        Self {
            library,
            conn,
            status,
            caches: SaverCaches::default(),
            batch: Vec::with_capacity(CHILD_BATCH),
            seen_ids: HashSet::new(),
            scanned: 0,
            updated: 0,
        }
    }

    /// Drains the item channel to completion, even after errors; a failed
    /// batch is logged and the scan moves on.
    fn run(&mut self, items: Receiver<ScanItem>) {
        for item in items.iter() {
            match item {
                ScanItem::Dir(child) => {
                    self.seen_ids.insert(child.id.clone());
                    self.push(child);
                }
                ScanItem::Seen(id) => {
                    self.seen_ids.insert(id);
                    self.scanned += 1;
                    self.status.count.fetch_add(1, Ordering::SeqCst);
                }
                ScanItem::Song(mut child, tags) => {
                    if let Some(tags) = &tags {
                        if let Err(err) = apply_song_tags(
                            self.library,
                            self.conn,
                            &mut child,
                            tags,
                            &mut self.caches,
                        ) {
                            warn!("aggregate upsert failed for {}: {}", child.path, err);
                        }
                    }
                    self.seen_ids.insert(child.id.clone());
                    self.scanned += 1;
                    self.updated += 1;
                    self.status.count.fetch_add(1, Ordering::SeqCst);
                    self.push(child);
                }
            }
        }
        self.flush();
    }

    fn push(&mut self, child: Child) {
        self.batch.push(child);
        if self.batch.len() >= CHILD_BATCH {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        if let Err(err) = upsert_children(self.conn, &self.batch) {
            warn!("child batch upsert failed ({} rows): {}", self.batch.len(), err);
        }
        self.batch.clear();
    }
}

/// Resolves tags into aggregate rows and links, and merges them into the
/// child. Artist/album/genre upserts always land before the child row
/// referencing them.
fn apply_song_tags(
    library: &Library,
    conn: &rusqlite::Connection,
    child: &mut Child,
    tags: &TagInfo,
    caches: &mut SaverCaches,
) -> Result<(), LibraryError> {
    merge_tags_into_child(child, tags);

    for name in &tags.artists {
        let aid = artist_id(name);
        if caches.artists.insert(aid.clone()) {
            upsert_artist(conn, &aid, name)?;
        }
        link_song_artist(conn, &child.id, &aid)?;
    }
    for genre in &tags.genres {
        if caches.genres.insert(genre.clone()) {
            ensure_genre(conn, genre)?;
        }
        link_song_genre(conn, &child.id, genre)?;
    }

    let album_name = tags.album.clone().unwrap_or_default();
    if album_name.is_empty() {
        // No album: a song with an embedded image keeps its own blob.
        if let Some(cover) = &tags.cover {
            library.save_cover_blob(&child.id, &cover.data)?;
            child.cover_art = child.id.clone();
        }
        return Ok(());
    }

    let credited: Vec<String> = if !tags.album_artists.is_empty() {
        tags.album_artists.clone()
    } else if !tags.artists.is_empty() {
        tags.artists.clone()
    } else {
        vec![UNKNOWN_ARTIST.to_string()]
    };
    let display = join_display(&credited);
    let alb_id = album_id(&display, &album_name);
    child.album_id = alb_id.clone();

    if caches.albums.insert(alb_id.clone()) {
        for name in &credited {
            let aid = artist_id(name);
            if caches.artists.insert(aid.clone()) {
                upsert_artist(conn, &aid, name)?;
            }
        }
        let primary = artist_id(&credited[0]);
        let album = Album {
            id: alb_id.clone(),
            name: album_name.clone(),
            artist: display,
            artist_id: primary,
            cover_art: None,
            created: child.created,
            starred: None,
            user_rating: None,
            year: tags.year,
            genre: tags.genres.first().cloned(),
        };
        upsert_album(conn, &album)?;
        for name in &credited {
            link_album_artist(conn, &alb_id, &artist_id(name))?;
        }
        for genre in &tags.genres {
            if caches.genres.insert(genre.clone()) {
                ensure_genre(conn, genre)?;
            }
            link_album_genre(conn, &alb_id, genre)?;
        }
        // A cover persisted by an earlier scan still counts.
        let existing: Option<Option<String>> = conn
            .query_row(
                "SELECT cover_art FROM albums WHERE id = ?1",
                params![alb_id],
                |row| row.get(0),
            )
            .ok();
        if matches!(existing, Some(Some(ref c)) if !c.is_empty()) {
            caches.albums_with_cover.insert(alb_id.clone());
        }
    }

    if !caches.albums_with_cover.contains(&alb_id) {
        if let Some(cover) = &tags.cover {
            library.save_cover_blob(&alb_id, &cover.data)?;
            set_album_cover(conn, &alb_id, &alb_id)?;
            caches.albums_with_cover.insert(alb_id.clone());
        }
    }

    if caches.albums_with_cover.contains(&alb_id) {
        child.cover_art = alb_id;
    } else if let Some(cover) = &tags.cover {
        library.save_cover_blob(&child.id, &cover.data)?;
        child.cover_art = child.id.clone();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, rel: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn scanner_for(dir: &Path) -> (Scanner, Library) {
        let library = Library::open_in_memory(dir).unwrap();
        let scanner = Scanner::new(
            library.clone(),
            vec![("Music".to_string(), dir.join("music").to_string_lossy().to_string())],
        );
        (scanner, library)
    }

    fn child_paths(library: &Library) -> Vec<String> {
        let conn = library.conn().unwrap();
        let mut stmt = conn
            .prepare("SELECT path FROM children WHERE is_dir = 0 ORDER BY path")
            .unwrap();
        let rows = stmt.query_map([], |row| row.get(0)).unwrap();
        rows.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn full_scan_records_every_audio_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("music")).unwrap();
        // Unparseable bytes still produce minimal rows; that is the
        // fatal-read fallback path.
        let a = write_file(tmp.path(), "music/album/a.mp3", b"not really mp3");
        let b = write_file(tmp.path(), "music/album/b.flac", b"not really flac");
        write_file(tmp.path(), "music/album/cover.jpg", b"not audio");

        let (scanner, library) = scanner_for(tmp.path());
        let summary = scanner.scan_all(false).unwrap().unwrap();
        assert_eq!(summary.scanned, 2);

        let paths = child_paths(&library);
        assert_eq!(
            paths,
            vec![
                a.to_string_lossy().to_string(),
                b.to_string_lossy().to_string()
            ]
        );

        // Directory rows exist with stable ids.
        let folder = &library.music_folders().unwrap()[0];
        let dir_id = child_id(folder.id, "album");
        let dir = library.child(&dir_id).unwrap().unwrap();
        assert!(dir.is_dir);
        assert_eq!(dir.title, "album");
    }

    #[test]
    fn ids_are_stable_across_scans() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("music")).unwrap();
        write_file(tmp.path(), "music/album/song.mp3", b"x");

        let (scanner, library) = scanner_for(tmp.path());
        scanner.scan_all(false).unwrap().unwrap();
        let folder_id = library.music_folders().unwrap()[0].id;
        let expected = common::md5_hex(&format!("{}:album/song.mp3", folder_id));
        assert!(library.child(&expected).unwrap().is_some());

        scanner.scan_all(false).unwrap().unwrap();
        assert!(library.child(&expected).unwrap().is_some());
    }

    #[test]
    fn prune_removes_deleted_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("music")).unwrap();
        let doomed = write_file(tmp.path(), "music/gone.mp3", b"x");
        write_file(tmp.path(), "music/kept.mp3", b"x");

        let (scanner, library) = scanner_for(tmp.path());
        scanner.scan_all(false).unwrap().unwrap();
        assert_eq!(child_paths(&library).len(), 2);

        fs::remove_file(&doomed).unwrap();
        let summary = scanner.scan_all(false).unwrap().unwrap();
        assert_eq!(summary.pruned_children, 1);
        let paths = child_paths(&library);
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("kept.mp3"));
    }

    #[test]
    fn rename_changes_id_and_prunes_old_row() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("music")).unwrap();
        let old = write_file(tmp.path(), "music/album/song.mp3", b"x");

        let (scanner, library) = scanner_for(tmp.path());
        scanner.scan_all(false).unwrap().unwrap();
        let folder_id = library.music_folders().unwrap()[0].id;
        let old_id = child_id(folder_id, "album/song.mp3");
        assert!(library.child(&old_id).unwrap().is_some());

        fs::rename(&old, tmp.path().join("music/album/song-renamed.mp3")).unwrap();
        scanner.scan_all(false).unwrap().unwrap();

        assert!(library.child(&old_id).unwrap().is_none());
        let new_id = child_id(folder_id, "album/song-renamed.mp3");
        assert!(library.child(&new_id).unwrap().is_some());
    }

    #[test]
    fn incremental_scan_skips_unchanged_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("music")).unwrap();
        write_file(tmp.path(), "music/a.mp3", b"x");
        write_file(tmp.path(), "music/b.mp3", b"x");

        let (scanner, _library) = scanner_for(tmp.path());
        let first = scanner.scan_all(false).unwrap().unwrap();
        assert_eq!(first.updated, 2);

        let second = scanner.scan_all(true).unwrap().unwrap();
        assert_eq!(second.scanned, 2);
        assert_eq!(second.updated, 0);
        assert_eq!(second.pruned_children, 0);
    }

    #[test]
    fn album_materialization_prefers_album_artist() {
        let tmp = tempfile::tempdir().unwrap();
        let library = Library::open_in_memory(tmp.path()).unwrap();
        let conn = library.conn().unwrap();
        let mut caches = SaverCaches::default();

        let mut child = Child {
            id: "song-a".to_string(),
            path: "/music/a.mp3".to_string(),
            created: 5,
            ..Child::default()
        };
        let tags = TagInfo {
            artists: vec!["A".to_string()],
            album: Some("X".to_string()),
            ..TagInfo::default()
        };
        apply_song_tags(&library, &conn, &mut child, &tags, &mut caches).unwrap();
        assert_eq!(child.album_id, common::md5_hex("A|X"));

        let (artist, created): (String, i64) = conn
            .query_row(
                "SELECT artist, created FROM albums WHERE id = ?1",
                params![child.album_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(artist, "A");
        assert_eq!(created, 5);

        // An explicit album artist changes the album identity.
        let mut other = Child {
            id: "song-b".to_string(),
            path: "/music/b.mp3".to_string(),
            created: 6,
            ..Child::default()
        };
        let tags = TagInfo {
            artists: vec!["A".to_string()],
            album_artists: vec!["Various".to_string()],
            album: Some("X".to_string()),
            ..TagInfo::default()
        };
        apply_song_tags(&library, &conn, &mut other, &tags, &mut caches).unwrap();
        assert_eq!(other.album_id, common::md5_hex("Various|X"));
        assert_ne!(other.album_id, child.album_id);
    }

    #[test]
    fn scan_gate_collapses_to_single_flight() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("music")).unwrap();
        let (scanner, _library) = scanner_for(tmp.path());
        assert!(scanner.status.try_start());
        // While a scan is marked running, a second request collapses.
        assert!(scanner.scan_all(false).unwrap().is_none());
        scanner.status.finish();
        assert!(scanner.scan_all(false).unwrap().is_some());
    }

    #[test]
    fn last_scan_time_is_published() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("music")).unwrap();
        let (scanner, _library) = scanner_for(tmp.path());
        assert_eq!(scanner.last_scan_time(), 0);
        scanner.scan_all(false).unwrap().unwrap();
        assert!(scanner.last_scan_time() > 0);
    }
}
