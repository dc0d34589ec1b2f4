use std::path::PathBuf;

use common::MusicFolder;
use crossbeam_channel::Sender;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::scan::CancelToken;

/// One filesystem entry handed to a scan worker.
pub(crate) struct WalkTask {
    pub path: PathBuf,
    pub is_dir: bool,
    pub folder: MusicFolder,
}

/// Walks every folder depth-first, pushing tasks into the bounded channel.
/// The send blocks when workers fall behind, which is the backpressure the
/// pipeline relies on. Entry errors are logged and skipped; only
/// cancellation stops the walk early.
pub(crate) fn walk_folders(folders: &[MusicFolder], tx: Sender<WalkTask>, cancel: &CancelToken) {
    for folder in folders {
        let root = PathBuf::from(&folder.path);
        for entry in WalkDir::new(&root).follow_links(false) {
            if cancel.is_cancelled() {
                debug!("walk cancelled under {:?}", root);
                return;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable entry: {}", err);
                    continue;
                }
            };
            // The root itself has no catalog row.
            if entry.path() == root {
                continue;
            }
            let task = WalkTask {
                path: entry.path().to_path_buf(),
                is_dir: entry.file_type().is_dir(),
                folder: folder.clone(),
            };
            if tx.send(task).is_err() {
                // Receiver side is gone; nothing left to feed.
                return;
            }
        }
    }
}
