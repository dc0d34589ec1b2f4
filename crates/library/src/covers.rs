use std::fs;
use std::path::{Path, PathBuf};

use crate::{Library, LibraryError};

/// Flat blob directory; file names are album or song ids.
pub(crate) fn covers_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("cache").join("covers")
}

impl Library {
    pub fn ensure_covers_dir(&self) -> Result<PathBuf, LibraryError> {
        let dir = self.covers_dir();
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn cover_blob_path(&self, id: &str) -> PathBuf {
        self.covers_dir().join(id)
    }

    pub fn save_cover_blob(&self, id: &str, bytes: &[u8]) -> Result<(), LibraryError> {
        let dir = self.ensure_covers_dir()?;
        fs::write(dir.join(id), bytes)?;
        Ok(())
    }

    pub fn read_cover_blob(&self, id: &str) -> Result<Option<Vec<u8>>, LibraryError> {
        let path = self.cover_blob_path(id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let library = Library::open_in_memory(dir.path()).unwrap();
        library.save_cover_blob("abc", b"jpegbytes").unwrap();
        assert_eq!(
            library.read_cover_blob("abc").unwrap(),
            Some(b"jpegbytes".to_vec())
        );
        assert_eq!(library.read_cover_blob("missing").unwrap(), None);
    }
}
