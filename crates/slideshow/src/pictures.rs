//! Sorted picture list backing the slideshow.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use anyhow::{Result, ensure};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Return `true` if `path` has a picture extension the screen can decode.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    const EXTS: &[&str] = &["jpg", "jpeg", "png"];
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            EXTS.iter().any(|e| *e == ext)
        })
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_str().is_some_and(|s| s.starts_with('.'))
}

fn by_bytes(a: &Path, b: &Path) -> Ordering {
    a.as_os_str().cmp(b.as_os_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureEntry {
    pub path: PathBuf,
    pub display_name: String,
}

impl PictureEntry {
    pub fn new(path: PathBuf) -> Self {
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, display_name }
    }
}

/// Pictures ordered by the raw bytes of their path, without duplicates.
///
/// This is plain string order, so `day-2/x.jpeg` sorts before `day/x.jpeg`.
/// File names start with the capture time, so the order is also
/// chronological within a day directory.
#[derive(Debug, Clone, Default)]
pub struct PictureList {
    entries: Vec<PictureEntry>,
}

impl PictureList {
    /// Collect every picture under `dir`. Symlinks are followed and hidden
    /// directories below the root are skipped.
    pub fn scan(dir: &Path, recursive: bool) -> Result<Self> {
        ensure!(dir.is_dir(), "picture directory {} does not exist", dir.display());
        let mut walker = WalkDir::new(dir).follow_links(true);
        if !recursive {
            walker = walker.max_depth(1);
        }
        let mut paths = Vec::new();
        for entry in walker.into_iter().filter_entry(|e| !is_hidden_dir(e)) {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_supported_image(entry.path()) => {
                    paths.push(entry.into_path());
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "skipping unreadable entry"),
            }
        }
        let list = Self::from_paths(paths);
        debug!(dir = %dir.display(), count = list.len(), "picture directory scanned");
        Ok(list)
    }

    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut paths: Vec<PathBuf> = paths.into_iter().collect();
        paths.sort_by(|a, b| by_bytes(a, b));
        paths.dedup_by(|a, b| a.as_os_str() == b.as_os_str());
        Self {
            entries: paths.into_iter().map(PictureEntry::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PictureEntry> {
        self.entries.get(index)
    }

    pub fn position(&self, path: &Path) -> Option<usize> {
        self.entries
            .binary_search_by(|entry| by_bytes(&entry.path, path))
            .ok()
    }

    /// Insert `path` at its sorted position.
    ///
    /// Returns `Ok(index)` for a new entry and `Err(index)` when the path
    /// was already listed.
    pub fn insert(&mut self, path: PathBuf) -> Result<usize, usize> {
        match self
            .entries
            .binary_search_by(|entry| by_bytes(&entry.path, &path))
        {
            Ok(existing) => Err(existing),
            Err(at) => {
                self.entries.insert(at, PictureEntry::new(path));
                Ok(at)
            }
        }
    }

    /// Remove `path`, returning the index it occupied.
    pub fn remove(&mut self, path: &Path) -> Option<usize> {
        let at = self.position(path)?;
        self.entries.remove(at);
        Some(at)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PictureEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn names(list: &PictureList) -> Vec<String> {
        list.iter().map(|e| e.display_name.clone()).collect()
    }

    #[test]
    fn scan_is_sorted_and_filters_extensions() {
        let tmp = tempfile::tempdir().unwrap();
        let day = tmp.path().join("2024-05-01_Photomaton");
        fs::create_dir_all(&day).unwrap();
        fs::create_dir_all(tmp.path().join(".thumbs")).unwrap();
        for name in ["12-30-00_Photomaton.jpeg", "09-00-00_Photomaton.jpeg", "notes.txt"] {
            fs::write(day.join(name), b"x").unwrap();
        }
        fs::write(tmp.path().join(".thumbs").join("a.jpeg"), b"x").unwrap();
        fs::write(tmp.path().join("top.PNG"), b"x").unwrap();

        let list = PictureList::scan(tmp.path(), true).unwrap();
        assert_eq!(
            names(&list),
            vec!["09-00-00_Photomaton.jpeg", "12-30-00_Photomaton.jpeg", "top.PNG"]
        );

        let flat = PictureList::scan(tmp.path(), false).unwrap();
        assert_eq!(names(&flat), vec!["top.PNG"]);
    }

    #[test]
    fn scan_of_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(PictureList::scan(&tmp.path().join("absent"), true).is_err());
    }

    #[test]
    fn insertion_keeps_order_for_any_arrival_order() {
        let orders = [
            ["b", "a", "d", "c", "e"],
            ["e", "d", "c", "b", "a"],
            ["c", "a", "e", "b", "d"],
        ];
        for order in orders {
            let mut list = PictureList::default();
            for name in order {
                list.insert(PathBuf::from(format!("/p/{name}.jpeg"))).unwrap();
                let paths: Vec<_> = list.iter().map(|e| e.path.clone()).collect();
                let mut sorted = paths.clone();
                sorted.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
                assert_eq!(paths, sorted);
            }
            assert_eq!(list.len(), 5);
        }
    }

    #[test]
    fn duplicate_insert_reports_existing_position() {
        let mut list = PictureList::from_paths(["/p/a.jpeg", "/p/c.jpeg"].map(PathBuf::from));
        assert_eq!(list.insert(PathBuf::from("/p/b.jpeg")), Ok(1));
        assert_eq!(list.insert(PathBuf::from("/p/c.jpeg")), Err(2));
        assert_eq!(list.len(), 3);
        assert_eq!(list.remove(Path::new("/p/a.jpeg")), Some(0));
        assert_eq!(list.remove(Path::new("/p/a.jpeg")), None);
        assert_eq!(list.position(Path::new("/p/c.jpeg")), Some(1));
    }

    #[test]
    fn order_is_plain_string_order() {
        let tmp = tempfile::tempdir().unwrap();
        for day in ["day", "day-2"] {
            fs::create_dir_all(tmp.path().join(day)).unwrap();
            fs::write(tmp.path().join(day).join("a.jpeg"), b"x").unwrap();
        }
        let list = PictureList::scan(tmp.path(), true).unwrap();
        let order: Vec<_> = list.iter().map(|e| e.path.clone()).collect();
        assert_eq!(
            order,
            vec![
                tmp.path().join("day-2").join("a.jpeg"),
                tmp.path().join("day").join("a.jpeg")
            ]
        );

        let mut list = PictureList::from_paths([PathBuf::from("/p/day/a.jpeg")]);
        assert_eq!(list.insert(PathBuf::from("/p/day-2/a.jpeg")), Ok(0));
        assert_eq!(list.insert(PathBuf::from("/p/day.jpeg")), Ok(1));
        assert_eq!(list.position(Path::new("/p/day/a.jpeg")), Some(2));
    }
}
