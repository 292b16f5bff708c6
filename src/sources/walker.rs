use crate::backend::DataType;
use crate::constants::attributes;
use crate::models::WorkItem;
use futures::Stream;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub type PathPredicate = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Lazy, sorted walk over the files below a root directory.
///
/// Directories are read one at a time as the iterator advances, so large
/// trees are never listed up front. Each yielded item carries its data type
/// and its path relative to the root as attributes.
pub struct DirectoryWalker {
    root: PathBuf,
    recursive: bool,
    predicate: Option<PathPredicate>,
    directories: Vec<PathBuf>,
    files: VecDeque<PathBuf>,
}

impl std::fmt::Debug for DirectoryWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWalker")
            .field("root", &self.root)
            .field("recursive", &self.recursive)
            .field("pending_directories", &self.directories.len())
            .field("pending_files", &self.files.len())
            .finish()
    }
}

impl DirectoryWalker {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        Self {
            directories: vec![root.clone()],
            root,
            recursive: true,
            predicate: None,
            files: VecDeque::new(),
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Keep only files for which `predicate` returns true
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn into_stream(self) -> impl Stream<Item = WorkItem> + Send {
        futures::stream::iter(self)
    }

    fn matches(&self, path: &Path) -> bool {
        self.predicate.as_ref().map_or(true, |predicate| predicate(path))
    }

    /// Read one directory, queueing its files and (when recursive) its
    /// subdirectories in sorted order.
    fn descend(&mut self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(directory = %dir.display(), error = %e, "Skipping unreadable directory");
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(directory = %dir.display(), error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .collect();
        paths.sort();

        let mut subdirectories = Vec::new();
        for path in paths {
            if path.is_dir() {
                if self.recursive {
                    subdirectories.push(path);
                }
            } else {
                self.files.push_back(path);
            }
        }
        // Stack order: first subdirectory on top
        self.directories.extend(subdirectories.into_iter().rev());
        debug!(directory = %dir.display(), "Directory listed");
    }

    fn work_item(&self, path: &Path) -> WorkItem {
        let item = WorkItem::from_path(path, &self.root);
        let relative = item.id.clone();
        item.with_attribute(attributes::DATA_TYPE, DataType::from_path(path).to_string())
            .with_attribute(attributes::RELATIVE_PATH, relative)
    }
}

impl Iterator for DirectoryWalker {
    type Item = WorkItem;

    fn next(&mut self) -> Option<WorkItem> {
        loop {
            while let Some(path) = self.files.pop_front() {
                if self.matches(&path) {
                    return Some(self.work_item(&path));
                }
            }
            let dir = self.directories.pop()?;
            self.descend(&dir);
        }
    }
}
