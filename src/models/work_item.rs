use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One unit of input processed through a pipeline: a point, a raster, a file.
///
/// `id` is unique within a run and is what output names are derived from;
/// `name` is the short display name (file stem, dataset name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub name: String,
    pub path: Option<PathBuf>,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl WorkItem {
    pub fn new<S: Into<String>>(id: S) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            path: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Item for a file found under `root`; the id is the path relative to
    /// `root` so identically named files in different folders stay distinct.
    pub fn from_path(path: &Path, root: &Path) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative.to_string_lossy().into_owned());

        Self {
            id: relative.to_string_lossy().into_owned(),
            name,
            path: Some(path.to_path_buf()),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_attribute<K: Into<String>, V: Into<serde_json::Value>>(mut self, key: K, value: V) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|value| value.as_str())
    }

    /// Dataset location for backend calls: the path when known, else the id
    pub fn location(&self) -> String {
        self.path
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_items_use_relative_ids() {
        let item = WorkItem::from_path(Path::new("/data/a/roads.shp"), Path::new("/data"));
        assert_eq!(item.id, "a/roads.shp");
        assert_eq!(item.name, "roads");
        assert_eq!(item.location(), "/data/a/roads.shp");
    }

    #[test]
    fn plain_items_locate_by_id() {
        let item = WorkItem::new("SBI_12").with_attribute("kind", "points");
        assert_eq!(item.location(), "SBI_12");
        assert_eq!(item.attribute_str("kind"), Some("points"));
    }
}
