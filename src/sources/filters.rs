use crate::backend::{DataType, GeoprocessingBackend};
use crate::models::WorkItem;
use futures::{Stream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Predicate keeping files classified as `data_type`
pub fn by_data_type(data_type: DataType) -> impl Fn(&Path) -> bool + Send + Sync + 'static {
    move |path| DataType::from_path(path) == data_type
}

/// Predicate keeping files with one of `extensions`, ignoring case and a
/// leading dot
pub fn by_extension(extensions: &[&str]) -> impl Fn(&Path) -> bool + Send + Sync + 'static {
    let wanted: Vec<String> = extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect();
    move |path| {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| wanted.contains(&ext))
    }
}

/// Keep only items whose spatial reference name equals `target`.
///
/// Items that cannot be described are dropped with a warning.
pub fn filter_by_spatial_reference<S>(
    items: S,
    geo: Arc<dyn GeoprocessingBackend>,
    target: String,
) -> impl Stream<Item = WorkItem>
where
    S: Stream<Item = WorkItem>,
{
    items.filter_map(move |item| {
        let geo = Arc::clone(&geo);
        let target = target.clone();
        async move {
            match geo.describe(&item.location()).await {
                Ok(description) if description.spatial_reference.as_deref() == Some(target.as_str()) => {
                    Some(item)
                }
                Ok(description) => {
                    debug!(
                        item_id = %item.id,
                        spatial_reference = ?description.spatial_reference,
                        "Spatial reference does not match; skipping"
                    );
                    None
                }
                Err(e) => {
                    warn!(item_id = %item.id, error = %e, "Unable to describe item; skipping");
                    None
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Dataset, MemoryBackend, ShapeType};

    #[test]
    fn extension_predicate_ignores_case_and_dots() {
        let jpg = by_extension(&[".jpg", "JPEG"]);
        assert!(jpg(Path::new("IMG_01.JPG")));
        assert!(jpg(Path::new("IMG_02.jpeg")));
        assert!(!jpg(Path::new("IMG_03.png")));
        assert!(!jpg(Path::new("jpg")));
    }

    #[tokio::test]
    async fn keeps_only_matching_zone() {
        let geo = MemoryBackend::new()
            .with_dataset(
                "a.shp",
                Dataset::feature_class("a", ShapeType::Polygon).with_spatial_reference("NAD_1927_UTM_Zone_10N"),
            )
            .with_dataset(
                "b.shp",
                Dataset::feature_class("b", ShapeType::Polygon).with_spatial_reference("NAD_1927_UTM_Zone_11N"),
            );
        let items = futures::stream::iter(vec![
            WorkItem::new("a.shp"),
            WorkItem::new("b.shp"),
            WorkItem::new("missing.shp"),
        ]);

        let kept: Vec<WorkItem> = filter_by_spatial_reference(
            items,
            Arc::new(geo),
            "NAD_1927_UTM_Zone_10N".to_string(),
        )
        .collect()
        .await;

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "a.shp");
    }
}
