use crate::backend::GeoprocessingBackend;
use crate::error::BackendResult;
use crate::models::WorkItem;
use futures::{Stream, StreamExt};
use tracing::warn;

/// Work items from the rows of `table`, one per record, identified by the
/// value of `id_field`.
///
/// Opening the cursor fails when the table or the field does not exist.
/// Rows with an empty id are skipped.
pub async fn record_source(
    geo: &dyn GeoprocessingBackend,
    table: &str,
    id_field: &str,
) -> BackendResult<impl Stream<Item = WorkItem> + Send + 'static> {
    let cursor = geo.search_cursor(table, &[id_field.to_string()]).await?;
    let table = table.to_string();
    let id_field = id_field.to_string();

    Ok(cursor.filter_map(move |record| {
        let item = match record.get(&id_field) {
            Some(value) if !value.is_null() && !value.to_string().trim().is_empty() => Some(
                WorkItem::new(value.to_string())
                    .with_attribute("object_id", record.object_id)
                    .with_attribute("table", table.clone()),
            ),
            _ => {
                warn!(table = %table, object_id = record.object_id, "Record has no id; skipping");
                None
            }
        };
        futures::future::ready(item)
    }))
}
