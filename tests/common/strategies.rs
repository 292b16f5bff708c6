//! Proptest strategies shared by the property tests.

use proptest::prelude::*;

/// Per-class areas in square meters, at least one positive
pub fn class_areas_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..1_000_000.0, 1..20)
        .prop_filter("total must be positive", |areas| areas.iter().sum::<f64>() > 0.0)
}

/// Item ids as they come out of attribute tables
pub fn item_id_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 _./:-]{1,24}"
}

/// Distinct file names with mixed-case geodata and non-geodata extensions
pub fn file_names_strategy() -> impl Strategy<Value = Vec<String>> {
    let extension = prop::sample::select(vec!["shp", "SHP", "tif", "jpg", "txt", "dbf"]);
    prop::collection::btree_set(("[a-z][a-z0-9_]{0,11}", extension), 0..12).prop_map(|files| {
        let mut seen = std::collections::BTreeSet::new();
        files
            .into_iter()
            .filter(|(stem, _)| seen.insert(stem.clone()))
            .map(|(stem, ext)| format!("{stem}.{ext}"))
            .collect()
    })
}
