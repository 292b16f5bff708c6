mod common;

use common::strategies::*;
use geobatch::backend::DataType;
use geobatch::pipeline::{percent_shares, sanitize};
use geobatch::sources::{by_data_type, DirectoryWalker};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Shares of a positive total add up to 100 within rounding error
    #[test]
    fn percent_shares_sum_to_one_hundred(areas in class_areas_strategy()) {
        let shares = percent_shares(&areas);
        prop_assert_eq!(shares.len(), areas.len());
        let sum: f64 = shares.iter().sum();
        let tolerance = 0.005 * areas.len() as f64 + 1e-9;
        prop_assert!((sum - 100.0).abs() <= tolerance, "sum {} for {:?}", sum, areas);
        prop_assert!(shares.iter().all(|share| (0.0..=100.0).contains(share)));
    }

    /// A table whose areas are all zero never divides by zero
    #[test]
    fn zero_total_yields_zero_shares(rows in 0usize..20) {
        let shares = percent_shares(&vec![0.0; rows]);
        prop_assert_eq!(shares, vec![0.0; rows]);
    }

    /// Output stems only contain characters safe in dataset names
    #[test]
    fn sanitized_ids_are_safe_dataset_names(id in item_id_strategy()) {
        let stem = sanitize(&id);
        prop_assert_eq!(stem.chars().count(), id.chars().count());
        prop_assert!(stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    }

    /// The walker yields exactly the shapefiles on disk, in sorted order
    #[test]
    fn walker_yields_only_matching_files(names in file_names_strategy()) {
        let dir = tempfile::tempdir().unwrap();
        for name in &names {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let found: Vec<String> = DirectoryWalker::new(dir.path())
            .filter(by_data_type(DataType::FeatureClass))
            .map(|item| item.id)
            .collect();

        let mut expected: Vec<String> = names
            .iter()
            .filter(|name| name.to_ascii_lowercase().ends_with(".shp"))
            .cloned()
            .collect();
        expected.sort();
        prop_assert_eq!(found, expected);
    }
}
