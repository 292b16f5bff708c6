use geobatch::config::ConfigManager;
use geobatch::pipeline::ErrorPolicy;
use geobatch::workflows::photo_transfer::TransferMode;
use geobatch::workflows::{batch_slope, Backends};
use geobatch::{ConfigurationError, GeobatchError, LocalFileSystem, MemoryBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn bundled_config() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("config").join("geobatch.toml")
}

#[test]
fn bundled_example_configuration_is_valid() {
    let manager = ConfigManager::load_file(&bundled_config()).unwrap();
    let config = manager.config();

    assert_eq!(config.runner.error_policy, ErrorPolicy::ContinueWithNextItem);
    assert_eq!(config.survey().unwrap().gps_id, "GPS7");
    assert_eq!(config.photo_transfer.as_ref().unwrap().mode, TransferMode::Rename);
    assert_eq!(config.zone_sort.as_ref().unwrap().zones.len(), 2);
    assert_eq!(config.veg_summary.as_ref().unwrap().percent_field, "Percent");
    assert_eq!(config.batch_slope.as_ref().unwrap().output_workspace, None);
}

#[test]
fn environment_overlay_overrides_base_values() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("geobatch.toml"),
        "[runner]\nerror_policy = \"continue_with_next_item\"\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("geobatch.field.toml"),
        "[runner]\nerror_policy = \"abort_batch\"\n",
    )
    .unwrap();

    let manager = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "field").unwrap();
    assert_eq!(manager.environment(), "field");
    assert_eq!(manager.config().runner.error_policy, ErrorPolicy::AbortBatch);

    let base = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "office").unwrap();
    assert_eq!(base.config().runner.error_policy, ErrorPolicy::ContinueWithNextItem);
}

#[test]
fn unknown_photo_placeholder_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photos.toml");
    std::fs::write(
        &path,
        "[photo_transfer]\nmaster_folder = \"/photos\"\nname_template = \"{date}_{camera}\"\n",
    )
    .unwrap();

    let err = ConfigManager::load_file(&path).unwrap_err();
    assert!(
        matches!(err, ConfigurationError::UnknownPlaceholder { ref placeholder, .. } if placeholder == "camera"),
        "{err}"
    );
}

#[tokio::test]
async fn missing_raster_folder_fails_before_any_backend_call() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slope.toml");
    let raster_dir = dir.path().join("no_such_folder");
    std::fs::write(
        &path,
        format!("[batch_slope]\nraster_dir = {:?}\n", raster_dir.to_string_lossy()),
    )
    .unwrap();

    let manager = ConfigManager::load_file(&path).unwrap();
    let geo = Arc::new(MemoryBackend::new().with_extension("3D"));
    let backends = Backends::new(geo.clone(), Arc::new(LocalFileSystem::new()));

    let err = batch_slope::run(manager.config(), &backends).await.unwrap_err();
    assert!(matches!(err, GeobatchError::MissingInput(_)));
    assert!(geo.calls().is_empty());
}
