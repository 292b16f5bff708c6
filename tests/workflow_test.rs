mod common;

use common::{backends, path_key};
use geobatch::backend::{Dataset, MemoryBackend, ShapeType};
use geobatch::config::{
    BatchSlopeConfig, FeatureImportConfig, GeobatchConfig, PhotoTransferConfig,
    SurveyAppendConfig, SurveyMetadata, VegSummaryConfig, WorkspaceConfig, ZoneSortConfig,
    ZoneTarget,
};
use geobatch::constants::{fields, steps};
use geobatch::error::GeobatchError;
use geobatch::models::{FieldValue, Record, StepStatus};
use geobatch::workflows::photo_transfer::TransferMode;
use geobatch::workflows::{batch_slope, feature_import, photo_transfer, survey_append, veg_summary, zone_sort};
use geobatch::ConfigurationError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn survey() -> SurveyMetadata {
    SurveyMetadata {
        gps_id: "GPS7".to_string(),
        survey_date: "3/2/2015".to_string(),
        collection_dir: "Survey_0302".to_string(),
        team_members: "RR".to_string(),
    }
}

fn veg_section(spreadsheet_dir: &Path) -> VegSummaryConfig {
    VegSummaryConfig {
        points: "survey_points".to_string(),
        id_field: "ident".to_string(),
        vegetation: "veg_map".to_string(),
        case_field: "alliance".to_string(),
        buffer_distance: "125 METERS".to_string(),
        area_field: fields::SHAPE_AREA.to_string(),
        percent_field: fields::PERCENT.to_string(),
        spreadsheet_dir: spreadsheet_dir.to_path_buf(),
        keep_intermediates: false,
        overwrite_output: None,
    }
}

fn vegetation_backend(areas: &[(&str, f64)]) -> Arc<MemoryBackend> {
    let vegetation = areas
        .iter()
        .enumerate()
        .map(|(i, (alliance, area))| Record::new(i as i64 + 1).with_value("alliance", *alliance).with_area(*area))
        .collect();
    Arc::new(
        MemoryBackend::new()
            .with_dataset(
                "survey_points",
                Dataset::feature_class("survey_points", ShapeType::Point).with_records(vec![
                    Record::new(1).with_value("ident", "SBI_01"),
                    Record::new(2).with_value("ident", "SBI_02"),
                ]),
            )
            .with_dataset(
                "veg_map",
                Dataset::feature_class("veg_map", ShapeType::Polygon).with_records(vegetation),
            ),
    )
}

fn percent_column(rows: &[Record]) -> Vec<f64> {
    rows.iter().filter_map(|row| row.number(fields::PERCENT)).collect()
}

#[tokio::test]
async fn veg_summary_exports_class_shares_per_point() {
    let out = tempfile::tempdir().unwrap();
    let geo = vegetation_backend(&[("Coastal scrub", 300.0), ("Grassland", 100.0), ("Coastal scrub", 100.0)]);
    let config = GeobatchConfig {
        workspace: WorkspaceConfig {
            root: PathBuf::from("veg.gdb"),
            ..Default::default()
        },
        veg_summary: Some(veg_section(out.path())),
        ..Default::default()
    };

    let report = veg_summary::run(&config, &backends(geo.clone())).await.unwrap();

    assert_eq!(report.processed, 2);
    assert!(report.is_clean(), "{:?}", report.errors().collect::<Vec<_>>());
    for id in ["SBI_01", "SBI_02"] {
        let item = report.item(id).unwrap();
        assert_eq!(item.results.len(), 7);
        assert_eq!(item.results[5].step_name, steps::COMPUTE_PERCENT_SHARES);
        assert_eq!(item.results[5].step_index, 6);

        let rows = geo.spreadsheet(&out.path().join(format!("{id}.xls"))).unwrap();
        assert_eq!(percent_column(&rows), vec![80.0, 20.0]);
        assert!(geo.dataset(&format!("veg.gdb/{id}_stats")).is_some());
        assert!(geo.dataset(&format!("veg.gdb/{id}_buff")).is_none());
        assert!(geo.dataset(&format!("veg.gdb/{id}_clip")).is_none());
    }
}

#[tokio::test]
async fn veg_summary_zero_total_gives_zero_shares() {
    let out = tempfile::tempdir().unwrap();
    let geo = vegetation_backend(&[("Coastal scrub", 0.0), ("Grassland", 0.0)]);
    let config = GeobatchConfig {
        veg_summary: Some(veg_section(out.path())),
        ..Default::default()
    };

    let report = veg_summary::run(&config, &backends(geo.clone())).await.unwrap();

    assert!(report.is_clean());
    let rows = geo.spreadsheet(&out.path().join("SBI_01.xls")).unwrap();
    assert_eq!(percent_column(&rows), vec![0.0, 0.0]);
}

#[tokio::test]
async fn veg_summary_null_class_area_fails_the_item() {
    let out = tempfile::tempdir().unwrap();
    let geo = vegetation_backend(&[]);
    geo.insert_dataset(
        "veg_map",
        Dataset::feature_class("veg_map", ShapeType::Polygon).with_records(vec![
            Record::new(1).with_value("alliance", "Coastal scrub").with_value("acres", 3.0),
            Record::new(2).with_value("alliance", "Grassland"),
        ]),
    );
    let mut section = veg_section(out.path());
    section.area_field = "acres".to_string();
    let config = GeobatchConfig {
        veg_summary: Some(section),
        ..Default::default()
    };

    let report = veg_summary::run(&config, &backends(geo.clone())).await.unwrap();

    assert_eq!(report.failed, 2);
    let error = report.item("SBI_01").unwrap().error.as_ref().unwrap();
    assert_eq!(error.operation, steps::COMPUTE_PERCENT_SHARES);
    assert_eq!(error.step_index, 6);
    assert!(error.message.contains("SUM_acres is null"), "{}", error.message);
    assert!(geo.spreadsheet(&out.path().join("SBI_01.xls")).is_none());
}

#[tokio::test]
async fn veg_summary_blank_case_field_is_fatal() {
    let out = tempfile::tempdir().unwrap();
    let geo = vegetation_backend(&[("Grassland", 10.0)]);
    let mut section = veg_section(out.path());
    section.case_field = " ".to_string();
    let config = GeobatchConfig {
        veg_summary: Some(section),
        ..Default::default()
    };

    let err = veg_summary::run(&config, &backends(geo.clone())).await.unwrap_err();

    assert!(matches!(
        err,
        GeobatchError::Configuration(ConfigurationError::MissingRequiredField { .. })
    ));
    assert!(geo.calls().is_empty());
}

#[tokio::test]
async fn missing_section_is_reported_by_name() {
    let geo = vegetation_backend(&[]);
    let err = veg_summary::run(&GeobatchConfig::default(), &backends(geo))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("veg_summary"), "{err}");
}

fn survey_backend() -> Arc<MemoryBackend> {
    Arc::new(
        MemoryBackend::new()
            .with_dataset(
                "gps_pts",
                Dataset::feature_class("gps_pts", ShapeType::Point)
                    .with_records(vec![Record::new(1), Record::new(2)]),
            )
            .with_dataset(
                "gps_track",
                Dataset::feature_class("gps_track", ShapeType::Polyline).with_records(vec![Record::new(1)]),
            )
            .with_dataset("db_points", Dataset::feature_class("db_points", ShapeType::Point))
            .with_dataset("db_tracks", Dataset::feature_class("db_tracks", ShapeType::Polyline))
            .with_dataset(
                "watersheds",
                Dataset::feature_class("watersheds", ShapeType::Polygon)
                    .with_records(vec![Record::new(1).with_value("WS_NAME", "Upper Creek")]),
            ),
    )
}

fn survey_section() -> SurveyAppendConfig {
    SurveyAppendConfig {
        points: Some("gps_pts".to_string()),
        track: Some("gps_track".to_string()),
        points_database: "db_points".to_string(),
        tracks_database: "db_tracks".to_string(),
        watersheds: Some("watersheds".to_string()),
        scratch_join: "scratchJoin".to_string(),
        overwrite_output: None,
    }
}

#[tokio::test]
async fn survey_append_tags_joins_and_appends() {
    let geo = survey_backend();
    let config = GeobatchConfig {
        survey: Some(survey()),
        survey_append: Some(survey_section()),
        ..Default::default()
    };

    let report = survey_append::run(&config, &backends(geo.clone())).await.unwrap();

    assert!(report.is_clean(), "{:?}", report.errors().collect::<Vec<_>>());
    let points = geo.dataset("db_points").unwrap();
    assert_eq!(points.records.len(), 2);
    for record in &points.records {
        assert_eq!(record.get(fields::GPS_ID), Some(&FieldValue::from("GPS7")));
        assert_eq!(record.get(fields::SURVEY_TEAM), Some(&FieldValue::from("RR")));
        assert_eq!(record.get("WS_NAME"), Some(&FieldValue::from("Upper Creek")));
        assert!(matches!(record.get(fields::SURVEY_DATE), Some(FieldValue::Date(_))));
    }

    let tracks = geo.dataset("db_tracks").unwrap();
    assert_eq!(tracks.records.len(), 1);
    assert!(tracks.records[0].get("WS_NAME").is_none());
    let track_join = report.item("gps_track").unwrap().result_of(steps::JOIN_WATERSHED).unwrap();
    assert_eq!(track_join.status, StepStatus::Skipped);
    assert!(geo.dataset("./scratchJoin").is_none());
}

#[tokio::test]
async fn survey_append_without_inputs_is_an_empty_run() {
    let geo = survey_backend();
    let mut section = survey_section();
    section.points = None;
    section.track = Some("  ".to_string());
    let config = GeobatchConfig {
        survey: Some(survey()),
        survey_append: Some(section),
        ..Default::default()
    };

    let report = survey_append::run(&config, &backends(geo.clone())).await.unwrap();
    assert_eq!(report.processed, 0);
    assert!(geo.dataset("db_points").unwrap().records.is_empty());
}

fn photo_config(folder: &Path, master: &Path, mode: TransferMode) -> GeobatchConfig {
    GeobatchConfig {
        survey: Some(survey()),
        photo_transfer: Some(PhotoTransferConfig {
            photo_folder: Some(folder.to_path_buf()),
            master_folder: master.to_path_buf(),
            name_template: "{date}_{team}_{gps_id}_{stem}".to_string(),
            mode,
            overwrite_output: None,
        }),
        ..Default::default()
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn photo_folder() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
    std::fs::write(dir.path().join("b.jpg"), b"bb").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not a photo").unwrap();
    dir
}

#[tokio::test]
async fn photo_transfer_renames_then_copies() {
    let photos = photo_folder();
    let master = tempfile::tempdir().unwrap();
    let master_dir = master.path().join("master");
    let config = photo_config(photos.path(), &master_dir, TransferMode::Rename);

    let report = photo_transfer::run(&config, &backends(Arc::new(MemoryBackend::new())))
        .await
        .unwrap();

    assert_eq!(report.processed, 2);
    assert!(report.is_clean());
    let expected = vec!["2015-03-02_RR_GPS7_a.jpg", "2015-03-02_RR_GPS7_b.jpg"];
    assert_eq!(file_names(&master_dir), expected);
    assert_eq!(
        file_names(photos.path()),
        vec!["2015-03-02_RR_GPS7_a.jpg", "2015-03-02_RR_GPS7_b.jpg", "notes.txt"]
    );
    let copied = report.item("b.jpg").unwrap().output_of(steps::COPY_PHOTO).unwrap();
    assert_eq!(copied.data["bytes"], 2);
}

#[tokio::test]
async fn photo_transfer_copy_mode_leaves_originals() {
    let photos = photo_folder();
    let master = tempfile::tempdir().unwrap();
    let config = photo_config(photos.path(), master.path(), TransferMode::Copy);

    let report = photo_transfer::run(&config, &backends(Arc::new(MemoryBackend::new())))
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(file_names(photos.path()), vec!["a.jpg", "b.jpg", "notes.txt"]);
    assert_eq!(
        file_names(master.path()),
        vec!["2015-03-02_RR_GPS7_a.jpg", "2015-03-02_RR_GPS7_b.jpg"]
    );
    let rename = report.item("a.jpg").unwrap().result_of(steps::RENAME_PHOTO).unwrap();
    assert_eq!(rename.status, StepStatus::Skipped);
}

#[tokio::test]
async fn photo_transfer_without_folder_does_nothing() {
    let master = tempfile::tempdir().unwrap();
    let mut config = photo_config(Path::new(""), master.path(), TransferMode::Rename);
    if let Some(section) = config.photo_transfer.as_mut() {
        section.photo_folder = None;
    }

    let report = photo_transfer::run(&config, &backends(Arc::new(MemoryBackend::new())))
        .await
        .unwrap();
    assert!(report.items.is_empty());
    assert!(file_names(master.path()).is_empty());
}

#[tokio::test]
async fn photo_transfer_missing_folder_is_fatal() {
    let master = tempfile::tempdir().unwrap();
    let config = photo_config(&master.path().join("nope"), master.path(), TransferMode::Rename);

    let err = photo_transfer::run(&config, &backends(Arc::new(MemoryBackend::new())))
        .await
        .unwrap_err();
    assert!(matches!(err, GeobatchError::MissingInput(_)));
}

#[tokio::test]
async fn feature_import_merges_and_computes_areas() {
    let geo = Arc::new(
        MemoryBackend::new()
            .with_dataset(
                "/data/plots.shp",
                Dataset::feature_class("plots", ShapeType::Point).with_records(vec![Record::new(1)
                    .with_value(fields::BUFFER_DISTANCE, 10.0)
                    .with_value(fields::PERCENT_COVER, 0.5)]),
            )
            .with_dataset(
                "/data/stands.shp",
                Dataset::feature_class("stands", ShapeType::Polygon).with_records(vec![Record::new(1)
                    .with_area(4_046.856_422_4)
                    .with_value(fields::PERCENT_COVER, 0.2)]),
            ),
    );
    let config = GeobatchConfig {
        feature_import: Some(FeatureImportConfig {
            inputs: "'/data/plots.shp';'/data/stands.shp'".to_string(),
            output: "infested".to_string(),
            buffer_distance_field: fields::BUFFER_DISTANCE.to_string(),
            cover_field: fields::PERCENT_COVER.to_string(),
            overwrite_output: None,
        }),
        ..Default::default()
    };

    let report = feature_import::run(&config, &backends(geo.clone())).await.unwrap();

    assert!(report.is_clean(), "{:?}", report.batch_error);
    assert_eq!(report.batch_results.len(), 5);
    let merged = geo.dataset("/data/infested.shp").unwrap();
    assert_eq!(merged.records.len(), 2);

    let stand = &merged.records[0];
    assert_eq!(stand.number(fields::GROSS_INFECTED_AREA), Some(1.0));
    assert!((stand.number(fields::NET_INFECTED_AREA).unwrap() - 0.2).abs() < 1e-9);

    let plot = &merged.records[1];
    let acres = std::f64::consts::PI * 100.0 / 4_046.856_422_4;
    assert!((plot.number(fields::GROSS_INFECTED_AREA).unwrap() - acres).abs() < 1e-9);
    assert!((plot.number(fields::NET_INFECTED_AREA).unwrap() - acres * 0.5).abs() < 1e-9);

    let ids: Vec<&str> = merged
        .records
        .iter()
        .filter_map(|r| r.get(fields::GLOBAL_ID).and_then(FieldValue::as_text))
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert!(ids.iter().all(|id| id.starts_with('{') && id.ends_with('}')));

    assert!(geo.dataset_names().iter().all(|name| !name.contains("temp_")));
}

fn write_files(dir: &Path, names: &[&str]) {
    for name in names {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"").unwrap();
    }
}

fn slope_config(raster_dir: &Path) -> GeobatchConfig {
    GeobatchConfig {
        batch_slope: Some(BatchSlopeConfig {
            raster_dir: raster_dir.to_path_buf(),
            output_workspace: None,
            output_suffix: "_s".to_string(),
            extension: "3D".to_string(),
            output_measurement: Default::default(),
            z_factor: 1.0,
            overwrite_output: None,
        }),
        ..Default::default()
    }
}

fn raster_backend(dir: &Path) -> MemoryBackend {
    MemoryBackend::new()
        .with_dataset(path_key(&dir.join("dem1.tif")), Dataset::raster("dem1"))
        .with_dataset(path_key(&dir.join("dem2.tif")), Dataset::raster("dem2"))
}

#[tokio::test]
async fn batch_slope_derives_each_raster_and_returns_extension() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), &["dem1.tif", "dem2.tif", "readme.txt", "nested/dem3.tif"]);
    let geo = Arc::new(raster_backend(dir.path()).with_extension("3D"));
    let config = slope_config(dir.path());

    let first = batch_slope::run(&config, &backends(geo.clone())).await.unwrap();
    assert_eq!(first.processed, 2);
    assert!(first.is_clean());
    assert!(geo.dataset(&path_key(&dir.path().join("dem1_s"))).is_some());
    assert!(geo.dataset(&path_key(&dir.path().join("dem2_s"))).is_some());
    assert!(geo.checked_out_extensions().is_empty());

    let second = batch_slope::run(&config, &backends(geo.clone())).await.unwrap();
    assert_eq!(second.failed, 2);
    assert!(second.errors().all(|e| e.operation == steps::DERIVE_SLOPE));
    assert_eq!(geo.call_count("check_in_extension"), 2);
}

#[tokio::test]
async fn batch_slope_rerun_without_overwrite_keeps_existing_outputs() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), &["dem1.tif", "dem2.tif"]);
    let geo = Arc::new(raster_backend(dir.path()).with_extension("3D"));
    let mut config = slope_config(dir.path());
    if let Some(section) = config.batch_slope.as_mut() {
        section.overwrite_output = Some(false);
    }

    let first = batch_slope::run(&config, &backends(geo.clone())).await.unwrap();
    assert!(first.is_clean());
    let second = batch_slope::run(&config, &backends(geo.clone())).await.unwrap();

    assert_eq!(second.processed, 2);
    assert_eq!(second.failed, 2);
    for id in ["dem1", "dem2"] {
        let error = second
            .items
            .iter()
            .find(|item| item.item.name == id)
            .and_then(|item| item.error.as_ref())
            .unwrap();
        assert_eq!(error.operation, steps::DERIVE_SLOPE);
        assert_eq!(error.step_index, 2);
        assert!(error.message.contains("already exists"), "{}", error.message);
    }
    assert_eq!(geo.call_count("slope"), 2);

    if let Some(section) = config.batch_slope.as_mut() {
        section.overwrite_output = Some(true);
    }
    let third = batch_slope::run(&config, &backends(geo.clone())).await.unwrap();
    assert!(third.is_clean(), "{:?}", third.errors().collect::<Vec<_>>());
    assert_eq!(geo.call_count("slope"), 4);
}

#[tokio::test]
async fn batch_slope_without_extension_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), &["dem1.tif"]);
    let geo = Arc::new(raster_backend(dir.path()));

    let err = batch_slope::run(&slope_config(dir.path()), &backends(geo.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, GeobatchError::Backend { ref operation, .. } if operation == "check_out_extension"));
    assert_eq!(geo.call_count("slope"), 0);
}

#[tokio::test]
async fn zone_sort_routes_by_spatial_reference() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("incoming");
    write_files(&root, &["a/roads.shp", "b/trails.shp", "c/other.shp", "readme.txt"]);
    let zone10 = tmp.path().join("zones/z10");
    let zone11 = tmp.path().join("zones/z11");

    let geo = Arc::new(
        MemoryBackend::new()
            .with_dataset(
                path_key(&root.join("a/roads.shp")),
                Dataset::feature_class("roads", ShapeType::Polyline).with_spatial_reference("NAD_1927_UTM_Zone_10N"),
            )
            .with_dataset(
                path_key(&root.join("b/trails.shp")),
                Dataset::feature_class("trails", ShapeType::Polyline).with_spatial_reference("NAD_1927_UTM_Zone_11N"),
            )
            .with_dataset(
                path_key(&root.join("c/other.shp")),
                Dataset::feature_class("other", ShapeType::Point).with_spatial_reference("WGS_1984"),
            ),
    );
    let config = GeobatchConfig {
        zone_sort: Some(ZoneSortConfig {
            root: root.clone(),
            zones: vec![
                ZoneTarget {
                    spatial_reference: "NAD_1927_UTM_Zone_10N".to_string(),
                    directory: zone10.clone(),
                },
                ZoneTarget {
                    spatial_reference: "NAD_1927_UTM_Zone_11N".to_string(),
                    directory: zone11.clone(),
                },
            ],
            overwrite_output: None,
        }),
        ..Default::default()
    };

    let report = zone_sort::run(&config, &backends(geo.clone())).await.unwrap();

    assert_eq!(report.processed, 3);
    assert!(report.is_clean());
    assert!(geo.dataset(&path_key(&zone10.join("roads.shp"))).is_some());
    assert!(geo.dataset(&path_key(&zone11.join("trails.shp"))).is_some());
    assert!(zone10.is_dir());

    let other = report.item(&path_key(Path::new("c/other.shp"))).unwrap();
    assert_eq!(other.result_of(steps::ROUTE_TO_ZONE).unwrap().status, StepStatus::Skipped);
}
