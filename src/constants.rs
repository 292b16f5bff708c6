//! # System Constants
//!
//! Step names, field names and unit conversions shared by the runner and the
//! workflow definitions.

/// Base name of the configuration file (`geobatch.toml`)
pub const CONFIG_FILE_STEM: &str = "geobatch";

pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Photo naming template used when none is configured
pub const DEFAULT_PHOTO_TEMPLATE: &str = "{date}_{team}_{gps_id}_{stem}";

/// Square meters in one international acre
pub const SQUARE_METERS_PER_ACRE: f64 = 4_046.856_422_4;

/// Decimal places kept by the derived percentage pass
pub const PERCENT_DECIMALS: i32 = 2;

/// Environment variable names
pub mod env_vars {
    pub const ENVIRONMENT: &str = "GEOBATCH_ENV";
    pub const CONFIG_DIR: &str = "GEOBATCH_CONFIG_DIR";
    /// Prefix for `GEOBATCH__SECTION__KEY` overrides
    pub const CONFIG_PREFIX: &str = "GEOBATCH";
    pub const LOG_FILTER: &str = "GEOBATCH_LOG";
}

/// Attribute field names written or read by the workflows
pub mod fields {
    pub const SHAPE_AREA: &str = "Shape_Area";
    pub const PERCENT: &str = "Percent";
    pub const FREQUENCY: &str = "FREQUENCY";
    pub const GPS_ID: &str = "GPS_ID";
    pub const SURVEY_DATE: &str = "SurveyDate";
    pub const SURVEY_TEAM: &str = "SurveyTeam";
    pub const COLLECTION_DIR: &str = "CollectDir";
    pub const DATE_UPLOAD: &str = "DateUpload";
    pub const GLOBAL_ID: &str = "GlobalID";
    pub const GROSS_INFECTED_AREA: &str = "GIA";
    pub const NET_INFECTED_AREA: &str = "NIA";
    pub const PERCENT_COVER: &str = "PercCov";
    pub const BUFFER_DISTANCE: &str = "BuffDistM";
}

/// Names of the steps the bundled workflows register.
pub mod steps {
    pub const SELECT_POINT: &str = "select_point";
    pub const BUFFER_POINT: &str = "buffer_point";
    pub const CLIP_VEGETATION: &str = "clip_vegetation";
    pub const SUMMARIZE_VEGETATION: &str = "summarize_vegetation";
    pub const ADD_PERCENT_FIELD: &str = "add_percent_field";
    pub const COMPUTE_PERCENT_SHARES: &str = "compute_percent_shares";
    pub const EXPORT_SPREADSHEET: &str = "export_spreadsheet";

    pub const ADD_SURVEY_FIELDS: &str = "add_survey_fields";
    pub const POPULATE_SURVEY_FIELDS: &str = "populate_survey_fields";
    pub const JOIN_WATERSHED: &str = "join_watershed";
    pub const APPEND_TO_DATABASE: &str = "append_to_database";

    pub const RENAME_PHOTO: &str = "rename_photo";
    pub const COPY_PHOTO: &str = "copy_photo";

    pub const DESCRIBE_FEATURE: &str = "describe_feature";
    pub const BUFFER_LINEAR_FEATURE: &str = "buffer_linear_feature";
    pub const MERGE_FEATURES: &str = "merge_features";
    pub const REPAIR_GEOMETRY: &str = "repair_geometry";
    pub const ASSIGN_GLOBAL_IDS: &str = "assign_global_ids";
    pub const COMPUTE_GROSS_AREA: &str = "compute_gross_area";
    pub const COMPUTE_NET_AREA: &str = "compute_net_area";

    pub const DESCRIBE_RASTER: &str = "describe_raster";
    pub const DERIVE_SLOPE: &str = "derive_slope";

    pub const ROUTE_TO_ZONE: &str = "route_to_zone";
}

/// Keys of workflow-level constants handed to every step
pub mod constant_keys {
    pub const WORKSPACE: &str = "workspace";
    pub const SCRATCH_WORKSPACE: &str = "scratch_workspace";
    pub const ID_FIELD: &str = "id_field";
    pub const SOURCE_POINTS: &str = "source_points";
    pub const VEGETATION: &str = "vegetation";
    pub const BUFFER_DISTANCE: &str = "buffer_distance";
    pub const CASE_FIELD: &str = "case_field";
    pub const AREA_FIELD: &str = "area_field";
    pub const PERCENT_FIELD: &str = "percent_field";
    pub const SPREADSHEET_DIR: &str = "spreadsheet_dir";
    pub const POINTS_DATABASE: &str = "points_database";
    pub const TRACKS_DATABASE: &str = "tracks_database";
    pub const WATERSHEDS: &str = "watersheds";
    pub const SCRATCH_JOIN: &str = "scratch_join";
    pub const MASTER_FOLDER: &str = "master_folder";
    pub const BUFFER_DISTANCE_FIELD: &str = "buffer_distance_field";
    pub const COVER_FIELD: &str = "cover_field";
    pub const OUTPUT: &str = "output";
    pub const OUTPUT_WORKSPACE: &str = "output_workspace";
    pub const OUTPUT_SUFFIX: &str = "output_suffix";
}

/// Well-known work item attribute keys
pub mod attributes {
    pub const KIND: &str = "kind";
    pub const DATA_TYPE: &str = "data_type";
    pub const RELATIVE_PATH: &str = "relative_path";
}
