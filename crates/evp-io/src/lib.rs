//! # EVP IO
//!
//! 站點資料載入與規劃結果輸出

pub mod geojson;
pub mod loader;
pub mod schema;
pub mod writer;

// Re-export 主要類型
pub use geojson::{sites_to_geojson, write_geojson};
pub use loader::{load_directory, load_file, load_reader, load_sites, LoadReport};
pub use schema::{ColumnMap, Field};
pub use writer::{
    write_csv, write_demand_csv, write_outputs, write_summary_json, OutputOptions, DISTRICTS_FILE, GEOJSON_FILE,
    SITES_FILE, SITE_PERIODS_FILE, SUMMARY_FILE, TIMELINE_FILE,
};
