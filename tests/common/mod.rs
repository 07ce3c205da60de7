#![allow(dead_code, unused_imports)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from shoremap for tests
pub use shoremap::config::{ExtractionParams, GcpPick, SiteCalibration};
pub use shoremap::models::{ShorelineFix, ShorelineRecord, Transect};
pub use shoremap::raster::{RectifiedRaster, WorldGrid};
pub use shoremap::rectification::{CameraPose, PoseRecord, PoseSolver, Rectifier};
