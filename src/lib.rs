pub mod config;
pub mod error;
pub mod models;
pub mod overlay;
pub mod pipeline;
pub mod raster;
pub mod rectification;
pub mod registration;
pub mod resources;
pub mod shoreline;
pub mod store;

pub use config::{AlignerParams, ExtractionParams, GcpPick, GroundControlPoint, SiteCalibration};
pub use error::ShoreError;
pub use models::{Contour, ShiftSummary, ShorelineFix, ShorelineRecord, Transect};
pub use pipeline::{CancelToken, DebugConfig, PipelineContext, RunReport, SiteRun};
pub use raster::{RectifiedRaster, WorldGrid};
pub use rectification::{CameraPose, PoseRecord, PoseSolver, Rectifier};
pub use registration::{AlignOutcome, ControlAligner, SkipReason};
pub use shoreline::{ShorelineExtractor, ShorelineResult};
