//! Pipeline orchestration: job pool, stage functions and the driver.

mod driver;
mod job_pool;
pub mod stages;
mod stats;
mod tools;

pub use driver::{validate_inputs, Pipeline, PipelineOutcome, PipelineReport};
pub use job_pool::{JobPool, PoolStats};
pub use stages::{CubeList, MosaicManifest, OffsetManifest, StageContext};
pub use stats::RunStats;
pub use tools::{Placement, ToolCommand, Toolchain};
