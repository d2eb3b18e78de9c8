//! Integration pipeline: hands approved proposals to downstream content
//! distribution.
//!
//! A run walks four stages in order (`compile -> submit -> inject ->
//! verify`). Every stage outcome is recorded in an [`IntegrationRun`], so a
//! failed run can be resumed without repeating the stages that already
//! succeeded. The pipeline reads proposals but never writes them.

pub mod compile;
pub mod error;
pub mod gateway;
pub mod recorder;
pub mod runner;
pub mod stage;

pub use error::PipelineError;
pub use gateway::{ContentGateway, GatewayError, HttpContentGateway};
pub use recorder::{MemoryRunRecorder, PgRunRecorder, RecorderError, RunRecorder};
pub use runner::{IntegrationPipeline, RetryPolicy};
pub use stage::{IntegrationRun, RunStatus, Stage, StageRecord, StageStatus};
