//! CSV loading, schema re-encoding, and JSON artifacts for the coppice pipeline.

mod domain;
mod error;
mod reader;
mod summary;
mod writer;

pub use domain::RunName;
pub use error::IoError;
pub use reader::{ColumnType, PredictionInput, TableReader};
pub use summary::{Evaluation, TrainingSummary};
pub use writer::ArtifactWriter;
