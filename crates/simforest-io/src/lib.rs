//! File I/O, validation, and serialization for the simforest pipeline.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::{Dataset, ExperimentName, SampleId, TargetColumn};
pub use error::IoError;
pub use reader::DatasetReader;
pub use writer::ResultWriter;
