pub mod artifact;
pub mod config;
pub mod csv;
pub mod invoker;

pub use artifact::{tag_artifact, ArtifactError, TaggedArtifact};
pub use config::DetectorSettings;
pub use csv::{parse_prediction_row, CsvParseError, PredictionRow};
pub use invoker::{CsvContent, DetectorError, DetectorInvocation, DetectorInvoker};
