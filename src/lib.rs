pub mod config;
pub mod error;
pub mod linking;
pub mod predict;
pub mod structure;
pub mod subnet;
pub mod table;
pub mod trajectory;

#[cfg(feature = "python")]
pub mod python_bindings;

// Re-export commonly used types and traits
pub use config::LinkConfig;
pub use error::{LinkError, Result};
pub use linking::{link, link_with, FrameLinker};
pub use predict::{DriftPredict, NearestVelocityPredict, NullPredict, Predictor, PredictorKind};
pub use structure::Position;
pub use table::ParticleTable;
pub use trajectory::{link_table, CsvTrajectory, LinkSummary, TrackSummary, Trajectory};
