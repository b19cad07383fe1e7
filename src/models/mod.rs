pub mod checkpoint;
pub mod filters;
pub mod judgment;
pub mod loaders;
pub mod paper;

pub use checkpoint::{Checkpoint, CheckpointSummary};
pub use filters::PaperFilter;
pub use judgment::{Judgment, PaperResult, RatingCounts, RelevanceRating};
pub use loaders::{CollectionSummary, PaperLoader};
pub use paper::Paper;
