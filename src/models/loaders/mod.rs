pub mod json_loader;

pub use json_loader::{CollectionSummary, FileDetail, PaperLoader};
