pub mod checkpoint_store;
pub mod exporter;
pub mod prompt_builder;
pub mod response_parser;

pub use checkpoint_store::CheckpointStore;
pub use exporter::CsvExporter;
pub use prompt_builder::PromptBuilder;
pub use response_parser::ResponseParser;
