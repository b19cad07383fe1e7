pub mod llm_client;

pub use llm_client::{InferenceClient, OpenAiCompatibleClient, EMPTY_RESPONSE_MARKER};
