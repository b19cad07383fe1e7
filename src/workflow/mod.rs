pub mod judgment_engine;

pub use judgment_engine::{JudgmentEngine, EXHAUSTED_REASONING};
