mod chain;

pub use chain::{ModelChain, DEFAULT_MODEL_CHAIN};
