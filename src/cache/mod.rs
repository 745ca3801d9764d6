//! Prompt-keyed image cache

pub mod key;
pub mod store;

pub use key::{CacheKey, PromptKey};
pub use store::CacheStore;
