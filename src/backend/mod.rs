//! Backend module - Traits, backend clients, and registry

pub mod http;
pub mod midjourney;
pub mod registry;
pub mod replicate;
pub mod traits;
pub mod unsplash;

pub use registry::{BackendHandle, BackendRegistry};
pub use traits::{BackendKind, ImageBackend, ImageRef, PollStatus, SubmissionRef};
