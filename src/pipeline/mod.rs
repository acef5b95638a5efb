//! Streaming pipeline: message types and the token-to-speech coordinator.

pub mod messages;
pub mod stream;

pub use stream::{StreamedResponse, StreamingCoordinator};
