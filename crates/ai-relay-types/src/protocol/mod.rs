//! Provider wire protocol types.

pub mod openai;

pub use openai::{ChatCompletionRequest, ChatCompletionResponse};
