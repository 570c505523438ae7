pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod mock;
pub mod parse;

pub use client::{LlmClient, LlmReply};
pub use config::LlmConfig;
pub use error::LlmError;
pub use http::HttpLlmClient;
pub use mock::{FailingLlmClient, MockLlmClient};
pub use parse::json_envelope;
