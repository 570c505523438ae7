pub mod config;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod mock;

pub use config::ChatConfig;
pub use error::ChatError;
pub use gateway::{ChatGateway, GroupSpec, GroupSummary};
pub use graph::GraphChatGateway;
pub use mock::MockChatGateway;
