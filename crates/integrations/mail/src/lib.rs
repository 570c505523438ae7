pub mod config;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod html;
pub mod mock;

pub use config::MailConfig;
pub use error::MailError;
pub use gateway::{MailGateway, MailProbe};
pub use graph::GraphMailGateway;
pub use mock::MockMailGateway;
