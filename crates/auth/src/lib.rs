pub mod broker;
pub mod config;
pub mod error;
pub mod source;
pub mod validate;

pub use broker::{AccessToken, TokenBroker};
pub use config::AuthConfig;
pub use error::AuthError;
pub use source::{StaticTokenSource, TokenSource};
pub use validate::{TokenValidation, validate_claims};
