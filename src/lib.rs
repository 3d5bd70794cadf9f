pub mod auth;
pub mod cli;
pub mod client;
pub mod commands;
pub mod connection;
pub mod error;
pub mod multipart;
pub mod request;
pub mod response;

// Re-export commonly used types
pub use auth::{AuthResponse, RequestModifier};
pub use cli::{Cli, Command};
pub use client::{build_client, Transport};
pub use connection::{Connection, CredentialSource, Terminal};
pub use error::BridgeError;
pub use request::{Bridge, JsonMap};
pub use response::{ParsedResponse, StatusClass};
