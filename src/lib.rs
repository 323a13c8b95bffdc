pub mod audit;
pub mod auth;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod messages;
pub mod network;

// Re-export key types for easy testing
pub use auth::{AuthPolicy, AuthService};
pub use config::{ClientConfig, ServerConfig};
pub use messages::{Record, Request, Response, Status};
pub use network::{ClientConnection, Server, ServerOptions};
