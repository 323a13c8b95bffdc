pub mod client;
mod handler;
pub mod server;

pub use client::{ClientConnection, ClientError};
pub use server::{Server, ServerError, ServerOptions};
