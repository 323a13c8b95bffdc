use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "wardline")]
#[command(about = "Line-framed JSON records service with session auth")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the records server
    ///
    /// Example: wardline serve --bind 0.0.0.0:9090
    Serve {
        /// Address to listen on, overriding the configuration file
        #[arg(short, long)]
        bind: Option<String>,

        /// Path to a configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check that a server is reachable and answering
    ///
    /// Example: wardline ping 127.0.0.1:9090
    Ping {
        /// Server address as host:port, overriding the configuration file
        addr: Option<String>,

        /// Path to a configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Log in to a server and print the session token
    ///
    /// Example: wardline login admin 1234 --addr 127.0.0.1:9090
    Login {
        /// Username to authenticate as
        user: String,

        /// Password for the account
        password: String,

        /// Server address as host:port, overriding the configuration file
        #[arg(short, long)]
        addr: Option<String>,

        /// Path to a configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
