use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{AuthPolicy, CredentialStore, LockoutPolicy};
use crate::messages::WireConfig;

pub const CONFIG_FILE_NAME: &str = "wardline.toml";

/// Settings for the client side of the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host to dial
    pub host: String,
    /// Server port to dial
    pub port: u16,
    /// Connection establishment budget, in milliseconds
    pub connect_timeout_ms: u64,
    /// Per-response read budget, in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9090,
            connect_timeout_ms: 3_000,
            read_timeout_ms: 6_000,
        }
    }
}

impl ClientConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn wire_config(&self) -> WireConfig {
        WireConfig {
            read_timeout: self.read_timeout(),
            ..WireConfig::default()
        }
    }
}

/// Settings for the server side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Cap on simultaneously served connections
    pub max_connections: usize,
    /// Idle budget while waiting for a request, in milliseconds
    pub read_timeout_ms: u64,
    /// Session and lockout tuning
    pub auth: AuthSettings,
    /// Users seeded into the credential store at startup
    pub users: Vec<UserEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9090".to_string(),
            max_connections: default_max_connections(),
            read_timeout_ms: 7_000,
            auth: AuthSettings::default(),
            users: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn auth_policy(&self) -> AuthPolicy {
        AuthPolicy {
            token_ttl: Duration::from_secs(self.auth.token_ttl_secs),
            lockout: LockoutPolicy {
                max_failures: self.auth.max_failures,
                failure_window: Duration::from_secs(self.auth.failure_window_secs),
                lock_duration: Duration::from_secs(self.auth.lock_duration_secs),
            },
        }
    }

    /// Build the credential store the config describes.
    pub fn credential_store(&self) -> CredentialStore {
        let mut store = CredentialStore::new();
        for user in &self.users {
            store.insert(user.name.clone(), &user.password);
        }
        store
    }
}

/// Session and lockout tuning, as it appears under `[server.auth]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub token_ttl_secs: u64,
    pub max_failures: u32,
    pub failure_window_secs: u64,
    pub lock_duration_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_ttl_secs: 30 * 60,
            max_failures: 5,
            failure_window_secs: 10 * 60,
            lock_duration_secs: 15 * 60,
        }
    }
}

/// One seeded user under `[[server.users]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    pub password: String,
}

/// Top-level layout of `wardline.toml`: a `[client]` table and a
/// `[server]` table, both optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub client: ClientConfig,
    pub server: ServerConfig,
}

/// Connection cap: twice the host's available parallelism, floor of 8.
pub fn default_max_connections() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_mul(2))
        .unwrap_or(8)
        .max(8)
}

/// Get the default config file path under the user's config directory.
pub fn default_config_file() -> Result<PathBuf> {
    ProjectDirs::from("dev", "wardline", "wardline")
        .map(|proj_dirs| proj_dirs.config_dir().join(CONFIG_FILE_NAME))
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// Load `wardline.toml`.
///
/// An explicit `path` must exist and parse. Without one, the file is
/// looked up next to the process and then under the user config
/// directory, and built-in defaults apply when it is absent. A file that
/// exists but does not parse is always an error.
pub fn load(path: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = path {
        return read_file(path);
    }
    let local = Path::new(CONFIG_FILE_NAME);
    if local.exists() {
        return read_file(local);
    }
    if let Ok(fallback) = default_config_file() {
        if fallback.exists() {
            return read_file(&fallback);
        }
    }
    debug!("no {} found, using built-in defaults", CONFIG_FILE_NAME);
    Ok(ConfigFile::default())
}

/// Load only the `[client]` table.
pub fn load_client(path: Option<&Path>) -> Result<ClientConfig> {
    Ok(load(path)?.client)
}

/// Load only the `[server]` table.
pub fn load_server(path: Option<&Path>) -> Result<ServerConfig> {
    Ok(load(path)?.server)
}

fn read_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse configuration file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_the_documented_values() {
        let client = ClientConfig::default();
        assert_eq!(client.addr(), "127.0.0.1:9090");
        assert_eq!(client.connect_timeout(), Duration::from_secs(3));
        assert_eq!(client.read_timeout(), Duration::from_secs(6));

        let server = ServerConfig::default();
        assert_eq!(server.bind, "0.0.0.0:9090");
        assert_eq!(server.read_timeout(), Duration::from_secs(7));
        assert!(server.users.is_empty());

        let policy = server.auth_policy();
        assert_eq!(policy.token_ttl, Duration::from_secs(30 * 60));
        assert_eq!(policy.lockout.max_failures, 5);
        assert_eq!(policy.lockout.failure_window, Duration::from_secs(10 * 60));
        assert_eq!(policy.lockout.lock_duration, Duration::from_secs(15 * 60));
    }

    #[test]
    fn test_max_connections_floor() {
        assert!(default_max_connections() >= 8);
    }

    #[test]
    fn test_partial_file_keeps_defaults_for_the_rest() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nbind = \"127.0.0.1:7070\"\n\n[server.auth]\nmax_failures = 2"
        )
        .unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7070");
        assert_eq!(config.server.auth.max_failures, 2);
        // Untouched fields fall back to the defaults.
        assert_eq!(config.server.auth.token_ttl_secs, 30 * 60);
        assert_eq!(config.client.port, 9090);
    }

    #[test]
    fn test_users_are_seeded_into_the_store() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[server.users]]\nname = \"admin\"\npassword = \"1234\"\n\n\
             [[server.users]]\nname = \"medic\"\npassword = \"sd2025\""
        )
        .unwrap();

        let server = load_server(Some(file.path())).unwrap();
        let store = server.credential_store();
        assert_eq!(store.len(), 2);
        assert!(store.verify("admin", "1234"));
        assert!(store.verify("medic", "sd2025"));
    }

    #[test]
    fn test_config_serialization_round_trip() {
        let config = ConfigFile::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: ConfigFile = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.server.bind, config.server.bind);
        assert_eq!(deserialized.client.port, config.client.port);
    }

    #[test]
    fn test_unparsable_file_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml at all [[[").unwrap();
        assert!(load(Some(file.path())).is_err());
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let result = load(Some(Path::new("/definitely/not/here/wardline.toml")));
        assert!(result.is_err());
    }
}
