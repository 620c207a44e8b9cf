use octoauth_core::{GrantType, OAuthServerConfig, Scope};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, net::SocketAddr};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Authorization and resource server settings
    #[serde(default)]
    pub oauth: OAuthServerConfig,
    /// Maintenance endpoint settings
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Clients, scopes and users loaded into the in-memory store at startup
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // OAuth validation
        self.oauth.validate().map_err(|e| format!("oauth: {e}"))?;
        if self.maintenance.scope.trim().is_empty() {
            return Err("maintenance.scope cannot be empty".into());
        }
        self.bootstrap.validate()
    }

    pub fn addr(&self) -> SocketAddr {
        let ip: std::net::IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0]));
        SocketAddr::from((ip, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8090
}
fn default_request_timeout_ms() -> u64 {
    15_000
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Scope a bearer token needs to call `POST /oauth/maintenance/sweep`.
    #[serde(default = "default_maintenance_scope")]
    pub scope: String,
}
fn default_maintenance_scope() -> String {
    "oauth:maintenance".into()
}
impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            scope: default_maintenance_scope(),
        }
    }
}

// =============================================================================
// Bootstrap
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub clients: Vec<BootstrapClient>,
    #[serde(default)]
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub users: Vec<BootstrapUser>,
}

impl BootstrapConfig {
    pub fn validate(&self) -> Result<(), String> {
        let mut client_ids = BTreeSet::new();
        for client in &self.clients {
            if !client_ids.insert(client.client_id.as_str()) {
                return Err(format!(
                    "bootstrap.clients: duplicate client_id '{}'",
                    client.client_id
                ));
            }
            if client.secret.is_some() && client.secret_hash.is_some() {
                return Err(format!(
                    "bootstrap.clients: '{}' sets both secret and secret_hash",
                    client.client_id
                ));
            }
        }

        let mut scope_ids = BTreeSet::new();
        for scope in &self.scopes {
            if !scope_ids.insert(scope.id.as_str()) {
                return Err(format!("bootstrap.scopes: duplicate scope '{}'", scope.id));
            }
        }

        let mut usernames = BTreeSet::new();
        for user in &self.users {
            if !usernames.insert(user.username.as_str()) {
                return Err(format!(
                    "bootstrap.users: duplicate username '{}'",
                    user.username
                ));
            }
            if user.password.is_some() == user.password_hash.is_some() {
                return Err(format!(
                    "bootstrap.users: '{}' needs exactly one of password or password_hash",
                    user.username
                ));
            }
        }
        Ok(())
    }
}

/// A client registration seeded at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapClient {
    pub client_id: String,
    /// Display name; defaults to the client id.
    #[serde(default)]
    pub name: Option<String>,
    /// Plaintext secret, hashed with Argon2 before it is stored.
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
    /// Pre-computed Argon2 PHC hash (see `octoauth-server gen-secret`).
    #[serde(default, skip_serializing)]
    pub secret_hash: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub grant_types: Vec<GrantType>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// A resource owner accepted by the password grant and the consent form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapUser {
    pub username: String,
    /// Identifier recorded on sessions; defaults to the username.
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, skip_serializing)]
    pub password_hash: Option<String>,
}

impl BootstrapUser {
    pub fn owner_id(&self) -> &str {
        self.owner_id.as_deref().unwrap_or(&self.username)
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, looked up in the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "octoauth.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }
        // Environment variable overrides, e.g., OCTOAUTH__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("OCTOAUTH")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.addr().port(), 8090);
        assert_eq!(cfg.maintenance.scope, "oauth:maintenance");
    }

    #[test]
    fn test_invalid_log_level() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().unwrap_err().contains("logging.level"));
    }

    #[test]
    fn test_oauth_errors_are_prefixed() {
        let mut cfg = AppConfig::default();
        cfg.oauth.scope_delimiter = String::new();
        assert!(cfg.validate().unwrap_err().starts_with("oauth:"));
    }

    #[test]
    fn test_bootstrap_user_needs_one_password_form() {
        let mut cfg = AppConfig::default();
        cfg.bootstrap.users.push(BootstrapUser {
            username: "alice".into(),
            owner_id: None,
            password: None,
            password_hash: None,
        });
        assert!(cfg.validate().unwrap_err().contains("alice"));

        cfg.bootstrap.users[0].password = Some("pw".into());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.bootstrap.users[0].owner_id(), "alice");
    }

    #[test]
    fn test_duplicate_bootstrap_client() {
        let client = BootstrapClient {
            client_id: "svc".into(),
            name: None,
            secret: Some("pw".into()),
            secret_hash: None,
            redirect_uri: None,
            grant_types: vec![GrantType::ClientCredentials],
            scopes: vec![],
        };
        let mut cfg = AppConfig::default();
        cfg.bootstrap.clients = vec![client.clone(), client];
        assert!(cfg.validate().unwrap_err().contains("duplicate client_id"));
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut cfg = AppConfig::default();
        cfg.bootstrap.clients.push(BootstrapClient {
            client_id: "svc".into(),
            name: None,
            secret: Some("hunter2".into()),
            secret_hash: None,
            redirect_uri: None,
            grant_types: vec![],
            scopes: vec![],
        });
        let rendered = toml::to_string(&cfg).unwrap();
        assert!(!rendered.contains("hunter2"));
    }
}
