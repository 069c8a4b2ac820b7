//! Validated, immutable set of cameras to supervise.
//!
//! Configuration arrives as [`CameraConfig`] records (typically deserialized from a document the
//! host application loads) and is validated into [`CameraDescriptor`]s. Every error a registry
//! can raise is raised here, before any supervisor starts.

use crate::error::ConfigError;
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Path of the ISAPI alert stream, relative to the camera's base URL.
pub const ALERT_STREAM_PATH: &str = "ISAPI/Event/notification/alertStream";

/// How requests to a camera are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    None,
    Basic,
    Digest,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Basic => "basic",
            AuthMethod::Digest => "digest",
        }
    }
}

/// Which decoder reads the camera's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    /// Conformant `multipart/mixed` HTTP response.
    MultipartHttp,
    /// Byte-level scanning of a raw TCP socket, for devices whose framing breaks HTTP parsers.
    RawSocket,
}

/// One camera entry as written in configuration.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CameraConfig {
    pub name: String,
    /// Host, optionally with `:port`.
    pub address: String,
    #[serde(default, alias = "https")]
    pub use_https: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Defaults to `digest` when a username is present, `none` otherwise.
    #[serde(default)]
    pub auth_method: Option<AuthMethod>,
    #[serde(default)]
    pub raw_tcp: bool,
}

impl CameraConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            use_https: false,
            username: String::new(),
            password: String::new(),
            auth_method: None,
            raw_tcp: false,
        }
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn auth(mut self, method: AuthMethod) -> Self {
        self.auth_method = Some(method);
        self
    }

    pub fn https(mut self, enabled: bool) -> Self {
        self.use_https = enabled;
        self
    }

    pub fn raw_tcp(mut self, enabled: bool) -> Self {
        self.raw_tcp = enabled;
        self
    }
}

impl fmt::Debug for CameraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraConfig")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("use_https", &self.use_https)
            .field("username", &self.username)
            .field("password_set", &!self.password.is_empty())
            .field("auth_method", &self.auth_method)
            .field("raw_tcp", &self.raw_tcp)
            .finish()
    }
}

fn invalid_address(name: &str, reason: impl fmt::Display) -> ConfigError {
    ConfigError::InvalidAddress { name: name.to_string(), reason: reason.to_string() }
}

/// A validated camera. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct CameraDescriptor {
    name: String,
    base_url: Url,
    stream_url: Url,
    username: String,
    password: String,
    auth_method: AuthMethod,
    transport_mode: TransportMode,
}

impl CameraDescriptor {
    /// Validate a single configuration entry.
    pub fn from_config(config: CameraConfig) -> Result<Self, ConfigError> {
        let name = config.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if config.raw_tcp && config.use_https {
            return Err(ConfigError::RawTransportTls(name));
        }

        let address = config.address.trim().trim_end_matches('/');
        if address.is_empty() || address.contains("://") || address.contains('/') {
            return Err(ConfigError::InvalidAddress {
                name,
                reason: format!("expected host[:port], got {:?}", config.address),
            });
        }
        let scheme = if config.use_https { "https" } else { "http" };
        let base_url = Url::parse(&format!("{scheme}://{address}/"))
            .map_err(|e| invalid_address(&name, e))?;
        if base_url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::InvalidAddress { name, reason: "missing host".into() });
        }
        let stream_url =
            base_url.join(ALERT_STREAM_PATH).map_err(|e| invalid_address(&name, e))?;

        let auth_method = config.auth_method.unwrap_or(if config.username.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::Digest
        });
        if auth_method != AuthMethod::None
            && (config.username.is_empty() || config.password.is_empty())
        {
            return Err(ConfigError::MissingCredentials { name, method: auth_method.as_str() });
        }

        let transport_mode =
            if config.raw_tcp { TransportMode::RawSocket } else { TransportMode::MultipartHttp };

        Ok(Self {
            name,
            base_url,
            stream_url,
            username: config.username,
            password: config.password,
            auth_method,
            transport_mode,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `http(s)://<address>/ISAPI/Event/notification/alertStream`
    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.transport_mode
    }
}

impl fmt::Debug for CameraDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraDescriptor")
            .field("name", &self.name)
            .field("stream_url", &self.stream_url.as_str())
            .field("username", &self.username)
            .field("password_set", &!self.password.is_empty())
            .field("auth_method", &self.auth_method)
            .field("transport_mode", &self.transport_mode)
            .finish()
    }
}

#[derive(Deserialize)]
struct RegistryDocument {
    cameras: Vec<CameraConfig>,
}

/// Immutable set of cameras keyed by unique name. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CameraRegistry {
    cameras: Arc<[CameraDescriptor]>,
}

impl CameraRegistry {
    /// Validate every entry and reject duplicate names.
    pub fn new<I>(configs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = CameraConfig>,
    {
        let mut seen = HashSet::new();
        let mut cameras = Vec::new();
        for config in configs {
            let descriptor = CameraDescriptor::from_config(config)?;
            if !seen.insert(descriptor.name.clone()) {
                return Err(ConfigError::DuplicateName(descriptor.name));
            }
            debug!(
                target: "alarmstream::registry",
                camera = %descriptor.name,
                url = %descriptor.stream_url,
                auth = descriptor.auth_method.as_str(),
                transport = ?descriptor.transport_mode,
                "camera registered"
            );
            cameras.push(descriptor);
        }
        Ok(Self { cameras: cameras.into() })
    }

    /// Parse `{"cameras": [ ... ]}` and validate it.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let doc: RegistryDocument =
            serde_json::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::new(doc.cameras)
    }

    pub fn get(&self, name: &str) -> Option<&CameraDescriptor> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CameraDescriptor> {
        self.cameras.iter()
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}
