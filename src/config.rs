//! Configuration loading and types.
//!
//! Settings come from three layers: compiled-in defaults, an optional
//! YAML configuration file, and command-line overrides applied by
//! `main`.  The file maps section names to settings blocks so one file
//! can describe several deployments; `--section` picks one (names are
//! matched case-insensitively).

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::errors::GatewayError;

/// Immutable per-process settings, shared read-only across all requests.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// API access key presented in the Credential scope.
    #[serde(default)]
    pub access_key: String,

    /// API secret key the signing key chain is derived from.
    #[serde(default)]
    pub secret_key: String,

    /// Upstream endpoint, `host[:port]`.  Also the signed `host` header.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bucket prefixed onto every outbound path.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Service name in the credential scope (normally `s3`).
    #[serde(default = "default_service")]
    pub service: String,

    /// Region in the credential scope.
    #[serde(default = "default_region")]
    pub region: String,

    /// URL scheme for the upstream, `https` or `http`.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Enable the administrative methods PUT and DELETE.
    #[serde(default)]
    pub admin: bool,

    /// Answer every request with signed headers only, never contacting
    /// the upstream.
    #[serde(default)]
    pub auth_only: bool,

    /// Upstream connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Upstream total request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            endpoint: default_endpoint(),
            bucket: default_bucket(),
            service: default_service(),
            region: default_region(),
            scheme: default_scheme(),
            admin: false,
            auth_only: false,
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Settings {
    /// Check that every signing-relevant field is non-empty.
    ///
    /// Runs once at startup so a misconfigured gateway fails fast
    /// instead of answering 500 per request.
    pub fn validate(&self) -> Result<(), GatewayError> {
        for (value, field) in [
            (&self.access_key, "access_key"),
            (&self.secret_key, "secret_key"),
            (&self.endpoint, "endpoint"),
            (&self.bucket, "bucket"),
            (&self.service, "service"),
            (&self.region, "region"),
            (&self.scheme, "scheme"),
        ] {
            if value.is_empty() {
                return Err(GatewayError::Configuration(field));
            }
        }
        Ok(())
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_endpoint() -> String {
    "s3.amazonaws.com".to_string()
}

fn default_bucket() -> String {
    "test".to_string()
}

fn default_service() -> String {
    "s3".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_connect_timeout() -> u64 {
    6
}

fn default_request_timeout() -> u64 {
    12
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8888
}

// -- Loader ------------------------------------------------------------------

/// Load one named section of a YAML configuration file at `path`.
///
/// Section names are matched case-insensitively.  A missing section is
/// not fatal: a warning is logged and defaults are returned, leaving
/// command-line overrides to fill in the rest.
pub fn load_settings<P: AsRef<Path>>(path: P, section: &str) -> anyhow::Result<Settings> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let sections: BTreeMap<String, Settings> = serde_yaml::from_str(&contents)?;

    let wanted = section.to_uppercase();
    match sections
        .into_iter()
        .find(|(name, _)| name.to_uppercase() == wanted)
    {
        Some((_, settings)) => Ok(settings),
        None => {
            warn!(
                "Section {:?} not found in {:?}",
                section,
                path.as_ref().display()
            );
            Ok(Settings::default())
        }
    }
}
