//! OAuth2 authorization-server discovery client.
//!
//! This crate provides a lightweight client for validating an OAuth2/OIDC
//! server and fetching its discovery metadata. It focuses on:
//!
//! - Validating the user-supplied base URL before any request is made
//! - Constructing an HTTP client with a bounded timeout and JSON Accept
//!   header
//! - Fetching the RFC 8414 metadata document (with an OpenID Connect
//!   fallback) and verifying the members a usable server must advertise
//!
//! The primary entry point is [`OauthServer`]. Create an instance via
//! [`OauthServer::new`], then call [`OauthServer::discover`].

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{Client, header};
use tracing::{debug, info, warn};
use url::Url;

use tokex_types::DiscoveryDocument;

/// RFC 8414 authorization-server metadata path.
pub const OAUTH_METADATA_PATH: &str = "/.well-known/oauth-authorization-server";
/// OpenID Connect discovery path, used as a fallback for servers that only
/// publish OIDC metadata.
pub const OIDC_METADATA_PATH: &str = "/.well-known/openid-configuration";

/// Optional endpoints the walkthrough can use when advertised. Absence is
/// logged, not fatal: the renderer falls back to configured defaults.
const OPTIONAL_ENDPOINTS: &[&str] = &[
    "userinfo_endpoint",
    "introspection_endpoint",
    "device_authorization_endpoint",
    "end_session_endpoint",
    "jwks_uri",
];

/// Thin wrapper around a configured `reqwest::Client` for talking to one
/// OAuth2 server.
#[derive(Debug, Clone)]
pub struct OauthServer {
    base_url: String,
    http: Client,
}

impl OauthServer {
    /// Constructs a client for the given server base URL.
    ///
    /// The URL must be absolute with an `http` or `https` scheme and a
    /// host. Plain `http` outside localhost is allowed (demo servers often
    /// run without TLS) but logged as a warning.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        validate_base_url(base_url)?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// The validated base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches and validates the RFC 8414 metadata document.
    pub async fn discover(&self) -> Result<DiscoveryDocument> {
        self.fetch_metadata(OAUTH_METADATA_PATH).await
    }

    /// Fetches and validates the OpenID Connect discovery document.
    pub async fn discover_openid(&self) -> Result<DiscoveryDocument> {
        self.fetch_metadata(OIDC_METADATA_PATH).await
    }

    async fn fetch_metadata(&self, path: &str) -> Result<DiscoveryDocument> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "fetching authorization server metadata");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request discovery document from {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("discovery endpoint {url} returned HTTP {}", status.as_u16());
        }

        let document: DiscoveryDocument = response.json().await.context("parse discovery document")?;

        let missing = document.missing_required();
        if !missing.is_empty() {
            bail!("discovery document is missing required members: {}", missing.join(", "));
        }

        let advertised = document.endpoint_map();
        for endpoint_name in OPTIONAL_ENDPOINTS {
            if !advertised.contains_key(*endpoint_name) {
                warn!(endpoint = *endpoint_name, "endpoint not advertised; configured default will be used");
            }
        }

        info!(
            issuer = document.issuer.as_deref().unwrap_or_default(),
            endpoints = advertised.len(),
            "authorization server validated"
        );
        Ok(document)
    }
}

/// Validate that a base URL is acceptable before any request is made.
///
/// Rules:
/// - the URL must parse, with an `http` or `https` scheme and a host
/// - plain `http` is allowed everywhere, but warned about outside
///   localhost
fn validate_base_url(base: &str) -> Result<()> {
    let parsed = Url::parse(base).map_err(|error| anyhow!("invalid server URL '{base}': {error}"))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => bail!("server URL must use http or https; got '{other}://'"),
    }

    let host = parsed.host_str().ok_or_else(|| anyhow!("server URL must include a host"))?;

    let is_localhost = host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" || host == "::1";
    if parsed.scheme() == "http" && !is_localhost {
        warn!(%host, "server URL uses plain http outside localhost");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https_and_local_http() {
        assert!(validate_base_url("https://auth.example.org").is_ok());
        assert!(validate_base_url("https://auth.example.org/realm/demo").is_ok());
        assert!(validate_base_url("http://localhost:8080").is_ok());
        assert!(validate_base_url("http://127.0.0.1:8080").is_ok());
    }

    #[test]
    fn rejects_unusable_urls() {
        assert!(validate_base_url("ftp://auth.example.org").is_err());
        assert!(validate_base_url("auth.example.org").is_err());
        assert!(validate_base_url("").is_err());
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let server = OauthServer::new("https://auth.example.org/", Duration::from_secs(10)).expect("client");
        assert_eq!(server.base_url(), "https://auth.example.org");
    }
}
