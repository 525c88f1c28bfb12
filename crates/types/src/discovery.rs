//! OAuth2 authorization-server metadata.
//!
//! Serde view of the RFC 8414 discovery document served under
//! `/.well-known/oauth-authorization-server` (or the OpenID Connect
//! equivalent). Only the members the walkthrough cares about are modeled;
//! unknown members are ignored.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Discovery metadata advertised by an OAuth2/OIDC server.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub introspection_endpoint: Option<String>,
    #[serde(default)]
    pub device_authorization_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
}

impl DiscoveryDocument {
    /// Members a usable authorization server must advertise.
    pub const REQUIRED_MEMBERS: [&'static str; 4] =
        ["issuer", "registration_endpoint", "authorization_endpoint", "token_endpoint"];

    /// Returns the names of required members absent from this document.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.issuer.is_none() {
            missing.push("issuer");
        }
        if self.registration_endpoint.is_none() {
            missing.push("registration_endpoint");
        }
        if self.authorization_endpoint.is_none() {
            missing.push("authorization_endpoint");
        }
        if self.token_endpoint.is_none() {
            missing.push("token_endpoint");
        }
        missing
    }

    /// Flattens the advertised endpoints into a name-to-URL map suitable for
    /// template endpoint resolution. Absent endpoints are omitted so the
    /// renderer can fall back to configured defaults.
    pub fn endpoint_map(&self) -> IndexMap<String, String> {
        let entries: [(&str, &Option<String>); 9] = [
            ("issuer", &self.issuer),
            ("registration_endpoint", &self.registration_endpoint),
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("userinfo_endpoint", &self.userinfo_endpoint),
            ("introspection_endpoint", &self.introspection_endpoint),
            ("device_authorization_endpoint", &self.device_authorization_endpoint),
            ("end_session_endpoint", &self.end_session_endpoint),
            ("jwks_uri", &self.jwks_uri),
        ];

        entries
            .into_iter()
            .filter_map(|(name, value)| value.as_ref().map(|url| (name.to_string(), url.clone())))
            .collect()
    }
}
