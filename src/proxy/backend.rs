//! Backend selection
//!
//! Every request goes to exactly one of two local services. The choice is a
//! pure function of the request path, evaluated against [`RoutingRules`].

use crate::config::{RouterConfig, RoutingRules};
use crate::error::ProxyError;
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use url::Url;

/// Host both backends are reached on
pub const BACKEND_HOST: &str = "localhost";

/// The local service a request is forwarded to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Web frontend
    Web,
    /// API service, including its documentation pages
    Api,
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Web => "web",
            Backend::Api => "api",
        }
    }

    pub fn port(&self, config: &RouterConfig) -> u16 {
        match self {
            Backend::Web => config.web_port,
            Backend::Api => config.api_port,
        }
    }
}

impl RoutingRules {
    /// Pick the backend for a decoded `path`.
    ///
    /// API prefix, docs marker and docs suffix are checked in that order;
    /// anything else goes to the web backend.
    pub fn select_backend(&self, path: &str) -> Backend {
        if path.starts_with(&self.api_prefix)
            || path.contains(&self.docs_marker)
            || path.ends_with(&self.docs_suffix)
        {
            Backend::Api
        } else {
            Backend::Web
        }
    }

    /// Whether caller identity headers must be forwarded verbatim for `path`.
    pub fn propagates_identity(&self, path: &str) -> bool {
        path.starts_with(&self.identity_prefix)
    }
}

/// Percent-decode a request path for rule matching.
///
/// Invalid UTF-8 sequences are replaced rather than rejected.
pub fn decoded_path(path: &str) -> Cow<'_, str> {
    percent_decode_str(path).decode_utf8_lossy()
}

/// Build the plain-http URL of `path_and_query` on the backend at `port`.
pub fn target_url(port: u16, path_and_query: &str) -> Result<Url, ProxyError> {
    let path_and_query = if path_and_query.starts_with('/') {
        path_and_query
    } else {
        "/"
    };

    let raw = format!("http://{BACKEND_HOST}:{port}{path_and_query}");
    Url::parse(&raw).map_err(|e| ProxyError::RequestConstruction(format!("{raw}: {e}")))
}
