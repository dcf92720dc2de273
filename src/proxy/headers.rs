//! Outbound header policy
//!
//! Request headers are produced by an ordered list of transforms. Each step
//! sees the inbound headers and the request path and mutates the outbound
//! map; later steps win over earlier ones.

use crate::config::RoutingRules;
use hyper::header::{
    ACCEPT, AUTHORIZATION, CONNECTION, CONTENT_LENGTH, HOST, HeaderMap, HeaderName, HeaderValue,
    PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, REFERER, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use std::fmt::Debug;

/// Non-standard connection-scoped headers that never cross the proxy
const HOP_BY_HOP: &[&str] = &["keep-alive", "proxy-connection"];

/// Whether `name` describes the client connection rather than the message.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    [
        CONNECTION,
        UPGRADE,
        TRANSFER_ENCODING,
        TE,
        TRAILER,
        PROXY_AUTHENTICATE,
        PROXY_AUTHORIZATION,
    ]
    .contains(name)
        || HOP_BY_HOP.contains(&name.as_str())
}

/// Header names a sender listed in `Connection` as scoped to its hop.
pub fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect()
}

/// Copy `from` into `to`, dropping hop-by-hop headers and any header for
/// which `skip` returns true.
fn copy_end_to_end(from: &HeaderMap, to: &mut HeaderMap, skip: impl Fn(&HeaderName) -> bool) {
    let listed = connection_listed(from);
    for (name, value) in from {
        if is_hop_by_hop(name) || listed.contains(name) || skip(name) {
            continue;
        }
        to.append(name.clone(), value.clone());
    }
}

/// Whether the outbound HTTP client owns `name` and sets it itself.
fn is_transport_owned(name: &HeaderName) -> bool {
    *name == HOST || *name == CONTENT_LENGTH
}

/// Inputs visible to every transform step.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub inbound: &'a HeaderMap,
    /// Percent-decoded request path
    pub path: &'a str,
}

/// One step of the outbound header pipeline.
pub trait HeaderTransform: Debug + Send + Sync {
    fn apply(&self, ctx: &TransformContext<'_>, outbound: &mut HeaderMap);
}

/// Append every inbound header, keeping all values of multi-valued ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyInbound;

impl HeaderTransform for CopyInbound {
    fn apply(&self, ctx: &TransformContext<'_>, outbound: &mut HeaderMap) {
        copy_end_to_end(ctx.inbound, outbound, is_transport_owned);
    }
}

/// Replace whatever the caller negotiated with `Accept: */*`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForceAccept;

impl HeaderTransform for ForceAccept {
    fn apply(&self, _ctx: &TransformContext<'_>, outbound: &mut HeaderMap) {
        outbound.insert(ACCEPT, HeaderValue::from_static("*/*"));
    }
}

/// Forward `Authorization` and `Referer` verbatim on identity routes.
#[derive(Debug, Clone)]
pub struct PropagateIdentity {
    rules: RoutingRules,
}

impl PropagateIdentity {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            rules: RoutingRules {
                identity_prefix: prefix.into(),
                ..RoutingRules::default()
            },
        }
    }

    pub fn from_rules(rules: &RoutingRules) -> Self {
        Self {
            rules: rules.clone(),
        }
    }
}

impl HeaderTransform for PropagateIdentity {
    fn apply(&self, ctx: &TransformContext<'_>, outbound: &mut HeaderMap) {
        if !self.rules.propagates_identity(ctx.path) {
            return;
        }
        for name in [AUTHORIZATION, REFERER] {
            if let Some(value) = ctx.inbound.get(&name) {
                outbound.insert(name, value.clone());
            }
        }
    }
}

/// Ordered list of header transforms.
#[derive(Debug, Default)]
pub struct HeaderPipeline {
    steps: Vec<Box<dyn HeaderTransform>>,
}

impl HeaderPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy, force `Accept`, then propagate identity on the identity prefix.
    pub fn standard(rules: &RoutingRules) -> Self {
        Self::new()
            .with(CopyInbound)
            .with(ForceAccept)
            .with(PropagateIdentity::from_rules(rules))
    }

    pub fn with(mut self, step: impl HeaderTransform + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order and return the outbound headers.
    pub fn apply(&self, inbound: &HeaderMap, path: &str) -> HeaderMap {
        let ctx = TransformContext { inbound, path };
        let mut outbound = HeaderMap::with_capacity(inbound.len() + 1);
        for step in &self.steps {
            step.apply(&ctx, &mut outbound);
        }
        outbound
    }
}

/// Copy backend response headers to the client response, minus hop-by-hop ones.
pub fn copy_response_headers(from: &HeaderMap, to: &mut HeaderMap) {
    copy_end_to_end(from, to, |_| false);
}
