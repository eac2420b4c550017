use crate::resolver::Context;
use gateway_controller_core::{
    conditions::reasons,
    config::{HeaderModifier, Middleware, RequestRedirect, UrlRewrite},
    http_route::{HeaderName, HttpRouteMatch, PathMatch},
    rule::normalize,
};
use gateway_controller_k8s_api::gateway::httproute::{
    filter_type, HttpHeaderFilter, HttpPathModifier, HttpRequestRedirectFilter, HttpRouteFilter,
    HttpUrlRewriteFilter,
};
use std::collections::BTreeMap;

const REPLACE_FULL_PATH: &str = "ReplaceFullPath";
const REPLACE_PREFIX_MATCH: &str = "ReplacePrefixMatch";

const DEFAULT_REDIRECT_STATUS: u16 = 302;

#[derive(Debug, thiserror::Error)]
pub(crate) enum FilterError {
    #[error("unsupported filter type {0}")]
    Unsupported(String),

    #[error("invalid {kind} filter: {message}")]
    Invalid { kind: String, message: String },

    #[error("unsupported filter kind {kind} in group {group}")]
    InvalidKind { group: String, kind: String },

    #[error("failed to build {kind} filter {name}: {error}")]
    Extension {
        kind: String,
        name: String,
        #[source]
        error: anyhow::Error,
    },
}

/// A middleware reference and, when it is not defined elsewhere, its
/// definition.
pub(crate) type Built = (String, Option<Middleware>);

impl FilterError {
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            Self::InvalidKind { .. } => reasons::INVALID_KIND,
            Self::Unsupported(_) | Self::Invalid { .. } | Self::Extension { .. } => {
                reasons::UNSUPPORTED_VALUE
            }
        }
    }

    fn invalid(kind: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            kind: kind.to_string(),
            message: message.into(),
        }
    }
}

/// Converts a rule's filters into middlewares for the router `router`.
///
/// gRPC routes support only header modifiers and extension references.
pub(crate) fn build(
    ctx: &Context<'_>,
    route_namespace: &str,
    router: &str,
    filters: &[HttpRouteFilter],
    m: &HttpRouteMatch,
    grpc: bool,
) -> Result<Vec<Built>, FilterError> {
    filters
        .iter()
        .enumerate()
        .map(|(i, filter)| {
            let name = normalize(&format!("{router}-{}-{i}", filter.type_.to_lowercase()));
            let mw = match filter.type_.as_str() {
                filter_type::REQUEST_HEADER_MODIFIER => {
                    let f = required(&filter.type_, filter.request_header_modifier.as_ref())?;
                    Middleware::RequestHeaderModifier(header_modifier(&filter.type_, f)?)
                }
                filter_type::RESPONSE_HEADER_MODIFIER => {
                    let f = required(&filter.type_, filter.response_header_modifier.as_ref())?;
                    Middleware::ResponseHeaderModifier(header_modifier(&filter.type_, f)?)
                }
                filter_type::REQUEST_REDIRECT if !grpc => {
                    let f = required(&filter.type_, filter.request_redirect.as_ref())?;
                    Middleware::RequestRedirect(request_redirect(f, m)?)
                }
                filter_type::URL_REWRITE if !grpc => {
                    let f = required(&filter.type_, filter.url_rewrite.as_ref())?;
                    Middleware::UrlRewrite(url_rewrite(f, m)?)
                }
                filter_type::EXTENSION_REF => {
                    let ext = required(&filter.type_, filter.extension_ref.as_ref())?;
                    let builder = ctx.registry.filter(&ext.group, &ext.kind).ok_or_else(|| {
                        FilterError::InvalidKind {
                            group: ext.group.clone(),
                            kind: ext.kind.clone(),
                        }
                    })?;
                    return builder(&ext.name, route_namespace).map_err(|error| {
                        FilterError::Extension {
                            kind: ext.kind.clone(),
                            name: format!("{route_namespace}/{}", ext.name),
                            error,
                        }
                    });
                }
                other => return Err(FilterError::Unsupported(other.to_string())),
            };
            Ok((name, Some(mw)))
        })
        .collect()
}

fn required<'f, T>(kind: &str, filter: Option<&'f T>) -> Result<&'f T, FilterError> {
    filter.ok_or_else(|| FilterError::invalid(kind, "missing filter configuration"))
}

fn header_modifier(kind: &str, filter: &HttpHeaderFilter) -> Result<HeaderModifier, FilterError> {
    let validate = |name: &str| {
        HeaderName::from_bytes(name.as_bytes())
            .map(|_| ())
            .map_err(|_| FilterError::invalid(kind, format!("invalid header name {name:?}")))
    };

    let mut set = BTreeMap::new();
    for h in filter.set.iter().flatten() {
        validate(&h.name)?;
        set.insert(h.name.clone(), h.value.clone());
    }
    let mut add = BTreeMap::new();
    for h in filter.add.iter().flatten() {
        validate(&h.name)?;
        add.insert(h.name.clone(), h.value.clone());
    }
    let mut remove = Vec::new();
    for name in filter.remove.iter().flatten() {
        validate(name)?;
        remove.push(name.clone());
    }

    Ok(HeaderModifier { set, add, remove })
}

fn request_redirect(
    filter: &HttpRequestRedirectFilter,
    m: &HttpRouteMatch,
) -> Result<RequestRedirect, FilterError> {
    let kind = filter_type::REQUEST_REDIRECT;

    if let Some(scheme) = filter.scheme.as_deref() {
        if scheme != "http" && scheme != "https" {
            return Err(FilterError::invalid(kind, format!("unsupported scheme {scheme:?}")));
        }
    }

    let status_code = filter.status_code.unwrap_or(DEFAULT_REDIRECT_STATUS);
    if !matches!(status_code, 301 | 302 | 303 | 307 | 308) {
        return Err(FilterError::invalid(
            kind,
            format!("unsupported status code {status_code}"),
        ));
    }

    let (path, path_prefix) = match filter.path.as_ref() {
        None => (None, None),
        Some(modifier) => path_modifier(kind, modifier, m)?,
    };

    Ok(RequestRedirect {
        scheme: filter.scheme.clone(),
        hostname: filter.hostname.clone(),
        port: filter.port,
        path,
        path_prefix,
        status_code,
    })
}

fn url_rewrite(
    filter: &HttpUrlRewriteFilter,
    m: &HttpRouteMatch,
) -> Result<UrlRewrite, FilterError> {
    let (path, path_prefix) = match filter.path.as_ref() {
        None => (None, None),
        Some(modifier) => path_modifier(filter_type::URL_REWRITE, modifier, m)?,
    };
    Ok(UrlRewrite {
        hostname: filter.hostname.clone(),
        path,
        path_prefix,
    })
}

/// Returns the replacement path and, for prefix replacement, the matched
/// prefix it replaces. Prefix replacement requires a prefix path match.
fn path_modifier(
    kind: &str,
    modifier: &HttpPathModifier,
    m: &HttpRouteMatch,
) -> Result<(Option<String>, Option<String>), FilterError> {
    let absolute = |path: &str| {
        if path.starts_with('/') {
            Ok(path.to_string())
        } else {
            Err(FilterError::invalid(
                kind,
                format!("{path:?} is not an absolute path"),
            ))
        }
    };

    match modifier.type_.as_str() {
        REPLACE_FULL_PATH => {
            let path = modifier
                .replace_full_path
                .as_deref()
                .ok_or_else(|| FilterError::invalid(kind, "replaceFullPath is required"))?;
            Ok((Some(absolute(path)?), None))
        }
        REPLACE_PREFIX_MATCH => {
            let path = modifier
                .replace_prefix_match
                .as_deref()
                .ok_or_else(|| FilterError::invalid(kind, "replacePrefixMatch is required"))?;
            let PathMatch::Prefix(prefix) = &m.path else {
                return Err(FilterError::invalid(
                    kind,
                    "ReplacePrefixMatch requires a PathPrefix match",
                ));
            };
            Ok((Some(absolute(path)?), Some(prefix.clone())))
        }
        other => Err(FilterError::invalid(
            kind,
            format!("unsupported path modifier type {other:?}"),
        )),
    }
}
