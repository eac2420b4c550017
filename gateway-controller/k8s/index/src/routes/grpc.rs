use super::{
    http::{build_rules, header_match, InvalidMatch, Rule},
    Failure, Route, Target,
};
use crate::resolver::Context;
use anyhow::{bail, Result};
use gateway_controller_core::{
    config::Configuration,
    http_route::{HttpRouteMatch, PathMatch},
};
use gateway_controller_k8s_api::{
    gateway::{
        grpcroute::{GrpcMethodMatch, GrpcRouteMatch},
        httproute::ValueMatchType,
        GrpcRoute, ParentReference,
    },
    ResourceExt,
};
use regex::Regex;

impl Route for GrpcRoute {
    const KIND: &'static str = "GRPCRoute";

    fn parent_refs(&self) -> &[ParentReference] {
        self.spec.parent_refs.as_deref().unwrap_or_default()
    }

    fn hostnames(&self) -> &[String] {
        self.spec.hostnames.as_deref().unwrap_or_default()
    }

    fn build(
        &self,
        ctx: &Context<'_>,
        target: &Target<'_>,
        out: &mut Configuration,
    ) -> Option<Failure> {
        let rules = self
            .spec
            .rules
            .iter()
            .flatten()
            .map(|rule| {
                let matches = match rule.matches.as_deref() {
                    None | Some([]) => vec![Ok(HttpRouteMatch::default())],
                    Some(matches) => matches.iter().cloned().map(convert).collect(),
                };
                Rule {
                    matches,
                    filters: rule.filters.as_deref().unwrap_or_default(),
                    backend_refs: rule.backend_refs.as_deref().unwrap_or_default(),
                }
            })
            .collect::<Vec<_>>();

        let namespace = self.namespace().unwrap_or_default();
        build_rules(ctx, Self::KIND, &namespace, target, &rules, true, out)
    }
}

fn convert(m: GrpcRouteMatch) -> Result<HttpRouteMatch, InvalidMatch> {
    let raw_path = m.method.as_ref().map(|method| {
        format!(
            "/{}/{}",
            method.service.as_deref().unwrap_or_default(),
            method.method.as_deref().unwrap_or_default()
        )
    });
    try_match(m).map_err(|error| InvalidMatch::new(raw_path, error))
}

/// Converts a gRPC match to an HTTP match on the request path, which gRPC
/// sets to `/{service}/{method}`.
fn try_match(GrpcRouteMatch { method, headers }: GrpcRouteMatch) -> Result<HttpRouteMatch> {
    let path = method
        .map(method_match)
        .transpose()?
        .unwrap_or_else(|| PathMatch::Prefix("/".to_string()));

    let headers = headers
        .into_iter()
        .flatten()
        .map(header_match)
        .collect::<Result<_>>()?;

    Ok(HttpRouteMatch {
        path,
        headers,
        ..Default::default()
    })
}

fn method_match(
    GrpcMethodMatch {
        type_,
        service,
        method,
    }: GrpcMethodMatch,
) -> Result<PathMatch> {
    const ANY: &str = "[^/]+";

    match type_.unwrap_or_default() {
        ValueMatchType::Exact => {
            for (what, value) in [("service", &service), ("method", &method)] {
                if let Some(v) = value.as_deref().filter(|v| v.is_empty() || v.contains('/')) {
                    bail!("invalid gRPC {what} name {v:?}");
                }
            }
            match (service, method) {
                (Some(service), Some(method)) => {
                    Ok(PathMatch::Exact(format!("/{service}/{method}")))
                }
                (Some(service), None) => {
                    PathMatch::regex(&format!("^/{}/{ANY}$", regex::escape(&service)))
                }
                (None, Some(method)) => {
                    PathMatch::regex(&format!("^/{ANY}/{}$", regex::escape(&method)))
                }
                (None, None) => bail!("a gRPC method match must set a service or a method"),
            }
        }
        ValueMatchType::RegularExpression => {
            let service = service.as_deref().unwrap_or(ANY);
            let method = method.as_deref().unwrap_or(ANY);
            Ok(PathMatch::Regex(Regex::new(&format!("^/{service}/{method}$"))?))
        }
    }
}
