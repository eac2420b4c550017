use super::{filters, invalid_backend, note, Failure, Route, Target};
use crate::{backend, resolver::Context};
use anyhow::{anyhow, Error, Result};
use gateway_controller_core::{
    conditions::reasons,
    config::{
        Configuration, Router, RouterTls, Service, WeightedRoundRobin, WeightedService,
        NOOP_SERVICE,
    },
    http_route::{self, HeaderMatch, PathMatch, QueryParamMatch},
};
use gateway_controller_k8s_api::{
    gateway::{
        httproute::{
            filter_type, HeaderMatch as ApiHeaderMatch, HttpPathMatch, HttpQueryParamMatch,
            HttpRouteFilter, HttpRouteMatch, PathMatchType, ValueMatchType,
        },
        BackendRef, HttpRoute, ParentReference,
    },
    ResourceExt,
};

/// Status code answered for requests routed to a rule whose backends or
/// filters could not be resolved.
const UNAVAILABLE_STATUS: u16 = 500;

/// A rule of an HTTP or gRPC route, with its matches already converted.
pub(super) struct Rule<'r> {
    pub matches: Vec<Result<http_route::HttpRouteMatch, InvalidMatch>>,
    pub filters: &'r [HttpRouteFilter],
    pub backend_refs: &'r [BackendRef],
}

/// A match that could not be converted.
///
/// Requests matching `fallback`, built from the match's raw path, are answered
/// with an error status so that the route fails visibly.
pub(super) struct InvalidMatch {
    pub fallback: http_route::HttpRouteMatch,
    pub error: Error,
}

impl Route for HttpRoute {
    const KIND: &'static str = "HTTPRoute";

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
                    None | Some([]) => vec![Ok(http_route::HttpRouteMatch::default())],
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
        build_rules(ctx, Self::KIND, &namespace, target, &rules, false, out)
    }
}

/// Builds one router per match of every rule.
pub(super) fn build_rules(
    ctx: &Context<'_>,
    route_kind: &str,
    route_namespace: &str,
    target: &Target<'_>,
    rules: &[Rule<'_>],
    grpc: bool,
    out: &mut Configuration,
) -> Option<Failure> {
    let mut failure = None;
    for (idx, rule) in rules.iter().enumerate() {
        for m in &rule.matches {
            let (m, invalid) = match m {
                Ok(m) => (m, None),
                Err(invalid) => (&invalid.fallback, Some(&invalid.error)),
            };

            let expr = m.rule(target.hostnames);
            let name = target.key.name(idx, &expr);
            let mut router = Router {
                entry_points: vec![target.entry_point.to_string()],
                rule: expr,
                priority: m.specificity(target.hostnames).priority(idx, rules.len()),
                middlewares: vec![],
                service: String::new(),
                tls: target.listener.terminates_tls().then(RouterTls::default),
            };

            if let Some(error) = invalid {
                note(
                    &mut failure,
                    Failure::new(reasons::UNSUPPORTED_VALUE, format!("invalid match: {error}")),
                );
                router.service = unavailable_service(out, &name, route_kind, "match");
                out.http.routers.insert(name, router);
                continue;
            }

            match filters::build(ctx, route_namespace, &name, rule.filters, m, grpc) {
                Ok(middlewares) => {
                    for (mw_name, mw) in middlewares {
                        if let Some(mw) = mw {
                            out.http.middlewares.insert(mw_name.clone(), mw);
                        }
                        router.middlewares.push(mw_name);
                    }
                }
                Err(error) => {
                    note(&mut failure, Failure::new(error.reason(), error.to_string()));
                    router.service = unavailable_service(out, &name, route_kind, "filter");
                    out.http.routers.insert(name, router);
                    continue;
                }
            }

            let redirects = rule
                .filters
                .iter()
                .any(|f| f.type_ == filter_type::REQUEST_REDIRECT);
            router.service = if rule.backend_refs.is_empty() && redirects {
                NOOP_SERVICE.to_string()
            } else {
                let wrr_name = format!("{name}-wrr");
                let wrr = if rule.backend_refs.is_empty() {
                    unavailable(invalid_backend(route_kind))
                } else {
                    let mut services = Vec::with_capacity(rule.backend_refs.len());
                    for backend_ref in rule.backend_refs {
                        let resolved =
                            backend::http(ctx, route_kind, route_namespace, backend_ref, grpc);
                        let member = match resolved {
                            Ok((svc_name, svc)) => {
                                if let Some(svc) = svc {
                                    out.http.services.entry(svc_name.clone()).or_insert(svc);
                                }
                                WeightedService {
                                    name: svc_name,
                                    weight: backend_ref.weight(),
                                    status: None,
                                }
                            }
                            Err(error) => {
                                let reason = error.reason();
                                note(&mut failure, Failure::new(reason, error.to_string()));
                                WeightedService {
                                    name: invalid_backend(route_kind),
                                    weight: backend_ref.weight(),
                                    status: Some(UNAVAILABLE_STATUS),
                                }
                            }
                        };
                        services.push(member);
                    }
                    Service::Weighted(WeightedRoundRobin { services })
                };
                out.http.services.insert(wrr_name.clone(), wrr);
                wrr_name
            };

            out.http.routers.insert(name, router);
        }
    }
    failure
}

/// A weighted group whose single member answers every request with an
/// error status.
fn unavailable(name: String) -> Service {
    Service::Weighted(WeightedRoundRobin {
        services: vec![WeightedService {
            name,
            weight: 1,
            status: Some(UNAVAILABLE_STATUS),
        }],
    })
}

/// Adds the error service of router `name`, whose member is named after the
/// invalid part of the rule, and returns its name.
fn unavailable_service(
    out: &mut Configuration,
    name: &str,
    route_kind: &str,
    what: &str,
) -> String {
    let err_name = format!("{name}-err-wrr");
    out.http.services.insert(
        err_name.clone(),
        unavailable(format!("invalid-{}-{what}", route_kind.to_lowercase())),
    );
    err_name
}

fn convert(m: HttpRouteMatch) -> Result<http_route::HttpRouteMatch, InvalidMatch> {
    let raw_path = m.path.as_ref().and_then(|p| p.value.clone());
    try_match(m).map_err(|error| InvalidMatch::new(raw_path, error))
}

pub(super) fn try_match(
    HttpRouteMatch {
        path,
        headers,
        query_params,
        method,
    }: HttpRouteMatch,
) -> Result<http_route::HttpRouteMatch> {
    let path = path
        .map(path_match)
        .transpose()?
        .unwrap_or_else(|| PathMatch::Prefix("/".to_string()));

    let headers = headers
        .into_iter()
        .flatten()
        .map(header_match)
        .collect::<Result<_>>()?;

    let query_params = query_params
        .into_iter()
        .flatten()
        .map(query_param_match)
        .collect::<Result<_>>()?;

    let method = method
        .as_deref()
        .map(http_route::Method::try_from)
        .transpose()?;

    Ok(http_route::HttpRouteMatch {
        path,
        headers,
        query_params,
        method,
    })
}

fn path_match(HttpPathMatch { type_, value }: HttpPathMatch) -> Result<PathMatch> {
    let value = value.unwrap_or_else(|| "/".to_string());
    match type_.unwrap_or_default() {
        PathMatchType::Exact | PathMatchType::PathPrefix if !value.starts_with('/') => Err(anyhow!(
            "paths must be absolute (begin with `/`); {value:?} is not an absolute path"
        )),
        PathMatchType::Exact => Ok(PathMatch::Exact(value)),
        PathMatchType::PathPrefix => Ok(PathMatch::Prefix(value)),
        PathMatchType::RegularExpression => PathMatch::regex(&value),
    }
}

pub(super) fn header_match(
    ApiHeaderMatch { type_, name, value }: ApiHeaderMatch,
) -> Result<HeaderMatch> {
    match type_.unwrap_or_default() {
        ValueMatchType::Exact => Ok(HeaderMatch::Exact(name.parse()?, value)),
        ValueMatchType::RegularExpression => Ok(HeaderMatch::Regex(name.parse()?, value.parse()?)),
    }
}

fn query_param_match(
    HttpQueryParamMatch { type_, name, value }: HttpQueryParamMatch,
) -> Result<QueryParamMatch> {
    match type_.unwrap_or_default() {
        ValueMatchType::Exact => Ok(QueryParamMatch::Exact(name, value)),
        ValueMatchType::RegularExpression => Ok(QueryParamMatch::Regex(name, value.parse()?)),
    }
}

// === impl InvalidMatch ===

impl InvalidMatch {
    /// Falls back to an exact match on the raw path text, or on `/`.
    pub(super) fn new(raw_path: Option<String>, error: Error) -> Self {
        let path = raw_path.unwrap_or_else(|| "/".to_string());
        Self {
            fallback: http_route::HttpRouteMatch {
                path: PathMatch::Exact(path),
                ..Default::default()
            },
            error,
        }
    }
}
