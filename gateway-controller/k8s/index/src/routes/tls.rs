use super::{l4, Failure, Route, Target};
use crate::resolver::Context;
use gateway_controller_core::{
    config::{Configuration, TcpRouter, TcpRouterTls},
    priority::sni_priority,
    rule::sni_rule,
};
use gateway_controller_k8s_api::{
    gateway::{ParentReference, TlsMode, TlsRoute},
    ResourceExt,
};

impl Route for TlsRoute {
    const KIND: &'static str = "TLSRoute";

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
        let namespace = self.namespace().unwrap_or_default();
        let expr = sni_rule(target.hostnames);
        let priority = sni_priority(target.hostnames);
        let passthrough = target.listener.tls_mode == Some(TlsMode::Passthrough);

        let mut failure = None;
        for (idx, rule) in self.spec.rules.iter().enumerate() {
            let name = target.key.name(idx, &expr);
            let service = format!("{name}-wrr");
            let wrr = l4::weighted(
                ctx,
                Self::KIND,
                &namespace,
                rule.backend_refs.as_deref().unwrap_or_default(),
                &mut failure,
                &mut out.tcp.services,
            );
            out.tcp.services.insert(service.clone(), wrr);
            out.tcp.routers.insert(
                name,
                TcpRouter {
                    entry_points: vec![target.entry_point.to_string()],
                    rule: expr.clone(),
                    priority,
                    middlewares: vec![],
                    service,
                    tls: Some(TcpRouterTls { passthrough }),
                },
            );
        }
        failure
    }
}
