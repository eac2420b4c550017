use super::{l4, Failure, Route, Target};
use crate::resolver::Context;
use gateway_controller_core::{
    config::{Configuration, TcpRouter, TcpRouterTls},
    priority::sni_priority,
    rule::sni_rule,
    ListenerProtocol,
};
use gateway_controller_k8s_api::{
    gateway::{ParentReference, TcpRoute, TlsMode},
    ResourceExt,
};

impl Route for TcpRoute {
    const KIND: &'static str = "TCPRoute";

    fn parent_refs(&self) -> &[ParentReference] {
        self.spec.parent_refs.as_deref().unwrap_or_default()
    }

    /// On a TLS listener the router matches the listener's hostname by SNI;
    /// otherwise it matches every connection.
    fn build(
        &self,
        ctx: &Context<'_>,
        target: &Target<'_>,
        out: &mut Configuration,
    ) -> Option<Failure> {
        let namespace = self.namespace().unwrap_or_default();
        let on_tls = target.listener.protocol == ListenerProtocol::Tls;
        let hostnames = match target.listener.hostname.as_ref() {
            Some(hostname) if on_tls => vec![hostname.clone()],
            _ => vec![],
        };
        let expr = sni_rule(&hostnames);

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
                    priority: sni_priority(&hostnames),
                    middlewares: vec![],
                    service,
                    tls: on_tls.then(|| TcpRouterTls {
                        passthrough: target.listener.tls_mode == Some(TlsMode::Passthrough),
                    }),
                },
            );
        }
        failure
    }
}
