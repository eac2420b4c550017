use super::{l4, Failure, Route, Target};
use crate::resolver::Context;
use gateway_controller_core::config::{Configuration, UdpRouter};
use gateway_controller_k8s_api::{
    gateway::{ParentReference, UdpRoute},
    ResourceExt,
};

impl Route for UdpRoute {
    const KIND: &'static str = "UDPRoute";

    fn parent_refs(&self) -> &[ParentReference] {
        self.spec.parent_refs.as_deref().unwrap_or_default()
    }

    /// UDP routers have no rule: every datagram on the entry point is
    /// forwarded.
    fn build(
        &self,
        ctx: &Context<'_>,
        target: &Target<'_>,
        out: &mut Configuration,
    ) -> Option<Failure> {
        let namespace = self.namespace().unwrap_or_default();
        let mut failure = None;

        for (idx, rule) in self.spec.rules.iter().enumerate() {
            let name = target.key.name(idx, "");
            let wrr = l4::weighted(
                ctx,
                Self::KIND,
                &namespace,
                rule.backend_refs.as_deref().unwrap_or_default(),
                &mut failure,
                &mut out.udp.services,
            );
            let service = format!("{name}-wrr");
            out.udp.services.insert(service.clone(), wrr);
            out.udp.routers.insert(
                name,
                UdpRouter {
                    entry_points: vec![target.entry_point.to_string()],
                    service,
                },
            );
        }
        failure
    }
}
