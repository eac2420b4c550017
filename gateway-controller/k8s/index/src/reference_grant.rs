use crate::store::Store;
use gateway_controller_k8s_api::{gateway::ReferenceGrant, group_or_core};

/// One side of a reference between two objects.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Reference<'a> {
    pub group: &'a str,
    pub kind: &'a str,
    pub namespace: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{from_kind} in namespace {from_namespace} may not reference {to_kind} {to_namespace}/{to_name}: no ReferenceGrant allows it")]
pub struct RefNotPermitted {
    pub from_kind: String,
    pub from_namespace: String,
    pub to_kind: String,
    pub to_namespace: String,
    pub to_name: String,
}

/// Checks that `from` may reference the object `to_name` of kind `to`.
///
/// References within a namespace are always allowed. A cross-namespace
/// reference needs a single ReferenceGrant in the target namespace whose
/// `from` and `to` both match.
pub fn is_reference_granted(
    store: &Store,
    from: Reference<'_>,
    to: Reference<'_>,
    to_name: &str,
) -> Result<(), RefNotPermitted> {
    if from.namespace == to.namespace {
        return Ok(());
    }

    let granted = store
        .in_namespace::<ReferenceGrant>(to.namespace)
        .any(|grant| grants(grant, from, to, to_name));
    if granted {
        return Ok(());
    }

    Err(RefNotPermitted {
        from_kind: from.kind.to_string(),
        from_namespace: from.namespace.to_string(),
        to_kind: to.kind.to_string(),
        to_namespace: to.namespace.to_string(),
        to_name: to_name.to_string(),
    })
}

fn grants(grant: &ReferenceGrant, from: Reference<'_>, to: Reference<'_>, to_name: &str) -> bool {
    let from_matches = grant.spec.from.iter().any(|f| {
        group_or_core(Some(&f.group)) == group_or_core(Some(from.group))
            && f.kind == from.kind
            && f.namespace == from.namespace
    });
    if !from_matches {
        return false;
    }

    grant.spec.to.iter().any(|t| {
        group_or_core(Some(&t.group)) == group_or_core(Some(to.group))
            && t.kind == to.kind
            && t.name.as_deref().map_or(true, |name| name == to_name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_controller_k8s_api::{
        gateway::{
            reference_grant::{ReferenceGrantFrom, ReferenceGrantTo},
            ReferenceGrantSpec, GROUP,
        },
        ObjectMeta,
    };

    const ROUTE: Reference<'static> = Reference {
        group: GROUP,
        kind: "HTTPRoute",
        namespace: "apps",
    };

    fn service(namespace: &str) -> Reference<'_> {
        Reference {
            group: "",
            kind: "Service",
            namespace,
        }
    }

    fn grant(
        name: &str,
        from: Vec<ReferenceGrantFrom>,
        to: Vec<ReferenceGrantTo>,
    ) -> ReferenceGrant {
        ReferenceGrant {
            metadata: ObjectMeta {
                namespace: Some("backends".to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: ReferenceGrantSpec { from, to },
        }
    }

    fn from_routes() -> ReferenceGrantFrom {
        ReferenceGrantFrom {
            group: GROUP.to_string(),
            kind: "HTTPRoute".to_string(),
            namespace: "apps".to_string(),
        }
    }

    fn to_services(name: Option<&str>) -> ReferenceGrantTo {
        ReferenceGrantTo {
            group: "".to_string(),
            kind: "Service".to_string(),
            name: name.map(ToString::to_string),
        }
    }

    #[test]
    fn same_namespace_is_allowed() {
        let store = Store::default();
        assert!(is_reference_granted(&store, ROUTE, service("apps"), "web").is_ok());
    }

    #[test]
    fn cross_namespace_requires_grant() {
        let mut store = Store::default();
        assert!(is_reference_granted(&store, ROUTE, service("backends"), "web").is_err());

        store.apply(grant("g", vec![from_routes()], vec![to_services(None)]));
        assert!(is_reference_granted(&store, ROUTE, service("backends"), "web").is_ok());
    }

    #[test]
    fn grant_may_name_target() {
        let mut store = Store::default();
        store.apply(grant("g", vec![from_routes()], vec![to_services(Some("api"))]));
        assert!(is_reference_granted(&store, ROUTE, service("backends"), "api").is_ok());
        let err = is_reference_granted(&store, ROUTE, service("backends"), "web").unwrap_err();
        assert_eq!(err.to_name, "web");
    }

    #[test]
    fn from_and_to_must_match_in_one_grant() {
        let mut store = Store::default();
        let other_from = ReferenceGrantFrom {
            namespace: "elsewhere".to_string(),
            ..from_routes()
        };
        let other_to = ReferenceGrantTo {
            kind: "Secret".to_string(),
            ..to_services(None)
        };
        store.apply(grant("from-only", vec![from_routes()], vec![other_to]));
        store.apply(grant("to-only", vec![other_from], vec![to_services(None)]));
        assert!(is_reference_granted(&store, ROUTE, service("backends"), "web").is_err());
    }

    #[test]
    fn core_group_aliases() {
        let mut store = Store::default();
        store.apply(grant(
            "g",
            vec![from_routes()],
            vec![ReferenceGrantTo {
                group: "core".to_string(),
                ..to_services(None)
            }],
        ));
        assert!(is_reference_granted(&store, ROUTE, service("backends"), "web").is_ok());
    }
}
