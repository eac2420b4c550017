#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod gateway;
pub mod labels;

pub use self::labels::{Labels, Selector, SelectorError};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{
            EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Namespace, Secret, Service,
            ServicePort, ServiceSpec,
        },
    },
    apimachinery::pkg::apis::meta::v1::{Condition, LabelSelector, LabelSelectorRequirement, Time},
    ByteString, ClusterResourceScope, NamespaceResourceScope,
};
pub use kube::{
    api::{Api, ListParams, ObjectMeta, Patch, PatchParams, ResourceExt},
    error::ErrorResponse,
    runtime::watcher,
    Client, Error, Resource,
};

/// The group used when a reference omits it or names the empty group.
pub const CORE_GROUP: &str = "core";

/// Normalizes an optional API group so that the empty group and an omitted
/// group both compare equal to [`CORE_GROUP`].
pub fn group_or_core(group: Option<&str>) -> &str {
    match group {
        None | Some("") => CORE_GROUP,
        Some(group) => group,
    }
}
