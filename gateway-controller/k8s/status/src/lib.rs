//! Writes the outcome of each resolution pass back to the cluster.
//!
//! The [`Index`] turns a [`Resolution`](gateway_controller_k8s_index::Resolution)
//! into the desired status of every GatewayClass, Gateway and route this
//! controller is responsible for. Only statuses that differ from what the
//! store last observed are queued; the [`Controller`] applies the queued
//! patches one at a time.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod conditions;
mod gateway;
mod index;
mod resource_id;
mod routes;


pub use self::{
    index::{Controller, Index, SharedIndex, Update, STATUS_FIELD_MANAGER},
    resource_id::{ResourceId, ResourceKind},
};
