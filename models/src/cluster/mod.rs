//! Versioned schemas for the `Cluster` custom resource.
//!
//! Each served version lives in its own module and derives its own `Cluster` type through
//! `kube::CustomResource`. Conversions between adjacent versions are plain `From` impls, defined
//! in the module of the version being converted *into*, so that adding a version means adding a
//! module plus a pair of `From` impls:
#![cfg_attr(doctest, doc = " ````no_test")]
//! ```
//! impl From<v1alpha4::Cluster> for v1beta1::Cluster { ... }
//! impl From<v1beta1::Cluster> for v1alpha4::Cluster { ... }
//! ```
//!
//! Types whose shape did not change between versions are shared from this module.
pub mod v1alpha3;
pub mod v1alpha4;

pub use self::v1alpha4::{Cluster, ClusterSpec, ClusterStatus};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The address on which a cluster's control plane can be reached.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
pub struct ApiEndpoint {
    /// The hostname on which the API server is serving.
    pub host: String,
    /// The port on which the API server is serving.
    pub port: i32,
}

/// Network settings shared by every machine of a cluster.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetwork {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server_port: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<NetworkRanges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<NetworkRanges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_domain: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRanges {
    pub cidr_blocks: Vec<String>,
}
