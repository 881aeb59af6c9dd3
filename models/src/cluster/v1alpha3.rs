use super::{v1alpha4, ApiEndpoint, ClusterNetwork};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The desired shape of a cluster.
#[derive(Clone, CustomResource, Serialize, Deserialize, Debug, Default, Eq, PartialEq, JsonSchema)]
#[kube(
    derive = "Default",
    derive = "PartialEq",
    group = "cluster.example.com",
    kind = "Cluster",
    namespaced,
    plural = "clusters",
    singular = "cluster",
    status = "ClusterStatus",
    version = "v1alpha3",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Whether reconciliation of this cluster is paused.
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_network: Option<ClusterNetwork>,
    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,
}

/// `ClusterStatus` surfaces the observed state of a cluster.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default)]
    pub infrastructure_ready: bool,
    /// Set once the first control plane machine has been initialized. Replaced by the
    /// `ControlPlaneInitialized` condition in v1alpha4.
    #[serde(default)]
    pub control_plane_initialized: bool,
    #[serde(default)]
    pub control_plane_ready: bool,
}

impl From<v1alpha4::Cluster> for Cluster {
    fn from(cluster: v1alpha4::Cluster) -> Self {
        let v1alpha4::Cluster {
            metadata,
            spec,
            status,
        } = cluster;

        Cluster {
            metadata,
            spec: ClusterSpec {
                paused: spec.paused,
                cluster_network: spec.cluster_network,
                control_plane_endpoint: spec.control_plane_endpoint,
            },
            status: status.map(ClusterStatus::from),
        }
    }
}

impl From<v1alpha4::ClusterStatus> for ClusterStatus {
    fn from(status: v1alpha4::ClusterStatus) -> Self {
        // Conditions other than `ControlPlaneInitialized` have no v1alpha3 counterpart.
        let control_plane_initialized = status.control_plane_initialized();
        let (failure_reason, failure_message) = status
            .failure
            .map(|failure| (failure.reason, failure.message))
            .unwrap_or_default();

        ClusterStatus {
            failure_reason,
            failure_message,
            phase: status.phase,
            infrastructure_ready: status.infrastructure_ready,
            control_plane_initialized,
            control_plane_ready: status.control_plane_ready,
        }
    }
}
