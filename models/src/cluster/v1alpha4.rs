use super::{v1alpha3, ApiEndpoint, ClusterNetwork};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The condition type that replaces v1alpha3's `status.controlPlaneInitialized`.
pub const CONTROL_PLANE_INITIALIZED_CONDITION: &str = "ControlPlaneInitialized";

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
    version = "v1alpha4",
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
    /// Set when reconciliation hit a terminal problem that requires intervention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default)]
    pub infrastructure_ready: bool,
    #[serde(default)]
    pub control_plane_ready: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ClusterStatus {
    /// Returns whether the `ControlPlaneInitialized` condition is `True`.
    pub fn control_plane_initialized(&self) -> bool {
        self.conditions.iter().any(|condition| {
            condition.type_ == CONTROL_PLANE_INITIALIZED_CONDITION
                && condition.status == ConditionStatus::True
        })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
pub struct FailureDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// An observation of one aspect of the cluster's state.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn new(type_: &str, status: ConditionStatus) -> Self {
        Condition {
            type_: type_.to_string(),
            status,
            reason: None,
            message: None,
        }
    }
}

#[derive(Copy, Clone, Debug, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<v1alpha3::Cluster> for Cluster {
    fn from(cluster: v1alpha3::Cluster) -> Self {
        let v1alpha3::Cluster {
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

impl From<v1alpha3::ClusterStatus> for ClusterStatus {
    fn from(status: v1alpha3::ClusterStatus) -> Self {
        let failure = match (status.failure_reason, status.failure_message) {
            (None, None) => None,
            (reason, message) => Some(FailureDetails { reason, message }),
        };

        let initialized = if status.control_plane_initialized {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        };

        ClusterStatus {
            failure,
            phase: status.phase,
            infrastructure_ready: status.infrastructure_ready,
            control_plane_ready: status.control_plane_ready,
            conditions: vec![Condition::new(
                CONTROL_PLANE_INITIALIZED_CONDITION,
                initialized,
            )],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NetworkRanges;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn v1alpha3_cluster() -> v1alpha3::Cluster {
        v1alpha3::Cluster {
            metadata: ObjectMeta {
                name: Some("workload".to_string()),
                namespace: Some("org-acme".to_string()),
                ..Default::default()
            },
            spec: v1alpha3::ClusterSpec {
                paused: false,
                cluster_network: Some(ClusterNetwork {
                    pods: Some(NetworkRanges {
                        cidr_blocks: vec!["192.168.0.0/16".to_string()],
                    }),
                    ..Default::default()
                }),
                control_plane_endpoint: ApiEndpoint {
                    host: "api.workload.example.com".to_string(),
                    port: 6443,
                },
            },
            status: Some(v1alpha3::ClusterStatus {
                failure_reason: None,
                failure_message: Some("machine unreachable".to_string()),
                phase: Some("Provisioned".to_string()),
                infrastructure_ready: true,
                control_plane_initialized: true,
                control_plane_ready: true,
            }),
        }
    }

    #[test]
    fn test_from_v1alpha3() {
        let converted = Cluster::from(v1alpha3_cluster());

        assert_eq!(converted.metadata.name.as_deref(), Some("workload"));
        assert_eq!(converted.spec.control_plane_endpoint.port, 6443);

        let status = converted.status.expect("status should survive conversion");
        assert!(status.control_plane_initialized());
        assert_eq!(
            status.failure,
            Some(FailureDetails {
                reason: None,
                message: Some("machine unreachable".to_string()),
            })
        );
    }

    #[test]
    fn test_round_trip_through_v1alpha4() {
        let original = v1alpha3_cluster();
        let round_tripped = v1alpha3::Cluster::from(Cluster::from(original.clone()));
        assert_eq!(round_tripped, original);
    }

    #[test]
    fn test_uninitialized_control_plane_condition() {
        let status = ClusterStatus::from(v1alpha3::ClusterStatus::default());
        assert!(!status.control_plane_initialized());
        assert_eq!(status.failure, None);
        assert_eq!(
            status.conditions,
            vec![Condition::new(
                CONTROL_PLANE_INITIALIZED_CONDITION,
                ConditionStatus::False
            )]
        );
    }
}
