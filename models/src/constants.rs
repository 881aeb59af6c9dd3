/// Helper macro to build a fully qualified `group/version` string for one of the API groups
/// served by the conversion webhook.
#[macro_export]
macro_rules! group_version {
    ($group:literal, $version:literal) => {
        concat!($group, "/", $version)
    };
}

// Served versions, in the `group/version` form that appears in an object's `apiVersion`.
pub const STABLE_V1: &str = group_version!("stable.example.com", "v1");
pub const STABLE_V2: &str = group_version!("stable.example.com", "v2");
pub const CLUSTER_V1ALPHA3: &str = group_version!("cluster.example.com", "v1alpha3");
pub const CLUSTER_V1ALPHA4: &str = group_version!("cluster.example.com", "v1alpha4");

pub const CLUSTER_KIND: &str = "Cluster";

// The ConversionReview envelope exchanged with the kube-apiserver.
pub const CONVERSION_REVIEW_KIND: &str = "ConversionReview";
pub const CONVERSION_REVIEW_API_VERSION: &str = "apiextensions.k8s.io/v1";

// webhook constants
pub const WEBHOOK_CRD_CONVERT_ENDPOINT: &str = "/crdconvert"; // Route on which ConversionReviews are accepted.
pub const WEBHOOK_HEALTH_CHECK_ROUTE: &str = "/healthz"; // Route used for k8s liveness and readiness checks.
pub const WEBHOOK_METRICS_ROUTE: &str = "/metrics"; // Route vending prometheus metrics on the metrics listener.
pub const WEBHOOK_DEFAULT_ADDRESS: &str = ":8443";
pub const WEBHOOK_DEFAULT_METRICS_ADDRESS: &str = ":8080";
// The kube-apiserver refuses request bodies above 3 MiB, so no legitimate review is larger.
pub const WEBHOOK_DEFAULT_MAX_REQUEST_BYTES: usize = 3 * 1024 * 1024;

// tls constants
pub const TLS_KEY_MOUNT_PATH: &str = "/etc/webhook/certs";
pub const PUBLIC_KEY_NAME: &str = "tls.crt";
pub const PRIVATE_KEY_NAME: &str = "tls.key";
