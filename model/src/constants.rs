use std::time::Duration;

// The reserved name of the driver pod. At most one pod with this name may
// exist in the test namespace at a time.
pub const DRIVER_POD_NAME: &str = "e2e-driver";
pub const DRIVER_SERVICE_ACCOUNT: &str = "e2e-driver";

// The ConfigMap that replicates the local kubeconfig for the driver pod, and
// where the driver expects to find it.
pub const KUBE_CONFIG_MAP_NAME: &str = "kube-config";
pub const KUBE_CONFIG_VOLUME: &str = "kube-config-volume";
pub const KUBE_CONFIG_MOUNT_PATH: &str = "/etc/config";

// Environment variables passed to the driver container.
pub const ENV_CLUSTER_WIDE: &str = "CLUSTER_WIDE";
pub const ENV_OPERATOR_IMAGE: &str = "OPERATOR_IMAGE";
pub const ENV_PERFORM_CLEANUP: &str = "PERFORM_CLEANUP";
pub const ENV_PRE_STOP_HOOK_IMAGE: &str = "PRE_STOP_HOOK_IMAGE";
pub const ENV_TEST_NAMESPACE: &str = "TEST_NAMESPACE";
pub const ENV_TEST_RUNNER_IMAGE: &str = "TEST_RUNNER_IMAGE";

// How long we wait for a stale driver pod to disappear before declaring the
// namespace unusable.
pub const STALE_DRIVER_INTERVAL: Duration = Duration::from_millis(500);
pub const STALE_DRIVER_TIMEOUT: Duration = Duration::from_secs(10);

// Driver pod creation is retried on transient API errors within this window.
pub const DRIVER_CREATE_INTERVAL: Duration = Duration::from_secs(10);
pub const DRIVER_CREATE_TIMEOUT: Duration = Duration::from_secs(60);

// Polling bounds for the driver pod reaching the `Running` phase.
pub const RUNNING_INTERVAL: Duration = Duration::from_secs(5);
pub const RUNNING_TIMEOUT: Duration = Duration::from_secs(50);

// The reported terminal phase can lag stream closure. This is the default
// bound for the settle poll; `RunConfig::settle_timeout` overrides it.
pub const TERMINAL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(20);

// How long we wait for a deleted operator CRD to disappear before recreating.
pub const CRD_GONE_INTERVAL: Duration = Duration::from_millis(500);
pub const CRD_GONE_TIMEOUT: Duration = Duration::from_secs(5);

// Default locations for manifests and captured diagnostics.
pub const DEFAULT_MANIFEST_DIR: &str = "deploy";
pub const DEFAULT_DIAGNOSTICS_DIR: &str = "logs/e2e";

// Standard labels https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
pub const APP_NAME: &str = "app.kubernetes.io/name";
pub const APP_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const APP_PART_OF: &str = "app.kubernetes.io/part-of";

pub const TESTDRIVE: &str = "testdrive";
