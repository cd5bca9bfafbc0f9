/*!

Builds the driver pod and its supporting objects. The pod is derived
deterministically from the run's configuration; its name is a reserved
singleton slot, so the controller deletes any prior instance before creating
a new one.

!*/

use crate::config::RunConfig;
use crate::constants::{
    APP_MANAGED_BY, APP_NAME, APP_PART_OF, DRIVER_POD_NAME, DRIVER_SERVICE_ACCOUNT,
    ENV_CLUSTER_WIDE, ENV_OPERATOR_IMAGE, ENV_PERFORM_CLEANUP, ENV_PRE_STOP_HOOK_IMAGE,
    ENV_TEST_NAMESPACE, ENV_TEST_RUNNER_IMAGE, KUBE_CONFIG_MAP_NAME, KUBE_CONFIG_MOUNT_PATH,
    KUBE_CONFIG_VOLUME, TESTDRIVE,
};
use crate::images::ImageKind;
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EnvVar, Pod, PodSpec, Volume, VolumeMount,
};
use kube::core::ObjectMeta;
use maplit::btreemap;
use serde_yaml::Value;
use std::collections::BTreeMap;

/// The driver pod: one container, restart policy `Never`, command selected by
/// the run's test selector.
pub fn driver_pod(config: &RunConfig) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(DRIVER_POD_NAME.to_string()),
            namespace: Some(config.namespace.clone()),
            labels: Some(labels()),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            service_account_name: Some(DRIVER_SERVICE_ACCOUNT.to_string()),
            containers: vec![Container {
                name: DRIVER_POD_NAME.to_string(),
                image: Some(config.image_uri(ImageKind::E2e)),
                command: Some(driver_command(config)),
                env: Some(driver_env(config)),
                volume_mounts: Some(vec![VolumeMount {
                    mount_path: KUBE_CONFIG_MOUNT_PATH.to_string(),
                    name: KUBE_CONFIG_VOLUME.to_string(),
                    ..VolumeMount::default()
                }]),
                ..Container::default()
            }],
            volumes: Some(vec![Volume {
                name: KUBE_CONFIG_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: Some(KUBE_CONFIG_MAP_NAME.to_string()),
                    ..ConfigMapVolumeSource::default()
                }),
                ..Volume::default()
            }]),
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}

fn driver_command(config: &RunConfig) -> Vec<String> {
    vec![
        "go".to_string(),
        "test".to_string(),
        "-v".to_string(),
        "-timeout=60m".to_string(),
        format!("./test/e2e/{}", config.test),
    ]
}

fn driver_env(config: &RunConfig) -> Vec<EnvVar> {
    env_vars(vec![
        (ENV_CLUSTER_WIDE, config.cluster_wide.to_string()),
        (ENV_OPERATOR_IMAGE, config.image_uri(ImageKind::Operator)),
        (ENV_TEST_NAMESPACE, config.namespace.clone()),
        (ENV_TEST_RUNNER_IMAGE, config.image_uri(ImageKind::TestRunner)),
        (ENV_PRE_STOP_HOOK_IMAGE, config.image_uri(ImageKind::Prehook)),
        (ENV_PERFORM_CLEANUP, config.perform_cleanup.to_string()),
    ])
}

fn env_vars(vars: Vec<(&str, String)>) -> Vec<EnvVar> {
    vars.into_iter()
        .map(|(name, value)| EnvVar {
            name: name.to_string(),
            value: Some(value),
            ..EnvVar::default()
        })
        .collect()
}

fn labels() -> BTreeMap<String, String> {
    btreemap! {
        APP_NAME.to_string() => DRIVER_POD_NAME.to_string(),
        APP_PART_OF.to_string() => TESTDRIVE.to_string(),
        APP_MANAGED_BY.to_string() => TESTDRIVE.to_string(),
    }
}

/// The ConfigMap that carries the rewritten kubeconfig into the driver pod.
pub fn kubeconfig_config_map(kubeconfig: String) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(KUBE_CONFIG_MAP_NAME.to_string()),
            labels: Some(labels()),
            ..ObjectMeta::default()
        },
        data: Some(btreemap! {
            "kubeconfig".to_string() => kubeconfig
        }),
        ..ConfigMap::default()
    }
}

/// Points the kubeconfig's first cluster entry at `server`, so that the
/// driver reaches the control plane through the in-cluster service address
/// instead of whatever the local environment uses. Returns `false` when the
/// document has no cluster entry to rewrite.
pub fn rewrite_cluster_server(kubeconfig: &mut Value, server: &str) -> bool {
    let key = |name: &str| Value::String(name.to_string());
    kubeconfig
        .as_mapping_mut()
        .and_then(|doc| doc.get_mut(&key("clusters")))
        .and_then(Value::as_sequence_mut)
        .and_then(|clusters| clusters.first_mut())
        .and_then(Value::as_mapping_mut)
        .and_then(|named| named.get_mut(&key("cluster")))
        .and_then(Value::as_mapping_mut)
        .map(|cluster| {
            cluster.insert(key("server"), key(server));
        })
        .is_some()
}
