/*!

Captures a point-in-time snapshot of the test namespace after a run: resource
listings, pod descriptions and per-container logs. Every section is gathered
independently; a section that cannot be fetched is a logged gap, not a fatal
error. The destination directory is truncated first so a capture is never
merged with a stale previous run.

!*/

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolume, Pod};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{ListParams, LogParams};
use kube::{Api, Client};
use log::warn;
use serde::Serialize;
use snafu::{ResultExt, Snafu};
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to reset diagnostics directory '{}': {}", path.display(), source))]
    ResetDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Everything the capture routine managed to gather. Sections that could not
/// be fetched are simply empty.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub crds: Vec<CustomResourceDefinition>,
    pub persistent_volumes: Vec<PersistentVolume>,
    pub stateful_sets: Vec<StatefulSet>,
    pub pods: Vec<Pod>,
    pub config_maps: Vec<ConfigMap>,
    pub pod_logs: Vec<ContainerLog>,
}

#[derive(Debug)]
pub struct ContainerLog {
    pub pod: String,
    pub container: String,
    pub log: String,
}

/// Snapshots the namespace into `destination`, discarding any prior capture
/// output there first.
pub async fn capture(k8s_client: &Client, namespace: &str, destination: &Path) -> Result<()> {
    let snapshot = gather(k8s_client, namespace).await;
    write_bundle(&snapshot, destination).await
}

async fn gather(k8s_client: &Client, namespace: &str) -> Snapshot {
    let mut snapshot = Snapshot::default();

    let crds: Api<CustomResourceDefinition> = Api::all(k8s_client.clone());
    match crds.list(&ListParams::default()).await {
        Ok(list) => snapshot.crds = list.items,
        Err(error) => warn!("Unable to list custom resource definitions: {}", error),
    }

    let volumes: Api<PersistentVolume> = Api::all(k8s_client.clone());
    match volumes.list(&ListParams::default()).await {
        Ok(list) => snapshot.persistent_volumes = list.items,
        Err(error) => warn!("Unable to list persistent volumes: {}", error),
    }

    let stateful_sets: Api<StatefulSet> = Api::namespaced(k8s_client.clone(), namespace);
    match stateful_sets.list(&ListParams::default()).await {
        Ok(list) => snapshot.stateful_sets = list.items,
        Err(error) => warn!("Unable to list stateful sets: {}", error),
    }

    let config_maps: Api<ConfigMap> = Api::namespaced(k8s_client.clone(), namespace);
    match config_maps.list(&ListParams::default()).await {
        Ok(list) => snapshot.config_maps = list.items,
        Err(error) => warn!("Unable to list config maps: {}", error),
    }

    let pods: Api<Pod> = Api::namespaced(k8s_client.clone(), namespace);
    match pods.list(&ListParams::default()).await {
        Ok(list) => snapshot.pods = list.items,
        Err(error) => warn!("Unable to list pods: {}", error),
    }

    for pod in &snapshot.pods {
        let name = match pod.metadata.name.as_deref() {
            Some(name) => name,
            None => continue,
        };
        for container in containers(pod) {
            let log_params = LogParams {
                container: Some(container.clone()),
                ..LogParams::default()
            };
            // One log file per container; a missing log is an individual gap.
            match pods.logs(name, &log_params).await {
                Ok(log) => snapshot.pod_logs.push(ContainerLog {
                    pod: name.to_string(),
                    container,
                    log,
                }),
                Err(error) => {
                    warn!("Unable to read log of '{}/{}': {}", name, container, error)
                }
            }
        }
    }

    snapshot
}

fn containers(pod: &Pod) -> Vec<String> {
    pod.spec
        .as_ref()
        .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// Writes the bundle's file tree. Only sections with data produce files.
pub(crate) async fn write_bundle(snapshot: &Snapshot, destination: &Path) -> Result<()> {
    reset_destination(destination).await?;

    if !snapshot.crds.is_empty() {
        let mut listing = header("CRD");
        listing.push_str(&to_yaml("custom resource definitions", &snapshot.crds));
        write_file(&destination.join("crd.log"), &listing).await;
    }

    let mut report = String::new();
    if !snapshot.persistent_volumes.is_empty() {
        report.push_str(&header("Persistent Volumes"));
        report.push_str(&to_yaml("persistent volumes", &snapshot.persistent_volumes));
    }
    if !snapshot.stateful_sets.is_empty() {
        report.push_str(&header("Stateful Sets"));
        report.push_str(&to_yaml("stateful sets", &snapshot.stateful_sets));
    }
    if !snapshot.pods.is_empty() {
        report.push_str(&header("Pods"));
        for pod in &snapshot.pods {
            let name = pod.metadata.name.as_deref().unwrap_or("<unnamed>");
            report.push_str(&header(&format!("Pod {}", name)));
            report.push_str(&to_yaml("pod", pod));
        }
    }
    if !report.is_empty() {
        write_file(&destination.join("diagnostics.txt"), &report).await;
    }

    for entry in &snapshot.pod_logs {
        let path = destination.join(format!("{}-{}.log", entry.pod, entry.container));
        write_file(&path, &entry.log).await;
    }

    for config_map in &snapshot.config_maps {
        let name = match config_map.metadata.name.as_deref() {
            Some(name) => name,
            None => continue,
        };
        let path = destination.join(format!("ConfigMap-{}.txt", name));
        write_file(&path, &to_yaml("config map", config_map)).await;
    }

    Ok(())
}

async fn reset_destination(destination: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(destination).await {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(Error::ResetDir {
                path: destination.into(),
                source,
            })
        }
    }
    tokio::fs::create_dir_all(destination)
        .await
        .context(ResetDirSnafu { path: destination })
}

fn to_yaml<T: Serialize>(what: &str, value: &T) -> String {
    serde_yaml::to_string(value).unwrap_or_else(|error| {
        warn!("Unable to serialize {}: {}", what, error);
        String::new()
    })
}

/// A failed write loses one section, not the whole capture.
async fn write_file(path: &Path, contents: &str) {
    if let Err(error) = tokio::fs::write(path, contents).await {
        warn!("Unable to write '{}': {}", path.display(), error);
    }
}

fn header(title: &str) -> String {
    let dashes = "-".repeat(76);
    format!("\n{}\n{}\n{}\n", dashes, title, dashes)
}

#[cfg(test)]
mod test {
    use super::*;
    use kube::core::ObjectMeta;

    fn named_pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            ..Pod::default()
        }
    }

    #[tokio::test]
    async fn empty_snapshot_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(&Snapshot::default(), dir.path()).await.unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn only_sections_with_data_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            pods: vec![named_pod("app-0")],
            pod_logs: vec![ContainerLog {
                pod: "app-0".to_string(),
                container: "server".to_string(),
                log: "starting\n".to_string(),
            }],
            ..Snapshot::default()
        };
        write_bundle(&snapshot, dir.path()).await.unwrap();

        assert!(!dir.path().join("crd.log").exists());
        let report = std::fs::read_to_string(dir.path().join("diagnostics.txt")).unwrap();
        assert!(report.contains("Pod app-0"));
        assert!(!report.contains("Persistent Volumes"));
        let log = std::fs::read_to_string(dir.path().join("app-0-server.log")).unwrap();
        assert_eq!(log, "starting\n");
    }

    #[tokio::test]
    async fn config_maps_get_one_file_each() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            config_maps: vec![ConfigMap {
                metadata: ObjectMeta {
                    name: Some("kube-config".to_string()),
                    ..ObjectMeta::default()
                },
                ..ConfigMap::default()
            }],
            ..Snapshot::default()
        };
        write_bundle(&snapshot, dir.path()).await.unwrap();
        assert!(dir.path().join("ConfigMap-kube-config.txt").exists());
    }

    #[tokio::test]
    async fn second_capture_leaves_no_residue() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("e2e");
        let first = Snapshot {
            pod_logs: vec![ContainerLog {
                pod: "app-0".to_string(),
                container: "server".to_string(),
                log: "old\n".to_string(),
            }],
            ..Snapshot::default()
        };
        write_bundle(&first, &destination).await.unwrap();
        assert!(destination.join("app-0-server.log").exists());

        write_bundle(&Snapshot::default(), &destination).await.unwrap();
        assert!(!destination.join("app-0-server.log").exists());
        assert!(destination.exists());
    }
}
