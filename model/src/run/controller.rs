use super::{error, pod_phase, RunResult, TerminalPhase};
use crate::clients::ErrorKind;
use crate::conditions::{self, PollParams};
use crate::config::{DiagnosticPolicy, RunConfig};
use crate::constants::{
    CRD_GONE_INTERVAL, CRD_GONE_TIMEOUT, DRIVER_CREATE_INTERVAL, DRIVER_CREATE_TIMEOUT,
    DRIVER_POD_NAME, RUNNING_INTERVAL, RUNNING_TIMEOUT, STALE_DRIVER_INTERVAL,
    STALE_DRIVER_TIMEOUT, TERMINAL_INTERVAL,
};
use crate::images::{ImageBuilder, ImageKind};
use crate::manifest::read_manifest;
use crate::provision::{create_if_absent, delete_if_present};
use crate::{diagnostics, driver};
use chrono::Utc;
use futures::TryStreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding, Subject};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{DeleteParams, ListParams, LogParams, PostParams};
use kube::{Api, Client, Resource};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::{ensure, OptionExt, ResultExt};
use std::fmt::Debug;
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use super::error::Result;

/// Runs one end-to-end test: provision, optionally install the operator and
/// publish images, launch the driver pod, stream it, read its terminal
/// phase. One instance drives one run; the cluster client is owned here for
/// the run's duration.
pub struct TestRun {
    k8s_client: Client,
    config: RunConfig,
    cancel: CancellationToken,
}

impl TestRun {
    pub fn new(k8s_client: Client, config: RunConfig) -> Self {
        Self {
            k8s_client,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// A token that aborts the run from outside. Cancelling it unblocks the
    /// poller sleeps and the log stream promptly.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drives the run to a terminal state. Diagnostic capture happens exactly
    /// once on the way out, whether the run completed or aborted, before the
    /// outcome is returned.
    pub async fn execute(&self) -> Result<RunResult> {
        let outcome = self.run_to_terminal().await;
        if self.wants_capture(&outcome) {
            info!("Capturing diagnostics to '{}'", self.config.diagnostics_dir.display());
            if let Err(error) = diagnostics::capture(
                &self.k8s_client,
                &self.config.namespace,
                &self.config.diagnostics_dir,
            )
            .await
            {
                // Capture problems must never mask the run's outcome.
                warn!("Diagnostic capture failed: {}", error);
            }
        }
        let terminal_phase = outcome?;
        Ok(RunResult {
            terminal_phase,
            captured_at: Utc::now(),
        })
    }

    fn wants_capture(&self, outcome: &Result<TerminalPhase>) -> bool {
        match self.config.diagnostics {
            DiagnosticPolicy::Always => true,
            DiagnosticPolicy::Never => false,
            DiagnosticPolicy::OnFailure => !matches!(outcome, Ok(TerminalPhase::Succeeded)),
        }
    }

    async fn run_to_terminal(&self) -> Result<TerminalPhase> {
        self.provision().await?;
        if self.config.install_operator {
            self.install_operator().await?;
        }
        if self.config.build_images {
            self.publish_images().await?;
        }
        self.launch_driver().await?;
        self.await_running().await?;
        self.stream_driver_logs().await?;
        self.await_terminal().await
    }

    /// Deletes any stale driver pod, then converges the driver's RBAC
    /// objects and the kubeconfig ConfigMap. Re-runnable against a partially
    /// provisioned namespace.
    async fn provision(&self) -> Result<()> {
        let pods = self.pods();
        let delete_params = DeleteParams::default();
        delete_if_present(|| pods.delete(DRIVER_POD_NAME, &delete_params))
            .await
            .context(error::ApiCallSnafu {
                action: "delete the stale driver pod",
            })?;

        info!("Creating driver cluster role");
        let role: ClusterRole = self.load_manifest("e2e/role.yaml", "driver role")?;
        self.create_cluster_scoped(&role, "create the driver cluster role")
            .await?;

        info!("Creating driver cluster role binding");
        let mut binding: ClusterRoleBinding =
            self.load_manifest("e2e/role_binding.yaml", "driver role binding")?;
        if let Some(subjects) = binding.subjects.as_mut() {
            bind_subjects_to(subjects, &self.config.namespace);
        }
        self.create_cluster_scoped(&binding, "create the driver cluster role binding")
            .await?;

        info!("Creating driver service account");
        let account: ServiceAccount =
            self.load_manifest("e2e/service_account.yaml", "driver service account")?;
        self.create_namespaced(&account, "create the driver service account")
            .await?;

        self.replicate_kubeconfig().await
    }

    /// Replicates the local kubeconfig as a ConfigMap, pointed at the
    /// in-cluster `kubernetes` service so the driver can reach the control
    /// plane from inside.
    async fn replicate_kubeconfig(&self) -> Result<()> {
        info!("Creating kube-config ConfigMap");
        let services: Api<Service> = Api::namespaced(self.k8s_client.clone(), "default");
        let service = services
            .get("kubernetes")
            .await
            .context(error::ApiCallSnafu {
                action: "read the kubernetes service",
            })?;
        let cluster_ip = service
            .spec
            .and_then(|spec| spec.cluster_ip)
            .context(error::NoClusterIpSnafu)?;

        let path = std::env::var_os("KUBECONFIG")
            .map(PathBuf::from)
            .context(error::NoKubeconfigEnvSnafu)?;
        let raw = std::fs::read_to_string(&path)
            .context(error::KubeconfigReadSnafu { path: path.clone() })?;
        let mut kubeconfig: serde_yaml::Value =
            serde_yaml::from_str(&raw).context(error::KubeconfigParseSnafu { path: path.clone() })?;
        ensure!(
            driver::rewrite_cluster_server(&mut kubeconfig, &format!("https://{}", cluster_ip)),
            error::KubeconfigShapeSnafu { path }
        );
        let rewritten =
            serde_yaml::to_string(&kubeconfig).context(error::KubeconfigSerializeSnafu)?;

        self.create_namespaced(
            &driver::kubeconfig_config_map(rewritten),
            "create the kube-config ConfigMap",
        )
        .await
    }

    /// Installs the operator under test: its CRD, RBAC and deployment.
    async fn install_operator(&self) -> Result<()> {
        let crd: CustomResourceDefinition = self.load_manifest("operator/crd.yaml", "operator CRD")?;
        let name = crd.metadata.name.clone().context(error::UnnamedCrdSnafu)?;

        // Replace, not patch: a leftover CRD from an older run may carry an
        // incompatible schema.
        let crds: Api<CustomResourceDefinition> = Api::all(self.k8s_client.clone());
        let delete_params = DeleteParams::default();
        delete_if_present(|| crds.delete(&name, &delete_params))
            .await
            .context(error::ApiCallSnafu {
                action: "delete the operator CRD",
            })?;
        let by_name = ListParams::default().fields(&format!("metadata.name=={}", name));
        let gone = conditions::wait(
            || crds.list(&by_name),
            |list| list.items.is_empty(),
            &PollParams {
                interval: CRD_GONE_INTERVAL,
                timeout: Some(CRD_GONE_TIMEOUT),
                ignore: Vec::new(),
            },
            &self.cancel,
        )
        .await
        .context(error::ApiCallSnafu {
            action: "list operator CRDs",
        })?;
        ensure!(gone, error::StaleCrdSnafu { name: name.clone() });
        let post_params = PostParams::default();
        create_if_absent(|| crds.create(&post_params, &crd))
            .await
            .context(error::ApiCallSnafu {
                action: "create the operator CRD",
            })?;
        info!("Ensured operator CRD");

        let role: Role = self.load_manifest("operator/role.yaml", "operator role")?;
        self.create_namespaced(&role, "create the operator role").await?;

        let mut binding: RoleBinding =
            self.load_manifest("operator/role_binding.yaml", "operator role binding")?;
        if let Some(subjects) = binding.subjects.as_mut() {
            bind_subjects_to(subjects, &self.config.namespace);
        }
        self.create_namespaced(&binding, "create the operator role binding")
            .await?;

        let account: ServiceAccount =
            self.load_manifest("operator/service_account.yaml", "operator service account")?;
        self.create_namespaced(&account, "create the operator service account")
            .await?;

        let mut deployment: Deployment =
            self.load_manifest("operator/operator.yaml", "operator deployment")?;
        ensure!(
            set_operator_image(&mut deployment, &self.config.image_uri(ImageKind::Operator)),
            error::NoOperatorContainerSnafu
        );
        self.create_namespaced(&deployment, "create the operator deployment")
            .await?;
        info!("Deployed operator");
        Ok(())
    }

    /// Builds and publishes all of the run's images. Any failure aborts the
    /// run; we never execute tests against stale images.
    async fn publish_images(&self) -> Result<()> {
        let builder = ImageBuilder::new(".");
        for kind in ImageKind::ALL {
            let uri = self.config.image_uri(kind);
            builder
                .build_and_push(kind, &uri)
                .await
                .context(error::ImagePublishSnafu { uri })?;
        }
        Ok(())
    }

    /// Waits for the reserved driver pod slot to be free, then creates the
    /// new driver pod.
    async fn launch_driver(&self) -> Result<()> {
        let pods = self.pods();
        let by_name = ListParams::default().fields(&format!("metadata.name=={}", DRIVER_POD_NAME));
        let gone = conditions::wait(
            || pods.list(&by_name),
            |list| list.items.is_empty(),
            &PollParams {
                interval: STALE_DRIVER_INTERVAL,
                timeout: Some(STALE_DRIVER_TIMEOUT),
                ignore: Vec::new(),
            },
            &self.cancel,
        )
        .await
        .context(error::ApiCallSnafu {
            action: "list stale driver pods",
        })?;
        ensure!(
            gone,
            error::StaleDriverPodSnafu {
                name: DRIVER_POD_NAME,
            }
        );

        info!("Creating driver pod");
        let pod = driver::driver_pod(&self.config);
        let post_params = PostParams::default();
        let created = conditions::call_until_success(
            || pods.create(&post_params, &pod),
            &PollParams {
                interval: DRIVER_CREATE_INTERVAL,
                timeout: Some(DRIVER_CREATE_TIMEOUT),
                ignore: vec![ErrorKind::Transient],
            },
            &self.cancel,
        )
        .await
        .context(error::ApiCallSnafu {
            action: "create the driver pod",
        })?;
        ensure!(
            created,
            error::DriverPodCreateSnafu {
                name: DRIVER_POD_NAME,
                timeout: DRIVER_CREATE_TIMEOUT,
            }
        );
        Ok(())
    }

    async fn await_running(&self) -> Result<()> {
        info!("Waiting for driver pod to be running");
        let pods = self.pods();
        // The pod may not be visible right after create, so NotFound is
        // retried here along with connectivity hiccups.
        let running = conditions::wait(
            || pods.get(DRIVER_POD_NAME),
            |pod| matches!(pod_phase(pod), Some("Running")),
            &PollParams {
                interval: RUNNING_INTERVAL,
                timeout: Some(RUNNING_TIMEOUT),
                ignore: vec![ErrorKind::Transient, ErrorKind::NotFound],
            },
            &self.cancel,
        )
        .await
        .context(error::ApiCallSnafu {
            action: "read the driver pod",
        })?;
        ensure!(
            running,
            error::NeverRunningSnafu {
                name: DRIVER_POD_NAME,
                timeout: RUNNING_TIMEOUT,
            }
        );
        info!("Driver pod is running");
        Ok(())
    }

    /// Forwards driver output line by line until the stream closes naturally.
    /// The collaborator's stream, not the controller, determines end of
    /// stream.
    async fn stream_driver_logs(&self) -> Result<()> {
        let pods = self.pods();
        let log_params = LogParams {
            follow: true,
            pretty: true,
            ..LogParams::default()
        };
        let stream = pods
            .log_stream(DRIVER_POD_NAME, &log_params)
            .await
            .context(error::ApiCallSnafu {
                action: "open the driver log stream",
            })?
            .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error));
        let mut lines = StreamReader::new(Box::pin(stream)).lines();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                line = lines.next_line() => {
                    match line.context(error::LogStreamReadSnafu)? {
                        Some(line) => println!("{}", line),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// The phase reported right at stream close can lag the pod's actual
    /// terminal state, so poll until it settles within the configured bound
    /// before trusting it.
    async fn await_terminal(&self) -> Result<TerminalPhase> {
        let pods = self.pods();
        let settled = conditions::wait(
            || pods.get(DRIVER_POD_NAME),
            |pod| {
                matches!(
                    pod_phase(pod),
                    Some("Succeeded") | Some("Failed")
                )
            },
            &PollParams {
                interval: TERMINAL_INTERVAL,
                timeout: Some(self.config.settle_timeout),
                ignore: vec![ErrorKind::Transient],
            },
            &self.cancel,
        )
        .await
        .context(error::ApiCallSnafu {
            action: "read the driver pod's terminal phase",
        })?;
        if !settled {
            warn!(
                "Driver pod phase did not settle within {:?}",
                self.config.settle_timeout
            );
        }
        let pod = pods.get(DRIVER_POD_NAME).await.context(error::ApiCallSnafu {
            action: "read the driver pod's terminal phase",
        })?;
        Ok(TerminalPhase::of(&pod))
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.k8s_client.clone(), &self.config.namespace)
    }

    fn load_manifest<T: DeserializeOwned>(&self, relative: &str, what: &str) -> Result<T> {
        read_manifest(&self.config.manifest_dir.join(relative))
            .context(error::ManifestSnafu { what })
    }

    async fn create_cluster_scoped<T>(&self, object: &T, action: &str) -> Result<()>
    where
        T: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
    {
        let api: Api<T> = Api::all(self.k8s_client.clone());
        let post_params = PostParams::default();
        create_if_absent(|| api.create(&post_params, object))
            .await
            .context(error::ApiCallSnafu { action })?;
        Ok(())
    }

    async fn create_namespaced<T>(&self, object: &T, action: &str) -> Result<()>
    where
        T: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let api: Api<T> = Api::namespaced(self.k8s_client.clone(), &self.config.namespace);
        let post_params = PostParams::default();
        create_if_absent(|| api.create(&post_params, object))
            .await
            .context(error::ApiCallSnafu { action })?;
        Ok(())
    }
}

/// Service-account subjects must point at the namespace under test, whatever
/// the manifest happened to say.
fn bind_subjects_to(subjects: &mut [Subject], namespace: &str) {
    for subject in subjects {
        if subject.kind == "ServiceAccount" {
            subject.namespace = Some(namespace.to_string());
        }
    }
}

fn set_operator_image(deployment: &mut Deployment, image: &str) -> bool {
    deployment
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .and_then(|pod_spec| pod_spec.containers.first_mut())
        .map(|container| {
            container.image = Some(image.to_string());
        })
        .is_some()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn operator_image_is_patched_into_first_container() {
        let mut deployment: Deployment = serde_yaml::from_str(
            r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: app-operator
spec:
  selector:
    matchLabels:
      name: app-operator
  template:
    metadata:
      labels:
        name: app-operator
    spec:
      containers:
      - name: app-operator
        image: REPLACED_AT_INSTALL
"#,
        )
        .unwrap();
        assert!(set_operator_image(&mut deployment, "quay.io/example/operator:latest"));
        let image = deployment.spec.unwrap().template.spec.unwrap().containers[0]
            .image
            .clone()
            .unwrap();
        assert_eq!(image, "quay.io/example/operator:latest");
    }

    #[test]
    fn empty_deployment_cannot_be_patched() {
        let mut deployment = Deployment::default();
        assert!(!set_operator_image(&mut deployment, "whatever"));
    }

    #[test]
    fn subjects_are_rebound_to_the_test_namespace() {
        let mut subjects = vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: "e2e-driver".to_string(),
            namespace: Some("somewhere-else".to_string()),
            ..Subject::default()
        }];
        bind_subjects_to(&mut subjects, "app-test");
        assert_eq!(subjects[0].namespace.as_deref(), Some("app-test"));
    }
}
