use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::PathBuf;

/// Create a k8s client. If a kubeconfig path was given the client is built
/// from it, otherwise the default environment is used.
pub(crate) async fn k8s_client(kubeconfig: &Option<PathBuf>) -> Result<Client> {
    match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Unable to read kubeconfig '{}'", path.display()))?;
            let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Unable to load kubeconfig")?;
            config
                .try_into()
                .context("Unable to create client from kubeconfig")
        }
        None => Client::try_default()
            .await
            .context("Unable to create default client"),
    }
}
