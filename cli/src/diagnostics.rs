use crate::run::settings_path;
use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use std::path::PathBuf;
use testdrive_model::diagnostics;
use testdrive_model::ClusterSettings;

/// Capture a diagnostic snapshot of the test namespace on demand, outside of
/// a run.
#[derive(Debug, Parser)]
pub(crate) struct Diagnostics {
    /// The namespace to snapshot. Defaults to the settings file's namespace.
    #[clap(long)]
    namespace: Option<String>,

    /// Path to the settings file. Defaults to `~/.testdrive/config.json`.
    #[clap(long)]
    settings: Option<PathBuf>,

    /// Where the bundle is written.
    #[clap(long, default_value = "logs/e2e")]
    destination: PathBuf,
}

impl Diagnostics {
    pub(crate) async fn run(self, k8s_client: Client) -> Result<()> {
        let namespace = match self.namespace {
            Some(namespace) => namespace,
            None => ClusterSettings::load(settings_path(&self.settings)?)
                .context("Unable to load settings")?
                .namespace,
        };
        diagnostics::capture(&k8s_client, &namespace, &self.destination)
            .await
            .context("Unable to capture diagnostics")?;
        println!("Wrote diagnostics to '{}'", self.destination.display());
        Ok(())
    }
}
