use anyhow::{ensure, Context, Result};
use clap::Parser;
use kube::Client;
use log::info;
use std::path::PathBuf;
use std::time::Duration;
use testdrive_model::run::TestRun;
use testdrive_model::{ClusterSettings, DiagnosticPolicy, RunConfig};

/// Run an end-to-end test: provision the namespace, launch the driver pod,
/// stream its output and report its terminal phase through the exit code.
#[derive(Debug, Parser)]
pub(crate) struct Run {
    /// Name of the test the driver executes.
    #[clap(long)]
    test: String,

    /// Tag for the images, it will be the same for all images.
    #[clap(long, default_value = "latest")]
    tag: String,

    /// Path to the settings file. Defaults to `~/.testdrive/config.json`.
    #[clap(long)]
    settings: Option<PathBuf>,

    /// Build and push the e2e, test runner and hook images.
    #[clap(long)]
    build_images: bool,

    /// Install the operator instead of assuming one already exists.
    #[clap(long)]
    install_operator: bool,

    /// Have the operator watch all namespaces.
    #[clap(long)]
    cluster_wide: bool,

    /// Have the driver clean up the resources it created.
    #[clap(long)]
    perform_cleanup: bool,

    /// When to capture the diagnostic bundle [always|on-failure|never].
    #[clap(long, default_value = "on-failure")]
    diagnostics: DiagnosticPolicy,

    /// Where the diagnostic bundle is written.
    #[clap(long, default_value = "logs/e2e")]
    diagnostics_dir: PathBuf,

    /// Directory containing the deployment manifests.
    #[clap(long, default_value = "deploy")]
    manifest_dir: PathBuf,

    /// Bound, in seconds, on the post-stream wait for the driver's terminal
    /// phase.
    #[clap(long, default_value = "20")]
    settle_timeout: u64,
}

impl Run {
    pub(crate) async fn run(self, k8s_client: Client) -> Result<()> {
        let settings = ClusterSettings::load(settings_path(&self.settings)?)
            .context("Unable to load settings")?;
        let mut config = RunConfig::new(settings, self.tag, self.test);
        config.build_images = self.build_images;
        config.install_operator = self.install_operator;
        config.cluster_wide = self.cluster_wide;
        config.perform_cleanup = self.perform_cleanup;
        config.diagnostics = self.diagnostics;
        config.diagnostics_dir = self.diagnostics_dir;
        config.manifest_dir = self.manifest_dir;
        config.settle_timeout = Duration::from_secs(self.settle_timeout);

        let test_run = TestRun::new(k8s_client, config);
        let cancel = test_run.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });

        let result = test_run.execute().await.context("The test run aborted")?;
        ensure!(
            result.succeeded(),
            "The driver pod finished with terminal phase '{}'",
            result.terminal_phase
        );
        info!("The driver pod finished with terminal phase 'Succeeded'");
        Ok(())
    }
}

/// The explicitly given settings file, or the default one in the user's home
/// directory.
pub(crate) fn settings_path(explicit: &Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.clone());
    }
    let home = std::env::var_os("HOME")
        .context("Unable to locate the default settings file: HOME is not set")?;
    Ok(PathBuf::from(home).join(".testdrive").join("config.json"))
}
