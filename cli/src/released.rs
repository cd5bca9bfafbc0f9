use crate::run::settings_path;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use testdrive_model::images::ImageKind;
use testdrive_model::releases::{ReleaseCatalog, ReleaseManifest};
use testdrive_model::ClusterSettings;

/// Check whether the version the release manifest expects for an image is
/// already published to the registry's tag catalog.
#[derive(Debug, Parser)]
pub(crate) struct Released {
    /// Which image to check [operator|test-runner|e2e|prehook].
    #[clap(long)]
    image: ImageKind,

    /// The registry's API endpoint.
    #[clap(long, default_value = "https://quay.io/api/v1")]
    api_base: String,

    /// Path to the release manifest.
    #[clap(long, default_value = "release.json")]
    release_manifest: PathBuf,

    /// Path to the settings file. Defaults to `~/.testdrive/config.json`.
    #[clap(long)]
    settings: Option<PathBuf>,
}

impl Released {
    pub(crate) async fn run(self) -> Result<()> {
        let manifest = ReleaseManifest::load(&self.release_manifest)
            .context("Unable to load the release manifest")?;
        let settings = ClusterSettings::load(settings_path(&self.settings)?)
            .context("Unable to load settings")?;
        let image = settings.images.name(self.image);
        let version = manifest.version_of(image)?;
        let catalog = ReleaseCatalog::new(&self.api_base);
        if catalog
            .is_released(&repository(&settings.repo_url, image), version)
            .await?
        {
            println!("released");
        } else {
            println!("unreleased");
        }
        Ok(())
    }
}

/// The catalog identifies a repository without its registry host.
fn repository(repo_url: &str, image: &str) -> String {
    match repo_url.split_once('/') {
        Some((_registry, organization)) => format!("{}/{}", organization, image),
        None => image.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn repository_strips_the_registry_host() {
        assert_eq!(repository("quay.io/example", "operator"), "example/operator");
        assert_eq!(repository("example", "operator"), "operator");
    }
}
