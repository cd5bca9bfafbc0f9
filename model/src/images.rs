/*!

Builds and publishes the run's container images through the local `docker`
CLI. Publishing is content-addressed at the registry, so pushing a tag that
already exists is a cheap no-op on the registry's side.

!*/

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use snafu::{ensure, ResultExt, Snafu};
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to run '{} {}': {}", program, argument, source))]
    CommandSpawn {
        program: String,
        argument: String,
        source: std::io::Error,
    },

    #[snafu(display("Building image '{}' failed:\n{}", uri, stderr))]
    Build { uri: String, stderr: String },

    #[snafu(display("Pushing image '{}' failed:\n{}", uri, stderr))]
    Push { uri: String, stderr: String },
}

/// The four images a test run publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageKind {
    /// The operator under test.
    Operator,
    /// The in-cluster test runner.
    TestRunner,
    /// The image the driver pod runs.
    E2e,
    /// The pre-stop hook injected into the application's pods.
    Prehook,
}

derive_display_from_serialize!(ImageKind);
derive_fromstr_from_deserialize!(ImageKind);

impl ImageKind {
    pub const ALL: [ImageKind; 4] = [
        ImageKind::Operator,
        ImageKind::TestRunner,
        ImageKind::E2e,
        ImageKind::Prehook,
    ];

    /// Each image kind has its own dockerfile in the build context.
    fn dockerfile(&self) -> String {
        format!("Dockerfile.{}", self)
    }
}

/// Shells out to `docker` to build and push images from a single build
/// context directory.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    context_dir: PathBuf,
}

impl ImageBuilder {
    pub fn new<P: AsRef<Path>>(context_dir: P) -> Self {
        Self {
            context_dir: context_dir.as_ref().to_path_buf(),
        }
    }

    /// Builds the image for `kind` and pushes it as `uri`. A failure of
    /// either step is fatal to the run; there is no partial test execution
    /// with stale images.
    pub async fn build_and_push(&self, kind: ImageKind, uri: &str) -> Result<()> {
        self.build(kind, uri).await?;
        self.push(uri).await
    }

    async fn build(&self, kind: ImageKind, uri: &str) -> Result<()> {
        info!("Building image: {}", uri);
        let output = Command::new("docker")
            .arg("build")
            .arg("--file")
            .arg(self.context_dir.join(kind.dockerfile()))
            .arg("--tag")
            .arg(uri)
            .arg(&self.context_dir)
            .output()
            .await
            .context(CommandSpawnSnafu {
                program: "docker",
                argument: "build",
            })?;
        ensure!(
            output.status.success(),
            BuildSnafu {
                uri,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        );
        info!("Successfully built image");
        Ok(())
    }

    async fn push(&self, uri: &str) -> Result<()> {
        info!("Pushing image: {}", uri);
        let output = Command::new("docker")
            .arg("push")
            .arg(uri)
            .output()
            .await
            .context(CommandSpawnSnafu {
                program: "docker",
                argument: "push",
            })?;
        debug!("{}", String::from_utf8_lossy(&output.stdout));
        ensure!(
            output.status.success(),
            PushSnafu {
                uri,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn image_kind_round_trip() {
        assert_eq!(ImageKind::Prehook.to_string(), "prehook");
        assert_eq!("test-runner".parse::<ImageKind>().unwrap(), ImageKind::TestRunner);
        assert!("postgres".parse::<ImageKind>().is_err());
    }

    #[test]
    fn dockerfile_per_kind() {
        assert_eq!(ImageKind::E2e.dockerfile(), "Dockerfile.e2e");
        assert_eq!(ImageKind::TestRunner.dockerfile(), "Dockerfile.test-runner");
    }
}
