use snafu::Snafu;
use std::path::PathBuf;
use std::time::Duration;

/// The `Result` type returned by the test-run controller.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum Error {
    #[snafu(display("Unable to {}: {}", action, source))]
    ApiCall { action: String, source: kube::Error },

    #[snafu(display("Unable to load the {} manifest: {}", what, source))]
    Manifest { what: String, source: crate::Error },

    #[snafu(display("Unable to publish image '{}': {}", uri, source))]
    ImagePublish {
        uri: String,
        source: crate::images::Error,
    },

    #[snafu(display(
        "Timed out waiting for the stale driver pod '{}' to be deleted",
        name
    ))]
    StaleDriverPod { name: String },

    #[snafu(display("Could not create driver pod '{}' within {:?}", name, timeout))]
    DriverPodCreate { name: String, timeout: Duration },

    #[snafu(display(
        "Driver pod '{}' never reached the Running phase within {:?}",
        name,
        timeout
    ))]
    NeverRunning { name: String, timeout: Duration },

    #[snafu(display(
        "Timed out waiting for the operator CRD '{}' to be deleted",
        name
    ))]
    StaleCrd { name: String },

    #[snafu(display("The operator CRD manifest has no name"))]
    UnnamedCrd,

    #[snafu(display("The operator deployment manifest has no container to patch"))]
    NoOperatorContainer,

    #[snafu(display("Unable to read a driver log line: {}", source))]
    LogStreamRead { source: std::io::Error },

    #[snafu(display(
        "The KUBECONFIG environment variable must point to the active kubeconfig"
    ))]
    NoKubeconfigEnv,

    #[snafu(display("Unable to read kubeconfig '{}': {}", path.display(), source))]
    KubeconfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse kubeconfig '{}': {}", path.display(), source))]
    KubeconfigParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("The kubeconfig '{}' has no cluster entry to rewrite", path.display()))]
    KubeconfigShape { path: PathBuf },

    #[snafu(display("Unable to serialize the rewritten kubeconfig: {}", source))]
    KubeconfigSerialize { source: serde_yaml::Error },

    #[snafu(display("The 'kubernetes' service has no cluster IP"))]
    NoClusterIp,
}
