use crate::constants::{DEFAULT_DIAGNOSTICS_DIR, DEFAULT_MANIFEST_DIR, DEFAULT_SETTLE_TIMEOUT};
use crate::error::{self, Result};
use crate::images::ImageKind;
use serde::Deserialize;
use serde_plain::derive_fromstr_from_deserialize;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings that describe the target environment: which namespace to test in,
/// where images are published, and what the images are called. Loaded from a
/// JSON settings file once per run.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSettings {
    pub namespace: String,
    pub repo_url: String,
    #[serde(default)]
    pub images: ImageNames,
}

impl ClusterSettings {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let settings = std::fs::read_to_string(path).context(error::SettingsReadSnafu { path })?;
        serde_json::from_str(&settings).context(error::SettingsParseSnafu { path })
    }
}

/// The names under which the run's images are published, appended to
/// `repo_url` and tagged with the run's tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ImageNames {
    pub operator: String,
    pub test_runner: String,
    pub e2e: String,
    pub prehook: String,
}

impl Default for ImageNames {
    fn default() -> Self {
        Self {
            operator: "operator".to_string(),
            test_runner: "test-runner".to_string(),
            e2e: "e2e".to_string(),
            prehook: "prestop-hook".to_string(),
        }
    }
}

impl ImageNames {
    pub fn name(&self, kind: ImageKind) -> &str {
        match kind {
            ImageKind::Operator => &self.operator,
            ImageKind::TestRunner => &self.test_runner,
            ImageKind::E2e => &self.e2e,
            ImageKind::Prehook => &self.prehook,
        }
    }
}

/// When the diagnostic bundle is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticPolicy {
    /// Capture on every run, pass or fail.
    Always,
    /// Capture when the run aborts or the terminal phase is not `Succeeded`.
    OnFailure,
    Never,
}

derive_fromstr_from_deserialize!(DiagnosticPolicy);

/// Everything a single test run needs to know. Assembled once at startup and
/// read-only for the duration of the run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub namespace: String,
    pub repo_url: String,
    /// The image tag shared by all of the run's images.
    pub tag: String,
    /// Selects which test the driver executes.
    pub test: String,
    pub images: ImageNames,
    /// Build and publish the run's images before launching the driver.
    pub build_images: bool,
    /// Install the operator under test instead of assuming one exists.
    pub install_operator: bool,
    /// Have the operator watch all namespaces.
    pub cluster_wide: bool,
    /// Forwarded to the driver, which cleans up the resources it created.
    pub perform_cleanup: bool,
    pub diagnostics: DiagnosticPolicy,
    pub diagnostics_dir: PathBuf,
    pub manifest_dir: PathBuf,
    /// Bound on the post-stream poll for the driver's terminal phase.
    pub settle_timeout: Duration,
}

impl RunConfig {
    pub fn new(settings: ClusterSettings, tag: String, test: String) -> Self {
        Self {
            namespace: settings.namespace,
            repo_url: settings.repo_url,
            tag,
            test,
            images: settings.images,
            build_images: false,
            install_operator: false,
            cluster_wide: false,
            perform_cleanup: false,
            diagnostics: DiagnosticPolicy::OnFailure,
            diagnostics_dir: PathBuf::from(DEFAULT_DIAGNOSTICS_DIR),
            manifest_dir: PathBuf::from(DEFAULT_MANIFEST_DIR),
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }

    /// The full URI an image of `kind` is published under.
    pub fn image_uri(&self, kind: ImageKind) -> String {
        format!("{}/{}:{}", self.repo_url, self.images.name(kind), self.tag)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn settings_parse_with_defaults() {
        let settings: ClusterSettings = serde_json::from_str(
            r#"{"namespace": "app-test", "repo_url": "quay.io/example"}"#,
        )
        .unwrap();
        assert_eq!(settings.namespace, "app-test");
        assert_eq!(settings.images.e2e, "e2e");
        assert_eq!(settings.images.prehook, "prestop-hook");
    }

    #[test]
    fn settings_parse_with_image_override() {
        let settings: ClusterSettings = serde_json::from_str(
            r#"{
                "namespace": "app-test",
                "repo_url": "quay.io/example",
                "images": {"e2e": "app-e2e"}
            }"#,
        )
        .unwrap();
        assert_eq!(settings.images.e2e, "app-e2e");
        assert_eq!(settings.images.operator, "operator");
    }

    #[test]
    fn image_uri_is_repo_name_tag() {
        let settings: ClusterSettings = serde_json::from_str(
            r#"{"namespace": "app-test", "repo_url": "quay.io/example"}"#,
        )
        .unwrap();
        let config = RunConfig::new(settings, "v1.2.3".to_string(), "scale_up".to_string());
        assert_eq!(
            config.image_uri(ImageKind::Operator),
            "quay.io/example/operator:v1.2.3"
        );
    }

    #[test]
    fn diagnostic_policy_from_str() {
        let policy: DiagnosticPolicy = "on-failure".parse().unwrap();
        assert_eq!(policy, DiagnosticPolicy::OnFailure);
        assert!("sometimes".parse::<DiagnosticPolicy>().is_err());
    }
}
