/*!

Looks up whether an image version has been published to the registry's tag
catalog. The release manifest maps image keys to the versions the repository
expects; the catalog is the registry's HTTP API.

!*/

use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to read release manifest '{}': {}", path.display(), source))]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse release manifest '{}': {}", path.display(), source))]
    ManifestParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("'{}' is not in the release manifest", image))]
    UnknownImage { image: String },

    #[snafu(display("Unable to query tag catalog at '{}': {}", url, source))]
    CatalogRequest { url: String, source: reqwest::Error },

    #[snafu(display("The tag catalog response from '{}' has no tags map", url))]
    CatalogShape { url: String },
}

/// The versions this repository expects to be published, keyed by image name.
#[derive(Debug, Clone)]
pub struct ReleaseManifest {
    versions: BTreeMap<String, String>,
}

impl ReleaseManifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let manifest = std::fs::read_to_string(path).context(ManifestReadSnafu { path })?;
        Ok(Self {
            versions: serde_json::from_str(&manifest).context(ManifestParseSnafu { path })?,
        })
    }

    pub fn version_of(&self, image: &str) -> Result<&str> {
        self.versions
            .get(image)
            .map(String::as_str)
            .context(UnknownImageSnafu { image })
    }
}

/// A remote registry tag catalog, e.g. `https://quay.io/api/v1`.
#[derive(Debug, Clone)]
pub struct ReleaseCatalog {
    api_base: String,
    client: reqwest::Client,
}

impl ReleaseCatalog {
    pub fn new<S: Into<String>>(api_base: S) -> Self {
        Self {
            api_base: api_base.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Reports whether `version` appears among the published tags of
    /// `repository`.
    pub async fn is_released(&self, repository: &str, version: &str) -> Result<bool> {
        let tags = self.released_tags(repository).await?;
        Ok(tags.iter().any(|tag| tag == version))
    }

    /// All published tags of `repository`.
    pub async fn released_tags(&self, repository: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/repository/{}",
            self.api_base.trim_end_matches('/'),
            repository
        );
        let response: Value = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context(CatalogRequestSnafu { url: url.clone() })?
            .json()
            .await
            .context(CatalogRequestSnafu { url: url.clone() })?;
        tags_in(&response).context(CatalogShapeSnafu { url })
    }
}

/// The catalog reports tags as a map from tag name to tag metadata.
fn tags_in(response: &Value) -> Option<Vec<String>> {
    Some(
        response
            .get("tags")?
            .as_object()?
            .keys()
            .cloned()
            .collect(),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn tags_parse_from_catalog_response() {
        let response: Value = serde_json::from_str(
            r#"{"namespace": "example", "tags": {"0.7.0": {}, "0.7.1": {}, "latest": {}}}"#,
        )
        .unwrap();
        let tags = tags_in(&response).unwrap();
        assert_eq!(tags, vec!["0.7.0", "0.7.1", "latest"]);
    }

    #[test]
    fn malformed_catalog_response_is_detected() {
        let response: Value = serde_json::from_str(r#"{"tags": "not-a-map"}"#).unwrap();
        assert!(tags_in(&response).is_none());
    }

    #[test]
    fn manifest_lookup() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"operator": "0.7.1", "prestop-hook": "1.0.2"}}"#).unwrap();
        let manifest = ReleaseManifest::load(file.path()).unwrap();
        assert_eq!(manifest.version_of("operator").unwrap(), "0.7.1");
        assert!(matches!(
            manifest.version_of("sidecar"),
            Err(Error::UnknownImage { .. })
        ));
    }
}
