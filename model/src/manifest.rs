use crate::error::{self, Error, Result};
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use std::path::Path;

/// Reads a YAML manifest into a typed Kubernetes object. A missing file is
/// distinguishable from an unparsable one so that callers can decide whether
/// the manifest was optional.
pub fn read_manifest<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let manifest = match std::fs::read_to_string(path) {
        Ok(manifest) => manifest,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            return error::ManifestNotFoundSnafu { path }.fail();
        }
        Err(source) => {
            return Err(Error::ManifestRead {
                path: path.into(),
                source,
            });
        }
    };
    serde_yaml::from_str(&manifest).context(error::ManifestParseSnafu { path })
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::api::core::v1::ServiceAccount;
    use std::io::Write;

    #[test]
    fn read_service_account() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "apiVersion: v1\nkind: ServiceAccount\nmetadata:\n  name: e2e-driver\n"
        )
        .unwrap();
        let account: ServiceAccount = read_manifest(file.path()).unwrap();
        assert_eq!(account.metadata.name.as_deref(), Some("e2e-driver"));
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let result: Result<ServiceAccount> =
            read_manifest(Path::new("no/such/manifest.yaml"));
        assert!(matches!(result, Err(Error::ManifestNotFound { .. })));
    }

    #[test]
    fn garbage_manifest_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, ": not: [valid yaml").unwrap();
        let result: Result<ServiceAccount> = read_manifest(file.path());
        assert!(matches!(result, Err(Error::ManifestParse { .. })));
    }
}
