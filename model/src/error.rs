use snafu::Snafu;
use std::path::PathBuf;

/// The `Result` type returned by the settings and manifest loaders.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Unable to read settings file '{}': {}", path.display(), source))]
    SettingsRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse settings file '{}': {}", path.display(), source))]
    SettingsParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Manifest '{}' was not found", path.display()))]
    ManifestNotFound { path: PathBuf },

    #[snafu(display("Unable to read manifest '{}': {}", path.display(), source))]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to parse manifest '{}': {}", path.display(), source))]
    ManifestParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}
