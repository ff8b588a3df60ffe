//! Layered configuration for colossus.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults.
//! 2. A configuration file, TOML, YAML or JSON by extension. Either given
//!    explicitly or `config.toml` in the platform config directory (if it
//!    exists).
//! 3. `COLOSSUS_`-prefixed environment variables, with `__` separating
//!    nested keys (`COLOSSUS_UPLOAD__MAX_FILE_SIZE=1048576`).

use derive_more::{Display, Error};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

const ENV_PREFIX: &str = "COLOSSUS_";
const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;
const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    #[display("could not parse configuration")]
    Parse,
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        false
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "colossus")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite metadata database.
    pub database: PathBuf,
    pub tokens: TokenConfig,
    pub upload: UploadConfig,
    /// OAuth client for refreshing Google Drive tokens. Drive accounts can't
    /// be refreshed without it.
    pub google: Option<GoogleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let database = project_dirs()
            .map(|dirs| dirs.data_dir().join("colossus.db"))
            .unwrap_or_else(|| PathBuf::from("colossus.db"));
        Self {
            database,
            tokens: TokenConfig::default(),
            upload: UploadConfig::default(),
            google: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Access tokens expiring within this many seconds are refreshed before use.
    pub refresh_margin_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self { refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted upload, in bytes.
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { max_file_size: DEFAULT_MAX_FILE_SIZE }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

fn default_token_url() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl Config {
    /// Where the configuration file is looked for when none is given.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from every source.
    ///
    /// An explicitly given file must exist; the default one is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = &file {
            tracing::debug!(path = %file.display(), "Loading configuration file");
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.clone())),
            };
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.upload.max_file_size == 0 {
            exn::bail!(ErrorKind::Invalid("upload.max_file_size must be greater than zero".to_string()));
        }
        if self.database.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database path is empty".to_string()));
        }
        if let Some(google) = &self.google
            && (google.client_id.is_empty() || google.client_secret.is_empty())
        {
            exn::bail!(ErrorKind::Invalid("google.client_id and google.client_secret are required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    /// Keep the real user configuration out of tests that use the default path.
    fn isolate(jail: &mut Jail) {
        let home = jail.directory().display().to_string();
        jail.set_env("HOME", &home);
        jail.set_env("XDG_CONFIG_HOME", &home);
        jail.set_env("XDG_DATA_HOME", &home);
    }

    #[test]
    fn test_defaults() {
        Jail::expect_with(|jail| {
            isolate(jail);
            let config = Config::load(None).unwrap();
            assert_eq!(config.tokens.refresh_margin_secs, 60);
            assert_eq!(config.upload.max_file_size, 5 << 30);
            assert!(config.google.is_none());
            Ok(())
        });
    }

    #[rstest]
    #[case("colossus.toml", "database = \"/tmp/pool.db\"\n[tokens]\nrefresh_margin_secs = 120\n")]
    #[case("colossus.yaml", "database: /tmp/pool.db\ntokens:\n  refresh_margin_secs: 120\n")]
    #[case("colossus.json", r#"{"database": "/tmp/pool.db", "tokens": {"refresh_margin_secs": 120}}"#)]
    fn test_file_formats(#[case] name: &str, #[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file(name, contents)?;
            let config = Config::load(Some(Path::new(name))).unwrap();
            assert_eq!(config.database, PathBuf::from("/tmp/pool.db"));
            assert_eq!(config.tokens.refresh_margin_secs, 120);
            // Untouched sections keep their defaults.
            assert_eq!(config.upload, UploadConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("colossus.toml", "[upload]\nmax_file_size = 1000\n")?;
            jail.set_env("COLOSSUS_UPLOAD__MAX_FILE_SIZE", "2000");
            jail.set_env("COLOSSUS_GOOGLE__CLIENT_ID", "id");
            jail.set_env("COLOSSUS_GOOGLE__CLIENT_SECRET", "secret");
            let config = Config::load(Some(Path::new("colossus.toml"))).unwrap();
            assert_eq!(config.upload.max_file_size, 2000);
            let google = config.google.unwrap();
            assert_eq!(google.client_id, "id");
            assert_eq!(google.token_url, GOOGLE_TOKEN_URL);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|_jail| {
            let err = Config::load(Some(Path::new("nope.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_format() {
        Jail::expect_with(|jail| {
            jail.create_file("colossus.ini", "database = x")?;
            let err = Config::load(Some(Path::new("colossus.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));
            Ok(())
        });
    }

    #[rstest]
    #[case("[upload]\nmax_file_size = 0\n")]
    #[case("[google]\nclient_id = \"\"\nclient_secret = \"s\"\n")]
    fn test_invalid(#[case] contents: &str) {
        Jail::expect_with(|jail| {
            jail.create_file("colossus.toml", contents)?;
            let err = Config::load(Some(Path::new("colossus.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)));
            Ok(())
        });
    }

    #[test]
    fn test_malformed_value() {
        Jail::expect_with(|jail| {
            isolate(jail);
            jail.set_env("COLOSSUS_TOKENS__REFRESH_MARGIN_SECS", "soon");
            let err = Config::load(None).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Parse));
            Ok(())
        });
    }
}
