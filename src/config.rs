// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;
use yup_oauth2::ServiceAccountKey;

use crate::cloud_handler::CloudHandler;
use crate::data_types::{CategoryInfo, DataSource, Vocabulary};
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = ".flow/secrets.toml";
pub const DEFAULT_DATA_DIR: &str = "data";

/// Environment variables that override the secrets file.
const ENV_KEYS: [&str; 4] = ["SHEET_NAME", "USER_EMAIL", "SPREADSHEET_ID", "DATA_DIR"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(rename = "SHEET_NAME")]
    pub sheet_name: Option<String>,
    #[serde(rename = "USER_EMAIL")]
    pub user_email: Option<String>,
    /// Spreadsheet id or URL.
    #[serde(rename = "SPREADSHEET_ID")]
    pub spreadsheet: Option<String>,
    #[serde(rename = "DATA_DIR")]
    pub data_dir: Option<PathBuf>,
    /// Path to a service account JSON key, used when no inline key is given.
    #[serde(rename = "CREDENTIALS_PATH")]
    pub credentials_path: Option<PathBuf>,
    pub gcp_service_account: Option<ServiceAccountKey>,
    #[serde(default)]
    pub vocabulary: VocabularyConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VocabularyConfig {
    #[serde(default)]
    pub tasks: VocabularyOverride,
    #[serde(default)]
    pub requests: VocabularyOverride,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VocabularyOverride {
    pub categories: Option<Vec<String>>,
    pub statuses: Option<Vec<String>>,
    pub done_status: Option<String>,
    pub in_progress_status: Option<String>,
}

impl VocabularyOverride {
    fn apply(&self, mut base: Vocabulary) -> Vocabulary {
        if let Some(categories) = &self.categories {
            base.categories = categories.iter().map(|c| CategoryInfo::named(c)).collect();
        }
        if let Some(statuses) = &self.statuses {
            base.statuses = statuses.clone();
        }
        if let Some(done) = &self.done_status {
            base.done_status = done.clone();
        }
        if let Some(in_progress) = &self.in_progress_status {
            base.in_progress_status = in_progress.clone();
        }
        base
    }
}

/// Credentials for the Google Sheets backend.
#[derive(Debug, Clone)]
pub enum Credentials {
    Inline(ServiceAccountKey),
    KeyFile(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Title of the spreadsheet holding the dashboard.
    pub sheet_name: String,
    pub user_email: String,
    pub source: DataSource,
    pub credentials: Option<Credentials>,
    pub tasks_vocabulary: Vocabulary,
    pub requests_vocabulary: Vocabulary,
}

impl Config {
    /// Loads `.env`, then the secrets file, then applies environment overrides.
    ///
    /// A missing file is an error only when `path` was given explicitly.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!("loaded environment from {}", env_file.display());
        }

        let file = match path {
            Some(path) => Self::read_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
                Self::read_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => FileConfig::default(),
        };

        Self::resolve(file, |key| std::env::var(key).ok())
    }

    pub fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<FileConfig, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn resolve<F>(mut file: FileConfig, env: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in ENV_KEYS {
            let Some(value) = env(key).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            debug!("{key} taken from the environment");
            match key {
                "SHEET_NAME" => file.sheet_name = Some(value),
                "USER_EMAIL" => file.user_email = Some(value),
                "SPREADSHEET_ID" => file.spreadsheet = Some(value),
                _ => file.data_dir = Some(PathBuf::from(value)),
            }
        }

        let sheet_name = required(file.sheet_name, "SHEET_NAME")?;
        let user_email = required(file.user_email, "USER_EMAIL")?;

        let credentials = match (file.gcp_service_account, file.credentials_path) {
            (Some(key), _) => Some(Credentials::Inline(key)),
            (None, Some(path)) => Some(Credentials::KeyFile(path)),
            (None, None) => None,
        };

        let source = match (&file.spreadsheet, &credentials) {
            (Some(reference), Some(_)) => {
                DataSource::Cloud(CloudHandler::spreadsheet_id_from(reference)?)
            }
            _ => DataSource::Local(
                file.data_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            ),
        };

        Ok(Config {
            sheet_name,
            user_email,
            source,
            credentials,
            tasks_vocabulary: file.vocabulary.tasks.apply(Vocabulary::tasks()),
            requests_vocabulary: file.vocabulary.requests.apply(Vocabulary::requests()),
        })
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}
