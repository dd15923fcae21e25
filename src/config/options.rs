use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{PresenceError, Result};

/// Runtime settings, persisted to `options.json` and mutated through the
/// presence loop while the process runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub enabled: bool,
    pub interval_minutes: u32,
    pub slack_url: String,
    pub user_data_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 2,
            slack_url: "https://app.slack.com".to_string(),
            user_data_dir: "chrome".to_string(),
            start: Some("09:00".to_string()),
            end: Some("18:00".to_string()),
        }
    }
}

/// Partial update applied over an [`Options`] snapshot.
///
/// `start`/`end` are doubly optional so a PATCH can distinguish "leave as is"
/// (field absent) from "clear the schedule edge" (field null).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionsPatch {
    pub enabled: Option<bool>,
    pub interval_minutes: Option<u32>,
    pub slack_url: Option<String>,
    pub user_data_dir: Option<String>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub start: Option<Option<String>>,
    #[serde(with = "double_option", skip_serializing_if = "Option::is_none")]
    pub end: Option<Option<String>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

impl Options {
    /// Builds the snapshot that results from applying `patch` over `self`.
    /// The merge is computed in full before anything observes it.
    pub fn merged(&self, patch: &OptionsPatch) -> Options {
        Options {
            enabled: patch.enabled.unwrap_or(self.enabled),
            interval_minutes: patch.interval_minutes.unwrap_or(self.interval_minutes),
            slack_url: patch
                .slack_url
                .clone()
                .unwrap_or_else(|| self.slack_url.clone()),
            user_data_dir: patch
                .user_data_dir
                .clone()
                .unwrap_or_else(|| self.user_data_dir.clone()),
            start: patch.start.clone().unwrap_or_else(|| self.start.clone()),
            end: patch.end.clone().unwrap_or_else(|| self.end.clone()),
        }
    }

    /// Rejects values the loop cannot run with. A one-sided schedule is
    /// tolerated (the missing edge stays disabled) but warned about.
    pub fn validate(&self) -> Result<()> {
        if self.interval_minutes == 0 {
            return Err(PresenceError::InvalidOption(
                "intervalMinutes must be positive".to_string(),
            ));
        }
        if !is_slack_url(&self.slack_url) {
            return Err(PresenceError::InvalidOption(format!(
                "slackUrl must be an https slack.com URL, got {:?}",
                self.slack_url
            )));
        }
        if self.start.is_some() != self.end.is_some() {
            warn!("Only one of start/end schedule times is set; the missing edge is disabled");
        }
        Ok(())
    }
}

/// Allow-list predicate for the target URL: https, host slack.com or a
/// subdomain of it.
pub fn is_slack_url(s: &str) -> bool {
    let Ok(url) = Url::parse(s) else {
        return false;
    };
    if url.scheme() != "https" {
        return false;
    }
    match url.host_str() {
        Some(host) => host == "slack.com" || host.ends_with(".slack.com"),
        None => false,
    }
}

/// Reads options from `path`, merging the file's contents over the built-in
/// defaults. A missing or corrupt file yields the defaults.
pub fn read_options(path: &Path) -> Options {
    let defaults = Options::default();
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<OptionsPatch>(&content) {
            Ok(patch) => {
                let options = defaults.merged(&patch);
                info!("Options read from {}", path.display());
                options
            }
            Err(e) => {
                warn!(
                    "Failed to parse {}, using default options: {}",
                    path.display(),
                    e
                );
                defaults
            }
        },
        Err(_) => {
            info!("No options file at {}, using defaults", path.display());
            defaults
        }
    }
}

/// Atomically replaces the options file: the new contents are written to a
/// temporary file in the same directory and renamed over the target, so a
/// reader never observes a partial document.
pub fn write_options(path: &Path, options: &Options) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    serde_json::to_writer_pretty(tmp.as_file_mut(), options)?;
    tmp.persist(path).map_err(|e| PresenceError::IoError(e.error))?;

    debug!("Options saved to {}", path.display());
    Ok(())
}
