//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::util::{is_http_url, normalize_text_option};
use tether_core::{EngineConfig, ResolutionStrategy};

const CONFIG_FILE_NAME: &str = "cli-config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default)]
    pub upload_batch_size: Option<usize>,
    #[serde(default)]
    pub download_limit: Option<usize>,
    #[serde(default)]
    pub auto_sync_interval_secs: Option<u64>,
    #[serde(default)]
    pub conflict_resolution: Option<ResolutionStrategy>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tether")
        .join(CONFIG_FILE_NAME)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path();
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        if let Some(profile) = normalize_profile_name(explicit) {
            return profile;
        }
        if let Some(profile) =
            normalize_profile_name(std::env::var("TETHER_PROFILE").ok().as_deref())
        {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(self.active_profile.as_deref()) {
            return profile;
        }
        "default".to_string()
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    /// Apply `TETHER_*` overrides read through `lookup`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        let text = |key: &str| normalize_text_option(lookup(key));

        if let Some(value) = text("TETHER_API_BASE_URL") {
            self.api_base_url = Some(value);
        }
        if let Some(value) = text("TETHER_TENANT_ID") {
            self.tenant_id = Some(value);
        }
        if let Some(value) = text("TETHER_ACCESS_TOKEN") {
            self.access_token = Some(value);
        }
        if let Some(value) = text("TETHER_UPLOAD_BATCH_SIZE") {
            self.upload_batch_size = Some(parse_env_number("TETHER_UPLOAD_BATCH_SIZE", &value)?);
        }
        if let Some(value) = text("TETHER_DOWNLOAD_LIMIT") {
            self.download_limit = Some(parse_env_number("TETHER_DOWNLOAD_LIMIT", &value)?);
        }
        if let Some(value) = text("TETHER_AUTO_SYNC_INTERVAL") {
            self.auto_sync_interval_secs =
                Some(parse_env_number("TETHER_AUTO_SYNC_INTERVAL", &value)?);
        }
        if let Some(value) = text("TETHER_CONFLICT_RESOLUTION") {
            self.conflict_resolution = Some(
                value
                    .parse()
                    .map_err(|error| format!("TETHER_CONFLICT_RESOLUTION: {error}"))?,
            );
        }
        Ok(self)
    }

    /// API URL and tenant, when both are configured
    pub fn sync_target(&self) -> Option<(String, String)> {
        Some((
            normalize_text_option(self.api_base_url.clone())?,
            normalize_text_option(self.tenant_id.clone())?,
        ))
    }

    pub fn auto_sync_interval(&self) -> Option<Duration> {
        self.auto_sync_interval_secs.map(Duration::from_secs)
    }

    /// Engine settings for this profile on the given device
    pub fn engine_config(&self, device_id: &str, tenant_id: &str) -> EngineConfig {
        let mut config = EngineConfig::new(device_id, tenant_id);
        if let Some(size) = self.upload_batch_size {
            config = config.with_upload_batch_size(size);
        }
        if let Some(limit) = self.download_limit {
            config = config.with_download_limit(limit);
        }
        if let Some(strategy) = self.conflict_resolution {
            config = config.with_conflict_resolution(strategy);
        }
        if let Some(interval) = self.auto_sync_interval() {
            config = config.with_auto_sync_interval(interval);
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = normalize_text_option(self.api_base_url.clone()) {
            if !is_http_url(&url) {
                return Err("api_base_url must include http:// or https://".to_string());
            }
        }
        if self.upload_batch_size == Some(0) {
            return Err("upload_batch_size must be positive".to_string());
        }
        if self.download_limit == Some(0) {
            return Err("download_limit must be positive".to_string());
        }
        if self.auto_sync_interval_secs == Some(0) {
            return Err("auto_sync_interval must be positive".to_string());
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.api_base_url = normalize_text_option(self.api_base_url.clone())
            .map(|url| url.trim_end_matches('/').to_string());
        self.tenant_id = normalize_text_option(self.tenant_id.clone());
        self.access_token = normalize_text_option(self.access_token.clone());
    }
}

fn parse_env_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{key} must be a positive number, got '{value}'"))
}
