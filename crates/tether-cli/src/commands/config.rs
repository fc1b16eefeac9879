use tether_core::util::normalize_text_option;

use crate::cli::{ConfigCommands, StrategyArg};
use crate::commands::common::load_profile;
use crate::config_profiles::{default_config_path, CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            tenant_id,
            access_token,
            upload_batch_size,
            download_limit,
            auto_sync_interval,
            conflict_resolution,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            ProfileUpdate {
                api_base_url,
                tenant_id,
                access_token,
                upload_batch_size,
                download_limit,
                auto_sync_interval,
                conflict_resolution,
            },
            no_activate,
        ),
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
    }
}

/// Values passed to `config init`; `None` keeps the stored value
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub api_base_url: Option<String>,
    pub tenant_id: Option<String>,
    pub access_token: Option<String>,
    pub upload_batch_size: Option<usize>,
    pub download_limit: Option<usize>,
    pub auto_sync_interval: Option<u64>,
    pub conflict_resolution: Option<StrategyArg>,
}

impl ProfileUpdate {
    pub fn apply_to(self, profile: &mut CliProfile) {
        if let Some(value) = normalize_text_option(self.api_base_url) {
            profile.api_base_url = Some(value.trim_end_matches('/').to_string());
        }
        if let Some(value) = normalize_text_option(self.tenant_id) {
            profile.tenant_id = Some(value);
        }
        if let Some(value) = normalize_text_option(self.access_token) {
            profile.access_token = Some(value);
        }
        if let Some(value) = self.upload_batch_size {
            profile.upload_batch_size = Some(value);
        }
        if let Some(value) = self.download_limit {
            profile.download_limit = Some(value);
        }
        if let Some(value) = self.auto_sync_interval {
            profile.auto_sync_interval_secs = Some(value);
        }
        if let Some(value) = self.conflict_resolution {
            profile.conflict_resolution = Some(value.into());
        }
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    update.apply_to(profile);
    profile.validate().map_err(CliError::Config)?;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let profile = config
        .profiles
        .get(&profile_name)
        .ok_or_else(|| CliError::Config("Failed to persist profile".to_string()))?;
    let missing_fields = missing_profile_fields(profile);
    if missing_fields.is_empty() {
        println!("Profile '{profile_name}' is ready. Run `tether sync`.");
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let (name, mut profile) = load_profile(profile_name)?;
    if profile.access_token.is_some() {
        profile.access_token = Some("[REDACTED]".to_string());
    }

    println!("# {} (profile '{name}')", default_config_path().display());
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

pub fn missing_profile_fields(profile: &CliProfile) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if normalize_text_option(profile.api_base_url.clone()).is_none() {
        missing.push("api_base_url");
    }
    if normalize_text_option(profile.tenant_id.clone()).is_none() {
        missing.push("tenant_id");
    }
    missing
}
