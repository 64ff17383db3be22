use encore_core::util::{is_http_url, normalize_text_option};
use encore_core::Role;
use uuid::Uuid;

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            supabase_url,
            supabase_anon_key,
            access_token,
            voter_id,
            role,
            no_activate,
        } => {
            let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            apply_profile_init(
                config.profile_mut_or_default(&profile_name),
                ProfileInit {
                    supabase_url,
                    supabase_anon_key,
                    access_token,
                    voter_id,
                    role: role.map(Role::from),
                },
            )?;
            if !no_activate {
                config.active_profile = Some(profile_name.clone());
            }

            let path = config.save().map_err(CliError::Config)?;
            println!(
                "Profile '{}' initialized at {}",
                profile_name,
                path.display()
            );

            let missing = config
                .profile(&profile_name)
                .map(missing_fields)
                .unwrap_or_default();
            if missing.is_empty() {
                println!("Profile '{profile_name}' is ready. Run `encore queue`.");
            } else {
                println!(
                    "Profile '{}' is missing: {}",
                    profile_name,
                    missing.join(", ")
                );
            }
            Ok(())
        }
        ConfigCommands::Show { profile } => {
            let config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let Some(profile) = config.profile(&profile_name) else {
                return Err(CliError::Config(format!(
                    "Profile '{profile_name}' does not exist"
                )));
            };
            for line in describe_profile(&profile_name, profile) {
                println!("{line}");
            }
            Ok(())
        }
    }
}

/// Values passed to `config init`; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct ProfileInit {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub access_token: Option<String>,
    pub voter_id: Option<String>,
    pub role: Option<Role>,
}

pub fn apply_profile_init(profile: &mut CliProfile, init: ProfileInit) -> Result<(), CliError> {
    let supabase_url = normalize_text_option(init.supabase_url)
        .or_else(|| normalize_text_option(std::env::var("SUPABASE_URL").ok()));
    if let Some(url) = supabase_url {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "supabase_url must include http:// or https://".to_string(),
            ));
        }
        profile.supabase_url = Some(url.trim_end_matches('/').to_string());
    }

    let anon_key = normalize_text_option(init.supabase_anon_key)
        .or_else(|| normalize_text_option(std::env::var("SUPABASE_ANON_KEY").ok()));
    if let Some(key) = anon_key {
        profile.supabase_anon_key = Some(key);
    }
    if let Some(token) = normalize_text_option(init.access_token) {
        profile.access_token = Some(token);
    }
    if let Some(voter_id) = normalize_text_option(init.voter_id) {
        profile.voter_id = Some(voter_id);
    }
    if profile.voter_id.is_none() {
        profile.voter_id = Some(Uuid::new_v4().to_string());
    }
    if let Some(role) = init.role {
        profile.role = role;
    }

    Ok(())
}

pub fn missing_fields(profile: &CliProfile) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if profile.supabase_url.is_none() {
        missing.push("supabase_url");
    }
    if profile.supabase_anon_key.is_none() {
        missing.push("supabase_anon_key");
    }
    if profile.role == Role::Operator && profile.access_token.is_none() {
        missing.push("access_token");
    }
    missing
}

pub fn describe_profile(name: &str, profile: &CliProfile) -> Vec<String> {
    let secret = |present: bool| if present { "set" } else { "missing" };
    vec![
        format!("profile:           {name}"),
        format!(
            "supabase_url:      {}",
            profile.supabase_url.as_deref().unwrap_or("missing")
        ),
        format!("supabase_anon_key: {}", secret(profile.supabase_anon_key.is_some())),
        format!("access_token:      {}", secret(profile.access_token.is_some())),
        format!(
            "voter_id:          {}",
            profile.voter_id.as_deref().unwrap_or("missing")
        ),
        format!(
            "role:              {}",
            match profile.role {
                Role::Guest => "guest",
                Role::Operator => "operator",
            }
        ),
    ]
}
