//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use tally_core::Config;

use crate::output::{Output, OutputFormat};

const VALID_KEYS: &str = "data_dir, document_id, api_base_url, auth_scheme, token, \
     credential_ttl_minutes, sync_interval_minutes, persist_wait_ms, request_timeout_secs, \
     document_version, log_file";

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let token = config.token.as_ref().map(|_| "(set)");

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "document_id": config.document_id,
                    "api_base_url": config.api_base_url,
                    "auth_scheme": config.auth_scheme,
                    "token": token,
                    "credential_ttl_minutes": config.credential_ttl_minutes,
                    "sync_interval_minutes": config.sync_interval_minutes,
                    "persist_wait_ms": config.persist_wait_ms,
                    "request_timeout_secs": config.request_timeout_secs,
                    "document_version": config.document_version,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:               {}", config.data_dir.display());
            println!(
                "  document_id:            {}",
                config.document_id.as_deref().unwrap_or("(not set, local only)")
            );
            println!("  api_base_url:           {}", config.api_base_url);
            println!("  auth_scheme:            {}", config.auth_scheme);
            println!("  token:                  {}", token.unwrap_or("(not set)"));
            println!("  credential_ttl_minutes: {}", config.credential_ttl_minutes);
            println!("  sync_interval_minutes:  {}", config.sync_interval_minutes);
            println!("  persist_wait_ms:        {}", config.persist_wait_ms);
            println!("  request_timeout_secs:   {}", config.request_timeout_secs);
            println!("  document_version:       {}", config.document_version);
            println!(
                "  log_file:               {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);

    // File values only; TALLY_* overrides stay out of the saved file
    let mut config =
        Config::load_file_only(&save_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;

    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    let shown = if key == "token" { "(set)" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "document_id" => config.document_id = optional(value),
        "api_base_url" => config.api_base_url = value.to_string(),
        "auth_scheme" => config.auth_scheme = value.to_string(),
        "token" => config.token = optional(value),
        "credential_ttl_minutes" => config.credential_ttl_minutes = number(key, value)?,
        "sync_interval_minutes" => config.sync_interval_minutes = number(key, value)?,
        "persist_wait_ms" => config.persist_wait_ms = number(key, value)?,
        "request_timeout_secs" => config.request_timeout_secs = number(key, value)?,
        "document_version" => config.document_version = value.to_string(),
        "log_file" => config.log_file = optional(value).map(PathBuf::from),
        _ => bail!(
            "Unknown configuration key: '{}'\nValid keys: {}",
            key,
            VALID_KEYS
        ),
    }
    Ok(())
}

/// Empty or "none" clears an optional setting
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

fn number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .with_context(|| format!("Invalid value for {}. Use a whole number.", key))
}
