use serde::Deserialize;

use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;

// Main configuration struct
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub smtp: SmtpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub encryption: String,
    pub username: String,
    pub password: String,
    pub from_name: String,
    pub recipient: String,
    pub subject_prefix: String,
    #[serde(rename = "timeout", default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    20
}

pub fn load_settings(path: &Path) -> Result<Config> {
    let file = File::open(path)
        .with_context(|| format!("cannot open settings file {}", path.display()))?;
    let reader = BufReader::new(file);

    // Parse the YAML file into the Config struct
    let mut config: Config = serde_yaml::from_reader(reader)
        .with_context(|| format!("cannot deserialize settings from {}", path.display()))?;

    apply_env_overrides(&mut config.smtp)?;
    Ok(config)
}

// Environment variables win over the file so a cron entry can retarget a
// run without editing settings.
pub fn apply_env_overrides(smtp: &mut SmtpConfig) -> Result<()> {
    if let Ok(host) = env::var("SMTP_HOST") {
        debug!("overriding smtp host from environment");
        smtp.host = host;
    }
    if let Ok(port) = env::var("SMTP_PORT") {
        smtp.port = port
            .parse()
            .context("SMTP_PORT must be a valid port number")?;
    }
    if let Ok(username) = env::var("SMTP_USERNAME") {
        smtp.username = username;
    }
    if let Ok(password) = env::var("SMTP_PASSWORD") {
        smtp.password = password;
    }
    if let Ok(from_name) = env::var("FROM_NAME") {
        smtp.from_name = from_name;
    }
    if let Ok(recipient) = env::var("SMTP_RECIPIENT") {
        smtp.recipient = recipient;
    }
    if let Ok(prefix) = env::var("SUBJECT_PREFIX") {
        smtp.subject_prefix = prefix;
    }
    Ok(())
}
