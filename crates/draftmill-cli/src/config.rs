use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use draftmill_drafting::VoiceProfile;
use draftmill_scheduler::{validate_spec, ScheduleSpec};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub slack: SlackSettings,
    #[serde(default)]
    pub tldv: TldvSettings,
    #[serde(default)]
    pub drafting: DraftingSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub voice: VoiceProfile,
    #[serde(default)]
    pub schedules: ScheduleSettings,
    /// Stub drafter, in-memory store, no transcript provider. For local
    /// poking without credentials.
    #[serde(default)]
    pub offline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackSettings {
    pub bot_token: String,
    pub owner_channel: String,
    pub owner_user_id: String,
    #[serde(default = "default_poll_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_interactions_port")]
    pub interactions_port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TldvSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_tldv_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftingSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_drafting_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_poll_schedule")]
    pub poll: ScheduleSpec,
    #[serde(default = "default_cycle_schedule")]
    pub content_cycle: ScheduleSpec,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            poll: default_poll_schedule(),
            content_cycle: default_cycle_schedule(),
        }
    }
}

fn default_poll_secs() -> u64 {
    5
}

fn default_interactions_port() -> u16 {
    8080
}

fn default_tldv_base() -> String {
    "https://pasta.tldv.io".to_string()
}

fn default_drafting_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_poll_schedule() -> ScheduleSpec {
    ScheduleSpec::every_minutes(30)
}

fn default_cycle_schedule() -> ScheduleSpec {
    ScheduleSpec::Cron {
        expr: "0 9 * * Mon,Wed,Fri".to_string(),
        tz: "UTC".to_string(),
    }
}

pub fn load(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: AppConfig =
        serde_yaml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &AppConfig) -> Result<()> {
    validate_spec(&config.schedules.poll).context("poll schedule is invalid")?;
    validate_spec(&config.schedules.content_cycle).context("content-cycle schedule is invalid")?;
    if !config.offline {
        anyhow::ensure!(!config.drafting.api_key.is_empty(), "drafting.api_key is required");
        anyhow::ensure!(!config.store.api_base.is_empty(), "store.api_base is required");
        anyhow::ensure!(!config.tldv.api_key.is_empty(), "tldv.api_key is required");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
slack:
  bot_token: xoxb-test
  owner_channel: D123
  owner_user_id: U456
offline: true
"#;

    #[test]
    fn minimal_offline_config_parses_with_defaults() {
        let config: AppConfig = serde_yaml::from_str(MINIMAL).unwrap();
        validate(&config).unwrap();
        assert!(config.offline);
        assert_eq!(config.slack.poll_interval_secs, 5);
        assert_eq!(config.schedules.poll, ScheduleSpec::every_minutes(30));
        assert!(matches!(
            config.schedules.content_cycle,
            ScheduleSpec::Cron { .. }
        ));
    }

    #[test]
    fn online_config_requires_credentials() {
        let mut config: AppConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.offline = false;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn schedule_overrides_are_validated() {
        let yaml = r#"
slack:
  bot_token: xoxb-test
  owner_channel: D123
  owner_user_id: U456
offline: true
schedules:
  poll:
    kind: every
    interval_ms: 60000
  content_cycle:
    kind: cron
    expr: "not a cron"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(validate(&config).is_err());
    }
}
