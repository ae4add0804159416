use crate::{metrics::PadSide, rewards::ReconcileOptions};
use anyhow::{anyhow, Result};
use serenity::all::GuildId;
use std::{path::PathBuf, time::Duration};
use tokio::io::AsyncReadExt;

const CONFIG_DIR_REL_HOME: &str = ".config/alicebot";
const CONFIG_FILE: &str = "config.toml";
const TOKEN_ENV_VAR: &str = "DISCORD_TOKEN";
/// Largest member page Discord will serve
const MAX_MEMBER_PAGE_SIZE: u64 = 1000;

/// Bot configuration
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Config {
    pub general: General,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub rewards: Rewards,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct General {
    /// May be left empty and provided through `DISCORD_TOKEN` instead
    #[serde(default)]
    pub discord_token: String,
    /// The guild whose activity is tracked and rewarded
    pub guild_id: GuildId,
    /// Where metrics and settings are kept.  Defaults to the configuration directory.
    pub state_dir: Option<PathBuf>,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Metrics {
    pub num_tracked_days: usize,
    pub pad_side: PadSide,
}

/// Job periods in seconds
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub cumulation_seconds: u64,
    pub persist_metrics_seconds: u64,
    pub update_rewards_seconds: u64,
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Rewards {
    pub kings_count: usize,
    pub member_page_size: u64,
    pub call_timeout_seconds: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            num_tracked_days: 7,
            pad_side: PadSide::Front,
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            cumulation_seconds: 300,
            persist_metrics_seconds: 300,
            update_rewards_seconds: 300,
        }
    }
}

impl Default for Rewards {
    fn default() -> Self {
        Self {
            kings_count: 6,
            member_page_size: MAX_MEMBER_PAGE_SIZE,
            call_timeout_seconds: 10,
        }
    }
}

impl Config {
    fn config_dir() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|p| p.join(CONFIG_DIR_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    pub async fn load() -> Result<Self> {
        let path = Self::config_dir()?.join(CONFIG_FILE);

        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            anyhow!(
                "Could not open configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).await.map_err(|e| {
            anyhow!(
                "Could not read configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        let mut config = Self::parse(&contents).map_err(|e| {
            anyhow!(
                "Could not parse configuration at `{}`: {}",
                path.to_string_lossy(),
                e
            )
        })?;

        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            config.general.discord_token = token;
        }
        if config.general.discord_token.is_empty() {
            return Err(anyhow!(
                "No Discord token in `{}` or `{}`",
                path.to_string_lossy(),
                TOKEN_ENV_VAR
            ));
        }

        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.metrics.num_tracked_days == 0 {
            return Err(anyhow!("metrics.num_tracked_days must be at least 1"));
        }
        if !(1..=MAX_MEMBER_PAGE_SIZE).contains(&self.rewards.member_page_size) {
            return Err(anyhow!(
                "rewards.member_page_size must be between 1 and {}",
                MAX_MEMBER_PAGE_SIZE
            ));
        }
        for (name, secs) in [
            ("schedule.cumulation_seconds", self.schedule.cumulation_seconds),
            ("schedule.persist_metrics_seconds", self.schedule.persist_metrics_seconds),
            ("schedule.update_rewards_seconds", self.schedule.update_rewards_seconds),
            ("rewards.call_timeout_seconds", self.rewards.call_timeout_seconds),
        ] {
            if secs == 0 {
                return Err(anyhow!("{} must be at least 1", name));
            }
        }
        Ok(())
    }

    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.general.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::config_dir(),
        }
    }

    /// Limit for any single Discord API call made outside an event reply
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.rewards.call_timeout_seconds)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            page_size: self.rewards.member_page_size,
            call_timeout: self.call_timeout(),
        }
    }
}
