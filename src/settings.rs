use crate::{
    blob::BlobStore,
    channel_filter::ChannelFilter,
    log_internal,
    rewards::{RewardRole, RewardTiers},
};
use anyhow::{anyhow, Result};
use serenity::all::RoleId;

/// Guild-specific settings, kept next to the metrics
#[derive(serde::Serialize, serde::Deserialize, Clone, Default)]
pub struct Settings {
    /// Role for the most active users
    #[serde(default)]
    pub kings_role: Option<RoleId>,
    #[serde(default)]
    pub metric_channels: ChannelFilter,
    #[serde(default)]
    pub reward_roles: Vec<RewardRole>,
}

impl Settings {
    /// Load settings from `blob`, writing out the defaults if there are none yet.
    pub async fn load(blob: &dyn BlobStore) -> Result<Self> {
        let Some(bytes) = blob.load().await? else {
            log_internal!(
                "No settings at `{}`, saving defaults",
                blob.describe()
            );
            let settings = Self::default();
            settings.save(blob).await?;
            return Ok(settings);
        };

        let contents = String::from_utf8(bytes)
            .map_err(|e| anyhow!("Could not read settings at `{}`: {}", blob.describe(), e))?;
        let settings: Settings = toml::from_str(&contents)
            .map_err(|e| anyhow!("Could not parse settings at `{}`: {}", blob.describe(), e))?;

        log_internal!(
            "Loaded settings: {} reward role(s), kings role {}",
            settings.reward_roles.len(),
            if settings.kings_role.is_some() {
                "set"
            } else {
                "unset"
            }
        );

        Ok(settings)
    }

    pub async fn save(&self, blob: &dyn BlobStore) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Could not serialize settings: {}", e))?;
        blob.save(contents.as_bytes()).await
    }

    pub fn reward_tiers(&self, kings_count: usize) -> RewardTiers {
        RewardTiers {
            kings_role: self.kings_role,
            kings_count,
            thresholds: self.reward_roles.clone(),
        }
    }
}
