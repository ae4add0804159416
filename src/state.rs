use crate::{
    blob::{BlobStore, FileBlobStore},
    channel_filter::ChannelFilter,
    config::Config,
    metrics::{codec, RollingStore},
    rewards::RewardTiers,
    scheduler::JobGuards,
    settings::Settings,
};
use anyhow::Result;
use serenity::all::{ChannelId, GuildId, UserId};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};

const METRICS_FILE: &str = "metrics.json";
const SETTINGS_FILE: &str = "settings.toml";

/// Everything the event handlers and background jobs share
pub struct State {
    pub cfg: Config,
    pub channel_filter: RwLock<ChannelFilter>,
    pub reward_tiers: RewardTiers,
    pub store: Mutex<RollingStore>,
    pub metrics_blob: Box<dyn BlobStore>,
    pub jobs: JobGuards,
    scheduler_started: AtomicBool,
}

impl State {
    /// Load settings and metrics from the configured state directory.
    pub async fn load(cfg: Config) -> Result<Self> {
        let dir = cfg.state_dir()?;
        let settings_blob = FileBlobStore::new(dir.join(SETTINGS_FILE));
        let metrics_blob = FileBlobStore::new(dir.join(METRICS_FILE));
        Self::with_blobs(cfg, Box::new(metrics_blob), &settings_blob).await
    }

    pub async fn with_blobs(
        cfg: Config,
        metrics_blob: Box<dyn BlobStore>,
        settings_blob: &dyn BlobStore,
    ) -> Result<Self> {
        let settings = Settings::load(settings_blob).await?;
        let store = codec::load_store(
            metrics_blob.as_ref(),
            cfg.metrics.num_tracked_days,
            cfg.metrics.pad_side,
        )
        .await?;

        Ok(Self {
            reward_tiers: settings.reward_tiers(cfg.rewards.kings_count),
            channel_filter: RwLock::new(settings.metric_channels),
            store: Mutex::new(store),
            metrics_blob,
            jobs: JobGuards::default(),
            scheduler_started: AtomicBool::new(false),
            cfg,
        })
    }

    /// Count a message toward `author`'s activity.  Only messages from someone other than the bot
    /// (`self_id`), posted in an eligible channel of the tracked guild, count.  Returns whether it
    /// counted.
    pub async fn count_message(
        &self,
        author: UserId,
        channel: ChannelId,
        guild: Option<GuildId>,
        self_id: UserId,
    ) -> bool {
        // DMs and other guilds the bot happens to be in don't count.
        if author == self_id || guild != Some(self.cfg.general.guild_id) {
            return false;
        }

        if !self.channel_filter.read().await.is_eligible(channel) {
            return false;
        }

        self.store.lock().await.increment(author, 1);
        true
    }

    /// True exactly once: for whoever gets to start the background jobs.  Discord sends `Ready`
    /// again after every reconnect.
    pub fn claim_scheduler(&self) -> bool {
        !self.scheduler_started.swap(true, Ordering::SeqCst)
    }
}
