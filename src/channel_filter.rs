//! Which channels count toward activity metrics

use crate::{
    discord::{ChannelDirectory, ChannelInfo},
    log_internal, log_warn,
    rewards::with_timeout,
};
use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, ChannelType};
use std::{collections::HashSet, time::Duration};
use tokio::sync::RwLock;

/// Include/exclude rules plus the set of channels they currently resolve to.
///
/// An excluded channel is never eligible.  Otherwise a channel is eligible if it is included by
/// ID or sits in an included category.  Category membership is only known after
/// [`ChannelFilter::rebuild_cache`]; until then only the ID rules apply.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ChannelFilter {
    #[serde(default)]
    pub include_categories: HashSet<ChannelId>,
    #[serde(default)]
    pub include_channels: HashSet<ChannelId>,
    #[serde(default)]
    pub exclude_channels: HashSet<ChannelId>,
    #[serde(skip)]
    cache: Option<HashSet<ChannelId>>,
}

impl ChannelFilter {
    pub fn is_eligible(&self, channel_id: ChannelId) -> bool {
        match &self.cache {
            Some(cache) => cache.contains(&channel_id),
            None => self.matches_id(channel_id),
        }
    }

    #[cfg(test)]
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Resolve the rules against the guild's current channel list.
    pub fn rebuild_cache(&mut self, channels: &[ChannelInfo]) {
        let cache = channels
            .iter()
            .filter(|channel| channel.kind != ChannelType::Category)
            .filter(|channel| self.matches_channel(channel))
            .map(|channel| channel.id)
            .collect();
        self.cache = Some(cache);
    }

    fn matches_id(&self, channel_id: ChannelId) -> bool {
        !self.exclude_channels.contains(&channel_id) && self.include_channels.contains(&channel_id)
    }

    fn matches_channel(&self, channel: &ChannelInfo) -> bool {
        if self.exclude_channels.contains(&channel.id) {
            return false;
        }

        self.matches_id(channel.id)
            || channel
                .parent_id
                .is_some_and(|parent| self.include_categories.contains(&parent))
    }
}

/// Refetch the channel list and rebuild `filter`'s cache.
///
/// The lock is only taken to swap in the result.  If the fetch fails or takes longer than
/// `call_timeout` the previous cache, or the ID-only fallback, stays in effect.
pub async fn refresh(
    filter: &RwLock<ChannelFilter>,
    directory: &dyn ChannelDirectory,
    call_timeout: Duration,
) {
    let channels = match with_timeout(call_timeout, directory.list_channels()).await {
        Ok(channels) => channels,
        Err(e) => {
            log_warn!("Could not fetch guild channels, keeping channel filter: {}", e);
            return;
        }
    };

    let mut filter = filter.write().await;
    filter.rebuild_cache(&channels);
    log_internal!(
        "Counting activity in {} of {} channel(s)",
        filter.cache.as_ref().map_or(0, HashSet::len),
        channels.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn id(n: u64) -> ChannelId {
        ChannelId::new(n)
    }

    fn text(n: u64, parent: Option<u64>) -> ChannelInfo {
        ChannelInfo {
            id: id(n),
            parent_id: parent.map(id),
            kind: ChannelType::Text,
        }
    }

    fn category(n: u64) -> ChannelInfo {
        ChannelInfo {
            id: id(n),
            parent_id: None,
            kind: ChannelType::Category,
        }
    }

    fn filter() -> ChannelFilter {
        ChannelFilter {
            include_categories: [id(100)].into(),
            include_channels: [id(1), id(2)].into(),
            exclude_channels: [id(2), id(12)].into(),
            ..Default::default()
        }
    }

    fn guild() -> Vec<ChannelInfo> {
        vec![
            category(100),
            category(200),
            text(1, None),
            text(2, Some(200)),
            text(11, Some(100)),
            text(12, Some(100)),
            text(21, Some(200)),
        ]
    }

    struct FakeDirectory(Option<Vec<ChannelInfo>>);

    #[serenity::async_trait]
    impl ChannelDirectory for FakeDirectory {
        async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
            self.0.clone().ok_or_else(|| anyhow!("503 Service Unavailable"))
        }
    }

    struct HangingDirectory;

    #[serenity::async_trait]
    impl ChannelDirectory for HangingDirectory {
        async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
            std::future::pending().await
        }
    }

    #[test]
    fn stale_filter_uses_id_rules_only() {
        let filter = filter();
        assert!(!filter.is_cached());
        assert!(filter.is_eligible(id(1)));
        assert!(!filter.is_eligible(id(2)));
        // In an included category, but categories are unknown until the cache is built.
        assert!(!filter.is_eligible(id(11)));
        assert!(!filter.is_eligible(id(21)));
    }

    #[test]
    fn cached_filter_expands_categories() {
        let mut filter = filter();
        filter.rebuild_cache(&guild());

        assert!(filter.is_cached());
        assert!(filter.is_eligible(id(1)));
        assert!(filter.is_eligible(id(11)));
        assert!(!filter.is_eligible(id(21)));
        assert!(!filter.is_eligible(id(100)));
    }

    #[test]
    fn exclusion_wins_in_both_states() {
        let mut filter = filter();
        assert!(!filter.is_eligible(id(2)));

        filter.rebuild_cache(&guild());
        // Included by ID and excluded
        assert!(!filter.is_eligible(id(2)));
        // Included by category and excluded
        assert!(!filter.is_eligible(id(12)));
    }

    #[test]
    fn rebuild_replaces_previous_cache() {
        let mut filter = filter();
        filter.rebuild_cache(&guild());
        assert!(filter.is_eligible(id(11)));

        // Channel 11 moved out of the included category
        let mut moved = guild();
        moved.retain(|c| c.id != id(11));
        moved.push(text(11, Some(200)));
        filter.rebuild_cache(&moved);
        assert!(!filter.is_eligible(id(11)));
    }

    #[test]
    fn rules_round_trip_through_toml_without_cache() {
        let mut filter = filter();
        filter.rebuild_cache(&guild());

        let text = toml::to_string(&filter).unwrap();
        let parsed: ChannelFilter = toml::from_str(&text).unwrap();

        assert!(!parsed.is_cached());
        assert_eq!(parsed.include_categories, filter.include_categories);
        assert_eq!(parsed.include_channels, filter.include_channels);
        assert_eq!(parsed.exclude_channels, filter.exclude_channels);
    }

    #[tokio::test]
    async fn refresh_builds_cache() {
        let lock = RwLock::new(filter());
        refresh(&lock, &FakeDirectory(Some(guild())), TIMEOUT).await;
        assert!(lock.read().await.is_eligible(id(11)));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_state() {
        let lock = RwLock::new(filter());
        refresh(&lock, &FakeDirectory(None), TIMEOUT).await;
        assert!(!lock.read().await.is_cached());

        refresh(&lock, &FakeDirectory(Some(guild())), TIMEOUT).await;
        refresh(&lock, &FakeDirectory(None), TIMEOUT).await;
        assert!(lock.read().await.is_eligible(id(11)));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_channel_fetch_gives_up() {
        let lock = RwLock::new(filter());
        refresh(&lock, &FakeDirectory(Some(guild())), TIMEOUT).await;

        let started = tokio::time::Instant::now();
        refresh(&lock, &HangingDirectory, TIMEOUT).await;

        assert!(started.elapsed() >= TIMEOUT);
        assert!(lock.read().await.is_eligible(id(11)));
    }
}
