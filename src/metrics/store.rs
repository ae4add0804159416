use serde::{Deserialize, Serialize};
use serenity::all::UserId;
use std::{
    collections::HashMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Where zero buckets go when a restored window is shorter than the configured length.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PadSide {
    /// Missing days are treated as the most recent ones, i.e. no recent activity.
    #[default]
    Front,
    /// Missing days are treated as the oldest ones.
    Back,
}

/// Per-user message counts over the last `num_days` periods.
///
/// Every window is exactly `num_days` long.  Index 0 is the current period and collects new
/// activity; the last index is the oldest period and falls off on the next cumulation step.
pub struct RollingStore {
    users: HashMap<UserId, Vec<u64>>,
    num_days: usize,
    pad_side: PadSide,
    last_cumulation: Option<SystemTime>,
    dirty: bool,
}

/// Serializable image of a [`RollingStore`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Unix seconds
    pub last_cumulation: Option<u64>,
    pub users: Vec<UserWindow>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserWindow {
    pub user_id: UserId,
    pub buckets: Vec<u64>,
}

impl RollingStore {
    pub fn new(num_days: usize, pad_side: PadSide) -> Self {
        Self {
            users: HashMap::new(),
            // A zero-length window has no median and nowhere to count.
            num_days: num_days.max(1),
            pad_side,
            last_cumulation: None,
            dirty: false,
        }
    }

    #[cfg(test)]
    pub fn num_days(&self) -> usize {
        self.num_days
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[cfg(test)]
    pub fn window(&self, user: UserId) -> Option<&[u64]> {
        self.users.get(&user).map(Vec::as_slice)
    }

    pub fn last_cumulation(&self) -> Option<SystemTime> {
        self.last_cumulation
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Count `amount` messages for `user` in the current period.
    pub fn increment(&mut self, user: UserId, amount: u64) {
        let num_days = self.num_days;
        let window = self
            .users
            .entry(user)
            .or_insert_with(|| vec![0; num_days]);
        window[0] = window[0].saturating_add(amount);
        self.dirty = true;
    }

    /// Age every window by one period and forget users with no remaining activity.
    ///
    /// Not idempotent: calling this twice in one period ages the data twice.
    pub fn step_cumulation(&mut self) {
        let num_days = self.num_days;
        self.users.retain(|_, window| {
            window.insert(0, 0);
            window.truncate(num_days);
            window.iter().any(|&count| count != 0)
        });
        self.last_cumulation = Some(SystemTime::now());
        self.dirty = true;
    }

    /// Median of the user's window, or 0 for unknown users.
    #[cfg(test)]
    pub fn median(&self, user: UserId) -> u64 {
        self.users
            .get(&user)
            .map(|window| median(window))
            .unwrap_or(0)
    }

    pub fn medians(&self) -> Vec<(UserId, u64)> {
        self.users
            .iter()
            .map(|(user, window)| (*user, median(window)))
            .collect()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut users: Vec<UserWindow> = self
            .users
            .iter()
            .map(|(user_id, buckets)| UserWindow {
                user_id: *user_id,
                buckets: buckets.clone(),
            })
            .collect();
        users.sort_by_key(|entry| entry.user_id);

        MetricsSnapshot {
            last_cumulation: self
                .last_cumulation
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
            users,
        }
    }

    /// Replace the store's contents with `snapshot`, normalizing every window to the configured
    /// length.
    pub fn restore(&mut self, snapshot: MetricsSnapshot) {
        self.last_cumulation = snapshot
            .last_cumulation
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));

        self.users = snapshot
            .users
            .into_iter()
            .map(|entry| {
                let window = normalize(entry.buckets, self.num_days, self.pad_side);
                (entry.user_id, window)
            })
            .collect();

        self.dirty = false;
    }
}

/// Median of `window` sorted ascending.  Even lengths average the two central values, rounding
/// down.
pub fn median(window: &[u64]) -> u64 {
    if window.is_empty() {
        return 0;
    }

    let mut sorted = window.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        let (a, b) = (sorted[mid - 1], sorted[mid]);
        // floor((a + b) / 2) without overflowing
        a / 2 + b / 2 + (a % 2 + b % 2) / 2
    } else {
        sorted[mid]
    }
}

fn normalize(mut window: Vec<u64>, num_days: usize, pad_side: PadSide) -> Vec<u64> {
    if window.len() < num_days {
        let missing = num_days - window.len();
        match pad_side {
            PadSide::Front => {
                window.splice(0..0, std::iter::repeat(0).take(missing));
            }
            PadSide::Back => window.resize(num_days, 0),
        }
    }
    window.truncate(num_days);
    window
}
