//! Reward roles derived from activity medians

use crate::{
    discord::{MemberInfo, MembershipProvider, RoleMutator},
    log_error, log_warn,
    logging::PrintColor,
};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serenity::all::{RoleId, UserId};
use std::{
    collections::{BTreeMap, HashSet},
    future::Future,
    time::Duration,
};

/// Role granted to everyone whose median reaches `threshold`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RewardRole {
    pub role_id: RoleId,
    pub threshold: u64,
}

/// Every reward the bot manages
#[derive(Clone, Debug, Default)]
pub struct RewardTiers {
    /// Rank-based role for the `kings_count` most active users
    pub kings_role: Option<RoleId>,
    pub kings_count: usize,
    pub thresholds: Vec<RewardRole>,
}

/// Which users should hold each managed role
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RoleAssignmentPlan {
    targets: BTreeMap<RoleId, HashSet<UserId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleChange {
    Grant(RoleId),
    Revoke(RoleId),
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub page_size: u64,
    pub call_timeout: Duration,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub members_seen: usize,
    pub granted: usize,
    pub revoked: usize,
    pub failed: usize,
    /// A member page could not be fetched, so later members were not checked
    pub aborted: bool,
}

impl RoleAssignmentPlan {
    pub fn resolve(medians: &[(UserId, u64)], tiers: &RewardTiers) -> Self {
        let mut targets: BTreeMap<RoleId, HashSet<UserId>> = BTreeMap::new();
        if let Some(kings_role) = tiers.kings_role {
            targets.entry(kings_role).or_default();
        }
        for tier in &tiers.thresholds {
            targets.entry(tier.role_id).or_default();
        }

        // Nobody qualifies for anything without activity.
        let mut ranked: Vec<(UserId, u64)> = medians
            .iter()
            .copied()
            .filter(|&(_, median)| median >= 1)
            .collect();
        // Most active first, ties by ascending user ID
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        if let Some(kings_role) = tiers.kings_role {
            let kings = targets.entry(kings_role).or_default();
            kings.extend(ranked.iter().take(tiers.kings_count).map(|&(user, _)| user));
        }

        for tier in &tiers.thresholds {
            let qualified = ranked
                .iter()
                .filter(|&&(_, median)| median >= tier.threshold)
                .map(|&(user, _)| user);
            targets.entry(tier.role_id).or_default().extend(qualified);
        }

        Self { targets }
    }

    #[cfg(test)]
    pub fn targets(&self, role_id: RoleId) -> Option<&HashSet<UserId>> {
        self.targets.get(&role_id)
    }

    /// Grants and revokes that bring `member` in line with the plan.  Roles the plan does not
    /// manage are left alone.
    pub fn changes_for(&self, member: &MemberInfo) -> Vec<RoleChange> {
        self.targets
            .iter()
            .filter_map(|(&role_id, users)| {
                let should_have = users.contains(&member.user_id);
                let has = member.roles.contains(&role_id);
                match (should_have, has) {
                    (true, false) => Some(RoleChange::Grant(role_id)),
                    (false, true) => Some(RoleChange::Revoke(role_id)),
                    _ => None,
                }
            })
            .collect()
    }
}

/// Walk every guild member and apply `plan`.
///
/// Each grant or revoke is attempted once; failures are logged and the pass continues.  A member
/// page that cannot be fetched ends the pass, keeping whatever was already applied.  The next
/// scheduled pass picks up anything missed.
pub async fn reconcile(
    plan: &RoleAssignmentPlan,
    members: &dyn MembershipProvider,
    roles: &dyn RoleMutator,
    opts: ReconcileOptions,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    let mut after: Option<UserId> = None;

    loop {
        let page = match with_timeout(
            opts.call_timeout,
            members.list_members(after, opts.page_size),
        )
        .await
        {
            Ok(page) => page,
            Err(e) => {
                log_warn!("Could not fetch guild members, stopping reward update: {}", e);
                report.aborted = true;
                break;
            }
        };

        let Some(last) = page.last() else {
            break;
        };
        after = Some(last.user_id);
        report.members_seen += page.len();

        for member in &page {
            for change in plan.changes_for(member) {
                let result = match change {
                    RoleChange::Grant(role_id) => {
                        with_timeout(opts.call_timeout, roles.grant_role(member.user_id, role_id))
                            .await
                    }
                    RoleChange::Revoke(role_id) => {
                        with_timeout(opts.call_timeout, roles.revoke_role(member.user_id, role_id))
                            .await
                    }
                };

                match (result, change) {
                    (Ok(()), RoleChange::Grant(_)) => report.granted += 1,
                    (Ok(()), RoleChange::Revoke(_)) => report.revoked += 1,
                    (Err(e), RoleChange::Grant(role_id)) => {
                        report.failed += 1;
                        log_error!(
                            "Failed to add role {} to {}: {}",
                            role_id.color(),
                            member.user_id.color(),
                            e
                        );
                    }
                    (Err(e), RoleChange::Revoke(role_id)) => {
                        report.failed += 1;
                        log_error!(
                            "Failed to remove role {} from {}: {}",
                            role_id.color(),
                            member.user_id.color(),
                            e
                        );
                    }
                }
            }
        }

        if (page.len() as u64) < opts.page_size {
            break;
        }
    }

    report
}

pub async fn with_timeout<T>(limit: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| anyhow!("timed out after {}s", limit.as_secs_f32()))?
}
