//! Periodic background jobs
//!
//! Each job runs on its own interval.  A job never overlaps with itself: a firing that finds the
//! previous run still going is skipped rather than queued.

use crate::{
    config::Schedule,
    discord::{MembershipProvider, RoleMutator},
    log_error, log_internal, log_warn,
    metrics::codec,
    rewards::{reconcile, RoleAssignmentPlan},
    state::State,
};
use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::{
    sync::{Mutex, MutexGuard},
    time::{Instant, MissedTickBehavior},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Job {
    /// Age every activity window by one period
    Cumulation,
    PersistMetrics,
    UpdateRewards,
}

impl Job {
    pub const ALL: [Job; 3] = [Job::Cumulation, Job::PersistMetrics, Job::UpdateRewards];

    pub fn name(self) -> &'static str {
        match self {
            Job::Cumulation => "cumulation",
            Job::PersistMetrics => "persist_metrics",
            Job::UpdateRewards => "update_rewards",
        }
    }

    fn period(self, schedule: &Schedule) -> Duration {
        Duration::from_secs(match self {
            Job::Cumulation => schedule.cumulation_seconds,
            Job::PersistMetrics => schedule.persist_metrics_seconds,
            Job::UpdateRewards => schedule.update_rewards_seconds,
        })
    }
}

/// Run-in-progress markers, one per job
#[derive(Default)]
pub struct JobGuards {
    cumulation: Mutex<()>,
    persist_metrics: Mutex<()>,
    update_rewards: Mutex<()>,
}

impl JobGuards {
    fn guard(&self, job: Job) -> &Mutex<()> {
        match job {
            Job::Cumulation => &self.cumulation,
            Job::PersistMetrics => &self.persist_metrics,
            Job::UpdateRewards => &self.update_rewards,
        }
    }

    /// `None` if `job` is already running
    pub fn try_begin(&self, job: Job) -> Option<MutexGuard<'_, ()>> {
        self.guard(job).try_lock().ok()
    }

    /// Wait for any current run of `job` to finish
    pub async fn begin(&self, job: Job) -> MutexGuard<'_, ()> {
        self.guard(job).lock().await
    }
}

/// Spawn every job.  Cumulation continues from the last recorded step, running at once if a step
/// is overdue.  The other jobs first fire one period from now.
pub fn start<G>(state: Arc<State>, guild: G)
where
    G: MembershipProvider + RoleMutator + Clone + 'static,
{
    for job in Job::ALL {
        let period = job.period(&state.cfg.schedule);
        let state = state.clone();
        let guild = guild.clone();

        tokio::spawn(async move {
            let delay = first_delay(job, &state, period).await;
            log_internal!(
                "Scheduled {} every {}s, next run in {}s",
                job.name(),
                period.as_secs(),
                delay.as_secs()
            );

            let mut interval = tokio::time::interval_at(Instant::now() + delay, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                fire(job, &state, &guild).await;
            }
        });
    }
}

async fn first_delay(job: Job, state: &State, period: Duration) -> Duration {
    match job {
        Job::Cumulation => {
            let last = state.store.lock().await.last_cumulation();
            until_due(last, SystemTime::now(), period)
        }
        Job::PersistMetrics | Job::UpdateRewards => period,
    }
}

/// Time from `now` until one `period` after `last`.  Zero if that has passed, a full period if
/// there is no `last` or it lies in the future.
fn until_due(last: Option<SystemTime>, now: SystemTime, period: Duration) -> Duration {
    match last.map(|last| now.duration_since(last)) {
        Some(Ok(elapsed)) => period.saturating_sub(elapsed),
        _ => period,
    }
}

/// Run `job` now unless it is already running.  Returns whether it ran.
pub async fn fire<G>(job: Job, state: &State, guild: &G) -> bool
where
    G: MembershipProvider + RoleMutator,
{
    let Some(_running) = state.jobs.try_begin(job) else {
        log_warn!("Skipping {}: previous run still in progress", job.name());
        return false;
    };

    let result = match job {
        Job::Cumulation => cumulation(state).await,
        Job::PersistMetrics => persist_metrics(state).await,
        Job::UpdateRewards => update_rewards(state, guild, guild).await,
    };

    if let Err(e) = result {
        log_error!("Job {} failed: {}", job.name(), e);
    }

    true
}

async fn cumulation(state: &State) -> Result<()> {
    let mut store = state.store.lock().await;
    store.step_cumulation();
    log_internal!("Cumulation step done, tracking {} user(s)", store.len());
    Ok(())
}

pub async fn persist_metrics(state: &State) -> Result<()> {
    if codec::persist(&state.store, state.metrics_blob.as_ref()).await? {
        log_internal!("Metrics saved to `{}`", state.metrics_blob.describe());
    }
    Ok(())
}

async fn update_rewards(
    state: &State,
    members: &dyn MembershipProvider,
    roles: &dyn RoleMutator,
) -> Result<()> {
    // Only the medians are needed; the store is free again before any network traffic.
    let medians = state.store.lock().await.medians();
    let plan = RoleAssignmentPlan::resolve(&medians, &state.reward_tiers);

    let report = reconcile(&plan, members, roles, state.cfg.reconcile_options()).await;

    log_internal!(
        "Rewards updated: {} member(s) checked, {} granted, {} revoked, {} failed{}",
        report.members_seen,
        report.granted,
        report.revoked,
        report.failed,
        if report.aborted { " (incomplete)" } else { "" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        discord::MemberInfo,
        metrics::{codec::decode, store::MetricsSnapshot},
        rewards::{RewardRole, RewardTiers},
        state::tests::test_state,
    };
    use serenity::all::{RoleId, UserId};
    use std::{sync::Mutex as StdMutex, time::UNIX_EPOCH};

    #[derive(Clone, Default)]
    struct FakeGuild {
        members: Vec<MemberInfo>,
        grants: Arc<StdMutex<Vec<(UserId, RoleId)>>>,
    }

    #[serenity::async_trait]
    impl MembershipProvider for FakeGuild {
        async fn list_members(
            &self,
            after: Option<UserId>,
            page_size: u64,
        ) -> anyhow::Result<Vec<MemberInfo>> {
            Ok(self
                .members
                .iter()
                .filter(|m| after.map_or(true, |after| m.user_id > after))
                .take(page_size as usize)
                .cloned()
                .collect())
        }
    }

    #[serenity::async_trait]
    impl RoleMutator for FakeGuild {
        async fn grant_role(&self, user_id: UserId, role_id: RoleId) -> anyhow::Result<()> {
            self.grants.lock().unwrap().push((user_id, role_id));
            Ok(())
        }

        async fn revoke_role(&self, _: UserId, _: RoleId) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cumulation_job_steps_store_once() {
        let state = test_state().await;
        state.store.lock().await.increment(UserId::new(1), 3);

        assert!(fire(Job::Cumulation, &state, &FakeGuild::default()).await);

        let store = state.store.lock().await;
        assert_eq!(store.window(UserId::new(1)), Some(&[0, 3, 0, 0, 0, 0, 0][..]));
        assert!(store.last_cumulation().is_some());
    }

    #[tokio::test]
    async fn running_job_is_not_reentered() {
        let state = test_state().await;
        state.store.lock().await.increment(UserId::new(1), 3);

        let _running = state.jobs.begin(Job::Cumulation).await;
        assert!(!fire(Job::Cumulation, &state, &FakeGuild::default()).await);
        // Other jobs are unaffected
        assert!(fire(Job::PersistMetrics, &state, &FakeGuild::default()).await);

        assert_eq!(
            state.store.lock().await.window(UserId::new(1)),
            Some(&[3, 0, 0, 0, 0, 0, 0][..])
        );
    }

    #[tokio::test]
    async fn persist_job_writes_snapshot() {
        let state = test_state().await;
        state.store.lock().await.increment(UserId::new(9), 1);

        fire(Job::PersistMetrics, &state, &FakeGuild::default()).await;

        let bytes = state.metrics_blob.load().await.unwrap().unwrap();
        let snapshot = decode(&bytes).unwrap();
        assert_eq!(snapshot.users.len(), 1);
        assert_eq!(snapshot.users[0].user_id, UserId::new(9));
    }

    #[tokio::test]
    async fn rewards_job_grants_from_medians() {
        let mut state = test_state().await;
        state.reward_tiers = RewardTiers {
            kings_role: None,
            kings_count: 6,
            thresholds: vec![RewardRole {
                role_id: RoleId::new(77),
                threshold: 2,
            }],
        };
        {
            let mut store = state.store.lock().await;
            for _ in 0..4 {
                store.increment(UserId::new(1), 2);
                store.increment(UserId::new(2), 1);
                store.step_cumulation();
            }
        }

        let guild = FakeGuild {
            members: vec![
                MemberInfo {
                    user_id: UserId::new(1),
                    roles: vec![],
                },
                MemberInfo {
                    user_id: UserId::new(2),
                    roles: vec![],
                },
            ],
            ..Default::default()
        };

        fire(Job::UpdateRewards, &state, &guild).await;

        assert_eq!(
            *guild.grants.lock().unwrap(),
            vec![(UserId::new(1), RoleId::new(77))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn started_jobs_fire_after_one_period() {
        let state = Arc::new(test_state().await);
        state.store.lock().await.increment(UserId::new(1), 1);

        start(state.clone(), FakeGuild::default());

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(state.store.lock().await.last_cumulation().is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(state.store.lock().await.last_cumulation().is_some());
        assert!(state.metrics_blob.load().await.unwrap().is_some());
    }

    /// State whose last cumulation step happened `ago` before now, with 5 messages from user 1
    /// counted since.
    async fn state_stepped_ago(ago: Duration) -> Arc<State> {
        let state = test_state().await;
        {
            let last = SystemTime::now() - ago;
            let mut store = state.store.lock().await;
            store.restore(MetricsSnapshot {
                last_cumulation: Some(last.duration_since(UNIX_EPOCH).unwrap().as_secs()),
                users: vec![],
            });
            store.increment(UserId::new(1), 5);
        }
        Arc::new(state)
    }

    #[test]
    fn cumulation_due_one_period_after_last_step() {
        let now = SystemTime::now();
        let period = Duration::from_secs(300);

        assert_eq!(until_due(None, now, period), period);
        assert_eq!(
            until_due(Some(now - Duration::from_secs(100)), now, period),
            Duration::from_secs(200)
        );
        assert_eq!(until_due(Some(now - period), now, period), Duration::ZERO);
        assert_eq!(
            until_due(Some(now - Duration::from_secs(3000)), now, period),
            Duration::ZERO
        );
        // Clock went backwards
        assert_eq!(
            until_due(Some(now + Duration::from_secs(60)), now, period),
            period
        );
    }

    #[tokio::test(start_paused = true)]
    async fn overdue_cumulation_runs_right_after_start() {
        let state = state_stepped_ago(Duration::from_secs(600)).await;

        start(state.clone(), FakeGuild::default());
        tokio::time::sleep(Duration::from_secs(1)).await;

        // One catch-up step, not one per missed period
        assert_eq!(
            state.store.lock().await.window(UserId::new(1)),
            Some(&[0, 5, 0, 0, 0, 0, 0][..])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_keeps_cumulation_timing() {
        let state = state_stepped_ago(Duration::from_secs(200)).await;

        start(state.clone(), FakeGuild::default());

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(
            state.store.lock().await.window(UserId::new(1)),
            Some(&[5, 0, 0, 0, 0, 0, 0][..])
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            state.store.lock().await.window(UserId::new(1)),
            Some(&[0, 5, 0, 0, 0, 0, 0][..])
        );
    }
}
