//! Periodic retirement of aged records and abandoned reservations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::domain::{Invitation, User};
use super::error::StoreError;
use super::invitations::release_reserved_unit;
use super::store::TenancyStore;
use crate::config::LifecycleConfig;

/// Counts produced by one sweep run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub maintenance_deleted: usize,
    pub announcements_deleted: usize,
    pub invitations_expired: usize,
    pub units_reclaimed: usize,
    /// Passes or records that failed; the rest of the run still completed.
    pub failures: Vec<String>,
}

impl SweepReport {
    /// True when the run changed nothing.
    pub fn is_quiet(&self) -> bool {
        self.maintenance_deleted == 0
            && self.announcements_deleted == 0
            && self.invitations_expired == 0
            && self.units_reclaimed == 0
    }
}

pub struct ExpirySweeper<S> {
    store: Arc<S>,
    lifecycle: LifecycleConfig,
    running: AtomicBool,
}

/// Clears the in-flight flag when a run ends, including by panic.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S> ExpirySweeper<S>
where
    S: TenancyStore + 'static,
{
    pub fn new(store: Arc<S>, lifecycle: LifecycleConfig) -> Self {
        Self {
            store,
            lifecycle,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run the three passes once. Returns `None` when another run is still in flight.
    pub fn run_once(&self, now: DateTime<Utc>) -> Option<SweepReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("sweep already in progress; skipping");
            return None;
        }
        let _guard = RunGuard(&self.running);

        let cutoff = now - self.lifecycle.retention;
        let mut report = SweepReport::default();

        match self.store.delete_resolved_maintenance_before(cutoff) {
            Ok(deleted) => report.maintenance_deleted = deleted,
            Err(error) => record_failure(&mut report, "maintenance", &error),
        }

        match self.store.delete_announcements_before(cutoff) {
            Ok(deleted) => report.announcements_deleted = deleted,
            Err(error) => record_failure(&mut report, "announcements", &error),
        }

        self.expire_invitations(now, &mut report);

        if report.is_quiet() && report.failures.is_empty() {
            debug!("sweep found nothing to retire");
        } else {
            info!(
                maintenance_deleted = report.maintenance_deleted,
                announcements_deleted = report.announcements_deleted,
                invitations_expired = report.invitations_expired,
                units_reclaimed = report.units_reclaimed,
                failures = report.failures.len(),
                "sweep finished"
            );
        }
        Some(report)
    }

    fn expire_invitations(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let lapsed = match self.store.users_with_lapsed_invitations(now) {
            Ok(users) => users,
            Err(error) => {
                record_failure(report, "invitations", &error);
                return;
            }
        };

        for user in lapsed {
            // Homeowner tokens simply lapse; only tenant offers hold inventory.
            let Some(offer) = user.invitation.tenant_offer().cloned() else {
                continue;
            };
            let listed_token = user.invitation.pending().map(|pending| pending.token.clone());

            match release_reserved_unit(self.store.as_ref(), &offer.unit_id) {
                Ok(true) => {
                    report.units_reclaimed += 1;
                    info!(unit_id = %offer.unit_id, user_id = %user.id, "reservation reclaimed");
                }
                Ok(false) => {}
                Err(error) => {
                    error!(
                        unit_id = %offer.unit_id,
                        user_id = %user.id,
                        %error,
                        "could not reclaim unit"
                    );
                    report
                        .failures
                        .push(format!("unit {}: {error}", offer.unit_id));
                    // Keep the invitation so the next run retries the unit.
                    continue;
                }
            }

            // The listing is a snapshot; the invitee may have accepted since.
            let user_id = user.id.clone();
            let current = match self.store.fetch_user(&user_id) {
                Ok(Some(current)) => current,
                Ok(None) => continue,
                Err(error) => {
                    error!(%user_id, %error, "could not reload invitee");
                    report.failures.push(format!("user {user_id}: {error}"));
                    continue;
                }
            };
            let still_pending = current.invitation.pending().map(|pending| &pending.token)
                == listed_token.as_ref();
            if !still_pending {
                debug!(%user_id, "invitation settled before expiry; skipping");
                continue;
            }

            let expired = User {
                invitation: Invitation::Expired { expired_at: now },
                ..current
            };
            match self.store.update_user(expired) {
                Ok(()) => report.invitations_expired += 1,
                Err(error) => {
                    error!(%user_id, %error, "could not expire invitation");
                    report.failures.push(format!("user {user_id}: {error}"));
                }
            }
        }
    }

    /// Run immediately and then every `sweep_interval` until the handle is shut down.
    pub fn spawn(self: Arc<Self>) -> SweepHandle {
        let (shutdown, mut stopped) = watch::channel(false);
        let period = self.lifecycle.sweep_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sweeper = Arc::clone(&self);
                        let run = tokio::task::spawn_blocking(move || sweeper.run_once(Utc::now()));
                        if let Err(error) = run.await {
                            error!(%error, "sweep task failed");
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("sweeper stopped");
        });

        SweepHandle { shutdown, task }
    }
}

fn record_failure(report: &mut SweepReport, pass: &str, error: &StoreError) {
    error!(pass, %error, "sweep pass failed");
    report.failures.push(format!("{pass}: {error}"));
}

/// Owner of the background sweep task.
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Signal the task to stop and wait for the current run, if any, to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(error) = self.task.await {
            error!(%error, "sweeper task ended abnormally");
        }
    }
}
