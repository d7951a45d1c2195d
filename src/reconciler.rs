//! Keeps institution counters in step with the current classification of
//! every member account.
//!
//! Counters are never recounted. Each join or submission turns into a
//! `CounterDelta` that is added to the affected institutions and clamped at
//! zero. Clamping makes the order of deltas matter, so everything that
//! reads or moves one account's contribution runs under `lock_account`.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::error::ReconcileError;
use crate::status::{Classification, CounterDelta, Counters, NewStatus, Status};
use crate::store::{AccountId, AccountStore, InstitutionId, InstitutionStore, StatusStore};


lazy_static! {
    static ref ACCOUNT_LOCKS: Mutex<HashMap<AccountId, Arc<Mutex<()>>>> = {
        Mutex::new(HashMap::new())
    };
}

/// Runs `f` while no other submission or join of `account` is in progress.
/// Not reentrant.
pub fn lock_account<R, F>(account: AccountId, f: F) -> R where
    F: FnOnce() -> R {

    let lock = ACCOUNT_LOCKS.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(account)
        .or_default()
        .clone();

    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    f()
}


/// Outcome of a successful status submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub status: Status,
    pub delta: CounterDelta,
    pub updated: Vec<(InstitutionId, Counters)>,
}


pub struct StatusReconciler<'a, S: ?Sized> {
    store: &'a S,
    retries: usize,
}

impl<'a, S> StatusReconciler<'a, S> where
    S: ?Sized + AccountStore + StatusStore + InstitutionStore {

    /// `retries` is how many extra rounds institutions whose counter update
    /// failed get before the failure is reported.
    pub fn new(store: &'a S, retries: usize) -> Self {
        StatusReconciler {
            store,
            retries,
        }
    }

    /// Counts `account` into `institution`, which it has just joined.
    /// Callers hold `lock_account` across adding the membership and this.
    pub fn reconcile_on_join(&self, account: AccountId, institution: InstitutionId)
        -> Result<Counters, ReconcileError> {

        let latest = self.store.latest_status(account)
            .map_err(ReconcileError::Lookup)?;

        let delta = CounterDelta::on_join(latest.as_ref().map(|s| &s.classification));

        let counters = self.store.apply_counter_delta(institution, &delta)
            .map_err(ReconcileError::Write)?;

        debug!("Account {} joined institution {}: {:?}", account, institution, counters);

        Ok(counters)
    }

    /// Applies the change from `previous` to `next` to every institution in
    /// `institutions`. Only institutions that failed are retried.
    pub fn reconcile_on_status_update(&self,
        previous: Option<&Classification>,
        next: &Classification,
        institutions: &[InstitutionId]) -> Result<Vec<(InstitutionId, Counters)>, ReconcileError> {

        let delta = CounterDelta::on_update(previous, next);
        if delta.is_zero() {
            return Ok(Vec::new());
        }

        let mut updated = Vec::with_capacity(institutions.len());
        let mut remaining = institutions.to_vec();

        for round in 0..=self.retries {
            if remaining.is_empty() {
                break;
            }

            remaining.retain(|&id| {
                match self.store.apply_counter_delta(id, &delta) {
                    Ok(counters) => {
                        updated.push((id, counters));
                        false
                    },
                    Err(err) => {
                        warn!("Fail to update counters of institution({}) (round {}): {}", id, round, err);
                        true
                    },
                }
            });
        }

        if remaining.is_empty() {
            Ok(updated)
        }
        else {
            error!("Counters of institution(s) {:?} are stale after {:?}", remaining, delta);

            Err(ReconcileError::PartialWrite {
                applied: updated.into_iter().map(|(id, _)| id).collect(),
                failed: remaining,
            })
        }
    }

    /// Stores `status` for `account` and reconciles every institution the
    /// account belongs to. The submission is written before any counter, so
    /// a counter failure never loses it.
    pub fn submit_status(&self, account: AccountId, status: &NewStatus)
        -> Result<Submission, ReconcileError> {

        lock_account(account, || self.submit_locked(account, status))
    }

    fn submit_locked(&self, account: AccountId, status: &NewStatus)
        -> Result<Submission, ReconcileError> {

        let institutions = self.store.member_institutions(account)
            .map_err(ReconcileError::Lookup)?;

        let (previous, saved) = self.store.append_status_with_previous(account, status)?;

        let prev_class = previous.as_ref().map(|s| &s.classification);
        let delta = CounterDelta::on_update(prev_class, &saved.classification);
        let updated = self.reconcile_on_status_update(prev_class, &saved.classification, &institutions)?;

        info!("Account {} submitted status {} ({} institution(s) updated)",
            account, saved.id, updated.len());

        Ok(Submission {
            status: saved,
            delta,
            updated,
        })
    }
}
