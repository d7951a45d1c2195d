use std::time::SystemTime;

use crate::store::{AccountId, StatusId};


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Safety {
    Safe,
    Unsafe,
    Pending,
}

impl Safety {
    /// Anything other than "safe" or "unsafe" leaves the stakeholder pending.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "safe" => Safety::Safe,
            "unsafe" => Safety::Unsafe,
            _ => Safety::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Safety::Safe => "safe",
            Safety::Unsafe => "unsafe",
            Safety::Pending => "pending",
        }
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Evacuation {
    Evacuated,
    NotEvacuated,
}

impl Evacuation {
    pub fn parse(s: &str) -> Self {
        if s.trim() == "evacuated" {
            Evacuation::Evacuated
        }
        else {
            Evacuation::NotEvacuated
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Evacuation::Evacuated => "evacuated",
            Evacuation::NotEvacuated => "not_evacuated",
        }
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Readiness {
    Ready,
    NotReady,
}

impl Readiness {
    pub fn parse(s: &str) -> Self {
        if s.trim() == "ready" {
            Readiness::Ready
        }
        else {
            Readiness::NotReady
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Readiness::Ready => "ready",
            Readiness::NotReady => "not_ready",
        }
    }
}


/// The part of a submission that institution counters are derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub safety: Safety,
    pub evacuation: Evacuation,
    pub readiness: Readiness,
}

impl Classification {
    pub fn new(safety: Safety, evacuation: Evacuation, readiness: Readiness) -> Self {
        Classification {
            safety,
            evacuation,
            readiness,
        }
    }

    pub fn pending() -> Self {
        Classification::new(Safety::Pending, Evacuation::NotEvacuated, Readiness::NotReady)
    }
}


#[derive(Debug, Clone, PartialEq)]
pub struct NewStatus {
    pub classification: Classification,
    pub flood_height: f64,
    pub rain_intensity: f64,
    pub wind_speed: f64,
    pub modality: String,
    pub transportation: String,
}

/// A stored submission. Never modified after it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub id: StatusId,
    pub account_id: AccountId,
    pub classification: Classification,
    pub flood_height: f64,
    pub rain_intensity: f64,
    pub wind_speed: f64,
    pub modality: String,
    pub transportation: String,
    pub created_time: SystemTime,
}


#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub safe: i32,
    pub unsafe_: i32,
    pub pending: i32,
    pub evacuated: i32,
    pub ready: i32,
}

impl Counters {
    /// Adds `delta` and clamps every counter at zero.
    pub fn apply(&self, delta: &CounterDelta) -> Counters {
        fn add(value: i32, d: i32) -> i32 {
            value.saturating_add(d).max(0)
        }

        Counters {
            safe: add(self.safe, delta.safe),
            unsafe_: add(self.unsafe_, delta.unsafe_),
            pending: add(self.pending, delta.pending),
            evacuated: add(self.evacuated, delta.evacuated),
            ready: add(self.ready, delta.ready),
        }
    }

    pub fn total_stakeholders(&self) -> i32 {
        self.safe + self.unsafe_ + self.pending
    }
}


#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub safe: i32,
    pub unsafe_: i32,
    pub pending: i32,
    pub evacuated: i32,
    pub ready: i32,
}

impl CounterDelta {
    /// Contribution of an account entering an institution with `latest` as
    /// its most recent submission.
    pub fn on_join(latest: Option<&Classification>) -> Self {
        let latest = latest.copied().unwrap_or_else(Classification::pending);
        let mut delta = CounterDelta::default();

        *delta.safety_slot(latest.safety) += 1;

        if latest.evacuation == Evacuation::Evacuated {
            delta.evacuated = 1;
        }

        if latest.readiness == Readiness::Ready {
            delta.ready = 1;
        }

        delta
    }

    /// Change in contribution when an account moves from `prev` to `next`.
    /// No previous submission counts as pending.
    pub fn on_update(prev: Option<&Classification>, next: &Classification) -> Self {
        let prev = prev.copied().unwrap_or_else(Classification::pending);
        let mut delta = CounterDelta::default();

        if prev.safety != next.safety {
            *delta.safety_slot(next.safety) += 1;
            *delta.safety_slot(prev.safety) -= 1;
        }

        delta.evacuated = transition(
            prev.evacuation == Evacuation::Evacuated,
            next.evacuation == Evacuation::Evacuated);
        delta.ready = transition(
            prev.readiness == Readiness::Ready,
            next.readiness == Readiness::Ready);

        delta
    }

    pub fn is_zero(&self) -> bool {
        *self == CounterDelta::default()
    }

    fn safety_slot(&mut self, safety: Safety) -> &mut i32 {
        match safety {
            Safety::Safe => &mut self.safe,
            Safety::Unsafe => &mut self.unsafe_,
            Safety::Pending => &mut self.pending,
        }
    }
}

fn transition(was: bool, is: bool) -> i32 {
    match (was, is) {
        (false, true) => 1,
        (true, false) => -1,
        _ => 0,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn class(s: Safety, e: Evacuation, r: Readiness) -> Classification {
        Classification::new(s, e, r)
    }

    #[test]
    fn parse_falls_back_to_the_non_value() {
        assert_eq!(Safety::parse("safe"), Safety::Safe);
        assert_eq!(Safety::parse("unsafe"), Safety::Unsafe);
        assert_eq!(Safety::parse("unknown"), Safety::Pending);
        assert_eq!(Safety::parse(""), Safety::Pending);
        assert_eq!(Evacuation::parse("evacuated"), Evacuation::Evacuated);
        assert_eq!(Evacuation::parse("sheltering"), Evacuation::NotEvacuated);
        assert_eq!(Readiness::parse("ready"), Readiness::Ready);
        assert_eq!(Readiness::parse("not_ready"), Readiness::NotReady);
    }

    #[test]
    fn join_without_status_counts_pending_only() {
        let delta = CounterDelta::on_join(None);
        assert_eq!(delta, CounterDelta { pending: 1, ..Default::default() });
    }

    #[test]
    fn join_with_safe_evacuated_status() {
        let latest = class(Safety::Safe, Evacuation::Evacuated, Readiness::NotReady);
        let delta = CounterDelta::on_join(Some(&latest));
        assert_eq!(delta, CounterDelta { safe: 1, evacuated: 1, ..Default::default() });
    }

    #[test]
    fn join_with_pending_ready_status() {
        let latest = class(Safety::Pending, Evacuation::NotEvacuated, Readiness::Ready);
        let delta = CounterDelta::on_join(Some(&latest));
        assert_eq!(delta, CounterDelta { pending: 1, ready: 1, ..Default::default() });
    }

    #[test]
    fn first_submission_moves_out_of_pending() {
        let next = class(Safety::Unsafe, Evacuation::NotEvacuated, Readiness::NotReady);
        let delta = CounterDelta::on_update(None, &next);
        assert_eq!(delta, CounterDelta { unsafe_: 1, pending: -1, ..Default::default() });
    }

    #[test]
    fn flip_safe_to_unsafe() {
        let prev = class(Safety::Safe, Evacuation::NotEvacuated, Readiness::NotReady);
        let next = class(Safety::Unsafe, Evacuation::NotEvacuated, Readiness::NotReady);
        let delta = CounterDelta::on_update(Some(&prev), &next);
        assert_eq!(delta, CounterDelta { safe: -1, unsafe_: 1, ..Default::default() });

        let counters = Counters { safe: 1, ..Default::default() }.apply(&delta);
        assert_eq!(counters, Counters { unsafe_: 1, ..Default::default() });
    }

    #[test]
    fn back_to_pending_from_definite() {
        let prev = class(Safety::Unsafe, Evacuation::Evacuated, Readiness::Ready);
        let next = class(Safety::Pending, Evacuation::NotEvacuated, Readiness::NotReady);
        let delta = CounterDelta::on_update(Some(&prev), &next);
        assert_eq!(delta, CounterDelta {
            unsafe_: -1,
            pending: 1,
            evacuated: -1,
            ready: -1,
            ..Default::default()
        });
    }

    #[test]
    fn pending_to_pending_is_no_change() {
        let prev = class(Safety::Pending, Evacuation::NotEvacuated, Readiness::NotReady);
        assert!(CounterDelta::on_update(Some(&prev), &prev).is_zero());
        assert!(CounterDelta::on_update(None, &Classification::pending()).is_zero());
    }

    #[test]
    fn unchanged_classification_is_no_change() {
        let same = class(Safety::Safe, Evacuation::Evacuated, Readiness::Ready);
        assert!(CounterDelta::on_update(Some(&same), &same).is_zero());
    }

    #[test]
    fn evacuation_and_readiness_are_independent() {
        let prev = class(Safety::Safe, Evacuation::NotEvacuated, Readiness::Ready);
        let next = class(Safety::Safe, Evacuation::Evacuated, Readiness::NotReady);
        let delta = CounterDelta::on_update(Some(&prev), &next);
        assert_eq!(delta, CounterDelta { evacuated: 1, ready: -1, ..Default::default() });
    }

    #[test]
    fn apply_clamps_at_zero() {
        let delta = CounterDelta { safe: -1, unsafe_: 1, ready: -3, ..Default::default() };
        let counters = Counters::default().apply(&delta);
        assert_eq!(counters, Counters { unsafe_: 1, ..Default::default() });
    }

    #[test]
    fn every_sequence_keeps_one_safety_contribution() {
        let seq = [
            class(Safety::Safe, Evacuation::Evacuated, Readiness::NotReady),
            class(Safety::Pending, Evacuation::Evacuated, Readiness::Ready),
            class(Safety::Unsafe, Evacuation::NotEvacuated, Readiness::Ready),
            class(Safety::Unsafe, Evacuation::NotEvacuated, Readiness::NotReady),
            class(Safety::Safe, Evacuation::NotEvacuated, Readiness::NotReady),
        ];

        let mut counters = Counters::default().apply(&CounterDelta::on_join(None));
        let mut prev: Option<Classification> = None;

        for next in seq.iter() {
            counters = counters.apply(&CounterDelta::on_update(prev.as_ref(), next));
            prev = Some(*next);

            assert_eq!(counters.total_stakeholders(), 1);
            assert_eq!(counters.evacuated, (next.evacuation == Evacuation::Evacuated) as i32);
            assert_eq!(counters.ready, (next.readiness == Readiness::Ready) as i32);
        }
    }
}
