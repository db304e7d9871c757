//! The per-cycle state machine behind the countdown.
//!
//! `GateTracker` owns the preview window, the countdown and the two cycle
//! flags. It does no I/O and never reads the clock itself: the caller passes
//! `now` into every tick, which keeps the whole thing deterministic.
//!
//! ## Tick order
//!
//! ```text
//! reminder check  ->  start check  ->  (rollover | countdown refresh)
//! ```
//!
//! Both checks look at the countdown carried over from the previous tick. The
//! refresh at the end of the tick is what the next tick will see.

use crate::common::{ReminderLead, START_TOLERANCE_MS, WINDOW_LEN};
use crate::schedule::{build_window, millis_until};
use chrono::{DateTime, TimeZone};
use tracing::{trace, warn};

/// What happened during a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome<Tz: TimeZone> {
    /// Set to the upcoming gate when its reminder became due on this tick.
    pub reminded: Option<DateTime<Tz>>,
    /// Set to the gate that started on this tick. The tracker has already
    /// rolled over to the next cycle when this is returned.
    pub started: Option<DateTime<Tz>>,
}

impl<Tz: TimeZone> Default for TickOutcome<Tz> {
    fn default() -> Self {
        Self {
            reminded: None,
            started: None,
        }
    }
}

impl<Tz: TimeZone> TickOutcome<Tz> {
    /// `true` when neither edge fired.
    pub fn is_quiet(&self) -> bool {
        self.reminded.is_none() && self.started.is_none()
    }
}

/// A read-only copy of the tracker state, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSnapshot<Tz: TimeZone> {
    /// Milliseconds until `next_gates[0]`.
    pub time_until_ms: i64,
    pub next_gates: [DateTime<Tz>; WINDOW_LEN],
    /// Current lead in minutes, 0 when the reminder is disabled.
    pub remind_in_minutes: u32,
    pub reminder_fired: bool,
}

/// Countdown and edge-trigger bookkeeping for one gate cycle at a time.
#[derive(Debug, Clone)]
pub struct GateTracker<Tz: TimeZone> {
    window: [DateTime<Tz>; WINDOW_LEN],
    time_until_ms: i64,
    reminder_fired: bool,
    gate_started: bool,
    lead: ReminderLead,
}

impl<Tz: TimeZone> GateTracker<Tz> {
    /// Creates a tracker whose window starts at the first gate after `now`.
    ///
    /// A reminder whose trigger point is already behind the initial countdown
    /// starts out as fired, so starting late never produces a stale reminder.
    pub fn new(now: &DateTime<Tz>, lead: ReminderLead) -> Self {
        let window = build_window(now);
        let time_until_ms = millis_until(&window[0], now);
        Self {
            window,
            time_until_ms,
            reminder_fired: lead.is_enabled() && lead.millis() > time_until_ms,
            gate_started: false,
            lead,
        }
    }

    /// Advances the tracker by one tick evaluated at `now`.
    ///
    /// The reminder check runs before the start check, so a reminder that
    /// becomes due on the same tick as the gate start is still reported.
    pub fn tick(&mut self, now: &DateTime<Tz>) -> TickOutcome<Tz> {
        let mut outcome = TickOutcome::default();

        if self.lead.is_enabled()
            && !self.reminder_fired
            && self.time_until_ms - self.lead.millis() <= 0
        {
            self.reminder_fired = true;
            outcome.reminded = Some(self.window[0].clone());
        }

        if self.gate_started {
            return outcome;
        }

        if self.time_until_ms - START_TOLERANCE_MS <= 0 {
            self.gate_started = true;
            outcome.started = Some(self.window[0].clone());
            self.roll_over(now);
        } else {
            self.time_until_ms = millis_until(&self.window[0], now);
            trace!(time_until_ms = self.time_until_ms, "countdown refreshed");
        }

        outcome
    }

    /// Moves to the next cycle and clears both flags.
    fn roll_over(&mut self, now: &DateTime<Tz>) {
        if self.window[1] > *now {
            self.time_until_ms = millis_until(&self.window[1], now);
            self.window = build_window(&self.window[0]);
        } else {
            // The clock moved past the following gate too. Resync from `now`
            // instead of replaying every gate that was skipped.
            warn!(
                behind_ms = millis_until(now, &self.window[1]),
                "clock jumped past the next gate, resyncing window"
            );
            self.window = build_window(now);
            self.time_until_ms = millis_until(&self.window[0], now);
        }
        self.reminder_fired = false;
        self.gate_started = false;
    }

    /// Replaces the reminder lead mid-cycle.
    ///
    /// When an enabled lead is changed, the reminder is marked as fired if the
    /// new trigger point is already behind the current countdown, and re-armed
    /// otherwise. Turning a disabled reminder on always arms it, so it fires
    /// on the next tick even when less than `lead` remains.
    pub fn set_reminder_lead(&mut self, lead: ReminderLead) {
        let was_enabled = self.lead.is_enabled();
        self.lead = lead;
        self.reminder_fired =
            was_enabled && lead.is_enabled() && lead.millis() > self.time_until_ms;
    }

    pub fn time_until_ms(&self) -> i64 {
        self.time_until_ms
    }

    pub fn next_gates(&self) -> &[DateTime<Tz>; WINDOW_LEN] {
        &self.window
    }

    pub fn reminder_lead(&self) -> ReminderLead {
        self.lead
    }

    pub fn reminder_fired(&self) -> bool {
        self.reminder_fired
    }

    pub fn gate_started(&self) -> bool {
        self.gate_started
    }

    pub fn snapshot(&self) -> GateSnapshot<Tz> {
        GateSnapshot {
            time_until_ms: self.time_until_ms,
            next_gates: self.window.clone(),
            remind_in_minutes: self.lead.minutes(),
            reminder_fired: self.reminder_fired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::GRID_STEP_MS;
    use chrono::{Duration, Utc};

    fn gate() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 10, 20, 0).unwrap()
    }

    fn lead(minutes: u32) -> ReminderLead {
        ReminderLead::new(minutes).unwrap()
    }

    /// A tracker whose countdown to `gate()` starts at `remaining_ms`.
    fn tracker_with(remaining_ms: i64, minutes: u32) -> (GateTracker<Utc>, DateTime<Utc>) {
        let now = gate() - Duration::milliseconds(remaining_ms);
        let tracker = GateTracker::new(&now, lead(minutes));
        assert_eq!(tracker.time_until_ms(), remaining_ms);
        (tracker, now)
    }

    #[test]
    fn starts_with_window_after_now() {
        let (tracker, _) = tracker_with(60_000, 0);
        assert_eq!(tracker.next_gates()[0], gate());
        assert_eq!(tracker.next_gates()[2], gate() + Duration::minutes(40));
        assert!(!tracker.reminder_fired());
        assert!(!tracker.gate_started());
    }

    #[test]
    fn reminder_fires_once_per_cycle() {
        let (mut tracker, mut now) = tracker_with(301_000, 5);
        let mut reminded_at = Vec::new();

        for tick in 1..=310 {
            let carried = tracker.time_until_ms();
            now += Duration::seconds(1);
            let outcome = tracker.tick(&now);
            if let Some(gate_for) = outcome.reminded {
                assert_eq!(gate_for, gate());
                assert!(carried <= 300_000);
                reminded_at.push(tick);
            }
            if outcome.started.is_some() {
                break;
            }
        }

        // Tick 1 still sees 301s carried over; tick 2 sees the refreshed 300s.
        assert_eq!(reminded_at, vec![2]);
    }

    #[test]
    fn start_fires_once_and_rolls_over() {
        let (mut tracker, mut now) = tracker_with(10_000, 0);
        let mut started = Vec::new();

        for tick in 1..=30 {
            now += Duration::seconds(1);
            let outcome = tracker.tick(&now);
            if let Some(gate_for) = outcome.started {
                started.push((tick, gate_for));
                assert!(tracker.time_until_ms() > START_TOLERANCE_MS);
                assert_eq!(tracker.next_gates()[0], gate() + Duration::minutes(20));
                assert_eq!(tracker.next_gates()[2], gate() + Duration::minutes(60));
                assert!(!tracker.gate_started());
            }
        }

        // Carried countdowns: 10s, 9s, ... 3s on tick 8.
        assert_eq!(started, vec![(8, gate())]);
    }

    #[test]
    fn countdown_after_rollover_targets_following_gate() {
        let (mut tracker, now) = tracker_with(2_000, 0);
        let outcome = tracker.tick(&now);
        assert_eq!(outcome.started, Some(gate()));
        assert_eq!(tracker.time_until_ms(), GRID_STEP_MS + 2_000);
    }

    #[test]
    fn reminder_rearms_after_rollover() {
        let (mut tracker, mut now) = tracker_with(62_000, 1);
        let mut reminders = 0;
        let mut starts = 0;

        for _ in 0..(62 + 20 * 60) {
            now += Duration::seconds(1);
            let outcome = tracker.tick(&now);
            reminders += usize::from(outcome.reminded.is_some());
            starts += usize::from(outcome.started.is_some());
        }

        assert_eq!(starts, 2);
        assert_eq!(reminders, 2);
    }

    #[test]
    fn reminder_is_checked_before_start_on_the_same_tick() {
        let (mut tracker, now) = tracker_with(2_000, 0);
        tracker.set_reminder_lead(lead(1));
        let outcome = tracker.tick(&now);
        assert_eq!(outcome.reminded, Some(gate()));
        assert_eq!(outcome.started, Some(gate()));
        assert!(!tracker.reminder_fired());
    }

    #[test]
    fn late_start_suppresses_reminder() {
        let (tracker, _) = tracker_with(120_000, 5);
        assert!(tracker.reminder_fired());
    }

    #[test]
    fn disabled_reminder_never_fires() {
        let (mut tracker, mut now) = tracker_with(30_000, 0);
        for _ in 0..60 {
            now += Duration::seconds(1);
            assert!(tracker.tick(&now).reminded.is_none());
        }
    }

    #[test]
    fn enabling_reminder_mid_cycle_arms_it() {
        let (mut tracker, now) = tracker_with(300_000, 0);
        tracker.set_reminder_lead(lead(10));
        assert!(!tracker.reminder_fired());

        let outcome = tracker.tick(&(now + Duration::seconds(1)));
        assert_eq!(outcome.reminded, Some(gate()));
        assert!(tracker.reminder_fired());
    }

    #[test]
    fn shortening_lead_keeps_reminder_armed() {
        let (mut tracker, mut now) = tracker_with(900_000, 10);
        // Let the 10-minute reminder fire first.
        let mut fired = false;
        while tracker.time_until_ms() > 300_000 {
            now += Duration::seconds(1);
            fired |= tracker.tick(&now).reminded.is_some();
        }
        assert!(fired);

        tracker.set_reminder_lead(lead(2));
        assert!(!tracker.reminder_fired());

        let mut reminded_with = None;
        while reminded_with.is_none() {
            let carried = tracker.time_until_ms();
            now += Duration::seconds(1);
            if tracker.tick(&now).reminded.is_some() {
                reminded_with = Some(carried);
            }
        }
        let carried = reminded_with.unwrap();
        assert!(carried <= 120_000 && carried > 119_000);
    }

    #[test]
    fn lengthening_lead_past_elapsed_point_suppresses_reminder() {
        let (mut tracker, mut now) = tracker_with(300_000, 2);
        tracker.set_reminder_lead(lead(10));
        assert!(tracker.reminder_fired());

        for _ in 0..290 {
            now += Duration::seconds(1);
            assert!(tracker.tick(&now).reminded.is_none());
        }
    }

    #[test]
    fn disabling_reminder_clears_flag() {
        let (mut tracker, _) = tracker_with(60_000, 5);
        tracker.set_reminder_lead(lead(10));
        assert!(tracker.reminder_fired());
        tracker.set_reminder_lead(ReminderLead::DISABLED);
        assert!(!tracker.reminder_fired());
        assert_eq!(tracker.snapshot().remind_in_minutes, 0);
    }

    #[test]
    fn forward_jump_fires_start_once_and_resyncs() {
        let (mut tracker, now) = tracker_with(600_000, 0);
        let later = now + Duration::hours(3);

        // First tick only refreshes the countdown to a negative value.
        assert!(tracker.tick(&later).is_quiet());
        assert!(tracker.time_until_ms() < 0);

        let outcome = tracker.tick(&later);
        assert_eq!(outcome.started, Some(gate()));
        assert!(tracker.next_gates()[0] > later);
        assert!(tracker.time_until_ms() > 0);

        assert!(tracker.tick(&later).is_quiet());
    }

    #[test]
    fn backward_jump_self_corrects() {
        let (mut tracker, now) = tracker_with(600_000, 0);
        let earlier = now - Duration::minutes(30);

        tracker.tick(&earlier);
        assert_eq!(tracker.time_until_ms(), 600_000 + 30 * 60_000);

        let outcome = tracker.tick(&now);
        assert!(outcome.is_quiet());
        assert_eq!(tracker.time_until_ms(), 600_000);
    }
}
