//! The gate schedule: pure functions from a reference instant to gate instants.
//!
//! Gates open at minute 0, 20 and 40 of every hour, measured on the wall clock
//! of whatever zone the reference instant carries. Gates are picked among local
//! wall times, so a DST shift of any size (Lord Howe moves by 30 minutes) never
//! pushes a gate off the grid. Local times skipped by a transition are not
//! gates; local times repeated by one are gates twice.

use crate::common::{GRID_STEP_MINUTES, GRID_STEP_MS, WINDOW_LEN};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike};

/// How far around the reference's wall time candidate slots are scanned.
/// Covers every UTC offset change on record.
const SEARCH_HOURS: i64 = 3;

/// Returns the soonest gate strictly after `reference`.
///
/// A reference sitting exactly on a gate yields the *following* gate, never
/// itself: 10:20:00 maps to 10:40:00.
pub fn next_gate_after<Tz: TimeZone>(reference: &DateTime<Tz>) -> DateTime<Tz> {
    let step = Duration::minutes(GRID_STEP_MINUTES);
    let local = reference.naive_local();
    let slot = local
        - Duration::minutes(i64::from(local.minute()) % GRID_STEP_MINUTES)
        - Duration::seconds(i64::from(local.second()))
        - Duration::nanoseconds(i64::from(local.nanosecond()));

    let zone = reference.timezone();
    let last = slot + Duration::hours(SEARCH_HOURS);
    let mut candidate = slot - Duration::hours(SEARCH_HOURS);
    let mut soonest: Option<DateTime<Tz>> = None;
    while candidate <= last {
        for gate in resolve(&zone, &candidate) {
            if gate > *reference && soonest.as_ref().map_or(true, |best| gate < *best) {
                soonest = Some(gate);
            }
        }
        candidate += step;
    }

    // Only reachable for zones without a gate in the scanned range.
    soonest.unwrap_or_else(|| reference.clone() + step)
}

/// Every instant showing `wall` on the zone's clock: none inside a DST gap,
/// two inside an overlap.
fn resolve<Tz: TimeZone>(zone: &Tz, wall: &NaiveDateTime) -> impl Iterator<Item = DateTime<Tz>> {
    let mapped = zone.from_local_datetime(wall);
    let earliest = mapped.clone().earliest();
    let latest = mapped.latest().filter(|late| Some(late) != earliest.as_ref());
    earliest.into_iter().chain(latest)
}

/// Builds the preview window: the next `WINDOW_LEN` gates after `seed`.
///
/// Each entry is obtained by feeding the previous one back into
/// [`next_gate_after`], so the entries are strictly increasing and exactly one
/// grid step apart.
pub fn build_window<Tz: TimeZone>(seed: &DateTime<Tz>) -> [DateTime<Tz>; WINDOW_LEN] {
    let mut previous = seed.clone();
    std::array::from_fn(|_| {
        previous = next_gate_after(&previous);
        previous.clone()
    })
}

/// Milliseconds from `now` until `gate`. Negative once the gate has passed.
pub fn millis_until<Tz: TimeZone>(gate: &DateTime<Tz>, now: &DateTime<Tz>) -> i64 {
    gate.timestamp_millis() - now.timestamp_millis()
}

/// Fraction of the current cycle already elapsed, in `[0.0, 1.0]`.
pub fn cycle_progress(time_until_ms: i64) -> f64 {
    let remaining = time_until_ms.clamp(0, GRID_STEP_MS) as f64;
    1.0 - remaining / GRID_STEP_MS as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use chrono_tz::Tz;
    use proptest::prelude::*;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, h, m, s).unwrap()
    }

    #[test]
    fn snaps_to_the_next_slot() {
        assert_eq!(next_gate_after(&utc(10, 15, 0)), utc(10, 20, 0));
        assert_eq!(next_gate_after(&utc(10, 25, 0)), utc(10, 40, 0));
        assert_eq!(next_gate_after(&utc(10, 45, 0)), utc(11, 0, 0));
    }

    #[test]
    fn boundary_does_not_return_itself() {
        assert_eq!(next_gate_after(&utc(10, 20, 0)), utc(10, 40, 0));
        assert_eq!(next_gate_after(&utc(10, 0, 0)), utc(10, 20, 0));
    }

    #[test]
    fn truncates_seconds_and_millis() {
        let reference = utc(10, 39, 59) + Duration::milliseconds(999);
        assert_eq!(next_gate_after(&reference), utc(10, 40, 0));
    }

    #[test]
    fn rolls_over_midnight() {
        let reference = utc(23, 50, 0);
        let expected = Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap();
        assert_eq!(next_gate_after(&reference), expected);
    }

    #[test]
    fn grid_follows_local_time_in_half_hour_zones() {
        // 10:15 local in Kolkata (UTC+05:30) is 04:45 UTC.
        let reference = Tz::Asia__Kolkata
            .with_ymd_and_hms(2025, 6, 14, 10, 15, 0)
            .unwrap();
        let gate = next_gate_after(&reference);
        assert_eq!((gate.hour(), gate.minute(), gate.second()), (10, 20, 0));
        assert_eq!(gate.with_timezone(&Utc), utc(4, 50, 0));
    }

    #[test]
    fn crosses_spring_forward_gap() {
        // Berlin skips 02:00..03:00 on 2025-03-30.
        let reference = Tz::Europe__Berlin
            .with_ymd_and_hms(2025, 3, 30, 1, 50, 0)
            .unwrap();
        let gate = next_gate_after(&reference);
        assert_eq!((gate.hour(), gate.minute()), (3, 0));
        assert_eq!(millis_until(&gate, &reference), 600_000);
    }

    #[test]
    fn repeated_hour_yields_gates_twice() {
        // Berlin repeats 02:00..03:00 on 2025-10-26.
        let reference = Tz::Europe__Berlin
            .with_ymd_and_hms(2025, 10, 26, 2, 40, 0)
            .earliest()
            .unwrap();
        let gate = next_gate_after(&reference);
        assert_eq!((gate.hour(), gate.minute()), (2, 0));
        assert_eq!(millis_until(&gate, &reference), GRID_STEP_MS);
    }

    #[test]
    fn stays_on_grid_across_half_hour_shift() {
        // Lord Howe falls back from +11:00 to +10:30 at 02:00 on 2025-04-06.
        let reference = Tz::Australia__Lord_Howe
            .with_ymd_and_hms(2025, 4, 6, 1, 50, 0)
            .earliest()
            .unwrap();
        let gate = next_gate_after(&reference);
        assert_eq!((gate.hour(), gate.minute(), gate.second()), (1, 40, 0));
        assert_eq!(millis_until(&gate, &reference), GRID_STEP_MS);
    }

    #[test]
    fn skips_wall_times_lost_to_half_hour_gap() {
        // Lord Howe springs forward from 02:00 +10:30 to 02:30 +11:00 on 2025-10-05.
        let reference = Tz::Australia__Lord_Howe
            .with_ymd_and_hms(2025, 10, 5, 1, 40, 0)
            .unwrap();
        let gate = next_gate_after(&reference);
        assert_eq!((gate.hour(), gate.minute()), (2, 40));
        assert_eq!(millis_until(&gate, &reference), 30 * 60 * 1000);
    }

    #[test]
    fn window_from_seed_starts_after_the_seed() {
        let window = build_window(&utc(10, 20, 0));
        assert_eq!(window, [utc(10, 40, 0), utc(11, 0, 0), utc(11, 20, 0)]);
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(cycle_progress(GRID_STEP_MS), 0.0);
        assert_eq!(cycle_progress(GRID_STEP_MS * 2), 0.0);
        assert_eq!(cycle_progress(0), 1.0);
        assert_eq!(cycle_progress(-5_000), 1.0);
        assert!((cycle_progress(GRID_STEP_MS / 4) - 0.75).abs() < f64::EPSILON);
    }

    /// Zones whose offset changes are multiples of the grid step.
    fn stepped_zone() -> impl Strategy<Value = Tz> {
        prop_oneof![
            Just(Tz::UTC),
            Just(Tz::Europe__Berlin),
            Just(Tz::America__New_York),
            Just(Tz::Asia__Kolkata),
        ]
    }

    fn any_zone() -> impl Strategy<Value = Tz> {
        prop_oneof![stepped_zone(), Just(Tz::Australia__Lord_Howe)]
    }

    proptest! {
        #[test]
        fn next_gate_is_on_grid_and_strictly_later(
            ms in 0i64..4_102_444_800_000,
            zone in any_zone(),
        ) {
            let reference = Utc.timestamp_millis_opt(ms).unwrap().with_timezone(&zone);
            let gate = next_gate_after(&reference);
            prop_assert!(gate > reference);
            prop_assert!([0, 20, 40].contains(&gate.minute()));
            prop_assert_eq!(gate.second(), 0);
            prop_assert_eq!(gate.timestamp_subsec_millis(), 0);
        }

        #[test]
        fn window_is_evenly_spaced(ms in 0i64..4_102_444_800_000, zone in stepped_zone()) {
            let seed = Utc.timestamp_millis_opt(ms).unwrap().with_timezone(&zone);
            let window = build_window(&seed);
            prop_assert_eq!(window.len(), WINDOW_LEN);
            prop_assert_eq!(&window[0], &next_gate_after(&seed));
            for pair in window.windows(2) {
                prop_assert_eq!(millis_until(&pair[1], &pair[0]), GRID_STEP_MS);
            }
        }

        #[test]
        fn snapping_twice_advances_one_step(ms in 0i64..4_102_444_800_000, zone in stepped_zone()) {
            let reference = Utc.timestamp_millis_opt(ms).unwrap().with_timezone(&zone);
            let first = next_gate_after(&reference);
            let second = next_gate_after(&first);
            prop_assert!(millis_until(&first, &reference) <= GRID_STEP_MS);
            prop_assert_eq!(millis_until(&second, &first), GRID_STEP_MS);
        }
    }
}
