//! Wall-clock service unit tests.

use memsim_core::fw::WallClock;

#[test]
fn default_clock_tracks_the_host() {
    let clock = WallClock::new();
    let a = clock.now_ns();
    let b = clock.now_ns();
    assert!(a > 0);
    assert!(b >= a, "time never runs backwards");
}

#[test]
fn programmed_time_is_reported_back() {
    let mut clock = WallClock::new();
    let target = 1_000_000_000_000u64;
    clock.set_ns(target);
    let now = clock.now_ns();
    assert!(now >= target, "clock starts at the programmed value");
    assert!(
        now - target < 1_000_000_000,
        "and advances at host rate from there"
    );
}

#[test]
fn reprogramming_moves_the_clock_forward_or_back() {
    let mut clock = WallClock::new();
    clock.set_ns(5_000_000_000);
    let early = clock.now_ns();
    clock.set_ns(9_000_000_000_000);
    assert!(clock.now_ns() > early);
}
