//! Two earbuds negotiating quiet mode over latest-wins links

use earbud_anc::config::EarSide;
use earbud_anc::quiet_mode::QuietModeDirection;
use earbud_anc::sim::SimulatedPair;
use earbud_anc::timer::TimerKind;
use earbud_anc::{AncMode, Config, Event};

mod common;
use common::ms;

const ENABLE_FIRE: TimerKind = TimerKind::QuietModeFire(QuietModeDirection::Enable);

fn pair() -> SimulatedPair {
    let mut pair = SimulatedPair::simulated(&Config::default());
    pair.bring_up();
    pair
}

fn quiet(pair: &SimulatedPair, side: EarSide) -> bool {
    pair.manager(side).quiet_mode().local().enabled
}

fn initiators(pair: &SimulatedPair) -> usize {
    [EarSide::Left, EarSide::Right]
        .into_iter()
        .filter(|side| pair.manager(*side).quiet_mode().local().enable_requested)
        .count()
}

#[test]
fn same_tick_detection_elects_one_initiator() {
    let mut pair = pair();

    pair.dispatch(EarSide::Left, Event::QuietModeDetected).unwrap();
    pair.dispatch(EarSide::Right, Event::QuietModeDetected).unwrap();
    assert_eq!(initiators(&pair), 0, "neither has seen the other yet");

    pair.deliver();
    assert_eq!(initiators(&pair), 1);
    assert!(pair.timer(EarSide::Left).is_armed(ENABLE_FIRE));
    assert!(pair.timer(EarSide::Right).is_armed(ENABLE_FIRE));

    pair.run_until(ms(199));
    assert!(!quiet(&pair, EarSide::Left));
    assert!(!quiet(&pair, EarSide::Right));

    pair.run_until(ms(200));
    assert!(quiet(&pair, EarSide::Left));
    assert!(quiet(&pair, EarSide::Right));
}

#[test]
fn single_side_detection_never_transitions() {
    let mut pair = pair();

    pair.dispatch(EarSide::Left, Event::QuietModeDetected).unwrap();
    pair.run_for(ms(1000));

    assert!(!pair.timer(EarSide::Left).is_armed(ENABLE_FIRE));
    assert!(!pair.timer(EarSide::Right).is_armed(ENABLE_FIRE));
    assert!(!quiet(&pair, EarSide::Left));
    assert!(!quiet(&pair, EarSide::Right));
    assert!(pair.manager(EarSide::Right).quiet_mode().remote().detected);
}

#[test]
fn later_detector_initiates() {
    let mut pair = pair();

    pair.dispatch(EarSide::Left, Event::QuietModeDetected).unwrap();
    pair.run_until(ms(50));
    pair.dispatch(EarSide::Right, Event::QuietModeDetected).unwrap();
    assert!(pair.manager(EarSide::Right).quiet_mode().local().enable_requested);

    pair.run_until(ms(249));
    assert!(!quiet(&pair, EarSide::Left));

    pair.run_until(ms(250));
    assert!(quiet(&pair, EarSide::Left));
    assert!(quiet(&pair, EarSide::Right));
}

#[test]
fn either_side_clearing_disables_both() {
    let mut pair = pair();
    pair.dispatch_both(Event::QuietModeDetected);
    pair.run_until(ms(200));
    assert!(quiet(&pair, EarSide::Right));

    pair.dispatch(EarSide::Right, Event::QuietModeCleared).unwrap();
    pair.run_until(ms(399));
    assert!(quiet(&pair, EarSide::Left));

    pair.run_until(ms(400));
    assert!(!quiet(&pair, EarSide::Left));
    assert!(!quiet(&pair, EarSide::Right));
}

#[test]
fn mode_change_abandons_only_the_local_side() {
    let mut pair = pair();
    pair.dispatch_both(Event::QuietModeDetected);
    pair.deliver();

    // no cancel is sent, so the follower still fires at the agreed instant
    pair.dispatch(EarSide::Left, Event::SetMode(AncMode::new(1))).unwrap();
    pair.run_until(ms(300));

    assert!(!quiet(&pair, EarSide::Left));
    assert!(quiet(&pair, EarSide::Right));
    assert_eq!(pair.manager(EarSide::Left).current_mode(), AncMode::new(1));
}

#[test]
fn crossed_detection_records_settle_on_one_instant() {
    let mut pair = pair();
    pair.dispatch_both(Event::QuietModeDetected);

    // each side reads the other's plain detection before any request
    assert_eq!(pair.deliver_crossed(), 2);
    assert_eq!(initiators(&pair), 2);

    pair.deliver();
    assert_eq!(initiators(&pair), 1);
    assert!(pair.manager(EarSide::Left).quiet_mode().local().enable_requested);
    assert_eq!(
        pair.timer(EarSide::Left).remaining(ENABLE_FIRE),
        pair.timer(EarSide::Right).remaining(ENABLE_FIRE)
    );

    pair.run_until(ms(199));
    assert!(!quiet(&pair, EarSide::Left));
    assert!(!quiet(&pair, EarSide::Right));

    pair.run_until(ms(200));
    assert!(quiet(&pair, EarSide::Left));
    assert!(quiet(&pair, EarSide::Right));
}
