//! Voice-call override tests

use earbud_anc::config::CallConfig;
use earbud_anc::{AncMode, AncState, Config, Event};

mod common;
use common::{AudioCall, Rig, static_config};

const CALL_MODE: AncMode = AncMode::new(1);

#[test]
fn call_enables_anc_in_call_mode_and_restores_on_end() {
    let mut rig = Rig::powered(static_config());
    assert_eq!(rig.manager.state(), AncState::Disabled);

    rig.dispatch(Event::ImplicitEnable).unwrap();
    assert!(rig.manager.is_enabled());
    assert_eq!(rig.manager.current_mode(), CALL_MODE);
    assert!(rig.manager.runtime().implicit_enable_active);
    assert!(!rig.manager.runtime().user_initiated_enable);

    rig.dispatch(Event::ImplicitDisable).unwrap();
    assert_eq!(rig.manager.state(), AncState::Disabled);
    assert!(!rig.manager.runtime().implicit_enable_active);
}

#[test]
fn user_reenable_during_call_survives_call_end() {
    let mut rig = Rig::powered(static_config());
    rig.dispatch(Event::ImplicitEnable).unwrap();

    rig.dispatch(Event::Disable).unwrap();
    rig.dispatch(Event::Enable).unwrap();
    assert!(rig.manager.runtime().user_initiated_enable);

    rig.dispatch(Event::ImplicitDisable).unwrap();
    assert!(rig.manager.is_enabled());
    assert!(!rig.manager.runtime().user_initiated_enable);
}

#[test]
fn call_overrides_mode_of_enabled_anc() {
    let mut rig = Rig::powered(static_config());
    rig.dispatch(Event::Enable).unwrap();
    rig.dispatch(Event::SetMode(AncMode::new(3))).unwrap();

    rig.dispatch(Event::ImplicitEnable).unwrap();
    assert_eq!(rig.manager.current_mode(), CALL_MODE);
    assert_eq!(rig.manager.runtime().previous_mode, AncMode::new(3));
    assert!(rig.manager.runtime().mode_override_active);
    // the override itself is not a user switch
    assert!(!rig.manager.runtime().user_initiated_mode_switch);

    rig.dispatch(Event::ImplicitDisable).unwrap();
    assert_eq!(rig.manager.current_mode(), AncMode::new(3));
    assert!(rig.manager.is_enabled());
}

#[test]
fn user_mode_switch_during_call_wins() {
    let mut rig = Rig::powered(static_config());
    rig.dispatch(Event::Enable).unwrap();

    rig.dispatch(Event::ImplicitEnable).unwrap();
    rig.dispatch(Event::SetMode(AncMode::new(4))).unwrap();

    rig.dispatch(Event::ImplicitDisable).unwrap();
    assert_eq!(rig.manager.current_mode(), AncMode::new(4));
}

#[test]
fn call_in_call_mode_changes_nothing() {
    let mut rig = Rig::powered(static_config());
    rig.dispatch(Event::Enable).unwrap();
    rig.dispatch(Event::SetMode(CALL_MODE)).unwrap();
    rig.audio.clear();

    rig.dispatch(Event::ImplicitEnable).unwrap();
    rig.dispatch(Event::ImplicitDisable).unwrap();

    assert_eq!(rig.manager.current_mode(), CALL_MODE);
    assert!(rig.audio.calls().is_empty());
}

#[test]
fn call_override_can_be_turned_off() {
    let config = Config {
        call: CallConfig {
            implicit_enable: false,
            ..CallConfig::default()
        },
        ..static_config()
    };
    let mut rig = Rig::powered(config);

    rig.dispatch(Event::ImplicitEnable).unwrap();
    assert_eq!(rig.manager.state(), AncState::Disabled);
    rig.dispatch(Event::ImplicitDisable).unwrap();
    assert_eq!(rig.audio.count(AudioCall::EnableHardwareMuted), 0);
}

#[test]
fn call_end_with_adaptive_anc_uses_gentle_mute() {
    let mut rig = Rig::powered(Config::default());
    rig.dispatch(Event::ImplicitEnable).unwrap();
    rig.run_for(common::ms(0));
    assert!(rig.audio.with(|s| s.adaptive_active));

    rig.dispatch(Event::ImplicitDisable).unwrap();
    assert_eq!(rig.audio.count(AudioCall::GentleMute), 1);
    assert!(rig.manager.is_enabled());

    rig.run_for(common::ms(100));
    assert_eq!(rig.manager.state(), AncState::Disabled);
}

#[test]
fn call_events_rejected_while_powered_off() {
    let mut rig = Rig::new(Config::default());
    rig.dispatch(Event::Initialise).unwrap();

    assert!(rig.dispatch(Event::ImplicitEnable).unwrap_err().is_rejection());
}
