//! Command Dispatcher against an in-memory controller.

mod common;

use chrono::NaiveTime;
use common::{config, ms, Rig, PATH};
use hydro_protocol::{Command, DeviceCode, Frame};
use hydro_session::{CommandDispatcher, Delivery, DispatchError, SessionEvent};

#[test]
fn test_set_actuator_while_disconnected() {
    let rig = Rig::new(config());
    let device = rig.connector.attach(PATH);
    let dispatcher = CommandDispatcher::new(rig.session.clone());

    assert_eq!(dispatcher.set_actuator("lights_top", true), Ok(Delivery::NotConnected));
    assert_eq!(rig.session.actuator_on("lights_top"), Some(true));
    assert!(device.take_received().is_empty());
    assert_eq!(
        rig.drain(),
        vec![SessionEvent::ActuatorChanged { key: "lights_top".to_string(), on: true }]
    );
}

#[test]
fn test_unknown_actuator_sends_nothing() {
    let (rig, device, _) = Rig::online(config());
    let dispatcher = CommandDispatcher::new(rig.session.clone());

    assert_eq!(
        dispatcher.set_actuator("heater", true),
        Err(DispatchError::UnknownActuator("heater".to_string()))
    );
    assert!(device.take_received().is_empty());
}

#[test]
fn test_set_actuator_round_trip() {
    let (rig, device, online_at) = Rig::online(config());
    let dispatcher = CommandDispatcher::new(rig.session.clone());

    assert_eq!(dispatcher.set_actuator("pump_bottom", true), Ok(Delivery::Sent));
    assert_eq!(device.take_lines(), vec!["PB:ON".to_string()]);
    assert_eq!(rig.session.actuator_on("pump_bottom"), Some(true));
    rig.drain();

    // The controller confirms; nothing changes and no second event fires.
    device.send_line("RELAYS:0,0,0,1,0,0,0");
    assert_eq!(rig.session.pump(online_at + ms(100)), 1);
    assert_eq!(rig.session.actuator_on("pump_bottom"), Some(true));
    assert!(rig.drain().is_empty());

    // The controller disagrees; the poll wins.
    device.send_line("RELAYS:0,0,0,0,0,0,0");
    rig.session.pump(online_at + ms(200));
    assert_eq!(rig.session.actuator_on("pump_bottom"), Some(false));
}

#[test]
fn test_command_and_relay_frame_agree() {
    let code = DeviceCode::new("DR").unwrap();
    let line = String::from_utf8(Command::SetDevice { code, on: true }.encode()).unwrap();
    assert_eq!(line, "DR:ON\n");

    let Frame::Relays(relays) = Frame::parse("RELAYS:0,0,0,0,0,0,1").unwrap() else {
        panic!("expected relays");
    };
    assert_eq!(relays.get("drain"), Some(true));
}

#[test]
fn test_toggle_and_set_all() {
    let (rig, device, _) = Rig::online(config());
    let dispatcher = CommandDispatcher::new(rig.session.clone());

    assert_eq!(dispatcher.toggle_actuator("drain"), Ok(Delivery::Sent));
    assert_eq!(dispatcher.toggle_actuator("drain"), Ok(Delivery::Sent));
    assert_eq!(device.take_lines(), vec!["DR:ON".to_string(), "DR:OFF".to_string()]);

    assert_eq!(dispatcher.set_all(false), Delivery::Sent);
    assert_eq!(
        device.take_lines(),
        vec!["LT:OFF", "LB:OFF", "PT:OFF", "PB:OFF", "ST:OFF", "SB:OFF", "DR:OFF"]
    );
}

#[test]
fn test_set_all_reports_failure() {
    let (rig, device, _) = Rig::online(config());
    let dispatcher = CommandDispatcher::new(rig.session.clone());
    device.unplug();

    assert_eq!(dispatcher.set_all(true), Delivery::Failed);
    assert!(rig.session.snapshot().actuators.iter().all(|a| a.on));
}

#[test]
fn test_reset_schedule_repolls() {
    let (rig, device, online_at) = Rig::online(config());
    let dispatcher = CommandDispatcher::new(rig.session.clone());

    let before = rig.session.snapshot();
    assert_eq!(dispatcher.reset_schedule(), Delivery::Sent);
    assert_eq!(device.take_lines(), vec!["RESET_SCHEDULE".to_string()]);
    assert_eq!(rig.session.snapshot(), before);

    // Regular slot is online_at + 3s; the reset pulled it to one second
    // after the command, which is before online_at.
    rig.session.tick(online_at + ms(500));
    assert_eq!(device.take_commands(), vec![Command::GetRelays]);
}

#[test]
fn test_sync_time() {
    let (rig, device, _) = Rig::online(config());
    let dispatcher = CommandDispatcher::new(rig.session.clone());

    let time = NaiveTime::from_hms_opt(6, 30, 0).unwrap();
    assert_eq!(dispatcher.sync_time_to(time), Delivery::Sent);
    assert_eq!(device.take_lines(), vec!["SET_TIME:06:30:00".to_string()]);

    assert_eq!(dispatcher.request_state(), Delivery::Sent);
    assert_eq!(device.take_commands(), vec![Command::GetState]);
}
