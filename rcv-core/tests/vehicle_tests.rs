use core::convert::Infallible;

use embassy_time::Instant;
use embedded_hal::delay::DelayNs;
use embedded_hal_mock::eh1::delay::NoopDelay;
use rcv_core::utils::{
    connection::commands::VehicleCommand,
    controllers::{
        Actuators, ControlEvent, OutputSnapshot, UpdateOutcome, UpdatePhase, VehicleController,
    },
    math::drive::DriveOutput,
    VehicleConfig,
};

/// Actuator double that keeps the last outputs and every tail/drive write.
#[derive(Default)]
struct RecordingActuators {
    last: OutputSnapshot,
    tail_writes: Vec<u8>,
    drive_writes: Vec<DriveOutput>,
}

impl Actuators for RecordingActuators {
    type Error = Infallible;

    fn set_steering(
        &mut self,
        angle: u8,
    ) -> Result<(), Infallible> {
        self.last.steering = angle;
        Ok(())
    }

    fn set_drive(
        &mut self,
        drive: DriveOutput,
    ) -> Result<(), Infallible> {
        self.last.drive = drive;
        self.drive_writes.push(drive);
        Ok(())
    }

    fn set_headlight(
        &mut self,
        level: u8,
    ) -> Result<(), Infallible> {
        self.last.headlight = level;
        Ok(())
    }

    fn set_taillight(
        &mut self,
        level: u8,
    ) -> Result<(), Infallible> {
        self.last.taillight = level;
        self.tail_writes.push(level);
        Ok(())
    }
}

/// Delay that only adds up how long it was asked to wait.
#[derive(Default)]
struct TallyDelay {
    total_ns: u64,
}

impl DelayNs for TallyDelay {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        self.total_ns += u64::from(ns);
    }
}

fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

fn controller() -> VehicleController<RecordingActuators> {
    VehicleController::new(RecordingActuators::default(), VehicleConfig::default(), at(0))
}

fn send(
    ctrl: &mut VehicleController<RecordingActuators>,
    frame: &str,
    ms: u64,
) {
    ctrl.on_command(VehicleCommand::parse(frame), at(ms)).unwrap();
}

fn outputs(ctrl: &VehicleController<RecordingActuators>) -> OutputSnapshot {
    ctrl.actuators().last
}

#[test]
fn startup_is_neutral() {
    let ctrl = controller();
    let out = outputs(&ctrl);
    assert_eq!(out.steering, 90);
    assert_eq!(out.drive, DriveOutput::Coast);
    assert_eq!(out.headlight, 0);
    assert_eq!(out.taillight, 0);

    let state = ctrl.state();
    assert_eq!(state.max_power, 255);
    assert_eq!(state.throttle, 0);
    assert_eq!(state.watchdog.last_command(), at(0));
    assert!(!state.is_braking(at(0)));
}

#[test]
fn startup_does_not_arm_brake() {
    let mut ctrl = controller();
    send(&mut ctrl, "JOY:0,0", 10);
    assert!(!ctrl.state().is_braking(at(10)));
    assert_eq!(outputs(&ctrl).taillight, 0);
}

#[test]
fn forward_and_steering() {
    let mut ctrl = controller();
    send(&mut ctrl, "JOY:100,50", 10);
    let out = outputs(&ctrl);
    assert_eq!(out.steering, 135);
    assert_eq!(out.drive, DriveOutput::Forward(127));
    assert_eq!(out.taillight, 0);
}

#[test]
fn reverse_lights_tail_and_drives_backward() {
    let mut ctrl = controller();
    send(&mut ctrl, "JOY:0,-20", 10);
    let out = outputs(&ctrl);
    assert_eq!(out.taillight, 255);
    assert_eq!(out.drive, DriveOutput::Reverse(51));
}

#[test]
fn dead_zone_coasts_without_reverse_light() {
    let mut ctrl = controller();
    send(&mut ctrl, "JOY:0,-4", 10);
    let out = outputs(&ctrl);
    assert_eq!(out.drive, DriveOutput::Coast);
    assert_eq!(out.taillight, 0);
}

#[test]
fn brake_window_lights_then_falls_through() {
    let mut ctrl = controller();
    send(&mut ctrl, "HEAD_ON", 0);
    send(&mut ctrl, "JOY:0,40", 50);
    assert_eq!(outputs(&ctrl).taillight, 100);

    send(&mut ctrl, "JOY:0,0", 100);
    assert!(ctrl.state().is_braking(at(100)));
    assert_eq!(outputs(&ctrl).taillight, 255);
    assert_eq!(outputs(&ctrl).drive, DriveOutput::Coast);

    // Keep the link alive while the window runs out.
    for ms in (200..=2000).step_by(100) {
        send(&mut ctrl, "ALIVE", ms);
        ctrl.tick(at(ms + 50)).unwrap();
        assert_eq!(outputs(&ctrl).taillight, 255, "brake light dropped at {ms}");
    }

    send(&mut ctrl, "ALIVE", 2080);
    ctrl.tick(at(2100)).unwrap();
    assert!(!ctrl.state().is_braking(at(2100)));
    assert_eq!(ctrl.state().brake.deadline(), None);
    assert_eq!(outputs(&ctrl).taillight, 100);
}

#[test]
fn repeated_neutral_does_not_rearm_brake() {
    let mut ctrl = controller();
    send(&mut ctrl, "JOY:0,40", 0);
    send(&mut ctrl, "JOY:0,0", 100);
    let deadline = ctrl.state().brake.deadline();
    assert_eq!(deadline, Some(at(2100)));

    for ms in (150..2000).step_by(50) {
        send(&mut ctrl, "JOY:0,0", ms);
    }
    assert_eq!(ctrl.state().brake.deadline(), deadline);

    send(&mut ctrl, "JOY:0,0", 2150);
    ctrl.tick(at(2160)).unwrap();
    assert!(!ctrl.state().is_braking(at(2160)));
    send(&mut ctrl, "JOY:0,0", 2200);
    assert!(!ctrl.state().is_braking(at(2200)));
    assert_eq!(outputs(&ctrl).taillight, 0);
}

#[test]
fn new_stop_after_motion_starts_fresh_window() {
    let mut ctrl = controller();
    send(&mut ctrl, "JOY:0,40", 0);
    send(&mut ctrl, "JOY:0,0", 100);
    send(&mut ctrl, "JOY:0,30", 150);
    send(&mut ctrl, "JOY:0,0", 200);
    assert_eq!(ctrl.state().brake.deadline(), Some(at(2200)));
}

#[test]
fn max_power_caps_forward_duty() {
    let mut ctrl = controller();
    send(&mut ctrl, "MAXPOWER:50", 0);
    assert_eq!(outputs(&ctrl).drive, DriveOutput::Coast);
    send(&mut ctrl, "JOY:0,100", 10);
    assert_eq!(outputs(&ctrl).drive, DriveOutput::Forward(50));
    assert_eq!(ctrl.state().max_power, 50);
}

#[test]
fn max_power_only_moves_the_ceiling() {
    let mut ctrl = controller();
    send(&mut ctrl, "JOY:0,100", 0);
    let writes = ctrl.actuators().drive_writes.len();
    send(&mut ctrl, "MAXPOWER:20", 10);
    assert_eq!(ctrl.actuators().drive_writes.len(), writes);
    assert_eq!(outputs(&ctrl).drive, DriveOutput::Forward(255));
}

#[test]
fn drive_outputs_never_overlap() {
    let mut ctrl = controller();
    send(&mut ctrl, "MAXPOWER:120", 0);
    for throttle in -100..=100 {
        ctrl.on_command(
            VehicleCommand::Joystick {
                steer: 0,
                throttle,
            },
            at(1),
        )
        .unwrap();
        let (fwd, bwd) = outputs(&ctrl).drive.duties();
        assert!(fwd == 0 || bwd == 0);
        assert!(fwd <= 120 && bwd <= 120);
    }
}

#[test]
fn watchdog_stops_motor_but_holds_steering() {
    let mut ctrl = controller();
    send(&mut ctrl, "JOY:30,60", 0);
    let steering = outputs(&ctrl).steering;
    assert_eq!(steering, 103);

    ctrl.tick(at(200)).unwrap();
    assert_eq!(outputs(&ctrl).drive, DriveOutput::Forward(153));

    ctrl.tick(at(201)).unwrap();
    let out = outputs(&ctrl);
    assert_eq!(out.drive, DriveOutput::Coast);
    assert_eq!(out.steering, steering);
    assert_eq!(ctrl.state().throttle, 0);
    assert_eq!(ctrl.state().steer, 30);
}

#[test]
fn watchdog_stop_clears_brake_without_arming() {
    let mut ctrl = controller();
    send(&mut ctrl, "JOY:0,40", 0);
    send(&mut ctrl, "JOY:0,0", 50);
    assert!(ctrl.state().is_braking(at(60)));

    ctrl.tick(at(400)).unwrap();
    assert!(!ctrl.state().is_braking(at(400)));
    assert_eq!(outputs(&ctrl).taillight, 0);

    // Link comes back with neutral throttle: no new brake window.
    send(&mut ctrl, "JOY:0,0", 450);
    assert!(!ctrl.state().is_braking(at(450)));
}

#[test]
fn any_frame_feeds_the_watchdog() {
    let mut ctrl = controller();
    send(&mut ctrl, "JOY:0,60", 0);
    send(&mut ctrl, "garbage", 150);
    send(&mut ctrl, "ALIVE", 300);
    ctrl.tick(at(450)).unwrap();
    assert_eq!(outputs(&ctrl).drive, DriveOutput::Forward(153));
    assert_eq!(ctrl.state().watchdog.last_command(), at(300));
}

#[test]
fn disconnect_stops_immediately() {
    let mut ctrl = controller();
    send(&mut ctrl, "JOY:-50,-80", 0);
    send(&mut ctrl, "JOY:-50,0", 10);
    assert!(ctrl.state().is_braking(at(20)));

    ctrl.handle_event(ControlEvent::Disconnected, at(20), &mut NoopDelay::new())
        .unwrap();
    let out = outputs(&ctrl);
    assert_eq!(out.drive, DriveOutput::Coast);
    assert_eq!(out.taillight, 0);
    assert_eq!(out.steering, 67);
    assert!(!ctrl.state().is_braking(at(20)));
}

#[test]
fn headlight_modes() {
    let mut ctrl = controller();
    send(&mut ctrl, "HEAD_ON", 0);
    assert_eq!(outputs(&ctrl).headlight, 90);
    assert_eq!(outputs(&ctrl).taillight, 100);
    assert!(ctrl.state().headlights_on);
    assert!(ctrl.state().running_lights_requested);

    send(&mut ctrl, "HEAD_HIGH", 10);
    assert_eq!(outputs(&ctrl).headlight, 255);
    assert_eq!(outputs(&ctrl).taillight, 100);

    send(&mut ctrl, "HEAD_LOW", 20);
    assert_eq!(outputs(&ctrl).headlight, 90);

    send(&mut ctrl, "HEAD_OFF", 30);
    assert_eq!(outputs(&ctrl).headlight, 0);
    assert_eq!(outputs(&ctrl).taillight, 0);
    assert!(!ctrl.state().headlights_on);
}

#[test]
fn update_signaling_overrides_brake_and_reverse() {
    let mut ctrl = controller();
    let mut delay = NoopDelay::new();
    send(&mut ctrl, "JOY:0,40", 0);
    send(&mut ctrl, "JOY:0,0", 10);
    ctrl.handle_event(ControlEvent::UpdateStarted, at(20), &mut delay)
        .unwrap();
    assert!(ctrl.state().update_signaling_active);
    send(&mut ctrl, "JOY:0,-20", 30);
    assert!(ctrl.state().is_braking(at(30)));
    assert_eq!(ctrl.state().throttle, -20);
    // Driving still responds.
    assert_eq!(outputs(&ctrl).drive, DriveOutput::Reverse(51));

    let writes_before = ctrl.actuators().tail_writes.len();
    send(&mut ctrl, "ALIVE", 150);
    ctrl.tick(at(200)).unwrap();
    assert_eq!(ctrl.actuators().tail_writes.len(), writes_before);

    send(&mut ctrl, "ALIVE", 300);
    ctrl.tick(at(320)).unwrap();
    assert_eq!(outputs(&ctrl).taillight, 255);

    send(&mut ctrl, "JOY:0,-20", 500);
    send(&mut ctrl, "HEAD_HIGH", 550);
    assert_eq!(outputs(&ctrl).headlight, 255);
    ctrl.tick(at(620)).unwrap();
    assert_eq!(outputs(&ctrl).taillight, 20);

    send(&mut ctrl, "ALIVE", 900);
    ctrl.tick(at(920)).unwrap();
    assert_eq!(outputs(&ctrl).taillight, 255);

    let blink: Vec<u8> = ctrl.actuators().tail_writes[writes_before..].to_vec();
    assert_eq!(blink, vec![255, 20, 255]);
}

#[test]
fn update_signaling_survives_link_loss() {
    let mut ctrl = controller();
    ctrl.on_update_started(at(0));
    ctrl.tick(at(300)).unwrap();
    assert_eq!(outputs(&ctrl).taillight, 255);
    ctrl.tick(at(600)).unwrap();
    assert_eq!(outputs(&ctrl).taillight, 20);
    assert_eq!(outputs(&ctrl).drive, DriveOutput::Coast);
}

#[test]
fn update_finish_plays_flourish_then_resumes() {
    let mut ctrl = controller();
    let mut delay = TallyDelay::default();
    send(&mut ctrl, "HEAD_ON", 0);
    ctrl.on_update_started(at(10));
    ctrl.tick(at(310)).unwrap();
    let before = ctrl.actuators().tail_writes.len();

    ctrl.handle_event(
        ControlEvent::UpdateFinished(UpdateOutcome::Failure),
        at(320),
        &mut delay,
    )
    .unwrap();

    assert_eq!(ctrl.update_phase(), UpdatePhase::Idle);
    assert!(!ctrl.state().update_signaling_active);
    assert_eq!(delay.total_ns, 1_440_000_000);

    let writes = &ctrl.actuators().tail_writes[before..];
    let mut expected = Vec::new();
    for _ in 0..6 {
        expected.extend_from_slice(&[255, 0]);
    }
    // Running lights come back once the flourish is done.
    expected.push(100);
    assert_eq!(writes, expected.as_slice());

    // Blinking has stopped.
    send(&mut ctrl, "ALIVE", 2000);
    ctrl.tick(at(2000)).unwrap();
    assert_eq!(outputs(&ctrl).taillight, 100);
}

#[test]
fn update_finish_without_start_is_ignored() {
    let mut ctrl = controller();
    let mut delay = TallyDelay::default();
    let before = ctrl.actuators().tail_writes.len();
    ctrl.on_update_finished(UpdateOutcome::Success, at(5), &mut delay)
        .unwrap();
    assert_eq!(delay.total_ns, 0);
    assert_eq!(ctrl.actuators().tail_writes.len(), before);
}
