use std::sync::Arc;
use std::time::{Duration, Instant};

use rstest::rstest;
use servo_core::mocks::DeadTransport;
use servo_core::{
    CommandError, ConnectionState, ControlSession, Direction, IngestMode, Ingested, LinkError,
    SerialLink, SessionCfg, SessionEvent, SessionState, Speed,
};
use servo_hardware::SimulatedServo;
use servo_traits::clock::test_clock::ManualClock;

fn manual_cfg() -> SessionCfg {
    SessionCfg {
        ingest_mode: IngestMode::Manual,
        ..SessionCfg::default()
    }
}

fn sim_session() -> (SimulatedServo, ControlSession) {
    let servo = SimulatedServo::new(90.0);
    let link = SerialLink::simulated(&servo).unwrap();
    (servo, ControlSession::new(Some(link), manual_cfg()))
}

#[rstest]
#[case(Direction::Clockwise, 30, 30)]
#[case(Direction::CounterClockwise, 30, 150)]
#[case(Direction::CounterClockwise, 0, 180)]
#[case(Direction::CounterClockwise, 180, 0)]
fn start_sends_direction_mapped_angle(
    #[case] direction: Direction,
    #[case] gui: u16,
    #[case] servo_angle: u16,
) {
    let (servo, session) = sim_session();
    session.set_direction(direction);
    session.set_target(gui).unwrap();
    session.start(Speed::new(2).unwrap()).unwrap();
    assert_eq!(servo.received(), vec![format!("START,{servo_angle},2")]);
    let view = session.display_state();
    assert_eq!(view.servo_angle, servo_angle);
    assert_eq!(view.session_state, SessionState::Running);
}

#[test]
fn target_above_range_is_rejected() {
    let session = ControlSession::new(None, manual_cfg());
    assert_eq!(session.set_target(181), Err(CommandError::InvalidTarget(181)));
    assert_eq!(session.display_state().gui_angle, 90);
}

#[test]
fn start_without_link_is_refused() {
    let session = ControlSession::new(None, manual_cfg());
    assert_eq!(session.start(Speed::FASTEST), Err(CommandError::NotConnected));
    assert_eq!(session.session_state(), SessionState::Stopped);
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn start_send_failure_stays_stopped() {
    let (servo, session) = sim_session();
    servo.fail_next_write();
    let err = session.start(Speed::FASTEST).unwrap_err();
    assert!(matches!(err, CommandError::Send(LinkError::Io(_))));
    assert_eq!(session.session_state(), SessionState::Stopped);
    assert_eq!(session.connection_state(), ConnectionState::Faulted);
    // faulted link is treated as not connected
    assert_eq!(session.start(Speed::FASTEST), Err(CommandError::NotConnected));
}

#[test]
fn failed_start_keeps_previous_commanded_angle() {
    let (servo, session) = sim_session();
    session.set_target(30).unwrap();
    session.start(Speed::FASTEST).unwrap();
    session.set_target(60).unwrap();
    servo.fail_next_write();
    assert!(session.start(Speed::FASTEST).is_err());

    let Ingested::Sample(s) = session.ingest_line("Angle:25") else {
        panic!("expected a sample");
    };
    assert_eq!(s.commanded_angle, 30.0);
    assert_eq!(session.session_state(), SessionState::Stopped);
}

#[test]
fn feedback_before_any_command_is_not_recorded() {
    let session = ControlSession::new(None, manual_cfg());
    assert_eq!(session.ingest_line("Angle:12"), Ingested::Feedback(12.0));
    assert_eq!(session.sample_count(), 0);
    assert_eq!(session.display_state().current_feedback, Some(12.0));
    assert_eq!(session.display_state().current_error, None);
}

#[test]
fn samples_use_last_commanded_angle() {
    let clock = ManualClock::starting_at(50.0);
    let servo = SimulatedServo::new(90.0);
    let link = SerialLink::simulated(&servo).unwrap();
    let session = ControlSession::with_clock(Some(link), manual_cfg(), Arc::new(clock));

    session.set_target(120).unwrap();
    session.start(Speed::FASTEST).unwrap();
    // changing the target after start does not restamp samples
    session.set_target(10).unwrap();

    let Ingested::Sample(s) = session.ingest_line("Angle:100.5") else {
        panic!("expected a sample");
    };
    assert_eq!(s.commanded_angle, 120.0);
    assert_eq!(s.feedback_angle, 100.5);
    assert_eq!(s.error, 19.5);
    assert_eq!(s.timestamp, 50.0);
    assert_eq!(session.display_state().current_error, Some(19.5));
}

#[test]
fn target_reached_stops_exactly_once() {
    let (_servo, session) = sim_session();
    let events = session.subscribe();
    session.start(Speed::FASTEST).unwrap();
    assert_eq!(session.ingest_line("TARGET_REACHED"), Ingested::AutoStopped);
    assert_eq!(session.ingest_line("TARGET_REACHED"), Ingested::Ignored);
    assert_eq!(session.session_state(), SessionState::Stopped);
    let auto: Vec<_> = events
        .try_iter()
        .filter(|e| *e == SessionEvent::AutoStopped)
        .collect();
    assert_eq!(auto.len(), 1);
}

#[rstest]
#[case("Angle:garbage")]
#[case("Servo ready")]
#[case("")]
fn noise_changes_nothing(#[case] line: &str) {
    let (_servo, session) = sim_session();
    session.start(Speed::FASTEST).unwrap();
    let before = session.display_state();
    assert_eq!(session.ingest_line(line), Ingested::Ignored);
    assert_eq!(session.display_state(), before);
    assert_eq!(session.sample_count(), 0);
}

#[test]
fn stop_is_local_even_when_disconnected() {
    let (servo, session) = sim_session();
    session.start(Speed::FASTEST).unwrap();
    servo.unplug();
    session.stop();
    assert_eq!(session.session_state(), SessionState::Stopped);
}

#[test]
fn reset_restores_home_and_clears_data() {
    let (servo, session) = sim_session();
    session.set_direction(Direction::CounterClockwise);
    session.set_target(40).unwrap();
    session.start(Speed::SLOWEST).unwrap();
    session.ingest_line("Angle:100");
    assert_eq!(session.sample_count(), 1);

    session.reset();

    let view = session.display_state();
    assert_eq!(view.direction, Direction::Clockwise);
    assert_eq!(view.gui_angle, 90);
    assert_eq!(view.session_state, SessionState::Stopped);
    assert_eq!(view.current_feedback, None);
    assert_eq!(session.sample_count(), 0);
    assert_eq!(session.statistics(), None);
    assert_eq!(servo.received().last().map(String::as_str), Some("RESET,90"));

    // after a reset feedback is stamped against home
    let Ingested::Sample(s) = session.ingest_line("Angle:88") else {
        panic!("expected a sample");
    };
    assert_eq!(s.commanded_angle, 90.0);
    assert_eq!(s.sequence, 1);
}

#[test]
fn clear_data_keeps_control_state() {
    let (_servo, session) = sim_session();
    session.start(Speed::FASTEST).unwrap();
    session.ingest_line("Angle:80");
    session.clear_data();
    assert_eq!(session.sample_count(), 0);
    assert_eq!(session.session_state(), SessionState::Running);
}

#[test]
fn full_event_queue_drops_without_blocking() {
    let cfg = SessionCfg {
        event_queue: 2,
        ..manual_cfg()
    };
    let session = ControlSession::new(None, cfg);
    let events = session.subscribe();
    for i in 0..10 {
        session.ingest_line(&format!("Angle:{i}"));
    }
    assert_eq!(events.try_iter().count(), 2);
}

#[test]
fn full_event_queue_keeps_newest_events() {
    let (_servo, session) = {
        let servo = SimulatedServo::new(90.0);
        let link = SerialLink::simulated(&servo).unwrap();
        let cfg = SessionCfg {
            event_queue: 4,
            ..manual_cfg()
        };
        (servo, ControlSession::new(Some(link), cfg))
    };
    let events = session.subscribe();
    session.start(Speed::FASTEST).unwrap();
    for i in 0..10 {
        session.ingest_line(&format!("Angle:{i}"));
    }
    assert_eq!(session.ingest_line("TARGET_REACHED"), Ingested::AutoStopped);

    let got: Vec<_> = events.try_iter().collect();
    assert_eq!(got.len(), 4);
    assert_eq!(got.last(), Some(&SessionEvent::AutoStopped));
    let feedback: Vec<f64> = got
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Feedback { feedback, .. } => Some(*feedback),
            _ => None,
        })
        .collect();
    assert_eq!(feedback, vec![7.0, 8.0, 9.0]);
}

#[test]
fn late_subscriber_sees_recent_events() {
    let cfg = SessionCfg {
        event_queue: 3,
        ..manual_cfg()
    };
    let session = ControlSession::new(None, cfg);
    for i in 0..10 {
        session.ingest_line(&format!("Angle:{i}"));
    }
    let events = session.subscribe();
    let feedback: Vec<f64> = events
        .try_iter()
        .filter_map(|e| match e {
            SessionEvent::Feedback { feedback, .. } => Some(feedback),
            _ => None,
        })
        .collect();
    assert_eq!(feedback, vec![7.0, 8.0, 9.0]);
}

#[test]
fn concurrent_commands_never_tear_samples() {
    let servo = SimulatedServo::new(90.0);
    let link = SerialLink::simulated(&servo).unwrap();
    let cfg = SessionCfg {
        buffer_capacity: 10_000,
        ..manual_cfg()
    };
    let session = ControlSession::new(Some(link), cfg);
    session.start(Speed::FASTEST).unwrap();

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..200u16 {
                session.set_direction(if i % 2 == 0 {
                    Direction::Clockwise
                } else {
                    Direction::CounterClockwise
                });
                session.set_target(i % 181).unwrap();
                session.start(Speed::FASTEST).unwrap();
            }
        });
        s.spawn(|| {
            for i in 0..2000u32 {
                session.ingest_line(&format!("Angle:{}", i % 180));
            }
        });
    });

    let written: Vec<f64> = servo
        .received()
        .iter()
        .filter_map(|l| l.strip_prefix("START,"))
        .filter_map(|rest| rest.split(',').next())
        .map(|a| a.parse::<f64>().unwrap())
        .collect();
    assert_eq!(written.len(), 201);

    let samples = session.samples();
    assert_eq!(samples.len(), 2000);
    for s in &samples {
        assert!(
            written.contains(&s.commanded_angle),
            "sample {} stamped with {} which was never sent",
            s.sequence,
            s.commanded_angle
        );
        assert_eq!(s.error, s.commanded_angle - s.feedback_angle);
    }
}

#[test]
fn reconnect_after_fault() {
    let (servo, session) = sim_session();
    servo.fail_next_write();
    assert!(session.start(Speed::FASTEST).is_err());
    session.reconnect().unwrap();
    assert_eq!(session.connection_state(), ConnectionState::Connected);
    session.start(Speed::FASTEST).unwrap();
}

#[test]
fn attach_link_replaces_missing_link() {
    let session = ControlSession::new(None, manual_cfg());
    assert!(session.reconnect().is_err());
    let link = SerialLink::with_opener("dead", || Ok(DeadTransport::pair())).unwrap();
    session.attach_link(link);
    assert_eq!(session.connection_state(), ConnectionState::Connected);
    assert!(matches!(
        session.start(Speed::FASTEST),
        Err(CommandError::Send(_))
    ));
}

#[test]
fn pump_applies_lines_from_the_link() {
    let (servo, session) = sim_session();
    session.start(Speed::FASTEST).unwrap();
    servo.inject_line("Angle:70");
    // the simulator also moves toward the target; pump whatever arrives first
    let got = session.pump(Duration::from_millis(500));
    assert!(matches!(got, Some(Ingested::Sample(_))), "{got:?}");
}

#[test]
fn export_writes_session_samples() {
    let (_servo, session) = sim_session();
    session.start(Speed::FASTEST).unwrap();
    session.ingest_line("Angle:89");
    session.ingest_line("Angle:90");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
    session.export_csv(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 3);
}

#[test]
fn background_ingestion_reaches_target() {
    let servo = SimulatedServo::new(90.0).with_tick(Duration::from_millis(2));
    let link = SerialLink::simulated(&servo).unwrap();
    let cfg = SessionCfg {
        ingest: servo_core::IngestCfg {
            read_timeout: Duration::from_millis(100),
            idle_backoff: Duration::from_millis(5),
        },
        ..SessionCfg::default()
    };
    let mut session = ControlSession::new(Some(link), cfg);
    let events = session.subscribe();

    session.set_target(120).unwrap();
    session.start(Speed::FASTEST).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut stopped = false;
    while Instant::now() < deadline {
        if let Ok(SessionEvent::AutoStopped) = events.recv_timeout(Duration::from_millis(100)) {
            stopped = true;
            break;
        }
    }
    assert!(stopped, "no auto-stop within 5 s");
    assert_eq!(session.session_state(), SessionState::Stopped);
    let last = *session.samples().last().unwrap();
    assert_eq!(last.commanded_angle, 120.0);
    assert_eq!(last.feedback_angle, 120.0);
    let stats = session.statistics().unwrap();
    assert!(stats.count >= 6);
    assert!(session.lines_ingested() > 0);

    session.shutdown();
    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn background_ingestion_reports_fault_once() {
    let servo = SimulatedServo::default();
    let link = SerialLink::simulated(&servo).unwrap();
    let cfg = SessionCfg {
        ingest: servo_core::IngestCfg {
            read_timeout: Duration::from_millis(50),
            idle_backoff: Duration::from_millis(5),
        },
        ..SessionCfg::default()
    };
    let session = ControlSession::new(Some(link), cfg);
    let events = session.subscribe();
    servo.unplug();

    let deadline = Instant::now() + Duration::from_secs(3);
    while session.connection_state() != ConnectionState::Faulted && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    std::thread::sleep(Duration::from_millis(100));
    let faults = events
        .try_iter()
        .filter(|e| *e == SessionEvent::LinkFaulted)
        .count();
    assert_eq!(faults, 1);
}
