//! Subcommand execution: connect, drive the session, report.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use serde_json::json;
use servo_core::error::Result;
use servo_core::{
    ConnectionState, ControlSession, Direction, DisplayState, LinkCfg, LinkError, SerialLink,
    SessionCfg, SessionEvent, SessionState, Speed, Statistics,
};
use servo_hardware::SimulatedServo;

use crate::cli::{Cli, Commands};

/// CLI-level failures that are not core errors.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("target {angle} not reached within {waited_ms} ms")]
    TargetTimeout { angle: u16, waited_ms: u64 },
    #[error("interrupted")]
    Interrupted,
    #[error("self-check failed: {0}")]
    SelfCheck(String),
}

/// Simulator feedback period; fast enough that CLI runs finish quickly.
const SIM_TICK: Duration = Duration::from_millis(10);

pub fn dispatch(cli: &Cli, cfg: &servo_config::Config, shutdown: Arc<AtomicBool>) -> Result<()> {
    match &cli.cmd {
        Commands::Ports => list_ports(cli.json),
        Commands::Move {
            angle,
            speed,
            ccw,
            timeout_ms,
            export,
        } => {
            let session = open_session(cli.sim, cfg)?;
            let req = MoveRequest {
                angle: *angle,
                speed: speed.unwrap_or(cfg.control.default_speed),
                direction: if *ccw {
                    Direction::CounterClockwise
                } else {
                    Direction::Clockwise
                },
                timeout: Duration::from_millis(*timeout_ms),
                status_every: Duration::from_millis(cfg.display.update_interval_ms),
            };
            let outcome = run_move(&session, &req, cli.json, &shutdown);
            finish(&session, export.as_deref(), cli.json)?;
            outcome
        }
        Commands::Monitor {
            duration_ms,
            export,
        } => {
            let session = open_session(cli.sim, cfg)?;
            run_monitor(
                &session,
                Duration::from_millis(*duration_ms),
                Duration::from_millis(cfg.display.update_interval_ms),
                cli.json,
                &shutdown,
            );
            finish(&session, export.as_deref(), cli.json)
        }
        Commands::Reset => {
            let session = open_session(cli.sim, cfg)?;
            session.reset();
            if session.connection_state() == ConnectionState::Faulted {
                return Err(LinkError::Faulted.into());
            }
            let home = cfg.control.home_angle;
            if cli.json {
                println!("{}", json!({ "event": "reset", "home_angle": home }));
            } else {
                println!("Reset sent: home angle {home} deg");
            }
            Ok(())
        }
        Commands::SelfCheck => self_check(cli.json, cfg),
    }
}

fn list_ports(as_json: bool) -> Result<()> {
    let ports = servo_hardware::list_ports()?;
    if as_json {
        let arr: Vec<_> = ports
            .iter()
            .map(|p| json!({ "name": p.name, "description": p.description }))
            .collect();
        println!("{}", serde_json::Value::Array(arr));
    } else if ports.is_empty() {
        println!("No serial ports found");
    } else {
        for p in &ports {
            println!("{:<24} {}", p.name, p.description);
        }
    }
    Ok(())
}

fn open_session(sim: bool, cfg: &servo_config::Config) -> Result<ControlSession> {
    let link = if sim {
        let servo =
            SimulatedServo::new(f64::from(cfg.control.home_angle)).with_tick(SIM_TICK);
        SerialLink::simulated(&servo)?
    } else {
        SerialLink::open(&LinkCfg::from(&cfg.serial))?
    };
    tracing::info!(port = link.name(), "session opened");
    Ok(ControlSession::new(Some(link), SessionCfg::from(cfg)))
}

struct MoveRequest {
    angle: u16,
    speed: u8,
    direction: Direction,
    timeout: Duration,
    status_every: Duration,
}

fn run_move(
    session: &ControlSession,
    req: &MoveRequest,
    as_json: bool,
    shutdown: &AtomicBool,
) -> Result<()> {
    let events = session.subscribe();
    session.set_direction(req.direction);
    session.set_target(req.angle)?;
    let speed = Speed::new(req.speed)?;
    session.start(speed)?;

    let view = session.display_state();
    if as_json {
        println!(
            "{}",
            json!({
                "event": "start",
                "gui_angle": view.gui_angle,
                "servo_angle": view.servo_angle,
                "direction": view.direction.to_string(),
                "speed": speed.get(),
            })
        );
    } else {
        println!(
            "Moving to {} deg ({}, servo {} deg) at speed {}",
            view.gui_angle,
            view.direction,
            view.servo_angle,
            speed.get()
        );
    }

    let t0 = Instant::now();
    let deadline = t0 + req.timeout;
    let mut next_status = t0 + req.status_every;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            session.stop();
            return Err(RunError::Interrupted.into());
        }
        // A stop seen here means TARGET_REACHED was handled even if its
        // event went to another subscriber.
        if session.session_state() == SessionState::Stopped {
            break;
        }
        let now = Instant::now();
        if now >= deadline {
            session.stop();
            return Err(RunError::TargetTimeout {
                angle: req.angle,
                waited_ms: u64::try_from(req.timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into());
        }
        let wait = deadline.min(next_status).saturating_duration_since(now);
        match events.recv_timeout(wait) {
            Ok(SessionEvent::AutoStopped) => break,
            Ok(SessionEvent::LinkFaulted) => {
                session.stop();
                return Err(LinkError::Faulted.into());
            }
            Ok(SessionEvent::Feedback { .. }) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if Instant::now() >= next_status {
            print_status(&session.display_state(), as_json);
            next_status += req.status_every;
        }
    }

    let elapsed_ms = u64::try_from(t0.elapsed().as_millis()).unwrap_or(u64::MAX);
    if as_json {
        println!(
            "{}",
            json!({ "event": "target_reached", "angle": req.angle, "elapsed_ms": elapsed_ms })
        );
    } else {
        println!("Target reached in {elapsed_ms} ms");
    }
    Ok(())
}

fn run_monitor(
    session: &ControlSession,
    duration: Duration,
    status_every: Duration,
    as_json: bool,
    shutdown: &AtomicBool,
) {
    let events = session.subscribe();
    let deadline = Instant::now() + duration;
    let mut next_status = Instant::now() + status_every;
    let mut feedback_lines = 0u64;
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let wait = deadline.min(next_status).saturating_duration_since(now);
        match events.recv_timeout(wait) {
            Ok(SessionEvent::Feedback { .. }) => feedback_lines += 1,
            Ok(SessionEvent::LinkFaulted) => {
                tracing::warn!("link faulted while monitoring");
                break;
            }
            Ok(SessionEvent::AutoStopped) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if Instant::now() >= next_status {
            print_status(&session.display_state(), as_json);
            next_status += status_every;
        }
    }
    if as_json {
        println!(
            "{}",
            json!({ "event": "monitor_done", "feedback_lines": feedback_lines })
        );
    } else {
        println!("Feedback lines: {feedback_lines}");
    }
}

fn print_status(view: &DisplayState, as_json: bool) {
    if as_json {
        println!(
            "{}",
            json!({
                "event": "status",
                "state": view.session_state.to_string(),
                "connection": view.connection_state.to_string(),
                "servo_angle": view.servo_angle,
                "feedback": view.current_feedback,
                "error": view.current_error,
            })
        );
        return;
    }
    let fb = view
        .current_feedback
        .map_or_else(|| "--".to_string(), |f| format!("{f:.1}"));
    let err = view
        .current_error
        .map_or_else(|| "--".to_string(), |e| format!("{e:.2}"));
    println!(
        "{} | servo {} deg | feedback {fb} | error {err}",
        view.session_state, view.servo_angle
    );
}

/// Print statistics and export if asked.
fn finish(session: &ControlSession, export: Option<&Path>, as_json: bool) -> Result<()> {
    print_statistics(session.statistics(), as_json);
    if let Some(path) = export {
        session.export_csv(path)?;
        if as_json {
            println!(
                "{}",
                json!({ "event": "exported", "path": path.display().to_string(), "rows": session.sample_count() })
            );
        } else {
            println!("Exported {} samples to {}", session.sample_count(), path.display());
        }
    }
    Ok(())
}

fn print_statistics(stats: Option<Statistics>, as_json: bool) {
    match (stats, as_json) {
        (Some(s), true) => println!(
            "{}",
            json!({
                "event": "statistics",
                "count": s.count,
                "avg_error": s.avg_error,
                "max_abs_error": s.max_abs_error,
                "std_error": s.std_error,
            })
        ),
        (None, true) => println!("{}", json!({ "event": "statistics", "count": 0 })),
        (Some(s), false) => {
            println!("Samples: {}", s.count);
            println!("Avg error: {:.2} deg", s.avg_error);
            println!("Max |error|: {:.2} deg", s.max_abs_error);
            println!("Std dev: {:.2} deg", s.std_error);
        }
        (None, false) => println!("No samples recorded"),
    }
}

/// Short move against a fresh simulator: expects feedback samples, an
/// auto-stop and a final feedback equal to the target.
fn self_check(as_json: bool, cfg: &servo_config::Config) -> Result<()> {
    let servo = SimulatedServo::new(90.0).with_tick(Duration::from_millis(2));
    let link = SerialLink::simulated(&servo)?;
    let session_cfg = SessionCfg {
        ingest: servo_core::IngestCfg {
            read_timeout: Duration::from_millis(100),
            idle_backoff: Duration::from_millis(cfg.ingest.idle_backoff_ms),
        },
        ..SessionCfg::from(cfg)
    };
    let session = ControlSession::new(Some(link), session_cfg);
    let req = MoveRequest {
        angle: 110,
        speed: 1,
        direction: Direction::Clockwise,
        timeout: Duration::from_secs(3),
        status_every: Duration::from_secs(3600),
    };
    let quiet = AtomicBool::new(false);
    run_move(&session, &req, as_json, &quiet)
        .map_err(|e| RunError::SelfCheck(e.to_string()))?;

    let samples = session.samples();
    let Some(last) = samples.last() else {
        return Err(RunError::SelfCheck("no feedback samples recorded".into()).into());
    };
    if (last.feedback_angle - 110.0).abs() > 0.01 {
        return Err(RunError::SelfCheck(format!(
            "final feedback {} deg, expected 110",
            last.feedback_angle
        ))
        .into());
    }
    if !servo.received().iter().any(|l| l == "START,110,1") {
        return Err(RunError::SelfCheck("start command not seen by device".into()).into());
    }
    if as_json {
        println!("{}", json!({ "event": "self_check", "ok": true, "samples": samples.len() }));
    } else {
        println!("Self-check OK ({} samples)", samples.len());
    }
    Ok(())
}
