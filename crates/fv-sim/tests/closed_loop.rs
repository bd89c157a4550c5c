//! Closed-loop runs: room controllers against the simulated floor-heating plant.
//!
//! Plant defaults: 3 kW at full opening, 100 W/K loss to a 5 °C outdoor, so 80% holds
//! the room at 29 °C and the loop has plenty of authority for a 21 °C setpoint.

use fv_controls::{ControlMode, ControllerConfig, ExercisePhase};
use fv_core::{RoomId, Timestamp};
use fv_engine::RoomEvent;
use fv_sim::{RoomSetup, Scenario, SimOptions, SimRecord, Simulation, run_sim};

const DAY: f64 = 86_400.0;

fn opts(t_end: f64) -> SimOptions {
    SimOptions {
        t_end,
        ..SimOptions::default()
    }
}

fn exercise_off(mode: ControlMode) -> ControllerConfig {
    ControllerConfig::builder()
        .with_mode(mode)
        .with_exercise(false)
        .build()
        .unwrap()
}

/// Room temperatures recorded after `from`.
fn room_temps_after(record: &SimRecord, room: &RoomId, from: f64) -> Vec<f64> {
    record
        .samples_for(room)
        .filter(|s| s.t > from)
        .map(|s| s.room_c)
        .collect()
}

fn command_times(record: &SimRecord, room: &RoomId) -> Vec<(f64, u8)> {
    record
        .commands
        .iter()
        .filter(|c| &c.room == room)
        .map(|c| (c.time.as_secs(), c.percent))
        .collect()
}

#[test]
fn pid_settles_at_target() {
    let config = ControllerConfig::builder()
        .with_pid_gains(20.0, 0.0005, 500.0)
        .with_exercise(false)
        .build()
        .unwrap();
    let room = RoomId::new("living");
    let scenario = Scenario::new(5.0).with_room(RoomSetup::new(room.clone(), config, 21.0, 17.0));

    let record = run_sim(scenario, &opts(3.0 * DAY)).expect("simulation runs");
    assert_eq!(record.errors, 0);

    let last_day = room_temps_after(&record, &room, 2.0 * DAY);
    assert!(!last_day.is_empty());
    let mean = last_day.iter().sum::<f64>() / last_day.len() as f64;
    assert!((mean - 21.0).abs() < 0.2, "mean {mean}");
    assert!(last_day.iter().all(|t| (20.7..21.3).contains(t)));

    let commands = command_times(&record, &room);
    assert!(commands.iter().all(|(_, p)| *p <= 80));
    for pair in commands.windows(2) {
        assert!(pair[1].0 - pair[0].0 >= 600.0 - 1e-6, "spacing {pair:?}");
    }
}

#[test]
fn binary_cycles_within_band() {
    let room = RoomId::new("bath");
    let scenario = Scenario::new(5.0).with_room(RoomSetup::new(
        room.clone(),
        exercise_off(ControlMode::Binary),
        21.0,
        17.0,
    ));

    let record = run_sim(scenario, &opts(2.0 * DAY)).unwrap();

    let commands = command_times(&record, &room);
    assert_eq!(commands.first(), Some(&(0.0, 80)));
    assert!(commands.iter().all(|(_, p)| *p == 0 || *p == 80));
    let last_day = room_temps_after(&record, &room, DAY);
    assert!(last_day.iter().all(|t| (19.5..22.0).contains(t)));
}

#[test]
fn feedforward_reaches_pid_terms() {
    let config = ControllerConfig::builder()
        .with_pid_gains(20.0, 0.0005, 500.0)
        .with_feedforward_gain(1.0)
        .with_exercise(false)
        .build()
        .unwrap();
    let scenario = Scenario::new(5.0)
        .with_room(RoomSetup::new("hall", config, 21.0, 17.0))
        .with_feedforward(true);

    let record = run_sim(scenario, &opts(3_600.0)).unwrap();
    let terms = record.snapshots[0].pid_terms.expect("pid evaluated");
    assert!((terms.ff - 16.0).abs() < 1e-9);
}

/// A room with no recorded exercise runs one at the first tick, then once per interval.
#[test]
fn scheduled_exercise_runs_and_restores() {
    let config = ControllerConfig::builder()
        .with_mode(ControlMode::Binary)
        .with_exercise_interval(3_600.0)
        .with_exercise_durations(300.0, 300.0)
        .build()
        .unwrap();
    let room = RoomId::new("office");
    let scenario = Scenario::new(5.0).with_room(RoomSetup::new(room.clone(), config, 21.0, 17.0));

    let record = run_sim(scenario, &opts(7_200.0)).unwrap();

    assert_eq!(
        command_times(&record, &room),
        vec![
            (0.0, 100),
            (300.0, 0),
            (600.0, 0),
            (600.0, 80),
            (4_200.0, 100),
            (4_500.0, 0),
            (4_800.0, 80),
        ]
    );
    let telemetry = &record.snapshots[0].exercise;
    assert_eq!(telemetry.state, ExercisePhase::Idle);
    assert_eq!(telemetry.last_exercise_time, Some(Timestamp::from_secs(4_800.0)));
}

#[test]
fn heating_toggle_closes_and_reopens() {
    let room = RoomId::new("kids");
    let scenario = Scenario::new(5.0)
        .with_room(RoomSetup::new(
            room.clone(),
            exercise_off(ControlMode::Binary),
            21.0,
            17.0,
        ))
        .with_event(3_600.0, room.clone(), RoomEvent::HeatingEnabled(false))
        .with_event(7_200.0, room.clone(), RoomEvent::HeatingEnabled(true));

    let record = run_sim(scenario, &opts(4.0 * 3_600.0)).unwrap();
    assert_eq!(
        command_times(&record, &room),
        vec![(0.0, 80), (3_600.0, 0), (7_200.0, 80)]
    );
}

#[test]
fn rooms_are_independent() {
    let warm = RoomId::new("warm");
    let cold = RoomId::new("cold");
    let scenario = Scenario::new(5.0)
        .with_room(RoomSetup::new(warm.clone(), exercise_off(ControlMode::Binary), 21.0, 24.0))
        .with_room(RoomSetup::new(cold.clone(), exercise_off(ControlMode::Binary), 21.0, 17.0));

    let record = run_sim(scenario, &opts(600.0)).unwrap();
    // The warm room is already above target: closed is its initial state, nothing sent.
    assert!(command_times(&record, &warm).is_empty());
    assert_eq!(command_times(&record, &cold), vec![(0.0, 80)]);
}

#[test]
fn sink_outage_is_retried_on_next_tick() {
    let room = RoomId::new("cellar");
    let scenario = Scenario::new(5.0).with_room(RoomSetup::new(
        room.clone(),
        exercise_off(ControlMode::Binary),
        21.0,
        17.0,
    ));
    let mut sim = Simulation::new(scenario, opts(3_600.0)).unwrap();
    sim.sink().set_failing(&room, true);
    while sim.time() < 1_800.0 {
        sim.step().unwrap();
    }
    // Ticks at 0, 300, ..., 1500 all failed.
    assert_eq!(sim.errors(), 6);
    assert_eq!(sim.sink().rejected(), 6);

    sim.sink().set_failing(&room, false);
    sim.step().unwrap();
    assert_eq!(sim.sink().latest(&room), Some(80));
    let commands = sim.sink().commands();
    assert_eq!(commands[0].time, Timestamp::from_secs(1_800.0));
    let state = sim.engine().room(&room).unwrap().state();
    assert_eq!(state.commanded_position, 80);
}
