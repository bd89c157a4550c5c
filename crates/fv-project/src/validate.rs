//! Site validation and mapping onto controller configurations.

use std::collections::HashSet;

use fv_controls::{ControlError, ControllerConfig};
use fv_core::SECONDS_PER_DAY;

use crate::schema::{ControllerDef, EventDef, Site};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Room '{room}': {source}")]
    Controller {
        room: String,
        #[source]
        source: ControlError,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

/// Non-fatal findings, reported by `fv-cli validate`.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    /// The setpoint lies outside the room's range and will be clamped.
    TargetClamped { room: String, target: f64, clamped: f64 },
    ExerciseDisabled { room: String },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::TargetClamped {
                room,
                target,
                clamped,
            } => write!(
                f,
                "{room}: target {target} °C is outside the allowed range, clamped to {clamped} °C"
            ),
            ValidationWarning::ExerciseDisabled { room } => {
                write!(f, "{room}: valve exercise is disabled")
            }
        }
    }
}

/// Build the validated controller configuration of one room.
pub fn controller_config(
    room: &str,
    def: &ControllerDef,
) -> Result<ControllerConfig, ValidationError> {
    if def.valve_step.is_some() && def.max_step_percent.is_some() {
        return Err(ValidationError::InvalidValue {
            field: format!("rooms[{room}].controller"),
            value: "valve_step + max_step_percent".to_string(),
            reason: "set only one of valve_step and max_step_percent".to_string(),
        });
    }

    let defaults = ControllerConfig::default();
    let mut builder = ControllerConfig::builder()
        .with_target_range(
            def.target_min.unwrap_or(defaults.target_min()),
            def.target_max.unwrap_or(defaults.target_max()),
        )
        .with_pid_gains(
            def.kp.unwrap_or(defaults.kp()),
            def.ki.unwrap_or(defaults.ki()),
            def.kd.unwrap_or(defaults.kd()),
        );
    if let Some(mode) = def.mode {
        builder = builder.with_mode(mode);
    }
    if let Some(h) = def.hysteresis {
        builder = builder.with_hysteresis(h);
    }
    if let Some(step) = def.valve_step {
        builder = builder.with_valve_step(step);
    }
    if let Some(percent) = def.max_step_percent {
        builder = builder.with_max_step_percent(percent);
    }
    if let Some(secs) = def.min_cycle_duration_s {
        builder = builder.with_min_cycle_duration(secs);
    }
    if let Some(ka) = def.ka {
        builder = builder.with_feedforward_gain(ka);
    }
    if let Some(gain) = def.proportional_gain {
        builder = builder.with_proportional_gain(gain);
    }
    if let Some(exercise) = &def.exercise {
        builder = builder
            .with_exercise(exercise.enabled)
            .with_exercise_interval(exercise.interval_days * SECONDS_PER_DAY)
            .with_exercise_durations(exercise.open_duration_s, exercise.close_duration_s);
    }
    if let Some(secs) = def.pid_max_dt_s {
        builder = builder.with_pid_max_dt(secs);
    }
    if let Some(percent) = def.output_resolution_percent {
        builder = builder.with_output_resolution(percent);
    }
    if let Some(percent) = def.feedback_tolerance_percent {
        builder = builder.with_feedback_tolerance(percent);
    }

    builder.build().map_err(|source| ValidationError::Controller {
        room: room.to_string(),
        source,
    })
}

pub fn validate_site(site: &Site) -> Result<Vec<ValidationWarning>, ValidationError> {
    if site.version > crate::migrate::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: site.version,
        });
    }

    let mut warnings = Vec::new();
    let mut room_ids = HashSet::new();
    for room in &site.rooms {
        if room.id.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "rooms[].id".to_string(),
                value: format!("{:?}", room.id),
                reason: "must not be empty".to_string(),
            });
        }
        if !room_ids.insert(room.id.as_str()) {
            return Err(ValidationError::DuplicateId {
                id: room.id.clone(),
                context: "rooms".to_string(),
            });
        }
        let config = controller_config(&room.id, &room.controller)?;
        finite(&format!("rooms[{}].target_c", room.id), room.target_c)?;
        let clamped = config.clamp_target(room.target_c);
        if clamped != room.target_c {
            warnings.push(ValidationWarning::TargetClamped {
                room: room.id.clone(),
                target: room.target_c,
                clamped,
            });
        }
        if !config.exercise_enabled() {
            warnings.push(ValidationWarning::ExerciseDisabled {
                room: room.id.clone(),
            });
        }
        if let Some(plant) = &room.plant {
            plant.validate().map_err(|e| ValidationError::InvalidValue {
                field: format!("rooms[{}].plant", room.id),
                value: format!("{plant:?}"),
                reason: e.to_string(),
            })?;
        }
        if let Some(initial) = room.initial_c {
            finite(&format!("rooms[{}].initial_c", room.id), initial)?;
        }
    }

    if let Some(sim) = &site.simulation {
        finite("simulation.outdoor_c", sim.outdoor_c)?;
        sim.options
            .validate()
            .map_err(|e| ValidationError::InvalidValue {
                field: "simulation.options".to_string(),
                value: format!("{:?}", sim.options),
                reason: e.to_string(),
            })?;
        for event in &sim.events {
            validate_event(event, &room_ids)?;
        }
    }

    Ok(warnings)
}

fn validate_event(event: &EventDef, room_ids: &HashSet<&str>) -> Result<(), ValidationError> {
    if !room_ids.contains(event.room.as_str()) {
        return Err(ValidationError::MissingReference {
            id: event.room.clone(),
            context: "simulation event room".to_string(),
        });
    }
    finite("simulation.events[].at_s", event.at_s)?;
    if event.at_s < 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "simulation.events[].at_s".to_string(),
            value: event.at_s.to_string(),
            reason: "must be non-negative".to_string(),
        });
    }
    Ok(())
}

fn finite(field: &str, v: f64) -> Result<(), ValidationError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field: field.to_string(),
            value: v.to_string(),
            reason: "must be finite".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ExerciseDef, RoomDef};
    use fv_controls::{ControlMode, ValveStep};

    fn room(id: &str) -> RoomDef {
        RoomDef {
            id: id.to_string(),
            name: None,
            target_c: 21.0,
            controller: ControllerDef::default(),
            plant: None,
            initial_c: None,
        }
    }

    fn site(rooms: Vec<RoomDef>) -> Site {
        Site {
            version: crate::migrate::LATEST_VERSION,
            name: "test".to_string(),
            rooms,
            simulation: None,
        }
    }

    #[test]
    fn empty_controller_gives_defaults() {
        let config = controller_config("bath", &ControllerDef::default()).unwrap();
        assert_eq!(config, ControllerConfig::default());
    }

    #[test]
    fn fields_map_onto_config() {
        let def = ControllerDef {
            mode: Some(ControlMode::Binary),
            valve_step: Some(ValveStep::Step2),
            exercise: Some(ExerciseDef {
                enabled: true,
                interval_days: 3.0,
                open_duration_s: 120.0,
                close_duration_s: 60.0,
            }),
            ..ControllerDef::default()
        };
        let config = controller_config("bath", &def).unwrap();
        assert_eq!(config.mode(), ControlMode::Binary);
        assert_eq!(config.max_step_percent(), 40);
        assert_eq!(config.exercise_interval_s(), 3.0 * 86_400.0);
        assert_eq!(config.exercise_close_duration_s(), 60.0);
    }

    #[test]
    fn from_config_maps_back() {
        let config = ControllerConfig::builder()
            .with_max_step_percent(55)
            .build()
            .unwrap();
        let def = ControllerDef::from_config(&config);
        assert_eq!(def.valve_step, None);
        assert_eq!(def.max_step_percent, Some(55));
        assert_eq!(controller_config("x", &def).unwrap(), config);
    }

    #[test]
    fn step_and_percent_conflict() {
        let def = ControllerDef {
            valve_step: Some(ValveStep::Step1),
            max_step_percent: Some(20),
            ..ControllerDef::default()
        };
        assert!(matches!(
            controller_config("bath", &def),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn invalid_controller_names_room() {
        let mut r = room("bath");
        r.controller.hysteresis = Some(0.0);
        let err = validate_site(&site(vec![r])).unwrap_err();
        assert!(matches!(err, ValidationError::Controller { ref room, .. } if room == "bath"));
        assert!(err.to_string().contains("hysteresis"));
    }

    #[test]
    fn duplicate_rooms_rejected() {
        let err = validate_site(&site(vec![room("a"), room("a")])).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateId { .. }));
    }

    #[test]
    fn warnings_reported() {
        let mut hot = room("hot");
        hot.target_c = 35.0;
        let mut lazy = room("lazy");
        lazy.controller.exercise = Some(ExerciseDef {
            enabled: false,
            interval_days: 7.0,
            open_duration_s: 300.0,
            close_duration_s: 300.0,
        });
        let warnings = validate_site(&site(vec![hot, lazy])).unwrap();
        assert_eq!(
            warnings,
            vec![
                ValidationWarning::TargetClamped {
                    room: "hot".to_string(),
                    target: 35.0,
                    clamped: 28.0,
                },
                ValidationWarning::ExerciseDisabled {
                    room: "lazy".to_string(),
                },
            ]
        );
    }

    #[test]
    fn future_version_rejected() {
        let mut s = site(vec![]);
        s.version = crate::migrate::LATEST_VERSION + 1;
        assert!(matches!(
            validate_site(&s),
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }
}
