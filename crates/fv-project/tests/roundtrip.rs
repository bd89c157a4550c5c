use fv_controls::{ControlMode, ControllerConfig, ValveStep};
use fv_project::schema::*;
use fv_project::{LATEST_VERSION, load_json, load_yaml, save_json, save_yaml, validate_site};
use fv_sim::PlantParams;

fn sample_site() -> Site {
    Site {
        version: LATEST_VERSION,
        name: "Roundtrip".to_string(),
        rooms: vec![
            RoomDef {
                id: "kitchen".to_string(),
                name: Some("Kitchen".to_string()),
                target_c: 20.5,
                controller: ControllerDef {
                    mode: Some(ControlMode::Proportional),
                    valve_step: Some(ValveStep::Off),
                    ..ControllerDef::default()
                },
                plant: Some(PlantParams {
                    heater_power_w: 1_800.0,
                    ..PlantParams::default()
                }),
                initial_c: Some(16.0),
            },
            RoomDef {
                id: "hall".to_string(),
                name: None,
                target_c: 19.0,
                controller: ControllerDef::from_config(&ControllerConfig::default()),
                plant: None,
                initial_c: None,
            },
        ],
        simulation: Some(SimulationDef {
            events: vec![
                EventDef {
                    at_s: 600.0,
                    room: "hall".to_string(),
                    kind: EventKindDef::Exercise,
                },
                EventDef {
                    at_s: 1_200.0,
                    room: "kitchen".to_string(),
                    kind: EventKindDef::ValveStep {
                        step: ValveStep::Step5,
                    },
                },
            ],
            ..SimulationDef::default()
        }),
    }
}

#[test]
fn roundtrip_yaml_empty_site() {
    let site = Site {
        version: LATEST_VERSION,
        name: "Empty".to_string(),
        rooms: vec![],
        simulation: None,
    };
    validate_site(&site).unwrap();

    let path = std::env::temp_dir().join("fv_project_roundtrip_empty.yaml");
    save_yaml(&path, &site).unwrap();
    let loaded = load_yaml(&path).unwrap();

    assert_eq!(site, loaded);
}

#[test]
fn roundtrip_yaml_rooms_and_events() {
    let site = sample_site();
    let path = std::env::temp_dir().join("fv_project_roundtrip_rooms.yaml");
    save_yaml(&path, &site).unwrap();
    assert_eq!(load_yaml(&path).unwrap(), site);
}

#[test]
fn roundtrip_json_rooms_and_events() {
    let site = sample_site();
    let path = std::env::temp_dir().join("fv_project_roundtrip_rooms.json");
    save_json(&path, &site).unwrap();
    assert_eq!(load_json(&path).unwrap(), site);
}

#[test]
fn save_refuses_invalid_site() {
    let mut site = sample_site();
    site.rooms[1].id = "kitchen".to_string();
    let path = std::env::temp_dir().join("fv_project_roundtrip_invalid.yaml");
    assert!(save_yaml(&path, &site).is_err());
}

#[test]
fn unknown_controller_field_rejected() {
    let yaml = "version: 3\nname: x\nrooms:\n  - id: a\n    controller:\n      kq: 3.0\n";
    assert!(serde_yaml::from_str::<Site>(yaml).is_err());
}

#[test]
fn valve_step_labels_in_yaml() {
    let yaml = "version: 3\nname: x\nrooms:\n  - id: a\n    controller:\n      valve_step: '*'\n";
    let site: Site = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(site.rooms[0].controller.valve_step, Some(ValveStep::Off));
    assert_eq!(site.rooms[0].target_c, DEFAULT_TARGET_C);
}
