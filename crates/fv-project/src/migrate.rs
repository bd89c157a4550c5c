//! Site file migrations.

use crate::ProjectError;
use crate::schema::Site;

pub const LATEST_VERSION: u32 = 3;

pub fn migrate_to_latest(mut site: Site) -> Result<Site, ProjectError> {
    while site.version < LATEST_VERSION {
        site = migrate_one_version(site)?;
    }
    Ok(site)
}

fn migrate_one_version(site: Site) -> Result<Site, ProjectError> {
    match site.version {
        0 | 1 => migrate_v1_to_v2(site),
        2 => migrate_v2_to_v3(site),
        v => Err(ProjectError::Migration {
            what: format!("No migration path from version {}", v),
        }),
    }
}

fn migrate_v1_to_v2(mut site: Site) -> Result<Site, ProjectError> {
    site.version = 2;
    Ok(site)
}

/// Gains tuned against the old integral scaling do not carry over: every room restarts
/// from the default PID gains.
fn migrate_v2_to_v3(mut site: Site) -> Result<Site, ProjectError> {
    for room in &mut site.rooms {
        let c = &mut room.controller;
        c.kp = None;
        c.ki = None;
        c.kd = None;
        c.ka = None;
    }
    site.version = 3;
    Ok(site)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ControllerDef, RoomDef};

    fn site(version: u32) -> Site {
        Site {
            version,
            name: "old".to_string(),
            rooms: vec![RoomDef {
                id: "bath".to_string(),
                name: None,
                target_c: 21.0,
                controller: ControllerDef {
                    kp: Some(35.0),
                    ki: Some(0.2),
                    hysteresis: Some(0.3),
                    ..ControllerDef::default()
                },
                plant: None,
                initial_c: None,
            }],
            simulation: None,
        }
    }

    #[test]
    fn old_sites_reset_pid_gains() {
        let migrated = migrate_to_latest(site(1)).unwrap();
        assert_eq!(migrated.version, LATEST_VERSION);
        let c = &migrated.rooms[0].controller;
        assert_eq!(c.kp, None);
        assert_eq!(c.ki, None);
        assert_eq!(c.hysteresis, Some(0.3));
    }

    #[test]
    fn current_sites_untouched() {
        let s = site(LATEST_VERSION);
        assert_eq!(migrate_to_latest(s.clone()).unwrap(), s);
    }
}
