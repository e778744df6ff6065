use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use super::record::{DeviceDescriptor, PersistentStats};
use crate::error::StoreError;

/// Just enough of a statistics file to decide whether it belongs to us.
#[derive(Debug, Deserialize)]
struct StoredHeader {
    #[serde(flatten)]
    identity: DeviceDescriptor,
    #[serde(default)]
    messages: Vec<String>,
}

/// Result of loading a statistics file.
#[derive(Debug)]
pub struct Loaded {
    pub stats: PersistentStats,
    /// The file on disk was rejected. `stats` is a stub explaining why, and
    /// must never be saved over the file.
    pub invalid: bool,
}

/// Path of the statistics file for `dev_id` inside `dir`. The name is shared
/// with the existing MQTT power tooling, so its files are picked up as is.
pub fn stats_file_path(dir: &Path, dev_id: &str) -> PathBuf {
    dir.join(format!("mqtt-power.{dev_id}.json"))
}

/// Path of the backup kept next to `path`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Load statistics for `identity` from `path`.
///
/// A missing, empty or unparseable file gives fresh statistics. A file that
/// belongs to another device, or that was saved with diagnostics in it, is
/// rejected: the result is a fresh stub whose messages say why, flagged
/// invalid so the file is left alone.
pub fn load(path: Option<&Path>, identity: &DeviceDescriptor, now: i64) -> Loaded {
    let fresh = || Loaded {
        stats: PersistentStats::new(identity.clone(), now),
        invalid: false,
    };

    let Some(path) = path else {
        return fresh();
    };

    let json = match fs::read_to_string(path) {
        Ok(json) if !json.trim().is_empty() => json,
        Ok(_) => {
            log::info!("statistics file {path:?} is empty, starting fresh");
            return fresh();
        }
        Err(e) => {
            log::info!("couldn't read statistics from {path:?} ({e}), starting fresh");
            return fresh();
        }
    };

    let header: StoredHeader = match serde_json::from_str(&json) {
        Ok(header) => header,
        Err(e) => {
            log::warn!("couldn't parse statistics file {path:?}: {e}, starting fresh");
            return fresh();
        }
    };

    let problems = validate(path, &header, identity);
    if !problems.is_empty() {
        for problem in &problems {
            log::warn!("{problem}");
        }

        let mut stats = PersistentStats::new(identity.clone(), now);
        stats.messages = problems;
        return Loaded {
            stats,
            invalid: true,
        };
    }

    match serde_json::from_str::<PersistentStats>(&json) {
        Ok(stats) if stats.weekly.is_consistent() => {
            log::info!("loaded battery statistics from {path:?}");
            Loaded {
                stats,
                invalid: false,
            }
        }
        Ok(_) => {
            log::warn!("weekly history in {path:?} is inconsistent, starting fresh");
            fresh()
        }
        Err(e) => {
            log::warn!("couldn't parse statistics file {path:?}: {e}, starting fresh");
            fresh()
        }
    }
}

/// Reasons the stored header can't be trusted for `identity`, as messages.
fn validate(path: &Path, header: &StoredHeader, identity: &DeviceDescriptor) -> Vec<String> {
    let prefix = format!("! ERROR: stats loaded from {}: ", path.display());

    // a file that was saved with messages was already broken
    let mut problems: Vec<String> = header
        .messages
        .iter()
        .map(|m| format!("{prefix}have message: {m}"))
        .collect();

    if header.identity.dev_id != identity.dev_id {
        problems.push(format!("{prefix}is from different device ID"));
    }

    if header.identity.chemistry != identity.chemistry
        || header.identity.nominal_voltage != identity.nominal_voltage
        || header.identity.capacity != identity.capacity
    {
        problems.push(format!("{prefix}has different battery definition"));
    }

    problems
}

/// Save `stats` to `path`, keeping the previous file as a backup.
///
/// Refuses to run if the directory is missing or the statistics are
/// `invalid`. On failure the error is also appended to the messages, and the
/// backup is moved back into place if the primary file went missing.
pub fn save(
    path: &Path,
    stats: &mut PersistentStats,
    invalid: bool,
    now: i64,
) -> Result<(), StoreError> {
    save_with(path, stats, invalid, now, |path, json| fs::write(path, json))
}

/// [`save`], with the final write of the new file done by `write`.
fn save_with(
    path: &Path,
    stats: &mut PersistentStats,
    invalid: bool,
    now: i64,
    write: impl FnOnce(&Path, String) -> io::Result<()>,
) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if !dir.is_dir() {
        return Err(StoreError::MissingDirectory(dir.to_path_buf()));
    }

    if invalid {
        return Err(StoreError::Invalid(path.to_path_buf()));
    }

    let backup = backup_path(path);
    let result = write_with_backup(path, &backup, stats, now, write);

    if let Err(e) = &result {
        log::warn!("couldn't save battery statistics to {path:?}: {e}");
        stats.messages.push(format!("! ERROR saving statistics: {e}"));

        if !path.exists()
            && backup.exists()
            && let Err(e) = fs::rename(&backup, path)
        {
            log::error!("couldn't restore {backup:?}: {e}");
            stats
                .messages
                .push(format!("! ERROR restoring original save: {e}"));
        }
    }

    result
}

fn write_with_backup(
    path: &Path,
    backup: &Path,
    stats: &mut PersistentStats,
    now: i64,
    write: impl FnOnce(&Path, String) -> io::Result<()>,
) -> Result<(), StoreError> {
    if path.exists() {
        if backup.exists() {
            fs::remove_file(backup)?;
        }
        fs::rename(path, backup)?;
    }

    stats.last_saved_at = now;
    let json = serde_json::to_string_pretty(stats)?;
    write(path, json)?;

    log::debug!("saved battery statistics to {path:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chemistry::Chemistry,
        stats::record::{CHARGE_STEPS, SpeedKind},
    };

    fn identity() -> DeviceDescriptor {
        DeviceDescriptor {
            dev_id: "test123".to_string(),
            chemistry: Chemistry::LeadAcid,
            nominal_voltage: 12.0,
            capacity: 2000.0,
        }
    }

    fn stored_json(dev_id: &str, capacity: f64, messages: &[&str]) -> String {
        serde_json::json!({
            "dev_id": dev_id,
            "batt_type": "pb",
            "batt_vnom": 12,
            "batt_cap": capacity,
            "ts": 1_000_000,
            "started": 1_000_000,
            "messages": messages,
            "weekly": {
                "start_ts": [123],
                "discharge_speed_avg": [vec![0.5; CHARGE_STEPS]],
                "discharge_speed_samples": [vec![1; CHARGE_STEPS]],
                "charge_speed_avg": [vec![1.5; CHARGE_STEPS]],
                "charge_speed_samples": [vec![1; CHARGE_STEPS]],
                "blackouts_count": [5],
                "blackouts_time": [2.5],
            },
            "hourly_load_avg": vec![222; 24],
            "hourly_load_samples": vec![5; 24],
        })
        .to_string()
    }

    #[test]
    fn test_missing_file_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");

        let loaded = load(Some(&path), &identity(), 1_000_000);

        assert!(!loaded.invalid);
        assert!(loaded.stats.messages.is_empty());
        assert_eq!(loaded.stats.created_at, 1_000_000);
        assert_eq!(loaded.stats.weekly.len(), 1);
        assert_eq!(loaded.stats.weekly.week_start(0), Some(1_000_000));
        assert_eq!(loaded.stats.hourly.avg(0), Some(0));
    }

    #[test]
    fn test_no_storage_is_fresh() {
        let loaded = load(None, &identity(), 5);
        assert!(!loaded.invalid);
        assert_eq!(loaded.stats.created_at, 5);
    }

    #[test]
    fn test_empty_file_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");
        fs::write(&path, "").unwrap();

        let loaded = load(Some(&path), &identity(), 1);
        assert!(!loaded.invalid);
        assert!(loaded.stats.messages.is_empty());
    }

    #[test]
    fn test_garbage_file_is_quietly_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");
        fs::write(&path, "{ not json").unwrap();

        let loaded = load(Some(&path), &identity(), 1);

        assert!(!loaded.invalid);
        assert!(loaded.stats.messages.is_empty());
        // left as is until the next save
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_matching_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");
        fs::write(&path, stored_json("test123", 2000.0, &[])).unwrap();

        let loaded = load(Some(&path), &identity(), 1_000_000);

        assert!(!loaded.invalid);
        let stats = loaded.stats;
        assert!(stats.messages.is_empty());
        assert_eq!(stats.weekly.week_start(0), Some(123));
        assert_eq!(stats.weekly.blackout_count(0), Some(5));
        assert_eq!(stats.weekly.blackout_hours(0), Some(2.5));
        assert_eq!(stats.weekly.speed_avg(SpeedKind::Charge, 0).unwrap()[3], 1.5);
        assert_eq!(stats.hourly.avg(7), Some(222));
        assert_eq!(stats.hourly.samples(7), Some(5));
    }

    #[test]
    fn test_other_device_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");
        let json = stored_json("other_device", 2000.0, &[]);
        fs::write(&path, &json).unwrap();

        let loaded = load(Some(&path), &identity(), 1_000_000);

        assert!(loaded.invalid);
        assert_eq!(loaded.stats.identity, identity());
        assert_eq!(loaded.stats.messages.len(), 1);
        assert!(loaded.stats.messages[0].contains("different device"));
        assert_eq!(fs::read_to_string(&path).unwrap(), json);
    }

    #[test]
    fn test_other_battery_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");
        fs::write(&path, stored_json("test123", 7.0, &[])).unwrap();

        let loaded = load(Some(&path), &identity(), 1_000_000);

        assert!(loaded.invalid);
        assert_eq!(loaded.stats.messages.len(), 1);
        assert!(loaded.stats.messages[0].contains("different battery definition"));
    }

    #[test]
    fn test_file_with_messages_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");
        fs::write(&path, stored_json("other", 2000.0, &["disk full", "again"])).unwrap();

        let loaded = load(Some(&path), &identity(), 1_000_000);

        assert!(loaded.invalid);
        let messages = &loaded.stats.messages;
        assert_eq!(messages.len(), 3);
        assert!(messages[0].ends_with("have message: disk full"));
        assert!(messages[1].ends_with("have message: again"));
        assert!(messages[2].contains("different device"));
    }

    #[test]
    fn test_mismatch_detected_without_full_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");
        let json = serde_json::json!({
            "dev_id": "other_device",
            "batt_type": "pb",
            "batt_vnom": 12,
            "batt_cap": 2000,
            "ts": 1_000_000,
            "started": 1_000_000,
            "messages": [],
            "weekly": {},
            "hourly_load_avg": [],
            "hourly_load_samples": [],
        });
        fs::write(&path, json.to_string()).unwrap();

        let loaded = load(Some(&path), &identity(), 1_000_000);

        assert!(loaded.invalid);
        assert!(loaded.stats.messages[0].contains("different device"));
    }

    #[test]
    fn test_save_and_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");

        let mut stats = PersistentStats::new(identity(), 1_000);
        stats.hourly.record(3, 17);

        // running averages of awkward quotients, over a few weeks
        for week in 0..4_i64 {
            if week > 0 {
                stats.weekly.rotate(1_000 + week);
            }
            for sector in 0..CHARGE_STEPS {
                for n in 1..=3_i64 {
                    let speed = (week * 977 + sector as i64 * 131 + n * 17) as f64 / 123.0;
                    stats.weekly.add_speed(SpeedKind::Discharge, sector, speed, 1_000 + week);
                    stats.weekly.add_speed(SpeedKind::Charge, sector, speed / 7.0, 1_000 + week);
                }
            }
            for _ in 0..week + 2 {
                stats.weekly.add_blackout_hours(0.0117, 1_000 + week);
            }
        }
        stats.weekly.blackout_count[0] = 42;

        save(&path, &mut stats, false, 2_000).unwrap();
        assert_eq!(stats.last_saved_at, 2_000);
        assert!(path.exists());
        assert!(!backup_path(&path).exists());

        let loaded = load(Some(&path), &identity(), 3_000);
        assert!(!loaded.invalid);
        assert_eq!(loaded.stats, stats);
        assert_eq!(loaded.stats.weekly.len(), 4);
        assert_eq!(loaded.stats.weekly.blackout_count(0), Some(42));
        assert_eq!(loaded.stats.created_at, 1_000);
    }

    #[test]
    fn test_save_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");

        let mut stats = PersistentStats::new(identity(), 1_000);
        save(&path, &mut stats, false, 2_000).unwrap();
        let first = fs::read_to_string(&path).unwrap();

        stats.weekly.blackout_count[0] = 1;
        save(&path, &mut stats, false, 3_000).unwrap();
        assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), first);

        stats.weekly.blackout_count[0] = 2;
        save(&path, &mut stats, false, 4_000).unwrap();
        let backup: PersistentStats =
            serde_json::from_str(&fs::read_to_string(backup_path(&path)).unwrap()).unwrap();
        assert_eq!(backup.weekly.blackout_count(0), Some(1));
        assert_eq!(backup.last_saved_at, 3_000);
    }

    #[test]
    fn test_save_refuses_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(&dir.path().join("nope"), "test123");
        let mut stats = PersistentStats::new(identity(), 1);

        assert!(matches!(
            save(&path, &mut stats, false, 2),
            Err(StoreError::MissingDirectory(_))
        ));
        assert!(stats.messages.is_empty());
    }

    #[test]
    fn test_save_refuses_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");
        fs::write(&path, "precious").unwrap();
        let mut stats = PersistentStats::new(identity(), 1);

        assert!(matches!(
            save(&path, &mut stats, true, 2),
            Err(StoreError::Invalid(_))
        ));
        assert_eq!(fs::read_to_string(&path).unwrap(), "precious");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_failed_save_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");
        fs::write(&path, "previous").unwrap();

        // a directory in the way of the backup
        let backup = backup_path(&path);
        fs::create_dir(&backup).unwrap();
        fs::write(backup.join("blocker"), "").unwrap();

        let mut stats = PersistentStats::new(identity(), 1);
        assert!(matches!(
            save(&path, &mut stats, false, 2),
            Err(StoreError::Io(_))
        ));

        assert_eq!(stats.messages.len(), 1);
        assert!(stats.messages[0].starts_with("! ERROR saving statistics:"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
    }

    #[test]
    fn test_failed_write_restores_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");
        fs::write(&path, "previous").unwrap();

        let mut stats = PersistentStats::new(identity(), 1);
        let result = save_with(&path, &mut stats, false, 2, |_, _| {
            Err(io::Error::other("disk full"))
        });

        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
        assert!(!backup_path(&path).exists());
        assert_eq!(
            stats.messages,
            vec!["! ERROR saving statistics: couldn't write statistics: disk full".to_string()]
        );
    }

    #[test]
    fn test_failed_write_without_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = stats_file_path(dir.path(), "test123");

        let mut stats = PersistentStats::new(identity(), 1);
        let result = save_with(&path, &mut stats, false, 2, |_, _| {
            Err(io::Error::other("disk full"))
        });

        assert!(result.is_err());
        assert!(!path.exists());
        assert_eq!(stats.messages.len(), 1);
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/var/lib/mqtt-power.x.json")),
            PathBuf::from("/var/lib/mqtt-power.x.json.bak")
        );
    }
}
