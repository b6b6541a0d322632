//! Stable external formatting: Kubernetes-style short durations, binary
//! byte sizes, and snapshot JSON/YAML encoding.

use crate::observation::snapshot::Snapshot;
use anyhow::Result;
use std::time::Duration;

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;
const TIB: f64 = GIB * 1024.0;
const PIB: f64 = TIB * 1024.0;

/// Formats a byte count using binary units (KiB/MiB/GiB/TiB/PiB), the
/// largest unit where the value is >= 1.0, with two decimal places.
pub fn format_bytes(bytes: u64) -> String {
    let b = bytes as f64;
    if b >= PIB {
        format!("{:.2}PiB", b / PIB)
    } else if b >= TIB {
        format!("{:.2}TiB", b / TIB)
    } else if b >= GIB {
        format!("{:.2}GiB", b / GIB)
    } else if b >= MIB {
        format!("{:.2}MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.2}KiB", b / KIB)
    } else {
        format!("{}B", bytes)
    }
}

/// Formats a duration in Kubernetes' short form: the largest unit
/// (days, hours, minutes, seconds) with at most one subordinate unit,
/// e.g. "5d", "5d6h", "36h", "5m", "30s".
pub fn format_duration_short(d: Duration) -> String {
    let total_secs = d.as_secs();
    if total_secs == 0 {
        return "0s".to_string();
    }
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;

    if days > 0 {
        if hours > 0 {
            format!("{}d{}h", days, hours)
        } else {
            format!("{}d", days)
        }
    } else if hours > 0 {
        if minutes > 0 {
            format!("{}h{}m", hours, minutes)
        } else {
            format!("{}h", hours)
        }
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

/// Encodes a snapshot as pretty JSON with a stable external schema.
pub fn snapshot_to_json(snapshot: &Snapshot) -> Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// Encodes a snapshot as YAML.
pub fn snapshot_to_yaml(snapshot: &Snapshot) -> Result<String> {
    Ok(serde_yaml::to_string(snapshot)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_below_kib() {
        assert_eq!(format_bytes(512), "512B");
    }

    #[test]
    fn bytes_kib_mib_gib() {
        assert_eq!(format_bytes(2048), "2.00KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00GiB");
    }

    #[test]
    fn duration_short_forms() {
        assert_eq!(format_duration_short(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration_short(Duration::from_secs(5 * 60)), "5m");
        assert_eq!(format_duration_short(Duration::from_secs(36 * 3600)), "36h");
        assert_eq!(
            format_duration_short(Duration::from_secs(5 * 86_400)),
            "5d"
        );
        assert_eq!(
            format_duration_short(Duration::from_secs(5 * 86_400 + 6 * 3600)),
            "5d6h"
        );
    }

    #[test]
    fn duration_zero() {
        assert_eq!(format_duration_short(Duration::from_secs(0)), "0s");
    }
}
