//! Typed views decoded from Ceph CLI JSON output. Field names on the raw
//! `*Json` structs mirror the real `ceph ... --format json` shapes; the
//! public types above them are what the rest of the crate consumes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Known Ceph cluster flags this system ever observes. `noout` is the
/// only one it ever mutates.
const KNOWN_FLAGS: &[&str] = &[
    "noout",
    "noin",
    "nodown",
    "noup",
    "norebalance",
    "norecover",
    "noscrub",
    "nodeep-scrub",
    "nobackfill",
    "pause",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CephFlags {
    pub noout: bool,
    pub noin: bool,
    pub nodown: bool,
    pub noup: bool,
    pub norebalance: bool,
    pub norecover: bool,
    pub noscrub: bool,
    pub nodeep_scrub: bool,
    pub nobackfill: bool,
    pub pause: bool,
}

impl CephFlags {
    /// Parses the comma-separated `flags` field from `ceph osd dump
    /// --format json`. Whitespace around tokens is trimmed; unknown
    /// tokens are ignored; an empty string yields all-false.
    pub fn parse(flags_field: &str) -> Self {
        let mut out = Self::default();
        for token in flags_field.split(',') {
            match token.trim() {
                "noout" => out.noout = true,
                "noin" => out.noin = true,
                "nodown" => out.nodown = true,
                "noup" => out.noup = true,
                "norebalance" => out.norebalance = true,
                "norecover" => out.norecover = true,
                "noscrub" => out.noscrub = true,
                "nodeep-scrub" => out.nodeep_scrub = true,
                "nobackfill" => out.nobackfill = true,
                "pause" => out.pause = true,
                _ => {}
            }
        }
        out
    }

    /// Joins the currently-active known flags with `,`, in the fixed
    /// order of `KNOWN_FLAGS`; the inverse of `parse`.
    pub fn to_flags_string(&self) -> String {
        let active: Vec<&str> = KNOWN_FLAGS
            .iter()
            .copied()
            .filter(|&f| self.is_set(f))
            .collect();
        active.join(",")
    }

    fn is_set(&self, token: &str) -> bool {
        match token {
            "noout" => self.noout,
            "noin" => self.noin,
            "nodown" => self.nodown,
            "noup" => self.noup,
            "norebalance" => self.norebalance,
            "norecover" => self.norecover,
            "noscrub" => self.noscrub,
            "nodeep-scrub" => self.nodeep_scrub,
            "nobackfill" => self.nobackfill,
            "pause" => self.pause,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "HEALTH_OK")]
    Ok,
    #[serde(rename = "HEALTH_WARN")]
    Warn,
    #[serde(rename = "HEALTH_ERR")]
    Err,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub health: HealthStatus,
    pub num_osds: i64,
    pub num_up_osds: i64,
    pub num_in_osds: i64,
    pub num_mons: i64,
    /// PG state name -> count, e.g. "active+clean" -> 128.
    pub pg_state_counts: HashMap<String, i64>,
    pub total_bytes: u64,
    pub total_used_bytes: u64,
    pub total_avail_bytes: u64,
}

// --- raw JSON decode shapes -------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct StatusHealthJson {
    pub status: HealthStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusOsdmapJson {
    pub num_osds: i64,
    pub num_up_osds: i64,
    pub num_in_osds: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusMonmapJson {
    pub num_mons: i64,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct PgMapJson {
    #[serde(default)]
    pub pgs_by_state: Vec<PgStateCountJson>,
    #[serde(default)]
    pub bytes_total: u64,
    #[serde(default)]
    pub bytes_used: u64,
    #[serde(default)]
    pub bytes_avail: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PgStateCountJson {
    pub state_name: String,
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CephStatusJson {
    pub health: StatusHealthJson,
    pub osdmap: StatusOsdmapJson,
    pub monmap: StatusMonmapJson,
    #[serde(default)]
    pub pgmap: PgMapJson,
}

impl From<CephStatusJson> for ClusterStatus {
    fn from(raw: CephStatusJson) -> Self {
        ClusterStatus {
            health: raw.health.status,
            num_osds: raw.osdmap.num_osds,
            num_up_osds: raw.osdmap.num_up_osds,
            num_in_osds: raw.osdmap.num_in_osds,
            num_mons: raw.monmap.num_mons,
            pg_state_counts: raw
                .pgmap
                .pgs_by_state
                .into_iter()
                .map(|s| (s.state_name, s.count))
                .collect(),
            total_bytes: raw.pgmap.bytes_total,
            total_used_bytes: raw.pgmap.bytes_used,
            total_avail_bytes: raw.pgmap.bytes_avail,
        }
    }
}

// --- OSD tree ----------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsdTreeNode {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub status: Option<String>,
    pub reweight: Option<f64>,
    #[serde(default)]
    pub children: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OsdTree {
    pub nodes: Vec<OsdTreeNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OsdTreeJson {
    pub nodes: Vec<OsdTreeNode>,
}

impl From<OsdTreeJson> for OsdTree {
    fn from(raw: OsdTreeJson) -> Self {
        OsdTree { nodes: raw.nodes }
    }
}

impl OsdTree {
    /// OSDs grouped under their host, by host name.
    pub fn osds_by_host(&self) -> HashMap<String, Vec<&OsdTreeNode>> {
        let hosts: HashMap<i64, &OsdTreeNode> = self
            .nodes
            .iter()
            .filter(|n| n.node_type == "host")
            .map(|n| (n.id, n))
            .collect();
        let osds: HashMap<i64, &OsdTreeNode> = self
            .nodes
            .iter()
            .filter(|n| n.node_type == "osd")
            .map(|n| (n.id, n))
            .collect();

        let mut grouped: HashMap<String, Vec<&OsdTreeNode>> = HashMap::new();
        for host in hosts.values() {
            let children: Vec<&OsdTreeNode> = host
                .children
                .iter()
                .filter_map(|id| osds.get(id).copied())
                .collect();
            grouped.insert(host.name.clone(), children);
        }
        grouped
    }

    pub fn osd(&self, id: i64) -> Option<&OsdTreeNode> {
        self.nodes
            .iter()
            .find(|n| n.node_type == "osd" && n.id == id)
    }
}

// --- monitor quorum ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorQuorum {
    pub total_count: u32,
    pub in_quorum_count: u32,
    pub leader: Option<String>,
    pub quorum_names: Vec<String>,
    pub out_of_quorum_names: Vec<String>,
    pub election_epoch: u64,
}

impl MonitorQuorum {
    /// `InQuorum > TotalCount / 2`.
    pub fn has_quorum(&self) -> bool {
        self.in_quorum_count as f64 > self.total_count as f64 / 2.0
    }

    /// `InQuorum == TotalCount > 0`.
    pub fn is_healthy(&self) -> bool {
        self.total_count > 0 && self.in_quorum_count == self.total_count
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuorumStatusJson {
    pub election_epoch: u64,
    pub quorum: Vec<u64>,
    pub quorum_names: Vec<String>,
    pub monmap: QuorumMonmapJson,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuorumMonmapJson {
    pub mons: Vec<QuorumMonJson>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuorumMonJson {
    pub rank: u64,
    pub name: String,
}

impl From<QuorumStatusJson> for MonitorQuorum {
    fn from(raw: QuorumStatusJson) -> Self {
        let total_count = raw.monmap.mons.len() as u32;
        let in_quorum_count = raw.quorum.len() as u32;
        let out_of_quorum_names = raw
            .monmap
            .mons
            .iter()
            .filter(|m| !raw.quorum.contains(&m.rank))
            .map(|m| m.name.clone())
            .collect();
        let leader = raw
            .quorum
            .first()
            .and_then(|rank| raw.monmap.mons.iter().find(|m| m.rank == *rank))
            .map(|m| m.name.clone());
        MonitorQuorum {
            total_count,
            in_quorum_count,
            leader,
            quorum_names: raw.quorum_names,
            out_of_quorum_names,
            election_epoch: raw.election_epoch,
        }
    }
}

// --- storage usage ---------------------------------------------------------------

/// Thresholds used by `is_near_full`/`is_full`: NearFull activates at
/// 85% (inclusive), Full at 95% (inclusive).
const NEAR_FULL_PERCENT: f64 = 85.0;
const FULL_PERCENT: f64 = 95.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolUsage {
    pub name: String,
    pub id: i64,
    pub stored_bytes: u64,
    /// Already a percentage (0-100); see `StorageUsage::from` for the
    /// fraction-to-percent conversion from the raw `percent_used` field.
    pub used_percent: f64,
    pub objects: u64,
    pub max_avail_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageUsage {
    pub total_bytes: u64,
    pub total_used_bytes: u64,
    pub total_avail_bytes: u64,
    pub used_percent: f64,
    pub pools: Vec<PoolUsage>,
}

impl StorageUsage {
    pub fn is_near_full(&self) -> bool {
        self.used_percent >= NEAR_FULL_PERCENT
    }

    pub fn is_full(&self) -> bool {
        self.used_percent >= FULL_PERCENT
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DfJson {
    pub stats: DfStatsJson,
    #[serde(default)]
    pub pools: Vec<DfPoolJson>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DfStatsJson {
    pub total_bytes: u64,
    pub total_used_bytes: u64,
    pub total_avail_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DfPoolJson {
    pub name: String,
    pub id: i64,
    pub stats: DfPoolStatsJson,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DfPoolStatsJson {
    pub stored: u64,
    /// Fraction in [0,1]; MUST be multiplied by 100 for display.
    /// Verified against real `ceph df` output, not assumed.
    pub percent_used: f64,
    pub objects: u64,
    pub max_avail: u64,
}

impl From<DfJson> for StorageUsage {
    fn from(raw: DfJson) -> Self {
        let used_percent = if raw.stats.total_bytes == 0 {
            0.0
        } else {
            raw.stats.total_used_bytes as f64 / raw.stats.total_bytes as f64 * 100.0
        };
        let pools = raw
            .pools
            .into_iter()
            .map(|p| PoolUsage {
                name: p.name,
                id: p.id,
                stored_bytes: p.stats.stored,
                used_percent: p.stats.percent_used * 100.0,
                objects: p.stats.objects,
                max_avail_bytes: p.stats.max_avail,
            })
            .collect();
        StorageUsage {
            total_bytes: raw.stats.total_bytes,
            total_used_bytes: raw.stats.total_used_bytes,
            total_avail_bytes: raw.stats.total_avail_bytes,
            used_percent,
            pools,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse_with_whitespace() {
        let f = CephFlags::parse("noout, nodown ,  norebalance");
        assert!(f.noout);
        assert!(f.nodown);
        assert!(f.norebalance);
        assert!(!f.noin);
        assert!(!f.noup);
        assert!(!f.norecover);
        assert!(!f.noscrub);
        assert!(!f.nodeep_scrub);
        assert!(!f.nobackfill);
        assert!(!f.pause);
    }

    #[test]
    fn flags_unknown_tokens_ignored() {
        let f = CephFlags::parse("sortbitwise,recovery_deletes,purged_snapdirs");
        assert_eq!(f, CephFlags::default());
    }

    #[test]
    fn flags_empty_string_all_false() {
        let f = CephFlags::parse("");
        assert_eq!(f, CephFlags::default());
    }

    #[test]
    fn flags_round_trip() {
        let f = CephFlags::parse("noout,norebalance");
        let s = f.to_flags_string();
        let reparsed = CephFlags::parse(&s);
        assert_eq!(f, reparsed);
        assert_eq!(s, "noout,norebalance");
    }

    #[test]
    fn quorum_table() {
        let cases = [
            (3u32, 3u32, true, true),
            (3, 2, true, false),
            (3, 1, false, false),
            (5, 3, true, false),
            (5, 2, false, false),
            (0, 0, false, false),
        ];
        for (total, in_quorum, expect_has_quorum, expect_healthy) in cases {
            let q = MonitorQuorum {
                total_count: total,
                in_quorum_count: in_quorum,
                leader: None,
                quorum_names: vec![],
                out_of_quorum_names: vec![],
                election_epoch: 1,
            };
            assert_eq!(q.has_quorum(), expect_has_quorum, "total={total} in={in_quorum}");
            assert_eq!(q.is_healthy(), expect_healthy, "total={total} in={in_quorum}");
        }
    }

    #[test]
    fn near_full_and_full_thresholds() {
        let mk = |p: f64| StorageUsage {
            total_bytes: 100,
            total_used_bytes: 0,
            total_avail_bytes: 100,
            used_percent: p,
            pools: vec![],
        };
        assert!(!mk(84.0).is_near_full());
        assert!(!mk(84.0).is_full());
        assert!(mk(85.0).is_near_full());
        assert!(!mk(85.0).is_full());
        assert!(mk(94.0).is_near_full());
        assert!(!mk(94.0).is_full());
        assert!(mk(95.0).is_near_full());
        assert!(mk(95.0).is_full());
    }

    #[test]
    fn storage_usage_zero_total_is_zero_percent() {
        let raw = DfJson {
            stats: DfStatsJson {
                total_bytes: 0,
                total_used_bytes: 0,
                total_avail_bytes: 0,
            },
            pools: vec![],
        };
        let usage: StorageUsage = raw.into();
        assert_eq!(usage.used_percent, 0.0);
    }

    #[test]
    fn storage_usage_tentacle_tiny_usage_scenario() {
        let raw_json = r#"{
            "stats": {"total_bytes":32212254720,"total_used_bytes":109805568,"total_avail_bytes":32102449152},
            "pools": [{"name":".mgr","id":1,"stats":{"stored":459280,"objects":2,"percent_used":1.5197146240097936e-05,"max_avail":30455781376}}]
        }"#;
        let raw: DfJson = serde_json::from_str(raw_json).unwrap();
        let usage: StorageUsage = raw.into();
        assert!((usage.used_percent - 0.34).abs() < 0.01);
        let pool = &usage.pools[0];
        assert!((pool.used_percent - 0.00152).abs() < 1e-4);
        assert!(pool.used_percent < 0.01);
    }
}
