//! Parsed output of the toolbox CLI commands.
//!
//! Ceph has a command system defined
//! in https://github.com/ceph/ceph/blob/master/src/mon/MonCommands.h
//! and every command this crate runs asks for `--format json`; the structs
//! here mirror the JSON those commands return.

use std::collections::HashMap;

/// One entry of the flat `osd tree` node list.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CrushNode {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub crush_type: String,
    pub type_id: i64,
    pub children: Option<Vec<i64>>,
    pub crush_weight: Option<f64>,
    pub depth: Option<i64>,
    pub exists: Option<i64>,
    pub status: Option<String>,
    pub reweight: Option<f64>,
    pub primary_affinity: Option<f64>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CrushTree {
    pub nodes: Vec<CrushNode>,
    #[serde(default)]
    pub stray: Vec<CrushNode>,
}

/// One node of the nested `osd crush tree` output. Roots carry the whole
/// subtree in `items`; OSD devices are the leaves.
///
/// This is the planning snapshot for hierarchy operations: it is fetched
/// once per top-level operation and never mutated in place, every change is
/// issued as a discrete command against the live cluster.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BucketNode {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub bucket_type: String,
    #[serde(default)]
    pub type_id: i64,
    #[serde(default)]
    pub items: Vec<BucketNode>,
}

impl BucketNode {
    pub fn is_root(&self) -> bool {
        self.bucket_type == "root"
    }

    pub fn is_device(&self) -> bool {
        self.bucket_type == "osd"
    }
}

/// Flat bucket entry from `osd crush dump`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CrushBucket {
    pub id: i64,
    pub name: String,
    pub type_id: i64,
    pub type_name: String,
    #[serde(default)]
    pub weight: i64,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct CrushDump {
    #[serde(default)]
    pub buckets: Vec<CrushBucket>,
    #[serde(default)]
    pub rules: Vec<CrushRule>,
}

/// Placement rule as reported by `osd crush rule dump`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CrushRule {
    pub rule_id: i64,
    pub rule_name: String,
    pub ruleset: i64,
    #[serde(rename = "type")]
    pub rule_type: Option<i64>,
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
}

/// One entry of the `osd df tree` node list. Only the fields the tier
/// sizing walk needs.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OsdDfNode {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub kb: u64,
    #[serde(default)]
    pub children: Vec<i64>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OsdDf {
    pub nodes: Vec<OsdDfNode>,
}

impl OsdDf {
    /// Usable size of each tier in GiB, keyed by root bucket name.
    ///
    /// For every root the hierarchy is walked root -> chassis -> host; each
    /// chassis contributes the size of its smallest host, since replication
    /// across a peer group cannot exceed that.
    pub fn tier_sizes(&self) -> HashMap<String, u64> {
        let by_id: HashMap<i64, &OsdDfNode> =
            self.nodes.iter().map(|node| (node.id, node)).collect();

        let mut sizes = HashMap::new();
        for tier in self.nodes.iter().filter(|n| n.node_type == "root") {
            let mut tier_kb: u64 = 0;
            for chassis in tier.children.iter().filter_map(|id| by_id.get(id)) {
                let mut chassis_kb: u64 = 0;
                for host in chassis.children.iter().filter_map(|id| by_id.get(id)) {
                    if chassis_kb == 0 || chassis_kb > host.kb {
                        chassis_kb = host.kb;
                    }
                }
                tier_kb += chassis_kb;
            }
            sizes.insert(tier.name.clone(), tier_kb / (1024 * 1024));
        }
        sizes
    }
}

/// Output of `ceph health`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ClusterHealth {
    pub status: String,
    #[serde(default)]
    pub checks: HashMap<String, serde_json::Value>,
}

impl ClusterHealth {
    pub fn is_ok(&self) -> bool {
        self.status == "HEALTH_OK"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn df_node(id: i64, name: &str, node_type: &str, kb: u64, children: &[i64]) -> OsdDfNode {
        OsdDfNode {
            id,
            name: name.to_string(),
            node_type: node_type.to_string(),
            kb,
            children: children.to_vec(),
        }
    }

    #[test]
    fn tier_size_takes_smallest_host_per_chassis() {
        let df = OsdDf {
            nodes: vec![
                df_node(-1, "storage-tier", "root", 0, &[-2]),
                df_node(-2, "group-0", "chassis", 0, &[-3, -4]),
                df_node(-3, "storage-0", "host", 4 * 1024 * 1024, &[0]),
                df_node(-4, "storage-1", "host", 2 * 1024 * 1024, &[1]),
                df_node(0, "osd.0", "osd", 4 * 1024 * 1024, &[]),
                df_node(1, "osd.1", "osd", 2 * 1024 * 1024, &[]),
            ],
        };

        let sizes = df.tier_sizes();
        assert_eq!(sizes.get("storage-tier"), Some(&2));
    }

    #[test]
    fn tier_sizes_sum_across_chassis() {
        let df = OsdDf {
            nodes: vec![
                df_node(-1, "gold-tier", "root", 0, &[-2, -5]),
                df_node(-2, "group-0-gold", "chassis", 0, &[-3]),
                df_node(-3, "storage-0-gold", "host", 3 * 1024 * 1024, &[]),
                df_node(-5, "group-1-gold", "chassis", 0, &[-6]),
                df_node(-6, "storage-1-gold", "host", 5 * 1024 * 1024, &[]),
            ],
        };

        let sizes = df.tier_sizes();
        assert_eq!(sizes.get("gold-tier"), Some(&8));
    }
}
