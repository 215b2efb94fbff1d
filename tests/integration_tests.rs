extern crate rook_ceph;
extern crate serde;
extern crate serde_json;

use rook_ceph::cmd::{BucketNode, ClusterHealth, CrushDump, CrushTree, OsdDf};
use std::fs::File;
use std::io::Read;

fn read_fixture(name: &str) -> String {
    let mut buff = String::new();
    let mut f = File::open(format!("tests/{}", name)).unwrap();
    f.read_to_string(&mut buff).unwrap();
    buff
}

#[test]
fn test_osd_tree_nautilus() {
    let json = read_fixture("osd_tree-nautilus");
    let tree: CrushTree = serde_json::from_str(&json).unwrap();
    println!("osd_tree: {:#?}", tree);
    assert!(tree.nodes.iter().any(|n| n.crush_type == "root"));
}

#[test]
fn test_crush_tree_nautilus() {
    let json = read_fixture("crush_tree-nautilus");
    let roots: Vec<BucketNode> = serde_json::from_str(&json).unwrap();
    println!("crush_tree: {:#?}", roots);

    let root = roots.iter().find(|r| r.is_root()).unwrap();
    assert_eq!(root.name, "storage-tier");
    let chassis = &root.items[0];
    assert_eq!(chassis.bucket_type, "chassis");
    assert!(chassis.items.iter().all(|h| h.bucket_type == "host"));
    assert!(chassis.items[0].items.iter().all(|d| d.is_device()));
}

#[test]
fn test_crush_dump_nautilus() {
    let json = read_fixture("crush_dump-nautilus");
    let dump: CrushDump = serde_json::from_str(&json).unwrap();
    println!("crush_dump: {:#?}", dump);

    assert!(dump.buckets.iter().any(|b| b.type_name == "root"));
    assert!(dump
        .rules
        .iter()
        .any(|r| r.rule_name == "replicated_rule" && r.ruleset == 0));
}

#[test]
fn test_osd_df_tree_nautilus() {
    let json = read_fixture("osd_df_tree-nautilus");
    let df: OsdDf = serde_json::from_str(&json).unwrap();
    println!("osd_df: {:#?}", df);

    let sizes = df.tier_sizes();
    assert_eq!(sizes.get("storage-tier"), Some(&1));
}

#[test]
fn test_health_nautilus() {
    let json = read_fixture("health-nautilus");
    let health: ClusterHealth = serde_json::from_str(&json).unwrap();
    println!("health: {:#?}", health);
    assert!(!health.is_ok());
    assert!(health.checks.contains_key("OSD_DOWN"));
}
