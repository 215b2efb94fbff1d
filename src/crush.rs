//! Storage tier management over the CRUSH map.
//!
//! A tier is a logical replication domain: a root bucket hierarchy mirrored
//! from the default tier under a new name, plus one placement rule with a
//! deterministic name. The default tier always exists and is never mirrored
//! over, renamed or deleted.
//!
//! Nomenclature for mirrored tiers:
//!
//! ```text
//! root gold-tier
//!     chassis group-0-gold
//!         host storage-0-gold
//!         host storage-1-gold
//! ```
//!
//! Multi-step operations here are not atomic against concurrent cluster
//! mutation; there is no locking around them. Failures during a mirror are
//! answered with a compensating delete sweep, which is best effort and not
//! a guaranteed rollback.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::cmd::BucketNode;
use crate::config::{CrushConfig, CRUSH_TIER_SUFFIX};
use crate::error::{RookError, RookResult};
use crate::toolbox::{ClusterClient, ToolboxCommand};

/// Failure domain for a tier's placement rule.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReplicateBy {
    /// Replicas on different hosts of the same peer group.
    Host,
    /// Replicas on different OSDs, for single-host clusters.
    Osd,
}

impl AsRef<str> for ReplicateBy {
    fn as_ref(&self) -> &str {
        match *self {
            ReplicateBy::Host => "host",
            ReplicateBy::Osd => "osd",
        }
    }
}

impl fmt::Display for ReplicateBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Generate the normalized crushmap root name for a tier. Idempotent: a
/// name already carrying the suffix is left alone.
pub fn format_root_name(name: &str) -> String {
    if name.ends_with(CRUSH_TIER_SUFFIX) {
        name.to_string()
    } else {
        format!("{}{}", name, CRUSH_TIER_SUFFIX)
    }
}

/// Deterministic rule name for a tier: root name plus `-ruleset`, hyphens
/// replaced with underscores. `"gold"` becomes `"gold_tier_ruleset"`.
pub fn format_rule_name(name: &str) -> String {
    format!("{}-ruleset", format_root_name(name)).replace('-', "_")
}

/// Mirrors, renames and deletes CRUSH tiers and their placement rules.
///
/// Holds no cluster state: every operation re-reads the live tree through
/// the [`ClusterClient`] and plans its commands against that one snapshot.
pub struct CrushHierarchyManager<C> {
    client: C,
    config: CrushConfig,
}

impl<C: ClusterClient> CrushHierarchyManager<C> {
    pub fn new(client: C, config: CrushConfig) -> CrushHierarchyManager<C> {
        CrushHierarchyManager { client, config }
    }

    pub fn config(&self) -> &CrushConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Create a new root hierarchy that matches an existing root hierarchy.
    ///
    /// Only the default tier may be used as the mirror source. If the walk
    /// trips the recursion bound, a compensating delete sweep removes the
    /// buckets that may have been created before the error is surfaced.
    pub fn mirror_root(&self, src_name: &str, dest_name: &str) -> RookResult<()> {
        let src_root_name = format_root_name(src_name);
        let dest_root_name = format_root_name(dest_name);

        let default_root_name = format_root_name(&self.config.default_tier);
        if src_root_name != default_root_name {
            return Err(RookError::InvalidTierUse {
                tier: src_name.to_string(),
                reason: format!("can only mirror '{}'", default_root_name),
            });
        }

        let tree = self.client.get_crush_tree()?;

        // The destination root must not be present yet.
        if tree.iter().any(|r| r.name == dest_root_name) {
            return Err(RookError::TierAlreadyExists {
                tier: dest_root_name,
            });
        }

        let src_root: Vec<BucketNode> = tree
            .into_iter()
            .filter(|r| r.name == src_root_name)
            .collect();
        if src_root.is_empty() {
            return Err(RookError::InvalidTierUse {
                tier: src_name.to_string(),
                reason: format!("the required source root '{}' does not exist", src_root_name),
            });
        }

        info!(
            "mirroring crush root for new tier: src = {}, dest = {}",
            src_root_name, dest_root_name
        );
        if let Err(err) = self.mirror_items(&src_root, dest_name, None, 0) {
            error!(
                "unexpected recursion level seen while mirroring crushmap \
             hierarchy, rolling back crushmap changes"
            );
            // Compensating sweep over the same source subtree using the
            // mirrored names; its own overflow is logged, not surfaced.
            let overflow = self.delete_items(&src_root, dest_name, 0, true);
            if overflow != 0 {
                warn!("rollback sweep hit the recursion limit at depth {}", overflow);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Remove a tier's root hierarchy from the crushmap.
    pub fn delete_root(&self, name: &str) -> RookResult<()> {
        let default_root_name = format_root_name(&self.config.default_tier);
        let root_name = format_root_name(name);
        if root_name == default_root_name {
            return Err(RookError::InvalidTierUse {
                tier: name.to_string(),
                reason: format!("cannot remove tier '{}'", default_root_name),
            });
        }

        let tree = self.client.get_crush_tree()?;
        let root: Vec<BucketNode> = tree
            .into_iter()
            .filter(|r| r.name == root_name)
            .collect();
        if root.is_empty() {
            return Err(RookError::TierNotFound { tier: root_name });
        }

        let overflow = self.delete_items(&root, name, 0, false);
        if overflow != 0 {
            return Err(RookError::MaxRecursionExceeded { depth: overflow });
        }
        Ok(())
    }

    /// Add a tier crushmap rule.
    ///
    /// The Ceph CLI only supports simple single-step rule creation, so the
    /// live crushmap is exported, decompiled, the rule block spliced into
    /// the text and the result compiled and loaded back.
    pub fn add_rule(&self, tier_name: &str, replicate_by: ReplicateBy) -> RookResult<()> {
        self.check_crushmap_applied("cannot add any additional rules")?;

        let default_root_name = format_root_name(&self.config.default_tier);
        let root_name = format_root_name(tier_name);
        if root_name == default_root_name {
            return Err(RookError::RuleAlreadyExists {
                tier: tier_name.to_string(),
                rule: "default".to_string(),
            });
        }

        let (rule_is_present, rule_name, rule_count) = self.rule_status(&root_name);
        if rule_is_present {
            return Err(RookError::RuleAlreadyExists {
                tier: tier_name.to_string(),
                rule: rule_name,
            });
        }

        // Scratch files are removed on every exit path by the guard.
        let scratch = ScratchFiles::new(&self.config.workdir, "crushmap_rule_update");

        self.client.crushmap_get(&scratch.bin)?;
        self.client.crushmap_decompile(&scratch.bin, &scratch.txt)?;

        let text = fs::read_to_string(&scratch.txt)?;
        let mut contents: Vec<String> = text.lines().map(|l| format!("{}\n", l)).collect();
        insert_crush_rule(&mut contents, &root_name, &rule_name, rule_count, replicate_by);
        fs::write(&scratch.txt, contents.concat())?;

        self.client.crushmap_compile(&scratch.txt, &scratch.bin)?;
        info!(
            "loading updated crushmap with elements for crushmap root: {}",
            root_name
        );
        self.client.crushmap_set(&scratch.bin)
    }

    /// Delete an existing tier crushmap rule.
    pub fn delete_rule(&self, tier_name: &str) -> RookResult<()> {
        self.check_crushmap_applied("cannot remove any additional rules")?;

        let default_root_name = format_root_name(&self.config.default_tier);
        let root_name = format_root_name(tier_name);
        if root_name == default_root_name {
            return Err(RookError::InvalidTierUse {
                tier: tier_name.to_string(),
                reason: format!("cannot remove the rule for tier '{}'", default_root_name),
            });
        }

        let (rule_is_present, rule_name, _) = self.rule_status(&root_name);
        if !rule_is_present {
            return Err(RookError::InvalidRuleOperation {
                rule: rule_name,
                reason: "rule is not present in the crushmap, no action taken".to_string(),
            });
        }

        info!("ceph osd crush rule rm {}", rule_name);
        self.run(
            self.command("osd crush rule rm").with_arg(&rule_name),
        )
    }

    /// Rename a tier: all of its buckets first, then its rule.
    ///
    /// The whole operation runs under a saved crushmap; if any rename
    /// fails, the backup is loaded back best-effort and the failure is
    /// surfaced.
    pub fn rename_tier(&self, old_name: &str, new_name: &str) -> RookResult<()> {
        let default_root_name = format_root_name(&self.config.default_tier);
        if format_root_name(old_name) == default_root_name {
            return Err(RookError::InvalidTierUse {
                tier: old_name.to_string(),
                reason: format!("cannot rename tier '{}'", default_root_name),
            });
        }
        self.with_crushmap_backup(|mgr| mgr.rename_tier_buckets(old_name, new_name))
    }

    /// Delete a custom storage tier: its rule, then its root hierarchy.
    /// A missing rule or missing root is tolerated; anything else is
    /// re-raised.
    pub fn delete_tier(&self, name: &str) -> RookResult<()> {
        if let Err(err) = self.delete_rule(name) {
            match err {
                RookError::InvalidRuleOperation { ref rule, .. } => {
                    debug!("no rule '{}' to delete for tier '{}'", rule, name);
                }
                other => return Err(other),
            }
        }

        if let Err(err) = self.delete_root(name) {
            match err {
                RookError::TierNotFound { ref tier } => {
                    debug!("no crushmap root '{}' to delete", tier);
                }
                other => return Err(other),
            }
        }
        Ok(())
    }

    /// Walk a source subtree depth-first and create the mirrored bucket for
    /// every non-device node, moving each new bucket under its mirrored
    /// ancestor.
    fn mirror_items(
        &self,
        items: &[BucketNode],
        tier_name: &str,
        ancestor: Option<(&str, &str)>,
        depth: u32,
    ) -> RookResult<()> {
        // Safeguard against malformed or cyclic trees.
        if depth > self.config.max_depth {
            return Err(RookError::MaxRecursionExceeded { depth });
        }

        let root_name = format_root_name(tier_name);
        for item in items {
            let bucket_name = if item.is_root() {
                root_name.clone()
            } else {
                format!("{}-{}", item.name, tier_name)
            };

            if !item.is_device() {
                debug!("bucket_name = {}, depth = {}", bucket_name, depth);
                self.bucket_add(&bucket_name, &item.bucket_type);

                if !item.items.is_empty() {
                    self.mirror_items(
                        &item.items,
                        tier_name,
                        Some((item.bucket_type.as_str(), bucket_name.as_str())),
                        depth + 1,
                    )?;
                }

                if let Some((ancestor_type, ancestor_name)) = ancestor {
                    self.bucket_move(&bucket_name, ancestor_type, ancestor_name);
                }
            }
        }
        Ok(())
    }

    /// Remove a subtree's buckets, children before their parent as the
    /// recursion unwinds. With `rollback` the mirrored naming scheme is
    /// targeted and device leaves are skipped, since the mirror never
    /// creates them; a direct deletion targets live names and clears
    /// devices out of the tier too.
    ///
    /// Returns the depth at which the recursion bound was hit, or 0.
    fn delete_items(&self, items: &[BucketNode], tier_name: &str, depth: u32, rollback: bool) -> u32 {
        if depth > self.config.max_depth {
            return depth;
        }

        let root_name = format_root_name(tier_name);
        let mut overflow = 0;
        for item in items {
            let bucket_name = if item.is_root() {
                root_name.clone()
            } else if rollback {
                format!("{}-{}", item.name, tier_name)
            } else {
                item.name.clone()
            };

            if !item.items.is_empty() {
                let ret = self.delete_items(&item.items, tier_name, depth + 1, rollback);
                if ret != 0 {
                    overflow = ret;
                }
            }

            if rollback && item.is_device() {
                continue;
            }
            debug!(
                "bucket_name = {}, depth = {}, overflow = {}",
                bucket_name, depth, overflow
            );
            self.bucket_remove(&bucket_name);
        }
        overflow
    }

    fn rename_tier_buckets(&self, old_name: &str, new_name: &str) -> RookResult<()> {
        let old_root_name = format_root_name(old_name);
        let new_root_name = format_root_name(new_name);
        let dump = self.client.crush_dump()?;

        // Build the map of buckets to be renamed from one dump snapshot.
        let old_suffix = format!("-{}", old_name);
        let new_suffix = format!("-{}", new_name);
        let mut rename_map: Vec<(String, String)> = Vec::new();
        for bucket in &dump.buckets {
            if bucket.type_name == "root" {
                if bucket.name == old_root_name {
                    rename_map.push((bucket.name.clone(), new_root_name.clone()));
                }
            } else if bucket.name.ends_with(&old_suffix) {
                let stem = &bucket.name[..bucket.name.len() - old_suffix.len()];
                rename_map.push((bucket.name.clone(), format!("{}{}", stem, new_suffix)));
            }
        }

        let existing: HashSet<&str> = dump.buckets.iter().map(|b| b.name.as_str()).collect();
        let conflicts: Vec<String> = rename_map
            .iter()
            .map(|(_, to)| to.clone())
            .filter(|to| existing.contains(to.as_str()))
            .collect();
        if !conflicts.is_empty() {
            return Err(RookError::TierRenameConflict {
                tier: old_name.to_string(),
                conflicts,
            });
        }

        for (from, to) in &rename_map {
            self.run(
                self.command("osd crush rename-bucket")
                    .with_arg(from)
                    .with_arg(to),
            )?;
            info!("renamed bucket from '{}' to '{}'", from, to);
        }

        let old_rule_name = format_rule_name(old_name);
        let new_rule_name = format_rule_name(new_name);
        self.run(
            self.command("osd crush rule rename")
                .with_arg(&old_rule_name)
                .with_arg(&new_rule_name),
        )?;
        info!(
            "renamed crush rule from '{}' to '{}'",
            old_rule_name, new_rule_name
        );
        Ok(())
    }

    /// Save the live crushmap, run `f`, and on failure load the saved map
    /// back. The restore is best effort; the original failure is always
    /// the one surfaced.
    fn with_crushmap_backup<F>(&self, f: F) -> RookResult<()>
    where
        F: FnOnce(&Self) -> RookResult<()>,
    {
        let backup = ScratchFiles::new(&self.config.workdir, "crushmap_backup");
        info!("saving crushmap for safe update");
        self.client.crushmap_get(&backup.bin)?;

        match f(self) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("crushmap update failed, restoring from backup: {}", err);
                if let Err(restore_err) = self.client.crushmap_set(&backup.bin) {
                    error!("failed to restore crushmap from backup: {}", restore_err);
                }
                Err(err)
            }
        }
    }

    /// Whether the tier's rule exists, its deterministic name, and the
    /// current rule count. Listing failures are logged and reported as the
    /// conservative "no rule present".
    fn rule_status(&self, root_name: &str) -> (bool, String, usize) {
        let name = format!("{}-ruleset", root_name).replace('-', "_");
        debug!("ceph osd crush rule ls");
        match self.client.list_crush_rules() {
            Ok(rules) => {
                let present = rules.iter().any(|r| *r == name);
                (present, name, rules.len())
            }
            Err(e) => {
                error!("failed to list crush rules: {}", e);
                (false, name, 0)
            }
        }
    }

    fn check_crushmap_applied(&self, action: &str) -> RookResult<()> {
        if !self.config.crushmap_applied_flag.is_file() {
            return Err(RookError::CrushMapNotApplied {
                reason: action.to_string(),
            });
        }
        Ok(())
    }

    // The individual bucket commands during a walk are best effort: one
    // failed bucket is logged and the walk carries on, mirroring is not
    // transactional either way.

    fn bucket_add(&self, bucket_name: &str, bucket_type: &str) {
        info!("ceph osd crush add-bucket {} {}", bucket_name, bucket_type);
        if let Err(e) = self.run(
            self.command("osd crush add-bucket")
                .with_arg(bucket_name)
                .with_arg(bucket_type),
        ) {
            error!("failed to add crush bucket {}: {}", bucket_name, e);
        }
    }

    fn bucket_remove(&self, bucket_name: &str) {
        info!("ceph osd crush remove {}", bucket_name);
        if let Err(e) = self.run(self.command("osd crush remove").with_arg(bucket_name)) {
            error!("failed to remove crush bucket {}: {}", bucket_name, e);
        }
    }

    fn bucket_move(&self, bucket_name: &str, ancestor_type: &str, ancestor_name: &str) {
        info!(
            "ceph osd crush move {} {}={}",
            bucket_name, ancestor_type, ancestor_name
        );
        if let Err(e) = self.run(
            self.command("osd crush move")
                .with_arg(bucket_name)
                .with_arg(format!("{}={}", ancestor_type, ancestor_name)),
        ) {
            error!("failed to move crush bucket {}: {}", bucket_name, e);
        }
    }

    fn command(&self, prefix: &str) -> ToolboxCommand {
        ToolboxCommand::new(prefix).with_timeout(self.config.timeout)
    }

    fn run(&self, command: ToolboxCommand) -> RookResult<()> {
        self.client.run_toolbox_command(&command).map(|_| ())
    }
}

/// Splice a new rule block into decompiled crushmap text, in front of the
/// trailing `# end crush map` comment.
fn insert_crush_rule(
    contents: &mut Vec<String>,
    root_name: &str,
    rule_name: &str,
    rule_count: usize,
    replicate_by: ReplicateBy,
) {
    let rule = vec![
        format!("rule {} {{\n", rule_name),
        format!("    ruleset {}\n", rule_count + 1),
        "    type replicated\n".to_string(),
        "    min_size 1\n".to_string(),
        "    max_size 10\n".to_string(),
        format!("    step take {}\n", root_name),
        "    step choose firstn 1 type chassis\n".to_string(),
        format!("    step chooseleaf firstn 0 type {}\n", replicate_by),
        "    step emit\n".to_string(),
        "}\n".to_string(),
    ];

    let at = contents.len().saturating_sub(1);
    contents.splice(at..at, rule);
}

/// Scratch files for a crushmap recompile, removed when dropped no matter
/// how the operation ends.
struct ScratchFiles {
    bin: PathBuf,
    txt: PathBuf,
}

impl ScratchFiles {
    fn new(workdir: &std::path::Path, stem: &str) -> ScratchFiles {
        ScratchFiles {
            bin: workdir.join(format!("{}.bin", stem)),
            txt: workdir.join(format!("{}.txt", stem)),
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.bin);
        let _ = fs::remove_file(&self.txt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_name_gets_the_tier_suffix_once() {
        assert_eq!(format_root_name("gold"), "gold-tier");
        assert_eq!(format_root_name("gold-tier"), "gold-tier");
        assert_eq!(format_root_name("storage"), "storage-tier");
    }

    #[test]
    fn rule_names_are_deterministic() {
        assert_eq!(format_rule_name("gold"), "gold_tier_ruleset");
        assert_eq!(format_rule_name("silver-tier"), "silver_tier_ruleset");
        assert_eq!(format_rule_name("my-fast-tier"), "my_fast_tier_ruleset");
    }

    #[test]
    fn rule_block_is_spliced_before_the_trailing_comment() {
        let mut contents: Vec<String> = vec![
            "# begin crush map\n".to_string(),
            "root storage-tier {\n".to_string(),
            "}\n".to_string(),
            "# end crush map\n".to_string(),
        ];
        insert_crush_rule(
            &mut contents,
            "gold-tier",
            "gold_tier_ruleset",
            2,
            ReplicateBy::Host,
        );

        assert_eq!(contents.last().unwrap(), "# end crush map\n");
        assert_eq!(contents[3], "rule gold_tier_ruleset {\n");
        assert_eq!(contents[4], "    ruleset 3\n");
        assert!(contents.contains(&"    step take gold-tier\n".to_string()));
        assert!(contents.contains(&"    step chooseleaf firstn 0 type host\n".to_string()));
        assert!(contents.contains(&"    step emit\n".to_string()));
    }

    #[test]
    fn rule_block_replicates_by_osd_when_asked() {
        let mut contents: Vec<String> =
            vec!["# begin crush map\n".to_string(), "# end crush map\n".to_string()];
        insert_crush_rule(
            &mut contents,
            "gold-tier",
            "gold_tier_ruleset",
            0,
            ReplicateBy::Osd,
        );
        assert!(contents.contains(&"    step chooseleaf firstn 0 type osd\n".to_string()));
        assert!(contents.contains(&"    ruleset 1\n".to_string()));
    }
}
