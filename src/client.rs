use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use uuid::Uuid;

use crate::cmd::{BucketNode, ClusterHealth, CrushDump, CrushRule, CrushTree, OsdDf};
use crate::error::{RookError, RookResult};
use crate::kube::KubeOperator;
use crate::toolbox::{ClusterClient, ToolboxCommand};
use crate::JsonData;

/// A RookCephClient handles communicating with a Rook-managed Ceph cluster
/// in a nicer, Rustier way
///
/// Every command is executed inside the toolbox pod of the configured
/// namespace and parsed from its JSON output.
///
/// ```rust,no_run
/// # use rook_ceph::RookCephClient;
/// # use rook_ceph::cmd::CrushTree;
/// # use rook_ceph::error::RookError;
/// # fn run() -> Result<CrushTree, RookError> {
/// let client = RookCephClient::new("rook-ceph");
/// let tree = client.osd_tree()?;
/// # Ok(tree)
/// # }
/// ```
pub struct RookCephClient {
    kube: KubeOperator,
    simulate: bool,
    timeout: Option<Duration>,
}

impl RookCephClient {
    pub fn new<T: Into<String>>(namespace: T) -> RookCephClient {
        RookCephClient {
            kube: KubeOperator::new(namespace),
            simulate: false,
            timeout: None,
        }
    }

    /// Log the commands that would run without mutating the cluster.
    /// Read-only commands still run.
    pub fn simulate(mut self) -> Self {
        self.simulate = true;
        self
    }

    /// Default timeout applied to every command.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kube(&self) -> &KubeOperator {
        &self.kube
    }

    /// Cluster status summary.
    pub fn status(&self) -> RookResult<JsonData> {
        self.run_command(ToolboxCommand::new("status"))
    }

    /// Cluster health, optionally with per-check detail.
    pub fn health(&self, detail: bool) -> RookResult<ClusterHealth> {
        let mut cmd = ToolboxCommand::new("health");
        if detail {
            cmd = cmd.with_arg("detail");
        }
        let data = self.run_command(cmd)?;
        Ok(serde_json::from_value(data)?)
    }

    /// Best-effort health poll: any failure is reported as unhealthy.
    pub fn health_ok(&self) -> bool {
        match self.health(false) {
            Ok(health) => health.is_ok(),
            Err(e) => {
                warn!("health check failed, reporting not ok: {}", e);
                false
            }
        }
    }

    pub fn fsid(&self) -> RookResult<String> {
        let data = self.run_command(ToolboxCommand::new("fsid"))?;
        crate::kube::get_object_value(&data, "fsid")
            .ok_or_else(|| RookError::new("No fsid in response from ceph".into()))
    }

    pub fn ceph_df(&self) -> RookResult<JsonData> {
        self.run_command(ToolboxCommand::new("df"))
    }

    pub fn osd_df_tree(&self) -> RookResult<OsdDf> {
        let data = self.run_command(ToolboxCommand::new("osd df").with_arg("tree"))?;
        Ok(serde_json::from_value(data)?)
    }

    pub fn osd_stat(&self) -> RookResult<JsonData> {
        self.run_command(ToolboxCommand::new("osd stat"))
    }

    pub fn osd_tree(&self) -> RookResult<CrushTree> {
        let data = self.run_command(ToolboxCommand::new("osd tree"))?;
        Ok(serde_json::from_value(data)?)
    }

    pub fn osd_crush_tree(&self) -> RookResult<Vec<BucketNode>> {
        let data = self.run_command(ToolboxCommand::new("osd crush tree"))?;
        // Newer releases wrap the roots in a "nodes" object, older ones
        // return the bare list.
        match data {
            JsonData::Object(ref map) if map.contains_key("nodes") => {
                Ok(serde_json::from_value(map["nodes"].clone())?)
            }
            other => Ok(serde_json::from_value(other)?),
        }
    }

    pub fn osd_crush_dump(&self) -> RookResult<CrushDump> {
        let data = self.run_command(ToolboxCommand::new("osd crush dump"))?;
        Ok(serde_json::from_value(data)?)
    }

    pub fn osd_crush_rule_ls(&self) -> RookResult<Vec<String>> {
        let data = self.run_command(ToolboxCommand::new("osd crush rule ls"))?;
        Ok(serde_json::from_value(data)?)
    }

    pub fn osd_crush_rule_dump(&self) -> RookResult<Vec<CrushRule>> {
        let data = self.run_command(ToolboxCommand::new("osd crush rule dump"))?;
        Ok(serde_json::from_value(data)?)
    }

    /// Find the rule name belonging to a ruleset id.
    pub fn crush_rule_by_ruleset(&self, ruleset: i64) -> RookResult<Option<String>> {
        let rules = self.osd_crush_rule_dump()?;
        Ok(rules
            .into_iter()
            .find(|r| r.ruleset == ruleset)
            .map(|r| r.rule_name))
    }

    /// Usable size of each tier in GiB, keyed by root bucket name.
    pub fn get_tiers_size(&self) -> RookResult<HashMap<String, u64>> {
        Ok(self.osd_df_tree()?.tier_sizes())
    }

    pub fn osd_pool_ls(&self) -> RookResult<Vec<String>> {
        let data = self.run_command(ToolboxCommand::new("osd pool ls"))?;
        Ok(serde_json::from_value(data)?)
    }

    /// Create a replicated pool placed by the rule of the given ruleset.
    pub fn osd_pool_create(
        &self,
        pool: &str,
        pg_num: u32,
        pgp_num: Option<u32>,
        ruleset: Option<i64>,
    ) -> RookResult<()> {
        let mut cmd = ToolboxCommand::new("osd pool create")
            .with_arg(pool)
            .with_arg(pg_num);
        if let Some(pgp) = pgp_num {
            cmd = cmd.with_arg(pgp);
        }
        if let Some(ruleset) = ruleset {
            let rule = self.crush_rule_by_ruleset(ruleset)?.ok_or_else(|| {
                RookError::new(format!("no crush rule with ruleset {}", ruleset))
            })?;
            cmd = cmd.with_arg("replicated").with_arg(rule);
        }
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    pub fn osd_pool_delete(&self, pool: &str) -> RookResult<()> {
        let cmd = ToolboxCommand::new("osd pool delete")
            .with_arg(pool)
            .with_arg(pool)
            .with_sure();
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    /// Query a ceph pool.
    pub fn osd_pool_get(&self, pool: &str, var: &str) -> RookResult<String> {
        let cmd = ToolboxCommand::new("osd pool get")
            .with_arg(pool)
            .with_arg(var);
        let data = self.run_command(cmd)?;
        crate::kube::get_object_value(&data, var).ok_or_else(|| {
            RookError::new(format!("Unable to parse osd pool get output: {:?}", data))
        })
    }

    /// Set a pool value
    pub fn osd_pool_set(&self, pool: &str, var: &str, value: &str, force: bool) -> RookResult<()> {
        let mut cmd = ToolboxCommand::new("osd pool set")
            .with_arg(pool)
            .with_arg(var)
            .with_arg(value);
        if force {
            cmd = cmd.with_sure();
        }
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    pub fn osd_pool_get_quota(&self, pool: &str) -> RookResult<JsonData> {
        self.run_command(ToolboxCommand::new("osd pool get-quota").with_arg(pool))
    }

    pub fn osd_pool_set_quota(&self, pool: &str, field: &str, value: &str) -> RookResult<()> {
        let cmd = ToolboxCommand::new("osd pool set-quota")
            .with_arg(pool)
            .with_arg(field)
            .with_arg(value);
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    pub fn auth_get_or_create(&self, entity: &str, caps: Option<&str>) -> RookResult<JsonData> {
        let mut cmd = ToolboxCommand::new("auth get-or-create").with_arg(entity);
        if let Some(caps) = caps {
            cmd = cmd.with_arg(caps);
        }
        self.run_command(cmd)
    }

    pub fn auth_del(&self, osd_id: u64) -> RookResult<()> {
        let cmd = ToolboxCommand::new("auth del").with_arg(format!("osd.{}", osd_id));
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    pub fn osd_create(&self, uuid: Option<Uuid>) -> RookResult<JsonData> {
        let mut cmd = ToolboxCommand::new("osd create");
        if let Some(uuid) = uuid {
            cmd = cmd.with_arg(uuid);
        }
        self.run_command(cmd)
    }

    pub fn osd_out(&self, osd_id: u64) -> RookResult<()> {
        let cmd = ToolboxCommand::new("osd out").with_arg(osd_id);
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    pub fn osd_down(&self, osd_id: u64) -> RookResult<()> {
        let cmd = ToolboxCommand::new("osd down").with_arg(osd_id);
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    pub fn osd_rm(&self, osd_id: u64) -> RookResult<()> {
        let cmd = ToolboxCommand::new("osd rm").with_arg(osd_id);
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    pub fn osd_crush_remove(&self, name: &str) -> RookResult<()> {
        let cmd = ToolboxCommand::new("osd crush remove").with_arg(name);
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    // ceph osd crush move osd.1 host=storage-0
    pub fn osd_crush_move(&self, name: &str, location: &str) -> RookResult<()> {
        let cmd = ToolboxCommand::new("osd crush move")
            .with_arg(name)
            .with_arg(location);
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    pub fn osd_crush_add_bucket(&self, name: &str, bucket_type: &str) -> RookResult<()> {
        let cmd = ToolboxCommand::new("osd crush add-bucket")
            .with_arg(name)
            .with_arg(bucket_type);
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    pub fn osd_crush_rename_bucket(&self, src: &str, dest: &str) -> RookResult<()> {
        let cmd = ToolboxCommand::new("osd crush rename-bucket")
            .with_arg(src)
            .with_arg(dest);
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    pub fn osd_crush_rule_rm(&self, name: &str) -> RookResult<()> {
        let cmd = ToolboxCommand::new("osd crush rule rm").with_arg(name);
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    pub fn osd_crush_rule_rename(&self, src: &str, dest: &str) -> RookResult<()> {
        let cmd = ToolboxCommand::new("osd crush rule rename")
            .with_arg(src)
            .with_arg(dest);
        if !self.simulate {
            self.run_command(cmd)?;
        }
        Ok(())
    }

    /// Export the live binary crushmap into a local file.
    pub fn osd_crushmap_get(&self, bin_file: &Path) -> RookResult<()> {
        let pod = self.kube.find_toolbox_pod()?;
        let remote = "/tmp/rook_ceph_crushmap.bin";
        let cmd = ToolboxCommand::new("osd getcrushmap")
            .raw_output()
            .with_arg("-o")
            .with_arg(remote)
            .with_timeout(self.timeout);
        debug!("osd getcrushmap: {}", cmd);
        self.kube.exec_in_pod(&pod, &cmd.words())?;
        self.kube.copy_from_pod(&pod, remote, bin_file)
    }

    /// Load a local binary crushmap into the cluster.
    pub fn osd_crushmap_set(&self, bin_file: &Path) -> RookResult<()> {
        let pod = self.kube.find_toolbox_pod()?;
        let remote = "/tmp/rook_ceph_crushmap.bin";
        self.kube.copy_to_pod(&pod, bin_file, remote)?;
        let cmd = ToolboxCommand::new("osd setcrushmap")
            .raw_output()
            .with_arg("-i")
            .with_arg(remote)
            .with_timeout(self.timeout);
        debug!("osd setcrushmap: {}", cmd);
        if !self.simulate {
            self.kube.exec_in_pod(&pod, &cmd.words())?;
        }
        Ok(())
    }

    /// Compile a crushmap text file into its binary form with `crushtool`.
    pub fn osd_crushmap_compile(&self, txt_file: &Path, bin_file: &Path) -> RookResult<()> {
        self.crushtool_convert(txt_file, bin_file, "-c")
    }

    /// Decompile a binary crushmap into its text form with `crushtool`.
    pub fn osd_crushmap_decompile(&self, bin_file: &Path, txt_file: &Path) -> RookResult<()> {
        self.crushtool_convert(bin_file, txt_file, "-d")
    }

    fn crushtool_convert(&self, input: &Path, output: &Path, mode: &str) -> RookResult<()> {
        let pod = self.kube.find_toolbox_pod()?;
        let remote_in = "/tmp/rook_ceph_crushtool.in";
        let remote_out = "/tmp/rook_ceph_crushtool.out";
        self.kube.copy_to_pod(&pod, input, remote_in)?;
        let cmd = ToolboxCommand::crushtool()
            .with_args(&[mode, remote_in, "-o", remote_out])
            .with_timeout(self.timeout);
        debug!("crushtool: {}", cmd);
        self.kube.exec_in_pod(&pod, &cmd.words())?;
        self.kube.copy_from_pod(&pod, remote_out, output)
    }

    pub fn run_command(&self, command: ToolboxCommand) -> RookResult<JsonData> {
        let command = command.with_timeout(self.timeout);
        ClusterClient::run_toolbox_command(self, &command)
    }
}

impl ClusterClient for RookCephClient {
    fn run_toolbox_command(&self, command: &ToolboxCommand) -> RookResult<JsonData> {
        debug!("toolbox command: {}", command);
        let pod = self.kube.find_toolbox_pod()?;
        let output = self.kube.exec_in_pod(&pod, &command.words())?;
        if !command.expects_json() {
            return Ok(JsonData::String(output));
        }
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Ok(JsonData::Null);
        }
        serde_json::from_str(trimmed).map_err(|e| {
            RookError::CommandFailure(format!("unable to parse output of '{}': {}", command, e))
        })
    }

    fn get_crush_tree(&self) -> RookResult<Vec<BucketNode>> {
        self.osd_crush_tree()
    }

    fn crush_dump(&self) -> RookResult<CrushDump> {
        self.osd_crush_dump()
    }

    fn list_crush_rules(&self) -> RookResult<Vec<String>> {
        self.osd_crush_rule_ls()
    }

    fn dump_crush_rules(&self) -> RookResult<Vec<CrushRule>> {
        self.osd_crush_rule_dump()
    }

    fn crushmap_get(&self, bin_file: &Path) -> RookResult<()> {
        self.osd_crushmap_get(bin_file)
    }

    fn crushmap_set(&self, bin_file: &Path) -> RookResult<()> {
        self.osd_crushmap_set(bin_file)
    }

    fn crushmap_compile(&self, txt_file: &Path, bin_file: &Path) -> RookResult<()> {
        self.osd_crushmap_compile(txt_file, bin_file)
    }

    fn crushmap_decompile(&self, bin_file: &Path, txt_file: &Path) -> RookResult<()> {
        self.osd_crushmap_decompile(bin_file, txt_file)
    }
}
