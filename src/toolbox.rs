//! Toolbox command construction and the collaborator contract used by the
//! crush hierarchy manager.
//!
//! Rook runs cluster administration binaries inside a toolbox pod; every
//! command this crate issues is an argv executed in that context. The
//! [`ToolboxCommand`] builder assembles the argv the same way for the real
//! `kubectl exec` transport and for test doubles.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::cmd::{BucketNode, CrushDump, CrushRule};
use crate::error::RookResult;
use crate::JsonData;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_a_toolbox_command() {
        let command = ToolboxCommand::new("osd crush add-bucket")
            .with_arg("gold-tier")
            .with_arg("root");

        assert_eq!(
            command.words(),
            vec!["ceph", "osd", "crush", "add-bucket", "gold-tier", "root", "--format", "json"]
        );
    }

    #[test]
    fn it_prefixes_a_timeout() {
        let command = ToolboxCommand::new("health")
            .with_timeout(Some(Duration::from_secs(30)));

        assert_eq!(
            command.words(),
            vec!["timeout", "30", "ceph", "health", "--format", "json"]
        );
    }

    #[test]
    fn it_appends_the_confirmation_flag() {
        let command = ToolboxCommand::new("osd pool delete")
            .with_arg("rbd")
            .with_arg("rbd")
            .with_sure();

        assert_eq!(
            command.words(),
            vec![
                "ceph",
                "osd",
                "pool",
                "delete",
                "rbd",
                "rbd",
                "--format",
                "json",
                "--yes-i-really-really-mean-it"
            ]
        );
    }

    #[test]
    fn it_builds_a_crushtool_command() {
        let command = ToolboxCommand::crushtool()
            .with_arg("-d")
            .with_arg("/tmp/cm.bin")
            .with_arg("-o")
            .with_arg("/tmp/cm.txt");

        assert_eq!(
            command.words(),
            vec!["crushtool", "-d", "/tmp/cm.bin", "-o", "/tmp/cm.txt"]
        );
    }
}

/// One command destined for the toolbox pod.
///
/// ```rust
/// use rook_ceph::ToolboxCommand;
///
/// let cmd = ToolboxCommand::new("osd crush move")
///     .with_arg("storage-0-gold")
///     .with_arg("chassis=group-0-gold");
/// assert_eq!(cmd.to_string(), "osd crush move storage-0-gold chassis=group-0-gold");
/// ```
pub struct ToolboxCommand {
    program: &'static str,
    args: Vec<String>,
    format_json: bool,
    sure: bool,
    timeout: Option<Duration>,
}

impl ToolboxCommand {
    /// A `ceph` invocation. The prefix is the subcommand as it would be
    /// typed on the CLI, e.g. `"osd crush tree"`; `--format json` is
    /// appended automatically.
    pub fn new(prefix: &str) -> ToolboxCommand {
        ToolboxCommand {
            program: "ceph",
            args: prefix.split_whitespace().map(String::from).collect(),
            format_json: true,
            sure: false,
            timeout: None,
        }
    }

    /// A `crushtool` invocation. Output is raw, never JSON.
    pub fn crushtool() -> ToolboxCommand {
        ToolboxCommand {
            program: "crushtool",
            args: Vec::new(),
            format_json: false,
            sure: false,
            timeout: None,
        }
    }

    pub fn with_arg<T: fmt::Display>(mut self, arg: T) -> ToolboxCommand {
        self.args.push(arg.to_string());
        self
    }

    pub fn with_args(mut self, args: &[&str]) -> ToolboxCommand {
        self.args.extend(args.iter().map(|a| a.to_string()));
        self
    }

    /// Disable the `--format json` suffix for commands with raw or
    /// file-based output, e.g. `osd getcrushmap`.
    pub fn raw_output(mut self) -> ToolboxCommand {
        self.format_json = false;
        self
    }

    /// Append the interactive confirmation flag destructive commands ask
    /// for.
    pub fn with_sure(mut self) -> ToolboxCommand {
        self.sure = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> ToolboxCommand {
        self.timeout = timeout;
        self
    }

    pub fn expects_json(&self) -> bool {
        self.format_json
    }

    /// The full argv to run inside the toolbox pod. A timeout becomes a
    /// `timeout(1)` prefix so the remote side enforces it; the caller only
    /// ever sees the resulting non-zero exit.
    pub fn words(&self) -> Vec<String> {
        let mut words: Vec<String> = Vec::with_capacity(self.args.len() + 4);
        if let Some(t) = self.timeout {
            words.push("timeout".to_string());
            words.push(t.as_secs().max(1).to_string());
        }
        words.push(self.program.to_string());
        words.extend(self.args.iter().cloned());
        if self.format_json {
            words.push("--format".to_string());
            words.push("json".to_string());
        }
        if self.sure {
            words.push("--yes-i-really-really-mean-it".to_string());
        }
        words
    }
}

impl fmt::Display for ToolboxCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// Everything the crush hierarchy manager needs from the cluster.
///
/// [`RookCephClient`](crate::client::RookCephClient) is the production
/// implementation; tests substitute a recording double. Crushmap file
/// operations take local paths, the implementation is responsible for
/// staging them in and out of the toolbox context.
pub trait ClusterClient {
    /// Execute one administration command in the toolbox context and
    /// return its parsed output.
    fn run_toolbox_command(&self, command: &ToolboxCommand) -> RookResult<JsonData>;

    /// The live bucket hierarchy, as one entry per disjoint root.
    fn get_crush_tree(&self) -> RookResult<Vec<BucketNode>>;

    /// Full crushmap dump: flat bucket list plus rules.
    fn crush_dump(&self) -> RookResult<CrushDump>;

    /// Names of the existing crush rules.
    fn list_crush_rules(&self) -> RookResult<Vec<String>>;

    /// Full definition of the existing crush rules.
    fn dump_crush_rules(&self) -> RookResult<Vec<CrushRule>>;

    /// Export the live binary crushmap into a local file.
    fn crushmap_get(&self, bin_file: &Path) -> RookResult<()>;

    /// Load a local binary crushmap into the cluster.
    fn crushmap_set(&self, bin_file: &Path) -> RookResult<()>;

    /// Compile a local crushmap text file into its binary form.
    fn crushmap_compile(&self, txt_file: &Path, bin_file: &Path) -> RookResult<()>;

    /// Decompile a local binary crushmap into its text form.
    fn crushmap_decompile(&self, bin_file: &Path, txt_file: &Path) -> RookResult<()>;
}
