//! Client library for administering a Ceph storage cluster that is managed
//! by Rook inside Kubernetes.
//!
//! Cluster commands are executed through the Rook toolbox pod: the
//! [`KubeOperator`](kube::KubeOperator) locates the toolbox by label and runs
//! each command with `kubectl exec`, parsing the `--format json` output into
//! the structs in [`cmd`]. [`RookCephClient`] layers typed wrappers over
//! that, and [`CrushHierarchyManager`](crush::CrushHierarchyManager) builds
//! on the [`ClusterClient`] trait to manage storage tiers: mirrored CRUSH
//! hierarchies with their own placement rules.
//!
//! ```rust,no_run
//! use rook_ceph::RookCephClient;
//! # use rook_ceph::error::RookResult;
//! # fn run() -> RookResult<()> {
//! let client = RookCephClient::new("rook-ceph");
//! let tree = client.osd_tree()?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate tracing;
#[macro_use]
extern crate serde_derive;

pub mod client;
pub mod cmd;
pub mod config;
pub mod crush;
pub mod error;
pub mod kube;
pub mod toolbox;

pub use crate::client::RookCephClient;
pub use crate::config::CrushConfig;
pub use crate::crush::{CrushHierarchyManager, ReplicateBy};
pub use crate::error::{RookError, RookResult};
pub use crate::toolbox::{ClusterClient, ToolboxCommand};

pub type JsonData = serde_json::Value;
