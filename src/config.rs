use std::path::PathBuf;
use std::time::Duration;

/// Suffix appended to a tier name to form its CRUSH root bucket name.
pub const CRUSH_TIER_SUFFIX: &str = "-tier";

/// Safeguard for the recursive hierarchy walks. The expected nesting is
/// root -> chassis -> host -> osd; anything deeper than this is treated as a
/// malformed or cyclic tree.
pub const CRUSH_MAP_DEPTH: u32 = 3;

/// Immutable configuration handed to [`CrushHierarchyManager`] at
/// construction.
///
/// [`CrushHierarchyManager`]: crate::crush::CrushHierarchyManager
#[derive(Clone, Debug)]
pub struct CrushConfig {
    /// Name of the always-present default tier. Its root bucket and rule
    /// are never renamed, mirrored over or deleted.
    pub default_tier: String,
    /// Sentinel file whose presence signals that the initial crushmap has
    /// been applied. Rule add/delete are refused until it exists.
    pub crushmap_applied_flag: PathBuf,
    /// Directory for the temporary files used while recompiling the
    /// crushmap.
    pub workdir: PathBuf,
    /// Maximum recursion depth for hierarchy walks.
    pub max_depth: u32,
    /// Timeout applied to every toolbox command issued by the manager.
    pub timeout: Option<Duration>,
}

impl Default for CrushConfig {
    fn default() -> CrushConfig {
        CrushConfig {
            default_tier: "storage".to_string(),
            crushmap_applied_flag: PathBuf::from("/etc/rook/.crushmap_applied"),
            workdir: PathBuf::from("/tmp"),
            max_depth: CRUSH_MAP_DEPTH,
            timeout: None,
        }
    }
}

impl CrushConfig {
    pub fn new<T: Into<String>>(default_tier: T) -> CrushConfig {
        CrushConfig {
            default_tier: default_tier.into(),
            ..CrushConfig::default()
        }
    }
}
