use serde_json::error::Error as SerdeJsonError;
use std::error::Error as StdError;
use std::io;
use std::num::ParseIntError;
use std::fmt;
use std::string::FromUtf8Error;

/// Custom error handling for the library.
///
/// The tier variants are raised by precondition checks in
/// [`CrushHierarchyManager`](crate::crush::CrushHierarchyManager) before any
/// mutating command is sent to the cluster; `CommandFailure` covers every
/// remote command that exits non-zero or produces unparseable output.
#[derive(Debug)]
pub enum RookError {
    /// The destination root for a tier mirror is already present.
    TierAlreadyExists { tier: String },
    /// The named tier root is not present in the live CRUSH tree.
    TierNotFound { tier: String },
    /// The tier exists but may not be used this way, e.g. deleting or
    /// mirroring over the default tier.
    InvalidTierUse { tier: String, reason: String },
    RuleAlreadyExists { tier: String, rule: String },
    InvalidRuleOperation { rule: String, reason: String },
    /// The initial crushmap has not been applied to the cluster yet, so
    /// rule changes are refused.
    CrushMapNotApplied { reason: String },
    /// The recursion bound was hit while walking a CRUSH hierarchy,
    /// usually a sign of a malformed or cyclic tree.
    MaxRecursionExceeded { depth: u32 },
    /// Renaming a tier would collide with buckets that already exist.
    TierRenameConflict { tier: String, conflicts: Vec<String> },
    /// A toolbox command failed or its output could not be understood.
    CommandFailure(String),
    Error(String),
    Io(io::Error),
    FromUtf8(FromUtf8Error),
    ParseInt(ParseIntError),
    Serde(SerdeJsonError),
}

pub type RookResult<T> = Result<T, RookError>;

impl fmt::Display for RookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RookError::TierAlreadyExists { ref tier } => {
                write!(f, "storage tier '{}' already exists", tier)
            }
            RookError::TierNotFound { ref tier } => {
                write!(f, "storage tier '{}' does not exist", tier)
            }
            RookError::InvalidTierUse { ref tier, ref reason } => {
                write!(f, "storage tier '{}' cannot be used: {}", tier, reason)
            }
            RookError::RuleAlreadyExists { ref tier, ref rule } => {
                write!(f, "tier '{}' already has a crush rule '{}'", tier, rule)
            }
            RookError::InvalidRuleOperation { ref rule, ref reason } => {
                write!(f, "invalid operation on crush rule '{}': {}", rule, reason)
            }
            RookError::CrushMapNotApplied { ref reason } => {
                write!(f, "initial crushmap has not been applied: {}", reason)
            }
            RookError::MaxRecursionExceeded { depth } => {
                write!(f, "maximum crush hierarchy recursion exceeded: depth {}", depth)
            }
            RookError::TierRenameConflict { ref tier, ref conflicts } => write!(
                f,
                "cannot rename tier '{}', target buckets already exist: {}",
                tier,
                conflicts.join(", ")
            ),
            RookError::CommandFailure(ref e) => write!(f, "toolbox command failed: {}", e),
            RookError::Error(ref e) => write!(f, "{}", e),
            RookError::Io(ref e) => write!(f, "{}", e),
            RookError::FromUtf8(ref e) => write!(f, "{}", e),
            RookError::ParseInt(ref e) => write!(f, "{}", e),
            RookError::Serde(ref e) => write!(f, "{}", e),
        }
    }
}

impl StdError for RookError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            RookError::Io(ref e) => Some(e),
            RookError::FromUtf8(ref e) => Some(e),
            RookError::ParseInt(ref e) => Some(e),
            RookError::Serde(ref e) => Some(e),
            _ => None,
        }
    }
}

impl RookError {
    /// Create a new RookError with a String message
    pub fn new(err: String) -> RookError {
        RookError::Error(err)
    }
}

impl From<ParseIntError> for RookError {
    fn from(err: ParseIntError) -> RookError {
        RookError::ParseInt(err)
    }
}

impl From<SerdeJsonError> for RookError {
    fn from(err: SerdeJsonError) -> RookError {
        RookError::Serde(err)
    }
}

impl From<FromUtf8Error> for RookError {
    fn from(err: FromUtf8Error) -> RookError {
        RookError::FromUtf8(err)
    }
}

impl From<io::Error> for RookError {
    fn from(err: io::Error) -> RookError {
        RookError::Io(err)
    }
}
