//! Operation classification for computed deltas.

use serde::{Deserialize, Serialize};

/// Classification of a delta.
///
/// The declaration order is the order in which the executor processes
/// change groups during a real run: destructive actions run last.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// The target does not exist yet and must be created.
    Create,
    /// The target exists and differs from the desired state.
    Update,
    /// The target exists and must be removed.
    Delete,
    /// The target already matches the desired state.
    None,
    /// The target is deliberately left out of reconciliation.
    ///
    /// Ignored resources are filtered out before changes are computed, so
    /// no computed change carries it. Executors group it last.
    Ignore,
}

impl Operation {
    /// All operations, in execution order.
    pub const ALL: [Self; 5] = [
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::None,
        Self::Ignore,
    ];

    /// Derives the operation of a before/after pair.
    ///
    /// Equality goes through [`values_equal`](super::values_equal), so a
    /// value and its string form are considered unchanged.
    #[must_use]
    pub fn of(before: Option<&serde_json::Value>, after: Option<&serde_json::Value>) -> Self {
        match (before, after) {
            (None, Some(_)) => Self::Create,
            (Some(_), None) => Self::Delete,
            (None, None) => Self::None,
            (Some(b), Some(a)) if super::values_equal(b, a) => Self::None,
            (Some(_), Some(_)) => Self::Update,
        }
    }

    /// Returns true if this operation alters the managed system.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::None => "NONE",
            Self::Ignore => "IGNORE",
        };
        write!(f, "{s}")
    }
}
