//! Change event types

use crate::core::EntityRef;
use serde::{Deserialize, Serialize};

// ============================================================================
// ChangeKind
// ============================================================================

/// Tag of a [`ChangeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Changed,
    Removing,
    Init,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Changed => write!(f, "changed"),
            Self::Removing => write!(f, "removing"),
            Self::Init => write!(f, "init"),
        }
    }
}

// ============================================================================
// ChangeEvent
// ============================================================================

/// Lifecycle transition of one entity.
///
/// The payload follows the tag: `Removing` has no `curr`, `Added` and `Init`
/// have no `prev`, `Changed` has both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    Added { curr: EntityRef },
    Changed { curr: EntityRef, prev: EntityRef },
    Removing { prev: EntityRef },
    Init { curr: EntityRef },
}

impl ChangeEvent {
    pub fn added(curr: EntityRef) -> Self {
        Self::Added { curr }
    }

    pub fn changed(curr: EntityRef, prev: EntityRef) -> Self {
        Self::Changed { curr, prev }
    }

    pub fn removing(prev: EntityRef) -> Self {
        Self::Removing { prev }
    }

    pub fn init(curr: EntityRef) -> Self {
        Self::Init { curr }
    }

    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Added { .. } => ChangeKind::Added,
            Self::Changed { .. } => ChangeKind::Changed,
            Self::Removing { .. } => ChangeKind::Removing,
            Self::Init { .. } => ChangeKind::Init,
        }
    }

    /// New entity (absent for `Removing`)
    pub fn curr(&self) -> Option<&EntityRef> {
        match self {
            Self::Added { curr } | Self::Changed { curr, .. } | Self::Init { curr } => Some(curr),
            Self::Removing { .. } => None,
        }
    }

    /// Old entity (present for `Changed` and `Removing`)
    pub fn prev(&self) -> Option<&EntityRef> {
        match self {
            Self::Changed { prev, .. } | Self::Removing { prev } => Some(prev),
            Self::Added { .. } | Self::Init { .. } => None,
        }
    }

    /// Id of the entity this event is about
    pub fn id(&self) -> &str {
        match self {
            Self::Added { curr } | Self::Changed { curr, .. } | Self::Init { curr } => &curr.id,
            Self::Removing { prev } => &prev.id,
        }
    }

    pub fn is_removing(&self) -> bool {
        matches!(self, Self::Removing { .. })
    }
}

impl std::fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}
