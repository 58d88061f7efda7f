//! Role ordering and the minimum-role rules derived from it.
//!
//! Roles form a total order compared with `>=`: any larger role implies every
//! capability of the smaller ones. The rules here are derived per operation,
//! never stored — a role is re-resolved on each check so authorization stays
//! live against role changes.

use std::fmt;

use crate::protocol::SubEdit;

/// Reserved first path segment marking structural/metadata state. Edits under
/// it require ownership; everything else is ordinary document data.
pub const META_KEY: &str = "__meta__";

/// Authorization level for one identity on one document, ascending authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Role {
    None = 0,
    Reader = 1,
    Writer = 2,
    Owner = 3,
}

impl Role {
    /// Numeric wire representation.
    pub fn level(self) -> u8 {
        self as u8
    }

    /// Parse the numeric wire representation back into a role.
    pub fn from_level(level: u64) -> Option<Role> {
        match level {
            0 => Some(Role::None),
            1 => Some(Role::Reader),
            2 => Some(Role::Writer),
            3 => Some(Role::Owner),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::None => "none",
            Role::Reader => "reader",
            Role::Writer => "writer",
            Role::Owner => "owner",
        };
        write!(f, "{}", name)
    }
}

/// Minimum role required to commit a batch of sub-edits.
///
/// A single meta-path sub-edit elevates the requirement for the entire batch:
/// the decision is all-or-nothing, never per-edit.
pub fn required_for_edits(edits: &[SubEdit]) -> Role {
    if edits.iter().any(|edit| edit.path.is_meta()) {
        Role::Owner
    } else {
        Role::Writer
    }
}
