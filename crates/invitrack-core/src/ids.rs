//! Platform identifiers.
//!
//! Communities and members are identified by the platform's 64-bit
//! snowflakes. Newtypes keep a community ID from ever being passed where a
//! member ID is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single managed community (server/guild) tracked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunityId(pub u64);

/// A platform user. Invitees and inviters are both members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub u64);

impl CommunityId {
    /// Raw snowflake value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl MemberId {
    /// Raw snowflake value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for CommunityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<u64> for MemberId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_raw_snowflake() {
        assert_eq!(CommunityId(1_353_730_040_839_274_631).to_string(), "1353730040839274631");
        assert_eq!(MemberId(7).to_string(), "7");
    }

    #[test]
    fn ordering_follows_snowflake() {
        assert!(MemberId(1) < MemberId(2));
        assert!(CommunityId(u64::MAX) > CommunityId(0));
    }
}
