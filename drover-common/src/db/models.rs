//! Database row models
//!
//! Guids are stored as hyphenated TEXT; callers parse them where a typed
//! `Uuid` is needed.

use serde::{Deserialize, Serialize};

/// A legacy order row as read from the `orders` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub guid: String,
    pub tenant_guid: String,
    pub raw_address: Option<String>,
    pub canonical_address_guid: Option<String>,
    pub address_country: Option<String>,
    pub address_snapshot: Option<String>,
    pub address_status: Option<String>,
}

impl Order {
    /// True when the order qualifies for migration: no canonical link yet and
    /// a non-blank raw address
    pub fn is_migration_candidate(&self) -> bool {
        self.canonical_address_guid.is_none()
            && self
                .raw_address
                .as_deref()
                .map(|s| !s.trim().is_empty())
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(raw: Option<&str>, linked: bool) -> Order {
        Order {
            guid: "o1".to_string(),
            tenant_guid: "t1".to_string(),
            raw_address: raw.map(String::from),
            canonical_address_guid: linked.then(|| "a1".to_string()),
            address_country: None,
            address_snapshot: None,
            address_status: None,
        }
    }

    #[test]
    fn candidate_requires_unlinked_and_nonblank() {
        assert!(order(Some("123 Main St"), false).is_migration_candidate());
        assert!(!order(Some("123 Main St"), true).is_migration_candidate());
        assert!(!order(Some("   "), false).is_migration_candidate());
        assert!(!order(None, false).is_migration_candidate());
    }
}
