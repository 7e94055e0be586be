//! The per-property status lattice.
//!
//! `Remote` carries its own expiry instant rather than living in a side
//! table, so a `PropertyEntry`'s status alone is enough to answer
//! `is_valid`/`is_local`/`expiry` without consulting the registry.

use crate::clock::Instant;

/// Where a property's current value came from, and whether it's still good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyStatus {
    /// Nothing assigned or received yet.
    NoData,
    /// Last set on this node; will be broadcast.
    Local,
    /// Last received from another node; valid until `expiry`.
    Remote(Instant),
    /// A `Remote` value whose expiry has passed.
    Expired,
    /// The last receive on this id failed to decode.
    Error,
}

impl PropertyStatus {
    /// A property is valid to read exactly when it holds a `Local` write
    /// or an unexpired `Remote` value.
    pub fn is_valid(self) -> bool {
        matches!(self, PropertyStatus::Local | PropertyStatus::Remote(_))
    }

    /// `None` for `Remote`/`Expired`/`Error`, the rest are locally owned.
    pub fn is_local(self) -> Option<bool> {
        match self {
            PropertyStatus::NoData | PropertyStatus::Local => Some(true),
            PropertyStatus::Remote(_) => Some(false),
            PropertyStatus::Expired | PropertyStatus::Error => Some(false),
        }
    }

    pub fn expiry(self) -> Option<Instant> {
        match self {
            PropertyStatus::Remote(instant) => Some(instant),
            _ => None,
        }
    }
}

impl std::fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            PropertyStatus::NoData => "NO DATA",
            PropertyStatus::Local => "LOCAL",
            PropertyStatus::Remote(_) => "REMOTE",
            PropertyStatus::Expired => "REMOTE/EXPIRED",
            PropertyStatus::Error => "REMOTE/ERROR",
        };
        f.write_str(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_matches_lattice() {
        assert!(!PropertyStatus::NoData.is_valid());
        assert!(PropertyStatus::Local.is_valid());
        assert!(PropertyStatus::Remote(Instant::from_millis(0)).is_valid());
        assert!(!PropertyStatus::Expired.is_valid());
        assert!(!PropertyStatus::Error.is_valid());
    }

    #[test]
    fn only_remote_has_an_expiry() {
        assert_eq!(PropertyStatus::NoData.expiry(), None);
        assert_eq!(
            PropertyStatus::Remote(Instant::from_millis(5)).expiry(),
            Some(Instant::from_millis(5))
        );
    }
}
