//! Address canonicalization
//!
//! Derives the content hash used as the deduplication key: SHA-256 over the
//! normalized (country code, postal code, street, house number) tuple, joined
//! with a unit separator so adjacent fields can never bleed into each other.
//! The digest is opaque; it is only ever compared for equality and indexed.

use crate::resolver::ResolvedAddress;
use sha2::{Digest, Sha256};

/// Field separator inside the hash preimage (ASCII unit separator)
const FIELD_SEPARATOR: u8 = 0x1f;

/// Compute the content hash for a resolved address (hex-encoded SHA-256)
///
/// Pure and deterministic: two structurally-equivalent addresses yield the
/// same hash regardless of formatting differences in the free-text input,
/// because only the normalized component tuple feeds the digest.
pub fn content_hash(address: &ResolvedAddress) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(&address.country_code).to_uppercase());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(normalize(&address.postal_code));
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(normalize(&address.street));
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(normalize(&address.house_number));
    format!("{:x}", hasher.finalize())
}

/// Trim, collapse internal whitespace, and case-fold one component
fn normalize(field: &str) -> String {
    field
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Precision;

    fn address(country: &str, postal: &str, street: &str, number: &str) -> ResolvedAddress {
        ResolvedAddress {
            formatted: format!("{} {}, {}", number, street, postal),
            street: street.to_string(),
            house_number: number.to_string(),
            city: "New York".to_string(),
            postal_code: postal.to_string(),
            country_code: country.to_string(),
            latitude: 40.7506,
            longitude: -73.9972,
            precision: Precision::Rooftop,
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let a = address("US", "10001", "Main St", "123");
        assert_eq!(content_hash(&a), content_hash(&a.clone()));
    }

    #[test]
    fn hash_is_fixed_width_hex() {
        let digest = content_hash(&address("US", "10001", "Main St", "123"));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn formatting_differences_do_not_change_hash() {
        let a = address("US", "10001", "Main St", "123");
        let b = address("us", " 10001 ", "main   st", "123 ");
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn non_hashed_fields_do_not_change_hash() {
        let a = address("US", "10001", "Main St", "123");
        let mut b = a.clone();
        b.formatted = "somewhere else entirely".to_string();
        b.city = "Brooklyn".to_string();
        b.latitude = 0.0;
        b.longitude = 0.0;
        b.precision = Precision::Locality;
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn each_component_changes_hash() {
        let base = address("US", "10001", "Main St", "123");
        let variants = [
            address("DE", "10001", "Main St", "123"),
            address("US", "10002", "Main St", "123"),
            address("US", "10001", "Elm St", "123"),
            address("US", "10001", "Main St", "124"),
        ];
        for variant in &variants {
            assert_ne!(content_hash(&base), content_hash(variant));
        }
    }

    #[test]
    fn separator_prevents_field_bleed() {
        // ("ab", "c") vs ("a", "bc") must not collide
        let a = address("US", "10001", "Main", "ab c");
        let b = address("US", "10001", "Main", "a bc");
        assert_ne!(content_hash(&a), content_hash(&b));

        let c = address("US", "100", "1 Main St", "5");
        let d = address("US", "1001", "Main St", "5");
        assert_ne!(content_hash(&c), content_hash(&d));
    }
}
