//! Deterministic row hashing (spec.md §4.2, §9).
//!
//! The hash MUST be stable across processes and across implementations in
//! other languages, so it is defined entirely in terms of the canonical
//! string form of each payload value (see `crate::value::Value`) rather than
//! any language- or crate-specific `Hash` derive. `xxh3` is a 64-bit
//! non-cryptographic hash, already used for exactly this kind of stable
//! content hashing elsewhere in the ecosystem (e.g. `sql_saga`'s temporal
//! merge executor cache keys).

use crate::value::Row;
use xxhash_rust::xxh3::Xxh3;
use std::hash::Hasher;

/// Compute `row_hash_new` for a payload row. Primary-key columns must not be
/// included in `payload` — callers are responsible for separating them
/// (`Scd2TableConfig::payload_columns`).
pub fn row_hash(payload: &Row) -> u64 {
    let mut hasher = Xxh3::new();
    for (name, value) in &payload.0 {
        hasher.write(name.as_bytes());
        hasher.write_u8(0x1f); // unit separator between name and value
        hasher.write(value.canonical_string().as_bytes());
        hasher.write_u8(0x1e); // record separator between columns
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Row;

    #[test]
    fn hash_is_order_sensitive_but_deterministic() {
        let a = Row::new().push("name", "alice").push("status", "active");
        let b = Row::new().push("name", "alice").push("status", "active");
        assert_eq!(row_hash(&a), row_hash(&b));
    }

    #[test]
    fn hash_changes_with_payload() {
        let a = Row::new().push("name", "alice");
        let b = Row::new().push("name", "bob");
        assert_ne!(row_hash(&a), row_hash(&b));
    }

    #[test]
    fn numeric_canonicalization_avoids_spurious_changes() {
        let a = Row::new().push("rtt_ns", 1_500_000.0_f64);
        let b = Row::new().push("rtt_ns", 1_500_000_i64);
        assert_eq!(row_hash(&a), row_hash(&b));
    }
}
