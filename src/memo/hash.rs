//! Source Hash Module
//!
//! Short textual identities for functions and cache-key namespaces.

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Collapses runs of whitespace to single spaces and trims the ends.
pub fn normalize_source(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hashes whitespace-normalized text into a short base-36 identity.
///
/// Rolling `hash * 33 ^ unit` over UTF-16 code units, seeded with 5381 and kept
/// in 32-bit signed arithmetic; the magnitude is rendered in base 36.
///
/// # Example
/// ```
/// use mini_memo::memo::source_hash;
///
/// assert_eq!(source_hash("a"), source_hash("  a \n"));
/// ```
pub fn source_hash(text: &str) -> String {
    let normalized = normalize_source(text);
    let mut hash: i32 = 5381;
    for unit in normalized.encode_utf16() {
        hash = hash.wrapping_mul(33) ^ i32::from(unit);
    }
    to_base36((hash as i64).unsigned_abs())
}

/// Default cache key for a function type.
///
/// Closures defined in the same function share a type name, so the name hash
/// is suffixed with a hash of the `TypeId`. `TypeId`s are only stable within
/// one build: a rebuilt binary misses entries persisted by an older one.
pub(crate) fn type_key<F: 'static>() -> String {
    let mut hasher = DefaultHasher::new();
    TypeId::of::<F>().hash(&mut hasher);
    format!(
        "{}{}",
        source_hash(std::any::type_name::<F>()),
        to_base36(hasher.finish())
    )
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
