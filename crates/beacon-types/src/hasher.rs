//! Deterministic 32-bit fingerprints for messages, content objects, rules,
//! feeds and source values.
//!
//! Every identity in the cache is derived from an ordered tuple of strings.
//! The parts are concatenated without a separator, encoded as ASCII (any
//! non-ASCII UTF-16 unit becomes `?`), folded with FNV-1a and finally mixed.
//! Collisions are accepted; nothing downstream enforces uniqueness beyond
//! the hash itself.

const OFFSET_BASIS: u32 = 2_166_136_261;
const PRIME: i32 = 16_777_619;

/// The source id/value pair that matches every message.
pub const WILDCARD: &str = "*";

pub fn hash<S: AsRef<str>>(parts: &[S]) -> i32 {
    let mut h = OFFSET_BASIS as i32;
    for part in parts {
        for byte in ascii_bytes(part.as_ref()) {
            h = (h ^ byte as i32).wrapping_mul(PRIME);
        }
    }

    h = h.wrapping_add(h.wrapping_shl(13));
    h ^= h >> 7;
    h = h.wrapping_add(h.wrapping_shl(3));
    h ^= h >> 17;
    h.wrapping_add(h.wrapping_shl(5))
}

fn ascii_bytes(s: &str) -> impl Iterator<Item = u8> + '_ {
    s.chars().flat_map(|c| {
        let (byte, units) = if c.is_ascii() { (c as u8, 1) } else { (b'?', c.len_utf16()) };
        std::iter::repeat_n(byte, units)
    })
}

// -- Derived identities --

pub fn message_id(sender_id: &str, distribution_id: &str) -> i32 {
    hash(&[sender_id, distribution_id])
}

pub fn content_id(sender_id: &str, distribution_id: &str, description: &str) -> i32 {
    hash(&[sender_id, distribution_id, description])
}

/// Rule ids and source-keyed feed ids share the same derivation.
pub fn rule_id(source_id: &str, source_value: &str) -> i32 {
    hash(&[source_id, source_value])
}

pub fn feed_id(source_id: &str, source_value: &str) -> i32 {
    rule_id(source_id, source_value)
}

pub fn wildcard_rule_id() -> i32 {
    rule_id(WILDCARD, WILDCARD)
}

pub fn source_list_id(list_id: &str) -> i32 {
    hash(&[list_id])
}

pub fn source_value_id(list_id: &str, value: &str) -> i32 {
    hash(&[list_id, value])
}
