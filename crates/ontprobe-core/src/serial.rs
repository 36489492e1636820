// ── Serial transform ──
//
// Logical (printed) serials of one vendor family begin with a four
// character ASCII prefix; the physical (PON) serial is the same string
// with that prefix spelled out as uppercase hex. Other families have no
// known formula and are reported as undeterminable.

use serde::{Deserialize, Serialize};

/// Two-letter vendor tags with a known logical/physical relation.
pub const KNOWN_FAMILY_TAGS: &[&str] = &["FH"];

const PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PhysicalSerial {
    Derived(String),
    Undeterminable,
}

impl PhysicalSerial {
    pub fn as_derived(&self) -> Option<&str> {
        match self {
            Self::Derived(s) => Some(s),
            Self::Undeterminable => None,
        }
    }
}

/// Uppercase two-digit hex for each byte of `s`.
pub fn ascii_to_hex(s: &str) -> String {
    s.bytes().map(|b| format!("{b:02X}")).collect()
}

/// Inverse of [`ascii_to_hex`]. `None` on odd length, bad digits, or
/// bytes outside ASCII.
pub fn hex_decode(hex: &str) -> Option<String> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    if !bytes.is_ascii() {
        return None;
    }
    String::from_utf8(bytes).ok()
}

fn known_prefix(logical: &str) -> Option<(&str, &str)> {
    if logical.len() < PREFIX_LEN || !logical.is_char_boundary(PREFIX_LEN) {
        return None;
    }
    let (prefix, rest) = logical.split_at(PREFIX_LEN);
    if !prefix.is_ascii() || !KNOWN_FAMILY_TAGS.iter().any(|t| prefix.starts_with(t)) {
        return None;
    }
    Some((prefix, rest))
}

/// Derive the physical serial from a logical one.
pub fn logical_to_physical(logical: &str) -> PhysicalSerial {
    match known_prefix(logical.trim()) {
        Some((prefix, rest)) => PhysicalSerial::Derived(format!("{}{rest}", ascii_to_hex(prefix))),
        None => PhysicalSerial::Undeterminable,
    }
}

/// Recover the logical serial from a physical one of a known family.
pub fn physical_to_logical(physical: &str) -> Option<String> {
    let physical = physical.trim();
    let split = PREFIX_LEN * 2;
    if physical.len() < split || !physical.is_char_boundary(split) {
        return None;
    }
    let (hex, rest) = physical.split_at(split);
    let prefix = hex_decode(hex)?;
    known_prefix(&format!("{prefix}{rest}")).map(|_| format!("{prefix}{rest}"))
}

/// `DDDD.DDDD.HHHH<rest>`: first two prefix characters as zero-padded
/// decimal code points, next two as hex.
pub fn physical_display_decimal(logical: &str) -> Option<String> {
    let (prefix, rest) = known_prefix(logical.trim())?;
    let b = prefix.as_bytes();
    Some(format!(
        "{:04}.{:04}.{:02X}{:02X}{rest}",
        b[0], b[1], b[2], b[3]
    ))
}
