//! Identifier and display helpers

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique record id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Formats a receipt number for display, e.g. `YB25-007`.
pub fn format_receipt_id(prefix: &str, number: u32) -> String {
    format!("{}-{:03}", prefix, number)
}

/// Zero-padded numeric part of the display id, as printed after the prefix on the template.
pub fn receipt_suffix(number: u32) -> String {
    format!("{:03}", number)
}

/// Pulls the first run of ASCII digits out of free text, e.g. `"YB25-042"` gives 25.
///
/// A run too large for a receipt number yields `None`.
pub fn extract_receipt_number(input: &str) -> Option<u32> {
    let start = input.find(|c: char| c.is_ascii_digit())?;
    let rest = &input[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());

    rest[..end].parse().ok()
}
