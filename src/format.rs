//! Byte size parsing and display.

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Parse a byte count with an optional binary suffix (`500`, `64K`, `10G`).
pub(crate) fn parse_size(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let split = input.find(|c: char| !c.is_ascii_digit()).unwrap_or(input.len());
    let (digits, suffix) = input.split_at(split);
    let value: u64 = digits.parse().map_err(|_| format!("`{input}` is not a size"))?;
    let shift = match suffix.trim().to_ascii_uppercase().trim_end_matches("IB").trim_end_matches('B') {
        "" => 0,
        "K" => 10,
        "M" => 20,
        "G" => 30,
        "T" => 40,
        _ => return Err(format!("unknown size suffix in `{input}`")),
    };
    value.checked_mul(1 << shift).ok_or_else(|| format!("`{input}` is too large"))
}

/// Human-readable byte count (`1.5 GiB`).
pub(crate) fn human_size(bytes: u64) -> String {
    if bytes == u64::MAX {
        return "unlimited".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    match unit {
        0 => format!("{bytes} B"),
        _ => format!("{value:.1} {}", UNITS[unit]),
    }
}
