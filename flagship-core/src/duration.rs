//! Human-friendly duration parsing for configuration surfaces.

use std::time::Duration;

/// Parse a duration like `300ms`, `30s`, `5m`, `1h`, or a bare number of
/// seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let (number, unit) = match input.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => input.split_at(idx),
        None => (input, "s"),
    };

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration {input:?}"))?;
    if value < 0.0 {
        return Err(format!("negative duration {input:?}"));
    }

    let secs = match unit {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(format!("unknown duration unit {unit:?} in {input:?}")),
    };

    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_forms() {
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10fortnights").is_err());
    }
}
