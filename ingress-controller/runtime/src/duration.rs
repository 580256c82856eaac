use anyhow::{bail, Context, Result};
use tokio::time;

const UNITS: [(&str, u64); 4] = [("ms", 1), ("s", 1_000), ("m", 60_000), ("h", 3_600_000)];

/// Parses a non-zero interval like `500ms`, `5s`, `1m` or `2h`.
///
/// Every interval the controller takes drives a wait, a poll or a deadline, so a zero value is
/// rejected rather than treated as "no wait".
pub fn parse_interval(s: &str) -> Result<time::Duration> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .with_context(|| format!("interval {s:?} has no unit"))?;
    let (magnitude, unit) = s.split_at(split);
    if magnitude.is_empty() {
        bail!("interval {s:?} has no magnitude");
    }
    let Some(&(_, ms_per_unit)) = UNITS.iter().find(|(u, _)| *u == unit) else {
        bail!("invalid interval unit {unit:?} (expected one of 'ms', 's', 'm', or 'h')");
    };

    let ms = magnitude
        .parse::<u64>()
        .ok()
        .and_then(|m| m.checked_mul(ms_per_unit))
        .with_context(|| format!("interval {s:?} is too large"))?;
    if ms == 0 {
        bail!("interval must be greater than zero");
    }
    Ok(time::Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::parse_interval;
    use tokio::time;

    #[test]
    fn accepts_units() {
        assert_eq!(
            parse_interval("500ms").unwrap(),
            time::Duration::from_millis(500)
        );
        assert_eq!(parse_interval("5s").unwrap(), time::Duration::from_secs(5));
        assert_eq!(parse_interval(" 1m ").unwrap(), time::Duration::from_secs(60));
        assert_eq!(
            parse_interval("2h").unwrap(),
            time::Duration::from_secs(7200)
        );
    }

    #[test]
    fn rejects_zero() {
        for zero in ["0", "0s", "0ms", "000m"] {
            assert!(parse_interval(zero).is_err(), "{zero}");
        }
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["120", "s", "5 s", "5x", "1.5s", "1d", "-5s"] {
            assert!(parse_interval(bad).is_err(), "{bad}");
        }
        assert!(parse_interval("18446744073709551615s").is_err());
    }
}
