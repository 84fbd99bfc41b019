use anyhow::{Context, Result};
use std::time::Duration;

pub fn is_truthy(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    v == "1" || v == "true" || v == "yes" || v == "on"
}

pub fn parse_positive(name: &str, value: &str) -> Result<usize> {
    let n = value.trim().parse::<usize>().with_context(|| format!("{name}={value:?} is not an integer"))?;
    anyhow::ensure!(n > 0, "{name} must be positive, got {n}");
    Ok(n)
}

pub fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        for v in ["1", "true", "YES", " on "] {
            assert!(is_truthy(v), "{v}");
        }
        for v in ["0", "false", "", "nope"] {
            assert!(!is_truthy(v), "{v}");
        }
    }

    #[test]
    fn positive_integers() {
        assert_eq!(parse_positive("X", " 8 ").unwrap(), 8);
        assert!(parse_positive("X", "0").is_err());
        assert!(parse_positive("X", "-3").is_err());
        assert!(parse_positive("X", "many").is_err());
    }
}
