use regex::Regex;
use std::sync::LazyLock;

/// Lowest valid quality score.
pub const MIN_SCORE: f64 = 0.0;
/// Highest valid quality score.
pub const MAX_SCORE: f64 = 10.0;
/// Score assumed when the model's score cannot be parsed.
pub const UNPARSEABLE_SCORE: f64 = 0.0;

static FRACTION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(-?\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)$").ok());

/// Clamp a score into `[0, 10]`.
pub fn clamp_score(score: f64) -> f64 {
    score.clamp(MIN_SCORE, MAX_SCORE)
}

/// Interpret a score emitted by the model.
///
/// Numbers and numeric strings are clamped into `[0, 10]`; fractions such as
/// `"8/10"` or `"4/5"` are rescaled to the ten-point range. Anything else
/// (`"high"`, `"N/A"`, `null`) is unparseable and yields `None`.
pub fn normalize_score(raw: &serde_json::Value) -> Option<f64> {
    match raw {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(clamp_score),
        serde_json::Value::String(s) => parse_score_str(s),
        _ => None,
    }
}

/// String form of [`normalize_score`].
pub fn parse_score_str(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if let Ok(value) = text.parse::<f64>() {
        return value.is_finite().then(|| clamp_score(value));
    }

    let caps = FRACTION.as_ref()?.captures(text)?;
    let numerator: f64 = caps.get(1)?.as_str().parse().ok()?;
    let denominator: f64 = caps.get(2)?.as_str().parse().ok()?;
    if denominator <= 0.0 {
        return None;
    }
    Some(clamp_score(numerator / denominator * MAX_SCORE))
}

/// [`normalize_score`], with unparseable input mapped to [`UNPARSEABLE_SCORE`].
pub fn score_or_default(raw: &serde_json::Value) -> f64 {
    normalize_score(raw).unwrap_or(UNPARSEABLE_SCORE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fraction_is_rescaled() {
        assert_eq!(parse_score_str("8/10"), Some(8.0));
        assert_eq!(parse_score_str(" 4 / 5 "), Some(8.0));
        assert_eq!(parse_score_str("7.5/10"), Some(7.5));
        assert_eq!(parse_score_str("3/0"), None);
    }

    #[test]
    fn test_plain_numbers() {
        assert_eq!(parse_score_str("10"), Some(10.0));
        assert_eq!(normalize_score(&json!(6.25)), Some(6.25));
        assert_eq!(normalize_score(&json!(9)), Some(9.0));
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(parse_score_str("-1"), Some(0.0));
        assert_eq!(parse_score_str("11"), Some(10.0));
        assert_eq!(normalize_score(&json!(42)), Some(10.0));
        assert_eq!(parse_score_str("12/10"), Some(10.0));
    }

    #[test]
    fn test_unparseable_falls_back_to_zero() {
        for raw in [json!("high"), json!("N/A"), json!(null), json!(["8"]), json!("")] {
            assert_eq!(normalize_score(&raw), None, "{raw}");
            assert_eq!(score_or_default(&raw), 0.0);
        }
        assert_eq!(parse_score_str("NaN"), None);
        assert_eq!(parse_score_str("inf"), None);
    }
}
