//! Parsing of the crawler's localized count strings.

/// Parses a display count such as `"10万+"`, `"2.1万"`, `"1.5千"`, `"3k"`,
/// `"1.2w"` or `"4834"` into an integer.
///
/// Rules:
/// - surrounding whitespace, thousands separators and a trailing `+` are
///   ignored;
/// - `万` / `w` multiply by 10 000, `千` / `k` by 1 000 (case-insensitive);
/// - an empty string is `0`.
///
/// Returns `None` for anything else, including negative values.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn parse_count(raw: &str) -> Option<i64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.strip_suffix('+').unwrap_or(&cleaned).trim_end();
    if cleaned.is_empty() {
        return Some(0);
    }

    let (number, multiplier) = split_unit(cleaned);
    if number.is_empty() || number.starts_with('-') {
        return None;
    }

    if multiplier == 1 {
        if let Ok(n) = number.parse::<i64>() {
            return Some(n);
        }
    }

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    let scaled = (value * f64::from(multiplier)).round();
    if scaled > i64::MAX as f64 {
        return None;
    }
    Some(scaled as i64)
}

fn split_unit(s: &str) -> (&str, u32) {
    let Some(last) = s.chars().last() else {
        return (s, 1);
    };
    let multiplier = match last {
        '万' | 'w' | 'W' => 10_000,
        '千' | 'k' | 'K' => 1_000,
        _ => return (s, 1),
    };
    (s[..s.len() - last.len_utf8()].trim_end(), multiplier)
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
