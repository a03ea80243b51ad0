//! Small parsing helpers shared by providers and the CLI

use std::time::Duration;

/// Parse a duration such as `"90m"`, `"2h"`, `"45s"` or `"1h30m"`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Duration must not be empty".to_string());
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in trimmed.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return Err(format!("Invalid duration '{}': unknown unit '{}'", input, c)),
        };
        if digits.is_empty() {
            return Err(format!("Invalid duration '{}': missing number before '{}'", input, c));
        }
        let amount: u64 = digits
            .parse()
            .map_err(|_| format!("Invalid duration '{}': number out of range", input))?;
        total = amount
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("Invalid duration '{}': number out of range", input))?;
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(format!("Invalid duration '{}': missing unit (h, m or s)", input));
    }

    Ok(Duration::from_secs(total))
}

/// Render a duration the way `parse_duration` accepts it
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        out.push_str(&format!("{}h", h));
    }
    if m > 0 {
        out.push_str(&format!("{}m", m));
    }
    if s > 0 {
        out.push_str(&format!("{}s", s));
    }
    out
}
