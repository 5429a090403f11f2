//! Simulated-time formatting and parsing.

/// Format seconds as `{h}h{mm}m{ss}s`, truncating fractions.
///
/// Negative or non-finite input yields an empty string, which is also what the
/// report shows for an absent best value.
///
/// ```
/// use evacsim::utils::duration::format_duration;
///
/// assert_eq!(format_duration(21912.0), "6h05m12s");
/// assert_eq!(format_duration(59.9), "0h00m59s");
/// assert_eq!(format_duration(-5.0), "");
/// ```
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return String::new();
    }
    let total = seconds as u64;
    format!("{}h{:02}m{:02}s", total / 3600, (total % 3600) / 60, total % 60)
}

/// Format an optional time; `None` yields an empty string.
pub fn format_optional(seconds: Option<f64>) -> String {
    seconds.map(format_duration).unwrap_or_default()
}

const UNITS: &[(&[&str], u64)] = &[
    (&["hours", "hour", "hrs", "hr", "h"], 3600),
    (&["minutes", "minute", "mins", "min", "m"], 60),
    (&["seconds", "second", "secs", "sec", "s"], 1),
];

/// Parse a simulated time such as `"1800"`, `"30m"`, `"6h"` or `"6h05m12s"`
/// into seconds.
pub fn parse_sim_time(input: &str) -> Result<f64, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Empty time".to_string());
    }
    if let Ok(seconds) = input.parse::<f64>() {
        return if seconds.is_finite() && seconds >= 0.0 {
            Ok(seconds)
        } else {
            Err(format!("Invalid time: {}", input))
        };
    }

    let mut total = 0u64;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("Invalid time format: {}", input));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("Invalid time format: {}", input))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let factor = UNITS
            .iter()
            .find(|(names, _)| names.contains(&unit))
            .map(|(_, factor)| *factor)
            .ok_or_else(|| format!("Unknown time unit '{}' in {}", unit, input))?;
        total += value * factor;
        rest = &rest[unit_len..];
    }

    Ok(total as f64)
}
