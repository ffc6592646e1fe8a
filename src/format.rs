use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

pub const ANONYMOUS_NAME: &str = "Anonymous User";

pub const AVATAR_COLORS: [&str; 12] = [
    "#1877f2", "#42a5f5", "#42b883", "#ff6b6b", "#4ecdc4", "#45b7d1", "#96ceb4", "#feca57",
    "#ff9ff3", "#54a0ff", "#5f27cd", "#00d2d3",
];

const FALLBACK_COLOR_NAME: &str = "User";
const FALLBACK_INITIALS: &str = "U";

/// Renders an ISO-8601 timestamp as `YYYY-MM-DD HH:MM UTC`. Only UTC fields
/// are used, so the output never depends on the local timezone. Input that
/// does not parse is returned unchanged.
pub fn format_date(iso: &str) -> String {
    match parse_timestamp(iso) {
        Some(timestamp) => format_timestamp(&timestamp),
        None => iso.to_string(),
    }
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Picks one of the twelve avatar colors from the UTF-16 code unit of the
/// first character. Missing or empty names hash as "User".
pub fn avatar_color(name: Option<&str>) -> &'static str {
    let name = match name {
        Some(name) if !name.is_empty() => name,
        _ => FALLBACK_COLOR_NAME,
    };
    let code = name.encode_utf16().next().unwrap_or_default() as usize;
    AVATAR_COLORS[code % AVATAR_COLORS.len()]
}

/// First character of each space-separated word, uppercased, at most two
/// characters long.
pub fn initials(name: Option<&str>) -> String {
    let name = match name {
        Some(name) if !name.is_empty() => name,
        _ => return FALLBACK_INITIALS.to_string(),
    };
    name.split(' ')
        .filter_map(|word| word.chars().next())
        .collect::<String>()
        .to_uppercase()
        .chars()
        .take(2)
        .collect()
}

pub fn display_name(user_name: Option<&str>) -> &str {
    match user_name {
        Some(name) if !name.is_empty() => name,
        _ => ANONYMOUS_NAME,
    }
}

/// Parses a `#rrggbb` palette entry into its components.
pub fn hex_rgb(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_date_uses_utc_fields() {
        assert_eq!(
            format_date("2024-01-05T03:07:00.000Z"),
            "2024-01-05 03:07 UTC"
        );
        assert_eq!(
            format_date("2024-01-05T01:07:00+09:30"),
            "2024-01-04 15:37 UTC"
        );
        assert_eq!(
            format_date("2024-03-10T23:59:59.999999"),
            "2024-03-10 23:59 UTC"
        );
    }

    #[test]
    fn format_date_passes_through_garbage() {
        assert_eq!(format_date("yesterday"), "yesterday");
    }

    #[test]
    fn avatar_color_is_total_and_deterministic() {
        let names = [
            None,
            Some(""),
            Some("John Doe"),
            Some("john"),
            Some("Ünal"),
            Some("🦀 crab"),
            Some(" "),
        ];
        for name in names {
            let color = avatar_color(name);
            assert!(AVATAR_COLORS.contains(&color));
            assert_eq!(color, avatar_color(name));
        }
        assert_eq!(avatar_color(None), avatar_color(Some("User")));
        assert_eq!(avatar_color(Some("")), avatar_color(Some("Uma")));
        // 'J' is 74, 74 % 12 == 2
        assert_eq!(avatar_color(Some("John Doe")), "#42b883");
    }

    #[test]
    fn initials_match_expected_cases() {
        assert_eq!(initials(Some("John Doe")), "JD");
        assert_eq!(initials(Some("")), "U");
        assert_eq!(initials(None), "U");
        assert_eq!(initials(Some("Madonna")), "M");
        assert_eq!(initials(Some("mary jane watson")), "MJ");
    }

    #[test]
    fn display_name_falls_back_to_anonymous() {
        assert_eq!(display_name(None), ANONYMOUS_NAME);
        assert_eq!(display_name(Some("")), ANONYMOUS_NAME);
        assert_eq!(display_name(Some("Ada")), "Ada");
    }

    #[test]
    fn palette_entries_parse() {
        for color in AVATAR_COLORS {
            assert!(hex_rgb(color).is_some());
        }
        assert_eq!(hex_rgb("#1877f2"), Some((0x18, 0x77, 0xf2)));
        assert_eq!(hex_rgb("1877f2"), None);
    }
}
