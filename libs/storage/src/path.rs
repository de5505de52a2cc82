use chrono::{DateTime, Datelike, Utc};

/// Storage path of a recording: `{live_id}/{year}/{month}/{day}/{filename}`
pub fn generate_path(live_id: &str, started_at: DateTime<Utc>, filename: &str) -> String {
    format!(
        "{}/{:04}/{:02}/{:02}/{}",
        sanitize(live_id),
        started_at.year_ce().1,
        started_at.month(),
        started_at.day(),
        filename
    )
}

/// Validate storage path format
pub fn validate_path(path: &str) -> bool {
    !path.is_empty() && !path.contains("..") && !path.starts_with('/')
}

fn sanitize(segment: &str) -> String {
    let s: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.is_empty() { "_".to_string() } else { s }
}
