use chrono::{DateTime, SecondsFormat, Utc};

/// Artifact name for a run started at `now`: `backup-<timestamp>.sql`.
///
/// The timestamp is ISO-8601 UTC with millisecond precision, with `:` and `.`
/// replaced by `-` so it is safe as a file name and object key.
pub fn artifact_name(now: DateTime<Utc>) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("backup-{stamp}.sql")
}
