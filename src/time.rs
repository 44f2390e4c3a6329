use chrono::{DateTime, Local, Utc};

pub const RECORD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn to_date(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// "Record Time" column text, in the machine's local zone.
pub fn format_record_time(ms: i64) -> String {
    to_date(ms)
        .with_timezone(&Local)
        .format(RECORD_TIME_FORMAT)
        .to_string()
}
