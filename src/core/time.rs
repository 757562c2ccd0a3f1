//! C10: Session IDs and timestamp utilities.
//!
//! Mirrors the teacher's `get_local_timestamp` convention of centralizing
//! timestamp formatting so every persisted record uses the same format.

use chrono::Local;

/// `YYYYMMDD-HHMMSS` session label (§ GLOSSARY: Session ID).
pub fn generate_session_id() -> String {
    Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Session id with a short uuid suffix, for callers that may start more than
/// one cycle within the same second (invariant iv: "session IDs are unique
/// per orchestrator instance").
pub fn generate_session_id_unique() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", generate_session_id(), &suffix[..8])
}

/// Local timezone RFC3339 timestamp, used for human-facing fields (e.g.
/// notification embeds).
pub fn local_timestamp_rfc3339() -> String {
    Local::now().to_rfc3339()
}

/// Epoch milliseconds, used for `FileHistoryRecord::timestamp`.
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
