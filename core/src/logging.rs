use log::Level;
use serde_json::Value;

/// Emit one structured record under `module` as its log target.
///
/// The record reads `[code] message {data}` so deployment logs can be
/// grepped by code the same way errors are reported.
pub fn log_event(level: Level, code: Option<&str>, module: &str, message: &str, data: Option<Value>) {
    match (code, data) {
        (Some(code), Some(data)) => log::log!(target: module, level, "[{code}] {message} {data}"),
        (Some(code), None) => log::log!(target: module, level, "[{code}] {message}"),
        (None, Some(data)) => log::log!(target: module, level, "{message} {data}"),
        (None, None) => log::log!(target: module, level, "{message}"),
    }
}
