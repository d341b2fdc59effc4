use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Whether `KLENDATHU_TRACE` trace logging is turned on.
pub(crate) fn enabled() -> bool {
    matches!(
        std::env::var("KLENDATHU_TRACE").as_deref(),
        Ok("1") | Ok("true")
    )
}

fn trace_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".klendathu").join("trace.log"))
}

/// Append a line to `${HOME}/.klendathu/trace.log`. Write failures are
/// swallowed; trace output must never affect the request.
pub(crate) fn trace(message: impl AsRef<str>) {
    if !enabled() {
        return;
    }
    let Some(path) = trace_path() else {
        return;
    };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let epoch_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
        let _ = writeln!(file, "[{}] {}", epoch_secs, message.as_ref());
    }
}
