use serde_json::json;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn engine_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/engine.log")
}

/// Appends one JSON line to the engine log. Logging never fails a run, so
/// every I/O problem is swallowed here.
pub fn append_engine_log(
    state_root: &Path,
    now: i64,
    level: &str,
    event: &str,
    run_id: &str,
    message: &str,
) {
    let payload = json!({
        "timestamp": now,
        "level": level,
        "event": event,
        "run_id": run_id,
        "message": message,
    });
    let Ok(line) = serde_json::to_string(&payload) else {
        return;
    };

    let path = engine_log_path(state_root);
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = writeln!(file, "{line}");
}
