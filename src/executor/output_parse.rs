use super::arguments::CapabilityKind;
use serde_json::{Map, Value};

const SAVED_MARKER: &str = "Saved:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OutputError {
    Unparseable(String),
    NotAnObject(String),
}

fn parse_object(text: &str) -> Option<Result<Map<String, Value>, OutputError>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Object(map) => Some(Ok(map)),
        other => Some(Err(OutputError::NotAnObject(format!(
            "expected a json object, got {}",
            crate::schema::json_type_name(&other)
        )))),
    }
}

pub(crate) fn parse_tool_output(
    kind: CapabilityKind,
    stdout: &str,
) -> Result<Map<String, Value>, OutputError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(OutputError::Unparseable("tool printed nothing".to_string()));
    }
    if let Some(parsed) = parse_object(trimmed) {
        return parsed;
    }
    let last_line = trimmed.lines().rev().find(|line| !line.trim().is_empty());
    if let Some(parsed) = last_line.and_then(|line| parse_object(line.trim())) {
        return parsed;
    }

    if kind == CapabilityKind::YoutubeDownload {
        let saved = trimmed
            .lines()
            .rev()
            .filter_map(|line| line.trim().strip_prefix(SAVED_MARKER))
            .map(str::trim)
            .find(|path| !path.is_empty());
        if let Some(path) = saved {
            let mut outputs = Map::new();
            outputs.insert("file_path".to_string(), Value::String(path.to_string()));
            return Ok(outputs);
        }
    }

    Err(OutputError::Unparseable(
        "stdout is neither a json object nor a known marker line".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_after_progress_lines_is_accepted() {
        let outputs = parse_tool_output(
            CapabilityKind::DriveUpload,
            "uploading 10%\nuploading 100%\n{\"file_id\": \"abc\"}\n",
        )
        .expect("outputs");
        assert_eq!(Value::Object(outputs), json!({"file_id": "abc"}));
    }

    #[test]
    fn saved_marker_only_applies_to_downloads() {
        let stdout = "[download] 100%\nSaved: /tmp/out/video.mp4\n";
        let outputs = parse_tool_output(CapabilityKind::YoutubeDownload, stdout).expect("outputs");
        assert_eq!(Value::Object(outputs), json!({"file_path": "/tmp/out/video.mp4"}));

        assert!(matches!(
            parse_tool_output(CapabilityKind::DriveUpload, stdout),
            Err(OutputError::Unparseable(_))
        ));
    }

    #[test]
    fn json_array_is_not_an_object() {
        assert!(matches!(
            parse_tool_output(CapabilityKind::VideoConvert, "[1, 2]"),
            Err(OutputError::NotAnObject(_))
        ));
    }
}
