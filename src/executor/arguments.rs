use crate::planner::{DRIVE_UPLOAD, VIDEO_CONVERT, YANDEX_DISK_UPLOAD, YOUTUBE_DOWNLOAD};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    YoutubeDownload,
    DriveUpload,
    YandexDiskUpload,
    VideoConvert,
    Unsupported,
}

impl CapabilityKind {
    pub fn from_capability(capability: &str) -> Self {
        match capability {
            YOUTUBE_DOWNLOAD => CapabilityKind::YoutubeDownload,
            DRIVE_UPLOAD => CapabilityKind::DriveUpload,
            YANDEX_DISK_UPLOAD => CapabilityKind::YandexDiskUpload,
            VIDEO_CONVERT => CapabilityKind::VideoConvert,
            _ => CapabilityKind::Unsupported,
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn required(inputs: &Map<String, Value>, key: &str) -> Result<String, String> {
    inputs
        .get(key)
        .and_then(scalar)
        .ok_or_else(|| format!("missing required argument `{key}`"))
}

fn push_optional(args: &mut Vec<String>, inputs: &Map<String, Value>, key: &str, flag: &str) {
    if let Some(value) = inputs.get(key).and_then(scalar) {
        args.push(flag.to_string());
        args.push(value);
    }
}

fn truthy(inputs: &Map<String, Value>, key: &str) -> bool {
    match inputs.get(key) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => matches!(text.as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

pub fn build_arguments(
    kind: CapabilityKind,
    capability: &str,
    inputs: &Map<String, Value>,
) -> Result<Vec<String>, String> {
    let mut args = Vec::new();
    match kind {
        CapabilityKind::YoutubeDownload => {
            args.push(required(inputs, "url")?);
            push_optional(&mut args, inputs, "min_height", "--min-height");
            push_optional(&mut args, inputs, "quality_policy", "--quality-policy");
            push_optional(&mut args, inputs, "cookies_from_browser", "--cookies-from-browser");
        }
        CapabilityKind::DriveUpload => {
            args.extend(["--file-path".to_string(), required(inputs, "file_path")?]);
            args.extend(["--folder-id".to_string(), required(inputs, "folder_id")?]);
            push_optional(&mut args, inputs, "name", "--name");
            push_optional(&mut args, inputs, "mime_type", "--mime-type");
            args.push("--json".to_string());
        }
        CapabilityKind::YandexDiskUpload => {
            args.extend(["--file-path".to_string(), required(inputs, "file_path")?]);
            args.extend(["--folder-path".to_string(), required(inputs, "folder_path")?]);
            if truthy(inputs, "overwrite") {
                args.push("--overwrite".to_string());
            }
        }
        CapabilityKind::VideoConvert => {
            let mode = required(inputs, "mode")?;
            if mode != "all" && mode != "selected" {
                return Err(format!("`mode` must be `all` or `selected`, got `{mode}`"));
            }
            let files: Vec<String> = match inputs.get("files") {
                Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
                Some(value) => scalar(value).into_iter().collect(),
                None => Vec::new(),
            };
            if mode == "selected" && files.is_empty() {
                return Err("mode `selected` requires at least one file".to_string());
            }
            args.extend(["--mode".to_string(), mode]);
            for file in files {
                args.extend(["--file".to_string(), file]);
            }
            push_optional(&mut args, inputs, "input_dir", "--input-dir");
            push_optional(&mut args, inputs, "output_dir", "--output-dir");
            push_optional(&mut args, inputs, "jobs", "--jobs");
        }
        CapabilityKind::Unsupported => {
            return Err(format!("unsupported capability `{capability}`"));
        }
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn drive_arguments_use_flags_and_json_switch() {
        let args = build_arguments(
            CapabilityKind::DriveUpload,
            "drive.upload",
            &map(json!({"file_path": "/tmp/a.mp4", "folder_id": "F1", "name": "a.mp4"})),
        )
        .expect("args");
        assert_eq!(
            args,
            vec!["--file-path", "/tmp/a.mp4", "--folder-id", "F1", "--name", "a.mp4", "--json"]
        );
    }

    #[test]
    fn conversion_repeats_file_flag() {
        let args = build_arguments(
            CapabilityKind::VideoConvert,
            "video.convert",
            &map(json!({"mode": "selected", "files": ["a.webm", "b.webm"], "jobs": 2})),
        )
        .expect("args");
        assert_eq!(
            args,
            vec!["--mode", "selected", "--file", "a.webm", "--file", "b.webm", "--jobs", "2"]
        );
    }

    #[test]
    fn missing_and_unsupported_arguments_fail() {
        let err = build_arguments(
            CapabilityKind::YandexDiskUpload,
            "yandex.disk.upload",
            &map(json!({"file_path": "/tmp/a.mp4"})),
        )
        .expect_err("missing folder");
        assert!(err.contains("folder_path"));

        let err = build_arguments(CapabilityKind::Unsupported, "pdf.merge", &Map::new())
            .expect_err("unsupported");
        assert!(err.contains("pdf.merge"));
    }
}
