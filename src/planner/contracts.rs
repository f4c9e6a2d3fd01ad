use crate::plan::CapabilityContract;
use serde_json::json;

pub const YOUTUBE_DOWNLOAD: &str = "youtube.download";
pub const DRIVE_UPLOAD: &str = "drive.upload";
pub const YANDEX_DISK_UPLOAD: &str = "yandex.disk.upload";
pub const VIDEO_CONVERT: &str = "video.convert";

pub fn rule_capabilities() -> [&'static str; 4] {
    [YOUTUBE_DOWNLOAD, DRIVE_UPLOAD, YANDEX_DISK_UPLOAD, VIDEO_CONVERT]
}

pub fn contract_for(capability: &str) -> Option<CapabilityContract> {
    let contract = match capability {
        YOUTUBE_DOWNLOAD => CapabilityContract {
            input_schema: json!({
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": {"type": "string", "minLength": 1},
                    "min_height": {"type": "integer"},
                    "quality_policy": {"type": "string", "enum": ["strict", "best_available"]},
                    "cookies_from_browser": {"type": "string"}
                }
            }),
            output_schema: json!({
                "type": "object",
                "required": ["file_path"],
                "properties": {
                    "file_path": {"type": "string", "minLength": 1}
                }
            }),
        },
        DRIVE_UPLOAD => CapabilityContract {
            input_schema: json!({
                "type": "object",
                "required": ["file_path", "folder_id"],
                "properties": {
                    "file_path": {"type": "string", "minLength": 1},
                    "folder_id": {"type": "string", "minLength": 1},
                    "name": {"type": "string"},
                    "mime_type": {"type": "string"}
                }
            }),
            output_schema: json!({
                "type": "object",
                "required": ["file_id"],
                "properties": {
                    "file_id": {"type": "string"},
                    "file_name": {"type": "string"},
                    "web_view_link": {"type": "string"}
                }
            }),
        },
        YANDEX_DISK_UPLOAD => CapabilityContract {
            input_schema: json!({
                "type": "object",
                "required": ["file_path", "folder_path"],
                "properties": {
                    "file_path": {"type": "string", "minLength": 1},
                    "folder_path": {"type": "string", "minLength": 1},
                    "overwrite": {"type": "boolean"}
                }
            }),
            output_schema: json!({
                "type": "object",
                "required": ["remote_path"],
                "properties": {
                    "remote_path": {"type": "string"},
                    "public_url": {"type": "string"}
                }
            }),
        },
        VIDEO_CONVERT => CapabilityContract {
            input_schema: json!({
                "type": "object",
                "required": ["mode"],
                "properties": {
                    "mode": {"type": "string", "enum": ["all", "selected"]},
                    "files": {"type": "array", "items": {"type": "string"}},
                    "input_dir": {"type": "string"},
                    "output_dir": {"type": "string"},
                    "jobs": {"type": "integer"}
                }
            }),
            output_schema: json!({
                "type": "object",
                "required": ["converted_count", "output_files"],
                "properties": {
                    "converted_count": {"type": "integer"},
                    "failed_count": {"type": "integer"},
                    "output_files": {"type": "array", "items": {"type": "string"}},
                    "results": {"type": "array"}
                }
            }),
        },
        _ => return None,
    };
    Some(contract)
}
