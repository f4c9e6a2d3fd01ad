use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestSignals {
    pub youtube_url: Option<String>,
    pub drive_folder_id: Option<String>,
    pub mentions_drive: bool,
    pub mentions_yandex: bool,
    pub yandex_folder_path: Option<String>,
    pub mentions_download: bool,
    pub mentions_upload: bool,
    pub mentions_conversion: bool,
    pub convert_all: bool,
    pub min_height: Option<u64>,
    pub webm_files: Vec<String>,
}

struct Patterns {
    url: Regex,
    drive_folder: Regex,
    folder_hint: Regex,
    yandex_disk_path: Regex,
    absolute_path: Regex,
    quality: Regex,
    webm_file: Regex,
    download: Regex,
    upload: Regex,
    drive: Regex,
    conversion: Regex,
    mp4: Regex,
    all: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                url: Regex::new(r"https?://\S+").ok()?,
                drive_folder: Regex::new(r"drive\.google\.com/\S*?/folders/([A-Za-z0-9_-]+)").ok()?,
                folder_hint: Regex::new(r"(?i)\bfolder(?:_id)?[\s:=]+([A-Za-z0-9_-]{10,})").ok()?,
                yandex_disk_path: Regex::new(r"\b(disk:/\S*)").ok()?,
                absolute_path: Regex::new(r"(?:^|\s)(/[^\s,;]+)").ok()?,
                quality: Regex::new(r"(?i)\b(\d{3,4})p\b").ok()?,
                webm_file: Regex::new(r"(?i)[A-Za-z0-9_][A-Za-z0-9_.-]*\.webm\b").ok()?,
                download: Regex::new(r"(?i)\b(download|fetch|grab)\b").ok()?,
                upload: Regex::new(r"(?i)\b(upload|put|save)\b").ok()?,
                drive: Regex::new(r"(?i)\b(google drive|gdrive|drive)\b").ok()?,
                conversion: Regex::new(r"(?i)\b(convert|conversion|transcode)\b").ok()?,
                mp4: Regex::new(r"(?i)\bmp4\b").ok()?,
                all: Regex::new(r"(?i)\ball\b").ok()?,
            })
        })
        .as_ref()
}

fn trim_url(raw: &str) -> &str {
    raw.trim_end_matches(['.', ',', ';', ':', ')', ']', '"', '\''])
}

fn is_youtube_url(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    lowered.contains("youtube.com/") || lowered.contains("youtu.be/")
}

pub fn extract_signals(goal: &str) -> RequestSignals {
    let Some(p) = patterns() else {
        return RequestSignals::default();
    };
    let mut signals = RequestSignals::default();

    for found in p.url.find_iter(goal) {
        let url = trim_url(found.as_str());
        if signals.youtube_url.is_none() && is_youtube_url(url) {
            signals.youtube_url = Some(url.to_string());
        }
        if signals.drive_folder_id.is_none() {
            if let Some(caps) = p.drive_folder.captures(url) {
                signals.drive_folder_id = Some(caps[1].to_string());
            }
        }
    }
    if signals.drive_folder_id.is_none() {
        signals.drive_folder_id = p
            .folder_hint
            .captures(goal)
            .map(|caps| caps[1].to_string());
    }

    // URLs are stripped before keyword checks so "drive.google.com" or a
    // path segment cannot count as a spoken intent.
    let prose = p.url.replace_all(goal, " ");
    signals.mentions_drive = signals.drive_folder_id.is_some() || p.drive.is_match(&prose);
    signals.mentions_yandex = prose.to_ascii_lowercase().contains("yandex");
    if signals.mentions_yandex {
        signals.yandex_folder_path = p
            .yandex_disk_path
            .captures(&prose)
            .or_else(|| p.absolute_path.captures(&prose))
            .map(|caps| caps[1].to_string());
    }
    signals.mentions_download = signals.youtube_url.is_some() || p.download.is_match(&prose);
    signals.mentions_upload =
        p.upload.is_match(&prose) || signals.mentions_drive || signals.mentions_yandex;
    signals.min_height = p
        .quality
        .captures(&prose)
        .and_then(|caps| caps[1].parse::<u64>().ok());

    for found in p.webm_file.find_iter(&prose) {
        let name = found.as_str().to_string();
        if !signals.webm_files.contains(&name) {
            signals.webm_files.push(name);
        }
    }
    signals.mentions_conversion = p.conversion.is_match(&prose)
        || (prose.to_ascii_lowercase().contains("webm") && p.mp4.is_match(&prose));
    signals.convert_all =
        signals.mentions_conversion && signals.webm_files.is_empty() && p.all.is_match(&prose);

    signals
}
