//! MIME type detection from file content, with an extension fallback.

use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::Path;

const SNIFF_BYTES: u64 = 8 * 1024;
pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Kind {
    Image,
    Video,
    Audio,
    Document,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedType {
    pub mime_type: String,
    pub description: String,
    pub extension: String,
}

impl DetectedType {
    pub fn kind(&self) -> Kind {
        if is_image(&self.mime_type) {
            Kind::Image
        } else if is_video(&self.mime_type) {
            Kind::Video
        } else if is_audio(&self.mime_type) {
            Kind::Audio
        } else if is_document(&self.mime_type) {
            Kind::Document
        } else {
            Kind::Other
        }
    }
}

pub fn is_image(mime: &str) -> bool {
    mime.starts_with("image/")
}

pub fn is_video(mime: &str) -> bool {
    mime.starts_with("video/")
}

pub fn is_audio(mime: &str) -> bool {
    mime.starts_with("audio/")
}

pub fn is_document(mime: &str) -> bool {
    mime == "application/pdf" || mime.contains("wordprocessingml") || mime.contains("text/")
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

fn guess_from_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "txt" | "md" | "log" | "csv" | "rst" => "text/plain",
        "rs" | "py" | "js" | "ts" | "json" | "toml" | "yaml" | "yml" => "text/plain",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/x-wav",
        "flac" => "audio/x-flac",
        "m4a" => "audio/m4a",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => return None,
    };
    Some(mime)
}

fn looks_like_text(bytes: &[u8]) -> bool {
    !bytes.is_empty() && !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok()
}

/// Classifies the leading bytes of a file. Never fails: unreadable files are
/// reported as `application/octet-stream` with the error in the description.
pub fn detect(path: &Path) -> DetectedType {
    let extension = extension_of(path);
    let mut head = Vec::with_capacity(SNIFF_BYTES as usize);
    let read = fs::File::open(path).and_then(|f| f.take(SNIFF_BYTES).read_to_end(&mut head));
    if let Err(e) = read {
        return DetectedType {
            mime_type: OCTET_STREAM.to_string(),
            description: format!("Error: {e}"),
            extension,
        };
    }
    detect_bytes(&head, &extension)
}

pub fn detect_bytes(head: &[u8], extension: &str) -> DetectedType {
    let (mime_type, description) = if let Some(kind) = infer::get(head) {
        (kind.mime_type().to_string(), format!("{} data", kind.extension()))
    } else if let Some(mime) = guess_from_extension(extension) {
        (mime.to_string(), format!("guessed from .{extension}"))
    } else if looks_like_text(head) {
        ("text/plain".to_string(), "UTF-8 text".to_string())
    } else {
        (OCTET_STREAM.to_string(), "data".to_string())
    };
    DetectedType {
        mime_type,
        description,
        extension: extension.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn magic_bytes_beat_the_extension() {
        let t = detect_bytes(PNG, "pdf");
        assert_eq!(t.mime_type, "image/png");
        assert_eq!(t.kind(), Kind::Image);
    }

    #[test]
    fn extension_fills_in_for_plain_text() {
        let t = detect_bytes(b"hello world", "md");
        assert_eq!(t.mime_type, "text/plain");
        assert_eq!(t.kind(), Kind::Document);
        let unknown = detect_bytes(b"plain words", "zzz");
        assert_eq!(unknown.mime_type, "text/plain");
        let binary = detect_bytes(&[0, 1, 2, 3], "zzz");
        assert_eq!(binary.mime_type, OCTET_STREAM);
        assert_eq!(binary.kind(), Kind::Other);
    }

    #[test]
    fn predicates_follow_mime_prefixes() {
        assert!(is_document("application/pdf"));
        assert!(is_document(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        ));
        assert!(!is_document("application/zip"));
        assert!(is_audio("audio/mpeg"));
        assert!(is_video("video/quicktime"));
    }

    #[test]
    fn missing_file_is_octet_stream() {
        let t = detect(Path::new("/definitely/not/here.jpg"));
        assert_eq!(t.mime_type, OCTET_STREAM);
        assert!(t.description.starts_with("Error"));
        assert_eq!(t.extension, "jpg");
    }
}
