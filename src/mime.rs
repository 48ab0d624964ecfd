//! MIME-type classes used to restrict which current-case files may anchor a match.

use serde::{Deserialize, Serialize};
use std::path::Path;

const MEDIA_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/bmp",
    "image/x-ms-bmp",
    "image/tiff",
    "image/webp",
    "image/x-icon",
    "image/vnd.microsoft.icon",
    "image/heic",
    "video/mp4",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-ms-wmv",
    "video/x-matroska",
    "video/mpeg",
    "video/webm",
    "video/3gpp",
    "audio/mpeg",
    "audio/x-wav",
    "audio/ogg",
    "audio/aac",
    "audio/flac",
    "application/vnd.ms-asf",
];

const DOCUMENT_MIME_TYPES: &[&str] = &[
    "text/plain",
    "text/html",
    "text/csv",
    "text/rtf",
    "application/rtf",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.oasis.opendocument.presentation",
];

pub fn is_media(mime: &str) -> bool {
    let mime = mime.trim().to_lowercase();
    MEDIA_MIME_TYPES.contains(&mime.as_str())
        || mime.starts_with("image/")
        || mime.starts_with("video/")
        || mime.starts_with("audio/")
}

pub fn is_document(mime: &str) -> bool {
    let mime = mime.trim().to_lowercase();
    DOCUMENT_MIME_TYPES.contains(&mime.as_str())
}

/// Restricts matches to media files, document files, both, or neither.
///
/// With neither class selected no MIME filtering happens. With both selected a
/// file qualifies if it belongs to either class.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MimeFilter {
    #[serde(default)]
    pub media: bool,
    #[serde(default)]
    pub documents: bool,
}

impl MimeFilter {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn media_only() -> Self {
        Self { media: true, documents: false }
    }

    pub fn documents_only() -> Self {
        Self { media: false, documents: true }
    }

    pub fn is_active(&self) -> bool {
        self.media || self.documents
    }

    /// True if any of the file's assigned MIME types satisfies the filter.
    pub fn admits(&self, mime_types: &[String]) -> bool {
        if !self.is_active() {
            return true;
        }
        mime_types.iter().any(|m| {
            (self.media && is_media(m)) || (self.documents && is_document(m))
        })
    }

    pub fn describe(&self) -> &'static str {
        match (self.media, self.documents) {
            (false, false) => "all files",
            (true, false) => "media files",
            (false, true) => "document files",
            (true, true) => "media and document files",
        }
    }
}

/// Guess MIME types from a file's extension. Unknown extensions yield nothing.
pub fn guess_mime_types(path: &Path) -> Vec<String> {
    let ext = path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "heic" => "image/heic",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        "mkv" => "video/x-matroska",
        "mpg" | "mpeg" => "video/mpeg",
        "webm" => "video/webm",
        "3gp" => "video/3gpp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/x-wav",
        "ogg" => "audio/ogg",
        "aac" => "audio/aac",
        "flac" => "audio/flac",
        "txt" | "log" => "text/plain",
        "htm" | "html" => "text/html",
        "csv" => "text/csv",
        "rtf" => "application/rtf",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "odt" => "application/vnd.oasis.opendocument.text",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "odp" => "application/vnd.oasis.opendocument.presentation",
        "zip" => "application/zip",
        "exe" | "dll" => "application/x-msdownload",
        _ => return Vec::new(),
    };

    let mut types = vec![mime.to_string()];
    // ASF containers are both audio and video
    if ext == "wmv" {
        types.push("application/vnd.ms-asf".to_string());
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mimes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_classification() {
        assert!(is_media("image/jpeg"));
        assert!(is_media("video/x-something-new"));
        assert!(!is_media("application/pdf"));
        assert!(is_document("application/pdf"));
        assert!(is_document("TEXT/PLAIN"));
        assert!(!is_document("image/png"));
    }

    #[test]
    fn test_filter_combinations() {
        let jpeg = mimes(&["image/jpeg"]);
        let pdf = mimes(&["application/pdf"]);
        let zip = mimes(&["application/zip"]);

        // Neither class selected: everything passes, even files without a type
        assert!(MimeFilter::none().admits(&zip));
        assert!(MimeFilter::none().admits(&[]));

        assert!(MimeFilter::media_only().admits(&jpeg));
        assert!(!MimeFilter::media_only().admits(&pdf));
        assert!(!MimeFilter::media_only().admits(&[]));

        assert!(MimeFilter::documents_only().admits(&pdf));
        assert!(!MimeFilter::documents_only().admits(&jpeg));

        // Both selected is the union
        let both = MimeFilter { media: true, documents: true };
        assert!(both.admits(&jpeg));
        assert!(both.admits(&pdf));
        assert!(!both.admits(&zip));
    }

    #[test]
    fn test_any_assigned_type_matches() {
        let ambiguous = mimes(&["application/octet-stream", "video/mp4"]);
        assert!(MimeFilter::media_only().admits(&ambiguous));
    }

    #[test]
    fn test_guess_mime_types() {
        assert_eq!(guess_mime_types(Path::new("a/b/photo.JPG")), mimes(&["image/jpeg"]));
        assert_eq!(guess_mime_types(Path::new("report.pdf")), mimes(&["application/pdf"]));
        assert_eq!(guess_mime_types(Path::new("clip.wmv")).len(), 2);
        assert!(guess_mime_types(Path::new("Makefile")).is_empty());
    }
}
