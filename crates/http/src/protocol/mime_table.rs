//! Static media type ↔ file extension lookup data.
//!
//! The first extension listed for a media type is its canonical one.

use std::path::Path;
use std::str::FromStr;

use mime::Mime;

static MIME_TYPES: &[(&str, &[&str])] = &[
    ("application/gzip", &["gz"]),
    ("application/javascript", &["js", "mjs"]),
    ("application/json", &["json", "map"]),
    ("application/msword", &["doc", "dot"]),
    ("application/octet-stream", &["bin", "dms", "lrf", "mar", "so", "dist", "distz", "pkg", "bpk", "dump", "elc", "deploy"]),
    ("application/ogg", &["ogx"]),
    ("application/pdf", &["pdf"]),
    ("application/rtf", &["rtf"]),
    ("application/vnd.ms-excel", &["xls", "xlm", "xla", "xlc", "xlt", "xlw"]),
    ("application/vnd.oasis.opendocument.text", &["odt"]),
    ("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet", &["xlsx"]),
    ("application/vnd.openxmlformats-officedocument.wordprocessingml.document", &["docx"]),
    ("application/wasm", &["wasm"]),
    ("application/x-7z-compressed", &["7z"]),
    ("application/x-bzip2", &["bz2", "boz"]),
    ("application/x-rar-compressed", &["rar"]),
    ("application/x-sh", &["sh"]),
    ("application/x-tar", &["tar"]),
    ("application/xhtml+xml", &["xhtml", "xht"]),
    ("application/xml", &["xml", "xsl"]),
    ("application/zip", &["zip"]),
    ("audio/mpeg", &["mp3", "mpga", "mp2", "mp2a", "m2a", "m3a"]),
    ("audio/ogg", &["oga", "ogg", "spx", "opus"]),
    ("audio/wav", &["wav"]),
    ("audio/webm", &["weba"]),
    ("font/otf", &["otf"]),
    ("font/ttf", &["ttf"]),
    ("font/woff", &["woff"]),
    ("font/woff2", &["woff2"]),
    ("image/avif", &["avif"]),
    ("image/bmp", &["bmp"]),
    ("image/gif", &["gif"]),
    ("image/jpeg", &["jpeg", "jpg", "jpe"]),
    ("image/png", &["png"]),
    ("image/svg+xml", &["svg", "svgz"]),
    ("image/tiff", &["tiff", "tif"]),
    ("image/vnd.microsoft.icon", &["ico"]),
    ("image/webp", &["webp"]),
    ("text/calendar", &["ics", "ifb"]),
    ("text/css", &["css"]),
    ("text/csv", &["csv"]),
    ("text/html", &["html", "htm"]),
    ("text/markdown", &["md", "markdown"]),
    ("text/plain", &["txt", "text", "conf", "def", "list", "log", "in"]),
    ("text/x-php", &["php"]),
    ("video/mp4", &["mp4", "mp4v", "mpg4"]),
    ("video/mpeg", &["mpeg", "mpg", "mpe", "m1v", "m2v"]),
    ("video/ogg", &["ogv"]),
    ("video/quicktime", &["qt", "mov"]),
    ("video/webm", &["webm"]),
    ("video/x-msvideo", &["avi"]),
];

/// Extensions registered for `media_type`, canonical one first.
///
/// Parameters such as `; charset=utf-8` are ignored; unknown types yield an empty slice.
pub fn extensions_for(media_type: &str) -> &'static [&'static str] {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    MIME_TYPES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(essence))
        .map(|(_, extensions)| *extensions)
        .unwrap_or_default()
}

/// The media type registered for `extension` (without the dot), if any.
pub fn from_extension(extension: &str) -> Option<&'static str> {
    MIME_TYPES
        .iter()
        .find(|(_, extensions)| extensions.iter().any(|ext| ext.eq_ignore_ascii_case(extension)))
        .map(|(name, _)| *name)
}

/// Guesses the media type of `path` from its extension, `application/octet-stream` otherwise.
pub fn guess_from_path(path: impl AsRef<Path>) -> Mime {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(from_extension)
        .and_then(|name| Mime::from_str(name).ok())
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}
