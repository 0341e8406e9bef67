use regex::Regex;
use std::sync::LazyLock;

/// Characters that are unsafe in a download filename on common filesystems.
static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/*?:"<>|]"#).unwrap());

/// Replace filesystem-hostile characters in a video title with underscores
/// so it can be used as a download filename.
pub fn sanitize_filename(title: &str) -> String {
    UNSAFE_FILENAME_CHARS.replace_all(title, "_").to_string()
}

/// Content type for a media file extension. Unknown extensions fall back to
/// a generic byte stream.
pub fn content_type_for(ext: &str) -> mime::Mime {
    match ext {
        "mp4" | "m4v" => "video/mp4".parse().unwrap(),
        "webm" => "video/webm".parse().unwrap(),
        "mkv" => "video/x-matroska".parse().unwrap(),
        "m4a" => "audio/mp4".parse().unwrap(),
        "mp3" => "audio/mpeg".parse().unwrap(),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
