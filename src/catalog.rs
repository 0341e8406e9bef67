//! Format catalog: cleans and orders the raw format records returned by the
//! media resolver.

use serde::{Deserialize, Serialize};

use crate::fetcher::RawFormat;

/// One candidate encoding of a video, as presented to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub ext: String,
    pub resolution: String,
    pub res_val: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
}

/// Drops records with no usable video stream, derives a sortable resolution
/// rank, and orders the result highest resolution first. The sort is stable:
/// records with equal ranks keep their upstream relative order.
pub fn build_catalog(raw: Vec<RawFormat>) -> Vec<FormatDescriptor> {
    let mut formats: Vec<FormatDescriptor> = raw
        .into_iter()
        .filter(has_video_stream)
        .map(describe)
        .collect();

    formats.sort_by(|a, b| b.res_val.cmp(&a.res_val));
    formats
}

fn has_video_stream(format: &RawFormat) -> bool {
    format.vcodec.as_deref().is_some_and(|codec| codec != "none")
}

fn describe(format: RawFormat) -> FormatDescriptor {
    let (resolution, res_val) = resolution_rank(&format);

    FormatDescriptor {
        format_id: format.format_id,
        ext: format.ext.unwrap_or_default(),
        resolution,
        res_val,
        filesize: format.filesize.or(format.filesize_approx),
    }
}

/// The display label and numeric rank for a format. A `format_note` such as
/// "720p" takes precedence over the raw height; anything unparseable ranks 0.
fn resolution_rank(format: &RawFormat) -> (String, u32) {
    if let Some(note) = format.format_note.as_deref().filter(|note| !note.is_empty()) {
        let rank = note
            .strip_suffix('p')
            .and_then(|digits| digits.parse::<u32>().ok())
            .unwrap_or(0);
        return (note.to_string(), rank);
    }

    match format.height {
        Some(height) if height > 0 => (format!("{height}p"), height as u32),
        _ => ("unknown".to_string(), 0),
    }
}
