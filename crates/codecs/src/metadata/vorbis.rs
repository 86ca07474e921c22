//! Vorbis comments: a vendor string followed by a list of `KEY=value`
//! UTF-8 entries, each length-prefixed with a little-endian u32. Embedded
//! in FLAC's `VORBIS_COMMENT` metadata block (type 4).

use super::{push_truncated, Tags};

fn read_u32_le(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parse a Vorbis comment block body (vendor string + comment list),
/// recognizing the `TITLE`/`ARTIST`/`ALBUM`/`TRACKNUMBER`/`DATE`/`GENRE`
/// keys case-insensitively.
pub fn parse(body: &[u8]) -> Option<Tags> {
    let vendor_len = read_u32_le(body, 0)? as usize;
    let mut cursor = 4 + vendor_len;
    let comment_count = read_u32_le(body, cursor)?;
    cursor += 4;

    let mut tags = Tags::default();
    for _ in 0..comment_count {
        let len = read_u32_le(body, cursor)? as usize;
        cursor += 4;
        let entry = body.get(cursor..cursor + len)?;
        cursor += len;
        apply_entry(entry, &mut tags);
    }
    Some(tags)
}

fn apply_entry(entry: &[u8], tags: &mut Tags) {
    let Ok(text) = core::str::from_utf8(entry) else { return };
    let Some((key, value)) = text.split_once('=') else { return };
    let key_upper = key.to_ascii_uppercase();
    match key_upper.as_str() {
        "TITLE" => tags.title = Some(push_truncated(value)),
        "ARTIST" => tags.artist = Some(push_truncated(value)),
        "ALBUM" => tags.album = Some(push_truncated(value)),
        "TRACKNUMBER" => tags.track_number = value.split('/').next().and_then(|s| s.trim().parse().ok()),
        "DATE" => tags.year = value.get(0..4).and_then(|s| s.parse().ok()),
        "GENRE" => tags.genre = Some(push_truncated(value)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_block(vendor: &str, entries: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        out.extend_from_slice(vendor.as_bytes());
        out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
        for e in entries {
            out.extend_from_slice(&(e.len() as u32).to_le_bytes());
            out.extend_from_slice(e.as_bytes());
        }
        out
    }

    #[test]
    fn parses_title_and_tracknumber() {
        let block = build_block("student-encoder 1.0", &["TITLE=Song", "TRACKNUMBER=3/10"]);
        let tags = parse(&block).unwrap();
        assert_eq!(tags.title.as_deref(), Some("Song"));
        assert_eq!(tags.track_number, Some(3));
    }

    #[test]
    fn key_matching_is_case_insensitive() {
        let block = build_block("v", &["artist=Band"]);
        let tags = parse(&block).unwrap();
        assert_eq!(tags.artist.as_deref(), Some("Band"));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let block = build_block("v", &["REPLAYGAIN_TRACK_GAIN=-3.0 dB"]);
        let tags = parse(&block).unwrap();
        assert_eq!(tags.title, None);
    }
}
