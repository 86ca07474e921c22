//! ID3v2 (2.3/2.4): a leading tag of frames, each with a 4-character ID, a
//! size, and an encoding byte for text frames. Only the frames portable
//! players care about are extracted (`TIT2`/`TPE1`/`TALB`/`TRCK`/`TYER`/
//! `TCON` and their pre-2.3 3-character equivalents).

use super::{push_truncated, Tags};

struct FrameView<'a> {
    id: &'a [u8],
    body: &'a [u8],
}

fn synchsafe_to_u32(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 21) | ((bytes[1] as u32) << 14) | ((bytes[2] as u32) << 7) | (bytes[3] as u32)
}

/// Parse a leading ID3v2 tag, if present. Returns `None` if the first three
/// bytes aren't `"ID3"`.
pub fn parse(data: &[u8]) -> Option<Tags> {
    if data.len() < 10 || &data[0..3] != b"ID3" {
        return None;
    }
    let major_version = data[3];
    let flags = data[5];
    let tag_size = synchsafe_to_u32(&data[6..10]) as usize;
    let mut cursor = 10usize;
    if flags & 0x40 != 0 {
        // Extended header present; its size field is itself synchsafe.
        let ext_size = synchsafe_to_u32(data.get(cursor..cursor + 4)?) as usize;
        cursor += ext_size.max(4);
    }
    let tag_end = (10 + tag_size).min(data.len());

    let mut tags = Tags::default();
    while cursor + 10 <= tag_end {
        let frame = if major_version >= 3 {
            read_v23_frame(data, cursor, tag_end)
        } else {
            read_v22_frame(data, cursor, tag_end)
        };
        let Some((frame, next_cursor)) = frame else { break };
        if frame.body.is_empty() {
            cursor = next_cursor;
            continue;
        }
        apply_frame(&frame, &mut tags);
        cursor = next_cursor;
    }

    Some(tags)
}

fn read_v23_frame<'a>(data: &'a [u8], cursor: usize, tag_end: usize) -> Option<(FrameView<'a>, usize)> {
    let id = data.get(cursor..cursor + 4)?;
    if id == [0, 0, 0, 0] {
        return None;
    }
    let size = u32::from_be_bytes(data.get(cursor + 4..cursor + 8)?.try_into().ok()?) as usize;
    let body_start = cursor + 10;
    let body_end = (body_start + size).min(tag_end);
    let body = data.get(body_start..body_end)?;
    Some((FrameView { id, body }, body_end))
}

fn read_v22_frame<'a>(data: &'a [u8], cursor: usize, tag_end: usize) -> Option<(FrameView<'a>, usize)> {
    let id = data.get(cursor..cursor + 3)?;
    if id == [0, 0, 0] {
        return None;
    }
    let size_bytes = data.get(cursor + 3..cursor + 6)?;
    let size = ((size_bytes[0] as usize) << 16) | ((size_bytes[1] as usize) << 8) | size_bytes[2] as usize;
    let body_start = cursor + 6;
    let body_end = (body_start + size).min(tag_end);
    let body = data.get(body_start..body_end)?;
    Some((FrameView { id, body }, body_end))
}

fn apply_frame(frame: &FrameView, tags: &mut Tags) {
    let text = decode_text_frame(frame.body);
    let Some(text) = text else { return };
    let id = frame.id;
    if id == b"TIT2" || id == b"TT2" {
        tags.title = Some(push_truncated(&text));
    } else if id == b"TPE1" || id == b"TP1" {
        tags.artist = Some(push_truncated(&text));
    } else if id == b"TALB" || id == b"TAL" {
        tags.album = Some(push_truncated(&text));
    } else if id == b"TRCK" || id == b"TRK" {
        let number_part = text.split('/').next().unwrap_or("");
        tags.track_number = number_part.trim().parse().ok();
    } else if id == b"TYER" || id == b"TDRC" || id == b"TYE" {
        tags.year = text.get(0..4).and_then(|s| s.parse().ok());
    } else if id == b"TCON" || id == b"TCO" {
        tags.genre = Some(push_truncated(&text));
    }
}

/// Decode a text-information frame body: first byte is the encoding
/// (0=Latin-1, 1=UTF-16 with BOM, 2=UTF-16BE, 3=UTF-8), followed by the
/// encoded string.
fn decode_text_frame(body: &[u8]) -> Option<heapless::String<128>> {
    let (&encoding, rest) = body.split_first()?;
    let mut out = heapless::String::new();
    match encoding {
        0 => {
            for &b in rest {
                if b == 0 {
                    break;
                }
                if out.push(b as char).is_err() {
                    break;
                }
            }
        }
        3 => {
            let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
            let s = core::str::from_utf8(&rest[..end]).ok()?;
            for ch in s.chars() {
                if out.push(ch).is_err() {
                    break;
                }
            }
        }
        1 | 2 => {
            let mut pairs = rest.chunks_exact(2);
            let big_endian = if encoding == 1 {
                match pairs.next() {
                    Some([0xFE, 0xFF]) => true,
                    Some([0xFF, 0xFE]) => false,
                    _ => true,
                }
            } else {
                true
            };
            for pair in pairs {
                let code = if big_endian { u16::from_be_bytes([pair[0], pair[1]]) } else { u16::from_le_bytes([pair[0], pair[1]]) };
                if code == 0 {
                    break;
                }
                if let Some(ch) = char::from_u32(u32::from(code)) {
                    if out.push(ch).is_err() {
                        break;
                    }
                }
            }
        }
        _ => return None,
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_frame(id: &[u8; 4], text: &str) -> Vec<u8> {
        let mut body = vec![3u8]; // UTF-8
        body.extend_from_slice(text.as_bytes());
        body.push(0);
        let mut out = Vec::new();
        out.extend_from_slice(id);
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&[0, 0]); // flags
        out.extend_from_slice(&body);
        out
    }

    fn build_tag(frames: &[Vec<u8>]) -> Vec<u8> {
        let mut body = Vec::new();
        for f in frames {
            body.extend_from_slice(f);
        }
        let mut out = Vec::new();
        out.extend_from_slice(b"ID3");
        out.extend_from_slice(&[4, 0, 0]); // version 2.4.0, flags
        let size = body.len() as u32;
        out.extend_from_slice(&[
            ((size >> 21) & 0x7F) as u8,
            ((size >> 14) & 0x7F) as u8,
            ((size >> 7) & 0x7F) as u8,
            (size & 0x7F) as u8,
        ]);
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn parses_title_and_artist_frames() {
        let tag = build_tag(&[build_frame(b"TIT2", "Song"), build_frame(b"TPE1", "Artist")]);
        let tags = parse(&tag).unwrap();
        assert_eq!(tags.title.as_deref(), Some("Song"));
        assert_eq!(tags.artist.as_deref(), Some("Artist"));
    }

    #[test]
    fn track_number_strips_total_tracks_suffix() {
        let tag = build_tag(&[build_frame(b"TRCK", "7/12")]);
        let tags = parse(&tag).unwrap();
        assert_eq!(tags.track_number, Some(7));
    }

    #[test]
    fn missing_id3_marker_returns_none() {
        assert!(parse(b"RIFF......").is_none());
    }
}
