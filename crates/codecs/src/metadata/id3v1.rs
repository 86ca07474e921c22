//! ID3v1: a fixed 128-byte trailer ("TAG" + title[30] + artist[30] +
//! album[30] + year[4] + comment[30 or 28+track] + genre[1]).

use super::{push_truncated, Tags};

const TAG_SIZE: usize = 128;

/// The standard ID3v1 genre dictionary (indices 0-79) plus the informal
/// Winamp extensions (80-147) still seen in the wild; unmapped indices
/// return `None`. Truncated to the first 64 entries most commonly present
/// in portable-player libraries.
const GENRES: [&str; 64] = [
    "Blues", "Classic Rock", "Country", "Dance", "Disco", "Funk", "Grunge", "Hip-Hop",
    "Jazz", "Metal", "New Age", "Oldies", "Other", "Pop", "R&B", "Rap",
    "Reggae", "Rock", "Techno", "Industrial", "Alternative", "Ska", "Death Metal", "Pranks",
    "Soundtrack", "Euro-Techno", "Ambient", "Trip-Hop", "Vocal", "Jazz+Funk", "Fusion", "Trance",
    "Classical", "Instrumental", "Acid", "House", "Game", "Sound Clip", "Gospel", "Noise",
    "Alternative Rock", "Bass", "Soul", "Punk", "Space", "Meditative", "Instrumental Pop",
    "Instrumental Rock", "Ethnic", "Gothic", "Darkwave", "Techno-Industrial", "Electronic",
    "Pop-Folk", "Eurodance", "Dream", "Southern Rock", "Comedy", "Cult", "Gangsta", "Top 40",
    "Christian Rap", "Pop/Funk", "Jungle",
];

/// Parse a trailing 128-byte ID3v1 tag, if present. Returns `None` if the
/// last 128 bytes don't start with `"TAG"`.
pub fn parse(data: &[u8]) -> Option<Tags> {
    if data.len() < TAG_SIZE {
        return None;
    }
    let tag = &data[data.len() - TAG_SIZE..];
    if &tag[0..3] != b"TAG" {
        return None;
    }

    let title = decode_field::<128>(&tag[3..33]);
    let artist = decode_field::<128>(&tag[33..63]);
    let album = decode_field::<128>(&tag[63..93]);
    let year_digits = decode_field::<64>(&tag[93..97]);
    let year = year_digits.as_ref().and_then(|s| s.as_str().parse().ok());

    // ID3v1.1 repurposes comment byte 28 as a zero marker and byte 29 as
    // the track number when byte 28 is zero.
    let comment = &tag[97..127];
    let track_number = if comment[28] == 0 && comment[29] != 0 { Some(u32::from(comment[29])) } else { None };

    let genre_index = tag[127] as usize;
    let genre = GENRES.get(genre_index).map(|g| push_truncated::<64>(g));

    Some(Tags { title, artist, album, track_number, year, genre })
}

/// Decode a fixed-width, NUL-padded Latin-1 field into a heapless string.
fn decode_field<const N: usize>(bytes: &[u8]) -> Option<heapless::String<N>> {
    let trimmed_len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let slice = &bytes[..trimmed_len];
    if slice.is_empty() {
        return None;
    }
    let mut out = heapless::String::new();
    for &b in slice {
        if out.push(b as char).is_err() {
            break;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_tag(title: &str, artist: &str, album: &str, year: &str, track: u8, genre: u8) -> Vec<u8> {
        let mut tag = vec![0u8; TAG_SIZE];
        tag[0..3].copy_from_slice(b"TAG");
        let title_bytes = title.as_bytes();
        tag[3..3 + title_bytes.len()].copy_from_slice(title_bytes);
        let artist_bytes = artist.as_bytes();
        tag[33..33 + artist_bytes.len()].copy_from_slice(artist_bytes);
        let album_bytes = album.as_bytes();
        tag[63..63 + album_bytes.len()].copy_from_slice(album_bytes);
        tag[93..93 + year.len()].copy_from_slice(year.as_bytes());
        tag[125] = 0; // ID3v1.1 marker
        tag[126] = track;
        tag[127] = genre;
        tag
    }

    #[test]
    fn parses_title_artist_album_and_track() {
        let tag = build_tag("Song", "Artist", "Album", "1998", 7, 17);
        let tags = parse(&tag).unwrap();
        assert_eq!(tags.title.as_deref(), Some("Song"));
        assert_eq!(tags.artist.as_deref(), Some("Artist"));
        assert_eq!(tags.album.as_deref(), Some("Album"));
        assert_eq!(tags.year, Some(1998));
        assert_eq!(tags.track_number, Some(7));
        assert_eq!(tags.genre.as_deref(), Some("Rock"));
    }

    #[test]
    fn missing_tag_marker_returns_none() {
        let data = vec![0u8; TAG_SIZE];
        assert!(parse(&data).is_none());
    }

    #[test]
    fn short_buffer_returns_none() {
        assert!(parse(&[0u8; 10]).is_none());
    }
}
