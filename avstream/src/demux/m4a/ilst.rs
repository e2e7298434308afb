//! iTunes-style `ilst` metadata items.

use crate::demux::{Metadata, MetadataValue};
use crate::io::{ByteCursor, Encoding};
use crate::utils::errors::CursorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagReader {
    Text,
    Cover,
    Genre,
    Tempo,
    Rating,
    NumberPair,
    Flag,
}

use TagReader::*;

const TAGS: &[(&[u8; 4], &str, TagReader)] = &[
    (b"\xa9alb", "album", Text),
    (b"\xa9arg", "arranger", Text),
    (b"\xa9art", "artist", Text),
    (b"\xa9ART", "artist", Text),
    (b"aART", "album_artist", Text),
    (b"catg", "category", Text),
    (b"\xa9com", "composer", Text),
    (b"\xa9cpy", "copyright", Text),
    (b"cprt", "copyright", Text),
    (b"\xa9cmt", "comments", Text),
    (b"\xa9day", "release_date", Text),
    (b"desc", "description", Text),
    (b"\xa9gen", "genre", Text),
    (b"\xa9grp", "grouping", Text),
    (b"\xa9isr", "isrc", Text),
    (b"keyw", "keywords", Text),
    (b"\xa9lab", "record_label", Text),
    (b"ldes", "long_description", Text),
    (b"\xa9lyr", "lyrics", Text),
    (b"\xa9nam", "title", Text),
    (b"\xa9phg", "recording_copyright", Text),
    (b"\xa9prd", "producer", Text),
    (b"\xa9prf", "performers", Text),
    (b"purd", "purchase_date", Text),
    (b"purl", "podcast_url", Text),
    (b"\xa9swf", "songwriter", Text),
    (b"\xa9too", "encoder", Text),
    (b"\xa9wrt", "composer", Text),
    (b"covr", "cover_art", Cover),
    (b"gnre", "genre", Genre),
    (b"tmpo", "tempo", Tempo),
    (b"rtng", "rating", Rating),
    (b"disk", "disk_number", NumberPair),
    (b"trkn", "track_number", NumberPair),
    (b"cpil", "compilation", Flag),
    (b"pcst", "podcast", Flag),
    (b"pgap", "gapless", Flag),
];

/// ID3v1 genres, indexed from one by `gnre`.
const GENRES: [&str; 126] = [
    "Blues", "Classic Rock", "Country", "Dance", "Disco", "Funk", "Grunge",
    "Hip-Hop", "Jazz", "Metal", "New Age", "Oldies", "Other", "Pop", "R&B",
    "Rap", "Reggae", "Rock", "Techno", "Industrial", "Alternative", "Ska",
    "Death Metal", "Pranks", "Soundtrack", "Euro-Techno", "Ambient",
    "Trip-Hop", "Vocal", "Jazz+Funk", "Fusion", "Trance", "Classical",
    "Instrumental", "Acid", "House", "Game", "Sound Clip", "Gospel", "Noise",
    "AlternRock", "Bass", "Soul", "Punk", "Space", "Meditative", "Instrumental Pop",
    "Instrumental Rock", "Ethnic", "Gothic", "Darkwave", "Techno-Industrial",
    "Electronic", "Pop-Folk", "Eurodance", "Dream", "Southern Rock", "Comedy",
    "Cult", "Gangsta", "Top 40", "Christian Rap", "Pop/Funk", "Jungle",
    "Native American", "Cabaret", "New Wave", "Psychadelic", "Rave", "Showtunes",
    "Trailer", "Lo-Fi", "Tribal", "Acid Punk", "Acid Jazz", "Polka", "Retro",
    "Musical", "Rock & Roll", "Hard Rock", "Folk", "Folk/Rock", "National Folk",
    "Swing", "Fast Fusion", "Bebob", "Latin", "Revival", "Celtic", "Bluegrass",
    "Avantgarde", "Gothic Rock", "Progressive Rock", "Psychedelic Rock", "Symphonic Rock",
    "Slow Rock", "Big Band", "Chorus", "Easy Listening", "Acoustic", "Humour", "Speech",
    "Chanson", "Opera", "Chamber Music", "Sonata", "Symphony", "Booty Bass", "Primus",
    "Porn Groove", "Satire", "Slow Jam", "Club", "Tango", "Samba", "Folklore", "Ballad",
    "Power Ballad", "Rhythmic Soul", "Freestyle", "Duet", "Punk Rock", "Drum Solo",
    "A Capella", "Euro-House", "Dance Hall",
];

pub fn is_known(tag: &[u8; 4]) -> bool {
    TAGS.iter().any(|(t, _, _)| *t == tag)
}

/// Decodes the payload of a `data` box (after its type and locale words)
/// belonging to item `tag`. Unknown tags are left unread.
pub fn read_item(
    stream: &mut ByteCursor,
    tag: &[u8; 4],
    len: u64,
    metadata: &mut Metadata,
) -> Result<(), CursorError> {
    let Some(&(_, key, reader)) = TAGS.iter().find(|(t, _, _)| *t == tag) else {
        return Ok(());
    };

    let value = match reader {
        Text => MetadataValue::Text(stream.read_string(Some(len), Encoding::Utf8)?),
        Cover => MetadataValue::Binary(stream.read_bytes(len)?),
        Genre => {
            let index = usize::from(stream.read_u16(false)?);
            match index.checked_sub(1).and_then(|i| GENRES.get(i)) {
                Some(genre) => MetadataValue::from(*genre),
                None => return Ok(()),
            }
        }
        Tempo => MetadataValue::Integer(stream.read_u16(false)?.into()),
        Rating => MetadataValue::from(match stream.read_u8()? {
            0 => "None",
            2 => "Clean",
            _ => "Explicit",
        }),
        NumberPair => {
            stream.advance(2)?;
            let number = stream.read_u16(false)?;
            let total = stream.read_u16(false)?;
            MetadataValue::Text(format!("{number} of {total}"))
        }
        Flag => MetadataValue::Flag(stream.read_u8()? == 1),
    };

    metadata.insert(key.to_string(), value);
    Ok(())
}
