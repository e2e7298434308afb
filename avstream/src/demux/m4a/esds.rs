//! MPEG-4 elementary stream descriptors (ISO/IEC 14496-1), just far enough
//! to pull out the decoder specific info.

use crate::io::{ByteCursor, Chunk};
use crate::utils::errors::CursorError;

const ES_DESCR_TAG: u8 = 0x03;
const DEC_CONFIG_DESCR_TAG: u8 = 0x04;
const DEC_SPECIFIC_DESCR_TAG: u8 = 0x05;

/// Reads an expandable descriptor length: seven bits per byte, high bit set
/// while more bytes follow, at most four bytes.
pub fn read_descr_len(stream: &mut ByteCursor) -> Result<u32, CursorError> {
    let mut len = 0u32;
    for _ in 0..4 {
        let c = stream.read_u8()?;
        len = len << 7 | u32::from(c & 0x7f);
        if c & 0x80 == 0 {
            break;
        }
    }
    Ok(len)
}

/// Parses an `esds` payload and returns the decoder specific info, if any.
pub fn read_esds(stream: &mut ByteCursor) -> Result<Option<Chunk>, CursorError> {
    stream.advance(4)?; // version and flags

    let tag = stream.read_u8()?;
    read_descr_len(stream)?;

    if tag == ES_DESCR_TAG {
        stream.advance(2)?; // ES_ID
        let flags = stream.read_u8()?;

        if flags & 0x80 != 0 {
            stream.advance(2)?; // dependsOn_ES_ID
        }
        if flags & 0x40 != 0 {
            let url_len = stream.read_u8()?;
            stream.advance(u64::from(url_len))?;
        }
        if flags & 0x20 != 0 {
            stream.advance(2)?; // OCR_ES_Id
        }
    } else {
        stream.advance(2)?;
    }

    if stream.read_u8()? != DEC_CONFIG_DESCR_TAG {
        return Ok(None);
    }
    read_descr_len(stream)?;

    let _object_type = stream.read_u8()?;
    stream.advance(1 + 3 + 4 + 4)?; // stream type, buffer size, max and avg bitrate

    if stream.read_u8()? != DEC_SPECIFIC_DESCR_TAG {
        return Ok(None);
    }
    let len = read_descr_len(stream)?;
    stream.read_bytes(u64::from(len)).map(Some)
}
