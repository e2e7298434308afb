//! G.711 μ-law and A-law expansion to 16-bit PCM.

use anyhow::Result;

use super::lpcm::MAX_PACKET_BYTES;
use super::{PacketReader, Samples};
use crate::demux::FormatDescriptor;
use crate::io::BitCursor;

const fn ulaw_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        let value = !(i as u8);
        let mut t = (((value & 0x0f) as i32) << 3) + 0x84;
        t <<= ((value & 0x70) >> 4) as u32;
        table[i] = (if value & 0x80 != 0 { 0x84 - t } else { t - 0x84 }) as i16;
        i += 1;
    }
    table
}

const fn alaw_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        let value = (i as u8) ^ 0x55;
        let mut t = ((value & 0x0f) as i32) << 1 | 1;
        let segment = ((value & 0x70) >> 4) as u32;
        t = if segment != 0 {
            (t + 32) << (segment + 2)
        } else {
            t << 3
        };
        table[i] = (if value & 0x80 != 0 { t } else { -t }) as i16;
        i += 1;
    }
    table
}

pub static ULAW: [i16; 256] = ulaw_table();
pub static ALAW: [i16; 256] = alaw_table();

pub struct XlawReader {
    table: &'static [i16; 256],
}

impl XlawReader {
    pub fn ulaw() -> Self {
        Self { table: &ULAW }
    }

    pub fn alaw() -> Self {
        Self { table: &ALAW }
    }
}

impl PacketReader for XlawReader {
    fn init(&mut self, format: &mut FormatDescriptor) -> Result<()> {
        format.bits_per_channel = 16;
        format.bytes_per_packet = 2 * format.channels_per_frame * format.frames_per_packet.max(1);
        Ok(())
    }

    fn read_packet(
        &mut self,
        bits: &mut BitCursor,
        _format: &FormatDescriptor,
    ) -> Result<Option<Samples>> {
        let stream = bits.stream_mut();
        let length = stream.remaining_bytes().min(MAX_PACKET_BYTES);
        if length == 0 {
            return Ok(None);
        }

        let bytes = stream.read_bytes(length)?;
        let samples = bytes.iter().map(|&b| self.table[usize::from(b)]).collect();
        Ok(Some(Samples::I16(samples)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{DecodeEvent, Decoder};
    use crate::demux::FourCC;
    use crate::io::Chunk;

    #[test]
    fn ulaw_reference_points() {
        assert_eq!(ULAW[0x00], -32124);
        assert_eq!(ULAW[0x7f], 0);
        assert_eq!(ULAW[0x80], 32124);
        assert_eq!(ULAW[0xff], 0);
        assert_eq!(ULAW[0x70], -120);
    }

    #[test]
    fn alaw_reference_points() {
        assert_eq!(ALAW[0x55], -8);
        assert_eq!(ALAW[0xd5], 8);
        assert_eq!(ALAW[0x2a], -32256);
        assert_eq!(ALAW[0xaa], 32256);
    }

    #[test]
    fn tables_are_odd_symmetric() {
        for i in 0..128 {
            assert_eq!(ULAW[i], -ULAW[i + 128]);
            assert_eq!(ALAW[i], -ALAW[i + 128]);
        }
    }

    #[test]
    fn output_format_is_sixteen_bit() {
        let format = FormatDescriptor::pcm(FourCC::ULAW, 8000.0, 1, 8);
        let mut decoder = Decoder::new(&format).unwrap();
        assert_eq!(decoder.format().bits_per_channel, 16);
        assert_eq!(decoder.format().bytes_per_packet, 2);

        decoder.push(Chunk::from(vec![0x00, 0xff]));
        decoder.push(Chunk::from(vec![0x80]));
        decoder.finish();
        let events: Vec<_> = decoder.collect();
        assert_eq!(
            events,
            vec![
                DecodeEvent::Data(Samples::I16(vec![-32124, 0])),
                DecodeEvent::Data(Samples::I16(vec![32124])),
                DecodeEvent::End,
            ]
        );
    }
}
