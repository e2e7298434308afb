//! Box kinds of the ISO base media file format subset we understand.

use super::ilst;
use crate::demux::FourCC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxKind {
    Ftyp,
    Moov,
    Mdat,
    Trak,
    Tkhd,
    Tref,
    Chap,
    Mdia,
    Hdlr,
    Mdhd,
    Minf,
    Stbl,
    Stsd,
    /// A sample description entry, named by its codec.
    SampleEntry(FourCC),
    Alac,
    Esds,
    Wave,
    Enda,
    Stts,
    Stsc,
    Stsz,
    Stco,
    Co64,
    Udta,
    Meta,
    Ilst,
    IlstItem(FourCC),
    IlstData(FourCC),
    Unknown(FourCC),
}

impl BoxKind {
    /// Resolves a box by its name and the kind of its enclosing box.
    pub fn resolve(parent: Option<BoxKind>, name: FourCC) -> Self {
        use BoxKind::*;

        match (parent, name.as_bytes()) {
            (None, b"ftyp") => Ftyp,
            (None, b"moov") => Moov,
            (None, b"mdat") => Mdat,
            (Some(Moov), b"trak") => Trak,
            (Some(Moov), b"udta") => Udta,
            (Some(Trak), b"tkhd") => Tkhd,
            (Some(Trak), b"tref") => Tref,
            (Some(Trak), b"mdia") => Mdia,
            (Some(Tref), b"chap") => Chap,
            (Some(Mdia), b"hdlr") => Hdlr,
            (Some(Mdia), b"mdhd") => Mdhd,
            (Some(Mdia), b"minf") => Minf,
            (Some(Minf), b"stbl") => Stbl,
            (Some(Stbl), b"stsd") => Stsd,
            (Some(Stbl), b"stts") => Stts,
            (Some(Stbl), b"stsc") => Stsc,
            (Some(Stbl), b"stsz") => Stsz,
            (Some(Stbl), b"stco") => Stco,
            (Some(Stbl), b"co64") => Co64,
            (Some(Stsd), _) => SampleEntry(name),
            (Some(SampleEntry(_)), b"alac") => Alac,
            (Some(SampleEntry(_)), b"esds") => Esds,
            (Some(SampleEntry(_)), b"wave") => Wave,
            (Some(Wave), b"enda") => Enda,
            (Some(Wave), b"esds") => Esds,
            (Some(Udta), b"meta") => Meta,
            (Some(Meta), b"ilst") => Ilst,
            (Some(Ilst), tag) if ilst::is_known(tag) => IlstItem(name),
            (Some(IlstItem(tag)), b"data") => IlstData(tag),
            _ => Unknown(name),
        }
    }

    /// Boxes whose payload is a sequence of child boxes, possibly after a
    /// fixed header read by their handler.
    pub fn is_container(self) -> bool {
        use BoxKind::*;

        matches!(
            self,
            Moov | Trak | Tref | Mdia | Minf | Stbl | Stsd | SampleEntry(_) | Wave | Udta | Meta | Ilst | IlstItem(_)
        )
    }

    pub fn has_handler(self) -> bool {
        use BoxKind::*;

        !matches!(
            self,
            Moov | Tref | Mdia | Minf | Stbl | Wave | Udta | Ilst | IlstItem(_) | Unknown(_)
        )
    }

    /// Whether a hook runs once the box and all its children are parsed.
    pub fn has_after_hook(self) -> bool {
        matches!(self, BoxKind::Moov | BoxKind::Meta)
    }

    pub fn name(self) -> FourCC {
        use BoxKind::*;

        let name = match self {
            SampleEntry(name) | IlstItem(name) | Unknown(name) => return name,
            IlstData(_) => b"data",
            Ftyp => b"ftyp",
            Moov => b"moov",
            Mdat => b"mdat",
            Trak => b"trak",
            Tkhd => b"tkhd",
            Tref => b"tref",
            Chap => b"chap",
            Mdia => b"mdia",
            Hdlr => b"hdlr",
            Mdhd => b"mdhd",
            Minf => b"minf",
            Stbl => b"stbl",
            Stsd => b"stsd",
            Alac => b"alac",
            Esds => b"esds",
            Wave => b"wave",
            Enda => b"enda",
            Stts => b"stts",
            Stsc => b"stsc",
            Stsz => b"stsz",
            Stco => b"stco",
            Co64 => b"co64",
            Udta => b"udta",
            Meta => b"meta",
            Ilst => b"ilst",
        };
        FourCC(*name)
    }
}
