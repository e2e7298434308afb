use std::fmt;

use crate::demux::FourCC;

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

/// Failure classes surfaced by the streaming core.
///
/// Only [`ErrorKind::Underflow`] is recoverable; it drives the wait/rollback
/// protocol and never reaches an event consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Underflow,
    MalformedStructure,
    UnsupportedVariant,
    TooManyBits,
}

impl ErrorKind {
    /// Finds the kind of an error produced anywhere in the pipeline.
    ///
    /// Errors that did not originate in this crate count as malformed input.
    pub fn classify(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<CursorError>() {
            e.kind()
        } else if let Some(e) = err.downcast_ref::<DemuxError>() {
            e.kind()
        } else if let Some(e) = err.downcast_ref::<DecodeError>() {
            e.kind()
        } else {
            Self::MalformedStructure
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Underflow => "underflow",
            Self::MalformedStructure => "malformed structure",
            Self::UnsupportedVariant => "unsupported variant",
            Self::TooManyBits => "too many bits",
        };
        f.write_str(name)
    }
}

/// A terminal error as delivered through `Error` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&anyhow::Error> for Failure {
    fn from(err: &anyhow::Error) -> Self {
        Self::new(ErrorKind::classify(err), format!("{err:#}"))
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    #[error("Not enough data available")]
    Underflow,

    #[error("Too many bits requested: {0} > 40")]
    TooManyBits(u32),

    #[error("Invalid utf16 sequence")]
    InvalidUtf16,
}

impl CursorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Underflow => ErrorKind::Underflow,
            Self::TooManyBits(_) => ErrorKind::TooManyBits,
            Self::InvalidUtf16 => ErrorKind::MalformedStructure,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DemuxError {
    #[error("No demuxer recognizes this stream")]
    UnknownContainer,

    #[error("Invalid {container} header: expected {expected}")]
    InvalidMagic {
        container: &'static str,
        expected: FourCC,
    },

    #[error("Unsupported {container} version {version}")]
    UnsupportedVersion {
        container: &'static str,
        version: u32,
    },

    #[error("Invalid {name} size {size}")]
    InvalidSize { name: FourCC, size: u64 },

    #[error("Structure overruns available data")]
    Overrun,

    #[error("Not a supported MP4 brand: {0}")]
    UnsupportedBrand(FourCC),

    #[error("Expected exactly one sample description, found {0}")]
    SampleDescriptionCount(u32),

    #[error("No audio track in file")]
    NoAudioTrack,

    #[error("Chapter track {0} not found")]
    MissingChapterTrack(u32),

    #[error("Inconsistent sample table: {0}")]
    SampleTable(&'static str),

    #[error("Unsupported {container} encoding {encoding}")]
    UnsupportedEncoding {
        container: &'static str,
        encoding: u32,
    },

    #[error("Missing {missing} before {found}")]
    MissingChunk { missing: FourCC, found: FourCC },

    #[error("Stream ended with {0} unread bytes in a pending structure")]
    Truncated(u64),

    #[error("Ignoring {0} payload bytes not referenced by any sample")]
    UnreferencedPayload(u64),
}

impl DemuxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedVersion { .. }
            | Self::UnsupportedBrand(_)
            | Self::UnsupportedEncoding { .. }
            | Self::UnknownContainer => ErrorKind::UnsupportedVariant,
            _ => ErrorKind::MalformedStructure,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("No decoder for format {0}")]
    NoDecoder(FourCC),

    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u32),

    #[error("Cookie handler failed: {0}")]
    Cookie(String),
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoDecoder(_) | Self::UnsupportedBitDepth(_) => ErrorKind::UnsupportedVariant,
            Self::Cookie(_) => ErrorKind::MalformedStructure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_finds_typed_errors_through_context() {
        let err = anyhow::Error::new(CursorError::Underflow).context("reading stsz");
        assert_eq!(ErrorKind::classify(&err), ErrorKind::Underflow);

        let err: anyhow::Error = DemuxError::UnsupportedBrand(FourCC(*b"3gp4")).into();
        assert_eq!(ErrorKind::classify(&err), ErrorKind::UnsupportedVariant);

        let err = anyhow::anyhow!("callback exploded");
        assert_eq!(ErrorKind::classify(&err), ErrorKind::MalformedStructure);
    }

    #[test]
    fn failure_keeps_context_chain() {
        let err = anyhow::Error::new(DecodeError::UnsupportedBitDepth(12)).context("lpcm");
        let failure = Failure::from(&err);
        assert_eq!(failure.kind, ErrorKind::UnsupportedVariant);
        assert_eq!(failure.message, "lpcm: Unsupported bit depth: 12");
    }

    struct Strict {
        fail_level: log::Level,
    }

    fn check(state: &Strict) -> anyhow::Result<()> {
        log_or_err!(
            state,
            log::Level::Warn,
            DemuxError::MissingChapterTrack(2)
        );
        Ok(())
    }

    #[test]
    fn log_or_err_honours_fail_level() {
        assert!(check(&Strict { fail_level: log::Level::Error }).is_ok());
        assert!(check(&Strict { fail_level: log::Level::Warn }).is_err());
    }
}
