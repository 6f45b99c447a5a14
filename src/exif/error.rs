use thiserror::Error;

use super::container::ContainerKind;

/// Failures while reading or writing image metadata.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("not a recognized image container")]
    UnrecognizedContainer,

    #[error("cannot parse {kind} container: {reason}")]
    Container { kind: ContainerKind, reason: String },

    #[error("invalid TIFF header")]
    InvalidHeader,

    #[error("read of {len} bytes at offset {offset} is out of bounds")]
    OutOfBounds { offset: usize, len: usize },

    #[error("tag {tag:#06x} has {actual} value bytes, its format and count need {expected}")]
    InconsistentEntry {
        tag: u16,
        expected: usize,
        actual: usize,
    },

    #[error("unknown TIFF format {format} for tag {tag:#06x}")]
    UnknownFormat { tag: u16, format: u16 },

    #[error("directory has {0} entries, more than a TIFF IFD can hold")]
    TooManyEntries(usize),

    #[error("encoded metadata is {len} bytes, limit is {limit}")]
    TooLarge { len: usize, limit: usize },

    #[error("TIFF byte order does not match the record being written")]
    ByteOrderMismatch,
}
