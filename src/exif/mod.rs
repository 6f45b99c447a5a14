//! EXIF record model and codec.
//!
//! - [`ExifRecord`] holds every tag of an image as raw bytes, grouped by IFD.
//! - [`decode`] / [`encode`] convert between records and TIFF blobs.
//! - [`ImageContainer`] finds the blob inside JPEG, PNG, WebP and TIFF files
//!   and puts a new one back without touching the rest of the file.

mod container;
mod error;
mod record;
mod tiff;

pub use container::{ContainerKind, ImageContainer, JPEG_EXIF_LIMIT};
pub use error::CodecError;
pub use record::{
    ByteOrder, EXIF_DATETIME_FORMAT, ExifRecord, Ifd, IfdGroup, MARKER_PREFIX, ProcessedMarker,
    TAG_DATE_TIME_ORIGINAL, TAG_PROCESSED_MARKER, TagEntry,
};
pub use tiff::{decode, decode_or_empty, encode, encode_appended};
