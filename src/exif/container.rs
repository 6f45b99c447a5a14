use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::riff::{RiffChunk, RiffContent};
use img_parts::webp::{CHUNK_EXIF, CHUNK_VP8X, WebP};
use img_parts::{Bytes, ImageEXIF};
use std::fmt;

use super::error::CodecError;
use super::record::ExifRecord;
use super::tiff;

/// APP1 segment contents are capped at 65 533 bytes, 6 of which are `Exif\0\0`.
pub const JPEG_EXIF_LIMIT: usize = 65_527;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const TIFF_LE_MAGIC: &[u8] = b"II\x2A\x00";
const TIFF_BE_MAGIC: &[u8] = b"MM\x00\x2A";
const EXIF_SEGMENT_PREFIX: &[u8] = b"Exif\0\0";
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const VP8X_EXIF_FLAG: u8 = 0x08;

/// Image container formats that can carry EXIF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Jpeg,
    Png,
    WebP,
    Tiff,
}

impl ContainerKind {
    /// Identify a container from its leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(JPEG_MAGIC) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(PNG_MAGIC) {
            Some(Self::Png)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::WebP)
        } else if bytes.starts_with(TIFF_LE_MAGIC) || bytes.starts_with(TIFF_BE_MAGIC) {
            Some(Self::Tiff)
        } else {
            None
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::WebP => "WebP",
            Self::Tiff => "TIFF",
        })
    }
}

/// A parsed image whose EXIF block can be read and replaced.
///
/// JPEG, PNG and WebP go through `img-parts`, which keeps every other
/// segment or chunk untouched. A TIFF file is its own EXIF structure, so it
/// is rewritten with [`tiff::encode_appended`].
pub enum ImageContainer {
    Jpeg(Jpeg),
    Png(Png),
    WebP(WebP),
    Tiff {
        original: Vec<u8>,
        record: ExifRecord,
    },
}

impl ImageContainer {
    pub fn open(bytes: Vec<u8>) -> Result<Self, CodecError> {
        let kind = ContainerKind::sniff(&bytes).ok_or(CodecError::UnrecognizedContainer)?;
        let container_err = |e: img_parts::Error| CodecError::Container {
            kind,
            reason: e.to_string(),
        };

        Ok(match kind {
            ContainerKind::Jpeg => {
                Self::Jpeg(Jpeg::from_bytes(Bytes::from(bytes)).map_err(container_err)?)
            }
            ContainerKind::Png => {
                Self::Png(Png::from_bytes(Bytes::from(bytes)).map_err(container_err)?)
            }
            ContainerKind::WebP => {
                Self::WebP(WebP::from_bytes(Bytes::from(bytes)).map_err(container_err)?)
            }
            ContainerKind::Tiff => {
                let record = tiff::decode(&bytes).map_err(|e| CodecError::Container {
                    kind,
                    reason: e.to_string(),
                })?;
                Self::Tiff {
                    original: bytes,
                    record,
                }
            }
        })
    }

    pub fn kind(&self) -> ContainerKind {
        match self {
            Self::Jpeg(_) => ContainerKind::Jpeg,
            Self::Png(_) => ContainerKind::Png,
            Self::WebP(_) => ContainerKind::WebP,
            Self::Tiff { .. } => ContainerKind::Tiff,
        }
    }

    /// The embedded record, or an empty skeleton if there is none or it is corrupt.
    pub fn read_record(&self) -> ExifRecord {
        match self {
            Self::Jpeg(jpeg) => tiff::decode_or_empty(jpeg.exif().as_deref()),
            Self::Png(png) => tiff::decode_or_empty(png.exif().as_deref()),
            Self::WebP(webp) => tiff::decode_or_empty(webp_exif_chunk(webp)),
            Self::Tiff { record, .. } => record.clone(),
        }
    }

    /// Encode `record` and return the full file with it embedded.
    pub fn into_bytes_with(self, record: &ExifRecord) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Jpeg(mut jpeg) => {
                let blob = tiff::encode(record)?;
                if blob.len() > JPEG_EXIF_LIMIT {
                    return Err(CodecError::TooLarge {
                        len: blob.len(),
                        limit: JPEG_EXIF_LIMIT,
                    });
                }
                let target = exif_segment_target(&jpeg);
                jpeg.set_exif(Some(Bytes::from(blob)));
                move_exif_segment(&mut jpeg, target);
                Ok(jpeg.encoder().bytes().to_vec())
            }
            Self::Png(mut png) => {
                png.set_exif(Some(Bytes::from(tiff::encode(record)?)));
                Ok(png.encoder().bytes().to_vec())
            }
            Self::WebP(mut webp) => {
                set_webp_exif_chunk(&mut webp, Bytes::from(tiff::encode(record)?));
                Ok(webp.encoder().bytes().to_vec())
            }
            Self::Tiff { original, .. } => tiff::encode_appended(record, &original),
        }
    }
}

/// Raw content of the WebP `EXIF` chunk. Usually bare TIFF, though some
/// writers put `Exif\0\0` in front; [`tiff::decode`] accepts both.
fn webp_exif_chunk(webp: &WebP) -> Option<&[u8]> {
    webp.chunk_by_id(CHUNK_EXIF)?
        .content()
        .data()
        .map(|data| &data[..])
}

/// Store `blob` as bare TIFF in the `EXIF` chunk.
///
/// `set_exif` takes care of the VP8X upgrade but prefixes the data with
/// `Exif\0\0`, and leaves the flags of an existing VP8X chunk alone.
fn set_webp_exif_chunk(webp: &mut WebP, blob: Bytes) {
    webp.set_exif(Some(blob.clone()));
    for chunk in webp.chunks_mut() {
        match chunk.id() {
            CHUNK_EXIF => *chunk = RiffChunk::new(CHUNK_EXIF, RiffContent::Data(blob.clone())),
            CHUNK_VP8X => set_vp8x_exif_flag(chunk),
            _ => {}
        }
    }
}

fn set_vp8x_exif_flag(chunk: &mut RiffChunk) {
    let RiffContent::Data(data) = chunk.content() else {
        return;
    };
    let Some((&flags, rest)) = data.split_first() else {
        return;
    };
    if flags & VP8X_EXIF_FLAG == 0 {
        let mut content = Vec::with_capacity(data.len());
        content.push(flags | VP8X_EXIF_FLAG);
        content.extend_from_slice(rest);
        *chunk.content_mut() = RiffContent::Data(Bytes::from(content));
    }
}

fn find_exif_segment_pos(jpeg: &Jpeg) -> Option<usize> {
    jpeg.segments()
        .iter()
        .position(|s| s.marker() == APP1 && s.contents().starts_with(EXIF_SEGMENT_PREFIX))
}

/// Where the EXIF segment belongs: where the old one was, or right after APP0.
fn exif_segment_target(jpeg: &Jpeg) -> usize {
    find_exif_segment_pos(jpeg).unwrap_or_else(|| {
        let has_app0 = jpeg.segments().first().is_some_and(|s| s.marker() == APP0);
        usize::from(has_app0)
    })
}

/// `set_exif` always inserts at a fixed index; move the segment to `target`.
fn move_exif_segment(jpeg: &mut Jpeg, target: usize) {
    let Some(pos) = find_exif_segment_pos(jpeg) else {
        return;
    };
    if pos != target {
        let segments = jpeg.segments_mut();
        let segment = segments.remove(pos);
        let target = target.min(segments.len());
        segments.insert(target, segment);
    }
}
