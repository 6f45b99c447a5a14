//! TIFF/IFD serialization of [`ExifRecord`]s.
//!
//! The decoder walks IFD0, the Exif, GPS and Interop sub-IFDs and IFD1
//! (thumbnail), keeping every tag as raw bytes. The encoder lays the record
//! out again: child IFDs first, each IFD followed by its out-of-line values,
//! everything word aligned. Tags the caller did not touch come out with
//! byte-identical values.

use std::collections::BTreeMap;

use super::error::CodecError;
use super::record::{ByteOrder, ExifRecord, Ifd, TagEntry};

const TIFF_MAGIC: u16 = 42;
const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const ENTRY_SIZE: usize = 12;

const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_GPS_IFD: u16 = 0x8825;
const TAG_INTEROP_IFD: u16 = 0xA005;
const TAG_THUMBNAIL_OFFSET: u16 = 0x0201;
const TAG_THUMBNAIL_LENGTH: u16 = 0x0202;

const FORMAT_SHORT: u16 = 3;
const FORMAT_LONG: u16 = 4;
const FORMAT_IFD: u16 = 13;

/// Bytes per value for a TIFF format code.
fn format_size(format: u16) -> Option<usize> {
    match format {
        1 | 2 | 6 | 7 => Some(1), // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => Some(2),         // SHORT, SSHORT
        4 | 9 | 11 | 13 => Some(4), // LONG, SLONG, FLOAT, IFD
        5 | 10 | 12 => Some(8),   // RATIONAL, SRATIONAL, DOUBLE
        _ => None,
    }
}

impl ByteOrder {
    fn header(self) -> [u8; 4] {
        match self {
            Self::Little => *b"II\x2A\x00",
            Self::Big => *b"MM\x00\x2A",
        }
    }

    fn read_u16(self, b: [u8; 2]) -> u16 {
        match self {
            Self::Little => u16::from_le_bytes(b),
            Self::Big => u16::from_be_bytes(b),
        }
    }

    fn read_u32(self, b: [u8; 4]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes(b),
            Self::Big => u32::from_be_bytes(b),
        }
    }

    fn encode_u16(self, v: u16) -> [u8; 2] {
        match self {
            Self::Little => v.to_le_bytes(),
            Self::Big => v.to_be_bytes(),
        }
    }

    fn encode_u32(self, v: u32) -> [u8; 4] {
        match self {
            Self::Little => v.to_le_bytes(),
            Self::Big => v.to_be_bytes(),
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

struct RawIfd {
    entries: Ifd,
    next: u32,
}

/// Bounds-checked view over a TIFF blob.
struct Reader<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> Reader<'a> {
    fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], CodecError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(CodecError::OutOfBounds { offset, len })
    }

    fn u16(&self, offset: usize) -> Result<u16, CodecError> {
        let b = self.bytes(offset, 2)?;
        Ok(self.order.read_u16([b[0], b[1]]))
    }

    fn u32(&self, offset: usize) -> Result<u32, CodecError> {
        let b = self.bytes(offset, 4)?;
        Ok(self.order.read_u32([b[0], b[1], b[2], b[3]]))
    }

    fn ifd(&self, offset: usize) -> Result<RawIfd, CodecError> {
        let count = self.u16(offset)? as usize;
        let table = offset + 2;
        // Whole table plus next pointer must be present
        self.bytes(table, count * ENTRY_SIZE + 4)?;

        let mut entries = Ifd::new();
        for i in 0..count {
            let at = table + i * ENTRY_SIZE;
            let tag = self.u16(at)?;
            let format = self.u16(at + 2)?;
            let count = self.u32(at + 4)?;
            match self.value(at, tag, format, count) {
                Ok(data) => {
                    let entry = TagEntry {
                        format,
                        count,
                        data: data.to_vec(),
                    };
                    if entries.insert(tag, entry).is_some() {
                        log::debug!("Duplicate tag {tag:#06x}, keeping the last one");
                    }
                }
                Err(e) => log::debug!("Dropping tag {tag:#06x}: {e}"),
            }
        }

        let next = self.u32(table + count * ENTRY_SIZE)?;
        Ok(RawIfd { entries, next })
    }

    fn value(&self, at: usize, tag: u16, format: u16, count: u32) -> Result<&'a [u8], CodecError> {
        let size = format_size(format).ok_or(CodecError::UnknownFormat { tag, format })?;
        let len = size
            .checked_mul(count as usize)
            .ok_or(CodecError::OutOfBounds { offset: at, len: usize::MAX })?;
        if len <= 4 {
            self.bytes(at + 8, len)
        } else {
            let offset = self.u32(at + 8)? as usize;
            self.bytes(offset, len)
        }
    }
}

/// SHORT or LONG scalar value.
fn scalar(entry: &TagEntry, order: ByteOrder) -> Option<u32> {
    match (entry.format, entry.data.as_slice()) {
        (FORMAT_SHORT, [a, b]) => Some(order.read_u16([*a, *b]) as u32),
        (FORMAT_LONG, [a, b, c, d]) => Some(order.read_u32([*a, *b, *c, *d])),
        _ => None,
    }
}

/// Remove a sub-IFD pointer tag and return the offset it points to.
fn take_pointer(entries: &mut Ifd, tag: u16, order: ByteOrder) -> Option<usize> {
    let entry = entries.remove(&tag)?;
    let offset = match (entry.format, entry.data.as_slice()) {
        (FORMAT_LONG | FORMAT_IFD, [a, b, c, d]) => order.read_u32([*a, *b, *c, *d]),
        _ => {
            log::debug!("Ignoring malformed pointer tag {tag:#06x}");
            return None;
        }
    };
    (offset != 0).then_some(offset as usize)
}

/// Remove the thumbnail offset/length pair and return the bytes they frame.
fn take_thumbnail(reader: &Reader, entries: &mut Ifd) -> Option<Vec<u8>> {
    let offset = entries
        .get(&TAG_THUMBNAIL_OFFSET)
        .and_then(|e| scalar(e, reader.order));
    let length = entries
        .get(&TAG_THUMBNAIL_LENGTH)
        .and_then(|e| scalar(e, reader.order));
    let (Some(offset), Some(length)) = (offset, length) else {
        return None;
    };

    entries.remove(&TAG_THUMBNAIL_OFFSET);
    entries.remove(&TAG_THUMBNAIL_LENGTH);
    match reader.bytes(offset as usize, length as usize) {
        Ok(bytes) => Some(bytes.to_vec()),
        Err(e) => {
            log::debug!("Dropping thumbnail: {e}");
            None
        }
    }
}

/// A sub-IFD that cannot be read is left empty; the rest of the record stays.
fn sub_ifd(reader: &Reader, offset: usize, name: &str) -> Option<RawIfd> {
    match reader.ifd(offset) {
        Ok(ifd) => Some(ifd),
        Err(e) => {
            log::debug!("Ignoring unreadable {name} IFD: {e}");
            None
        }
    }
}

/// Parse a TIFF-structured EXIF blob. A leading `Exif\0\0` is accepted.
///
/// Fails on a bad header or an IFD0 table that runs out of the blob. Single
/// entries whose values are unreadable are dropped, as are unreadable
/// Exif, GPS, Interop and IFD1 tables.
pub fn decode(blob: &[u8]) -> Result<ExifRecord, CodecError> {
    let data = blob.strip_prefix(EXIF_PREFIX).unwrap_or(blob);
    let order = match data.get(..2) {
        Some(b"II") => ByteOrder::Little,
        Some(b"MM") => ByteOrder::Big,
        _ => return Err(CodecError::InvalidHeader),
    };

    let reader = Reader { data, order };
    if reader.u16(2)? != TIFF_MAGIC {
        return Err(CodecError::InvalidHeader);
    }

    let mut ifd0 = reader.ifd(reader.u32(4)? as usize)?;
    let mut record = ExifRecord {
        byte_order: order,
        ..ExifRecord::default()
    };

    if let Some(offset) = take_pointer(&mut ifd0.entries, TAG_EXIF_IFD, order) {
        if let Some(mut exif) = sub_ifd(&reader, offset, "Exif") {
            if let Some(offset) = take_pointer(&mut exif.entries, TAG_INTEROP_IFD, order) {
                record.interop = sub_ifd(&reader, offset, "Interop")
                    .map(|ifd| ifd.entries)
                    .unwrap_or_default();
            }
            record.photo = exif.entries;
        }
    }

    if let Some(offset) = take_pointer(&mut ifd0.entries, TAG_GPS_IFD, order) {
        record.gps = sub_ifd(&reader, offset, "GPS")
            .map(|ifd| ifd.entries)
            .unwrap_or_default();
    }

    if ifd0.next != 0 {
        match reader.ifd(ifd0.next as usize) {
            Ok(mut ifd1) => {
                record.thumbnail_data = take_thumbnail(&reader, &mut ifd1.entries);
                record.thumbnail = ifd1.entries;
                record.continuation = ifd1.next;
            }
            Err(e) => log::debug!("Ignoring unreadable IFD1: {e}"),
        }
    }

    record.primary = ifd0.entries;
    record.lift_marker();
    Ok(record)
}

/// Like [`decode`], but a missing or corrupt blob yields an empty record.
pub fn decode_or_empty(blob: Option<&[u8]>) -> ExifRecord {
    let Some(blob) = blob.filter(|b| !b.is_empty()) else {
        return ExifRecord::empty();
    };
    match decode(blob) {
        Ok(record) => record,
        Err(e) => {
            log::debug!("Discarding unreadable EXIF data: {e}");
            ExifRecord::empty()
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

fn offset_u32(n: usize) -> Result<u32, CodecError> {
    u32::try_from(n).map_err(|_| CodecError::TooLarge {
        len: n,
        limit: u32::MAX as usize,
    })
}

struct Writer {
    buf: Vec<u8>,
    order: ByteOrder,
}

impl Writer {
    fn align(&mut self) {
        if self.buf.len() % 2 == 1 {
            self.buf.push(0);
        }
    }

    fn put_u16(&mut self, v: u16) {
        let b = self.order.encode_u16(v);
        self.buf.extend_from_slice(&b);
    }

    fn put_u32(&mut self, v: u32) {
        let b = self.order.encode_u32(v);
        self.buf.extend_from_slice(&b);
    }

    fn patch_u32(&mut self, at: usize, v: u32) {
        let b = self.order.encode_u32(v);
        self.buf[at..at + 4].copy_from_slice(&b);
    }

    fn blob(&mut self, data: &[u8]) -> Result<u32, CodecError> {
        self.align();
        let at = offset_u32(self.buf.len())?;
        self.buf.extend_from_slice(data);
        Ok(at)
    }

    /// Write one IFD plus its value area. `generated` are LONG entries the
    /// encoder owns (pointers, thumbnail length); they win over `entries`.
    fn ifd(
        &mut self,
        entries: &Ifd,
        generated: &[(u16, u32)],
        next: u32,
    ) -> Result<u32, CodecError> {
        let generated: Vec<(u16, TagEntry)> = generated
            .iter()
            .map(|&(tag, value)| {
                let entry = TagEntry {
                    format: FORMAT_LONG,
                    count: 1,
                    data: self.order.encode_u32(value).to_vec(),
                };
                (tag, entry)
            })
            .collect();
        let mut merged: BTreeMap<u16, &TagEntry> = entries.iter().map(|(t, e)| (*t, e)).collect();
        for (tag, entry) in &generated {
            merged.insert(*tag, entry);
        }
        let count = u16::try_from(merged.len())
            .map_err(|_| CodecError::TooManyEntries(merged.len()))?;

        self.align();
        let start = self.buf.len();
        let data_start = start + 2 + merged.len() * ENTRY_SIZE + 4;
        let mut values: Vec<u8> = Vec::new();

        self.put_u16(count);
        for (&tag, entry) in &merged {
            let expected = format_size(entry.format)
                .ok_or(CodecError::UnknownFormat { tag, format: entry.format })?
                .checked_mul(entry.count as usize);
            if expected != Some(entry.data.len()) {
                return Err(CodecError::InconsistentEntry {
                    tag,
                    expected: expected.unwrap_or(usize::MAX),
                    actual: entry.data.len(),
                });
            }

            self.put_u16(tag);
            self.put_u16(entry.format);
            self.put_u32(entry.count);
            if entry.data.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..entry.data.len()].copy_from_slice(&entry.data);
                self.buf.extend_from_slice(&inline);
            } else {
                self.put_u32(offset_u32(data_start + values.len())?);
                values.extend_from_slice(&entry.data);
                if values.len() % 2 == 1 {
                    values.push(0);
                }
            }
        }
        self.put_u32(next);
        self.buf.extend_from_slice(&values);

        offset_u32(start)
    }

    /// Write every group of `record`, children before parents. Returns the
    /// offset of IFD0.
    fn record(&mut self, record: &ExifRecord, continuation: u32) -> Result<u32, CodecError> {
        let interop = if record.interop.is_empty() {
            None
        } else {
            Some(self.ifd(&record.interop, &[], 0)?)
        };

        let photo = record.photo_entries();
        let photo_pointers: Vec<(u16, u32)> =
            interop.map(|o| (TAG_INTEROP_IFD, o)).into_iter().collect();
        let exif = if photo.is_empty() && photo_pointers.is_empty() {
            None
        } else {
            Some(self.ifd(&photo, &photo_pointers, 0)?)
        };

        let gps = if record.gps.is_empty() {
            None
        } else {
            Some(self.ifd(&record.gps, &[], 0)?)
        };

        let thumbnail = if record.thumbnail.is_empty() && record.thumbnail_data.is_none() {
            None
        } else {
            let mut generated = Vec::new();
            if let Some(data) = &record.thumbnail_data {
                let offset = self.blob(data)?;
                generated.push((TAG_THUMBNAIL_OFFSET, offset));
                generated.push((TAG_THUMBNAIL_LENGTH, offset_u32(data.len())?));
            }
            Some(self.ifd(&record.thumbnail, &generated, continuation)?)
        };

        let mut pointers = Vec::new();
        if let Some(offset) = exif {
            pointers.push((TAG_EXIF_IFD, offset));
        }
        if let Some(offset) = gps {
            pointers.push((TAG_GPS_IFD, offset));
        }
        self.ifd(&record.primary, &pointers, thumbnail.unwrap_or(0))
    }
}

/// Serialize a record as a standalone TIFF blob (no `Exif\0\0` prefix).
pub fn encode(record: &ExifRecord) -> Result<Vec<u8>, CodecError> {
    let mut writer = Writer {
        buf: Vec::with_capacity(1024),
        order: record.byte_order,
    };
    writer.buf.extend_from_slice(&record.byte_order.header());
    writer.put_u32(0);
    let ifd0 = writer.record(record, 0)?;
    writer.patch_u32(4, ifd0);
    Ok(writer.buf)
}

/// Rewrite a TIFF file in place: the original bytes are kept and the record's
/// IFDs appended, then the header is pointed at the new IFD0. Strip and tile
/// offsets in the original keep pointing at valid image data.
pub fn encode_appended(record: &ExifRecord, original: &[u8]) -> Result<Vec<u8>, CodecError> {
    if original.len() < 8 {
        return Err(CodecError::InvalidHeader);
    }
    if original[..4] != record.byte_order.header() {
        return Err(CodecError::ByteOrderMismatch);
    }

    let mut writer = Writer {
        buf: original.to_vec(),
        order: record.byte_order,
    };
    let ifd0 = writer.record(record, record.continuation)?;
    writer.patch_u32(4, ifd0);
    Ok(writer.buf)
}
