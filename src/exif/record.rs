use chrono::NaiveDateTime;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// `DateTimeOriginal` in the Exif IFD.
pub const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
/// Private tag holding the [`ProcessedMarker`]. Not assigned by the EXIF standard.
pub const TAG_PROCESSED_MARKER: u16 = 0xFE69;
/// Fixed part of the processed marker; the version suffix is informational.
pub const MARKER_PREFIX: &str = "exif_date_from_filename";
/// EXIF date-time layout, one-second resolution.
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

pub(crate) const FORMAT_ASCII: u16 = 2;
pub(crate) const FORMAT_UNDEFINED: u16 = 7;

/// TIFF byte order of a record. Raw tag bytes are stored in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// `II`
    #[default]
    Little,
    /// `MM`
    Big,
}

/// A single IFD entry: TIFF format code, value count and the raw value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    pub format: u16,
    pub count: u32,
    pub data: Vec<u8>,
}

impl TagEntry {
    /// ASCII value with the trailing NUL the TIFF format requires.
    pub fn ascii(value: &str) -> Self {
        let mut data = value.as_bytes().to_vec();
        data.push(0);
        Self {
            format: FORMAT_ASCII,
            count: data.len() as u32,
            data,
        }
    }

    pub fn undefined(bytes: &[u8]) -> Self {
        Self {
            format: FORMAT_UNDEFINED,
            count: bytes.len() as u32,
            data: bytes.to_vec(),
        }
    }

    /// The value as text, without trailing NULs. `None` if it isn't valid ASCII.
    pub fn as_text(&self) -> Option<&str> {
        let text = std::str::from_utf8(&self.data).ok()?;
        let text = text.trim_end_matches('\0');
        text.is_ascii().then_some(text)
    }
}

/// Tags of one IFD, keyed and ordered by tag id.
pub type Ifd = BTreeMap<u16, TagEntry>;

/// The tag groups of an EXIF record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfdGroup {
    /// IFD0
    Primary,
    /// IFD1
    Thumbnail,
    /// Exif IFD
    Photo,
    Gps,
    Interop,
}

impl IfdGroup {
    pub const ALL: [IfdGroup; 5] = [
        IfdGroup::Primary,
        IfdGroup::Thumbnail,
        IfdGroup::Photo,
        IfdGroup::Gps,
        IfdGroup::Interop,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Thumbnail => "thumbnail",
            Self::Photo => "photo",
            Self::Gps => "gps",
            Self::Interop => "interop",
        }
    }
}

/// Receipt left in [`TAG_PROCESSED_MARKER`] when this tool writes the capture date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedMarker {
    text: String,
}

impl ProcessedMarker {
    /// Marker for the running version, e.g. `exif_date_from_filename_v0.1.0`.
    pub fn current() -> Self {
        Self {
            text: format!("{MARKER_PREFIX}_v{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Recognize a marker in a raw tag. Only the prefix is compared.
    pub fn from_entry(entry: &TagEntry) -> Option<Self> {
        let text = entry.as_text()?;
        text.starts_with(MARKER_PREFIX).then(|| Self {
            text: text.to_string(),
        })
    }

    pub fn to_entry(&self) -> TagEntry {
        TagEntry::undefined(self.text.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The version that wrote the marker, if it carries one.
    pub fn version(&self) -> Option<&str> {
        self.text
            .strip_prefix(MARKER_PREFIX)?
            .strip_prefix("_v")
            .filter(|v| !v.is_empty())
    }
}

/// Decoded EXIF metadata.
///
/// Structural tags (sub-IFD pointers, thumbnail offset and length) are not
/// kept as entries; the encoder regenerates them. Every other tag is held as
/// raw bytes and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifRecord {
    pub byte_order: ByteOrder,
    pub primary: Ifd,
    pub thumbnail: Ifd,
    pub photo: Ifd,
    pub gps: Ifd,
    pub interop: Ifd,
    /// Embedded JPEG thumbnail referenced from IFD1.
    pub thumbnail_data: Option<Vec<u8>>,
    pub marker: Option<ProcessedMarker>,
    /// Next-IFD offset found after IFD1, kept for in-place TIFF rewrites.
    pub(crate) continuation: u32,
}

impl ExifRecord {
    /// Empty skeleton: every group present, no tags.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn group(&self, group: IfdGroup) -> &Ifd {
        match group {
            IfdGroup::Primary => &self.primary,
            IfdGroup::Thumbnail => &self.thumbnail,
            IfdGroup::Photo => &self.photo,
            IfdGroup::Gps => &self.gps,
            IfdGroup::Interop => &self.interop,
        }
    }

    pub fn group_mut(&mut self, group: IfdGroup) -> &mut Ifd {
        match group {
            IfdGroup::Primary => &mut self.primary,
            IfdGroup::Thumbnail => &mut self.thumbnail,
            IfdGroup::Photo => &mut self.photo,
            IfdGroup::Gps => &mut self.gps,
            IfdGroup::Interop => &mut self.interop,
        }
    }

    pub fn is_empty(&self) -> bool {
        IfdGroup::ALL.iter().all(|g| self.group(*g).is_empty())
            && self.thumbnail_data.is_none()
            && self.marker.is_none()
    }

    pub fn date_time_original(&self) -> Option<&TagEntry> {
        self.photo.get(&TAG_DATE_TIME_ORIGINAL)
    }

    pub fn set_date_time_original(&mut self, date: NaiveDateTime) {
        let value = date.format(EXIF_DATETIME_FORMAT).to_string();
        self.photo
            .insert(TAG_DATE_TIME_ORIGINAL, TagEntry::ascii(&value));
    }

    /// Move a recognized marker out of the photo group into [`Self::marker`].
    /// A foreign value in the private slot stays an ordinary tag.
    pub(crate) fn lift_marker(&mut self) {
        let marker = self
            .photo
            .get(&TAG_PROCESSED_MARKER)
            .and_then(ProcessedMarker::from_entry);
        if let Some(marker) = marker {
            self.photo.remove(&TAG_PROCESSED_MARKER);
            self.marker = Some(marker);
        }
    }

    /// Photo group as it will be written, marker included.
    pub(crate) fn photo_entries(&self) -> Cow<'_, Ifd> {
        match &self.marker {
            Some(marker) => {
                let mut photo = self.photo.clone();
                photo.insert(TAG_PROCESSED_MARKER, marker.to_entry());
                Cow::Owned(photo)
            }
            None => Cow::Borrowed(&self.photo),
        }
    }
}
