//! Decides whether a file's capture date may be written.
//!
//! The tool only ever overwrites a `DateTimeOriginal` it wrote itself (known
//! by the [`ProcessedMarker`] next to it), and only when asked to. A date set
//! by a camera or another program is left alone unless the run is forced.

use chrono::NaiveDateTime;
use std::fmt;

use crate::exif::{ExifRecord, ProcessedMarker};

/// Per-invocation switches. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationDirectives {
    /// Report what would change without opening or writing any file.
    pub dry_run: bool,
    /// Rewrite timestamps this tool wrote in an earlier run.
    pub allow_update: bool,
    /// Write regardless of what the file already holds.
    pub force: bool,
}

impl Default for MutationDirectives {
    fn default() -> Self {
        Self {
            dry_run: true,
            allow_update: false,
            force: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteReason {
    Forced,
    Missing,
    OwnedUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Timestamp written by a camera or another program.
    ExternalTimestamp,
    /// Timestamp written by an earlier run; updates were not requested.
    OwnedTimestamp,
}

impl fmt::Display for WriteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Forced => "forced",
            Self::Missing => "no capture date",
            Self::OwnedUpdate => "updating own capture date",
        })
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ExternalTimestamp => "capture date set by another program",
            Self::OwnedTimestamp => "capture date already written",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    Write(WriteReason),
    Skip(SkipReason),
}

/// Apply the write rules in order: force, missing date, owned date with
/// updates allowed. Anything else is skipped. `dry_run` is not consulted.
pub fn decide(record: &ExifRecord, directives: &MutationDirectives) -> WriteDecision {
    if directives.force {
        return WriteDecision::Write(WriteReason::Forced);
    }
    if record.date_time_original().is_none() {
        return WriteDecision::Write(WriteReason::Missing);
    }
    match (&record.marker, directives.allow_update) {
        (Some(_), true) => WriteDecision::Write(WriteReason::OwnedUpdate),
        (Some(_), false) => WriteDecision::Skip(SkipReason::OwnedTimestamp),
        (None, _) => WriteDecision::Skip(SkipReason::ExternalTimestamp),
    }
}

/// Set the capture date and stamp the record with the current marker.
pub fn apply(record: &mut ExifRecord, date: NaiveDateTime) {
    record.set_date_time_original(date);
    record.marker = Some(ProcessedMarker::current());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::{TAG_DATE_TIME_ORIGINAL, TagEntry};
    use chrono::NaiveDate;

    fn wet(allow_update: bool, force: bool) -> MutationDirectives {
        MutationDirectives {
            dry_run: false,
            allow_update,
            force,
        }
    }

    fn with_date(marker: bool) -> ExifRecord {
        let mut record = ExifRecord::empty();
        record
            .photo
            .insert(TAG_DATE_TIME_ORIGINAL, TagEntry::ascii("2001:02:03 04:05:06"));
        if marker {
            record.marker = Some(ProcessedMarker::current());
        }
        record
    }

    #[test]
    fn default_is_dry_run() {
        let d = MutationDirectives::default();
        assert!(d.dry_run && !d.allow_update && !d.force);
    }

    // ── decide ───────────────────────────────────────────────────────

    #[test]
    fn missing_date_is_written() {
        assert_eq!(
            decide(&ExifRecord::empty(), &wet(false, false)),
            WriteDecision::Write(WriteReason::Missing)
        );
    }

    #[test]
    fn marker_without_date_counts_as_missing() {
        let mut record = ExifRecord::empty();
        record.marker = Some(ProcessedMarker::current());
        assert_eq!(
            decide(&record, &wet(false, false)),
            WriteDecision::Write(WriteReason::Missing)
        );
    }

    #[test]
    fn external_date_is_kept() {
        for allow_update in [false, true] {
            assert_eq!(
                decide(&with_date(false), &wet(allow_update, false)),
                WriteDecision::Skip(SkipReason::ExternalTimestamp)
            );
        }
    }

    #[test]
    fn own_date_needs_allow_update() {
        assert_eq!(
            decide(&with_date(true), &wet(false, false)),
            WriteDecision::Skip(SkipReason::OwnedTimestamp)
        );
        assert_eq!(
            decide(&with_date(true), &wet(true, false)),
            WriteDecision::Write(WriteReason::OwnedUpdate)
        );
    }

    #[test]
    fn force_overrides_everything() {
        for record in [ExifRecord::empty(), with_date(false), with_date(true)] {
            assert_eq!(
                decide(&record, &wet(false, true)),
                WriteDecision::Write(WriteReason::Forced)
            );
        }
    }

    // ── apply ────────────────────────────────────────────────────────

    #[test]
    fn apply_sets_date_and_marker() {
        let mut record = with_date(false);
        let date = NaiveDate::from_ymd_opt(2015, 6, 8).unwrap().and_hms_opt(7, 0, 11).unwrap();
        apply(&mut record, date);
        assert_eq!(
            record.date_time_original().and_then(|e| e.as_text()),
            Some("2015:06:08 07:00:11")
        );
        assert_eq!(record.marker, Some(ProcessedMarker::current()));
        assert_eq!(
            decide(&record, &wet(false, false)),
            WriteDecision::Skip(SkipReason::OwnedTimestamp)
        );
    }
}
