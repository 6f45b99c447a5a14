//! Capture-date inference from file names and folders.
//!
//! A [`ParserChain`] holds an ordered list of [`DateParser`]s built from the
//! configuration. Parsers are tried in order and the first one that produces a
//! date wins, so specific patterns should be listed before generic ones.
//!
//! ```rust
//! use exif_date_from_filename::date::{DateParser, ParserChain, RegexParser};
//! use std::path::Path;
//!
//! let ios = RegexParser::new(
//!     "iOS export",
//!     r"(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2}) (?P<hour>\d{2})\.(?P<minute>\d{2})\.(?P<second>\d{2})",
//! )
//! .unwrap();
//! let chain = ParserChain::new(vec![DateParser::Regex(ios)]);
//!
//! let date = chain.resolve(Path::new("photos/2015-06-08 07.00.11.jpg")).unwrap();
//! assert_eq!(date.to_string(), "2015-06-08 07:00:11");
//! ```

mod folder;
mod pattern;

pub use folder::FolderParser;
pub use pattern::RegexParser;

use chrono::NaiveDateTime;
use std::path::Path;

/// A single date inference strategy.
#[derive(Debug, Clone)]
pub enum DateParser {
    /// Named-group regex over the file stem.
    Regex(RegexParser),
    /// Fixed date for every file below a folder with a given name.
    Folder(FolderParser),
}

impl DateParser {
    /// Infer a capture date for `path`, or `None` if this parser does not apply.
    pub fn parse(&self, path: &Path) -> Option<NaiveDateTime> {
        match self {
            Self::Regex(parser) => parser.parse(path),
            Self::Folder(parser) => parser.parse(path),
        }
    }

    /// Human-readable label used in logs.
    pub fn label(&self) -> &str {
        match self {
            Self::Regex(parser) => parser.name(),
            Self::Folder(parser) => parser.folder_name(),
        }
    }
}

impl From<RegexParser> for DateParser {
    fn from(parser: RegexParser) -> Self {
        Self::Regex(parser)
    }
}

impl From<FolderParser> for DateParser {
    fn from(parser: FolderParser) -> Self {
        Self::Folder(parser)
    }
}

/// Ordered list of parsers; the first match wins.
#[derive(Debug, Clone, Default)]
pub struct ParserChain {
    parsers: Vec<DateParser>,
}

impl ParserChain {
    pub fn new(parsers: Vec<DateParser>) -> Self {
        Self { parsers }
    }

    /// Run the parsers in order and return the first date produced.
    pub fn resolve(&self, path: &Path) -> Option<NaiveDateTime> {
        self.parsers.iter().find_map(|parser| parser.parse(path))
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DateParser> {
        self.parsers.iter()
    }
}

impl FromIterator<DateParser> for ParserChain {
    fn from_iter<I: IntoIterator<Item = DateParser>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
