//! # exif-date-from-filename
//!
//! Infer a photo's capture date from its file name (or a folder it sits in)
//! and write it into the image's EXIF `DateTimeOriginal`, without ever
//! overwriting a date set by the camera and without risking the file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exif_date_from_filename::config::Config;
//! use exif_date_from_filename::pipeline::{collect_images, process_images};
//! use exif_date_from_filename::policy::MutationDirectives;
//! use exif_date_from_filename::replace::AtomicReplacer;
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     // Parser chain from YAML
//!     let chain = Config::load_chain("config.yml".as_ref())?;
//!
//!     let images = collect_images(&[PathBuf::from("./photos")]);
//!     let directives = MutationDirectives {
//!         dry_run: false,
//!         ..MutationDirectives::default()
//!     };
//!
//!     let replacer = AtomicReplacer::default();
//!     let report = process_images(&images, &chain, &directives, &replacer, |path, outcome| {
//!         println!("{}: {outcome:?}", path.display());
//!     });
//!     for dir in &report.updated_dirs {
//!         println!("updated: {}", dir.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## How a file is handled
//!
//! 1. The [`date::ParserChain`] is tried on the path. No date, the file is
//!    never opened.
//! 2. The EXIF record is decoded ([`exif::ImageContainer`]). Missing or
//!    corrupt EXIF counts as empty.
//! 3. [`policy::decide`] allows the write if the date is missing, or if it
//!    was written by this tool and updates were requested, or if forced.
//! 4. The new date and a private marker tag (`0xFE69`) are encoded and the
//!    file is swapped atomically ([`replace::AtomicReplacer`]).
//!
//! ## Supported Formats
//!
//! | Format | EXIF location |
//! |--------|---------------|
//! | JPEG (`.jpg`, `.jpeg`) | APP1 segment |
//! | PNG (`.png`) | `eXIf` chunk |
//! | WebP (`.webp`) | `EXIF` chunk |
//! | TIFF (`.tif`, `.tiff`) | the file's own IFDs |
//!
//! ## Modules
//!
//! - [`config`]: YAML parser chain configuration
//! - [`date`]: filename and folder date parsers
//! - [`exif`]: EXIF record model and codec
//! - [`pipeline`]: image collection and per-file processing
//! - [`policy`]: write/skip rules
//! - [`replace`]: crash-safe file replacement

pub mod config;
pub mod date;
pub mod exif;
pub mod pipeline;
pub mod policy;
pub mod replace;
