use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::date::{DateParser, FolderParser, ParserChain, RegexParser};

/// The parser chain as written in the YAML config file.
///
/// The file is a top-level list, tried in order:
///
/// ```yaml
/// - parser: filename_regex
///   name: iOS export
///   regex: '(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2}) (?P<hour>\d{2})\.(?P<minute>\d{2})\.(?P<second>\d{2})'
/// - parser: folder
///   folder_name: Scans 1998
///   date: 1998-06-01
/// ```
///
/// # Loading
///
/// ```rust,no_run
/// use exif_date_from_filename::config::Config;
///
/// let chain = Config::load_chain("config.yml".as_ref()).unwrap();
/// println!("{} parsers", chain.len());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    pub parsers: Vec<ParserEntry>,
}

/// One entry of the config list, selected by its `parser` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "parser", rename_all = "snake_case")]
pub enum ParserEntry {
    /// See [`RegexParser`].
    FilenameRegex { name: String, regex: String },
    /// See [`FolderParser`].
    Folder {
        folder_name: String,
        #[serde(with = "config_date")]
        date: chrono::NaiveDateTime,
    },
}

impl ParserEntry {
    pub fn build(&self) -> Result<DateParser> {
        Ok(match self {
            Self::FilenameRegex { name, regex } => RegexParser::new(name.clone(), regex)?.into(),
            Self::Folder { folder_name, date } => {
                FolderParser::new(folder_name.clone(), *date).into()
            }
        })
    }
}

const IOS_EXPORT: &str = r"(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2}) (?P<hour>\d{2})\.(?P<minute>\d{2})\.(?P<second>\d{2})";
const ANDROID_CAMERA: &str = r"(?:IMG|PXL|VID)_(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})_(?P<hour>\d{2})(?P<minute>\d{2})(?P<second>\d{2})(?P<millisecond>\d{3})?";
const SCREENSHOT: &str = r"Screenshot_(?P<year>\d{4})-?(?P<month>\d{2})-?(?P<day>\d{2})[-_](?P<hour>\d{2})-?(?P<minute>\d{2})-?(?P<second>\d{2})";
const WHATSAPP: &str = r"IMG-(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})-WA\d+";

impl Default for Config {
    /// A sample chain for common phone naming schemes.
    fn default() -> Self {
        let regex = |name: &str, regex: &str| ParserEntry::FilenameRegex {
            name: name.to_string(),
            regex: regex.to_string(),
        };
        Self {
            parsers: vec![
                regex("iOS export", IOS_EXPORT),
                regex("Android camera", ANDROID_CAMERA),
                regex("Screenshot", SCREENSHOT),
                regex("WhatsApp", WHATSAPP),
            ],
        }
    }
}

impl Config {
    /// Read and parse the config file. Regexes are not compiled yet.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load the config and compile its chain. Every failure is returned as an
    /// error; there is no fallback to defaults.
    pub fn load_chain(path: &Path) -> Result<ParserChain> {
        Self::load(path)?
            .build_chain()
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    /// Write the config to `path`. Refuses to overwrite an existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file {} already exists", path.display());
        }
        std::fs::write(path, self.to_yaml()?)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Compile every entry, in file order.
    pub fn build_chain(&self) -> Result<ParserChain> {
        self.parsers
            .iter()
            .enumerate()
            .map(|(i, entry)| entry.build().with_context(|| format!("Invalid parser #{}", i + 1)))
            .collect()
    }
}

/// Folder dates: `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`
/// or the EXIF form `YYYY:MM:DD HH:MM:SS`.
mod config_date {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer, de};

    const WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y:%m:%d %H:%M:%S",
    ];

    pub fn parse(s: &str) -> Option<NaiveDateTime> {
        let s = s.trim();
        DATETIME_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }

    pub fn serialize<S: Serializer>(
        date: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(WRITE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| de::Error::custom(format!("invalid date '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    // ── parsing ──────────────────────────────────────────────────────

    #[test]
    fn parses_both_parser_kinds() {
        let yaml = r#"
- parser: filename_regex
  name: iOS
  regex: '(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})'
- parser: folder
  folder_name: Scans 1998
  date: 1998-06-01
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.parsers.len(), 2);
        match &config.parsers[1] {
            ParserEntry::Folder { folder_name, date } => {
                assert_eq!(folder_name, "Scans 1998");
                assert_eq!(date.to_string(), "1998-06-01 00:00:00");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(config.build_chain().unwrap().len(), 2);
    }

    #[test]
    fn folder_date_formats() {
        for (input, expected) in [
            ("2020-01-02", "2020-01-02 00:00:00"),
            ("2020-01-02 03:04:05", "2020-01-02 03:04:05"),
            ("2020-01-02T03:04:05", "2020-01-02 03:04:05"),
            ("2020:01:02 03:04:05", "2020-01-02 03:04:05"),
        ] {
            assert_eq!(config_date::parse(input).unwrap().to_string(), expected, "{input}");
        }
        assert!(config_date::parse("2020-13-01").is_none());
        assert!(config_date::parse("yesterday").is_none());
    }

    #[test]
    fn rejects_unknown_parser() {
        let yaml = "- parser: exif_guess\n  name: x\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn rejects_bad_folder_date() {
        let yaml = "- parser: folder\n  folder_name: x\n  date: someday\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn rejects_missing_field() {
        assert!(Config::from_yaml("- parser: filename_regex\n  name: x\n").is_err());
    }

    #[test]
    fn build_chain_reports_bad_regex_position() {
        let config = Config {
            parsers: vec![
                ParserEntry::FilenameRegex {
                    name: "ok".into(),
                    regex: r"(?P<year>\d{4})(?P<month>\d{2})(?P<day>\d{2})".into(),
                },
                ParserEntry::FilenameRegex {
                    name: "no day".into(),
                    regex: r"(?P<year>\d{4})(?P<month>\d{2})".into(),
                },
            ],
        };
        let err = config.build_chain().unwrap_err();
        assert!(err.to_string().contains("#2"), "{err}");
    }

    // ── default sample ───────────────────────────────────────────────

    #[test]
    fn default_chain_compiles() {
        let chain = Config::default().build_chain().unwrap();
        assert_eq!(chain.len(), 4);
    }

    #[test]
    fn default_chain_recognizes_common_names() {
        let chain = Config::default().build_chain().unwrap();
        for (name, expected) in [
            ("2015-06-08 07.00.11.jpg", "2015-06-08 07:00:11"),
            ("IMG_20190412_181530.jpg", "2019-04-12 18:15:30"),
            ("PXL_20230101_123456789.jpg", "2023-01-01 12:34:56.789"),
            ("Screenshot_20200102-030405.png", "2020-01-02 03:04:05"),
            ("Screenshot_2020-01-02-03-04-05.png", "2020-01-02 03:04:05"),
            ("IMG-20200131-WA0001.jpg", "2020-01-31 00:00:00"),
        ] {
            let date = chain.resolve(&PathBuf::from(name)).unwrap_or_else(|| panic!("{name}"));
            assert_eq!(date.to_string(), expected, "{name}");
        }
        assert!(chain.resolve(&PathBuf::from("holiday.jpg")).is_none());
    }

    // ── load/save ────────────────────────────────────────────────────

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        let mut config = Config::default();
        config.parsers.push(ParserEntry::Folder {
            folder_name: "Scans".into(),
            date: config_date::parse("1998-06-01 12:00:00").unwrap(),
        });

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn save_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "keep me").unwrap();
        assert!(Config::default().save(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(&dir.path().join("absent.yml")).unwrap_err();
        assert!(err.to_string().contains("absent.yml"));
    }

    #[test]
    fn load_chain_compiles_saved_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        Config::default().save(&path).unwrap();
        assert_eq!(Config::load_chain(&path).unwrap().len(), 4);
    }

    #[test]
    fn load_chain_rejects_bad_regex() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        let yaml = "- parser: filename_regex\n  name: broken\n  regex: '(?P<year>'\n";
        std::fs::write(&path, yaml).unwrap();

        // Parsing alone does not compile regexes
        assert_eq!(Config::load(&path).unwrap().parsers.len(), 1);
        let err = Config::load_chain(&path).unwrap_err();
        assert!(format!("{err:#}").contains("#1"), "{err:#}");
    }
}
