use chrono::NaiveDateTime;
use std::path::{Component, Path};

/// Assigns a fixed date to every file below a folder with a given name.
///
/// The folder may sit at any depth of the file's path, not only directly
/// above it. The file name itself is never compared.
#[derive(Debug, Clone)]
pub struct FolderParser {
    folder_name: String,
    date: NaiveDateTime,
}

impl FolderParser {
    pub fn new(folder_name: impl Into<String>, date: NaiveDateTime) -> Self {
        Self {
            folder_name: folder_name.into(),
            date,
        }
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    pub fn date(&self) -> NaiveDateTime {
        self.date
    }

    pub fn parse(&self, path: &Path) -> Option<NaiveDateTime> {
        log::debug!("Trying {} folder name parser", self.folder_name);
        let wanted = self.folder_name.as_str();
        path.parent()?
            .components()
            .any(|c| matches!(c, Component::Normal(segment) if segment == wanted))
            .then_some(self.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn parser() -> FolderParser {
        let date = NaiveDate::from_ymd_opt(1998, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        FolderParser::new("Scans 1998", date)
    }

    #[test]
    fn matches_immediate_parent() {
        assert_eq!(
            parser().parse(Path::new("/photos/Scans 1998/img001.jpg")),
            Some(parser().date())
        );
    }

    #[test]
    fn matches_any_ancestor() {
        assert!(parser().parse(Path::new("/photos/Scans 1998/box 3/img001.jpg")).is_some());
    }

    #[test]
    fn relative_paths_match() {
        assert!(parser().parse(Path::new("Scans 1998/img001.jpg")).is_some());
    }

    #[test]
    fn partial_segment_does_not_match() {
        assert!(parser().parse(Path::new("/photos/Scans 1998 extra/img001.jpg")).is_none());
        assert!(parser().parse(Path::new("/photos/Scans/img001.jpg")).is_none());
    }

    #[test]
    fn file_name_is_not_a_folder() {
        assert!(parser().parse(Path::new("/photos/Scans 1998")).is_none());
    }

    #[test]
    fn comparison_is_case_sensitive() {
        assert!(parser().parse(Path::new("/photos/scans 1998/img001.jpg")).is_none());
    }
}
