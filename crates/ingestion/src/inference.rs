//! Field inference
//!
//! Derives paper fields from the metadata title and exam date using the
//! institution's subject-code conventions, e.g. `BBA3CJ201`:
//! department prefix `BBA`, semester `3`, subject-type code `CJ`.
//!
//! Inference is lenient: anything that does not fit the convention falls
//! back to a default instead of failing the row.

use crate::locator::LocatedDocuments;
use crate::metadata::MetadataRow;
use chrono::Datelike;
use papervault_common::config::ImportConfig;
use regex_lite::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

static YEAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").expect("valid regex"));

static SUBJECT_TYPE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Z]{2})\d{3}").expect("valid regex"));

/// A metadata row joined with its document and the inferred fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPaper {
    pub code: String,
    pub exam_date: String,
    pub subject_code: String,
    pub subject_name: String,
    pub semester: i32,
    pub year: i32,
    pub subject_type_code: String,
    pub department_prefix: String,
    /// Present only when a document carrying exactly `code` was found
    pub document_path: Option<PathBuf>,
}

impl ParsedPaper {
    /// Label used for this paper in progress events and the summary
    pub fn label(&self) -> String {
        format!("{} - {}", self.code, self.subject_name)
    }
}

/// Institution-specific naming conventions
#[derive(Debug, Clone)]
pub struct Conventions {
    departments: BTreeMap<String, String>,
    subject_types: BTreeMap<String, String>,
    default_subject_type_code: String,
    fallback_subject_type: String,
}

impl Conventions {
    pub fn from_config(config: &ImportConfig) -> Self {
        // Keys are matched against upper-case codes; config sources may lower-case them.
        let upper = |map: &BTreeMap<String, String>| {
            map.iter()
                .map(|(k, v)| (k.to_ascii_uppercase(), v.clone()))
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            departments: upper(&config.departments),
            subject_types: upper(&config.subject_types),
            default_subject_type_code: config.default_subject_type_code.clone(),
            fallback_subject_type: config.fallback_subject_type.clone(),
        }
    }

    /// Department name for a subject-code prefix, if the prefix is known
    pub fn department_name(&self, prefix: &str) -> Option<&str> {
        self.departments.get(prefix).map(String::as_str)
    }

    /// Subject type name for a type code; unknown codes get the fallback
    pub fn subject_type_name(&self, type_code: &str) -> &str {
        self.subject_types
            .get(type_code)
            .unwrap_or(&self.fallback_subject_type)
    }

    pub fn default_subject_type_code(&self) -> &str {
        &self.default_subject_type_code
    }
}

impl Default for Conventions {
    fn default() -> Self {
        Self::from_config(&ImportConfig::default())
    }
}

/// Join a metadata row with its document and derive the remaining fields
pub fn infer(row: &MetadataRow, documents: &LocatedDocuments, conventions: &Conventions) -> ParsedPaper {
    let (subject_code, subject_name) = split_title(&row.title);

    ParsedPaper {
        code: row.code.clone(),
        exam_date: row.exam_date.clone(),
        semester: extract_semester(&subject_code),
        year: extract_year(&row.exam_date),
        subject_type_code: subject_type_code(&subject_code, conventions.default_subject_type_code()),
        department_prefix: department_prefix(&subject_code).to_string(),
        document_path: documents.get(&row.code).cloned(),
        subject_code,
        subject_name,
    }
}

/// Split `"CODE - Name"` on the first separator. Without one, the whole
/// title serves as both code and name.
pub fn split_title(title: &str) -> (String, String) {
    match title.split_once(" - ") {
        Some((code, name)) => (code.trim().to_string(), name.trim().to_string()),
        None => (title.trim().to_string(), title.trim().to_string()),
    }
}

/// First decimal digit anywhere in the code, default 1
pub fn extract_semester(subject_code: &str) -> i32 {
    subject_code
        .chars()
        .find_map(|c| c.to_digit(10))
        .map(|d| d as i32)
        .unwrap_or(1)
}

/// First four-digit run in the exam date, default the current year
pub fn extract_year(exam_date: &str) -> i32 {
    YEAR_PATTERN
        .find(exam_date)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or_else(|| chrono::Utc::now().year())
}

/// Leading run of upper-case ASCII letters; may be empty
pub fn department_prefix(subject_code: &str) -> &str {
    let len = subject_code
        .bytes()
        .take_while(u8::is_ascii_uppercase)
        .count();
    &subject_code[..len]
}

/// The two upper-case letters right before a three-digit run
pub fn subject_type_code(subject_code: &str, default: &str) -> String {
    SUBJECT_TYPE_PATTERN
        .captures(subject_code)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str, title: &str, date: &str) -> MetadataRow {
        MetadataRow {
            exam_date: date.to_string(),
            code: code.to_string(),
            title: title.to_string(),
            script_count: None,
        }
    }

    #[test]
    fn test_subject_code_conventions() {
        assert_eq!(department_prefix("BBA3CJ201"), "BBA");
        assert_eq!(extract_semester("BBA3CJ201"), 3);
        assert_eq!(subject_type_code("BBA3CJ201", "CJ"), "CJ");
        assert_eq!(subject_type_code("ENG2FM102", "CJ"), "FM");
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(department_prefix("3CJ201"), "");
        assert_eq!(extract_semester("BBACJ"), 1);
        assert_eq!(subject_type_code("BBA3", "CJ"), "CJ");
        assert_eq!(extract_year("no date"), chrono::Utc::now().year());
    }

    #[test]
    fn test_year_from_multiline_date() {
        assert_eq!(extract_year("03-11-2025:\n2.00 PM"), 2025);
        assert_eq!(extract_year("11/2024"), 2024);
    }

    #[test]
    fn test_split_title() {
        assert_eq!(
            split_title("BBA3CJ201 - Domestic Logistic Management"),
            ("BBA3CJ201".to_string(), "Domestic Logistic Management".to_string())
        );
        assert_eq!(
            split_title("MAT1CJ101 - Calculus - Part I"),
            ("MAT1CJ101".to_string(), "Calculus - Part I".to_string())
        );
        assert_eq!(
            split_title("Orphan Title"),
            ("Orphan Title".to_string(), "Orphan Title".to_string())
        );
    }

    #[test]
    fn test_infer_matches_document_by_code() {
        let mut docs = LocatedDocuments::new();
        docs.insert("133750".to_string(), PathBuf::from("/tmp/x/133750_a.pdf"));
        let conventions = Conventions::default();

        let matched = infer(&row("133750", "BBA3CJ201 - Marketing", "03-11-2025"), &docs, &conventions);
        assert_eq!(matched.document_path, Some(PathBuf::from("/tmp/x/133750_a.pdf")));
        assert_eq!(matched.year, 2025);
        assert_eq!(matched.label(), "133750 - Marketing");

        let unmatched = infer(&row("1337", "BBA3CJ201 - Marketing", "03-11-2025"), &docs, &conventions);
        assert_eq!(unmatched.document_path, None);
    }

    #[test]
    fn test_convention_tables() {
        let conventions = Conventions::default();
        assert_eq!(conventions.department_name("BBA"), Some("Business Administration"));
        assert_eq!(conventions.department_name("XYZ"), None);
        assert_eq!(conventions.subject_type_name("MN"), "Minor");
        assert_eq!(conventions.subject_type_name("FS"), "Common Course");
        assert_eq!(conventions.subject_type_name("QQ"), "Major");
    }

    #[test]
    fn test_lowercased_config_keys() {
        let mut config = ImportConfig::default();
        config.departments.clear();
        config.departments.insert("phy".to_string(), "Physics".to_string());

        let conventions = Conventions::from_config(&config);
        assert_eq!(conventions.department_name("PHY"), Some("Physics"));
    }
}
