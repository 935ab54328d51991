//! Document locator
//!
//! Indexes the documents of an extracted archive by the item code embedded
//! in their file names (`<digits>_<anything>.<ext>`).

use crate::archive::has_extension;
use std::collections::HashMap;
use std::fs::{self, DirEntry};
use std::io;
use std::path::{Path, PathBuf};

/// Item code -> absolute document path, built once per import run
pub type LocatedDocuments = HashMap<String, PathBuf>;

/// Walk `root` recursively and index every document with the given extension.
///
/// Entries are visited in name order, so when two files carry the same code
/// the one visited last wins.
pub fn locate_documents(root: &Path, extension: &str) -> io::Result<LocatedDocuments> {
    let mut documents = LocatedDocuments::new();
    walk(root, extension, &mut documents)?;
    Ok(documents)
}

fn walk(dir: &Path, extension: &str, documents: &mut LocatedDocuments) -> io::Result<()> {
    for entry in sorted_entries(dir)? {
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk(&entry.path(), extension, documents)?;
        } else if file_type.is_file() {
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if !has_extension(&name, extension) {
                continue;
            }

            if let Some(code) = document_code(&name) {
                if let Some(previous) = documents.insert(code.to_string(), entry.path()) {
                    tracing::debug!(code, previous = %previous.display(), "Document code seen twice, keeping the later file");
                }
            }
        }
    }

    Ok(())
}

/// The leading digit run of a file name, when it is followed by `_`
pub fn document_code(file_name: &str) -> Option<&str> {
    let digits = file_name.bytes().take_while(u8::is_ascii_digit).count();

    if digits > 0 && file_name[digits..].starts_with('_') {
        Some(&file_name[..digits])
    } else {
        None
    }
}

/// Directory entries sorted by file name
pub(crate) fn sorted_entries(dir: &Path) -> io::Result<Vec<DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_code() {
        assert_eq!(document_code("133750_1762152327189.pdf"), Some("133750"));
        assert_eq!(document_code("133750.pdf"), None);
        assert_eq!(document_code("_133750.pdf"), None);
        assert_eq!(document_code("QP133750_x.pdf"), None);
    }

    #[test]
    fn test_locate_recurses_and_filters() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("sem1/extra")).unwrap();
        fs::write(root.path().join("133750_a.pdf"), "").unwrap();
        fs::write(root.path().join("sem1/extra/133751_b.PDF"), "").unwrap();
        fs::write(root.path().join("sem1/133752_c.txt"), "").unwrap();
        fs::write(root.path().join("sem1/notes.pdf"), "").unwrap();

        let docs = locate_documents(root.path(), "pdf").unwrap();

        assert_eq!(docs.len(), 2);
        assert!(docs["133750"].ends_with("133750_a.pdf"));
        assert!(docs["133751"].ends_with("sem1/extra/133751_b.PDF"));
        assert!(docs["133751"].is_absolute());
    }

    #[test]
    fn test_duplicate_code_last_wins() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("a")).unwrap();
        fs::create_dir_all(root.path().join("b")).unwrap();
        fs::write(root.path().join("a/133750_old.pdf"), "").unwrap();
        fs::write(root.path().join("b/133750_new.pdf"), "").unwrap();

        let docs = locate_documents(root.path(), "pdf").unwrap();

        assert_eq!(docs.len(), 1);
        assert!(docs["133750"].ends_with("b/133750_new.pdf"));
    }
}
