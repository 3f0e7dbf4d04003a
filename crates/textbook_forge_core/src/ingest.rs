//! crates/textbook_forge_core/src/ingest.rs
//!
//! Validation and assembly of the uploaded source material. Text extraction (for
//! PDFs) happens on the client; this module only sees extracted text plus the
//! original file's metadata, and rejects bad input before any AI call is made.

use serde::{Deserialize, Serialize};

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_PDF: &str = "application/pdf";

/// Inserted between the texts of consecutive files.
pub const SOURCE_SEPARATOR: &str = "\n\n---\n\n";

const MIB: u64 = 1024 * 1024;

/// One uploaded file, after the client extracted its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub content_type: String,
    /// Size of the original file in bytes.
    pub size_bytes: u64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestLimits {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * MIB,
            max_total_bytes: 100 * MIB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("Please provide at least one PDF or TXT file.")]
    NoFiles,
    #[error("File \"{name}\" is too large. Maximum size is {limit_mib}MB per file.")]
    FileTooLarge { name: String, limit_mib: u64 },
    #[error("File \"{name}\" is not a valid type. Please use PDF or TXT.")]
    UnsupportedType { name: String },
    #[error("Total file size exceeds {limit_mib}MB.")]
    TotalTooLarge { limit_mib: u64 },
    #[error("Could not extract any text from the provided files.")]
    NoExtractableText,
}

impl SourceFile {
    /// The effective size: a client cannot shrink its quota by under-reporting.
    fn effective_size(&self) -> u64 {
        self.size_bytes.max(self.text.len() as u64)
    }

    fn content_type_is_supported(&self) -> bool {
        let essence = self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        essence == TEXT_PLAIN || essence == APPLICATION_PDF
    }
}

/// Validates every file and joins their texts into one source blob.
pub fn assemble_source(files: &[SourceFile], limits: &IngestLimits) -> Result<String, IngestError> {
    if files.is_empty() {
        return Err(IngestError::NoFiles);
    }

    let mut total: u64 = 0;
    for file in files {
        if file.effective_size() > limits.max_file_bytes {
            return Err(IngestError::FileTooLarge {
                name: file.name.clone(),
                limit_mib: limits.max_file_bytes / MIB,
            });
        }
        if !file.content_type_is_supported() {
            return Err(IngestError::UnsupportedType {
                name: file.name.clone(),
            });
        }
        total += file.effective_size();
    }
    if total > limits.max_total_bytes {
        return Err(IngestError::TotalTooLarge {
            limit_mib: limits.max_total_bytes / MIB,
        });
    }

    let source = files
        .iter()
        .map(|f| f.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(SOURCE_SEPARATOR);

    if source.trim().is_empty() {
        return Err(IngestError::NoExtractableText);
    }
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content_type: &str, text: &str) -> SourceFile {
        SourceFile {
            name: name.to_string(),
            content_type: content_type.to_string(),
            size_bytes: text.len() as u64,
            text: text.to_string(),
        }
    }

    #[test]
    fn joins_files_with_separator() {
        let source = assemble_source(
            &[
                file("a.txt", "text/plain; charset=utf-8", "Alpha"),
                file("b.pdf", APPLICATION_PDF, "  Beta  "),
            ],
            &IngestLimits::default(),
        )
        .unwrap();
        assert_eq!(source, format!("Alpha{SOURCE_SEPARATOR}Beta"));
    }

    #[test]
    fn rejects_unsupported_type() {
        let err = assemble_source(&[file("x.png", "image/png", "abc")], &IngestLimits::default())
            .unwrap_err();
        assert_eq!(err, IngestError::UnsupportedType { name: "x.png".to_string() });
    }

    #[test]
    fn enforces_per_file_and_total_ceilings() {
        let limits = IngestLimits {
            max_file_bytes: 2 * MIB,
            max_total_bytes: 3 * MIB,
        };
        let mut big = file("big.txt", TEXT_PLAIN, "x");
        big.size_bytes = 2 * MIB + 1;
        assert!(matches!(
            assemble_source(&[big], &limits),
            Err(IngestError::FileTooLarge { .. })
        ));

        let mut a = file("a.txt", TEXT_PLAIN, "a");
        a.size_bytes = 2 * MIB;
        let mut b = file("b.txt", TEXT_PLAIN, "b");
        b.size_bytes = 2 * MIB;
        assert_eq!(
            assemble_source(&[a, b], &limits),
            Err(IngestError::TotalTooLarge { limit_mib: 3 })
        );
    }

    #[test]
    fn whitespace_only_text_is_rejected() {
        assert_eq!(
            assemble_source(&[file("blank.pdf", APPLICATION_PDF, " \n\t ")], &IngestLimits::default()),
            Err(IngestError::NoExtractableText)
        );
        assert_eq!(assemble_source(&[], &IngestLimits::default()), Err(IngestError::NoFiles));
    }
}
