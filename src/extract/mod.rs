//! Text extraction from uploaded documents.
//!
//! Dispatch is by the lower-cased extension of the client-supplied file name.
//!
//! | Extension | Strategy |
//! |-----------|----------|
//! | `pdf` | `pdf-extract` on a blocking thread |
//! | `docx` | ZIP + XML walk of `word/document.xml` |
//! | `doc` | office conversion to `.docx`, else lossy UTF-8 |
//! | `rtf` | direct RTF parse |
//! | `html`, `htm` | `html2text`, unwrapped |
//! | `txt`, `md` | UTF-8 (lossy) |
//! | `xlsx` | ZIP + XML walk, one CSV block per sheet |
//! | `xls` | `calamine` BIFF reader, same CSV blocks; ZIP content goes to the XLSX reader |
//! | anything else | UTF-8 if valid and non-blank, else PDF, else unsupported |
//!
//! Empty extracted text is not an error here; the orchestrator decides what
//! to do with a blank document.

mod convert;
mod ooxml;
mod rtf;
mod xls;

pub use ooxml::{extract_docx, extract_xlsx, is_zip};
pub use rtf::rtf_to_text;
pub use xls::extract_xls;

use std::path::Path;
use thiserror::Error;

use crate::config::ExtractConfig;
use crate::models::UploadedDocument;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type ({0}) or failed parsing")]
    Unsupported(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),

    #[error("XLS extraction failed: {0}")]
    Xls(String),

    #[error("RTF extraction failed: {0}")]
    Rtf(String),

    #[error("HTML extraction failed: {0}")]
    Html(String),

    #[error("office conversion failed: {0}")]
    Conversion(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Format inferred from a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Doc,
    Rtf,
    Html,
    Text,
    Xlsx,
    Xls,
    /// Lower-cased extension, empty when the name has none.
    Unknown(String),
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => DocumentFormat::Pdf,
            "docx" => DocumentFormat::Docx,
            "doc" => DocumentFormat::Doc,
            "rtf" => DocumentFormat::Rtf,
            "html" | "htm" => DocumentFormat::Html,
            "txt" | "md" => DocumentFormat::Text,
            "xlsx" => DocumentFormat::Xlsx,
            "xls" => DocumentFormat::Xls,
            _ => DocumentFormat::Unknown(ext),
        }
    }

    pub fn from_file_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        Self::from_extension(ext)
    }
}

/// Extracts the text of a stored upload.
pub async fn extract_upload(
    doc: &UploadedDocument,
    cfg: &ExtractConfig,
) -> Result<String, ExtractError> {
    extract_file(&doc.path, &doc.original_name, cfg).await
}

/// Extracts plain text from the file at `path`, choosing the strategy from
/// `original_name`'s extension.
pub async fn extract_file(
    path: &Path,
    original_name: &str,
    cfg: &ExtractConfig,
) -> Result<String, ExtractError> {
    let format = DocumentFormat::from_file_name(original_name);
    tracing::debug!(file = %original_name, ?format, "extracting text");

    match format {
        DocumentFormat::Pdf => {
            let bytes = tokio::fs::read(path).await?;
            extract_pdf(bytes).await
        }
        DocumentFormat::Docx => {
            let bytes = tokio::fs::read(path).await?;
            extract_docx(&bytes)
        }
        DocumentFormat::Doc => Ok(extract_doc(path, cfg).await),
        DocumentFormat::Rtf => {
            let bytes = tokio::fs::read(path).await?;
            rtf_to_text(&String::from_utf8_lossy(&bytes))
        }
        DocumentFormat::Html => {
            let bytes = tokio::fs::read(path).await?;
            html_to_text(&bytes)
        }
        DocumentFormat::Text => {
            let bytes = tokio::fs::read(path).await?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        DocumentFormat::Xlsx => {
            let bytes = tokio::fs::read(path).await?;
            extract_xlsx(&bytes)
        }
        DocumentFormat::Xls => {
            let bytes = tokio::fs::read(path).await?;
            extract_legacy_spreadsheet(bytes).await
        }
        DocumentFormat::Unknown(ext) => extract_unknown(path, ext).await,
    }
}

/// Runs `pdf-extract` off the async runtime. A panic inside the parser is
/// reported as a PDF error.
async fn extract_pdf(bytes: Vec<u8>) -> Result<String, ExtractError> {
    tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
    })
    .await
    .map_err(|e| ExtractError::Pdf(format!("parser aborted: {}", e)))?
}

/// Renders HTML without wrapping: no rendered line is longer than the
/// source, so a width equal to the input length never breaks one. Raw mode
/// keeps table cells as plain rows instead of bordered grids.
fn html_to_text(bytes: &[u8]) -> Result<String, ExtractError> {
    html2text::config::plain()
        .raw_mode(true)
        .allow_width_overflow()
        .string_from_read(bytes, bytes.len().max(80))
        .map_err(|e| ExtractError::Html(e.to_string()))
}

/// Legacy Word never fails: when conversion or parsing does not work out,
/// the raw bytes are decoded lossily.
async fn extract_doc(path: &Path, cfg: &ExtractConfig) -> String {
    match convert::convert_with_office(path, "docx", cfg).await {
        Ok(docx) => match extract_docx(&docx) {
            Ok(text) => return text,
            Err(e) => tracing::warn!(error = %e, "converted .doc could not be parsed"),
        },
        Err(e) => tracing::warn!(error = %e, "falling back to raw read of .doc"),
    }
    match tokio::fs::read(path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "raw read of .doc failed");
            String::new()
        }
    }
}

/// `.xls` uploads are often XLSX under the old name; those are read as XLSX.
async fn extract_legacy_spreadsheet(bytes: Vec<u8>) -> Result<String, ExtractError> {
    if is_zip(&bytes) {
        return extract_xlsx(&bytes);
    }
    tokio::task::spawn_blocking(move || extract_xls(&bytes))
        .await
        .map_err(|e| ExtractError::Xls(format!("parser aborted: {}", e)))?
}

async fn extract_unknown(path: &Path, ext: String) -> Result<String, ExtractError> {
    let bytes = tokio::fs::read(path).await?;
    let bytes = match String::from_utf8(bytes) {
        Ok(text) if !text.trim().is_empty() => return Ok(text),
        Ok(text) => text.into_bytes(),
        Err(e) => e.into_bytes(),
    };
    match extract_pdf(bytes).await {
        Ok(text) => Ok(text),
        Err(e) => {
            tracing::debug!(error = %e, "unknown file is not a PDF either");
            let name = if ext.is_empty() { "unknown".to_string() } else { ext };
            Err(ExtractError::Unsupported(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ooxml::tests::{docx_with_paragraphs, two_sheet_xlsx};
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn no_converter() -> ExtractConfig {
        ExtractConfig {
            office_converter: "/nonexistent/office-converter".to_string(),
            convert_timeout_secs: 5,
        }
    }

    #[test]
    fn format_from_file_name() {
        assert_eq!(DocumentFormat::from_file_name("a.PDF"), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::from_file_name("a.htm"), DocumentFormat::Html);
        assert_eq!(DocumentFormat::from_file_name("a.xls"), DocumentFormat::Xls);
        assert_eq!(DocumentFormat::from_file_name("a.XLSX"), DocumentFormat::Xlsx);
        assert_eq!(
            DocumentFormat::from_file_name("notes"),
            DocumentFormat::Unknown(String::new())
        );
        assert_eq!(
            DocumentFormat::from_file_name("x.bin"),
            DocumentFormat::Unknown("bin".to_string())
        );
    }

    #[tokio::test]
    async fn text_file_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u1", b"Line one\nLine two\n");
        let text = extract_file(&path, "sow.txt", &no_converter()).await.unwrap();
        assert_eq!(text, "Line one\nLine two\n");
    }

    #[tokio::test]
    async fn docx_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u2", &docx_with_paragraphs(&["Deliverables", "Milestones"]));
        let text = extract_file(&path, "SOW.DOCX", &no_converter()).await.unwrap();
        assert!(text.contains("Deliverables\n\nMilestones"));
    }

    #[tokio::test]
    async fn html_tags_stripped() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "u3",
            b"<html><body><h1>Scope</h1><p>Vendor shall deliver.</p></body></html>",
        );
        let text = extract_file(&path, "page.html", &no_converter()).await.unwrap();
        assert!(text.contains("Scope"));
        assert!(text.contains("Vendor shall deliver."));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn long_html_paragraph_is_not_wrapped() {
        let words = vec!["deliverable"; 2000].join(" ");
        let html = format!("<html><body><p>{}</p></body></html>", words);
        let text = html_to_text(html.as_bytes()).unwrap();
        assert_eq!(text.trim(), words);
    }

    #[tokio::test]
    async fn rtf_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u4", br"{\rtf1\ansi Payment\par Net 30}");
        let text = extract_file(&path, "terms.rtf", &no_converter()).await.unwrap();
        assert_eq!(text, "Payment\nNet 30");
    }

    #[tokio::test]
    async fn xlsx_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u5", &two_sheet_xlsx());
        let text = extract_file(&path, "plan.xlsx", &no_converter()).await.unwrap();
        assert!(text.starts_with("--- Sheet: A ---\n"));
        assert!(text.contains("--- Sheet: B ---"));
    }

    #[tokio::test]
    async fn mislabelled_xls_parsed_as_xlsx() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u6", &two_sheet_xlsx());
        let text = extract_file(&path, "plan.xls", &no_converter()).await.unwrap();
        assert!(text.contains("Phase one,42"));
    }

    #[tokio::test]
    async fn legacy_xls_read_without_office_suite() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u7", b"\xd0\xcf\x11\xe0\xa1\xb1\x1a\xe1 broken workbook");
        let err = extract_file(&path, "budget.xls", &ExtractConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Xls(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn doc_falls_back_to_raw_bytes() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u8", b"Legacy statement of work");
        let text = extract_file(&path, "old.doc", &no_converter()).await.unwrap();
        assert_eq!(text, "Legacy statement of work");
    }

    #[tokio::test]
    async fn unknown_extension_utf8_accepted() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u9", b"Plain notes without an extension");
        let text = extract_file(&path, "notes", &no_converter()).await.unwrap();
        assert_eq!(text, "Plain notes without an extension");
    }

    #[tokio::test]
    async fn unknown_binary_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u10", &[0xff, 0xfe, 0x00, 0x81, 0x02]);
        let err = extract_file(&path, "blob.bin", &no_converter()).await.unwrap_err();
        match err {
            ExtractError::Unsupported(ext) => assert_eq!(ext, "bin"),
            other => panic!("expected Unsupported, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_pdf_errors() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "u11", b"not a pdf");
        let err = extract_file(&path, "broken.pdf", &no_converter()).await.unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }
}
