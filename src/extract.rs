//! Document text extraction.
//!
//! The document pipeline embeds one vector per file, so every supported type
//! has to come out of here as plain UTF-8. Plain text and markdown are decoded
//! lossily; PDF goes through `pdf-extract`; DOCX is unzipped and the `w:t`
//! runs of `word/document.xml` are concatenated paragraph by paragraph.

use std::io::Read;
use std::path::Path;

use crate::error::ExtractError;

/// Upper bound on the decompressed size of `word/document.xml` (zip-bomb guard).
const MAX_DOCX_XML_BYTES: u64 = 50 * 1024 * 1024;

/// Lowercased extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// Extract text from a document's bytes, dispatching on its file extension.
///
/// Returns [`ExtractError::Empty`] when the document has no non-whitespace text.
pub fn extract_document_text(path: &Path, bytes: &[u8]) -> Result<String, ExtractError> {
    let ext = extension_of(path).unwrap_or_default();
    let text = match ext.as_str() {
        "txt" | "md" | "markdown" => String::from_utf8_lossy(bytes).into_owned(),
        "pdf" => extract_pdf(bytes)?,
        "docx" => extract_docx(bytes)?,
        other => return Err(ExtractError::Unsupported(other.to_string())),
    };

    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_DOCX_XML_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_DOCX_XML_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    docx_paragraph_text(&xml)
}

fn docx_paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text_run = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" if !out.is_empty() && !out.ends_with('\n') => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let text = t.unescape().map_err(|e| ExtractError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
