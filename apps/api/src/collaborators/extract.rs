//! Local text extraction for uploaded resumes: PDF, DOCX and plain text.

use std::io::{Cursor, Read, Seek};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::Reader;

use super::{CollaboratorError, UploadedFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Docx,
    Text,
}

impl FileKind {
    /// Decides by extension; the browser-supplied content type only counts
    /// when the filename has none.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Option<FileKind> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("pdf") => return Some(FileKind::Pdf),
            Some("docx") => return Some(FileKind::Docx),
            Some("txt") => return Some(FileKind::Text),
            Some(_) => return None,
            None => {}
        }
        match content_type? {
            "application/pdf" => Some(FileKind::Pdf),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(FileKind::Docx)
            }
            "text/plain" => Some(FileKind::Text),
            _ => None,
        }
    }
}

pub fn extract_text(file: &UploadedFile) -> Result<String, CollaboratorError> {
    let kind = FileKind::detect(&file.filename, file.content_type.as_deref()).ok_or_else(|| {
        CollaboratorError::UnsupportedFile(format!(
            "'{}' is not a PDF, DOCX or TXT file",
            file.filename
        ))
    })?;

    let text = match kind {
        FileKind::Pdf => pdf_extract::extract_text_from_mem(&file.bytes)
            .map_err(|e| CollaboratorError::Extraction(format!("PDF: {e}")))?,
        FileKind::Docx => {
            let mut archive = zip::ZipArchive::new(Cursor::new(file.bytes.as_ref()))
                .map_err(|e| CollaboratorError::Extraction(format!("Failed to open DOCX: {e}")))?;
            extract_docx_text(&mut archive)?
        }
        FileKind::Text => String::from_utf8(file.bytes.to_vec())
            .map_err(|_| CollaboratorError::Extraction("text file is not valid UTF-8".into()))?,
    };

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(CollaboratorError::Extraction(format!(
            "no text found in '{}'",
            file.filename
        )));
    }
    Ok(text)
}

fn extract_docx_text<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<String, CollaboratorError> {
    let mut document_xml = archive.by_name("word/document.xml").map_err(|e| {
        CollaboratorError::Extraction(format!("Failed to find document.xml: {e}"))
    })?;

    let mut xml = String::new();
    document_xml
        .read_to_string(&mut xml)
        .map_err(|e| CollaboratorError::Extraction(format!("Failed to read document.xml: {e}")))?;

    parse_docx_xml(&xml)
}

/// Keeps the text of `<w:t>` runs and ends each `<w:p>` paragraph with a newline.
/// Entity and character references inside a run arrive as separate events.
fn parse_docx_xml(xml: &str) -> Result<String, CollaboratorError> {
    let mut reader = Reader::from_str(xml);

    let mut text = String::new();
    let mut in_text_element = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"t" => {
                in_text_element = true;
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text_element = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) if in_text_element => {
                text.push_str(&e.decode().unwrap_or_default());
            }
            Ok(Event::GeneralRef(e)) if in_text_element => {
                if let Ok(Some(ch)) = e.resolve_char_ref() {
                    text.push(ch);
                } else if let Some(resolved) = e
                    .decode()
                    .ok()
                    .and_then(|name| resolve_predefined_entity(&name))
                {
                    text.push_str(resolved);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CollaboratorError::Extraction(format!(
                    "XML parsing error: {e}"
                )))
            }
            _ => {}
        }
    }

    Ok(text)
}
