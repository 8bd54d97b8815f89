use anyhow::{anyhow, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs;
use std::io::{Cursor, Read};
use std::process::Command;
use tempfile::tempdir;
use tracing::warn;
use zip::ZipArchive;

use crate::capture::command_exists;
use crate::data::{self, DataAttachment};
use crate::{normalize, ocr};

/// Reply used in place of extracted text when an upload is not one of
/// the supported formats. It flows through the pipeline like any other
/// input text.
pub const UNSUPPORTED_FILE: &str = "Unsupported file type";

#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    ocr_languages: String,
}

impl DocumentExtractor {
    pub fn new(ocr_languages: impl Into<String>) -> Self {
        Self {
            ocr_languages: ocr_languages.into(),
        }
    }

    pub fn extract(&self, attachment: &DataAttachment) -> Result<String> {
        match attachment.mime.as_str() {
            data::TEXT_MIME => decode_text(&attachment.bytes),
            data::PDF_MIME => pdf_to_text(&attachment.bytes),
            data::DOCX_MIME => docx_to_text(&attachment.bytes),
            // OCR faults degrade to empty text instead of failing the
            // whole request. Recognized text is cleaned before use.
            data::PNG_MIME | data::JPEG_MIME | "image/jpg" => {
                match ocr::image_to_text(&attachment.bytes, &self.ocr_languages) {
                    Ok(text) => Ok(normalize::clean(&text)),
                    Err(err) => {
                        warn!("text extraction from image failed: {:#}", err);
                        Ok(String::new())
                    }
                }
            }
            _ => Ok(UNSUPPORTED_FILE.to_string()),
        }
    }
}

fn decode_text(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| anyhow!("text file is not valid UTF-8"))
}

fn pdf_to_text(bytes: &[u8]) -> Result<String> {
    if !command_exists("pdftotext") {
        return Err(anyhow!(
            "pdf extraction requires pdftotext (install poppler)"
        ));
    }
    let dir = tempdir().with_context(|| "failed to create temp dir for pdf")?;
    let input_path = dir.path().join("input.pdf");
    fs::write(&input_path, bytes).with_context(|| "failed to write temp pdf")?;

    let output = Command::new("pdftotext")
        .arg(&input_path)
        .arg("-")
        .output()
        .with_context(|| "failed to run pdftotext")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("pdftotext failed: {}", stderr.trim()));
    }
    let raw = String::from_utf8_lossy(&output.stdout).to_string();
    Ok(join_pdf_pages(&raw))
}

/// pdftotext separates pages with form feeds. Blank pages are dropped.
fn join_pdf_pages(raw: &str) -> String {
    raw.split('\u{c}')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn docx_to_text(bytes: &[u8]) -> Result<String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).with_context(|| "failed to read docx archive")?;
    let mut xml = Vec::new();
    archive
        .by_name("word/document.xml")
        .with_context(|| "docx has no word/document.xml")?
        .read_to_end(&mut xml)
        .with_context(|| "failed to read docx document")?;
    docx_xml_to_text(&xml)
}

/// Run text lives in `w:t` elements; each `w:p` ends a paragraph.
fn docx_xml_to_text(xml: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut in_text = false;
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"w:t" {
                    in_text = true;
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"w:p" {
                    paragraphs.push(std::mem::take(&mut current));
                }
            }
            Ok(Event::Text(e)) => {
                if in_text {
                    current.push_str(&e.unescape()?);
                }
            }
            Ok(Event::CData(e)) => {
                if in_text {
                    current.push_str(&String::from_utf8_lossy(e.into_inner().as_ref()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(anyhow!("failed to parse docx xml: {}", err)),
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn attachment(mime: &str, bytes: &[u8]) -> DataAttachment {
        DataAttachment {
            bytes: bytes.to_vec(),
            mime: mime.to_string(),
            name: None,
        }
    }

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", FileOptions::default())
            .unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn plain_text_decodes_as_utf8() {
        let extractor = DocumentExtractor::new("eng");
        let text = extractor
            .extract(&attachment(data::TEXT_MIME, "héllo\nworld".as_bytes()))
            .unwrap();
        assert_eq!(text, "héllo\nworld");
    }

    #[test]
    fn invalid_utf8_text_is_an_error() {
        let extractor = DocumentExtractor::new("eng");
        let err = extractor
            .extract(&attachment(data::TEXT_MIME, &[0xff, 0xfe, 0x00]))
            .unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn unknown_formats_become_the_unsupported_reply() {
        let extractor = DocumentExtractor::new("eng");
        for mime in [data::OCTET_MIME, data::MP3_MIME, "text/html"] {
            let text = extractor.extract(&attachment(mime, b"payload")).unwrap();
            assert_eq!(text, UNSUPPORTED_FILE);
        }
    }

    #[test]
    fn docx_paragraphs_join_with_newlines() {
        let xml = concat!(
            "<?xml version=\"1.0\"?>",
            "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">",
            "<w:body>",
            "<w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space=\"preserve\"> world</w:t></w:r></w:p>",
            "<w:p/>",
            "<w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>",
            "</w:body></w:document>",
        );
        let bytes = docx_bytes(xml);
        let extractor = DocumentExtractor::new("eng");
        let text = extractor.extract(&attachment(data::DOCX_MIME, &bytes)).unwrap();
        assert_eq!(text, "Hello world\n\nSecond & last");
    }

    #[test]
    fn docx_without_document_xml_is_an_error() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/styles.xml", FileOptions::default())
            .unwrap();
        writer.write_all(b"<w:styles/>").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        let extractor = DocumentExtractor::new("eng");
        let err = extractor
            .extract(&attachment(data::DOCX_MIME, &bytes))
            .unwrap_err();
        assert!(err.to_string().contains("word/document.xml"));
    }

    #[test]
    fn pdf_pages_join_without_blank_pages() {
        let raw = "First page\n\u{c}\n   \n\u{c}Last page\n";
        assert_eq!(join_pdf_pages(raw), "First page\nLast page");
    }

    #[test]
    fn undecodable_images_degrade_to_empty_text() {
        let extractor = DocumentExtractor::new("eng");
        let text = extractor
            .extract(&attachment(data::PNG_MIME, b"not actually a png"))
            .unwrap();
        assert_eq!(text, "");
    }
}
