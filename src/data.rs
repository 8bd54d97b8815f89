use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const PDF_MIME: &str = "application/pdf";
pub const TEXT_MIME: &str = "text/plain";
pub const PNG_MIME: &str = "image/png";
pub const JPEG_MIME: &str = "image/jpeg";
pub const MP3_MIME: &str = "audio/mpeg";
pub const WAV_MIME: &str = "audio/wav";
pub const OCTET_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone)]
pub struct DataAttachment {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub name: Option<String>,
}

pub fn load_attachment(path: &Path, mime_hint: Option<&str>) -> Result<DataAttachment> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read data file: {}", path.display()))?;
    let mime = resolve_mime(mime_hint.unwrap_or("auto"), &bytes, Some(path))?;
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(|value| value.to_string());
    Ok(DataAttachment { bytes, mime, name })
}

pub fn load_attachment_from_bytes(
    bytes: Vec<u8>,
    mime_hint: Option<&str>,
    name: Option<&str>,
) -> Result<DataAttachment> {
    let path = name.map(PathBuf::from);
    let mime = resolve_mime(mime_hint.unwrap_or("auto"), &bytes, path.as_deref())?;
    Ok(DataAttachment {
        bytes,
        mime,
        name: name.map(|value| value.to_string()),
    })
}

fn resolve_mime(input: &str, bytes: &[u8], path: Option<&Path>) -> Result<String> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err(anyhow!("data-mime is empty"));
    }
    let lower = raw.to_lowercase();

    match lower.as_str() {
        "auto" => return Ok(detect_mime(bytes, path)),
        "pdf" => return Ok(PDF_MIME.to_string()),
        "docx" => return Ok(DOCX_MIME.to_string()),
        "txt" | "text" => return Ok(TEXT_MIME.to_string()),
        "png" => return Ok(PNG_MIME.to_string()),
        "jpg" | "jpeg" => return Ok(JPEG_MIME.to_string()),
        "mp3" => return Ok(MP3_MIME.to_string()),
        "wav" => return Ok(WAV_MIME.to_string()),
        _ => {}
    }

    if lower == DOCX_MIME
        || lower == PDF_MIME
        || lower == MP3_MIME
        || lower == WAV_MIME
        || lower.starts_with("text/")
        || lower.starts_with("image/")
        || lower.starts_with("audio/")
    {
        return Ok(lower);
    }
    // Browsers hand over octet-stream for anything they cannot classify.
    if lower == OCTET_MIME {
        return Ok(detect_mime(bytes, path));
    }

    Err(anyhow!(
        "unsupported data-mime '{}' (expected auto, txt, pdf, docx, png, jpg, mp3, wav)",
        raw
    ))
}

fn detect_mime(bytes: &[u8], path: Option<&Path>) -> String {
    if let Some(detected) = sniff_mime_bytes(bytes) {
        return detected.to_string();
    }
    if let Some(ext) = extension_lower(path) {
        if let Some(mime) = mime_from_extension(&ext) {
            return mime.to_string();
        }
    }
    // Unknown content stays opaque; the extractor reports it as an
    // unsupported file rather than failing the request.
    OCTET_MIME.to_string()
}

fn sniff_mime_bytes(bytes: &[u8]) -> Option<&'static str> {
    let kind = infer::get(bytes)?;
    let detected = kind.mime_type();
    if detected.starts_with("image/") || detected.starts_with("audio/") {
        return Some(detected);
    }
    match detected {
        PDF_MIME => Some(PDF_MIME),
        TEXT_MIME => Some(TEXT_MIME),
        "application/zip" => detect_docx_in_zip(bytes),
        _ => None,
    }
}

fn detect_docx_in_zip(bytes: &[u8]) -> Option<&'static str> {
    if contains_bytes(bytes, b"word/") {
        return Some(DOCX_MIME);
    }
    None
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || haystack.len() < needle.len() {
        return false;
    }
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

fn extension_lower(path: Option<&Path>) -> Option<String> {
    path.and_then(|path| path.extension())
        .and_then(|value| value.to_str())
        .map(|value| value.to_lowercase())
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "pdf" => Some(PDF_MIME),
        "docx" => Some(DOCX_MIME),
        "txt" => Some(TEXT_MIME),
        "png" => Some(PNG_MIME),
        "jpg" | "jpeg" => Some(JPEG_MIME),
        "mp3" => Some(MP3_MIME),
        "wav" => Some(WAV_MIME),
        _ => None,
    }
}

pub fn extension_from_mime(mime: &str) -> Option<&'static str> {
    match mime {
        PDF_MIME => Some("pdf"),
        DOCX_MIME => Some("docx"),
        TEXT_MIME => Some("txt"),
        MP3_MIME => Some("mp3"),
        WAV_MIME => Some("wav"),
        PNG_MIME => Some("png"),
        JPEG_MIME | "image/jpg" => Some("jpg"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0];

    #[test]
    fn auto_sniffs_png_signature() {
        let attachment =
            load_attachment_from_bytes(PNG_MAGIC.to_vec(), None, Some("photo.bin")).unwrap();
        assert_eq!(attachment.mime, PNG_MIME);
    }

    #[test]
    fn auto_falls_back_to_extension() {
        let attachment =
            load_attachment_from_bytes(b"plain words".to_vec(), None, Some("notes.txt")).unwrap();
        assert_eq!(attachment.mime, TEXT_MIME);
        assert_eq!(attachment.name.as_deref(), Some("notes.txt"));
    }

    #[test]
    fn unknown_content_resolves_to_octet_stream() {
        let attachment =
            load_attachment_from_bytes(vec![0x00, 0x01, 0x02], None, Some("blob.xyz")).unwrap();
        assert_eq!(attachment.mime, OCTET_MIME);
    }

    #[test]
    fn short_mime_hints_expand() {
        let attachment =
            load_attachment_from_bytes(Vec::new(), Some("docx"), Some("report")).unwrap();
        assert_eq!(attachment.mime, DOCX_MIME);
    }

    #[test]
    fn explicit_unknown_hint_is_an_error() {
        let err = load_attachment_from_bytes(Vec::new(), Some("exe"), None).unwrap_err();
        assert!(err.to_string().contains("unsupported data-mime"));
    }
}
