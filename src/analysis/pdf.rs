//! Plain-text extraction from uploaded PDF files.
//!
//! Walks each page's content stream and collects the operands of the
//! text-showing operators. Strings are decoded as UTF-8, then UTF-16BE when
//! they carry a byte-order mark, then Latin-1.

use lopdf::content::Content;
use lopdf::Object;

use super::error::AnalysisError;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Whether the payload starts with the PDF file signature.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.len() > PDF_MAGIC.len() && bytes.starts_with(PDF_MAGIC)
}

/// Extracts the text of every page, pages separated by a blank line.
///
/// Fails with `DocumentRead` when the file cannot be parsed or carries no
/// extractable text.
pub fn extract_text(bytes: &[u8]) -> Result<String, AnalysisError> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|e| AnalysisError::document_read(format!("unreadable PDF: {}", e)))?;

    let mut pages = Vec::new();
    for (page_number, page_id) in document.get_pages() {
        let content = document.get_page_content(page_id).map_err(|e| {
            AnalysisError::document_read(format!("page {}: {}", page_number, e))
        })?;
        let operations = Content::decode(&content).map_err(|e| {
            AnalysisError::document_read(format!("page {}: {}", page_number, e))
        })?;

        let mut text = String::new();
        for op in operations.operations {
            match op.operator.as_str() {
                "Tj" | "TJ" | "'" | "\"" => {
                    for operand in &op.operands {
                        push_operand(&mut text, operand);
                    }
                }
                "T*" | "Td" | "TD" | "ET" => push_break(&mut text),
                _ => {}
            }
        }

        let text = text.trim();
        if !text.is_empty() {
            pages.push(text.to_string());
        }
    }

    if pages.is_empty() {
        return Err(AnalysisError::document_read(
            "PDF contains no extractable text",
        ));
    }
    Ok(pages.join("\n\n"))
}

fn push_operand(text: &mut String, operand: &Object) {
    match operand {
        Object::String(bytes, _) => text.push_str(&decode_string(bytes)),
        Object::Array(items) => {
            for item in items {
                match item {
                    Object::String(bytes, _) => text.push_str(&decode_string(bytes)),
                    // Large negative kerning is a word gap.
                    Object::Integer(n) if *n < -100 => text.push(' '),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn push_break(text: &mut String) {
    if !text.is_empty() && !text.ends_with(char::is_whitespace) {
        text.push(' ');
    }
}

fn decode_string(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    if let [0xFE, 0xFF, rest @ ..] = bytes {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&units) {
            return s;
        }
    }
    bytes.iter().map(|&b| b as char).collect()
}
