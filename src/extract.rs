use std::panic;

pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// Best-effort text of an attachment. PDFs are read page by page; anything
/// else is decoded as UTF-8 with replacement characters. Failures come back
/// as a visible message rather than an error.
pub fn extract_text(bytes: &[u8]) -> String {
    if !is_pdf(bytes) {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    match pdf_pages(bytes) {
        Ok(pages) => format_pages(&pages),
        Err(message) => {
            tracing::warn!(error = %message, "PDF text extraction failed");
            format!("[unable to extract PDF text: {}]", message)
        }
    }
}

/// Cuts `text` to at most `max_chars` characters.
pub fn truncate_context(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

fn pdf_pages(bytes: &[u8]) -> Result<Vec<String>, String> {
    // The parser panics on some malformed documents.
    match panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes)) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("parser panicked".to_string()),
    }
}

/// `[page N]` header per page with text, pages separated by a blank line.
fn format_pages(pages: &[String]) -> String {
    pages
        .iter()
        .enumerate()
        .filter_map(|(index, text)| {
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                Some(format!("[page {}]\n{}", index + 1, text))
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
