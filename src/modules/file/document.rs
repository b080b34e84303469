use crate::api::error::SystemError;

pub fn count_pages(bytes: &[u8]) -> Result<u32, SystemError> {
    let file = pdf::file::FileOptions::cached().load(bytes.to_vec())?;
    Ok(file.num_pages())
}

pub fn extract_text(bytes: &[u8]) -> Result<String, SystemError> {
    Ok(pdf_extract::extract_text_from_mem(bytes)?)
}

/// Splits `text` into windows of `chunk_size` characters, each overlapping the
/// previous one by `overlap` characters.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() || chunk_size == 0 {
        return vec![];
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}
