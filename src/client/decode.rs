/// Decodes UTF-8 across chunk boundaries, holding an incomplete trailing
/// sequence until the next chunk completes it.
#[derive(Debug, Default)]
pub struct Utf8Accumulator {
    pending: Vec<u8>,
    text: String,
}

impl Utf8Accumulator {
    /// Appends a chunk. Returns whether the decoded text grew.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        let before = self.text.len();
        self.pending.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let (valid, rest) = self.pending.split_at(e.valid_up_to());
                    self.text.push_str(&String::from_utf8_lossy(valid));

                    match e.error_len() {
                        Some(bad) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.pending = rest[bad..].to_vec();
                        }
                        None => {
                            self.pending = rest.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        self.text.len() > before
    }

    /// Flushes a truncated trailing sequence as a replacement character.
    pub fn finish(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.pending.clear();
        self.text.push(char::REPLACEMENT_CHARACTER);
        true
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holds_split_multibyte_sequence() {
        let bytes = "héllo ✓".as_bytes();
        let mut acc = Utf8Accumulator::default();

        assert!(acc.push(&bytes[..2]));
        assert_eq!(acc.text(), "h");
        assert!(acc.push(&bytes[2..8]));
        assert_eq!(acc.text(), "héllo ");
        assert!(!acc.push(&bytes[8..9]));
        assert!(acc.push(&bytes[9..]));
        assert_eq!(acc.text(), "héllo ✓");
        assert!(!acc.finish());
    }

    #[test]
    fn test_invalid_bytes_become_replacement() {
        let mut acc = Utf8Accumulator::default();
        acc.push(&[b'a', 0xFF, b'b']);
        assert_eq!(acc.text(), "a\u{FFFD}b");

        acc.push(&[0xE2, 0x9C]);
        assert!(acc.finish());
        assert_eq!(acc.text(), "a\u{FFFD}b\u{FFFD}");
    }
}
