//! Textual envelope form: `<base64>.box2`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Box2Error, Result};

pub const BOX2_SUFFIX: &str = ".box2";

/// Encode ciphertext bytes as `<base64>.box2`.
pub fn encode_text(ciphertext: &[u8]) -> String {
    let mut out = STANDARD.encode(ciphertext);
    out.push_str(BOX2_SUFFIX);
    out
}

/// Whether `s` is in the textual envelope form.
pub fn is_box2_text(s: &str) -> bool {
    s.ends_with(BOX2_SUFFIX)
}

/// Decode `<base64>.box2` back to ciphertext bytes.
pub fn decode_text(s: &str) -> Result<Vec<u8>> {
    let body = s.strip_suffix(BOX2_SUFFIX).ok_or_else(|| {
        Box2Error::MalformedCiphertext(format!("missing {} suffix", BOX2_SUFFIX))
    })?;
    STANDARD
        .decode(body)
        .map_err(|e| Box2Error::MalformedCiphertext(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_form() {
        let text = encode_text(&[1, 2, 3, 250]);
        assert!(is_box2_text(&text));
        assert_eq!(decode_text(&text).unwrap(), vec![1, 2, 3, 250]);
    }

    #[test]
    fn test_rejects_plain_content() {
        assert!(!is_box2_text("{\"type\":\"post\"}"));
        assert!(matches!(
            decode_text("AQID"),
            Err(Box2Error::MalformedCiphertext(_))
        ));
        assert!(matches!(
            decode_text("not base64!.box2"),
            Err(Box2Error::MalformedCiphertext(_))
        ));
    }
}
