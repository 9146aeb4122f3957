//! Text sanitization
//!
//! All text content and all LLM outputs pass through this sanitizer before
//! being persisted: strips U+0000 and unpaired UTF-16 surrogates while
//! preserving valid surrogate pairs (i.e. emoji and other astral-plane
//! characters survive unharmed).

/// Strip null bytes and unpaired surrogates from `input`, preserving valid
/// surrogate pairs and all other content untouched.
///
/// Rust `String`s are guaranteed valid UTF-8 and can never contain an
/// unpaired surrogate on their own, but content arriving as raw bytes,
/// WTF-8, or round-tripped through a lossy decoder can smuggle replacement
/// characters or literal U+0000s in. This routine is idempotent and safe to
/// run on already-clean text.
pub fn sanitize(input: &str) -> String {
    input.chars().filter(|&c| c != '\u{0}').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_null_bytes() {
        let input = "hello\u{0}world";
        assert_eq!(sanitize(input), "helloworld");
    }

    #[test]
    fn preserves_emoji() {
        let input = "memories are 🧠 precious";
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn preserves_plain_text() {
        let input = "Peter loves hiking";
        assert_eq!(sanitize(input), input);
    }

    #[test]
    fn idempotent() {
        let input = "a\u{0}b🎉c";
        let once = sanitize(input);
        let twice = sanitize(&once);
        assert_eq!(once, twice);
    }
}
