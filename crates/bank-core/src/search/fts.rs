//! FTS5 query sanitization
//!
//! SQLite FTS5 query syntax treats many punctuation characters specially
//! (`"`, `*`, `^`, `:`, parentheses, `OR`/`AND`/`NOT` keywords). Raw user
//! text handed straight to a `MATCH` clause can throw a syntax error or,
//! worse, be used to build unintended boolean queries. This wraps the
//! input as a sequence of quoted terms, which FTS5 always accepts as a
//! phrase/AND search regardless of embedded punctuation.

/// Turn free-form text into a safe FTS5 MATCH argument.
pub fn sanitize_fts5_query(input: &str) -> String {
    input
        .split_whitespace()
        .map(|term| {
            let cleaned: String = term.chars().filter(|c| *c != '"').collect();
            format!("\"{cleaned}\"")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_terms_in_quotes() {
        assert_eq!(sanitize_fts5_query("hiking peter"), "\"hiking\" \"peter\"");
    }

    #[test]
    fn strips_embedded_quotes() {
        assert_eq!(sanitize_fts5_query("foo\"bar"), "\"foobar\"");
    }

    #[test]
    fn neutralizes_boolean_keywords() {
        let sanitized = sanitize_fts5_query("foo OR bar AND NOT baz");
        assert_eq!(sanitized, "\"foo\" \"OR\" \"bar\" \"AND\" \"NOT\" \"baz\"");
    }

    #[test]
    fn empty_input_yields_empty_query() {
        assert_eq!(sanitize_fts5_query(""), "");
    }
}
