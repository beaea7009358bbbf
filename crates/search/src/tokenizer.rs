//! Text tokenizer for index and query processing.
//!
//! Pipeline: Unicode NFKC normalization → lowercase → split into
//! letter/digit runs. The same pipeline is applied to documents and
//! queries so tokens always compare equal after normalization
//! (e.g. "ｅｌｅｐｈａｎｔ" and "Elephant" both index as "elephant").

use unicode_normalization::UnicodeNormalization;

/// Tokenize text into lowercase letter/digit runs.
///
/// # Example
///
/// ```
/// use engram_search::tokenizer::tokenize;
///
/// let tokens = tokenize("Elephant migration, 2024!");
/// assert_eq!(tokens, vec!["elephant", "migration", "2024"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text.nfkc().collect::<String>().to_lowercase();
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in normalized.chars() {
        if c.is_alphanumeric() {
            current.push(c);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// One parsed query term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryTerm {
    /// Normalized token
    pub token: String,
    /// True when the source term ended with `*` (prefix match)
    pub prefix: bool,
}

/// Parse a query: whitespace-separated terms, each optionally ending
/// with `*` for prefix matching. Duplicate terms are dropped.
///
/// # Example
///
/// ```
/// use engram_search::tokenizer::parse_query;
///
/// let terms = parse_query("Elephant migra*");
/// assert_eq!(terms.len(), 2);
/// assert!(!terms[0].prefix);
/// assert!(terms[1].prefix);
/// ```
pub fn parse_query(query: &str) -> Vec<QueryTerm> {
    let mut seen = std::collections::HashSet::new();
    let mut terms = Vec::new();
    for word in query.split_whitespace() {
        let (body, prefix) = match word.strip_suffix('*') {
            Some(body) => (body, true),
            None => (word, false),
        };
        let tokens = tokenize(body);
        let last = tokens.len().saturating_sub(1);
        for (i, token) in tokens.into_iter().enumerate() {
            let term = QueryTerm {
                prefix: prefix && i == last,
                token,
            };
            if seen.insert(term.clone()) {
                terms.push(term);
            }
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_basic() {
        assert_eq!(tokenize("Hello, World!"), vec!["hello", "world"]);
    }

    #[test]
    fn test_tokenize_digits_kept() {
        assert_eq!(tokenize("port 8080 open"), vec!["port", "8080", "open"]);
    }

    #[test]
    fn test_tokenize_empty_and_punctuation() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("...---...").is_empty());
    }

    #[test]
    fn test_tokenize_nfkc_fullwidth() {
        // Full-width latin normalizes to ASCII under NFKC
        assert_eq!(tokenize("ｅｌｅｐｈａｎｔ"), vec!["elephant"]);
    }

    #[test]
    fn test_tokenize_unicode_words() {
        assert_eq!(tokenize("café au lait"), vec!["café", "au", "lait"]);
    }

    #[test]
    fn test_parse_query_prefix_flag() {
        let terms = parse_query("elep* migration");
        assert_eq!(
            terms,
            vec![
                QueryTerm {
                    token: "elep".into(),
                    prefix: true
                },
                QueryTerm {
                    token: "migration".into(),
                    prefix: false
                },
            ]
        );
    }

    #[test]
    fn test_parse_query_dedupes() {
        let terms = parse_query("fox fox FOX");
        assert_eq!(terms.len(), 1);
    }

    #[test]
    fn test_parse_query_compound_word_prefix_on_last() {
        let terms = parse_query("foo-bar*");
        assert_eq!(terms.len(), 2);
        assert!(!terms[0].prefix);
        assert!(terms[1].prefix);
        assert_eq!(terms[1].token, "bar");
    }

    #[test]
    fn test_parse_query_bare_star_is_empty() {
        assert!(parse_query("*").is_empty());
    }
}
