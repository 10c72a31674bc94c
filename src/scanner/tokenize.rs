//! Shell-word tokenization shared by validation and command construction.
//!
//! Both validators and the command builder must see the same token
//! boundaries, so this is the only place raw input is split.
//!
//! Splitting follows POSIX shell words with no comment syntax:
//! - words are separated by space, tab, CR or LF
//! - single quotes take everything literally up to the closing quote
//! - inside double quotes a backslash escapes only `"` and `\`; before any
//!   other character it is kept
//! - outside quotes a backslash escapes the next character
//! - `#` is an ordinary character
//! - an empty quoted string (`''` or `""`) is an empty token

/// Word separators
const WHITESPACE: [char; 4] = [' ', '\t', '\r', '\n'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Split a raw string into shell words.
///
/// Quoted substrings keep embedded whitespace. Returns `None` for input a
/// shell could not split either (unbalanced quotes, trailing backslash).
pub fn tokenize(raw: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut token = String::new();
    // Set once a word has started, so `''` still yields a token
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match quote {
            Quote::None => match c {
                c if WHITESPACE.contains(&c) => {
                    if in_word {
                        tokens.push(std::mem::take(&mut token));
                        in_word = false;
                    }
                }
                '\\' => {
                    token.push(chars.next()?);
                    in_word = true;
                }
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                c => {
                    token.push(c);
                    in_word = true;
                }
            },
            Quote::Single => match c {
                '\'' => quote = Quote::None,
                c => token.push(c),
            },
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => {
                    let next = chars.next()?;
                    if next != '"' && next != '\\' {
                        token.push('\\');
                    }
                    token.push(next);
                }
                c => token.push(c),
            },
        }
    }

    if quote != Quote::None {
        return None;
    }
    if in_word {
        tokens.push(token);
    }
    Some(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_whitespace_split() {
        assert_eq!(
            tokenize("  -sV\t-p 80 ").unwrap(),
            vec!["-sV", "-p", "80"]
        );
    }

    #[test]
    fn test_carriage_return_and_newline_separate_words() {
        assert_eq!(
            tokenize("10.0.0.1\r10.0.0.2\n10.0.0.3\r\n").unwrap(),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );
    }

    #[test]
    fn test_hash_is_not_a_comment() {
        assert_eq!(tokenize("10.0.0.1 #x").unwrap(), vec!["10.0.0.1", "#x"]);
        assert_eq!(tokenize("-sV #-Q").unwrap(), vec!["-sV", "#-Q"]);
        assert_eq!(tokenize("a#b").unwrap(), vec!["a#b"]);
    }

    #[test]
    fn test_quoted_token_stays_whole() {
        assert_eq!(
            tokenize(r#"-p "80, 443" 'a b'"#).unwrap(),
            vec!["-p", "80, 443", "a b"]
        );
    }

    #[test]
    fn test_backslash_in_double_quotes() {
        // Only `"` and `\` are escapable inside double quotes
        assert_eq!(tokenize(r#""a\$b""#).unwrap(), vec![r"a\$b"]);
        assert_eq!(tokenize(r#""a\"b""#).unwrap(), vec![r#"a"b"#]);
        assert_eq!(tokenize(r#""a\\b""#).unwrap(), vec![r"a\b"]);
    }

    #[test]
    fn test_backslash_outside_and_in_single_quotes() {
        assert_eq!(tokenize(r"a\ b c").unwrap(), vec!["a b", "c"]);
        assert_eq!(tokenize(r"\$x").unwrap(), vec!["$x"]);
        assert_eq!(tokenize(r"'a\b'").unwrap(), vec![r"a\b"]);
    }

    #[test]
    fn test_adjacent_quotes_join() {
        assert_eq!(tokenize(r#""ab"cd'ef'"#).unwrap(), vec!["abcdef"]);
        assert_eq!(tokenize("a''").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_empty_quotes_make_empty_token() {
        assert_eq!(tokenize("''").unwrap(), vec![""]);
        assert_eq!(tokenize(r#"a "" b"#).unwrap(), vec!["a", "", "b"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize(" \t\r\n ").unwrap().is_empty());
    }

    #[test]
    fn test_unbalanced_quote_rejected() {
        assert!(tokenize("\"192.168.1.1").is_none());
        assert!(tokenize("'-sV").is_none());
    }

    #[test]
    fn test_trailing_escape_rejected() {
        assert!(tokenize("10.0.0.1 \\").is_none());
        assert!(tokenize("\"abc\\").is_none());
    }

    #[test]
    fn test_metacharacters_are_plain_text() {
        assert_eq!(
            tokenize("a;b 'c|d' $(e)").unwrap(),
            vec!["a;b", "c|d", "$(e)"]
        );
    }

    proptest! {
        #[test]
        fn prop_plain_words_round_trip(words in prop::collection::vec("[A-Za-z0-9.:/*#;$-]{1,12}", 0..10)) {
            prop_assert_eq!(tokenize(&words.join(" ")).unwrap(), words);
        }
    }
}
