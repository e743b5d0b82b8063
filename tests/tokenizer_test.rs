//! Tests for exec string tokenizing

use netpipe::process::{split_exec, tokenize, TokenizeError};

#[test]
fn test_quoted_argument_with_leading_literal() {
    // The first character is always taken literally; a plain letter keeps its
    // place, so the word is not truncated.
    assert_eq!(tokenize(r#"echo "a b" c"#).unwrap(), vec!["echo", "a b", "c"]);
}

#[test]
fn test_leading_special_characters_are_literal() {
    assert_eq!(tokenize(r#""a b""#).unwrap_err(), TokenizeError::UnclosedQuote {
        command: r#""a b""#.to_string()
    });
    assert_eq!(tokenize(r"\n").unwrap(), vec![r"\n"]);
    assert_eq!(tokenize("'x").unwrap(), vec!["'x"]);
}

#[test]
fn test_unterminated_quote_is_an_error() {
    let err = tokenize(r#"echo "a"#).unwrap_err();
    assert!(matches!(err, TokenizeError::UnclosedQuote { .. }));
}

#[test]
fn test_tabs_and_repeated_spaces_separate_arguments() {
    assert_eq!(tokenize("-a  \t b\tc ").unwrap(), vec!["-a", "b", "c"]);
}

#[test]
fn test_escaped_argument_start_is_kept() {
    assert_eq!(tokenize(r"-v \-x").unwrap(), vec!["-v", "-x"]);
}

#[test]
fn test_escaped_character_ends_at_whitespace() {
    // An escaped character never enters the argument state, but whitespace
    // still closes the token it started.
    assert_eq!(tokenize("a b").unwrap(), vec!["a", "b"]);
    assert_eq!(tokenize(r"-v \x y").unwrap(), vec!["-v", "x", "y"]);
    assert_eq!(tokenize(r"\x  y").unwrap(), vec![r"\x", "y"]);
}

#[test]
fn test_exec_string_splits_on_first_space() {
    let (program, args) = split_exec(r#"python3 -c "print('hi there')""#).unwrap();
    assert_eq!(program, "python3");
    assert_eq!(args, vec!["-c", "print('hi there')"]);
}

#[test]
fn test_exec_string_with_bad_quoting() {
    assert!(split_exec("sh -c 'oops").is_err());
}
