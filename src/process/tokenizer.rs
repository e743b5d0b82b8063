//! Command Line Tokenizer
//!
//! Splits a free-form exec string into an argument vector with a small
//! quote/escape aware state machine.
//!
//! The escape flag starts out set, so the very first character of the input
//! is always taken literally. `"a b"` therefore does not open a quote: the
//! leading `"` becomes part of the first argument.

use thiserror::Error;

/// Errors produced while tokenizing a command line
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("unclosed quote in command line: {command}")]
    UnclosedQuote { command: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    InQuote(char),
    InArg,
}

/// Tokenize `command` into an ordered list of arguments.
pub fn tokenize(command: &str) -> Result<Vec<String>, TokenizeError> {
    let mut args = Vec::new();
    let mut state = State::Start;
    let mut current = String::new();
    let mut escape_next = true;

    for c in command.chars() {
        if let State::InQuote(quote) = state {
            if c == quote {
                args.push(std::mem::take(&mut current));
                state = State::Start;
            } else {
                current.push(c);
            }
            continue;
        }

        if escape_next {
            current.push(c);
            escape_next = false;
            continue;
        }

        match c {
            '\\' => escape_next = true,
            '"' | '\'' => state = State::InQuote(c),
            ' ' | '\t' => {
                if state == State::InArg || !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
                state = State::Start;
            }
            _ => {
                current.push(c);
                state = State::InArg;
            }
        }
    }

    if matches!(state, State::InQuote(_)) {
        return Err(TokenizeError::UnclosedQuote {
            command: command.to_string(),
        });
    }

    if !current.is_empty() {
        args.push(current);
    }

    Ok(args)
}

/// Split an exec string into the program and its tokenized arguments.
///
/// The program is everything before the first space; the remainder is handed
/// to [`tokenize`].
pub fn split_exec(exec: &str) -> Result<(String, Vec<String>), TokenizeError> {
    let (program, rest) = exec.split_once(' ').unwrap_or((exec, ""));
    let args = tokenize(rest)?;
    Ok((program.to_string(), args))
}
