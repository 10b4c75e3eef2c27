//! Flag strings to argument lists
//!
//! Flag settings are plain strings (`"-m elf_i386 -T link.ld"`). They are
//! split with POSIX shell word rules, so `-DNAME="two words"` stays one
//! argument, and each component of a flag set is split on its own.

use crate::error::{BuildError, Result};

/// Ordered argument tokens for one tool invocation.
pub type FlagSet = Vec<String>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between words.
    Blank,
    /// Inside an unquoted word.
    Word,
    Single,
    Double,
}

/// Split `input` into words the way `sh` would, without expansions.
pub fn split(input: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut state = State::Blank;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match state {
            State::Blank | State::Word => match c {
                ' ' | '\t' | '\n' => {
                    if state == State::Word {
                        words.push(std::mem::take(&mut word));
                        state = State::Blank;
                    }
                }
                '\\' => match chars.next() {
                    // line continuation
                    Some('\n') => {}
                    Some(escaped) => {
                        word.push(escaped);
                        state = State::Word;
                    }
                    None => return Err(syntax(input, "trailing backslash")),
                },
                '\'' => state = State::Single,
                '"' => state = State::Double,
                c => {
                    word.push(c);
                    state = State::Word;
                }
            },
            State::Single => match c {
                '\'' => state = State::Word,
                c => word.push(c),
            },
            State::Double => match c {
                '"' => state = State::Word,
                '\\' => match chars.next() {
                    Some(escaped @ ('\\' | '"' | '$' | '`')) => word.push(escaped),
                    Some('\n') => {}
                    Some(other) => {
                        word.push('\\');
                        word.push(other);
                    }
                    None => return Err(syntax(input, "unterminated double quote")),
                },
                c => word.push(c),
            },
        }
    }

    match state {
        State::Blank => {}
        State::Word => words.push(word),
        State::Single => return Err(syntax(input, "unterminated single quote")),
        State::Double => return Err(syntax(input, "unterminated double quote")),
    }
    Ok(words)
}

fn syntax(input: &str, reason: &'static str) -> BuildError {
    BuildError::FlagSyntax {
        input: input.to_string(),
        reason,
    }
}

/// Build a flag set from its components in `base, mode, extra` order.
///
/// Empty components contribute nothing. Tokens never merge across
/// components.
pub fn compose(base: &str, mode: &str, extra: &str) -> Result<FlagSet> {
    let mut flags = FlagSet::new();
    for component in [base, mode, extra] {
        if !component.is_empty() {
            flags.extend(split(component)?);
        }
    }
    Ok(flags)
}
