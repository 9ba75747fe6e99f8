//! Command-line string tokenizer.
//!
//! Splits a single configuration string such as
//! `prog -l 0-3 --vdev="net_ring0,nodeaction=r0:0:CREATE"` into an argument
//! vector. Whitespace separates arguments; single quotes preserve their
//! content literally; double quotes preserve whitespace but honor backslash
//! escapes; outside quotes a backslash escapes the next character.

use crate::error::Error;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Split `input` into arguments.
///
/// # Errors
/// Returns [`Error::Args`] on an unterminated quote or a trailing backslash.
pub fn split_args(input: &str) -> Result<Vec<String>, Error> {
    let mut args = Vec::new();
    let mut current = String::new();
    // Tracks `""` so that an empty quoted argument is still emitted.
    let mut in_arg = false;
    let mut quote = Quote::None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Quote::Single, '\'') | (Quote::Double, '"') => quote = Quote::None,
            (Quote::Single, c) => current.push(c),
            (Quote::Double, '\\') | (Quote::None, '\\') => match chars.next() {
                Some(next) => {
                    current.push(next);
                    in_arg = true;
                }
                None => return Err(Error::Args("trailing backslash".to_string())),
            },
            (Quote::Double, c) => current.push(c),
            (Quote::None, '\'') => {
                quote = Quote::Single;
                in_arg = true;
            }
            (Quote::None, '"') => {
                quote = Quote::Double;
                in_arg = true;
            }
            (Quote::None, c) if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            (Quote::None, c) => {
                current.push(c);
                in_arg = true;
            }
        }
    }

    if quote != Quote::None {
        return Err(Error::Args(format!("unterminated quote in {input:?}")));
    }
    if in_arg {
        args.push(current);
    }
    Ok(args)
}
