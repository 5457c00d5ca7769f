//! Scanner for secret reference strings
//!
//! Two shapes are recognized:
//!
//! - **single**: a string without any `{{` is one `backend:locator` pair;
//! - **template**: literal text interleaved with `{{backend:locator}}` spans.
//!
//! The scanner only finds spans. Splitting a span into backend and locator
//! is [`split_reference`], and malformed spans are left for the caller to
//! report so one bad span does not hide the others. An unterminated `{{`
//! stops the scan because the rest of the string no longer has a defined
//! structure.

use crate::errors::Error;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// One `{{...}}` span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span<'a> {
    /// Text between the delimiters
    pub inner: &'a str,
    /// Byte offset of the opening `{{`
    pub position: usize,
}

/// Result of scanning a source string
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Scan<'a> {
    /// The whole string is one reference
    Single(&'a str),
    /// Literal segments around spans; `literals.len() == spans.len() + 1`
    Template {
        literals: Vec<&'a str>,
        spans: Vec<Span<'a>>,
    },
}

/// Scan `source` into its single or template shape
pub(crate) fn scan(source: &str) -> Result<Scan<'_>, Error> {
    if !source.contains(OPEN) {
        return Ok(Scan::Single(source));
    }

    let mut literals = Vec::new();
    let mut spans = Vec::new();
    let mut rest = 0;

    loop {
        let Some(open) = source[rest..].find(OPEN).map(|i| rest + i) else {
            literals.push(&source[rest..]);
            break;
        };

        let inner_start = open + OPEN.len();
        let Some(close) = source[inner_start..].find(CLOSE).map(|i| inner_start + i) else {
            return Err(Error::UnterminatedReference { position: open });
        };

        literals.push(&source[rest..open]);
        spans.push(Span {
            inner: &source[inner_start..close],
            position: open,
        });
        rest = close + CLOSE.len();
    }

    Ok(Scan::Template { literals, spans })
}

/// Split `backend:locator` on the first `:`
///
/// The locator keeps any further `:` characters.
pub(crate) fn split_reference(reference: &str) -> Result<(&str, &str), Error> {
    reference.split_once(':').ok_or(Error::IncorrectFormat)
}
