//! RFC 4515 escaping for values interpolated into search filters.
//!
//! Only a fixed character class is escaped. Anything else a caller puts into
//! a filter is the caller's problem.

use std::fmt::Write as _;

use crate::errors::DirectoryError;

/// Every character with a special meaning in a filter value.
pub const FILTER_SPECIAL_CHARS: &[char] = &['\\', '*', '(', ')', '\0'];

/// [`FILTER_SPECIAL_CHARS`] minus `*`, for prefix searches that append a wildcard.
pub const FILTER_SPECIAL_CHARS_KEEP_WILDCARD: &[char] = &['\\', '(', ')', '\0'];

/// Text encoding of a raw filter value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Latin1,
}

impl TextEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Latin1 => "ISO-8859-1",
        }
    }

    fn decode(&self, raw: &[u8]) -> Result<String, DirectoryError> {
        match self {
            Self::Utf8 => String::from_utf8(raw.to_vec()).map_err(|e| {
                DirectoryError::InvalidEncoding {
                    encoding: self.as_str().into(),
                    detail: e.to_string(),
                }
            }),
            // Latin-1 bytes map one-to-one onto U+0000..U+00FF.
            Self::Latin1 => Ok(raw.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// Escape every character of `text` found in `escape` as `\xx` per UTF-8 byte.
///
/// Works in a single pass over the input, so the backslashes this produces
/// are never escaped again by the same call. Calling it on its own output
/// does escape them again: the function is not idempotent.
pub fn escape_filter_chars(text: &str, escape: &[char]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        if escape.contains(&ch) {
            for byte in ch.encode_utf8(&mut buf).bytes() {
                // Writing to a String cannot fail.
                let _ = write!(out, "\\{:02x}", byte);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Escape `text` against the full [`FILTER_SPECIAL_CHARS`] set.
pub fn escape_filter(text: &str) -> String {
    escape_filter_chars(text, FILTER_SPECIAL_CHARS)
}

/// Decode `raw` with `encoding`, then escape it like [`escape_filter_chars`].
pub fn escape_filter_value(
    raw: &[u8],
    encoding: TextEncoding,
    escape: &[char],
) -> Result<String, DirectoryError> {
    let text = encoding.decode(raw)?;
    Ok(escape_filter_chars(&text, escape))
}
