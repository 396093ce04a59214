//! Whitespace column tokenizer
//!
//! The iptables listing is a table of space aligned columns. Only the space
//! character separates columns; tabs and other whitespace are part of a field.
//! The last column of a rule row is free text -- `tcp dpt:22 /* ssh */` -- and
//! so callers may cap the number of fields and pick up the rest of the line
//! separately.

/// Split `line` into space delimited fields.
///
/// When `max_fields` is non-zero at most `max_fields` fields are returned. See
/// [`split_with_rest`] to recover the part of the line past the cap.
#[must_use]
pub fn split(line: &str, max_fields: usize) -> Vec<&str> {
    split_with_rest(line, max_fields).0
}

/// Split `line` into space delimited fields, returning the uncollected
/// remainder.
///
/// Scanning stops when `max_fields` fields have been collected and the start
/// of one more field is found. That field and everything after it, internal
/// spacing included, is returned as the remainder with trailing spaces
/// removed. With `max_fields` of zero the remainder is always `None`.
#[must_use]
pub fn split_with_rest(line: &str, max_fields: usize) -> (Vec<&str>, Option<&str>) {
    let mut fields = Vec::new();
    let mut start: Option<usize> = None;

    // Slicing on byte offsets is fine: every cut is next to an ASCII space or
    // at an end of the line.
    for (idx, byte) in line.bytes().enumerate() {
        if byte == b' ' {
            if let Some(begin) = start.take() {
                fields.push(&line[begin..idx]);
            }
        } else if start.is_none() {
            if max_fields > 0 && fields.len() == max_fields {
                return (fields, Some(line[idx..].trim_end_matches(' ')));
            }
            start = Some(idx);
        }
    }
    if let Some(begin) = start {
        fields.push(&line[begin..]);
    }

    (fields, None)
}
