//! Field transcoding: raw fixed-width field bytes to canonical Dfile text.

use crate::{
    layout::{FIELD_DELIMITER, NO_MEMO},
    source::{FieldDescriptor, FieldType},
};

/// Result of transcoding one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Transcoded {
    Text(String),
    /// Source memo block number, resolved by the memo resolver before writing
    MemoRef(u64),
}

/// A field whose memo, if any, has already been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    /// Memo text to be written as its own chain; `None` stores `0`
    Memo(Option<String>),
}

/// A fully transcoded record, held in memory until its partition is known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscodedRecord {
    pub fields: Vec<FieldValue>,
}

impl TranscodedRecord {
    pub fn new(fields: Vec<FieldValue>) -> Self {
        Self { fields }
    }

    /// Inline text of a field, `None` for memo fields and out-of-range indexes.
    pub fn text(&self, index: usize) -> Option<&str> {
        match self.fields.get(index)? {
            FieldValue::Text(text) => Some(text),
            FieldValue::Memo(_) => None,
        }
    }
}

/// Transcode one field according to its semantic type.
///
/// Never fails: malformed numbers degrade to zero (empty text) and malformed
/// memo references degrade to "no memo".
pub fn transcode(raw: &[u8], descriptor: &FieldDescriptor) -> Transcoded {
    match descriptor.field_type {
        FieldType::Number => Transcoded::Text(transcode_number(raw, descriptor)),
        FieldType::MemoRef => Transcoded::MemoRef(parse_memo_reference(raw, descriptor)),
        FieldType::Text | FieldType::Date | FieldType::Boolean => {
            Transcoded::Text(trim_text(raw))
        }
    }
}

/// Render a fixed-point number in its shortest round-trippable form.
/// Zero renders as the empty string.
pub fn transcode_number(raw: &[u8], descriptor: &FieldDescriptor) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    let value = match text.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => {
            if !text.is_empty() {
                tracing::debug!(
                    field = %descriptor.name,
                    value = %text,
                    "malformed number, storing zero"
                );
            }
            0.0
        }
    };

    if value == 0.0 {
        String::new()
    } else {
        format!("{value}")
    }
}

fn parse_memo_reference(raw: &[u8], descriptor: &FieldDescriptor) -> u64 {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        return NO_MEMO;
    }
    text.parse().unwrap_or_else(|_| {
        tracing::debug!(
            field = %descriptor.name,
            value = %text,
            "malformed memo reference, treating as no memo"
        );
        NO_MEMO
    })
}

fn is_filler(c: char) -> bool {
    c == ' ' || c == FIELD_DELIMITER
}

/// Squeeze raw text into the smallest single-line form.
///
/// Line breaks become the field delimiter, any other control or non-ASCII
/// byte becomes a space, every run of delimiters and spaces is collapsed to
/// its last character, then leading spaces and trailing spaces or delimiters
/// are stripped.
pub fn trim_text(raw: &[u8]) -> String {
    let mut mapped = raw
        .iter()
        .map(|&byte| match byte {
            b'\r' | b'\n' => FIELD_DELIMITER,
            byte if byte.is_ascii_graphic() => byte as char,
            _ => ' ',
        })
        .peekable();

    let mut collapsed = String::with_capacity(raw.len());
    while let Some(c) = mapped.next() {
        if is_filler(c) && mapped.peek().is_some_and(|next| is_filler(*next)) {
            continue;
        }
        collapsed.push(c);
    }

    collapsed
        .trim_start_matches(' ')
        .trim_end_matches(is_filler)
        .to_string()
}

/// Join canonical field texts into one record text. The last field is not
/// followed by a delimiter.
pub fn join_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut record = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            record.push(FIELD_DELIMITER);
        }
        record.push_str(field);
    }
    record
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn number(width: usize, decimals: u8) -> FieldDescriptor {
        FieldDescriptor::new("AMOUNT", FieldType::Number, width).with_decimals(decimals)
    }

    #[test]
    fn zero_number_is_empty() {
        assert_eq!(transcode_number(b"   0", &number(4, 0)), "");
        assert_eq!(transcode_number(b"0.000", &number(5, 3)), "");
        assert_eq!(transcode_number(b"    ", &number(4, 0)), "");
    }

    #[test]
    fn numbers_use_shortest_form() {
        assert_eq!(transcode_number(b"  42", &number(4, 0)), "42");
        assert_eq!(transcode_number(b" 12.50", &number(6, 2)), "12.5");
        assert_eq!(transcode_number(b"-3.25", &number(5, 2)), "-3.25");
    }

    #[test]
    fn malformed_numbers_degrade_to_zero() {
        assert_eq!(transcode_number(b"****", &number(4, 0)), "");
        assert_eq!(transcode_number(b"12ab", &number(4, 0)), "");
        assert_eq!(transcode_number(b" inf", &number(4, 0)), "");
        assert_eq!(transcode_number(&[0xff, 0xfe], &number(2, 0)), "");
    }

    #[test]
    fn text_is_squeezed() {
        assert_eq!(trim_text(b"  hello   world  "), "hello world");
        assert_eq!(trim_text(b"line one\r\nline two\r\n"), "line one\\line two");
        assert_eq!(trim_text(b"tab\there"), "tab here");
        assert_eq!(trim_text(&[b'a', 0xe9, b'b']), "a b");
        assert_eq!(trim_text(b"\r\n  x"), "x");
        assert_eq!(trim_text(b"     "), "");
    }

    #[test]
    fn collapsed_run_keeps_its_last_character() {
        assert_eq!(trim_text(b"a \nb"), "a\\b");
        assert_eq!(trim_text(b"a\n b"), "a b");
    }

    #[test]
    fn dates_and_booleans_use_text_rule() {
        let date = FieldDescriptor::new("BORN", FieldType::Date, 8);
        let flag = FieldDescriptor::new("ACTIVE", FieldType::Boolean, 1);
        assert_eq!(
            transcode(b"19921215", &date),
            Transcoded::Text("19921215".into())
        );
        assert_eq!(transcode(b"T", &flag), Transcoded::Text("T".into()));
        assert_eq!(transcode(b" ", &flag), Transcoded::Text(String::new()));
    }

    #[test]
    fn memo_references_parse_to_block_numbers() {
        let memo = FieldDescriptor::new("NOTES", FieldType::MemoRef, 10);
        assert_eq!(transcode(b"        12", &memo), Transcoded::MemoRef(12));
        assert_eq!(transcode(b"          ", &memo), Transcoded::MemoRef(NO_MEMO));
        assert_eq!(transcode(b"   garbage", &memo), Transcoded::MemoRef(NO_MEMO));
    }

    #[test]
    fn join_does_not_trail_a_delimiter() {
        assert_eq!(join_fields(["a", "", "c"]), "a\\\\c");
        assert_eq!(join_fields(["only"]), "only");
        assert_eq!(join_fields(Vec::<&str>::new()), "");
    }

    proptest! {
        #[test]
        fn trimmed_text_is_canonical(raw in proptest::collection::vec(any::<u8>(), 0..200)) {
            let text = trim_text(&raw);
            prop_assert!(text.bytes().all(|b| b.is_ascii_graphic() || b == b' '));
            prop_assert!(!text.starts_with(' '));
            prop_assert!(!text.ends_with(' ') && !text.ends_with(FIELD_DELIMITER));
            let chars: Vec<char> = text.chars().collect();
            prop_assert!(chars.windows(2).all(|pair| !(is_filler(pair[0]) && is_filler(pair[1]))));
        }

        #[test]
        fn nonzero_numbers_keep_their_magnitude(value in -1.0e12f64..1.0e12f64) {
            let raw = format!("{value:.4}");
            let parsed: f64 = raw.parse().unwrap();
            let text = transcode_number(raw.as_bytes(), &number(raw.len(), 4));
            if parsed == 0.0 {
                prop_assert_eq!(text, "");
            } else {
                let back: f64 = text.parse().unwrap();
                prop_assert_eq!(back, parsed);
            }
        }
    }
}
