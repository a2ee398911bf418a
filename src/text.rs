use crate::error::{Error, Result};

/// Position of the next byte in `bytes` that cannot appear verbatim inside
/// a quoted string: the quote, the backslash, or an unescaped control byte.
///
/// memchr covers the two sentinel bytes; the control scan only runs over
/// the clean prefix it found.
pub(crate) fn next_special(bytes: &[u8]) -> Option<usize> {
    let sentinel = memchr::memchr2(b'"', b'\\', bytes);
    let limit = sentinel.unwrap_or(bytes.len());
    match bytes[..limit].iter().position(|&b| b < 0x20) {
        Some(control) => Some(control),
        None => sentinel,
    }
}

/// Append `s` to `out` with JSON escaping applied.
pub(crate) fn escape_into(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let mut rest = bytes;
    let mut base = 0;
    while let Some(pos) = next_special(rest) {
        out.extend_from_slice(&rest[..pos]);
        push_escape(out, rest[pos]);
        base += pos + 1;
        rest = &bytes[base..];
    }
    out.extend_from_slice(rest);
}

fn push_escape(out: &mut Vec<u8>, byte: u8) {
    match byte {
        b'"' => out.extend_from_slice(b"\\\""),
        b'\\' => out.extend_from_slice(b"\\\\"),
        0x08 => out.extend_from_slice(b"\\b"),
        0x0C => out.extend_from_slice(b"\\f"),
        b'\n' => out.extend_from_slice(b"\\n"),
        b'\r' => out.extend_from_slice(b"\\r"),
        b'\t' => out.extend_from_slice(b"\\t"),
        ctl => {
            const HEX: &[u8; 16] = b"0123456789abcdef";
            out.extend_from_slice(b"\\u00");
            out.push(HEX[usize::from(ctl >> 4)]);
            out.push(HEX[usize::from(ctl & 0x0F)]);
        }
    }
}

/// Decode a payload the scanner has already validated. The error path is
/// structurally unreachable and degrades to a lossy copy rather than
/// propagating an impossible failure.
pub(crate) fn unescape_valid(payload: &[u8]) -> String {
    match unescape(payload, 0) {
        Ok(s) => s,
        Err(_) => String::from_utf8_lossy(payload).into_owned(),
    }
}

/// Writer output is always valid UTF-8; this keeps the conversion fallible
/// in the signature without an unsafe shortcut.
pub(crate) fn into_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| Error::syntax("emitted text was not valid utf-8", e.utf8_error().valid_up_to()))
}

/// Decode a string payload (the bytes between the quotes) into owned text.
///
/// `base` is the absolute offset of the payload start, used only for error
/// positions. The token reader has already validated escape shapes, so
/// errors here indicate a caller handing in an unvalidated span.
pub(crate) fn unescape(payload: &[u8], base: usize) -> Result<String> {
    let mut out = String::with_capacity(payload.len());
    let mut i = 0;
    while i < payload.len() {
        match next_special(&payload[i..]) {
            Some(pos) => {
                let clean = &payload[i..i + pos];
                out.push_str(utf8(clean, base + i)?);
                i += pos;
                if payload[i] != b'\\' {
                    return Err(Error::syntax("unescaped control byte in string", base + i));
                }
                i = decode_escape(payload, i, base, &mut out)?;
            }
            None => {
                out.push_str(utf8(&payload[i..], base + i)?);
                break;
            }
        }
    }
    Ok(out)
}

fn utf8(bytes: &[u8], offset: usize) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| {
        Error::syntax("invalid utf-8 in string", offset + e.valid_up_to())
    })
}

/// Decode one backslash sequence starting at `payload[i]`; returns the index
/// after the sequence.
fn decode_escape(payload: &[u8], i: usize, base: usize, out: &mut String) -> Result<usize> {
    let err = || Error::syntax("invalid escape sequence", base + i);
    let next = *payload.get(i + 1).ok_or_else(err)?;
    let consumed = match next {
        b'"' => {
            out.push('"');
            2
        }
        b'\\' => {
            out.push('\\');
            2
        }
        b'/' => {
            out.push('/');
            2
        }
        b'b' => {
            out.push('\u{0008}');
            2
        }
        b'f' => {
            out.push('\u{000C}');
            2
        }
        b'n' => {
            out.push('\n');
            2
        }
        b'r' => {
            out.push('\r');
            2
        }
        b't' => {
            out.push('\t');
            2
        }
        b'u' => {
            let high = hex4(payload, i + 2).ok_or_else(err)?;
            if (0xD800..0xDC00).contains(&high) {
                // High surrogate: a low surrogate escape must follow.
                if payload.get(i + 6) != Some(&b'\\') || payload.get(i + 7) != Some(&b'u') {
                    return Err(Error::syntax("unpaired surrogate escape", base + i));
                }
                let low = hex4(payload, i + 8).ok_or_else(err)?;
                if !(0xDC00..0xE000).contains(&low) {
                    return Err(Error::syntax("unpaired surrogate escape", base + i));
                }
                let scalar = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                out.push(char::from_u32(scalar).ok_or_else(err)?);
                12
            } else if (0xDC00..0xE000).contains(&high) {
                return Err(Error::syntax("unpaired surrogate escape", base + i));
            } else {
                out.push(char::from_u32(high).ok_or_else(err)?);
                6
            }
        }
        _ => return Err(err()),
    };
    Ok(i + consumed)
}

fn hex4(payload: &[u8], at: usize) -> Option<u32> {
    let chunk = payload.get(at..at + 4)?;
    let mut value = 0u32;
    for &b in chunk {
        let digit = (b as char).to_digit(16)?;
        value = value * 16 + digit;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escape(s: &str) -> String {
        let mut out = Vec::new();
        escape_into(&mut out, s);
        String::from_utf8(out).expect("escaped text is utf-8")
    }

    #[rstest::rstest]
    #[case("hello", "hello")]
    #[case("he said \"hi\"", "he said \\\"hi\\\"")]
    #[case("back\\slash", "back\\\\slash")]
    #[case("tab\there", "tab\\there")]
    #[case("line\nbreak", "line\\nbreak")]
    #[case("\u{0001}", "\\u0001")]
    #[case("héllo", "héllo")]
    fn test_escape(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape(input), expected);
    }

    #[rstest::rstest]
    #[case(b"hello", "hello")]
    #[case(b"a\\nb", "a\nb")]
    #[case(b"\\u0041", "A")]
    #[case(b"\\uD83D\\uDE00", "\u{1F600}")]
    #[case(b"\\\"quoted\\\"", "\"quoted\"")]
    #[case("caf\u{e9}".as_bytes(), "café")]
    fn test_unescape(#[case] payload: &[u8], #[case] expected: &str) {
        assert_eq!(unescape(payload, 0).expect("unescape"), expected);
    }

    #[rstest::rstest]
    #[case(b"\\x" as &[u8])]
    #[case(b"\\u12" as &[u8])]
    #[case(b"\\uD800" as &[u8])]
    #[case(b"\\uD800\\u0041" as &[u8])]
    #[case(b"\\uDC00" as &[u8])]
    #[case(b"trailing\\" as &[u8])]
    fn test_unescape_rejects(#[case] payload: &[u8]) {
        assert!(unescape(payload, 0).is_err());
    }

    #[rstest::rstest]
    fn test_escape_round_trip() {
        let original = "mixed \"content\" with \\ and \n and \u{1F980} and \u{0007}";
        let escaped = escape(original);
        let back = unescape(escaped.as_bytes(), 0).expect("unescape");
        assert_eq!(back, original);
    }

    #[rstest::rstest]
    fn test_error_offsets_are_absolute() {
        let err = unescape(b"abc\\q", 100).expect_err("invalid escape");
        assert_eq!(err.offset(), Some(103));
    }
}
