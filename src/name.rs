// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Owner names and their on-the-wire encoding.
//!
//! Names are carried around as dot-terminated strings (e.g.
//! `"www.example.com."`), with their case preserved. On the wire, a name
//! is a sequence of labels, each prefixed by its length in one octet,
//! and terminated by the null label (see [RFC 1035 § 3.1]).
//!
//! Label octets that are not printable ASCII, along with `.`, `\`,
//! `"`, and `#`, are written in the `\DDD` escape form of
//! [RFC 1035 § 5.1] when a name is decoded, and the same escapes (plus
//! `\X` for a literal `X`) are understood when a name is encoded. Any
//! label a client sends therefore survives a decode/encode round trip
//! octet for octet.
//!
//! Name compression ([RFC 1035 § 4.1.4]) is not supported in either
//! direction. [`decode_name`] rejects pointer labels with
//! [`Error::CompressionUnsupported`], and [`encode_name`] never emits
//! them.
//!
//! [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
//! [RFC 1035 § 4.1.4]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.4
//! [RFC 1035 § 5.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-5.1

use std::fmt;

/// The maximum length of a label, not including its length octet.
pub const MAX_LABEL_LEN: usize = 63;

/// The maximum length of a name on the wire.
pub const MAX_WIRE_LEN: usize = 255;

/// The label that marks a wildcard domain name.
pub const WILDCARD_LABEL: &str = "*";

////////////////////////////////////////////////////////////////////////
// ENCODING                                                           //
////////////////////////////////////////////////////////////////////////

/// Serializes `name` onto the end of `buf`.
///
/// The name is split into labels at unescaped dots. Empty labels (as
/// produced by consecutive dots) are skipped, so `"a..b."` encodes the
/// same as `"a.b."`, and both `""` and `"."` encode as the root name.
/// On failure, `buf` is left unchanged.
pub fn encode_name(name: &str, buf: &mut Vec<u8>) -> Result<(), Error> {
    let start = buf.len();
    let result = encode_name_unchecked(name, buf);
    if result.is_err() {
        buf.truncate(start);
    }
    result
}

fn encode_name_unchecked(name: &str, buf: &mut Vec<u8>) -> Result<(), Error> {
    let start = buf.len();
    for label in parse_labels(name)? {
        if label.len() > MAX_LABEL_LEN {
            return Err(Error::LabelTooLong);
        }
        buf.push(label.len() as u8);
        buf.extend_from_slice(&label);
    }
    buf.push(0);
    if buf.len() - start > MAX_WIRE_LEN {
        Err(Error::NameTooLong)
    } else {
        Ok(())
    }
}

/// Splits the textual `name` into its (unescaped, non-empty) labels.
fn parse_labels(name: &str) -> Result<Vec<Vec<u8>>, Error> {
    let mut labels = Vec::new();
    let mut label = Vec::new();
    let mut octets = name.bytes();
    while let Some(octet) = octets.next() {
        match octet {
            b'.' => {
                if !label.is_empty() {
                    labels.push(std::mem::take(&mut label));
                }
            }
            b'\\' => label.push(parse_escape(&mut octets)?),
            _ => label.push(octet),
        }
    }
    if !label.is_empty() {
        labels.push(label);
    }
    Ok(labels)
}

/// Parses the rest of an escape sequence after its `\`.
fn parse_escape(octets: &mut impl Iterator<Item = u8>) -> Result<u8, Error> {
    let first = octets.next().ok_or(Error::InvalidEscape)?;
    if !first.is_ascii_digit() {
        return Ok(first);
    }
    let mut value = (first - b'0') as u16;
    for _ in 0..2 {
        match octets.next() {
            Some(digit) if digit.is_ascii_digit() => value = value * 10 + (digit - b'0') as u16,
            _ => return Err(Error::InvalidEscape),
        }
    }
    u8::try_from(value).map_err(|_| Error::InvalidEscape)
}

/// Returns the on-the-wire representation of `name` as a new vector.
pub fn name_to_wire(name: &str) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::with_capacity(name.len() + 2);
    encode_name(name, &mut buf)?;
    Ok(buf)
}

////////////////////////////////////////////////////////////////////////
// DECODING                                                           //
////////////////////////////////////////////////////////////////////////

/// Reads an uncompressed name starting at index `start` of `octets`.
///
/// Labels are joined with `.` separators and a trailing `.` is
/// appended; the root name decodes to `"."`. On success, the name and
/// the number of octets it occupied (including the null label) are
/// returned.
///
/// Octets that cannot stand for themselves in the textual form are
/// escaped as `\DDD` (see the [module-level documentation](self)).
pub fn decode_name(octets: &[u8], start: usize) -> Result<(String, usize), Error> {
    let mut name = String::new();
    let mut index = start;
    loop {
        let len = *octets.get(index).ok_or(Error::UnexpectedEom)? as usize;
        if len & 0xc0 != 0 {
            // Both pointers (0b11) and the reserved label types (0b01,
            // 0b10) land here.
            return Err(Error::CompressionUnsupported);
        }
        index += 1;
        if len == 0 {
            break;
        }
        let label = octets
            .get(index..index + len)
            .ok_or(Error::UnexpectedEom)?;
        push_label(&mut name, label);
        name.push('.');
        index += len;
        if index - start > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
    }
    if name.is_empty() {
        name.push('.');
    }
    Ok((name, index - start))
}

/// Appends the textual form of `label` to `name`.
fn push_label(name: &mut String, label: &[u8]) {
    for &octet in label {
        if needs_escape(octet) {
            name.push_str(&format!("\\{:03}", octet));
        } else {
            name.push(octet as char);
        }
    }
}

fn needs_escape(octet: u8) -> bool {
    !(0x21..=0x7e).contains(&octet) || matches!(octet, b'.' | b'\\' | b'"' | b'#')
}

////////////////////////////////////////////////////////////////////////
// TEXTUAL HELPERS                                                    //
////////////////////////////////////////////////////////////////////////

/// Returns `name` with a trailing dot, appending one if necessary. The
/// case of the name is preserved.
pub fn fully_qualified(name: &str) -> String {
    if ends_with_separator(name) {
        name.to_owned()
    } else {
        format!("{}.", name)
    }
}

/// Returns whether `name` ends with a dot that is not escaped.
fn ends_with_separator(name: &str) -> bool {
    match name.strip_suffix('.') {
        Some(rest) => rest.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 0,
        None => false,
    }
}

/// Returns the form of `name` used as a lookup key: ASCII-lowercased,
/// dot-terminated, and with escapes written the way [`decode_name`]
/// writes them, so that `a\.b.` and `A\046B` give the same key.
/// A name with a malformed escape is just lowercased.
pub fn normalize(name: &str) -> String {
    let labels = match parse_labels(name) {
        Ok(labels) => labels,
        Err(_) => {
            let mut normalized = fully_qualified(name);
            normalized.make_ascii_lowercase();
            return normalized;
        }
    };
    if labels.is_empty() {
        return ".".to_owned();
    }
    let mut normalized = String::with_capacity(name.len() + 1);
    for mut label in labels {
        label.make_ascii_lowercase();
        push_label(&mut normalized, &label);
        normalized.push('.');
    }
    normalized
}

/// Returns whether two names are equal, ignoring ASCII case and a
/// trailing dot.
pub fn eq_ignore_case(first: &str, second: &str) -> bool {
    let first = first.strip_suffix('.').unwrap_or(first);
    let second = second.strip_suffix('.').unwrap_or(second);
    first.eq_ignore_ascii_case(second)
}

/// Returns whether `name` is equal to or below `zone`. Both names must
/// already be [normalized](normalize). The comparison respects label
/// boundaries, so `badexample.com.` is not within `example.com.`.
pub fn is_within(name: &str, zone: &str) -> bool {
    if zone == "." {
        return true;
    }
    match name.strip_suffix(zone) {
        Some("") => true,
        Some(prefix) => prefix.ends_with('.'),
        None => false,
    }
}

/// Produces the wildcard names to try for `name`, in order.
///
/// For a name with labels `l0.l1. ... .ln.`, the `i`th candidate is
/// the name with label `li` replaced by `*`, for `i` from the leftmost
/// label up to (but not including) the last label. So
/// `test.wild.example.com.` yields `*.wild.example.com.`,
/// `test.*.example.com.`, and `test.wild.*.com.`.
pub fn wildcard_candidates(name: &str) -> Vec<String> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return Vec::new();
    }
    let labels: Vec<&str> = trimmed.split('.').collect();
    (0..labels.len() - 1)
        .map(|i| {
            let mut candidate = labels.clone();
            candidate[i] = WILDCARD_LABEL;
            let mut joined = candidate.join(".");
            joined.push('.');
            joined
        })
        .collect()
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error encountered while encoding or decoding a name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// A compression pointer or reserved label type was encountered.
    CompressionUnsupported,

    /// A label was longer than 63 octets.
    LabelTooLong,

    /// The name is longer than 255 octets on the wire.
    NameTooLong,

    /// The buffer ended before the null label was reached.
    UnexpectedEom,

    /// A `\` was not followed by a character or by three digits giving
    /// an octet value.
    InvalidEscape,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::CompressionUnsupported => f.write_str("compressed names are not supported"),
            Self::LabelTooLong => f.write_str("label is longer than 63 octets"),
            Self::NameTooLong => f.write_str("name is longer than 255 octets on the wire"),
            Self::UnexpectedEom => f.write_str("unexpected end of message"),
            Self::InvalidEscape => f.write_str("invalid escape sequence in name"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE_COM_WIRE: &[u8] = b"\x07example\x03com\x00";

    #[test]
    fn encode_works() {
        assert_eq!(name_to_wire("example.com.").unwrap(), EXAMPLE_COM_WIRE);
        assert_eq!(name_to_wire("example.com").unwrap(), EXAMPLE_COM_WIRE);
        assert_eq!(name_to_wire(".").unwrap(), b"\x00");
        assert_eq!(name_to_wire("").unwrap(), b"\x00");
    }

    #[test]
    fn encode_skips_empty_labels() {
        assert_eq!(name_to_wire("example..com.").unwrap(), EXAMPLE_COM_WIRE);
    }

    #[test]
    fn encode_rejects_long_labels_and_names() {
        let long_label = format!("{}.com.", "a".repeat(64));
        assert_eq!(name_to_wire(&long_label), Err(Error::LabelTooLong));
        let long_name = format!("{}.", vec!["a".repeat(63); 4].join("."));
        assert_eq!(name_to_wire(&long_name), Err(Error::NameTooLong));
    }

    #[test]
    fn encode_leaves_buffer_alone_on_failure() {
        let mut buf = vec![1, 2, 3];
        let long_label = format!("ok.{}.com.", "a".repeat(64));
        assert!(encode_name(&long_label, &mut buf).is_err());
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn decode_works() {
        let mut message = vec![0xaa, 0xbb];
        message.extend_from_slice(EXAMPLE_COM_WIRE);
        message.extend_from_slice(b"\x00\x01");
        assert_eq!(
            decode_name(&message, 2).unwrap(),
            ("example.com.".to_owned(), EXAMPLE_COM_WIRE.len()),
        );
        assert_eq!(decode_name(b"\x00", 0).unwrap(), (".".to_owned(), 1));
    }

    #[test]
    fn decode_preserves_case() {
        let (name, _) = decode_name(b"\x03WwW\x07ExAmPlE\x00", 0).unwrap();
        assert_eq!(name, "WwW.ExAmPlE.");
    }

    #[test]
    fn decode_rejects_truncated_names() {
        assert_eq!(
            decode_name(b"\x07example\x03co", 0),
            Err(Error::UnexpectedEom)
        );
        assert_eq!(
            decode_name(b"\x07example", 0),
            Err(Error::UnexpectedEom)
        );
        assert_eq!(decode_name(b"", 0), Err(Error::UnexpectedEom));
    }

    #[test]
    fn decode_rejects_pointers() {
        assert_eq!(
            decode_name(b"\x03www\xc0\x0c", 0),
            Err(Error::CompressionUnsupported)
        );
    }

    #[test]
    fn non_text_octets_survive_a_round_trip() {
        let wire = b"\x02\xffa\x07example\x00";
        let (name, len) = decode_name(wire, 0).unwrap();
        assert_eq!(name, "\\255a.example.");
        assert_eq!(len, wire.len());
        assert_eq!(name_to_wire(&name).unwrap(), wire);
    }

    #[test]
    fn full_length_binary_labels_survive_a_round_trip() {
        let mut wire = vec![63];
        wire.extend_from_slice(&[0xff; 63]);
        wire.push(0);
        let (name, _) = decode_name(&wire, 0).unwrap();
        assert_eq!(name_to_wire(&name).unwrap(), wire);
    }

    #[test]
    fn dots_and_backslashes_inside_labels_are_escaped() {
        let wire = b"\x03a.b\x03c\\d\x00";
        let (name, _) = decode_name(wire, 0).unwrap();
        assert_eq!(name, "a\\046b.c\\092d.");
        assert_eq!(name_to_wire(&name).unwrap(), wire);
        assert_eq!(name_to_wire("a\\.b.").unwrap(), b"\x03a.b\x00");
    }

    #[test]
    fn bad_escapes_are_rejected() {
        assert_eq!(name_to_wire("a\\"), Err(Error::InvalidEscape));
        assert_eq!(name_to_wire("a\\25"), Err(Error::InvalidEscape));
        assert_eq!(name_to_wire("a\\2x5"), Err(Error::InvalidEscape));
        assert_eq!(name_to_wire("a\\256"), Err(Error::InvalidEscape));
    }

    #[test]
    fn normalize_works() {
        assert_eq!(normalize("WWW.Example.COM"), "www.example.com.");
        assert_eq!(normalize("www.example.com."), "www.example.com.");
        assert_eq!(fully_qualified("Example.com"), "Example.com.");
        assert!(eq_ignore_case("Key.Example.", "key.example"));
        assert_eq!(normalize("A\\.B.example"), "a\\046b.example.");
        assert_eq!(normalize("a\\046b.example."), "a\\046b.example.");
        assert_eq!(normalize("x\\."), "x\\046.");
        assert_eq!(fully_qualified("x\\."), "x\\..");
        assert_eq!(normalize(""), ".");
    }

    #[test]
    fn is_within_respects_label_boundaries() {
        assert!(is_within("example.com.", "example.com."));
        assert!(is_within("www.example.com.", "example.com."));
        assert!(!is_within("badexample.com.", "example.com."));
        assert!(!is_within("example.org.", "example.com."));
        assert!(is_within("anything.", "."));
    }

    #[test]
    fn wildcard_candidates_scan_left_to_right() {
        assert_eq!(
            wildcard_candidates("test.wild.example.com."),
            [
                "*.wild.example.com.",
                "test.*.example.com.",
                "test.wild.*.com.",
            ],
        );
        assert!(wildcard_candidates("com.").is_empty());
        assert!(wildcard_candidates(".").is_empty());
    }
}
