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

//! Splitting of zone file lines into fields, including quoting and
//! escape sequences.
//!
//! Fields are separated by unquoted spaces and tabs. Double quotes may
//! appear anywhere in a field; they group text (including whitespace)
//! without becoming part of the field. A backslash escapes the next
//! octet, or with three decimal digits (`\DDD`), gives an octet by
//! value, as in [RFC 1035 § 5.1]. An unquoted field consisting of just
//! `\#` is the [RFC 3597 § 5] generic RDATA marker and is reported as
//! such rather than as the text `#`.
//!
//! Each field also keeps its raw text (quotes removed, escapes left as
//! written), which is what domain names are parsed from: a name's
//! escapes are resolved label by label when it is encoded, so that an
//! escaped `.` stays inside its label.
//!
//! [RFC 1035 § 5.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-5.1
//! [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5

use super::ErrorKind;

/// A field of a zone file line, with quotes removed and escapes
/// processed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(super) struct Field {
    pub octets: Vec<u8>,
    pub raw: Vec<u8>,
    pub quoted: bool,
    pub generic_marker: bool,
}

impl Field {
    pub fn as_str(&self) -> Result<&str, ErrorKind> {
        std::str::from_utf8(&self.octets).map_err(ErrorKind::BadUtf8)
    }

    /// Returns the raw text of the field, escapes included.
    pub fn raw_str(&self) -> Result<&str, ErrorKind> {
        std::str::from_utf8(&self.raw).map_err(ErrorKind::BadUtf8)
    }
}

/// Splits `line` into fields.
pub(super) fn split_fields(line: &[u8]) -> Result<Vec<Field>, ErrorKind> {
    let mut fields = Vec::new();
    let mut current: Option<Field> = None;
    let mut in_quotes = false;
    let mut octets = line.iter().copied();

    while let Some(octet) = octets.next() {
        match octet {
            b'"' => {
                current.get_or_insert_with(Field::default).quoted = true;
                in_quotes = !in_quotes;
            }
            b' ' | b'\t' if !in_quotes => {
                if let Some(field) = current.take() {
                    fields.push(field);
                }
            }
            b'\\' => {
                let field = current.get_or_insert_with(Field::default);
                let escaped = parse_escape(&mut octets)?;
                field.raw.push(b'\\');
                match escaped {
                    Escaped::Octet(value) => field.raw.push(value),
                    Escaped::Decimal(value) => {
                        field.raw.extend_from_slice(format!("{:03}", value).as_bytes())
                    }
                }
                if escaped == Escaped::Octet(b'#') && !in_quotes && field.octets.is_empty() {
                    field.generic_marker = true;
                } else {
                    match escaped {
                        Escaped::Octet(value) | Escaped::Decimal(value) => {
                            field.octets.push(value)
                        }
                    }
                }
            }
            _ => {
                let field = current.get_or_insert_with(Field::default);
                field.octets.push(octet);
                field.raw.push(octet);
            }
        }
    }

    if in_quotes {
        return Err(ErrorKind::EolInQuotedString);
    }
    if let Some(field) = current {
        fields.push(field);
    }
    // A marker followed by more text in the same field is not a marker.
    for field in fields.iter_mut() {
        if field.generic_marker && !field.octets.is_empty() {
            field.generic_marker = false;
            field.octets.insert(0, b'#');
        }
    }
    Ok(fields)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Escaped {
    Octet(u8),
    Decimal(u8),
}

/// Parses an escape sequence after the leading `\` has been consumed.
fn parse_escape(octets: &mut impl Iterator<Item = u8>) -> Result<Escaped, ErrorKind> {
    let first = octets.next().ok_or(ErrorKind::EolInEscape)?;
    if !first.is_ascii_digit() {
        return Ok(Escaped::Octet(first));
    }
    let second = octets.next().ok_or(ErrorKind::EolInEscape)?;
    let third = octets.next().ok_or(ErrorKind::EolInEscape)?;
    if !second.is_ascii_digit() || !third.is_ascii_digit() {
        return Err(ErrorKind::EscapeNeedsThreeDigits);
    }
    let hundreds = (first - b'0') as usize;
    let tens = (second - b'0') as usize;
    let ones = (third - b'0') as usize;
    let value = 100 * hundreds + 10 * tens + ones;
    value
        .try_into()
        .map(Escaped::Decimal)
        .map_err(|_| ErrorKind::EscapeValueOutOfRange)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
