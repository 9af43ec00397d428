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

//! Reading and writing of zone data in a simple line-oriented text
//! format.
//!
//! Each line holds one record: `<owner> <TYPE> <value> <ttl>`. Blank
//! lines and lines starting with `#` are ignored. Every record is of
//! class IN. The value depends on the type:
//!
//! * `A`, `AAAA`: an address.
//! * `NS`, `CNAME`, `PTR`: a domain name.
//! * `TXT`: a single `<character-string>`, normally quoted.
//! * `MX`: `"<preference> <exchange>"` as one quoted field, or as two
//!   unquoted fields.
//! * `SOA`: seven fields, `<mname> <rname> <serial> <refresh> <retry>
//!   <expire> <minimum>`.
//! * Any type: the [RFC 3597 § 5] generic form, `\# <length> <hex>`.
//!
//! Names without a trailing dot are taken as fully qualified.
//!
//! ```
//! use std::io::Cursor;
//! use sextant::rr::Type;
//! use sextant::zone_file::Parser;
//!
//! const ZONE_FILE: &[u8] = br#"
//! ## sextant.test
//! sextant.test. SOA ns1.sextant.test. admin.sextant.test. 1 3600 900 86400 3600 86400
//! sextant.test. NS ns1.sextant.test. 86400
//! ns1.sextant.test. A 127.0.0.1 3600
//! sextant.test. TXT "hello, world" 300
//! "#;
//!
//! let mut parser = Parser::new(Cursor::new(ZONE_FILE));
//! assert_eq!(parser.next().unwrap().unwrap().rr_type(), Type::SOA);
//! assert_eq!(parser.next().unwrap().unwrap().rr_type(), Type::NS);
//! assert_eq!(parser.next().unwrap().unwrap().rr_type(), Type::A);
//! assert_eq!(parser.next().unwrap().unwrap().rr_type(), Type::TXT);
//! assert!(parser.next().is_none());
//! ```
//!
//! [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5

use std::io::{self, BufRead, Write};

use crate::rr::{RecordData, ResourceRecord};

pub mod error;
mod fields;
mod record;

pub use error::{Error, ErrorDetails, ErrorKind, Result};
use fields::split_fields;
use record::parse_record;

////////////////////////////////////////////////////////////////////////
// PARSER                                                             //
////////////////////////////////////////////////////////////////////////

/// A parser for zone files in the format described in the
/// [module-level documentation](self).
///
/// A `Parser` is an iterator of records. Since every line stands on
/// its own, iteration continues after a syntax error, so that callers
/// can skip bad lines. It ends after an I/O error.
pub struct Parser<S> {
    stream: S,
    line: usize,
    buf: Vec<u8>,
    failed: bool,
}

impl<S: BufRead> Parser<S> {
    /// Creates a new [`Parser`] to read a zone file from the provided
    /// stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            line: 0,
            buf: Vec::new(),
            failed: false,
        }
    }

    /// Reads the next line into `self.buf`. Returns `false` at EOF.
    fn read_line(&mut self) -> io::Result<bool> {
        self.buf.clear();
        let read = self.stream.read_until(b'\n', &mut self.buf)?;
        self.line += 1;
        Ok(read > 0)
    }
}

impl<S: BufRead> Iterator for Parser<S> {
    type Item = Result<ResourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            match self.read_line() {
                Ok(true) => (),
                Ok(false) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            }
            let line = trim(&self.buf);
            if line.is_empty() || line[0] == b'#' {
                continue;
            }
            return Some(
                split_fields(line)
                    .and_then(|fields| parse_record(&fields))
                    .map_err(|kind| Error::new(self.line, kind)),
            );
        }
    }
}

fn trim(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}

////////////////////////////////////////////////////////////////////////
// WRITING                                                            //
////////////////////////////////////////////////////////////////////////

/// Writes `records` to `writer`, one per line, in the format that
/// [`Parser`] reads. Records whose RDATA cannot be decoded for their
/// type are written in the generic `\#` form.
pub fn write_records<'a, W: Write>(
    mut writer: W,
    records: impl IntoIterator<Item = &'a ResourceRecord>,
) -> io::Result<()> {
    for record in records {
        let data = match record.data() {
            Ok(data) => data,
            Err(_) => RecordData::Other(record.rr_type(), record.wire_rdata().to_vec()),
        };
        writeln!(
            writer,
            "{} {} {} {}",
            record.owner(),
            record.rr_type(),
            data,
            record.ttl()
        )?;
    }
    writer.flush()
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
