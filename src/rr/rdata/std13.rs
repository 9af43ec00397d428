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

//! Structured RDATA for the RFC 1035 types that zone data uses: SOA,
//! MX, and TXT.

use std::fmt;

use super::Error;
use crate::name::{decode_name, encode_name};
use crate::util::{read_u16, read_u32};

/// The longest TXT character-string that can be encoded.
pub const MAX_CHARACTER_STRING_LEN: usize = 255;

////////////////////////////////////////////////////////////////////////
// SOA                                                                //
////////////////////////////////////////////////////////////////////////

/// The decoded RDATA of an SOA record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Soa {
    pub mname: String,
    pub rname: String,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl Soa {
    /// Appends the wire form of this SOA RDATA to `buf`: MNAME, RNAME,
    /// and then the five 32-bit fields in network byte order.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        encode_name(&self.mname, buf)?;
        encode_name(&self.rname, buf)?;
        for field in [
            self.serial,
            self.refresh,
            self.retry,
            self.expire,
            self.minimum,
        ] {
            buf.extend_from_slice(&field.to_be_bytes());
        }
        Ok(())
    }
}

impl fmt::Display for Soa {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.mname, self.rname, self.serial, self.refresh, self.retry, self.expire, self.minimum,
        )
    }
}

/// Decodes SOA RDATA. The RDATA must be consumed exactly.
pub fn decode_soa_rdata(octets: &[u8]) -> Result<Soa, Error> {
    let (mname, mname_len) = decode_name(octets, 0)?;
    let (rname, rname_len) = decode_name(octets, mname_len)?;
    let fields = &octets[mname_len + rname_len..];
    if fields.len() < 20 {
        return Err(Error::Truncated);
    } else if fields.len() > 20 {
        return Err(Error::TrailingData);
    }
    let field = |i: usize| read_u32(&fields[4 * i..]).ok_or(Error::Truncated);
    Ok(Soa {
        mname,
        rname,
        serial: field(0)?,
        refresh: field(1)?,
        retry: field(2)?,
        expire: field(3)?,
        minimum: field(4)?,
    })
}

////////////////////////////////////////////////////////////////////////
// MX                                                                 //
////////////////////////////////////////////////////////////////////////

/// The decoded RDATA of an MX record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mx {
    pub preference: u16,
    pub exchange: String,
}

impl Mx {
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        let start = buf.len();
        buf.extend_from_slice(&self.preference.to_be_bytes());
        encode_name(&self.exchange, buf).map_err(|e| {
            buf.truncate(start);
            e.into()
        })
    }
}

impl fmt::Display for Mx {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.preference, self.exchange)
    }
}

/// Decodes MX RDATA. The RDATA must be consumed exactly.
pub fn decode_mx_rdata(octets: &[u8]) -> Result<Mx, Error> {
    let preference = read_u16(octets).ok_or(Error::Truncated)?;
    let (exchange, exchange_len) = decode_name(octets, 2)?;
    if 2 + exchange_len != octets.len() {
        return Err(Error::TrailingData);
    }
    Ok(Mx {
        preference,
        exchange,
    })
}

////////////////////////////////////////////////////////////////////////
// TXT                                                                //
////////////////////////////////////////////////////////////////////////

/// Appends `text` as a single length-prefixed character-string.
pub fn encode_txt(text: &[u8], buf: &mut Vec<u8>) -> Result<(), Error> {
    if text.len() > MAX_CHARACTER_STRING_LEN {
        return Err(Error::TxtTooLong);
    }
    buf.push(text.len() as u8);
    buf.extend_from_slice(text);
    Ok(())
}

/// Decodes TXT RDATA consisting of a single character-string.
pub fn decode_txt_rdata(octets: &[u8]) -> Result<Vec<u8>, Error> {
    let (len, text) = octets.split_first().ok_or(Error::Truncated)?;
    match text.len().cmp(&(*len as usize)) {
        std::cmp::Ordering::Less => Err(Error::Truncated),
        std::cmp::Ordering::Greater => Err(Error::TrailingData),
        std::cmp::Ordering::Equal => Ok(text.to_vec()),
    }
}

/// Writes `text` as a quoted string, escaping `"` and `\` with a
/// backslash and non-printable octets as `\DDD`.
pub fn fmt_quoted(text: &[u8], f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str("\"")?;
    for &octet in text {
        match octet {
            b'"' | b'\\' => write!(f, "\\{}", octet as char)?,
            0x20..=0x7e => write!(f, "{}", octet as char)?,
            _ => write!(f, "\\{:03}", octet)?,
        }
    }
    f.write_str("\"")
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
