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

//! Implementation of the [`RecordData`] type and DNS RDATA processing.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::Type;
use crate::name::{self, decode_name, encode_name};

mod std13;
mod tsig;
pub use std13::*;
pub use tsig::*;

/// The largest RDATA that fits in the 16-bit RDLENGTH field.
pub const MAX_RDATA_LEN: usize = u16::MAX as usize;

////////////////////////////////////////////////////////////////////////
// RECORD DATA                                                        //
////////////////////////////////////////////////////////////////////////

/// The structured form of a record's RDATA.
///
/// Types without a dedicated variant are carried as opaque octets in
/// [`RecordData::Other`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(String),
    Cname(String),
    Ptr(String),
    Mx(Mx),
    Txt(Txt),
    Soa(Soa),
    Other(Type, Vec<u8>),
}

impl RecordData {
    /// Returns the RR type this data belongs to.
    pub fn rr_type(&self) -> Type {
        match self {
            Self::A(_) => Type::A,
            Self::Aaaa(_) => Type::AAAA,
            Self::Ns(_) => Type::NS,
            Self::Cname(_) => Type::CNAME,
            Self::Ptr(_) => Type::PTR,
            Self::Mx(_) => Type::MX,
            Self::Txt(_) => Type::TXT,
            Self::Soa(_) => Type::SOA,
            Self::Other(rr_type, _) => *rr_type,
        }
    }

    /// Appends the wire form of this data to `buf`. On failure, `buf`
    /// is left unchanged.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        let start = buf.len();
        let result = match self {
            Self::A(address) => {
                buf.extend_from_slice(&address.octets());
                Ok(())
            }
            Self::Aaaa(address) => {
                buf.extend_from_slice(&address.octets());
                Ok(())
            }
            Self::Ns(target) | Self::Cname(target) | Self::Ptr(target) => {
                encode_name(target, buf).map_err(Error::from)
            }
            Self::Mx(mx) => mx.encode(buf),
            Self::Txt(txt) => encode_txt(txt.as_bytes(), buf),
            Self::Soa(soa) => soa.encode(buf),
            Self::Other(_, octets) => {
                buf.extend_from_slice(octets);
                Ok(())
            }
        };
        if result.is_ok() && buf.len() - start > MAX_RDATA_LEN {
            buf.truncate(start);
            return Err(Error::TooLong);
        }
        if result.is_err() {
            buf.truncate(start);
        }
        result
    }

    /// Returns the wire form of this data as a new vector.
    pub fn to_wire(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }

    /// Decodes RDATA of type `rr_type`. Unknown types decode to
    /// [`RecordData::Other`].
    pub fn decode(rr_type: Type, octets: &[u8]) -> Result<Self, Error> {
        match rr_type {
            Type::A => {
                let array: [u8; 4] = octets.try_into().map_err(|_| Error::WrongLength)?;
                Ok(Self::A(array.into()))
            }
            Type::AAAA => {
                let array: [u8; 16] = octets.try_into().map_err(|_| Error::WrongLength)?;
                Ok(Self::Aaaa(array.into()))
            }
            Type::NS => decode_lone_name(octets).map(Self::Ns),
            Type::CNAME => decode_lone_name(octets).map(Self::Cname),
            Type::PTR => decode_lone_name(octets).map(Self::Ptr),
            Type::MX => decode_mx_rdata(octets).map(Self::Mx),
            Type::TXT => decode_txt_rdata(octets).and_then(Txt::new).map(Self::Txt),
            Type::SOA => decode_soa_rdata(octets).map(Self::Soa),
            _ => Ok(Self::Other(rr_type, octets.to_vec())),
        }
    }
}

impl fmt::Display for RecordData {
    /// Formats the data in the value column format of zone files.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::A(address) => fmt::Display::fmt(address, f),
            Self::Aaaa(address) => fmt::Display::fmt(address, f),
            Self::Ns(target) | Self::Cname(target) | Self::Ptr(target) => f.write_str(target),
            Self::Mx(mx) => fmt::Display::fmt(mx, f),
            Self::Txt(txt) => fmt_quoted(txt.as_bytes(), f),
            Self::Soa(soa) => fmt::Display::fmt(soa, f),
            Self::Other(_, octets) => {
                // RFC 3597 § 5 generic encoding.
                write!(f, "\\# {}", octets.len())?;
                if !octets.is_empty() {
                    f.write_str(" ")?;
                    for octet in octets {
                        write!(f, "{:02x}", octet)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn decode_lone_name(octets: &[u8]) -> Result<String, Error> {
    let (name, len) = decode_name(octets, 0)?;
    if len == octets.len() {
        Ok(name)
    } else {
        Err(Error::TrailingData)
    }
}

////////////////////////////////////////////////////////////////////////
// TXT VALUES                                                         //
////////////////////////////////////////////////////////////////////////

/// TXT text that is known to fit in a single character-string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Txt(Vec<u8>);

impl Txt {
    /// Wraps `text`, failing with [`Error::TxtTooLong`] if it is longer
    /// than 255 octets.
    pub fn new(text: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let text = text.into();
        if text.len() > MAX_CHARACTER_STRING_LEN {
            Err(Error::TxtTooLong)
        } else {
            Ok(Self(text))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that RDATA could not be encoded or decoded.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// An embedded name was invalid.
    InvalidName(name::Error),

    /// TXT text was longer than 255 octets.
    TxtTooLong,

    /// The RDATA would exceed 65,535 octets.
    TooLong,

    /// Fixed-size RDATA (A or AAAA) had the wrong length.
    WrongLength,

    /// The RDATA ended before all fields were read.
    Truncated,

    /// Octets remained after all fields were read.
    TrailingData,
}

impl From<name::Error> for Error {
    fn from(err: name::Error) -> Self {
        Self::InvalidName(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidName(err) => write!(f, "invalid embedded name: {}", err),
            Self::TxtTooLong => f.write_str("TXT string is longer than 255 octets"),
            Self::TooLong => f.write_str("RDATA is longer than 65,535 octets"),
            Self::WrongLength => f.write_str("RDATA has the wrong length for its type"),
            Self::Truncated => f.write_str("RDATA is truncated"),
            Self::TrailingData => f.write_str("RDATA has trailing data"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidName(err) => Some(err),
            _ => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
