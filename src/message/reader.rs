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

//! Implementation of the [`Reader`] type to read on-the-wire DNS
//! messages.

use std::fmt;

use super::constants::HEADER_SIZE;
use super::{Header, Question};
use crate::class::Class;
use crate::name::{self, decode_name};
use crate::rr::Type;
use crate::util;

////////////////////////////////////////////////////////////////////////
// READER                                                             //
////////////////////////////////////////////////////////////////////////

/// A "frame" around a buffer containing a DNS message that enables
/// reading the message data.
///
/// A `Reader` is constructed using its [`TryFrom`] implementation,
/// which fails unless the buffer holds at least a full 12-octet
/// header. Questions and records are then read sequentially with
/// [`Reader::read_question`] and [`Reader::read_rr`], starting just
/// after the header.
#[derive(Debug, Eq, PartialEq)]
pub struct Reader<'a> {
    octets: &'a [u8],
    header: Header,
    cursor: usize,
}

impl<'a> Reader<'a> {
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the index of the next octet to be read.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Reads a [`Question`] starting at the current cursor.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_question(&mut self) -> Result<Question> {
        let (qname, qname_len) = decode_name(self.octets, self.cursor)?;
        let qname_end = self.cursor + qname_len;
        let qtype = read_u16(self.octets, qname_end)?.into();
        let qclass = read_u16(self.octets, qname_end + 2)?.into();
        self.cursor = qname_end + 4;
        Ok(Question {
            qname,
            qtype,
            qclass,
        })
    }

    /// Reads a resource record at the current cursor.
    ///
    /// This method is atomic, in that the cursor is not changed on
    /// failure.
    pub fn read_rr(&mut self) -> Result<ReadRr<'a>> {
        let start = self.cursor;
        let (owner, owner_len) = decode_name(self.octets, start)?;
        let owner_end = start + owner_len;
        let rr_type = read_u16(self.octets, owner_end)?.into();
        let class = read_u16(self.octets, owner_end + 2)?.into();
        let ttl = read_u32(self.octets, owner_end + 4)?;
        let rdlength = read_u16(self.octets, owner_end + 8)? as usize;
        let rdata_start = owner_end + 10;
        let rdata = self
            .octets
            .get(rdata_start..rdata_start + rdlength)
            .ok_or(Error::UnexpectedEomInField)?;
        self.cursor = rdata_start + rdlength;
        Ok(ReadRr {
            start,
            owner,
            rr_type,
            class,
            ttl,
            rdata,
        })
    }

    /// Returns whether the `Reader`'s cursor has reached the end of the
    /// message.
    pub fn at_eom(&self) -> bool {
        self.cursor >= self.octets.len()
    }
}

impl<'a> TryFrom<&'a [u8]> for Reader<'a> {
    type Error = Error;

    fn try_from(octets: &'a [u8]) -> Result<Self> {
        let header = Header::parse(octets).ok_or(Error::HeaderTooShort)?;
        Ok(Self {
            octets,
            header,
            cursor: HEADER_SIZE,
        })
    }
}

/// Parses the header and the first question of a message.
///
/// QDCOUNT is not consulted: the question is read from just after the
/// header regardless, and anything following it is ignored.
pub fn parse_message(octets: &[u8]) -> Result<(Header, Question)> {
    let mut reader = Reader::try_from(octets)?;
    let question = reader.read_question()?;
    Ok((reader.header, question))
}

fn read_u16(octets: &[u8], start: usize) -> Result<u16> {
    octets
        .get(start..)
        .and_then(util::read_u16)
        .ok_or(Error::UnexpectedEomInField)
}

fn read_u32(octets: &[u8], start: usize) -> Result<u32> {
    octets
        .get(start..)
        .and_then(util::read_u32)
        .ok_or(Error::UnexpectedEomInField)
}

////////////////////////////////////////////////////////////////////////
// READ RR STRUCTURE                                                  //
////////////////////////////////////////////////////////////////////////

/// A structure containing RR data as returned by [`Reader::read_rr`].
///
/// The RDATA is borrowed from the message. `start` is the index of the
/// first octet of the record within the message, which is what TSIG
/// verification needs to find the signed prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadRr<'a> {
    pub start: usize,
    pub owner: String,
    pub rr_type: Type,
    pub class: Class,
    pub ttl: u32,
    pub rdata: &'a [u8],
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a message could not be read.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    HeaderTooShort,
    UnexpectedEomInField,
    InvalidName(name::Error),
}

impl From<name::Error> for Error {
    fn from(err: name::Error) -> Self {
        Self::InvalidName(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::HeaderTooShort => f.write_str("header too short"),
            Self::UnexpectedEomInField => f.write_str("unexpected end of message in field"),
            Self::InvalidName(err) => write!(f, "invalid name: {}", err),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Reader`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
