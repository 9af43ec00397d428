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

//! Implementation of the [`Writer`] type to write on-the-wire DNS
//! messages.

use std::fmt;

use super::constants::HEADER_SIZE;
use super::{Header, Question};
use crate::name::{self, encode_name};
use crate::rr::{RdataError, ResourceRecord};

////////////////////////////////////////////////////////////////////////
// WRITER                                                             //
////////////////////////////////////////////////////////////////////////

/// Serializes a DNS message into a growable buffer.
///
/// Questions and records are appended in message order: questions,
/// then answers, then authority records, then additional records. The
/// `Writer` tracks the section it is in, and adding to an earlier
/// section fails with [`Error::OutOfOrder`]. Section counts are kept
/// as records are added and written into the header by
/// [`Writer::finish`].
///
/// Names are never compressed.
#[derive(Debug)]
pub struct Writer {
    buf: Vec<u8>,
    header: Header,
    section: Section,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Section {
    Question,
    Answer,
    Authority,
    Additional,
}

impl Writer {
    /// Starts a message with the given header. The section counts of
    /// `header` are ignored.
    pub fn new(header: Header) -> Self {
        let mut buf = Vec::with_capacity(512);
        buf.resize(HEADER_SIZE, 0);
        Self {
            buf,
            header: Header {
                qdcount: 0,
                ancount: 0,
                nscount: 0,
                arcount: 0,
                ..header
            },
            section: Section::Question,
        }
    }

    pub fn add_question(&mut self, question: &Question) -> Result<()> {
        self.enter(Section::Question)?;
        let count = bump(self.header.qdcount)?;
        question.encode(&mut self.buf)?;
        self.header.qdcount = count;
        Ok(())
    }

    pub fn add_answer(&mut self, record: &ResourceRecord) -> Result<()> {
        self.enter(Section::Answer)?;
        let count = bump(self.header.ancount)?;
        encode_record(record, &mut self.buf)?;
        self.header.ancount = count;
        Ok(())
    }

    pub fn add_authority(&mut self, record: &ResourceRecord) -> Result<()> {
        self.enter(Section::Authority)?;
        let count = bump(self.header.nscount)?;
        encode_record(record, &mut self.buf)?;
        self.header.nscount = count;
        Ok(())
    }

    pub fn add_additional(&mut self, record: &ResourceRecord) -> Result<()> {
        self.enter(Section::Additional)?;
        let count = bump(self.header.arcount)?;
        encode_record(record, &mut self.buf)?;
        self.header.arcount = count;
        Ok(())
    }

    /// Writes the header and returns the finished message.
    pub fn finish(mut self) -> Vec<u8> {
        let mut header_octets = Vec::with_capacity(HEADER_SIZE);
        self.header.encode(&mut header_octets);
        self.buf[..HEADER_SIZE].copy_from_slice(&header_octets);
        self.buf
    }

    fn enter(&mut self, section: Section) -> Result<()> {
        if section < self.section {
            Err(Error::OutOfOrder)
        } else {
            self.section = section;
            Ok(())
        }
    }
}

fn bump(count: u16) -> Result<u16> {
    count.checked_add(1).ok_or(Error::CountOverflow)
}

/// Appends `record` to `buf` in wire form: owner, TYPE, CLASS, TTL,
/// RDLENGTH, and RDATA. On failure, `buf` is left unchanged.
pub fn encode_record(record: &ResourceRecord, buf: &mut Vec<u8>) -> Result<()> {
    let rdata = record.wire_rdata();
    let rdlength = u16::try_from(rdata.len()).map_err(|_| RdataError::TooLong)?;
    encode_name(record.owner(), buf)?;
    buf.extend_from_slice(&u16::from(record.rr_type()).to_be_bytes());
    buf.extend_from_slice(&u16::from(record.class()).to_be_bytes());
    buf.extend_from_slice(&record.ttl().to_be_bytes());
    buf.extend_from_slice(&rdlength.to_be_bytes());
    buf.extend_from_slice(rdata);
    Ok(())
}

/// Builds an authoritative response to the query with header
/// `request`.
///
/// The response echoes the ID and the question, sets QR and AA (with
/// opcode and RCODE zero), and carries `answers` and `authority` in
/// order, with no additional records.
pub fn build_response(
    request: &Header,
    question: &Question,
    answers: &[ResourceRecord],
    authority: &[ResourceRecord],
) -> Result<Vec<u8>> {
    let mut writer = Writer::new(request.response());
    writer.add_question(question)?;
    for record in answers {
        writer.add_answer(record)?;
    }
    for record in authority {
        writer.add_authority(record)?;
    }
    Ok(writer.finish())
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a message could not be written.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    InvalidName(name::Error),
    InvalidRdata(RdataError),
    CountOverflow,
    OutOfOrder,
}

impl From<name::Error> for Error {
    fn from(err: name::Error) -> Self {
        Self::InvalidName(err)
    }
}

impl From<RdataError> for Error {
    fn from(err: RdataError) -> Self {
        Self::InvalidRdata(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::InvalidName(err) => write!(f, "invalid name: {}", err),
            Self::InvalidRdata(err) => write!(f, "invalid RDATA: {}", err),
            Self::CountOverflow => f.write_str("too many records for one section"),
            Self::OutOfOrder => f.write_str("message sections written out of order"),
        }
    }
}

impl std::error::Error for Error {}

/// The type returned by fallible [`Writer`] methods.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
