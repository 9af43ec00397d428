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

//! Implementation of the DNS message [`Header`].

use super::constants::*;
use crate::util::read_u16;

/// The fixed 12-octet header of a DNS message ([RFC 1035 § 4.1.1]).
///
/// The flags are kept as the raw 16-bit word; accessors pull out the
/// individual fields.
///
/// [RFC 1035 § 4.1.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.1
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    /// Parses the header at the start of `octets`. Returns `None` if
    /// there are fewer than 12 octets.
    pub fn parse(octets: &[u8]) -> Option<Self> {
        if octets.len() < HEADER_SIZE {
            return None;
        }
        let field = |start: usize| read_u16(&octets[start..]);
        Some(Self {
            id: field(ID_START)?,
            flags: field(FLAGS_START)?,
            qdcount: field(QDCOUNT_START)?,
            ancount: field(ANCOUNT_START)?,
            nscount: field(NSCOUNT_START)?,
            arcount: field(ARCOUNT_START)?,
        })
    }

    /// Appends the 12-octet wire form to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        for field in [
            self.id,
            self.flags,
            self.qdcount,
            self.ancount,
            self.nscount,
            self.arcount,
        ] {
            buf.extend_from_slice(&field.to_be_bytes());
        }
    }

    /// Returns the header of an authoritative response to the message
    /// with header `self`: same ID, QR and AA set, opcode and RCODE
    /// zero, and all counts zero.
    pub fn response(&self) -> Self {
        Self {
            id: self.id,
            flags: QR_MASK | AA_MASK,
            ..Self::default()
        }
    }

    pub fn qr(&self) -> bool {
        self.flags & QR_MASK != 0
    }

    pub fn aa(&self) -> bool {
        self.flags & AA_MASK != 0
    }

    pub fn rcode(&self) -> u8 {
        (self.flags & RCODE_MASK) as u8
    }
}

/// Overwrites the ID of the message in `octets`. Messages shorter
/// than a header are left alone.
pub(crate) fn set_id(octets: &mut [u8], id: u16) {
    if let Some(field) = octets.get_mut(ID_START..ID_END) {
        field.copy_from_slice(&id.to_be_bytes());
    }
}

/// Overwrites the ARCOUNT of the message in `octets`. Messages shorter
/// than a header are left alone.
pub(crate) fn set_arcount(octets: &mut [u8], arcount: u16) {
    if let Some(field) = octets.get_mut(ARCOUNT_START..ARCOUNT_END) {
        field.copy_from_slice(&arcount.to_be_bytes());
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
