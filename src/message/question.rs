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

//! Implementation of types relating to DNS questions.

use std::fmt;
use std::str::FromStr;

use crate::class::Class;
use crate::name::{self, encode_name};
use crate::rr::Type;
use crate::util::find_mnemonic;

////////////////////////////////////////////////////////////////////////
// QUESTIONS                                                          //
////////////////////////////////////////////////////////////////////////

/// The question of a DNS query ([RFC 1035 § 4.1.2]).
///
/// The QNAME is kept exactly as decoded (case preserved, with a
/// trailing dot). Only the first question of a message is ever looked
/// at.
///
/// [RFC 1035 § 4.1.2]: https://datatracker.ietf.org/doc/html/rfc1035#section-4.1.2
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Question {
    pub qname: String,
    pub qtype: Qtype,
    pub qclass: Qclass,
}

impl Question {
    /// Appends the wire form of the question to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), name::Error> {
        encode_name(&self.qname, buf)?;
        buf.extend_from_slice(&u16::from(self.qtype).to_be_bytes());
        buf.extend_from_slice(&u16::from(self.qclass).to_be_bytes());
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// QTYPES                                                             //
////////////////////////////////////////////////////////////////////////

/// The QTYPE of a DNS [question](Question).
///
/// QTYPE values include data TYPEs (see [`Type`]) plus the
/// query-only values: [`*`](Qtype::ANY) for every type at a name, and
/// [`AXFR`](Qtype::AXFR) to ask for a zone transfer.
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct Qtype(u16);

impl Qtype {
    // RFC 1995
    pub const IXFR: Self = Self(251);

    // RFC 1035
    pub const AXFR: Self = Self(252);
    pub const ANY: Self = Self(255);

    /// Returns whether a record of type `rr_type` answers this QTYPE
    /// directly (i.e. without CNAME indirection).
    pub fn matches(self, rr_type: Type) -> bool {
        self == Self::ANY || self == Self::from(rr_type)
    }
}

impl From<u16> for Qtype {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Qtype> for u16 {
    fn from(qtype: Qtype) -> Self {
        qtype.0
    }
}

impl From<Type> for Qtype {
    fn from(rr_type: Type) -> Self {
        Self(rr_type.into())
    }
}

impl fmt::Display for Qtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::IXFR => f.write_str("IXFR"),
            Self::AXFR => f.write_str("AXFR"),
            Self::ANY => f.write_str("*"),
            _ => fmt::Display::fmt(&Type::from(*self), f),
        }
    }
}

impl fmt::Debug for Qtype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for Qtype {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        const MNEMONICS: [(&str, Qtype); 4] = [
            ("IXFR", Qtype::IXFR),
            ("AXFR", Qtype::AXFR),
            ("ANY", Qtype::ANY),
            ("*", Qtype::ANY),
        ];
        match find_mnemonic(text, &MNEMONICS) {
            Some(qtype) => Ok(qtype),
            None => Type::from_str(text).map(Into::into),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// QCLASSES                                                           //
////////////////////////////////////////////////////////////////////////

/// The QCLASS of a DNS [question](Question).
///
/// Queries are answered only for QCLASS IN; see [`Qclass::IN`].
#[derive(Copy, Clone, Eq, Hash, PartialEq)]
pub struct Qclass(u16);

impl Qclass {
    pub const IN: Self = Self(1);

    // RFC 1035
    pub const ANY: Self = Self(255);
}

impl From<u16> for Qclass {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl From<Qclass> for u16 {
    fn from(qclass: Qclass) -> Self {
        qclass.0
    }
}

impl From<Class> for Qclass {
    fn from(class: Class) -> Self {
        Self(class.into())
    }
}

impl fmt::Display for Qclass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::ANY => f.write_str("*"),
            _ => fmt::Display::fmt(&Class::from(*self), f),
        }
    }
}

impl fmt::Debug for Qclass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for Qclass {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        const MNEMONICS: [(&str, Qclass); 2] = [
            ("ANY", Qclass::ANY),
            ("*", Qclass::ANY),
        ];
        match find_mnemonic(text, &MNEMONICS) {
            Some(qclass) => Ok(qclass),
            None => Class::from_str(text).map(Into::into),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
