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

//! Error types for zone file parsing.
//!
//! As in the rest of the crate, syntax errors are recorded with an
//! [`ErrorKind`] value rather than a string, and the line number is
//! attached separately in [`ErrorDetails`].

use std::fmt;
use std::io;
use std::net::AddrParseError;
use std::num::ParseIntError;
use std::str::Utf8Error;

use crate::name;
use crate::rr::RdataError;

////////////////////////////////////////////////////////////////////////
// ERROR STRUCTURE                                                    //
////////////////////////////////////////////////////////////////////////

/// Represents errors that may occur during zone file parsing.
#[derive(Debug)]
pub enum Error {
    /// I/O errors encountered while reading a zone file.
    Io(io::Error),

    /// Syntax errors.
    Syntax(ErrorDetails),
}

impl Error {
    pub(super) fn new(line: usize, kind: ErrorKind) -> Self {
        Self::Syntax(ErrorDetails { line, kind })
    }
}

impl From<io::Error> for Error {
    fn from(io_error: io::Error) -> Self {
        Self::Io(io_error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(io_error) => write!(f, "I/O error: {}", io_error),
            Self::Syntax(details) => fmt::Display::fmt(details, f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(io_error) => Some(io_error),
            Self::Syntax(_) => None,
        }
    }
}

/// A result type for zone file parsing.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// SYNTAX ERROR DETAILS                                               //
////////////////////////////////////////////////////////////////////////

/// Provides the line number and kind of a zone file syntax error.
#[derive(Debug)]
pub struct ErrorDetails {
    pub(super) line: usize,
    pub(super) kind: ErrorKind,
}

impl ErrorDetails {
    /// Returns the line in the file at which the error occurred.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Returns the kind of syntax error that occurred.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} at line {}", self.kind, self.line)
    }
}

////////////////////////////////////////////////////////////////////////
// SYNTAX ERROR KINDS                                                 //
////////////////////////////////////////////////////////////////////////

/// Kinds of zone file syntax errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    BadUtf8(Utf8Error),
    EolInEscape,
    EolInQuotedString,
    EscapeNeedsThreeDigits,
    EscapeValueOutOfRange,
    ExpectedMxValue,
    InvalidHexDigit,
    InvalidInt(ParseIntError),
    InvalidIpv4(AddrParseError),
    InvalidIpv6(AddrParseError),
    InvalidName(name::Error),
    InvalidRdata(RdataError),
    InvalidRdataLen,
    InvalidTtl(ParseIntError),
    InvalidType(&'static str),
    TooFewFields { expected: usize, found: usize },
    UnsupportedType,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::BadUtf8(utf8_err) => fmt::Display::fmt(&utf8_err, f),
            Self::EolInEscape => f.write_str("reached end of line in escape sequence"),
            Self::EolInQuotedString => f.write_str("reached end of line in quoted string"),
            Self::EscapeNeedsThreeDigits => {
                f.write_str("invalid escape sequence: expected three decimal digits")
            }
            Self::EscapeValueOutOfRange => {
                f.write_str("invalid escape sequence: escaped octet value is out of range")
            }
            Self::ExpectedMxValue => f.write_str("expected an MX value of \"<pref> <exchange>\""),
            Self::InvalidHexDigit => f.write_str("invalid hexadecimal digit"),
            Self::InvalidInt(ref int_err) => fmt::Display::fmt(int_err, f),
            Self::InvalidIpv4(ref addr_err) => write!(f, "invalid IPv4 address: {}", addr_err),
            Self::InvalidIpv6(ref addr_err) => write!(f, "invalid IPv6 address: {}", addr_err),
            Self::InvalidName(name_err) => write!(f, "invalid name: {}", name_err),
            Self::InvalidRdata(rdata_err) => write!(f, "invalid RDATA: {}", rdata_err),
            Self::InvalidRdataLen => f.write_str("RDATA length does not match the data"),
            Self::InvalidTtl(ref int_err) => write!(f, "invalid TTL: {}", int_err),
            Self::InvalidType(type_err) => fmt::Display::fmt(type_err, f),
            Self::TooFewFields { expected, found } => write!(
                f,
                "expected at least {} fields, found {}",
                expected, found
            ),
            Self::UnsupportedType => {
                f.write_str("RR type has no text format; use the \\# generic form")
            }
        }
    }
}
