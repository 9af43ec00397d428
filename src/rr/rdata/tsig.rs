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

//! The RDATA of the transaction signature (TSIG) pseudo-RR, following
//! the layout of [RFC 8945 § 4.2].
//!
//! [RFC 8945 § 4.2]: https://datatracker.ietf.org/doc/html/rfc8945#section-4.2

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{Error, MAX_RDATA_LEN};
use crate::name::{decode_name, encode_name};
use crate::util::read_u16;

////////////////////////////////////////////////////////////////////////
// TSIG RDATA                                                         //
////////////////////////////////////////////////////////////////////////

/// The fields of a TSIG record's RDATA.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TsigRdata {
    pub algorithm: String,
    pub time_signed: TimeSigned,
    pub fudge: u16,
    pub mac: Vec<u8>,
    pub original_id: u16,
    pub error: u16,
    pub other: Vec<u8>,
}

impl TsigRdata {
    /// Appends the wire form of the RDATA to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        let start = buf.len();
        encode_name(&self.algorithm, buf)?;
        let fixed_len = 16 + self.mac.len() + self.other.len();
        if buf.len() - start + fixed_len > MAX_RDATA_LEN {
            buf.truncate(start);
            return Err(Error::TooLong);
        }
        buf.extend_from_slice(self.time_signed.as_slice());
        buf.extend_from_slice(&self.fudge.to_be_bytes());
        buf.extend_from_slice(&(self.mac.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.mac);
        buf.extend_from_slice(&self.original_id.to_be_bytes());
        buf.extend_from_slice(&self.error.to_be_bytes());
        buf.extend_from_slice(&(self.other.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.other);
        Ok(())
    }

    /// Decodes TSIG RDATA. The RDATA must be consumed exactly.
    pub fn decode(octets: &[u8]) -> Result<Self, Error> {
        let (algorithm, mut cursor) = decode_name(octets, 0)?;
        let mut take = |len: usize| {
            let field = octets.get(cursor..cursor + len).ok_or(Error::Truncated)?;
            cursor += len;
            Ok::<_, Error>(field)
        };

        let time_signed: [u8; 6] = take(6)?.try_into().map_err(|_| Error::Truncated)?;
        let fudge = read_u16(take(2)?).ok_or(Error::Truncated)?;
        let mac_size = read_u16(take(2)?).ok_or(Error::Truncated)? as usize;
        let mac = take(mac_size)?.to_vec();
        let original_id = read_u16(take(2)?).ok_or(Error::Truncated)?;
        let error = read_u16(take(2)?).ok_or(Error::Truncated)?;
        let other_len = read_u16(take(2)?).ok_or(Error::Truncated)? as usize;
        let other = take(other_len)?.to_vec();

        if cursor != octets.len() {
            return Err(Error::TrailingData);
        }
        Ok(Self {
            algorithm,
            time_signed: time_signed.into(),
            fudge,
            mac,
            original_id,
            error,
            other,
        })
    }
}

////////////////////////////////////////////////////////////////////////
// TSIG TIME-SIGNED FIELD                                             //
////////////////////////////////////////////////////////////////////////

/// The TSIG "time signed" field: Unix time as an unsigned 48-bit
/// big-endian integer, which is also the internal representation.
#[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct TimeSigned([u8; 6]);

impl TimeSigned {
    /// Converts Unix time into a `TimeSigned`, failing if it does not
    /// fit in 48 bits.
    pub fn try_from_unix_time(seconds: u64) -> Result<Self, UnrepresentableTimeError> {
        let octets = seconds.to_be_bytes();
        if octets[0] != 0 || octets[1] != 0 {
            return Err(UnrepresentableTimeError);
        }
        let mut time_signed = [0; 6];
        time_signed.copy_from_slice(&octets[2..8]);
        Ok(Self(time_signed))
    }

    /// Returns the current time. Clocks set before the epoch read as
    /// the epoch itself.
    pub fn now() -> Result<Self, UnrepresentableTimeError> {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |since| since.as_secs());
        Self::try_from_unix_time(seconds)
    }

    pub fn to_unix_time(self) -> u64 {
        let mut octets = [0; 8];
        octets[2..8].copy_from_slice(&self.0);
        u64::from_be_bytes(octets)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns whether `self` and `other` are at most `fudge` seconds
    /// apart.
    pub fn within(self, other: Self, fudge: u16) -> bool {
        self.to_unix_time().abs_diff(other.to_unix_time()) <= fudge as u64
    }
}

impl From<[u8; 6]> for TimeSigned {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Debug for TimeSigned {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_unix_time())
    }
}

/// An error signifying that a time does not fit in the 48-bit TSIG
/// "time signed" field.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct UnrepresentableTimeError;

impl fmt::Display for UnrepresentableTimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("time is not representable as a TSIG time signed field")
    }
}

impl std::error::Error for UnrepresentableTimeError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
