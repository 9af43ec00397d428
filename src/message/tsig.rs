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

//! Transaction signatures (TSIG) for zone transfer messages.
//!
//! This module signs outgoing messages and verifies incoming ones. The
//! MAC covers the message octets only:
//!
//! ```text
//! MAC = HMAC(base64_decode(secret), message)
//! ```
//!
//! where `message` is the complete message *before* the TSIG RR is
//! appended. When signing, that means the message as built (with an
//! ARCOUNT of zero for transfer messages); the TSIG RR is then appended
//! and ARCOUNT incremented. When verifying, the signed octets are
//! recovered the way [RFC 8945 § 4.3.2] describes: everything before
//! the TSIG RR, with the ARCOUNT decremented and the message ID reset
//! to the original ID from the TSIG RR. Unlike RFC 8945, the TSIG
//! variables are not fed into the MAC.
//!
//! Supported algorithms are represented by [`Algorithm`]: HMAC-MD5,
//! HMAC-SHA1, HMAC-SHA256, and HMAC-SHA512.
//!
//! [RFC 8945 § 4.3.2]: https://datatracker.ietf.org/doc/html/rfc8945#section-4.3.2

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::digest::{KeyInit, MacError, OutputSizeUser};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};

use super::constants::{ARCOUNT_START, ID_END};
use super::header::{set_arcount, Header};
use super::reader::{self, Reader};
use crate::class::Class;
use crate::name::{self, encode_name};
use crate::rr::rdata::{TimeSigned, TsigRdata};
use crate::rr::{RdataError, Type};

/// The fudge, in seconds, put into every TSIG RR this server signs.
pub const FUDGE: u16 = 300;

////////////////////////////////////////////////////////////////////////
// TSIG ALGORITHMS                                                    //
////////////////////////////////////////////////////////////////////////

/// A supported TSIG algorithm.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Algorithm {
    HmacMd5,
    HmacSha1,
    HmacSha256,
    HmacSha512,
}

impl Algorithm {
    /// Returns the name that identifies this algorithm in TSIG RRs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::HmacMd5 => "hmac-md5.sig-alg.reg.int.",
            Self::HmacSha1 => "hmac-sha1.",
            Self::HmacSha256 => "hmac-sha256.",
            Self::HmacSha512 => "hmac-sha512.",
        }
    }

    /// Returns the size of the MAC produced by this algorithm.
    pub fn output_size(&self) -> usize {
        match self {
            Self::HmacMd5 => Hmac::<Md5>::output_size(),
            Self::HmacSha1 => Hmac::<Sha1>::output_size(),
            Self::HmacSha256 => Hmac::<Sha256>::output_size(),
            Self::HmacSha512 => Hmac::<Sha512>::output_size(),
        }
    }

    /// Finds an algorithm by name. The comparison ignores ASCII case,
    /// and the trailing dot is optional.
    pub fn from_name(text: &str) -> Option<Self> {
        [
            Self::HmacMd5,
            Self::HmacSha1,
            Self::HmacSha256,
            Self::HmacSha512,
        ]
        .into_iter()
        .find(|algorithm| name::eq_ignore_case(algorithm.name(), text))
    }

    /// Creates a MAC authenticator to compute a MAC with this algorithm
    /// and the given key.
    fn make_authenticator(&self, key: &[u8]) -> Result<Box<dyn Authenticator>, Error> {
        fn boxed<M: Mac + KeyInit + 'static>(key: &[u8]) -> Result<Box<dyn Authenticator>, Error> {
            let mac = <M as Mac>::new_from_slice(key).map_err(|_| Error::BadSecret)?;
            Ok(Box::new(mac))
        }
        match self {
            Self::HmacMd5 => boxed::<Hmac<Md5>>(key),
            Self::HmacSha1 => boxed::<Hmac<Sha1>>(key),
            Self::HmacSha256 => boxed::<Hmac<Sha256>>(key),
            Self::HmacSha512 => boxed::<Hmac<Sha512>>(key),
        }
    }
}

impl FromStr for Algorithm {
    type Err = &'static str;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::from_name(text).ok_or("unsupported TSIG algorithm")
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An abstraction over different MAC implementations. This wraps the
/// `digest` crate's [`Mac`] trait to give an object-safe trait (so that
/// we can use `Box<dyn Authenticator>`).
trait Authenticator {
    fn update(&mut self, data: &[u8]);
    fn finalize(self: Box<Self>) -> Vec<u8>;
    fn verify_truncated_left(self: Box<Self>, tag: &[u8]) -> Result<(), MacError>;
}

impl<M> Authenticator for M
where
    M: Mac,
{
    fn update(&mut self, data: &[u8]) {
        <Self as Mac>::update(self, data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        <Self as Mac>::finalize(*self).into_bytes().to_vec()
    }

    fn verify_truncated_left(self: Box<Self>, tag: &[u8]) -> Result<(), MacError> {
        <Self as Mac>::verify_truncated_left(*self, tag)
    }
}

////////////////////////////////////////////////////////////////////////
// KEYS                                                               //
////////////////////////////////////////////////////////////////////////

/// A shared TSIG key.
///
/// The algorithm and secret are kept as configured; they are only
/// resolved (and so can only fail) when a MAC is computed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TsigKey {
    name: String,
    algorithm: String,
    secret: String,
}

impl TsigKey {
    /// Creates a key. `secret` is the base64 encoding of the shared
    /// secret.
    pub fn new(
        name: impl Into<String>,
        algorithm: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            name: name::fully_qualified(&name.into()),
            algorithm: algorithm.into(),
            secret: secret.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn algorithm_name(&self) -> &str {
        &self.algorithm
    }

    /// Resolves the configured algorithm name.
    pub fn algorithm(&self) -> Result<Algorithm, Error> {
        Algorithm::from_name(&self.algorithm)
            .ok_or_else(|| Error::UnsupportedAlgorithm(self.algorithm.clone()))
    }

    /// Decodes the base64 secret.
    pub fn secret(&self) -> Result<Vec<u8>, Error> {
        BASE64.decode(&self.secret).map_err(|_| Error::BadSecret)
    }

    fn authenticator(&self) -> Result<(Algorithm, Box<dyn Authenticator>), Error> {
        let algorithm = self.algorithm()?;
        let authenticator = algorithm.make_authenticator(&self.secret()?)?;
        Ok((algorithm, authenticator))
    }
}

/// The set of configured TSIG keys, looked up by name without regard
/// to ASCII case.
#[derive(Clone, Debug, Default)]
pub struct KeyStore {
    keys: Vec<TsigKey>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: TsigKey) {
        self.keys.retain(|k| !name::eq_ignore_case(k.name(), key.name()));
        self.keys.push(key);
    }

    pub fn get(&self, key_name: &str) -> Option<&TsigKey> {
        self.keys
            .iter()
            .find(|key| name::eq_ignore_case(key.name(), key_name))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<TsigKey> for KeyStore {
    fn from_iter<T: IntoIterator<Item = TsigKey>>(iter: T) -> Self {
        let mut store = Self::new();
        for key in iter {
            store.insert(key);
        }
        store
    }
}

////////////////////////////////////////////////////////////////////////
// SIGNING                                                            //
////////////////////////////////////////////////////////////////////////

/// Computes the MAC of `message` under `key`.
pub fn compute_mac(key: &TsigKey, message: &[u8]) -> Result<Vec<u8>, Error> {
    let (_, mut authenticator) = key.authenticator()?;
    authenticator.update(message);
    Ok(authenticator.finalize())
}

/// A TSIG RR: the key name as owner, with TSIG RDATA.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TsigRecord {
    pub key_name: String,
    pub rdata: TsigRdata,
}

impl TsigRecord {
    /// Appends the RR to `buf`: TYPE TSIG, CLASS ANY, TTL 0.
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        let mut rdata = Vec::new();
        self.rdata.encode(&mut rdata)?;
        encode_name(&self.key_name, buf).map_err(RdataError::from)?;
        buf.extend_from_slice(&u16::from(Type::TSIG).to_be_bytes());
        buf.extend_from_slice(&u16::from(Class::ANY).to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        buf.extend_from_slice(&rdata);
        Ok(())
    }
}

/// Signs `message` in place: computes the MAC over the message as it
/// stands, appends a TSIG RR, and increments ARCOUNT.
///
/// The TSIG RR carries the key's canonical algorithm name, the given
/// time, a fudge of [`FUDGE`], the message's ID as the original ID, an
/// error of zero, and no other data. The appended RR is returned.
pub fn sign_message(
    message: &mut Vec<u8>,
    key: &TsigKey,
    time_signed: TimeSigned,
) -> Result<TsigRecord, Error> {
    let header = Header::parse(message).ok_or(Error::Malformed(reader::Error::HeaderTooShort))?;
    let arcount = header.arcount.checked_add(1).ok_or(Error::TooManyRecords)?;
    let (algorithm, mut authenticator) = key.authenticator()?;
    authenticator.update(message);
    let record = TsigRecord {
        key_name: key.name().to_owned(),
        rdata: TsigRdata {
            algorithm: algorithm.name().to_owned(),
            time_signed,
            fudge: FUDGE,
            mac: authenticator.finalize(),
            original_id: header.id,
            error: 0,
            other: Vec::new(),
        },
    };
    record.encode(message)?;
    set_arcount(message, arcount);
    Ok(record)
}

////////////////////////////////////////////////////////////////////////
// VERIFICATION                                                       //
////////////////////////////////////////////////////////////////////////

/// Verifies the TSIG RR of a request, if it has one.
///
/// A request is signed when its last additional record is a TSIG RR.
/// Unsigned requests produce `Ok(None)`; signed requests produce the
/// key that verified them, or an error. Every record before the TSIG
/// RR must be readable (i.e. use uncompressed names).
pub fn verify_request<'k>(
    message: &[u8],
    keys: &'k KeyStore,
    now: TimeSigned,
) -> Result<Option<&'k TsigKey>, Error> {
    let mut reader = Reader::try_from(message)?;
    let header = *reader.header();
    if header.arcount == 0 {
        return Ok(None);
    }
    for _ in 0..header.qdcount {
        reader.read_question()?;
    }
    let preceding = header.ancount as usize + header.nscount as usize + header.arcount as usize - 1;
    for _ in 0..preceding {
        reader.read_rr()?;
    }
    let last = reader.read_rr()?;
    if last.rr_type != Type::TSIG {
        return Ok(None);
    }
    let tsig = TsigRdata::decode(last.rdata)?;

    let key = keys
        .get(&last.owner)
        .ok_or_else(|| Error::UnknownKey(last.owner.clone()))?;
    let algorithm = Algorithm::from_name(&tsig.algorithm)
        .ok_or_else(|| Error::UnsupportedAlgorithm(tsig.algorithm.clone()))?;
    if key.algorithm()? != algorithm {
        return Err(Error::AlgorithmMismatch);
    }
    check_mac_size(algorithm, tsig.mac.len())?;

    let (_, mut authenticator) = key.authenticator()?;
    add_modified_message(
        authenticator.as_mut(),
        &message[..last.start],
        tsig.original_id,
        header.arcount - 1,
    );
    authenticator
        .verify_truncated_left(&tsig.mac)
        .or(Err(Error::BadSignature))?;

    if !tsig.time_signed.within(now, tsig.fudge) {
        return Err(Error::BadTime);
    }
    Ok(Some(key))
}

/// Adds the signed portion of a message to a MAC, with the ID reset to
/// `original_id` and the ARCOUNT replaced by `arcount`.
fn add_modified_message(
    authenticator: &mut dyn Authenticator,
    message: &[u8],
    original_id: u16,
    arcount: u16,
) {
    authenticator.update(&original_id.to_be_bytes());
    authenticator.update(&message[ID_END..ARCOUNT_START]);
    authenticator.update(&arcount.to_be_bytes());
    authenticator.update(&message[ARCOUNT_START + 2..]);
}

/// Ensures that a truncated MAC is acceptable, per
/// [RFC 8945 § 5.2.2.1].
///
/// [RFC 8945 § 5.2.2.1]: https://datatracker.ietf.org/doc/html/rfc8945#section-5.2.2.1
fn check_mac_size(algorithm: Algorithm, mac_size: usize) -> Result<(), Error> {
    let half_output_size = (algorithm.output_size() + 1) / 2;
    if mac_size > algorithm.output_size() || mac_size < 10.max(half_output_size) {
        Err(Error::BadMacSize)
    } else {
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Errors that arise while signing or verifying.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// The algorithm name is not one of the supported algorithms.
    UnsupportedAlgorithm(String),

    /// The secret is not valid base64.
    BadSecret,

    /// The message could not be read.
    Malformed(reader::Error),

    /// The TSIG RR could not be encoded or decoded.
    InvalidRdata(RdataError),

    /// The message already has 65,535 additional records.
    TooManyRecords,

    /// No key with the TSIG RR's owner name is configured.
    UnknownKey(String),

    /// The TSIG RR names a different algorithm than the key uses.
    AlgorithmMismatch,

    /// The MAC is longer than the algorithm output or truncated too
    /// far.
    BadMacSize,

    /// The MAC does not match.
    BadSignature,

    /// The time signed is outside the fudge window.
    BadTime,
}

impl From<reader::Error> for Error {
    fn from(err: reader::Error) -> Self {
        Self::Malformed(err)
    }
}

impl From<RdataError> for Error {
    fn from(err: RdataError) -> Self {
        Self::InvalidRdata(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnsupportedAlgorithm(name) => write!(f, "unsupported TSIG algorithm {}", name),
            Self::BadSecret => f.write_str("TSIG secret is not valid base64"),
            Self::Malformed(err) => write!(f, "malformed message: {}", err),
            Self::InvalidRdata(err) => write!(f, "invalid TSIG RDATA: {}", err),
            Self::TooManyRecords => f.write_str("no room for another additional record"),
            Self::UnknownKey(name) => write!(f, "unknown TSIG key {}", name),
            Self::AlgorithmMismatch => f.write_str("TSIG algorithm does not match the key"),
            Self::BadMacSize => f.write_str("TSIG MAC has an unacceptable size"),
            Self::BadSignature => f.write_str("TSIG MAC does not verify"),
            Self::BadTime => f.write_str("TSIG time signed is outside the fudge window"),
        }
    }
}

impl std::error::Error for Error {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
