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

//! Implementation of the [`ResourceRecord`] type.

use super::rdata::{decode_soa_rdata, Error, RecordData, Soa, MAX_RDATA_LEN};
use super::Type;
use crate::class::Class;

/// A single resource record as held in zone data.
///
/// The RDATA is stored in wire form. SOA records additionally carry a
/// decoded [`Soa`] view, since zone transfers and the zone store need
/// the SOA fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceRecord {
    owner: String,
    rr_type: Type,
    class: Class,
    ttl: u32,
    rdata: Vec<u8>,
    soa: Option<Soa>,
}

impl ResourceRecord {
    /// Creates a record from raw RDATA. For SOA records, the RDATA is
    /// decoded into the structured view, and must therefore be valid.
    pub fn new(
        owner: impl Into<String>,
        rr_type: Type,
        class: Class,
        ttl: u32,
        rdata: Vec<u8>,
    ) -> Result<Self, Error> {
        if rdata.len() > MAX_RDATA_LEN {
            return Err(Error::TooLong);
        }
        let soa = if rr_type == Type::SOA {
            Some(decode_soa_rdata(&rdata)?)
        } else {
            None
        };
        Ok(Self {
            owner: owner.into(),
            rr_type,
            class,
            ttl,
            rdata,
            soa,
        })
    }

    /// Creates a class IN record from structured data.
    pub fn from_data(owner: impl Into<String>, ttl: u32, data: RecordData) -> Result<Self, Error> {
        let rr_type = data.rr_type();
        let rdata = data.to_wire()?;
        let soa = match data {
            RecordData::Soa(soa) => Some(soa),
            _ => None,
        };
        Ok(Self {
            owner: owner.into(),
            rr_type,
            class: Class::IN,
            ttl,
            rdata,
            soa,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn rr_type(&self) -> Type {
        self.rr_type
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Returns the decoded SOA view, if this is an SOA record.
    pub fn soa(&self) -> Option<&Soa> {
        self.soa.as_ref()
    }

    /// Returns the RDATA as it goes on the wire.
    pub fn wire_rdata(&self) -> &[u8] {
        &self.rdata
    }

    /// Decodes the RDATA into its structured form.
    pub fn data(&self) -> Result<RecordData, Error> {
        match self.soa {
            Some(ref soa) => Ok(RecordData::Soa(soa.clone())),
            None => RecordData::decode(self.rr_type, &self.rdata),
        }
    }

    /// Returns a copy of this record with its owner replaced by
    /// `owner`.
    pub fn with_owner(&self, owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..self.clone()
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
