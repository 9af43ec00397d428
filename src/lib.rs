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

//! Sextant is a small authoritative DNS server.
//!
//! It answers UDP queries from an in-memory [zone store](zone::ZoneStore)
//! and serves full zone transfers (AXFR) over TCP to a list of
//! authorized secondaries, optionally signing the transfer with TSIG.
//!
//! The crate is organized leaf-first:
//!
//! * [`name`], [`rr`], and [`message`] implement the wire format: owner
//!   names, resource records and their RDATA, message headers and
//!   questions, response serialization, and TSIG.
//! * [`zone`] holds the zone data and implements exact and wildcard
//!   lookup.
//! * [`server`] implements query resolution and the AXFR state
//!   machine, independent of any socket API.
//! * [`io`] runs a [`Server`](server::Server) on Tokio sockets.
//! * [`zone_file`] and [`analytics`] are the collaborators at the edge:
//!   zone text (de)serialization and fire-and-forget event reporting.

pub mod analytics;
pub mod class;
pub mod io;
pub mod message;
pub mod name;
pub mod rr;
pub mod server;
mod util;
pub mod zone;
pub mod zone_file;
