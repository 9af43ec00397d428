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

//! The processing logic of an authoritative DNS server.
//!
//! The [`Server`] structure is the heart of this module; see its
//! documentation for details. Query resolution lives in the `query`
//! module and zone transfers in [`axfr`].

use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::analytics::Analytics;
use crate::message::tsig::{KeyStore, TsigKey};
use crate::util::canonical_ip;
use crate::zone::ZoneStore;

pub mod axfr;
mod query;

pub use query::{filter_answers, QueryOutcome};

////////////////////////////////////////////////////////////////////////
// SERVER                                                             //
////////////////////////////////////////////////////////////////////////

/// An authoritative DNS server, abstracted from any underlying network
/// I/O provider.
///
/// The [`Server`] answers queries through [`Server::handle_query`],
/// which takes a received UDP message and produces the response to
/// send (if any), and serves zone transfers through
/// [`axfr::serve_transfer`], which drives a whole TCP connection. An
/// I/O provider (see [`crate::io`]) is responsible for the sockets.
///
/// Zone data comes from a shared [`ZoneStore`]. The zone-transfer
/// settings may be swapped at runtime with
/// [`Server::set_transfer_config`]; transfers already under way keep
/// the settings they started with.
pub struct Server {
    zones: Arc<ZoneStore>,
    transfer_config: RwLock<Arc<TransferConfig>>,
    analytics: Analytics,
}

impl Server {
    /// Creates a new `Server` that will serve the provided zone data.
    ///
    /// By default, no host may transfer zones and events are not
    /// reported anywhere.
    pub fn new(zones: Arc<ZoneStore>) -> Self {
        Self {
            zones,
            transfer_config: RwLock::new(Arc::new(TransferConfig::default())),
            analytics: Analytics::disabled(),
        }
    }

    /// Returns the zone data being served.
    pub fn zones(&self) -> &Arc<ZoneStore> {
        &self.zones
    }

    /// Sets the [`Analytics`] handle that query events are reported
    /// through.
    pub fn set_analytics(&mut self, analytics: Analytics) {
        self.analytics = analytics;
    }

    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    /// Returns the current zone-transfer settings.
    pub fn transfer_config(&self) -> Arc<TransferConfig> {
        self.transfer_config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the zone-transfer settings.
    pub fn set_transfer_config(&self, config: TransferConfig) {
        *self
            .transfer_config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }
}

////////////////////////////////////////////////////////////////////////
// TRANSFER CONFIGURATION                                             //
////////////////////////////////////////////////////////////////////////

/// The default bound on each read and write of a zone transfer.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for zone transfers.
#[derive(Clone, Debug)]
pub struct TransferConfig {
    /// The addresses of the secondaries allowed to transfer zones.
    pub secondaries: Vec<IpAddr>,

    /// The TSIG keys that requests may be signed with.
    pub keys: KeyStore,

    /// The name of the key (in `keys`) used to sign transfers whose
    /// requests are unsigned. Without one, such transfers go out
    /// unsigned.
    pub signing_key: Option<String>,

    /// The bound on each read and write.
    pub timeout: Duration,
}

impl TransferConfig {
    /// Returns whether `ip` belongs to an allowed secondary. IPv4-mapped
    /// IPv6 addresses match their IPv4 equivalents.
    pub fn is_secondary(&self, ip: IpAddr) -> bool {
        let ip = canonical_ip(ip);
        self.secondaries
            .iter()
            .any(|&allowed| canonical_ip(allowed) == ip)
    }

    /// Returns the key for unsigned requests, if one is configured.
    /// A configured name that is not in `keys` gives `Err` with the name.
    pub fn signing_key(&self) -> Result<Option<&TsigKey>, &str> {
        match self.signing_key {
            Some(ref name) => self.keys.get(name).map(Some).ok_or(name.as_str()),
            None => Ok(None),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            secondaries: Vec::new(),
            keys: KeyStore::new(),
            signing_key: None,
            timeout: DEFAULT_TRANSFER_TIMEOUT,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
