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

//! Implementation of the in-memory zone store.
//!
//! A [`ZoneStore`] maps owner names to the ordered list of records
//! they own. Names are kept in [normalized](crate::name::normalize)
//! form, while the records themselves keep the owner exactly as it
//! was given. Lookups are implemented in the `lookup` module.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::name::{is_within, normalize};
use crate::rr::{ResourceRecord, Soa, Type};

mod error;
mod lookup;
pub use error::Error;
pub use lookup::{rewrite_owner, Lookup};

type NameMap = BTreeMap<String, Arc<[ResourceRecord]>>;

////////////////////////////////////////////////////////////////////////
// ZONE STORE                                                         //
////////////////////////////////////////////////////////////////////////

/// Shared, read-mostly storage for zone data.
///
/// Each name's record list is held behind an [`Arc`] and is never
/// modified in place: a mutation builds a new list and swaps it in
/// under the write lock. Readers therefore either see the list from
/// before a mutation or the one after it, and a [`Lookup`] can hold on
/// to its records after the lock is released.
///
/// Insertion order within a name is preserved. Across names, iteration
/// (for [`ZoneStore::records_within`] and [`ZoneStore::snapshot`]) is in
/// the lexicographic order of the normalized names.
///
/// Mutations other than [`ZoneStore::load`] are reported to the
/// [`ChangeListener`], if one is set, after the write lock has been
/// released.
pub struct ZoneStore {
    names: RwLock<NameMap>,
    listener: RwLock<Option<Arc<dyn ChangeListener>>>,
}

/// A collaborator that is told about every mutation of a
/// [`ZoneStore`], e.g. to persist the zone data.
pub trait ChangeListener: Send + Sync {
    fn zone_changed(&self, store: &ZoneStore);
}

impl ZoneStore {
    /// Creates an empty `ZoneStore` with no listener.
    pub fn new() -> Self {
        Self {
            names: RwLock::new(NameMap::new()),
            listener: RwLock::new(None),
        }
    }

    /// Sets (or with `None`, clears) the [`ChangeListener`].
    pub fn set_listener(&self, listener: Option<Arc<dyn ChangeListener>>) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    /// Replaces the entire contents of the store with `records`. The
    /// listener is not notified, since this is how data gets loaded
    /// from its persistent form in the first place.
    pub fn load(&self, records: impl IntoIterator<Item = ResourceRecord>) {
        let mut building: BTreeMap<String, Vec<ResourceRecord>> = BTreeMap::new();
        for record in records {
            building
                .entry(normalize(record.owner()))
                .or_default()
                .push(record);
        }
        let names: NameMap = building
            .into_iter()
            .map(|(name, records)| (name, Arc::from(records)))
            .collect();
        *self.write() = names;
    }

    /// Appends `record` to the list for its owner.
    pub fn insert(&self, record: ResourceRecord) {
        {
            let mut names = self.write();
            let key = normalize(record.owner());
            let mut records = names.get(&key).map(|r| r.to_vec()).unwrap_or_default();
            records.push(record);
            names.insert(key, records.into());
        }
        self.notify();
    }

    /// Removes every record owned by `name`, returning how many there
    /// were.
    pub fn remove(&self, name: &str) -> usize {
        let removed = self.write().remove(&normalize(name)).map_or(0, |r| r.len());
        if removed > 0 {
            self.notify();
        }
        removed
    }

    /// Removes the first record equal to `record`. Returns whether one
    /// was found.
    pub fn remove_record(&self, record: &ResourceRecord) -> bool {
        let removed = {
            let mut names = self.write();
            let key = normalize(record.owner());
            let position = names
                .get(&key)
                .and_then(|records| records.iter().position(|r| r == record));
            match position {
                Some(index) => {
                    let mut records = names[&key].to_vec();
                    records.remove(index);
                    if records.is_empty() {
                        names.remove(&key);
                    } else {
                        names.insert(key, records.into());
                    }
                    true
                }
                None => false,
            }
        };
        if removed {
            self.notify();
        }
        removed
    }

    /// Replaces the record list for `name` with `records`. Every record
    /// must be owned by `name` (ignoring case); otherwise the store is
    /// left unchanged. An empty list removes the name.
    pub fn replace(&self, name: &str, records: Vec<ResourceRecord>) -> Result<(), Error> {
        let key = normalize(name);
        if let Some(stray) = records.iter().find(|r| normalize(r.owner()) != key) {
            return Err(Error::OwnerMismatch {
                expected: key,
                found: stray.owner().to_owned(),
            });
        }
        {
            let mut names = self.write();
            if records.is_empty() {
                names.remove(&key);
            } else {
                names.insert(key, records.into());
            }
        }
        self.notify();
        Ok(())
    }

    /// Returns the records owned by exactly `name`, or `None` if there
    /// are none.
    pub fn lookup_exact(&self, name: &str) -> Option<Arc<[ResourceRecord]>> {
        self.read().get(&normalize(name)).cloned()
    }

    /// Returns the first SOA record owned by `zone`, if any.
    pub fn soa(&self, zone: &str) -> Option<ResourceRecord> {
        self.lookup_exact(zone)?
            .iter()
            .find(|r| r.rr_type() == Type::SOA)
            .cloned()
    }

    /// Like [`ZoneStore::soa`], but returns the decoded SOA fields.
    pub fn soa_fields(&self, zone: &str) -> Option<Soa> {
        self.soa(zone).and_then(|r| r.soa().cloned())
    }

    /// Returns every record whose owner is `zone` or a name below it,
    /// in store iteration order.
    pub fn records_within(&self, zone: &str) -> Vec<ResourceRecord> {
        let zone = normalize(zone);
        self.read()
            .iter()
            .filter(|(name, _)| is_within(name, &zone))
            .flat_map(|(_, records)| records.iter().cloned())
            .collect()
    }

    /// Returns a copy of every record in the store, in store iteration
    /// order.
    pub fn snapshot(&self) -> Vec<ResourceRecord> {
        self.read()
            .values()
            .flat_map(|records| records.iter().cloned())
            .collect()
    }

    /// Returns the number of names that own records.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<NameMap> {
        self.names.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<NameMap> {
        self.names.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener.zone_changed(self);
        }
    }
}

impl Default for ZoneStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ZoneStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ZoneStore")
            .field("names", &*self.read())
            .finish_non_exhaustive()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
