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

//! Implementation of name lookup, including wildcard matching.
//!
//! Wildcards are matched by substituting `*` for one label of the
//! queried name at a time, from the leftmost label to the second-to-last
//! one, and taking the first substitution that names stored records.
//! This is not the "closest encloser" search of [RFC 4592]: given both
//! `*.b.example.` and `a.*.example.`, a query for `a.b.example.` finds
//! the former simply because its wildcard label comes first.
//!
//! [RFC 4592]: https://datatracker.ietf.org/doc/html/rfc4592

use std::sync::Arc;

use crate::name::{fully_qualified, normalize, wildcard_candidates};
use crate::rr::ResourceRecord;

use super::ZoneStore;

/// The result of [`ZoneStore::lookup`].
#[derive(Clone, Debug)]
pub struct Lookup {
    records: Arc<[ResourceRecord]>,
    wildcard: Option<String>,
}

impl Lookup {
    /// The records found, exactly as stored.
    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// If the records were found through a wildcard, returns the
    /// (normalized) wildcard name that matched.
    pub fn wildcard(&self) -> Option<&str> {
        self.wildcard.as_deref()
    }
}

impl ZoneStore {
    /// Finds the records for `name`: an exact match if there is one,
    /// and otherwise the first matching wildcard. The result is empty if
    /// neither exists.
    pub fn lookup(&self, name: &str) -> Lookup {
        if let Some(records) = self.lookup_exact(name).filter(|r| !r.is_empty()) {
            return Lookup {
                records,
                wildcard: None,
            };
        }
        for candidate in wildcard_candidates(&normalize(name)) {
            if let Some(records) = self.lookup_exact(&candidate).filter(|r| !r.is_empty()) {
                return Lookup {
                    records,
                    wildcard: Some(candidate),
                };
            }
        }
        Lookup {
            records: Arc::from(Vec::new()),
            wildcard: None,
        }
    }
}

/// Copies `records`, setting each owner to `queried_name` (with a
/// trailing dot added if it lacks one). Nothing else about the records
/// changes.
pub fn rewrite_owner(records: &[ResourceRecord], queried_name: &str) -> Vec<ResourceRecord> {
    let owner = fully_qualified(queried_name);
    records.iter().map(|r| r.with_owner(owner.clone())).collect()
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::rr::{RecordData, Type};

    fn a(owner: &str, last: u8) -> ResourceRecord {
        ResourceRecord::from_data(owner, 300, RecordData::A(Ipv4Addr::new(192, 0, 2, last)))
            .unwrap()
    }

    fn store() -> ZoneStore {
        let store = ZoneStore::new();
        store.load(vec![
            a("example.com.", 1),
            a("*.wild.example.com.", 2),
            a("exact.wild.example.com.", 3),
        ]);
        store
    }

    #[test]
    fn exact_match_is_preferred() {
        let lookup = store().lookup("Exact.Wild.Example.Com.");
        assert_eq!(lookup.records(), [a("exact.wild.example.com.", 3)]);
        assert_eq!(lookup.wildcard(), None);
    }

    #[test]
    fn wildcard_match_and_rewrite() {
        let lookup = store().lookup("test.wild.example.com.");
        assert_eq!(lookup.wildcard(), Some("*.wild.example.com."));
        let rewritten = rewrite_owner(lookup.records(), "test.wild.example.com.");
        assert_eq!(rewritten.len(), 1);
        assert_eq!(rewritten[0].owner(), "test.wild.example.com.");
        assert_eq!(rewritten[0].rr_type(), Type::A);
        assert_eq!(rewritten[0].ttl(), 300);
        assert_eq!(
            rewritten[0].data().unwrap(),
            RecordData::A(Ipv4Addr::new(192, 0, 2, 2)),
        );
    }

    #[test]
    fn no_match_is_empty() {
        let lookup = store().lookup("other.example.com.");
        assert!(lookup.is_empty());
        assert_eq!(lookup.wildcard(), None);
        assert!(store().lookup(".").is_empty());
    }

    #[test]
    fn leftmost_wildcard_position_wins() {
        let store = ZoneStore::new();
        store.load(vec![a("a.*.example.", 1), a("*.b.example.", 2)]);
        let lookup = store.lookup("a.b.example.");
        assert_eq!(lookup.wildcard(), Some("*.b.example."));
        assert_eq!(lookup.records(), [a("*.b.example.", 2)]);
    }

    #[test]
    fn wildcard_does_not_match_deeper_names_by_itself() {
        // *.wild.example.com. is only tried by replacing one label, so a
        // name two labels below wild.example.com. does not match it.
        assert!(store().lookup("a.b.wild.example.com.").is_empty());
    }

    #[test]
    fn rewrite_owner_adds_trailing_dot() {
        let rewritten = rewrite_owner(&[a("*.example.com.", 1)], "x.example.com");
        assert_eq!(rewritten[0].owner(), "x.example.com.");
    }
}
