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

//! Implementation of the [`Error`] type for zone-related errors.

use std::fmt;

/// Errors that arise during operations on a [`ZoneStore`](super::ZoneStore).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Error {
    /// A record passed to [`ZoneStore::replace`](super::ZoneStore::replace)
    /// is not owned by the name being replaced.
    OwnerMismatch { expected: String, found: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::OwnerMismatch { expected, found } => write!(
                f,
                "record owned by {} cannot be stored under {}",
                found, expected
            ),
        }
    }
}

impl std::error::Error for Error {}
