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

//! Network I/O for a [`Server`](crate::server::Server).
//!
//! The [`Server`](crate::server::Server) does not own any sockets.
//! Instead, an I/O provider binds them, receives queries and transfer
//! connections, and hands them to the server. The only provider is the
//! Tokio provider, [`TokioIoProvider`], which serves UDP queries and
//! TCP zone transfers on a Tokio runtime.

mod tokio;

pub use self::tokio::{TokioIoProvider, TokioShutdownController};

/// The size of the buffer UDP queries are received into. Longer
/// datagrams are truncated.
pub const UDP_BUFFER_SIZE: usize = 512;
