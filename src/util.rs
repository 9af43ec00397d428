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

//! Crate-private utilities.

use std::net::{IpAddr, Ipv4Addr};

/// Looks up `text` among the mnemonics of `table`, ignoring ASCII
/// case.
pub fn find_mnemonic<T: Copy>(text: &str, table: &[(&str, T)]) -> Option<T> {
    table
        .iter()
        .find(|(mnemonic, _)| mnemonic.eq_ignore_ascii_case(text))
        .map(|&(_, value)| value)
}

/// Reads a network-byte-order `u16` from the beginning of `octets`,
/// returning `None` if there are fewer than two octets.
pub fn read_u16(octets: &[u8]) -> Option<u16> {
    let array = octets.get(0..2)?.try_into().ok()?;
    Some(u16::from_be_bytes(array))
}

/// Reads a network-byte-order `u32` from the beginning of `octets`,
/// returning `None` if there are fewer than four octets.
pub fn read_u32(octets: &[u8]) -> Option<u32> {
    let array = octets.get(0..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(array))
}

/// Interprets IPv4-mapped IPv6 addresses of the kind that dual-stack
/// sockets produce (e.g. `::ffff:127.0.0.1`) as IPv4 addresses. Other
/// addresses are returned unchanged.
pub fn canonical_ip(ip: IpAddr) -> IpAddr {
    match ip {
        original @ IpAddr::V4(_) => original,
        original @ IpAddr::V6(ipv6) => {
            let octets = ipv6.octets();
            if octets[0..10].iter().all(|o| *o == 0) && octets[10] == 0xff && octets[11] == 0xff {
                IpAddr::V4(Ipv4Addr::new(
                    octets[12], octets[13], octets[14], octets[15],
                ))
            } else {
                original
            }
        }
    }
}
