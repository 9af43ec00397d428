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

//! Conversion of split zone file lines into [`ResourceRecord`]s.

use std::net::{Ipv4Addr, Ipv6Addr};

use super::fields::Field;
use super::ErrorKind;
use crate::class::Class;
use crate::name::{fully_qualified, name_to_wire};
use crate::rr::{Mx, RecordData, ResourceRecord, Soa, Txt, Type};

/// The smallest number of fields on a record line: owner, type, value,
/// and TTL.
const MIN_FIELDS: usize = 4;

/// The number of fields on an SOA line.
const SOA_FIELDS: usize = 10;

/// Parses a line that has already been split into fields.
pub(super) fn parse_record(fields: &[Field]) -> Result<ResourceRecord, ErrorKind> {
    if fields.len() < MIN_FIELDS {
        return Err(ErrorKind::TooFewFields {
            expected: MIN_FIELDS,
            found: fields.len(),
        });
    }
    let owner = parse_name(fields[0].raw_str()?)?;
    let rr_type: Type = fields[1].as_str()?.parse().map_err(ErrorKind::InvalidType)?;

    if fields[2].generic_marker {
        let (rdata, ttl) = parse_generic(&fields[3..])?;
        return ResourceRecord::new(owner, rr_type, Class::IN, ttl, rdata)
            .map_err(ErrorKind::InvalidRdata);
    }

    let value = &fields[2];
    let (data, ttl) = match rr_type {
        Type::A => {
            let address: Ipv4Addr = value.as_str()?.parse().map_err(ErrorKind::InvalidIpv4)?;
            (RecordData::A(address), parse_ttl(&fields[3])?)
        }
        Type::AAAA => {
            let address: Ipv6Addr = value.as_str()?.parse().map_err(ErrorKind::InvalidIpv6)?;
            (RecordData::Aaaa(address), parse_ttl(&fields[3])?)
        }
        Type::NS => (
            RecordData::Ns(parse_name(value.raw_str()?)?),
            parse_ttl(&fields[3])?,
        ),
        Type::CNAME => (
            RecordData::Cname(parse_name(value.raw_str()?)?),
            parse_ttl(&fields[3])?,
        ),
        Type::PTR => (
            RecordData::Ptr(parse_name(value.raw_str()?)?),
            parse_ttl(&fields[3])?,
        ),
        Type::TXT => {
            let txt = Txt::new(value.octets.clone()).map_err(ErrorKind::InvalidRdata)?;
            (RecordData::Txt(txt), parse_ttl(&fields[3])?)
        }
        Type::MX => parse_mx(fields)?,
        Type::SOA => parse_soa(fields)?,
        _ => return Err(ErrorKind::UnsupportedType),
    };
    ResourceRecord::from_data(owner, ttl, data).map_err(ErrorKind::InvalidRdata)
}

/// Parses MX data, which is either a single (quoted) field holding the
/// preference and exchange, or two separate fields.
fn parse_mx(fields: &[Field]) -> Result<(RecordData, u32), ErrorKind> {
    let value = fields[2].raw_str()?;
    let (preference, exchange, ttl_field) = if value.contains(|c: char| c.is_ascii_whitespace()) {
        let mut parts = value.split_ascii_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(preference), Some(exchange), None) => (preference, exchange, &fields[3]),
            _ => return Err(ErrorKind::ExpectedMxValue),
        }
    } else if fields.len() > MIN_FIELDS {
        (value, fields[3].raw_str()?, &fields[4])
    } else {
        return Err(ErrorKind::ExpectedMxValue);
    };
    let mx = Mx {
        preference: preference.parse().map_err(ErrorKind::InvalidInt)?,
        exchange: parse_name(exchange)?,
    };
    Ok((RecordData::Mx(mx), parse_ttl(ttl_field)?))
}

fn parse_soa(fields: &[Field]) -> Result<(RecordData, u32), ErrorKind> {
    if fields.len() < SOA_FIELDS {
        return Err(ErrorKind::TooFewFields {
            expected: SOA_FIELDS,
            found: fields.len(),
        });
    }
    let number = |field: &Field| -> Result<u32, ErrorKind> {
        field.as_str()?.parse().map_err(ErrorKind::InvalidInt)
    };
    let soa = Soa {
        mname: parse_name(fields[2].raw_str()?)?,
        rname: parse_name(fields[3].raw_str()?)?,
        serial: number(&fields[4])?,
        refresh: number(&fields[5])?,
        retry: number(&fields[6])?,
        expire: number(&fields[7])?,
        minimum: number(&fields[8])?,
    };
    Ok((RecordData::Soa(soa), parse_ttl(&fields[9])?))
}

/// Parses the fields following a `\#` marker: the RDATA length, the
/// RDATA in hexadecimal (possibly split over several fields), and the
/// TTL.
fn parse_generic(fields: &[Field]) -> Result<(Vec<u8>, u32), ErrorKind> {
    let (ttl_field, fields) = match fields.split_last() {
        Some((ttl_field, fields)) if !fields.is_empty() => (ttl_field, fields),
        _ => {
            return Err(ErrorKind::TooFewFields {
                expected: MIN_FIELDS + 1,
                found: MIN_FIELDS - 1 + fields.len(),
            })
        }
    };
    let len: usize = fields[0].as_str()?.parse().map_err(ErrorKind::InvalidInt)?;
    let mut rdata = Vec::with_capacity(len);
    let mut hex = fields[1..].iter().flat_map(|f| f.octets.iter().copied());
    while let Some(high) = hex.next() {
        let low = hex.next().ok_or(ErrorKind::InvalidHexDigit)?;
        rdata.push(hex_value(high)? << 4 | hex_value(low)?);
    }
    if rdata.len() != len {
        return Err(ErrorKind::InvalidRdataLen);
    }
    Ok((rdata, parse_ttl(ttl_field)?))
}

fn hex_value(digit: u8) -> Result<u8, ErrorKind> {
    match digit {
        b'0'..=b'9' => Ok(digit - b'0'),
        b'a'..=b'f' => Ok(digit - b'a' + 10),
        b'A'..=b'F' => Ok(digit - b'A' + 10),
        _ => Err(ErrorKind::InvalidHexDigit),
    }
}

/// Makes `text` fully qualified and checks that it encodes.
fn parse_name(text: &str) -> Result<String, ErrorKind> {
    let name = fully_qualified(text);
    name_to_wire(&name).map_err(ErrorKind::InvalidName)?;
    Ok(name)
}

fn parse_ttl(field: &Field) -> Result<u32, ErrorKind> {
    field.as_str()?.parse().map_err(ErrorKind::InvalidTtl)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::super::fields::split_fields;
    use super::*;
    use crate::rr::RdataError;

    fn parse(line: &[u8]) -> Result<ResourceRecord, ErrorKind> {
        parse_record(&split_fields(line).unwrap())
    }

    #[test]
    fn address_records_parse() {
        let record = parse(b"example.com A 1.2.3.4 300").unwrap();
        assert_eq!(record.owner(), "example.com.");
        assert_eq!(record.rr_type(), Type::A);
        assert_eq!(record.class(), Class::IN);
        assert_eq!(record.ttl(), 300);
        assert_eq!(record.data().unwrap(), RecordData::A(Ipv4Addr::new(1, 2, 3, 4)));

        let record = parse(b"v6.example.com. aaaa 2001:db8::1 60").unwrap();
        assert_eq!(
            record.data().unwrap(),
            RecordData::Aaaa("2001:db8::1".parse().unwrap()),
        );
        assert!(matches!(
            parse(b"v6.example.com. AAAA 1.2.3.4 60"),
            Err(ErrorKind::InvalidIpv6(_)),
        ));
    }

    #[test]
    fn name_records_get_trailing_dots() {
        let record = parse(b"www.example.com. CNAME example.com 60").unwrap();
        assert_eq!(record.data().unwrap(), RecordData::Cname("example.com.".into()));
        let record = parse(b"example.com. NS ns1.example.com. 60").unwrap();
        assert_eq!(record.data().unwrap(), RecordData::Ns("ns1.example.com.".into()));
    }

    #[test]
    fn names_keep_their_escapes() {
        let record = parse(br"a\.b.example. CNAME \255x.example 60").unwrap();
        assert_eq!(record.owner(), r"a\.b.example.");
        assert_eq!(
            record.data().unwrap(),
            RecordData::Cname(r"\255x.example.".into()),
        );
        assert_eq!(
            record.wire_rdata(),
            b"\x02\xffx\x07example\x00",
        );
        assert_eq!(
            parse(format!("{}.example. A 1.2.3.4 60", "a".repeat(64)).as_bytes()),
            Err(ErrorKind::InvalidName(crate::name::Error::LabelTooLong)),
        );
    }

    #[test]
    fn txt_records_parse() {
        let record = parse(br#"example.com. TXT "v=spf1 -all" 60"#).unwrap();
        assert_eq!(
            record.data().unwrap(),
            RecordData::Txt(Txt::new("v=spf1 -all").unwrap()),
        );
        let long = format!("x TXT \"{}\" 60", "a".repeat(256));
        assert_eq!(
            parse(long.as_bytes()),
            Err(ErrorKind::InvalidRdata(RdataError::TxtTooLong)),
        );
    }

    #[test]
    fn mx_records_parse_in_both_forms() {
        let expected = RecordData::Mx(Mx {
            preference: 10,
            exchange: "mail.example.com.".into(),
        });
        let quoted = parse(br#"example.com. MX "10 mail.example.com" 300"#).unwrap();
        assert_eq!(quoted.data().unwrap(), expected);
        assert_eq!(quoted.ttl(), 300);
        let split = parse(b"example.com. MX 10 mail.example.com. 300").unwrap();
        assert_eq!(split.data().unwrap(), expected);
        assert_eq!(split.ttl(), 300);
        assert_eq!(
            parse(b"example.com. MX 10 300"),
            Err(ErrorKind::ExpectedMxValue),
        );
    }

    #[test]
    fn soa_records_parse() {
        let record = parse(
            b"example.com. SOA ns1.example.com. hostmaster.example.com. 1 3600 600 604800 300 3600",
        )
        .unwrap();
        let soa = record.soa().unwrap();
        assert_eq!(soa.mname, "ns1.example.com.");
        assert_eq!(soa.serial, 1);
        assert_eq!(soa.minimum, 300);
        assert_eq!(record.ttl(), 3600);
        assert_eq!(
            parse(b"example.com. SOA ns1 hostmaster 1 3600"),
            Err(ErrorKind::TooFewFields {
                expected: 10,
                found: 6
            }),
        );
    }

    #[test]
    fn generic_records_parse() {
        let record = parse(br"x.example. TYPE99 \# 3 abcd ef 60").unwrap();
        assert_eq!(record.rr_type(), Type::from(99));
        assert_eq!(record.wire_rdata(), [0xab, 0xcd, 0xef]);
        assert_eq!(record.ttl(), 60);
        let empty = parse(br"x.example. TYPE99 \# 0 60").unwrap();
        assert!(empty.wire_rdata().is_empty());
        assert_eq!(
            parse(br"x.example. TYPE99 \# 4 abcdef 60"),
            Err(ErrorKind::InvalidRdataLen),
        );
        assert_eq!(
            parse(br"x.example. TYPE99 \# 1 ag 60"),
            Err(ErrorKind::InvalidHexDigit),
        );
    }

    #[test]
    fn bad_lines_are_rejected() {
        assert_eq!(
            parse(b"example.com. A 1.2.3.4"),
            Err(ErrorKind::TooFewFields {
                expected: 4,
                found: 3
            }),
        );
        assert!(matches!(
            parse(b"example.com. A 1.2.3.4 soon"),
            Err(ErrorKind::InvalidTtl(_)),
        ));
        assert!(matches!(
            parse(b"example.com. BOGUS x 60"),
            Err(ErrorKind::InvalidType(_)),
        ));
        assert_eq!(
            parse(b"example.com. TYPE33 x 60"),
            Err(ErrorKind::UnsupportedType),
        );
    }
}
