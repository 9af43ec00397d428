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

//! Full zone transfers (AXFR) over TCP.
//!
//! A transfer connection goes through these steps, and is closed
//! without a response if any of them fails:
//!
//! 1. The peer's address must belong to an allowed secondary.
//! 2. A single length-prefixed request is read.
//! 3. The request must be an AXFR query, and if it is signed with TSIG,
//!    the signature must verify.
//! 4. The zone store must hold an SOA record for the queried zone.
//!
//! The zone is then sent as three length-prefixed messages: the SOA,
//! every other record at or below the zone apex, and the SOA again.
//! Each message echoes the request ID and question. Messages are
//! signed with the key that signed the request, or else with the
//! configured signing key, if any. All three messages are built and
//! signed before the first is sent. Every read and write is bounded by
//! the configured timeout.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Server;
use crate::message::constants::HEADER_SIZE;
use crate::message::tsig::{self, TsigKey};
use crate::message::{parse_message, reader, writer, Header, Qclass, Qtype, Question, Writer};
use crate::name::normalize;
use crate::rr::rdata::TimeSigned;
use crate::rr::{ResourceRecord, Type};

/// A summary of a completed transfer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transfer {
    /// The (normalized) name of the zone.
    pub zone: String,

    /// The number of records sent between the two SOA records.
    pub records: usize,

    /// The name of the key the messages were signed with, if any.
    pub key_name: Option<String>,
}

/// Serves a zone transfer to `peer` over `stream`.
///
/// The caller is responsible for closing the stream afterwards. On
/// failure, messages already sent are not retracted.
pub async fn serve_transfer<S>(server: &Server, stream: &mut S, peer: IpAddr) -> Result<Transfer>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let config = server.transfer_config();
    if !config.is_secondary(peer) {
        return Err(Error::Unauthorized(peer));
    }

    let request = bounded(config.timeout, read_request(stream)).await?;
    let (header, question) = parse_message(&request).map_err(Error::Malformed)?;
    if question.qtype != Qtype::AXFR {
        return Err(Error::NotAxfr(question.qtype));
    }
    let now = TimeSigned::now().map_err(|_| Error::UnrepresentableTime)?;
    let request_key =
        tsig::verify_request(&request, &config.keys, now).map_err(Error::BadRequestSignature)?;

    let zone = normalize(&question.qname);
    let soa = server
        .zones()
        .soa(&zone)
        .ok_or_else(|| Error::NoSoa(zone.clone()))?;
    let key = match request_key {
        Some(key) => Some(key),
        None => config
            .signing_key()
            .map_err(|name| Error::Signing(tsig::Error::UnknownKey(name.to_owned())))?,
    };

    let body = zone_body(server, &zone);
    let mut messages = build_transfer_messages(&header, &question.qname, &soa, &body)?;
    if let Some(key) = key {
        for message in messages.iter_mut() {
            tsig::sign_message(message, key, now).map_err(Error::Signing)?;
        }
    }
    // Nothing is sent unless every message fits its length prefix.
    if let Some(message) = messages.iter().find(|m| m.len() > u16::MAX as usize) {
        return Err(Error::MessageTooLong(message.len()));
    }
    for message in &messages {
        bounded(config.timeout, write_message(stream, message)).await?;
    }

    Ok(Transfer {
        zone,
        records: body.len(),
        key_name: key.map(|k| k.name().to_owned()),
    })
}

/// Returns the records of `zone` that go between the two SOA records:
/// every record at or below the apex, except SOA records at the apex.
fn zone_body(server: &Server, zone: &str) -> Vec<ResourceRecord> {
    server
        .zones()
        .records_within(zone)
        .into_iter()
        .filter(|r| !(r.rr_type() == Type::SOA && normalize(r.owner()) == zone))
        .collect()
}

/// Builds the three (unsigned) messages of a transfer: `[soa]`,
/// `body`, and `[soa]`.
pub fn build_transfer_messages(
    request: &Header,
    qname: &str,
    soa: &ResourceRecord,
    body: &[ResourceRecord],
) -> Result<[Vec<u8>; 3]> {
    let question = Question {
        qname: qname.to_owned(),
        qtype: Qtype::AXFR,
        qclass: Qclass::IN,
    };
    let build = |answers: &[ResourceRecord]| -> Result<Vec<u8>> {
        let mut writer = Writer::new(request.response());
        writer.add_question(&question)?;
        for record in answers {
            writer.add_answer(record)?;
        }
        Ok(writer.finish())
    };
    let soa = std::slice::from_ref(soa);
    Ok([build(soa)?, build(body)?, build(soa)?])
}

async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<u8>> {
    let len = stream.read_u16().await?;
    if (len as usize) < HEADER_SIZE {
        return Err(Error::ShortMessage(len));
    }
    let mut request = vec![0; len as usize];
    stream.read_exact(&mut request).await?;
    Ok(request)
}

async fn write_message<S: AsyncWrite + Unpin>(stream: &mut S, message: &[u8]) -> Result<()> {
    let len = u16::try_from(message.len()).map_err(|_| Error::MessageTooLong(message.len()))?;
    let mut frame = Vec::with_capacity(2 + message.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(message);
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

async fn bounded<T>(timeout: Duration, future: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| Error::TimedOut)?
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error that ends a transfer connection.
#[derive(Debug)]
pub enum Error {
    /// The peer is not an allowed secondary.
    Unauthorized(IpAddr),

    /// The request's length prefix is too small for a DNS header.
    ShortMessage(u16),

    /// The request could not be parsed.
    Malformed(reader::Error),

    /// The request is not for an AXFR.
    NotAxfr(Qtype),

    /// The request's TSIG RR did not verify.
    BadRequestSignature(tsig::Error),

    /// The zone store has no SOA record for the zone.
    NoSoa(String),

    /// The current time cannot be expressed as a TSIG time.
    UnrepresentableTime,

    /// A message could not be signed.
    Signing(tsig::Error),

    /// A message could not be built.
    Build(writer::Error),

    /// A message is too long for TCP framing.
    MessageTooLong(usize),

    Io(io::Error),

    /// A read or write did not complete within the timeout.
    TimedOut,
}

/// The broad classes of [`Error`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Category {
    Unauthorized,
    Protocol,
    Signing,
    Io,
}

impl Error {
    pub fn category(&self) -> Category {
        match self {
            Self::Unauthorized(_) => Category::Unauthorized,
            Self::ShortMessage(_)
            | Self::Malformed(_)
            | Self::NotAxfr(_)
            | Self::BadRequestSignature(_)
            | Self::NoSoa(_) => Category::Protocol,
            Self::UnrepresentableTime
            | Self::Signing(_)
            | Self::Build(_)
            | Self::MessageTooLong(_) => Category::Signing,
            Self::Io(_) | Self::TimedOut => Category::Io,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<writer::Error> for Error {
    fn from(err: writer::Error) -> Self {
        Self::Build(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unauthorized(ip) => write!(f, "{} is not an allowed secondary", ip),
            Self::ShortMessage(len) => write!(f, "request length {} is too short", len),
            Self::Malformed(err) => write!(f, "malformed request: {}", err),
            Self::NotAxfr(qtype) => write!(f, "not an AXFR request (QTYPE {})", qtype),
            Self::BadRequestSignature(err) => write!(f, "request signature: {}", err),
            Self::NoSoa(zone) => write!(f, "no SOA record for zone {}", zone),
            Self::UnrepresentableTime => f.write_str("current time is not representable"),
            Self::Signing(err) => write!(f, "signing failed: {}", err),
            Self::Build(err) => write!(f, "failed to build response: {}", err),
            Self::MessageTooLong(len) => write!(f, "message of {} octets is too long", len),
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            Self::BadRequestSignature(err) | Self::Signing(err) => Some(err),
            Self::Build(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// The type returned by fallible transfer functions.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use lazy_static::lazy_static;
    use tokio::io::duplex;

    use super::*;
    use crate::message::tsig::{compute_mac, KeyStore};
    use crate::message::Reader;
    use crate::rr::{RecordData, Soa};
    use crate::server::TransferConfig;
    use crate::zone::ZoneStore;

    const SECRET: &str = "dG9wc2VjcmV0";
    const SECONDARY: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    lazy_static! {
        static ref KEY: TsigKey = TsigKey::new("axfr-key.", "hmac-sha256.", SECRET);
        static ref APEX_SOA: ResourceRecord = ResourceRecord::from_data(
            "example.com.",
            3600,
            RecordData::Soa(Soa {
                mname: "ns1.example.com.".into(),
                rname: "hostmaster.example.com.".into(),
                serial: 1,
                refresh: 3600,
                retry: 600,
                expire: 604800,
                minimum: 300,
            }),
        )
        .unwrap();
    }

    fn a(owner: &str, last: u8) -> ResourceRecord {
        ResourceRecord::from_data(owner, 300, RecordData::A(Ipv4Addr::new(192, 0, 2, last)))
            .unwrap()
    }

    fn server(config: TransferConfig) -> Arc<Server> {
        let zones = ZoneStore::new();
        zones.load(vec![
            APEX_SOA.clone(),
            a("example.com.", 1),
            a("www.example.com.", 2),
            a("mail.example.com.", 3),
            a("example.org.", 4),
        ]);
        let server = Server::new(Arc::new(zones));
        server.set_transfer_config(config);
        Arc::new(server)
    }

    fn allow_local() -> TransferConfig {
        TransferConfig {
            secondaries: vec![SECONDARY],
            ..TransferConfig::default()
        }
    }

    fn request(qname: &str, qtype: Qtype) -> Vec<u8> {
        let mut writer = Writer::new(Header {
            id: 0xab97,
            ..Header::default()
        });
        writer
            .add_question(&Question {
                qname: qname.into(),
                qtype,
                qclass: Qclass::IN,
            })
            .unwrap();
        writer.finish()
    }

    fn framed(message: &[u8]) -> Vec<u8> {
        let mut frame = (message.len() as u16).to_be_bytes().to_vec();
        frame.extend_from_slice(message);
        frame
    }

    /// Runs a transfer with `input` already sent by the client, and
    /// returns the result along with everything the server wrote.
    async fn transfer(server: &Server, peer: IpAddr, input: &[u8]) -> (Result<Transfer>, Vec<u8>) {
        let (mut client, mut server_end) = duplex(1 << 16);
        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();
        let result = serve_transfer(server, &mut server_end, peer).await;
        drop(server_end);
        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        (result, output)
    }

    fn split_frames(mut output: &[u8]) -> Vec<&[u8]> {
        let mut frames = Vec::new();
        while !output.is_empty() {
            let len = u16::from_be_bytes([output[0], output[1]]) as usize;
            frames.push(&output[2..2 + len]);
            output = &output[2 + len..];
        }
        frames
    }

    fn answers(message: &[u8]) -> (Header, Vec<Vec<u8>>) {
        let mut reader = Reader::try_from(message).unwrap();
        let header = *reader.header();
        let question = reader.read_question().unwrap();
        assert_eq!(question.qtype, Qtype::AXFR);
        let mut answers = Vec::new();
        for _ in 0..header.ancount {
            let start = reader.cursor();
            reader.read_rr().unwrap();
            answers.push(message[start..reader.cursor()].to_vec());
        }
        (header, answers)
    }

    fn owners_and_types(message: &[u8]) -> Vec<(String, Type)> {
        let mut reader = Reader::try_from(message).unwrap();
        let ancount = reader.header().ancount;
        reader.read_question().unwrap();
        (0..ancount)
            .map(|_| {
                let rr = reader.read_rr().unwrap();
                (rr.owner, rr.rr_type)
            })
            .collect()
    }

    #[tokio::test]
    async fn transfer_is_framed_as_three_messages() {
        let server = server(allow_local());
        let (result, output) =
            transfer(&server, SECONDARY, &framed(&request("Example.COM", Qtype::AXFR))).await;
        assert_eq!(
            result.unwrap(),
            Transfer {
                zone: "example.com.".into(),
                records: 3,
                key_name: None,
            }
        );

        let frames = split_frames(&output);
        assert_eq!(frames.len(), 3);
        let (first_header, first) = answers(frames[0]);
        let (middle_header, middle) = answers(frames[1]);
        let (last_header, last) = answers(frames[2]);
        assert_eq!(first_header.ancount, 1);
        assert_eq!(middle_header.ancount, 3);
        assert_eq!(last_header.ancount, 1);
        assert_eq!(first, last);
        assert_eq!(owners_and_types(frames[0]), [("example.com.".to_owned(), Type::SOA)]);
        assert_eq!(middle.len(), 3);
        assert_eq!(
            owners_and_types(frames[1]),
            [
                ("example.com.".to_owned(), Type::A),
                ("mail.example.com.".to_owned(), Type::A),
                ("www.example.com.".to_owned(), Type::A),
            ],
        );
        for header in [first_header, middle_header, last_header] {
            assert_eq!(header.id, 0xab97);
            assert_eq!(header.flags, 0x8400);
            assert_eq!(header.arcount, 0);
        }
    }

    #[tokio::test]
    async fn unauthorized_peers_get_nothing() {
        let server = server(allow_local());
        let peer = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 99));
        let (result, output) =
            transfer(&server, peer, &framed(&request("example.com.", Qtype::AXFR))).await;
        assert!(matches!(result, Err(Error::Unauthorized(ip)) if ip == peer));
        assert_eq!(result.unwrap_err().category(), Category::Unauthorized);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn zones_without_soa_get_nothing() {
        let server = server(allow_local());
        let (result, output) =
            transfer(&server, SECONDARY, &framed(&request("example.org.", Qtype::AXFR))).await;
        assert!(matches!(result, Err(Error::NoSoa(ref zone)) if zone == "example.org."));
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn protocol_violations_get_nothing() {
        let server = server(allow_local());

        let (result, output) =
            transfer(&server, SECONDARY, &framed(&request("example.com.", Qtype::from(Type::A)))).await;
        assert!(matches!(result, Err(Error::NotAxfr(_))));
        assert!(output.is_empty());

        let (result, output) = transfer(&server, SECONDARY, &[0, 11]).await;
        assert!(matches!(result, Err(Error::ShortMessage(11))));
        assert!(output.is_empty());

        let mut short = framed(&request("example.com.", Qtype::AXFR));
        short.truncate(short.len() - 1);
        let (result, output) = transfer(&server, SECONDARY, &short).await;
        let error = result.unwrap_err();
        assert!(matches!(error, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert_eq!(error.category(), Category::Io);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn configured_key_signs_unsigned_requests() {
        let mut config = allow_local();
        config.keys = [KEY.clone()].into_iter().collect::<KeyStore>();
        config.signing_key = Some("axfr-key.".into());
        let server = server(config);
        let (result, output) =
            transfer(&server, SECONDARY, &framed(&request("example.com.", Qtype::AXFR))).await;
        assert_eq!(result.unwrap().key_name.as_deref(), Some("axfr-key."));

        for frame in split_frames(&output) {
            let mut reader = Reader::try_from(frame).unwrap();
            let header = *reader.header();
            assert_eq!(header.arcount, 1);
            reader.read_question().unwrap();
            for _ in 0..header.ancount {
                reader.read_rr().unwrap();
            }
            let tsig_rr = reader.read_rr().unwrap();
            assert_eq!(tsig_rr.rr_type, Type::TSIG);
            assert_eq!(tsig_rr.owner, "axfr-key.");
            assert!(reader.at_eom());

            let rdata = crate::rr::rdata::TsigRdata::decode(tsig_rr.rdata).unwrap();
            assert_eq!(rdata.algorithm, "hmac-sha256.");
            assert_eq!(rdata.fudge, 300);
            assert_eq!(rdata.original_id, 0xab97);
            let mut unsigned = frame[..tsig_rr.start].to_vec();
            unsigned[10..12].copy_from_slice(&[0, 0]);
            assert_eq!(rdata.mac, compute_mac(&KEY, &unsigned).unwrap());
        }
    }

    #[tokio::test]
    async fn signed_requests_are_verified() {
        let mut config = allow_local();
        config.keys = [KEY.clone()].into_iter().collect::<KeyStore>();
        let server = server(config);

        let mut signed = request("example.com.", Qtype::AXFR);
        tsig::sign_message(&mut signed, &KEY, TimeSigned::now().unwrap()).unwrap();
        let (result, output) = transfer(&server, SECONDARY, &framed(&signed)).await;
        assert_eq!(result.unwrap().key_name.as_deref(), Some("axfr-key."));
        assert_eq!(split_frames(&output).len(), 3);

        let stranger = TsigKey::new("stranger.", "hmac-sha256.", SECRET);
        let mut signed = request("example.com.", Qtype::AXFR);
        tsig::sign_message(&mut signed, &stranger, TimeSigned::now().unwrap()).unwrap();
        let (result, output) = transfer(&server, SECONDARY, &framed(&signed)).await;
        let error = result.unwrap_err();
        assert!(matches!(
            error,
            Error::BadRequestSignature(tsig::Error::UnknownKey(ref name)) if name == "stranger."
        ));
        assert_eq!(error.category(), Category::Protocol);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn bad_signing_key_aborts_before_sending() {
        let mut config = allow_local();
        config.signing_key = Some("missing-key.".into());
        let server = server(config);
        let (result, output) =
            transfer(&server, SECONDARY, &framed(&request("example.com.", Qtype::AXFR))).await;
        assert_eq!(result.unwrap_err().category(), Category::Signing);
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn oversized_zones_send_nothing() {
        let server = server(allow_local());
        for i in 0..2000u16 {
            server.zones().insert(a(&format!("host{}.example.com.", i), (i % 256) as u8));
        }
        let (result, output) =
            transfer(&server, SECONDARY, &framed(&request("example.com.", Qtype::AXFR))).await;
        let error = result.unwrap_err();
        assert!(matches!(error, Error::MessageTooLong(len) if len > 65535));
        assert!(output.is_empty());
    }

    #[test]
    fn build_transfer_messages_echoes_request() {
        let header = Header {
            id: 7,
            flags: 0x0100,
            ..Header::default()
        };
        let body = [a("www.example.com.", 2), a("mail.example.com.", 3)];
        let messages = build_transfer_messages(&header, "example.com.", &APEX_SOA, &body).unwrap();
        let counts: Vec<u16> = messages
            .iter()
            .map(|m| Header::parse(m).unwrap().ancount)
            .collect();
        assert_eq!(counts, [1, 2, 1]);
        assert_eq!(messages[0], messages[2]);
    }
}
