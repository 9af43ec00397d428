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

//! Tests that run a whole server on loopback sockets.

use std::io::Cursor;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use sextant::io::{TokioIoProvider, TokioShutdownController};
use sextant::message::{Header, Qclass, Qtype, Question, Reader, Writer};
use sextant::rr::Type;
use sextant::server::{Server, TransferConfig};
use sextant::zone::ZoneStore;
use sextant::zone_file::Parser;

const ZONE: &str = "\
example.com. SOA ns1.example.com. hostmaster.example.com. 1 3600 600 604800 300 3600
example.com. NS ns1.example.com. 3600
example.com. A 1.2.3.4 300
ns1.example.com. A 1.2.3.5 300
*.example.com. CNAME example.com. 300
";

const LIMIT: Duration = Duration::from_secs(5);

struct Running {
    tcp_addr: SocketAddr,
    udp_addr: SocketAddr,
    _controller: TokioShutdownController,
}

async fn start(secondaries: Vec<std::net::IpAddr>) -> Running {
    let store = Arc::new(ZoneStore::new());
    store.load(Parser::new(Cursor::new(ZONE)).map(Result::unwrap));
    let server = Server::new(store);
    server.set_transfer_config(TransferConfig {
        secondaries,
        ..TransferConfig::default()
    });

    let localhost = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
    let provider = TokioIoProvider::bind([localhost], [localhost]).await.unwrap();
    let tcp_addr = provider.tcp_local_addrs().unwrap()[0];
    let udp_addr = provider.udp_local_addrs().unwrap()[0];
    let controller = provider.start(&Arc::new(server));
    Running {
        tcp_addr,
        udp_addr,
        _controller: controller,
    }
}

fn query(id: u16, qname: &str, qtype: Qtype) -> Vec<u8> {
    let mut writer = Writer::new(Header {
        id,
        flags: 0x0100,
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

async fn exchange(socket: &UdpSocket, message: &[u8]) -> Vec<u8> {
    socket.send(message).await.unwrap();
    let mut buf = vec![0; 512];
    let len = timeout(LIMIT, socket.recv(&mut buf)).await.unwrap().unwrap();
    buf.truncate(len);
    buf
}

async fn udp_client(running: &Running) -> UdpSocket {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    socket.connect(running.udp_addr).await.unwrap();
    socket
}

#[tokio::test]
async fn udp_query_is_answered() {
    let running = start(Vec::new()).await;
    let socket = udp_client(&running).await;

    let response = exchange(&socket, &query(0x1234, "example.com.", Type::A.into())).await;
    let mut reader = Reader::try_from(response.as_slice()).unwrap();
    let header = *reader.header();
    assert_eq!(header.id, 0x1234);
    assert!(header.qr());
    assert!(header.aa());
    assert_eq!(header.rcode(), 0);
    assert_eq!(header.qdcount, 1);
    assert_eq!(header.ancount, 1);
    assert_eq!(header.nscount, 0);
    assert_eq!(header.arcount, 0);

    assert_eq!(reader.read_question().unwrap().qname, "example.com.");
    let answer = reader.read_rr().unwrap();
    assert_eq!(answer.owner, "example.com.");
    assert_eq!(answer.rr_type, Type::A);
    assert_eq!(answer.ttl, 300);
    assert_eq!(answer.rdata, [1, 2, 3, 4]);
    assert!(reader.at_eom());
}

#[tokio::test]
async fn udp_wildcard_answer_uses_queried_name() {
    let running = start(Vec::new()).await;
    let socket = udp_client(&running).await;

    let response = exchange(&socket, &query(7, "Foo.example.com.", Type::A.into())).await;
    let mut reader = Reader::try_from(response.as_slice()).unwrap();
    assert_eq!(reader.header().ancount, 1);
    reader.read_question().unwrap();
    let answer = reader.read_rr().unwrap();
    assert_eq!(answer.owner, "Foo.example.com.");
    assert_eq!(answer.rr_type, Type::CNAME);
}

#[tokio::test]
async fn udp_drops_malformed_and_wrong_class_queries() {
    let running = start(Vec::new()).await;
    let socket = udp_client(&running).await;

    socket.send(b"\x00\x01\x00").await.unwrap();
    let mut chaos = query(2, "example.com.", Type::A.into());
    let class_start = chaos.len() - 2;
    chaos[class_start..].copy_from_slice(&3u16.to_be_bytes());
    socket.send(&chaos).await.unwrap();

    // Only the well-formed query gets an answer.
    let response = exchange(&socket, &query(3, "nowhere.test.", Type::A.into())).await;
    let header = Header::parse(&response).unwrap();
    assert_eq!(header.id, 3);
    assert_eq!(header.ancount, 0);
}

async fn read_framed(stream: &mut TcpStream) -> Vec<u8> {
    let len = timeout(LIMIT, stream.read_u16()).await.unwrap().unwrap();
    let mut message = vec![0; len as usize];
    timeout(LIMIT, stream.read_exact(&mut message))
        .await
        .unwrap()
        .unwrap();
    message
}

async fn send_framed(stream: &mut TcpStream, message: &[u8]) {
    stream.write_u16(message.len() as u16).await.unwrap();
    stream.write_all(message).await.unwrap();
}

#[tokio::test]
async fn axfr_streams_three_messages() {
    let running = start(vec![Ipv4Addr::LOCALHOST.into()]).await;
    let mut stream = TcpStream::connect(running.tcp_addr).await.unwrap();
    send_framed(&mut stream, &query(0xaaaa, "example.com.", Qtype::AXFR)).await;

    let messages = [
        read_framed(&mut stream).await,
        read_framed(&mut stream).await,
        read_framed(&mut stream).await,
    ];
    let counts: Vec<u16> = messages
        .iter()
        .map(|m| Header::parse(m).unwrap().ancount)
        .collect();
    assert_eq!(counts, [1, 4, 1]);

    let mut reader = Reader::try_from(messages[1].as_slice()).unwrap();
    reader.read_question().unwrap();
    let middle: Vec<(String, Type)> = (0..4)
        .map(|_| {
            let rr = reader.read_rr().unwrap();
            (rr.owner, rr.rr_type)
        })
        .collect();
    assert_eq!(
        middle,
        [
            ("*.example.com.".to_owned(), Type::CNAME),
            ("example.com.".to_owned(), Type::NS),
            ("example.com.".to_owned(), Type::A),
            ("ns1.example.com.".to_owned(), Type::A),
        ],
    );

    for message in [&messages[0], &messages[2]] {
        let mut reader = Reader::try_from(message.as_slice()).unwrap();
        assert_eq!(reader.header().id, 0xaaaa);
        assert!(reader.header().qr());
        reader.read_question().unwrap();
        assert_eq!(reader.read_rr().unwrap().rr_type, Type::SOA);
    }

    // The server closes the connection after the last message.
    let mut rest = Vec::new();
    let n = timeout(LIMIT, stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn axfr_from_unlisted_host_is_refused() {
    let running = start(Vec::new()).await;
    let mut stream = TcpStream::connect(running.tcp_addr).await.unwrap();
    // The server may close before or after this write lands.
    let _ = stream
        .write_all(&[0, 29])
        .await
        .and(stream.write_all(&query(1, "example.com.", Qtype::AXFR)).await);

    let mut buf = [0; 2];
    let result = timeout(LIMIT, stream.read(&mut buf)).await.unwrap();
    assert!(matches!(result, Ok(0) | Err(_)));
}
