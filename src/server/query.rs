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

//! Query resolution.
//!
//! Answers are selected from the records the zone store holds for the
//! queried name:
//!
//! 1. A query of type ANY gets every record.
//! 2. A query of type CNAME gets the CNAME records.
//! 3. Any other query gets the CNAME records if there are any; CNAME
//!    chains are not followed.
//! 4. Otherwise, the query gets the records of exactly its type.
//!
//! If the records were found through a wildcard, their owners are
//! rewritten to the queried name. Responses never carry authority or
//! additional records, and the RCODE is always NOERROR, even when
//! there are no answers.

use super::Server;
use crate::analytics::EventKind;
use crate::message::{build_response, parse_message, reader, writer, Qclass, Qtype, Question};
use crate::rr::{ResourceRecord, Type};
use crate::zone::rewrite_owner;

/// The result of [`Server::handle_query`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryOutcome {
    /// Records were found for the queried name. The response may still
    /// have no answers, if none were of the queried type.
    Answered(Vec<u8>),

    /// Nothing was found for the queried name; the response has no
    /// answers.
    NotFound(Vec<u8>),

    /// The message could not be parsed. No response is sent.
    Malformed(reader::Error),

    /// The question was not of class IN. No response is sent.
    WrongClass(Qclass),

    /// The response could not be serialized. No response is sent.
    Failed(writer::Error),
}

impl QueryOutcome {
    /// Returns the response to send, if any.
    pub fn response(&self) -> Option<&[u8]> {
        match self {
            Self::Answered(response) | Self::NotFound(response) => Some(response),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Vec<u8>> {
        match self {
            Self::Answered(response) | Self::NotFound(response) => Some(response),
            _ => None,
        }
    }
}

impl Server {
    /// Handles a received query and prepares the response.
    ///
    /// Every query that parses is reported as a `request` event. Queries
    /// that fail to parse or have the wrong class are reported as
    /// `error` events and get no response. Queries for names with no
    /// records are reported as `notfound` events and get an empty
    /// response.
    pub fn handle_query(&self, received: &[u8]) -> QueryOutcome {
        let (header, question) = match parse_message(received) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.analytics.record(EventKind::Error, e.to_string());
                return QueryOutcome::Malformed(e);
            }
        };
        let description = format!(
            "{} {} {}",
            question.qname, question.qtype, question.qclass
        );
        self.analytics.record(EventKind::Request, description.clone());

        if question.qclass != Qclass::IN {
            self.analytics.record(EventKind::Error, description);
            return QueryOutcome::WrongClass(question.qclass);
        }

        let answers = self.resolve(&question);
        if answers.is_none() {
            self.analytics.record(EventKind::NotFound, description);
        }
        match build_response(&header, &question, answers.as_deref().unwrap_or(&[]), &[]) {
            Ok(response) if answers.is_some() => QueryOutcome::Answered(response),
            Ok(response) => QueryOutcome::NotFound(response),
            Err(e) => QueryOutcome::Failed(e),
        }
    }

    /// Produces the answers to `question`, or `None` if the zone store
    /// has no records at all for the queried name.
    pub fn resolve(&self, question: &Question) -> Option<Vec<ResourceRecord>> {
        let lookup = self.zones.lookup(&question.qname);
        if lookup.is_empty() {
            return None;
        }
        let answers = filter_answers(question.qtype, lookup.records());
        if lookup.wildcard().is_some() {
            Some(rewrite_owner(&answers, &question.qname))
        } else {
            Some(answers)
        }
    }
}

/// Selects the answers to a query of type `qtype` from `records`, the
/// records held for the queried name.
pub fn filter_answers(qtype: Qtype, records: &[ResourceRecord]) -> Vec<ResourceRecord> {
    if qtype == Qtype::ANY {
        return records.to_vec();
    }
    let cnames: Vec<ResourceRecord> = records
        .iter()
        .filter(|r| r.rr_type() == Type::CNAME)
        .cloned()
        .collect();
    if qtype == Qtype::from(Type::CNAME) || !cnames.is_empty() {
        return cnames;
    }
    records
        .iter()
        .filter(|r| qtype.matches(r.rr_type()))
        .cloned()
        .collect()
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use lazy_static::lazy_static;

    use super::*;
    use crate::analytics::{Analytics, Event};
    use crate::message::{Header, Reader};
    use crate::rr::{Mx, RecordData};
    use crate::zone::ZoneStore;

    fn record(owner: &str, data: RecordData) -> ResourceRecord {
        ResourceRecord::from_data(owner, 300, data).unwrap()
    }

    lazy_static! {
        static ref CNAME: ResourceRecord = record(
            "alias.example.com.",
            RecordData::Cname("www.example.com.".into())
        );
        static ref ALIAS_A: ResourceRecord =
            record("alias.example.com.", RecordData::A(Ipv4Addr::new(192, 0, 2, 9)));
        static ref APEX_A: ResourceRecord =
            record("example.com.", RecordData::A(Ipv4Addr::new(1, 2, 3, 4)));
        static ref APEX_MX: ResourceRecord = record(
            "example.com.",
            RecordData::Mx(Mx {
                preference: 10,
                exchange: "mail.example.com.".into(),
            })
        );
        static ref WILD_A: ResourceRecord = record(
            "*.wild.example.com.",
            RecordData::A(Ipv4Addr::new(192, 0, 2, 1))
        );
    }

    fn server() -> (Server, crate::analytics::EventReceiver) {
        let zones = ZoneStore::new();
        zones.load(vec![
            APEX_A.clone(),
            APEX_MX.clone(),
            CNAME.clone(),
            ALIAS_A.clone(),
            WILD_A.clone(),
        ]);
        let mut server = Server::new(Arc::new(zones));
        let (analytics, receiver) = Analytics::channel(16);
        server.set_analytics(analytics);
        (server, receiver)
    }

    fn query(qname: &str, qtype: u16, qclass: u16) -> Vec<u8> {
        let mut message = b"\x12\x34\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00".to_vec();
        crate::name::encode_name(qname, &mut message).unwrap();
        message.extend_from_slice(&qtype.to_be_bytes());
        message.extend_from_slice(&qclass.to_be_bytes());
        message
    }

    fn answers(response: &[u8]) -> (Header, Vec<(String, Type, u32, Vec<u8>)>) {
        let mut reader = Reader::try_from(response).unwrap();
        let header = *reader.header();
        reader.read_question().unwrap();
        let answers = (0..header.ancount)
            .map(|_| {
                let rr = reader.read_rr().unwrap();
                (rr.owner, rr.rr_type, rr.ttl, rr.rdata.to_vec())
            })
            .collect();
        (header, answers)
    }

    fn events(receiver: &mut crate::analytics::EventReceiver) -> Vec<EventKind> {
        std::iter::from_fn(|| receiver.try_recv())
            .map(|e: Event| e.kind)
            .collect()
    }

    #[test]
    fn cname_takes_priority() {
        let records = [CNAME.clone(), ALIAS_A.clone()];
        assert_eq!(
            filter_answers(Qtype::from(Type::A), &records),
            [CNAME.clone()]
        );
        assert_eq!(
            filter_answers(Qtype::from(Type::CNAME), &records),
            [CNAME.clone()]
        );
        assert_eq!(filter_answers(Qtype::ANY, &records), records);
        assert!(filter_answers(Qtype::from(Type::CNAME), &[APEX_A.clone()]).is_empty());
    }

    #[test]
    fn type_filtering_works() {
        let records = [APEX_A.clone(), APEX_MX.clone()];
        assert_eq!(
            filter_answers(Qtype::from(Type::MX), &records),
            [APEX_MX.clone()]
        );
        assert!(filter_answers(Qtype::from(Type::AAAA), &records).is_empty());
    }

    #[test]
    fn a_query_is_answered() {
        let (server, mut receiver) = server();
        let outcome = server.handle_query(&query("example.com.", 1, 1));
        let response = match outcome {
            QueryOutcome::Answered(ref response) => response,
            ref other => panic!("unexpected outcome {:?}", other),
        };
        let (header, answers) = answers(response);
        assert_eq!(header.id, 0x1234);
        assert!(header.qr());
        assert!(header.aa());
        assert_eq!(header.flags, 0x8400);
        assert_eq!(header.rcode(), 0);
        assert_eq!(header.qdcount, 1);
        assert_eq!(
            answers,
            [("example.com.".to_owned(), Type::A, 300, vec![1, 2, 3, 4])]
        );
        assert_eq!(events(&mut receiver), [EventKind::Request]);
    }

    #[test]
    fn wildcard_answers_are_rewritten() {
        let (server, _receiver) = server();
        let outcome = server.handle_query(&query("Test.Wild.Example.Com", 1, 1));
        let (_, answers) = answers(outcome.response().unwrap());
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].0, "Test.Wild.Example.Com.");
        assert_eq!(answers[0].3, [192, 0, 2, 1]);
    }

    #[test]
    fn unknown_names_get_empty_noerror_responses() {
        let (server, mut receiver) = server();
        let outcome = server.handle_query(&query("other.example.com.", 1, 1));
        assert!(matches!(outcome, QueryOutcome::NotFound(_)));
        let (header, answers) = answers(outcome.response().unwrap());
        assert!(answers.is_empty());
        assert_eq!(header.rcode(), 0);
        assert_eq!(
            events(&mut receiver),
            [EventKind::Request, EventKind::NotFound]
        );
    }

    #[test]
    fn existing_names_without_matching_type_are_answered() {
        let (server, mut receiver) = server();
        let outcome = server.handle_query(&query("example.com.", 28, 1));
        assert!(matches!(outcome, QueryOutcome::Answered(_)));
        assert!(answers(outcome.response().unwrap()).1.is_empty());
        assert_eq!(events(&mut receiver), [EventKind::Request]);
    }

    #[test]
    fn wrong_class_and_malformed_queries_are_dropped() {
        let (server, mut receiver) = server();
        let outcome = server.handle_query(&query("example.com.", 1, 3));
        assert_eq!(outcome, QueryOutcome::WrongClass(Qclass::from(3)));
        assert_eq!(outcome.response(), None);
        assert_eq!(
            events(&mut receiver),
            [EventKind::Request, EventKind::Error]
        );

        let truncated = query("example.com.", 1, 1);
        let outcome = server.handle_query(&truncated[..truncated.len() - 1]);
        assert_eq!(
            outcome,
            QueryOutcome::Malformed(reader::Error::UnexpectedEomInField)
        );
        assert_eq!(server.handle_query(&[0; 11]).into_response(), None);
        assert_eq!(events(&mut receiver), [EventKind::Error, EventKind::Error]);
    }

    fn raw_query(qname_wire: &[u8]) -> Vec<u8> {
        let mut message = b"\x12\x34\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00".to_vec();
        message.extend_from_slice(qname_wire);
        message.extend_from_slice(b"\x00\x01\x00\x01");
        message
    }

    #[test]
    fn binary_qnames_are_echoed_exactly() {
        let (server, _receiver) = server();
        let mut long_label = vec![63];
        long_label.extend_from_slice(&[0xff; 63]);
        long_label.extend_from_slice(b"\x07example\x03com\x00");
        let qnames: [&[u8]; 3] = [
            b"\x02\xffa\x07example\x03com\x00",
            &long_label,
            b"\x03a.b\x07example\x03com\x00",
        ];
        for qname in qnames {
            let received = raw_query(qname);
            let outcome = server.handle_query(&received);
            assert!(matches!(outcome, QueryOutcome::NotFound(_)), "{:?}", outcome);
            let response = outcome.into_response().unwrap();
            assert_eq!(response[12..], received[12..]);
        }
    }

    #[test]
    fn binary_qnames_match_wildcards() {
        let (server, _receiver) = server();
        let received = raw_query(b"\x03a.b\x04wild\x07example\x03com\x00");
        let response = server.handle_query(&received).into_response().unwrap();
        let (_, answers) = answers(&response);
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].0, r"a\046b.wild.example.com.");
        assert_eq!(response[12..received.len()], received[12..]);
        let owner = &response[received.len()..received.len() + 22];
        assert_eq!(owner, b"\x03a.b\x04wild\x07example\x03com\x00");
    }

    #[test]
    fn question_round_trips_into_empty_response() {
        let (server, _receiver) = server();
        let received = query("nothing.example.org.", 16, 1);
        let response = server.handle_query(&received).into_response().unwrap();
        assert_eq!(response.len(), received.len());
        assert_eq!(response[12..], received[12..]);
    }
}
