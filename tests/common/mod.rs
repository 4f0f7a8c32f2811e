//! Shared test infrastructure for resolver integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{AuthorityObject, Catalog, MessageRequest, MessageResponse};
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::str::FromStr;

use fleet_dns::authority::FleetAuthority;
use fleet_dns::{
    AnswerSet, AttributeRef, DnsConfig, Instance, InventoryClient, InventoryResolver, NameService,
    ResolveError, StaticInventory,
};

// --- Fake upstream name service ---

/// Name service backed by a fixed answer table.
///
/// Unknown names come back as not-found, the condition the inventory fallback
/// keys on. Counts lookups so tests can assert on caching behavior.
pub struct FakeUpstream {
    answers: Mutex<HashMap<(String, RecordType), AnswerSet>>,
    calls: AtomicUsize,
    broken: bool,
}

impl FakeUpstream {
    pub fn empty() -> Self {
        Self {
            answers: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            broken: false,
        }
    }

    /// An upstream whose transport always fails.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::empty()
        }
    }

    /// Register a fixed answer for `(name, rtype)`.
    pub fn with_answer(self, name: &str, rtype: RecordType, set: AnswerSet) -> Self {
        self.answers
            .lock()
            .unwrap()
            .insert((name.to_string(), rtype), set);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameService for FakeUpstream {
    async fn lookup(
        &self,
        name: &str,
        _class: DNSClass,
        rtype: RecordType,
    ) -> Result<AnswerSet, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(ResolveError::Backend("upstream unreachable".to_string()));
        }
        match self.answers.lock().unwrap().get(&(name.to_string(), rtype)) {
            Some(set) => Ok(set.clone()),
            None => Err(ResolveError::NameNotFound(name.to_string())),
        }
    }
}

// --- Counting inventory ---

/// Inventory backend wrapping the static one with a call counter.
pub struct CountingInventory {
    inner: StaticInventory,
    calls: AtomicUsize,
}

impl CountingInventory {
    pub fn new(instances: Vec<Instance>) -> Self {
        Self {
            inner: StaticInventory::new(instances),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InventoryClient for CountingInventory {
    fn list_instances(
        &self,
        filter: &AttributeRef,
        value: &str,
    ) -> Result<Vec<Instance>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_instances(filter, value)
    }
}

// --- Fixture data ---

/// A small fleet: two web instances and one database.
pub fn seed_instances() -> Vec<Instance> {
    vec![
        Instance::new()
            .with_tag("Name", "web-1")
            .with_tag("Role", "frontend")
            .with_property("private_ip_address", "10.0.0.5")
            .with_property("instance_type", "m5.large"),
        Instance::new()
            .with_tag("Name", "web-2")
            .with_tag("Role", "frontend")
            .with_property("private_ip_address", "10.0.0.6")
            .with_property("instance_type", "m5.large"),
        Instance::new()
            .with_tag("Name", "db-1")
            .with_property("private_ip_address", "10.0.1.9")
            .with_property("instance_type", "r5.xlarge"),
    ]
}

pub fn test_dns_config() -> DnsConfig {
    DnsConfig {
        listen_addr: "127.0.0.1:5353".parse().unwrap(),
        upstream: "192.0.2.53:53".parse().unwrap(),
        upstream_timeout_secs: 5,
        ttl: 60,
        autorefresh: false,
        forward: "tag:Name".to_string(),
        reverse: "private_ip_address".to_string(),
        extra: Vec::new(),
    }
}

pub fn test_dns_config_with_extras() -> DnsConfig {
    DnsConfig {
        extra: vec!["instance_type".to_string(), "tag:Role".to_string()],
        ..test_dns_config()
    }
}

/// An upstream answer set with a single A record.
pub fn upstream_a_answer(name: &str, ip: &str) -> AnswerSet {
    AnswerSet {
        answers: vec![Record::from_rdata(
            Name::from_str(name).unwrap(),
            60,
            RData::A(A::from(ip.parse::<std::net::Ipv4Addr>().unwrap())),
        )],
        authority: vec![],
        additionals: vec![],
    }
}

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// Implements `ResponseHandler` so it can be passed to
/// `Catalog::handle_request()`. The response is serialized via
/// `MessageResponse::destructive_emit()` into wire-format bytes, which are
/// then parsed back with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(io::Error::other)?;
        Ok(info)
    }
}

// --- Query/Request construction ---

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` as it would arrive over UDP.
pub fn build_request(name: &str, record_type: RecordType, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let msg = parse_message_request(&bytes);
    let src: SocketAddr = "10.0.0.1:12345".parse().unwrap();
    Request::new(msg, src, Protocol::Udp)
}

/// Build a Catalog with a FleetAuthority over the given collaborators.
pub fn build_catalog(
    config: DnsConfig,
    upstream: Arc<dyn NameService>,
    inventory: Arc<dyn InventoryClient>,
) -> Catalog {
    let resolver = InventoryResolver::new(&config, upstream, inventory);
    let authority = FleetAuthority::new(resolver);
    let origin = authority.origin().clone();
    let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
    let mut catalog = Catalog::new();
    catalog.upsert(origin, vec![authority]);
    catalog
}

// --- Response helpers ---

/// Execute a query through the catalog and return the parsed response.
pub async fn execute_query(
    catalog: &Catalog,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    let request = build_request(name, record_type, id);
    let handler = TestResponseHandler::new();
    catalog.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// Extract A addresses from a response.
pub fn extract_a_ips(msg: &Message) -> Vec<std::net::Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| r.data().as_a().map(|a| std::net::Ipv4Addr::from(a.0)))
        .collect()
}

/// Extract PTR target names from a response, normalized for comparison.
pub fn extract_ptr_names(msg: &Message) -> Vec<String> {
    msg.answers()
        .iter()
        .filter_map(|r| r.data().as_ptr())
        .map(|ptr| ptr.0.to_string().trim_end_matches('.').to_ascii_lowercase())
        .collect()
}

/// Extract TXT payloads from the additional section.
pub fn extract_additional_txt(msg: &Message) -> Vec<String> {
    msg.additionals()
        .iter()
        .filter_map(|r| r.data().as_txt())
        .flat_map(|txt| {
            txt.iter()
                .map(|bytes| String::from_utf8_lossy(bytes).to_string())
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert response is successful with exactly the expected A records.
pub fn assert_a_response(msg: &Message, expected_ips: &[&str]) {
    assert_response_code(msg, ResponseCode::NoError);
    let mut actual = extract_a_ips(msg);
    actual.sort();
    let mut expected: Vec<std::net::Ipv4Addr> = expected_ips
        .iter()
        .map(|ip| ip.parse().unwrap())
        .collect();
    expected.sort();
    assert_eq!(
        actual, expected,
        "A records mismatch.\nactual:   {:?}\nexpected: {:?}",
        actual, expected
    );
}
