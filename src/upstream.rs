//! Plain name-service lookups against an upstream DNS server.
//!
//! This is the "ordinary" lookup the resolver tries before falling back to
//! inventory. Queries go out over UDP; a truncated response is retried once
//! over TCP with the usual two-byte length prefix.

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RecordType};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, warn};

use crate::answer::AnswerSet;
use crate::error::ResolveError;
use crate::resolver::NameService;

/// Largest UDP response we accept.
const MAX_UDP_RESPONSE: usize = 4096;

/// Name service that forwards queries to a single upstream DNS server.
#[derive(Debug, Clone)]
pub struct UdpNameService {
    server: SocketAddr,
    timeout: Duration,
}

impl UdpNameService {
    /// Create a forwarder for `server` with a per-transaction `timeout`.
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    fn build_query(
        name: &str,
        class: DNSClass,
        rtype: RecordType,
    ) -> Result<(Message, u16), ResolveError> {
        let name = Name::from_str(name)?;
        let mut query = Query::query(name, rtype);
        query.set_query_class(class);

        let id = fastrand::u16(..);
        let mut message = Message::new();
        message.set_id(id);
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(query);

        Ok((message, id))
    }

    async fn exchange_udp(&self, request: &[u8]) -> Result<Message, ResolveError> {
        let bind_addr: SocketAddr = if self.server.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.send_to(request, self.server).await?;

        let mut buf = [0u8; MAX_UDP_RESPONSE];
        let (len, _) = tokio::time::timeout(self.timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| ResolveError::Backend(format!("upstream {} timed out", self.server)))??;

        Ok(Message::from_vec(&buf[..len])?)
    }

    /// Retry over the connection-oriented transport after a truncated UDP
    /// response.
    async fn exchange_tcp(&self, request: &[u8]) -> Result<Message, ResolveError> {
        let exchange = async {
            let mut stream = TcpStream::connect(self.server).await?;
            let len = u16::try_from(request.len())
                .map_err(|_| ResolveError::Proto("query exceeds TCP frame size".to_string()))?;
            stream.write_all(&len.to_be_bytes()).await?;
            stream.write_all(request).await?;

            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await?;
            let response_len = usize::from(u16::from_be_bytes(len_buf));
            let mut response = vec![0u8; response_len];
            stream.read_exact(&mut response).await?;

            Ok::<Message, ResolveError>(Message::from_vec(&response)?)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ResolveError::Backend(format!("upstream {} timed out", self.server)))?
    }

    fn into_answer_set(response: Message, name: &str) -> Result<AnswerSet, ResolveError> {
        match response.response_code() {
            ResponseCode::NoError => {}
            // The fallback keys on this condition specifically.
            ResponseCode::NXDomain => {
                return Err(ResolveError::NameNotFound(name.to_string()));
            }
            code => {
                return Err(ResolveError::Backend(format!(
                    "upstream answered {code} for {name}"
                )));
            }
        }

        // A NoError answer with an empty answer section carries no usable
        // records either; treat it the same as a name error so the inventory
        // fallback gets its chance.
        if response.answers().is_empty() {
            return Err(ResolveError::NameNotFound(name.to_string()));
        }

        Ok(AnswerSet {
            answers: response.answers().to_vec(),
            authority: response.name_servers().to_vec(),
            additionals: response.additionals().to_vec(),
        })
    }
}

#[async_trait]
impl NameService for UdpNameService {
    async fn lookup(
        &self,
        name: &str,
        class: DNSClass,
        rtype: RecordType,
    ) -> Result<AnswerSet, ResolveError> {
        let (message, id) = Self::build_query(name, class, rtype)?;
        let request = message.to_vec()?;

        let mut response = self.exchange_udp(&request).await?;

        if response.id() != id {
            return Err(ResolveError::Backend(format!(
                "upstream {} answered with mismatched id",
                self.server
            )));
        }

        if response.truncated() {
            debug!(name, "upstream response truncated, retrying over TCP");
            response = self.exchange_tcp(&request).await?;
            if response.id() != id {
                return Err(ResolveError::Backend(format!(
                    "upstream {} answered with mismatched id",
                    self.server
                )));
            }
        }

        Self::into_answer_set(response, name).map_err(|err| {
            if !err.is_name_not_found() {
                warn!(name, %err, "plain lookup failed");
            }
            err
        })
    }
}
