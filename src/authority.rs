//! Hickory DNS authority backed by the inventory resolver.
//!
//! Registered at the root origin so every query — forward names and
//! reverse-zone names alike — reaches the resolver.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::{DNSClass, LowerName, Name, Record, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupObject, LookupOptions, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::io;
use tracing::{debug, error, trace};

use crate::answer::AnswerSet;
use crate::error::ResolveError;
use crate::metrics::{self, QueryResult, Timer};
use crate::resolver::InventoryResolver;

/// Answer records handed back to the protocol layer, with the TXT extras
/// carried as additionals.
pub struct ResolvedAnswers {
    answers: Vec<Record>,
    additionals: Vec<Record>,
}

impl ResolvedAnswers {
    fn new(set: AnswerSet) -> Self {
        Self {
            answers: set.answers,
            additionals: set.additionals,
        }
    }
}

impl LookupObject for ResolvedAnswers {
    fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    fn iter<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Record> + Send + 'a> {
        Box::new(self.answers.iter())
    }

    fn take_additionals(&mut self) -> Option<Box<dyn LookupObject>> {
        if self.additionals.is_empty() {
            return None;
        }
        Some(Box::new(ResolvedAnswers {
            answers: std::mem::take(&mut self.additionals),
            additionals: Vec::new(),
        }))
    }
}

/// Authority that answers from fleet inventory via the resolver.
pub struct FleetAuthority {
    origin: LowerName,
    resolver: InventoryResolver,
}

impl FleetAuthority {
    /// Create an authority wrapping `resolver`.
    pub fn new(resolver: InventoryResolver) -> Self {
        Self {
            origin: LowerName::from(Name::root()),
            resolver,
        }
    }

    async fn resolve(
        &self,
        name: &LowerName,
        class: DNSClass,
        rtype: RecordType,
    ) -> LookupControlFlow<ResolvedAnswers> {
        // Zone-metadata types this authority never serves. The catalog also
        // issues SOA/NS lookups of its own while assembling negative
        // responses; answering them here keeps those auxiliary lookups from
        // burning uncached upstream round-trips through the resolver.
        if matches!(rtype, RecordType::SOA | RecordType::NS | RecordType::AXFR) {
            trace!(name = %name, rtype = %rtype, "zone metadata query, answering empty");
            return LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)));
        }

        let timer = Timer::start();
        let rtype_str = rtype.to_string();
        let name_str = name.to_string();

        trace!(name = %name_str, rtype = %rtype_str, "DNS lookup");

        match self.resolver.resolve(&name_str, class, rtype).await {
            Ok(set) if set.answers.is_empty() => {
                debug!(name = %name_str, "no records found");
                metrics::record_query(&rtype_str, QueryResult::NxDomain, timer.elapsed());
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NXDomain)))
            }
            Ok(set) => {
                debug!(name = %name_str, count = set.answers.len(), "returning records");
                metrics::record_query(&rtype_str, QueryResult::Success, timer.elapsed());
                LookupControlFlow::Break(Ok(ResolvedAnswers::new(set)))
            }
            Err(err) if err.is_name_not_found() => {
                debug!(name = %name_str, "name not found");
                metrics::record_query(&rtype_str, QueryResult::NxDomain, timer.elapsed());
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NXDomain)))
            }
            Err(ResolveError::Config(msg)) => {
                // Deployment misconfiguration; never a client-visible answer.
                error!(name = %name_str, rtype = %rtype_str, %msg, "configuration error");
                metrics::record_query(&rtype_str, QueryResult::Unsupported, timer.elapsed());
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
            }
            Err(err) => {
                error!(name = %name_str, rtype = %rtype_str, %err, "lookup failed");
                metrics::record_query(&rtype_str, QueryResult::ServFail, timer.elapsed());
                LookupControlFlow::Break(Err(LookupError::from(io::Error::other(
                    err.to_string(),
                ))))
            }
        }
    }
}

#[async_trait]
impl Authority for FleetAuthority {
    type Lookup = ResolvedAnswers;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.resolve(name, DNSClass::IN, rtype).await
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.resolve(
            request_info.query.name(),
            request_info.query.query_class(),
            request_info.query.query_type(),
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // DNSSEC not supported
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        // Dynamic updates not supported
        Err(ResponseCode::NotImp)
    }
}
