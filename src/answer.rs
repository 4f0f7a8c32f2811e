//! Answer sets and record construction from inventory attributes.

use hickory_proto::rr::rdata::{A, PTR, TXT};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use std::net::Ipv4Addr;
use std::str::FromStr;
use tracing::warn;

use crate::error::ResolveError;
use crate::inventory::{AttributeRef, Instance};

/// The three record sections of a DNS answer, produced fresh per lookup and
/// immutable once returned. This is the value the cache stores.
#[derive(Debug, Clone, Default)]
pub struct AnswerSet {
    /// Answer section records.
    pub answers: Vec<Record>,
    /// Authority section records.
    pub authority: Vec<Record>,
    /// Additional section records (e.g. TXT records for extra attributes).
    pub additionals: Vec<Record>,
}

impl AnswerSet {
    /// An answer set with all three sections empty. This is the successful
    /// representation of "found nothing" — deliberately cacheable, so that
    /// persistently-absent names do not hammer the inventory backend.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when all three sections are empty.
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty() && self.authority.is_empty() && self.additionals.is_empty()
    }
}

fn make_record(name: Name, rdata: RData, ttl: u32) -> Record {
    let mut record = Record::from_rdata(name, ttl, rdata);
    record.set_dns_class(DNSClass::IN);
    record
}

/// Build rdata of the requested type from an attribute value.
///
/// Returns `Ok(None)` when the value cannot be expressed as the requested type;
/// the instance is skipped rather than poisoning the whole answer. An rtype this
/// resolver was never configured to emit is a configuration error.
fn make_rdata(rtype: RecordType, value: &str) -> Result<Option<RData>, ResolveError> {
    match rtype {
        RecordType::A => match value.parse::<Ipv4Addr>() {
            Ok(ip) => Ok(Some(RData::A(A::from(ip)))),
            Err(_) => {
                warn!(value, "attribute value is not an IPv4 address, skipping instance");
                Ok(None)
            }
        },
        RecordType::PTR => match Name::from_str(value) {
            Ok(target) => Ok(Some(RData::PTR(PTR(target)))),
            Err(_) => {
                warn!(value, "attribute value is not a valid name, skipping instance");
                Ok(None)
            }
        },
        other => Err(ResolveError::Config(format!(
            "record type {other} is not supported for inventory answers"
        ))),
    }
}

/// Construct an answer set from matching instances.
///
/// One record of `rtype` per instance whose `attribute` is present and non-empty;
/// instances missing the attribute contribute nothing. Each contributing instance
/// additionally emits one `"<attr> = <value>"` TXT record into the additional
/// section per configured `extra` attribute that is present and non-empty.
pub fn build_answer_set(
    instances: &[Instance],
    query_name: &str,
    attribute: &AttributeRef,
    rtype: RecordType,
    ttl: u32,
    extra: &[AttributeRef],
) -> Result<AnswerSet, ResolveError> {
    // An unsupported record type is a configuration error even when there is
    // nothing to build.
    if !matches!(rtype, RecordType::A | RecordType::PTR) {
        return Err(ResolveError::Config(format!(
            "record type {rtype} is not supported for inventory answers"
        )));
    }

    let name = Name::from_str(query_name)?;
    let mut set = AnswerSet::empty();

    for instance in instances {
        let value = match instance.attribute(attribute) {
            Some(value) if !value.is_empty() => value,
            _ => continue,
        };

        let Some(rdata) = make_rdata(rtype, value)? else {
            continue;
        };
        set.answers.push(make_record(name.clone(), rdata, ttl));

        for extra_attr in extra {
            let extra_value = match instance.attribute(extra_attr) {
                Some(value) if !value.is_empty() => value,
                _ => continue,
            };
            let txt = TXT::new(vec![format!("{extra_attr} = {extra_value}")]);
            set.additionals
                .push(make_record(name.clone(), RData::TXT(txt), ttl));
        }
    }

    Ok(set)
}
