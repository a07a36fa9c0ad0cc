//! Binary codec for membership traffic
//!
//! Every frame starts with a one-byte kind tag so membership and CRUD
//! traffic can share a single inbound queue. Membership payloads are
//! fixed-width little-endian:
//!
//! - `JOINREQ`: {tag}{4-byte id}{2-byte port}{8-byte heartbeat}
//! - `JOINREP` / `UPDATEREQ`: {tag}{records}, each record
//!   {4-byte id}{2-byte port}{8-byte heartbeat}{8-byte timestamp},
//!   record count implied by payload length.

use crate::common::{Error, NodeAddr, Result, Tick};
use bytes::{Buf, BufMut, BytesMut};

pub const TAG_JOINREQ: u8 = 0;
pub const TAG_JOINREP: u8 = 1;
pub const TAG_UPDATEREQ: u8 = 2;

const RECORD_LEN: usize = 4 + 2 + 8 + 8;

/// One serialized membership entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRecord {
    pub addr: NodeAddr,
    pub heartbeat: u64,
    pub timestamp: Tick,
}

/// Decoded membership frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipFrame {
    JoinReq { from: NodeAddr, heartbeat: u64 },
    JoinRep { records: Vec<MemberRecord> },
    Update { records: Vec<MemberRecord> },
}

impl MembershipFrame {
    /// Does this tag byte belong to the membership frame space?
    pub fn owns_tag(tag: u8) -> bool {
        matches!(tag, TAG_JOINREQ | TAG_JOINREP | TAG_UPDATEREQ)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match self {
            MembershipFrame::JoinReq { from, heartbeat } => {
                buf.put_u8(TAG_JOINREQ);
                buf.put_u32_le(from.id);
                buf.put_u16_le(from.port);
                buf.put_u64_le(*heartbeat);
            }
            MembershipFrame::JoinRep { records } => {
                buf.put_u8(TAG_JOINREP);
                put_records(&mut buf, records);
            }
            MembershipFrame::Update { records } => {
                buf.put_u8(TAG_UPDATEREQ);
                put_records(&mut buf, records);
            }
        }
        buf.to_vec()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut buf = payload;
        if !buf.has_remaining() {
            return Err(Error::Malformed("empty frame".into()));
        }
        let tag = buf.get_u8();
        match tag {
            TAG_JOINREQ => {
                if buf.remaining() != 4 + 2 + 8 {
                    return Err(Error::Malformed(format!(
                        "joinreq payload has {} bytes",
                        buf.remaining()
                    )));
                }
                let id = buf.get_u32_le();
                let port = buf.get_u16_le();
                let heartbeat = buf.get_u64_le();
                Ok(MembershipFrame::JoinReq {
                    from: NodeAddr::new(id, port),
                    heartbeat,
                })
            }
            TAG_JOINREP => Ok(MembershipFrame::JoinRep {
                records: get_records(buf)?,
            }),
            TAG_UPDATEREQ => Ok(MembershipFrame::Update {
                records: get_records(buf)?,
            }),
            other => Err(Error::Malformed(format!("unknown membership tag {}", other))),
        }
    }
}

fn put_records(buf: &mut BytesMut, records: &[MemberRecord]) {
    for rec in records {
        buf.put_u32_le(rec.addr.id);
        buf.put_u16_le(rec.addr.port);
        buf.put_u64_le(rec.heartbeat);
        buf.put_u64_le(rec.timestamp);
    }
}

fn get_records(mut buf: &[u8]) -> Result<Vec<MemberRecord>> {
    if buf.remaining() % RECORD_LEN != 0 {
        return Err(Error::Malformed(format!(
            "membership payload of {} bytes is not a whole number of records",
            buf.remaining()
        )));
    }
    let mut records = Vec::with_capacity(buf.remaining() / RECORD_LEN);
    while buf.has_remaining() {
        let id = buf.get_u32_le();
        let port = buf.get_u16_le();
        let heartbeat = buf.get_u64_le();
        let timestamp = buf.get_u64_le();
        records.push(MemberRecord {
            addr: NodeAddr::new(id, port),
            heartbeat,
            timestamp,
        });
    }
    Ok(records)
}
