//! Protocol frame pipelines: P25 Phase 1, P25 Phase 2,
//! and DMR, sharing the PDU/outcome vocabulary in [`common`].

pub mod common;
pub mod dmr;
pub mod p25p1;
pub mod p25p2;
pub mod router;
