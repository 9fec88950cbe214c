//! Microsegment engine: typed master records, structural arithmetic, the
//! per-key-chain partitioner, and market aggregation.

pub mod arith;
pub mod choice;
pub mod markets;
pub mod master;
pub mod partition;
pub mod performance;

pub use arith::{Combine, Node, add_keyvals, div_keyvals};
pub use markets::{ContributingMseg, Lifetime, MarketSet, MsegAdjust, OutputBreakdown};
pub use master::MasterMseg;
