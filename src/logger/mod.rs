//! Run logging: a plain-text audit trail plus optional JSONL events.

pub mod activity;
pub mod audit;
pub mod jsonl;
