//! Shogun Daemon Library
//!
//! Core functionality behind the `shogun` binary:
//! - Persistent worker process pool, one runner process per role
//! - Runner side of the job protocol
//! - YAML queue/report store and the shared dashboard
//! - Instruction loading and command orchestration
//! - Queue-watching service

pub mod clock;
pub mod instructions;
pub mod orchestration;
pub mod pool;
pub mod runner;
pub mod service;
pub mod storage;
