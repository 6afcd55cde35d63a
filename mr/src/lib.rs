//! In-process, two-phase parallel map-reduce.
//!
//! [`map_reduce`] slices the input across map worker threads, routes every
//! emitted pair to the partition `hash(key) % num_reducer`, waits for all map
//! workers, then runs one reduce worker per partition over key groups.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod io;
pub mod kv;
pub mod partition;
pub mod task;
pub mod worker;

pub use config::EngineConfig;
pub use coordinator::{map_reduce, Coordinator, JobStats};
pub use error::{Error, Phase, Result};
pub use kv::{KeyValue, KvList};
pub use worker::{Mapper, Reducer};
