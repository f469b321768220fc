//! # Cache Module
//!
//! Request-level caching for Open Tube.
//!
//! Every HTTP call into the extraction backend goes through the
//! [`RequestCache`], which maps a canonicalized outbound request to its
//! previously observed response. The cache improves responsiveness and keeps
//! the service friendly to rate-limited upstream instances.
//!
//! ## Behavior
//!
//! - **Bounded**: configurable entry limit (`REQUEST_CACHE_SIZE`, 1024 by
//!   default) to keep the memory footprint predictable
//! - **Insertion-order eviction**: on overflow the *oldest-inserted* entry is
//!   dropped — reads never promote an entry
//! - **No TTL**: entries live for the process lifetime; staleness is an
//!   accepted trade-off for a personal single-user service
//! - **Thread Safety**: concurrent `execute` calls from any number of tasks;
//!   racing callers on the same cold key may each hit the network, last
//!   write wins

pub mod request_cache;

pub use request_cache::{
    CachedResponse, HttpTransport, OutboundRequest, ReqwestTransport, RequestCache,
};
