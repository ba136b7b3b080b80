//! Quote Manager service
//!
//! Resolves asynchronous quote requests from the shared cache or the legacy
//! line-oriented quote server, broadcasts every resolution on the bus, and
//! absorbs peer instances' fresh broadcasts to keep the local cache warm —
//! one instance's cache miss becomes a warm entry on every other instance
//! without any peer-to-peer traffic.
//!
//! # Architecture
//!
//! ```text
//!  quote_req queue                    quote_broadcast exchange
//!        │                                      ▲        │
//!    ┌───▼────┐     ┌──────────┐     ┌──────────┴─┐  ┌───▼─────────┐
//!    │ Intake │────▶│ Resolver │────▶│ Publisher  │  │ Interceptor │
//!    └────────┘     └──┬────┬──┘     └────────────┘  └──────┬──────┘
//!                      │    │                               │
//!                 ┌────▼┐  ┌▼─────────────┐            ┌────▼┐
//!                 │Cache│  │Legacy client │            │Cache│
//!                 └─────┘  └──────────────┘            └─────┘
//! ```
//!
//! One task per in-flight request; cache lookup precedes the legacy fetch,
//! the broker acknowledgment follows the confirmed broadcast.

pub mod cache;
pub mod config;
pub mod error;
pub mod intake;
pub mod interceptor;
pub mod legacy;
pub mod publisher;
pub mod resolver;

// Service version
pub const SERVICE_VERSION: &str = "0.1.0";
