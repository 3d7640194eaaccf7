//! # Rate Desk Hex
//!
//! Application service layer and outbound adapters for the rate desk.
//!
//! ## Architecture
//!
//! - `service` - `RateLockService`: live/locked rate state, background refresh, subscriptions
//! - `claims` - `ClaimService`: medical-aid award lifecycle
//! - `outbound/` - Rate provider adapters (simulated feed)
//!
//! Services are generic over the port traits in `dualfx-types`, allowing
//! different providers and repositories to be injected.

pub mod claims;
pub mod outbound;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use claims::ClaimService;
pub use outbound::SimulatedRateFeed;
pub use service::{RateLockService, SYSTEM_USER};
