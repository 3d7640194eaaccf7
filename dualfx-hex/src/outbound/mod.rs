//! Outbound adapters (driven side).

pub mod rate_feed;

pub use rate_feed::SimulatedRateFeed;
