//! Subscription engine: per-subscription poll loops and their manager

pub mod manager;
pub mod poller;
pub mod subscription;

pub use manager::SubscriptionManager;
pub use poller::{CycleOutcome, Poller};
pub use subscription::{DeliveryGate, PollState, Subscription, SubscriptionInfo};
