//! GATT Subscription (§4.4): characteristic resolution, notify/indicate
//! enablement with retry, and value-changed routing.

pub mod manager;

pub use manager::{FrameStream, SubscriptionManager};
