// src/hub/mod.rs

//! Publish/subscribe hub.
//!
//! Clients register with a [`HubHandle`]; every broadcast is delivered to
//! each registered client's outbound channel without blocking. A client
//! whose channel is full is unregistered and closed on the spot; there is
//! no queueing or retry beyond the channel buffer.

pub mod broker;
pub mod client;
pub mod message;

pub use broker::{Hub, HubHandle};
pub use client::{ChannelClient, ClientId, HubClient};
pub use message::{Message, Wire};
