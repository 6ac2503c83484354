pub mod change;
pub mod channel;
pub mod error;
pub mod protocol;
pub mod query;
pub mod registry;
pub mod rest;
pub mod socket;

#[cfg(test)]
pub(crate) mod testing;

pub use change::{apply_change, ChangeEvent, Notice};
pub use channel::{Channel, ChannelEvent, ChannelState, SubscribeStatus, Transport};
pub use error::RealtimeError;
pub use query::{ConnectionPhase, QueryOptions, ReconnectingQuery, SubscriptionState};
pub use registry::{ChannelRegistry, ConnectionStats};
pub use rest::{OwnerFilter, PostgrestClient, RowSource};
pub use socket::RealtimeSocket;
