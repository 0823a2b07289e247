//! Anonymous room chat: per-room handles, presence, message fan-out and the HTTP
//! room endpoints.

pub mod channel;
pub mod crud;
pub mod identity;
pub mod pipeline;
pub mod presence;
pub mod seed;
pub mod sequencer;
pub mod store;
