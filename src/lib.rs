//! Keeps listener audio aligned with a light show.
//!
//! The server polls the show-control device ([`poller`]), resolves the audio
//! asset for the running sequence ([`resolver`]) and pushes the timeline to
//! every connected listener ([`hub`], [`api`]). Listeners ([`client`]) track
//! that timeline with graduated playback-rate corrections.
//!
//! All timeline state lives in one process. Scaling the engine horizontally
//! needs a shared pub/sub backbone first.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod mapping;
pub mod poller;
pub mod resolver;
pub mod show_control;
pub mod timeline;

pub use hub::BroadcastHub;
pub use poller::Poller;
pub use resolver::AudioResolver;
pub use timeline::{Clock, SystemClock, TimelineState};
