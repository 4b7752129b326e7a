//! The live, running half of a coordinator: the subscription buses,
//! durable state store, change poller, live component graph, and the
//! reconciler that drives a [`coordinator_core::model::ConfigModel`] into
//! that graph.
//!
//! `coordinator-core` and `coordinator-config` describe what a valid
//! configuration *is*; this crate describes what running it *does*.

pub mod bus;
pub mod collaborators;
pub mod livegraph;
pub mod poller;
pub mod reconciler;
pub mod statestore;

pub use bus::{SubscriptionBus, SubscriptionHandle};
pub use collaborators::Collaborators;
pub use livegraph::{Builder, LiveGraph};
pub use poller::ChangePoller;
pub use reconciler::{Buses, Reconciler};
pub use statestore::StateStore;
