#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments, type_alias_bounds)]

//! # Ordermark-Integration
//! Low-level framework for composing REST integrations with the Ordermark backend.
//!
//! Utilised by the `ordermark` engine to look up remote order records. It is:
//! * **Low-Level**: Translates raw Http responses into any desired data model.
//! * **Flexible**: Each API supplies its own request build strategy (headers, authorisation) and
//!   its own error parser (status code & body classification).
//!
//! ## Core abstractions:
//! - **RestClient** providing configurable Http communication between client & server.
//! - **Tx** channel abstractions used to fan events between asynchronous components.

/// All [`Error`](std::error::Error)s generated in Ordermark-Integration.
pub mod error;

/// Contains the Http REST client and the associated request, build strategy and parser traits.
pub mod protocol;

/// Contains the flexible `Metric` type used for representing request measurements generically.
pub mod metric;

/// Defines a trait [`Tx`](channel::Tx) abstraction over different channel kinds, as well as
/// other channel utilities.
///
/// eg/ `UnboundedTx`, `ChannelTxDroppable`, etc.
pub mod channel;

/// Determines if something is considered "unrecoverable", such as an unrecoverable error.
///
/// Note that the meaning of [`Unrecoverable`] may vary depending on the context.
pub trait Unrecoverable {
    fn is_unrecoverable(&self) -> bool;
}
