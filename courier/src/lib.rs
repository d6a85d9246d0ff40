/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */


#![forbid(unsafe_code)]
#![forbid(missing_docs)] // Keep this to enforce coverage

//! # Courier
//!
//! Location-transparent remote calls between actors, built on Tokio. A caller
//! invokes a method on a typed handle without knowing whether the actor lives in the
//! same process or behind a network connection.
//!
//! ## Key Concepts
//!
//! - **Identity (`ActorId`)**: `type/instance@transport`, stable for the life of an
//!   actor instance and never reused.
//! - **Protocol**: the closed message enum of one actor type, one variant per remote
//!   method, encoded by a pluggable `Codec` (`Json` by default).
//! - **Dispatcher (`RemoteActor`)**: maps a decoded message to exactly one method
//!   call and packages its result as an `Outcome`.
//! - **Transport**: owns the recipient registry and the pending-call table, routes
//!   calls to local mailboxes or over a `Network`.
//! - **Stubs (`ActorRef` + generated `<Actor>Client`)**: per call, invoke a local
//!   recipient directly or encode the call and wait for its response.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! struct Room {
//!     seen: HashSet<ActorId>,
//! }
//!
//! #[remote_actor]
//! impl Room {
//!     #[remote]
//!     async fn join(&mut self, client: ActorId) -> String {
//!         if self.seen.insert(client) { "welcome".into() } else { "welcome back".into() }
//!     }
//! }
//!
//! let hub = LoopbackHub::new();
//! let server = Transport::with_network(hub.network("server"));
//! let room = server.spawn(|_| Room { seen: HashSet::new() })?;
//!
//! let client = Transport::with_network(hub.network("client"));
//! let remote = client.resolve::<Room>(room.id().clone())?;
//! assert_eq!(remote.join(client_id).await?, "welcome");
//! ```

extern crate self as courier;

/// Identity, transport, handles and configuration.
pub(crate) mod common;

/// Envelopes, frames and error types.
pub(crate) mod message;

/// Shipped network implementations.
pub mod net;

/// Core traits: codecs, protocols, remote actors and networks.
pub(crate) mod traits;

pub use common::config;
pub use common::{
    ActorId, ActorRef, CallOptions, CourierConfig, LimitsConfig, Route, TimeoutConfig, Transport,
    TransportStats, CONFIG,
};
pub use message::{
    new_correlation_id, CallError, CodecError, Envelope, Frame, Outcome, Rejection,
    ResponseEnvelope, SendError, TransportError,
};
#[cfg(feature = "messagepack")]
pub use traits::MessagePack;
pub use traits::{
    verify_protocol, Capabilities, Codec, FrameSink, Json, MethodSpec, Network, Protocol,
    RemoteActor,
};

pub use async_trait::async_trait;
pub use courier_macro::remote_actor;

#[doc(hidden)]
pub use serde;

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## Macros
/// *   [`remote_actor`](crate::remote_actor): Attribute macro turning an `impl` block into a
///     remote actor.
/// *   [`async_trait`](crate::async_trait): Required to implement the generated client
///     traits by hand.
///
/// ## Core Types
/// *   [`ActorId`](crate::ActorId), [`ActorRef`](crate::ActorRef),
///     [`Transport`](crate::Transport), [`CallOptions`](crate::CallOptions).
/// *   [`TransportError`](crate::TransportError), [`CallError`](crate::CallError).
/// *   [`Json`](crate::Json) and the [`Codec`](crate::Codec) trait.
/// *   [`LoopbackHub`](crate::net::LoopbackHub), [`TcpNetwork`](crate::net::TcpNetwork).
pub mod prelude {
    pub use courier_macro::remote_actor;

    pub use async_trait::async_trait;

    pub use crate::common::{ActorId, ActorRef, CallOptions, CourierConfig, Route, Transport};
    pub use crate::message::{CallError, Outcome, TransportError};
    pub use crate::net::{LoopbackHub, LoopbackNetwork, TcpNetwork};
    pub use crate::traits::{Codec, Json, Network, Protocol, RemoteActor};
}
