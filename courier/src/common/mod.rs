//! Core runtime components of Courier.
//!
//! This module holds the pieces a caller works with directly:
//! * [`ActorId`]: the address of one actor instance.
//! * [`Transport`]: delivery of calls to registered recipients, locally or across a
//!   [`Network`](crate::Network).
//! * [`ActorRef`]: the typed handle generated client traits are implemented for.
//! * [`CourierConfig`]: timeouts and limits, loaded from XDG locations.
//!
//! The recipient registry and pending-call table are internal to the transport.

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


// --- Public Re-exports ---
pub use actor_ref::ActorRef;
pub use config::{CourierConfig, LimitsConfig, TimeoutConfig, CONFIG};
pub use identity::ActorId;
pub use stats::TransportStats;
pub use transport::{CallOptions, Route, Transport};

// --- Crate-Internal Re-exports ---
pub(crate) use pending::PendingCalls;

// --- Submodules ---

/// Defines the typed `ActorRef` handle.
mod actor_ref;
/// Defines the configuration system for Courier.
pub mod config;
/// Defines `ActorId`.
mod identity;
/// Defines the pending-call table.
mod pending;
/// Defines the recipient registry.
mod registry;
/// Defines transport statistics.
mod stats;
/// Defines `Transport`, its inbound router and the mailbox workers.
mod transport;
