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

//! Core traits of the Courier framework.
//!
//! * [`Codec`]: pluggable payload serialization ([`Json`] by default).
//! * [`Protocol`]: the closed message enum of one actor type.
//! * [`RemoteActor`]: an actor type's remote surface and its dispatcher.
//! * [`Network`]: frame delivery between transports.

pub use codec::{Codec, Json};
#[cfg(feature = "messagepack")]
pub use codec::MessagePack;
pub use network::{Capabilities, FrameSink, Network};
pub use remote_actor::{verify_protocol, MethodSpec, Protocol, RemoteActor};

/// Defines the [`Codec`] trait and the shipped codecs.
mod codec;

/// Defines the [`Network`] trait.
mod network;

/// Defines [`Protocol`], [`RemoteActor`] and [`MethodSpec`].
mod remote_actor;
