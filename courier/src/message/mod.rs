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

//! Message containers and error types.
//!
//! * [`Envelope`]: an encoded call addressed to an [`ActorId`](crate::ActorId).
//! * [`ResponseEnvelope`] / [`Outcome`]: the answer to a call, success, typed
//!   application failure, or rejection.
//! * [`Frame`]: what a [`Network`](crate::Network) carries between transports.
//! * [`TransportError`], [`CallError`], [`CodecError`], [`SendError`]: the error
//!   taxonomy.

pub use envelope::{new_correlation_id, Envelope, Frame, Outcome, Rejection, ResponseEnvelope};
pub use errors::{CallError, CodecError, SendError, TransportError};

/// Defines [`Envelope`], [`ResponseEnvelope`], [`Outcome`] and [`Frame`].
mod envelope;

/// Defines the error types returned to callers.
mod errors;
