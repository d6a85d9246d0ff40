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

//! Envelopes and frames exchanged between transports.

use mti::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::ActorId;
use crate::message::CodecError;
use crate::traits::{Codec, Protocol};

/// An outbound call in flight.
///
/// The payload is an encoded [`Protocol`] value whose type is implied by the target's
/// `type_name`; the envelope itself carries no other type information. An envelope is
/// built once at send time and consumed exactly once by the receiving transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Correlation token for request/response calls; `None` for fire-and-forget.
    pub correlation_id: Option<String>,
    /// The recipient.
    pub target: ActorId,
    /// Codec-encoded protocol value.
    pub payload: Vec<u8>,
    /// Whether the sender is waiting for a [`ResponseEnvelope`].
    pub expects_reply: bool,
    /// Network address of the sending transport, where responses are delivered.
    pub reply_to: String,
}

impl Envelope {
    /// Encodes `message` with `codec` into an envelope for `target`.
    ///
    /// A `correlation_id` marks the envelope as a request awaiting a
    /// [`ResponseEnvelope`]; `None` makes it fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns the codec's error if `message` cannot be encoded.
    pub fn encode<P, C>(
        message: &P,
        target: ActorId,
        correlation_id: Option<String>,
        reply_to: impl Into<String>,
        codec: &C,
    ) -> Result<Self, CodecError>
    where
        P: Protocol,
        C: Codec,
    {
        let payload = codec.encode(message)?;
        Ok(Self {
            expects_reply: correlation_id.is_some(),
            correlation_id,
            target,
            payload,
            reply_to: reply_to.into(),
        })
    }

    /// Decodes the payload as the protocol `P`.
    ///
    /// # Errors
    ///
    /// Returns the codec's error if the payload is malformed, truncated, or was
    /// produced by an incompatible codec.
    pub fn decode<P, C>(&self, codec: &C) -> Result<P, CodecError>
    where
        P: Protocol,
        C: Codec,
    {
        codec.decode(&self.payload)
    }
}

/// Generates a unique, time-ordered correlation id.
#[must_use]
pub fn new_correlation_id() -> String {
    "call".create_type_id::<V7>().to_string()
}

/// Why a receiving transport refused to dispatch a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    /// No recipient exists for the identity on the receiving transport.
    UnreachableTarget(ActorId),
    /// The payload could not be decoded into the recipient's protocol.
    ProtocolMismatch(String),
}

/// The result of dispatching one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The method returned normally; the payload is its encoded return value
    /// (an encoded `()` for methods without a return value).
    Success(Vec<u8>),
    /// The method returned `Err(e)`; the payload is the encoded `e`.
    Failure(Vec<u8>),
    /// The request never reached a method.
    Rejected(Rejection),
}

/// The response to an [`Envelope`] that expected a reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseEnvelope {
    /// The correlation id of the originating request.
    pub correlation_id: String,
    /// What happened to the request.
    pub outcome: Outcome,
}

/// Unit of transfer between two transports over a [`Network`](crate::Network).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A call for a recipient on the receiving transport.
    Request(Envelope),
    /// The answer to an earlier request from the receiving transport.
    Response(ResponseEnvelope),
    /// The caller stopped waiting for the given correlation id.
    Cancel {
        /// Correlation id of the withdrawn call.
        correlation_id: String,
    },
}
