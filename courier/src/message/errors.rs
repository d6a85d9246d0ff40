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

use std::convert::Infallible;
use std::time::Duration;

use thiserror::Error;

use crate::common::ActorId;
use crate::message::Rejection;

/// A payload could not be encoded or decoded by the configured [`Codec`](crate::Codec).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{codec} codec error: {message}")]
pub struct CodecError {
    /// Name of the codec that failed.
    pub codec: &'static str,
    /// The underlying serializer's message.
    pub message: String,
}

impl CodecError {
    /// Creates a codec error for the named codec.
    #[must_use]
    pub fn new(codec: &'static str, message: impl Into<String>) -> Self {
        Self {
            codec,
            message: message.into(),
        }
    }
}

/// Transport-level failures of a call.
///
/// These never terminate the process; every one of them is returned to the call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No live or reserved recipient exists for the identity on any reachable transport.
    #[error("unreachable target: {0}")]
    UnreachableTarget(ActorId),

    /// A payload or response could not be decoded, or a protocol contract was violated.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// No response arrived within the call timeout.
    #[error("call timed out after {0:?}")]
    CallTimeout(Duration),

    /// The caller withdrew interest before a response arrived.
    #[error("call cancelled")]
    Cancelled,

    /// The identity is already registered, or was retired and may not be reused.
    #[error("registration conflict: {0}")]
    RegistrationConflict(ActorId),

    /// The network link failed while sending.
    #[error("network error: {0}")]
    Network(String),
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        Self::ProtocolMismatch(err.to_string())
    }
}

impl From<Rejection> for TransportError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::UnreachableTarget(id) => Self::UnreachableTarget(id),
            Rejection::ProtocolMismatch(reason) => Self::ProtocolMismatch(reason),
        }
    }
}

/// Why a [`Network`](crate::Network) could not send a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Nothing listens at the address, or it could not be reached.
    #[error("no peer at {0}")]
    NoPeer(String),

    /// The frame could not be sent over an existing link, or was refused locally.
    #[error("{0}")]
    Failed(String),
}

impl From<SendError> for TransportError {
    fn from(err: SendError) -> Self {
        Self::Network(err.to_string())
    }
}

/// The failure of a call to a method that returns `Result<T, E>`.
///
/// `Application` carries the remote method's own error value, decoded back into its
/// original type, so callers can match on it exactly as they would on a local call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError<E = Infallible> {
    /// The call failed in transit.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The method ran and returned an error.
    #[error("application error: {0:?}")]
    Application(E),
}

impl<E> CallError<E> {
    /// Returns the transport error, if this is one.
    #[must_use]
    pub const fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Application(_) => None,
        }
    }

    /// Returns the application error, if this is one.
    #[must_use]
    pub fn into_application(self) -> Option<E> {
        match self {
            Self::Transport(_) => None,
            Self::Application(err) => Some(err),
        }
    }
}

impl From<CodecError> for CallError<Infallible> {
    fn from(err: CodecError) -> Self {
        Self::Transport(err.into())
    }
}
