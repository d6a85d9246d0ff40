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

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::common::{ActorId, CallOptions, Route, Transport, TransportStats};
use crate::message::{CallError, Outcome, TransportError};
use crate::traits::{Codec, Json, RemoteActor};

/// A typed, location-transparent handle to an actor of type `A`.
///
/// Calls go through the `<A>Client` trait generated by
/// [`remote_actor`](crate::prelude::remote_actor). Each call asks
/// [`route`](Self::route) whether the recipient is live on this handle's transport:
/// if so the method runs directly under the actor's lock with no encoding at all,
/// otherwise the call is encoded and delivered through the transport.
///
/// Handles are cheap to clone and compare by identity.
pub struct ActorRef<A, C: Codec = Json> {
    transport: Transport<C>,
    id: ActorId,
    options: CallOptions,
    _actor: PhantomData<fn() -> A>,
}

impl<A: RemoteActor, C: Codec> ActorRef<A, C> {
    pub(crate) fn new(transport: Transport<C>, id: ActorId) -> Self {
        Self {
            transport,
            id,
            options: CallOptions::default(),
            _actor: PhantomData,
        }
    }

    /// The identity this handle addresses.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// The transport calls are issued from.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Transport<C> {
        &self.transport
    }

    /// The options applied to every call through this handle.
    #[must_use]
    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    /// Returns a handle whose calls time out after `timeout` instead of the
    /// configured call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Returns a handle whose calls are withdrawn when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.options.cancellation = Some(token);
        self
    }

    /// Decides, for the next call, whether the recipient can be invoked directly.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnreachableTarget`] when the identity belongs to this
    /// transport but has no recipient.
    pub fn route(&self) -> Result<Route<A>, TransportError> {
        self.transport.route(&self.id)
    }

    /// Sends `message` and waits for the outcome.
    ///
    /// # Errors
    ///
    /// See [`Transport::request`].
    #[instrument(skip(self, message), fields(target = %self.id))]
    pub async fn call(&self, message: A::Message) -> Result<Outcome, TransportError> {
        self.transport.call(&self.id, &message, &self.options).await
    }

    /// Sends `message` without waiting for it to run.
    ///
    /// # Errors
    ///
    /// See [`Transport::request`].
    #[instrument(skip(self, message), fields(target = %self.id))]
    pub async fn cast(&self, message: A::Message) -> Result<(), TransportError> {
        self.transport.cast(&self.id, &message, &self.options).await
    }

    /// Decodes the outcome of a call to a method returning `T`.
    ///
    /// # Errors
    ///
    /// Rejections become their [`TransportError`]; an undecodable payload, or a
    /// `Failure` from a method that cannot fail, is a
    /// [`TransportError::ProtocolMismatch`].
    pub fn decode_reply<T: DeserializeOwned>(&self, outcome: Outcome) -> Result<T, TransportError> {
        match outcome {
            Outcome::Success(bytes) => self.decode_payload(&bytes),
            Outcome::Failure(_) => {
                TransportStats::bump(&self.transport.stats().protocol_errors);
                Err(TransportError::ProtocolMismatch(format!(
                    "{} answered with a failure for an infallible method",
                    self.id
                )))
            }
            Outcome::Rejected(rejection) => Err(rejection.into()),
        }
    }

    /// Decodes the outcome of a call to a method returning `Result<T, E>`.
    ///
    /// # Errors
    ///
    /// `Failure` payloads become [`CallError::Application`] with the decoded `E`;
    /// everything else fails as in [`decode_reply`](Self::decode_reply).
    pub fn decode_result<T, E>(&self, outcome: Outcome) -> Result<T, CallError<E>>
    where
        T: DeserializeOwned,
        E: DeserializeOwned,
    {
        match outcome {
            Outcome::Failure(bytes) => Err(CallError::Application(self.decode_payload(&bytes)?)),
            other => Ok(self.decode_reply(other)?),
        }
    }

    fn decode_payload<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, TransportError> {
        self.transport.codec().decode(bytes).map_err(|err| {
            TransportStats::bump(&self.transport.stats().protocol_errors);
            warn!(target = %self.id, error = %err, "Response does not decode");
            TransportError::from(err)
        })
    }
}

impl<A, C: Codec> Clone for ActorRef<A, C> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            id: self.id.clone(),
            options: self.options.clone(),
            _actor: PhantomData,
        }
    }
}

impl<A, C: Codec> fmt::Debug for ActorRef<A, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.id)
            .field("transport", &self.transport.address())
            .field("options", &self.options)
            .finish()
    }
}

impl<A, C: Codec> PartialEq for ActorRef<A, C> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<A, C: Codec> Eq for ActorRef<A, C> {}

impl<A, C: Codec> Hash for ActorRef<A, C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
