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

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::common::registry::{Inbox, Lookup, RecipientRegistry, Retired};
use crate::common::{ActorId, ActorRef, CourierConfig, PendingCalls, TransportStats, CONFIG};
use crate::message::{
    new_correlation_id, Envelope, Frame, Outcome, Rejection, ResponseEnvelope, SendError,
    TransportError,
};
use crate::traits::{verify_protocol, Capabilities, Codec, Json, Network, Protocol, RemoteActor};

/// Per-call options carried by an [`ActorRef`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the configured call timeout.
    pub timeout: Option<Duration>,
    /// Cancelling this token withdraws the call.
    pub cancellation: Option<CancellationToken>,
}

/// How a call to an identity is carried out.
pub enum Route<A> {
    /// The recipient is live on the calling transport; invoke it directly.
    Local(Arc<Mutex<A>>),
    /// Encode the call and deliver it through the transport.
    Remote,
}

impl<A> fmt::Debug for Route<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(_) => f.write_str("Local"),
            Self::Remote => f.write_str("Remote"),
        }
    }
}

/// Accepts outgoing calls and delivers incoming envelopes to registered recipients.
///
/// A `Transport` is attached to one [`Network`] and owns every identity tagged with
/// that network's address. Cloning is cheap; all clones share the same registry,
/// pending-call table and statistics.
///
/// Must be created inside a Tokio runtime: construction spawns the inbound router.
pub struct Transport<C: Codec = Json> {
    inner: Arc<TransportInner<C>>,
}

struct TransportInner<C> {
    address: String,
    network: Box<dyn Network>,
    codec: C,
    config: CourierConfig,
    registry: RecipientRegistry,
    pending: PendingCalls,
    /// Correlation ids of requests waiting in a mailbox, flagged `true` once their
    /// caller withdraws.
    queued: DashMap<String, bool>,
    stats: TransportStats,
    shutdown: CancellationToken,
}

impl<C> Drop for TransportInner<C> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.network.shutdown();
    }
}

impl<C: Codec> Clone for Transport<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Codec> fmt::Debug for Transport<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("address", &self.inner.address)
            .field("codec", &self.inner.codec.name())
            .field("registry", &self.inner.registry)
            .field("pending_calls", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

impl Transport<Json> {
    /// Attaches a JSON transport with the global [`CONFIG`] to `network`.
    pub fn with_network(network: impl Network) -> Self {
        Self::new(network, Json, CONFIG.clone())
    }
}

impl<C: Codec> Transport<C> {
    /// Attaches a transport to `network`, encoding payloads with `codec`.
    pub fn new(network: impl Network, codec: C, config: CourierConfig) -> Self {
        let (sink, frames) = mpsc::channel(config.limits.inbound_queue_capacity.max(1));
        let inner = Arc::new(TransportInner {
            address: network.address().to_string(),
            network: Box::new(network),
            codec,
            config,
            registry: RecipientRegistry::new(),
            pending: PendingCalls::new(),
            queued: DashMap::new(),
            stats: TransportStats::new(),
            shutdown: CancellationToken::new(),
        });

        inner.network.start(sink);
        tokio::spawn(route_inbound(
            Arc::downgrade(&inner),
            frames,
            inner.shutdown.clone(),
        ));
        info!(address = %inner.address, codec = inner.codec.name(), "Transport started");

        Self { inner }
    }

    /// The network address of this transport; the transport tag of its identities.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// The codec used for payloads.
    #[must_use]
    pub fn codec(&self) -> &C {
        &self.inner.codec
    }

    /// The configuration this transport was created with.
    #[must_use]
    pub fn config(&self) -> &CourierConfig {
        &self.inner.config
    }

    /// The delivery guarantees of the underlying network.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.inner.network.capabilities()
    }

    /// Counters for this transport.
    #[must_use]
    pub fn stats(&self) -> &TransportStats {
        &self.inner.stats
    }

    /// Number of calls currently waiting for a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of requests waiting in a recipient mailbox.
    #[must_use]
    pub fn queued_requests(&self) -> usize {
        self.inner.queued.len()
    }

    /// Number of reserved and live recipients.
    #[must_use]
    pub fn recipients(&self) -> usize {
        self.inner.registry.len()
    }

    /// Stops the inbound router and the network. Registered actors stop receiving
    /// calls; calls in flight end with a timeout.
    pub fn shutdown(&self) {
        info!(address = %self.inner.address, "Transport shutting down");
        self.inner.shutdown.cancel();
        self.inner.network.shutdown();
    }

    /// Allocates a fresh identity for an actor of type `A` and reserves it.
    ///
    /// Calls addressed to the identity queue until [`register`](Self::register) binds
    /// an actor to it.
    pub fn allocate<A: RemoteActor>(&self) -> ActorId {
        loop {
            let id = ActorId::generate(A::TYPE_NAME, &self.inner.address);
            if self.inner.registry.reserve(id.clone()).is_ok() {
                trace!(actor = %id, "Allocated identity");
                return id;
            }
        }
    }

    /// Reserves the well-known identity `A::TYPE_NAME/name@address`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::RegistrationConflict`] if the identity is already
    /// reserved, live, or retired.
    pub fn allocate_named<A: RemoteActor>(&self, name: &str) -> Result<ActorId, TransportError> {
        let id = ActorId::new(A::TYPE_NAME, name, self.inner.address.clone());
        self.inner.registry.reserve(id.clone())?;
        trace!(actor = %id, "Allocated named identity");
        Ok(id)
    }

    /// Binds `actor` to `id` and starts serving calls for it.
    ///
    /// Calls queued while `id` was reserved are served first, in arrival order.
    ///
    /// # Errors
    ///
    /// * [`TransportError::ProtocolMismatch`] if `A`'s methods and protocol disagree
    ///   or `id` names another actor type.
    /// * [`TransportError::RegistrationConflict`] if `id` is live, retired, or owned
    ///   by another transport.
    #[instrument(skip(self, actor), fields(actor = %id))]
    pub fn register<A: RemoteActor>(&self, id: ActorId, actor: A) -> Result<ActorRef<A, C>, TransportError> {
        verify_protocol::<A>()?;
        if id.type_name() != A::TYPE_NAME {
            return Err(TransportError::ProtocolMismatch(format!(
                "cannot register a {} as {id}",
                A::TYPE_NAME
            )));
        }
        if !id.is_owned_by(&self.inner.address) {
            return Err(TransportError::RegistrationConflict(id));
        }

        let cell = Arc::new(Mutex::new(actor));
        let instance: Arc<dyn Any + Send + Sync> = cell.clone();
        let inbox = self.inner.registry.activate(id.clone(), instance)?;
        tokio::spawn(run_mailbox(
            id.clone(),
            cell,
            inbox,
            Arc::downgrade(&self.inner),
        ));
        debug!("Registered recipient");

        Ok(ActorRef::new(self.clone(), id))
    }

    /// Allocates an identity, builds the actor from it and registers it.
    ///
    /// If registration fails the allocated identity is retired.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn spawn<A, F>(&self, build: F) -> Result<ActorRef<A, C>, TransportError>
    where
        A: RemoteActor,
        F: FnOnce(&ActorId) -> A,
    {
        let id = self.allocate::<A>();
        let actor = build(&id);
        self.register(id.clone(), actor).map_err(|err| {
            self.retire(&id);
            err
        })
    }

    /// Removes the recipient for `id` and retires the identity.
    ///
    /// Work already queued for a live recipient is still served. Calls queued for an
    /// identity that was only reserved are rejected as unreachable. Returns `false`
    /// if `id` had no recipient.
    #[instrument(skip(self), fields(actor = %id))]
    pub fn deregister(&self, id: &ActorId) -> bool {
        let removed = self.retire(id);
        if removed {
            debug!("Deregistered recipient");
        }
        removed
    }

    fn retire(&self, id: &ActorId) -> bool {
        match self.inner.registry.retire(id) {
            Some(Retired::Live) => true,
            Some(Retired::Reserved(parked)) => {
                tokio::spawn(refuse_parked(parked, self.clone()));
                true
            }
            None => false,
        }
    }

    /// Returns a typed handle for `id`, which may live on any transport.
    ///
    /// Resolving does not check that the recipient exists; calls through the handle
    /// report [`TransportError::UnreachableTarget`] if it does not.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ProtocolMismatch`] if `id` names another actor type.
    pub fn resolve<A: RemoteActor>(&self, id: ActorId) -> Result<ActorRef<A, C>, TransportError> {
        if id.type_name() != A::TYPE_NAME {
            return Err(TransportError::ProtocolMismatch(format!(
                "{id} is not a {}",
                A::TYPE_NAME
            )));
        }
        Ok(ActorRef::new(self.clone(), id))
    }

    /// Decides how a call to `id` is carried out from this transport.
    pub(crate) fn route<A: RemoteActor>(&self, id: &ActorId) -> Result<Route<A>, TransportError> {
        if !id.is_owned_by(&self.inner.address) {
            return Ok(Route::Remote);
        }
        match self.inner.registry.lookup(id) {
            Lookup::Live(instance) => instance
                .downcast::<Mutex<A>>()
                .map(|actor| {
                    TransportStats::bump(&self.inner.stats.local_calls);
                    Route::Local(actor)
                })
                .map_err(|_| {
                    TransportError::ProtocolMismatch(format!("{id} is not a {}", A::TYPE_NAME))
                }),
            Lookup::Reserved => Ok(Route::Remote),
            Lookup::Absent => {
                if self.inner.registry.is_retired(id) {
                    trace!(actor = %id, "Identity was retired");
                }
                Err(TransportError::UnreachableTarget(id.clone()))
            }
        }
    }

    /// Delivers an encoded call to `target`.
    ///
    /// With `expects_reply` the caller waits for the [`Outcome`] and gets
    /// `Some(outcome)`; without, the call returns `None` once the envelope is handed
    /// off.
    ///
    /// # Errors
    ///
    /// * [`TransportError::UnreachableTarget`] if no recipient or no peer transport
    ///   exists for `target`.
    /// * [`TransportError::CallTimeout`] if no response arrives in time.
    /// * [`TransportError::Cancelled`] if the options' token is cancelled first.
    /// * [`TransportError::Network`] if an established link fails.
    pub async fn request(
        &self,
        target: &ActorId,
        payload: Vec<u8>,
        expects_reply: bool,
        options: &CallOptions,
    ) -> Result<Option<Outcome>, TransportError> {
        let envelope = Envelope {
            correlation_id: expects_reply.then(new_correlation_id),
            target: target.clone(),
            payload,
            expects_reply,
            reply_to: self.inner.address.clone(),
        };
        self.deliver(envelope, options).await
    }

    /// Encodes `message` and delivers it to `target`, waiting for the outcome.
    pub(crate) async fn call<P: Protocol>(
        &self,
        target: &ActorId,
        message: &P,
        options: &CallOptions,
    ) -> Result<Outcome, TransportError> {
        trace!(%target, selector = message.selector(), "Encoding call");
        let envelope = Envelope::encode(
            message,
            target.clone(),
            Some(new_correlation_id()),
            self.inner.address.clone(),
            &self.inner.codec,
        )?;
        self.deliver(envelope, options)
            .await?
            .ok_or_else(|| TransportError::Network("request completed without an outcome".into()))
    }

    /// Encodes `message` and delivers it to `target` without waiting.
    pub(crate) async fn cast<P: Protocol>(
        &self,
        target: &ActorId,
        message: &P,
        options: &CallOptions,
    ) -> Result<(), TransportError> {
        trace!(%target, selector = message.selector(), "Encoding one-way call");
        let envelope = Envelope::encode(
            message,
            target.clone(),
            None,
            self.inner.address.clone(),
            &self.inner.codec,
        )?;
        self.deliver(envelope, options).await.map(|_| ())
    }

    #[instrument(skip(self, envelope, options), fields(target = %envelope.target))]
    async fn deliver(
        &self,
        envelope: Envelope,
        options: &CallOptions,
    ) -> Result<Option<Outcome>, TransportError> {
        TransportStats::bump(&self.inner.stats.remote_calls);
        if options
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            TransportStats::bump(&self.inner.stats.cancellations);
            return Err(TransportError::Cancelled);
        }

        let Some(correlation_id) = envelope.correlation_id.clone() else {
            trace!("Sending one-way message");
            return self.send_envelope(envelope).await.map(|()| None);
        };

        let target = envelope.target.clone();
        let (guard, response) = self.inner.pending.open(correlation_id);
        trace!(correlation_id = guard.correlation_id(), "Sending request");
        self.send_envelope(envelope).await?;

        let timeout = options
            .timeout
            .unwrap_or_else(|| self.inner.config.call_timeout());
        tokio::select! {
            biased;

            () = cancelled(options.cancellation.as_ref()) => {
                TransportStats::bump(&self.inner.stats.cancellations);
                debug!(correlation_id = guard.correlation_id(), "Call cancelled");
                self.withdraw(&target, guard.correlation_id()).await;
                Err(TransportError::Cancelled)
            }
            result = tokio::time::timeout(timeout, response) => match result {
                Ok(Ok(outcome)) => Ok(Some(outcome)),
                Ok(Err(_)) => Err(TransportError::Network(
                    "pending call dropped before completion".into(),
                )),
                Err(_) => {
                    TransportStats::bump(&self.inner.stats.timeouts);
                    debug!(correlation_id = guard.correlation_id(), ?timeout, "Call timed out");
                    Err(TransportError::CallTimeout(timeout))
                }
            },
        }
    }

    async fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError> {
        if envelope.target.is_owned_by(&self.inner.address) {
            return self
                .enqueue(envelope)
                .map_err(|envelope| TransportError::UnreachableTarget(envelope.target));
        }
        let target = envelope.target.clone();
        match self.inner.network.send(target.transport(), Frame::Request(envelope)).await {
            Ok(()) => Ok(()),
            Err(SendError::NoPeer(to)) => {
                debug!(%target, %to, "No transport reachable for target");
                Err(TransportError::UnreachableTarget(target))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Places `envelope` in its recipient's mailbox, handing it back if there is none.
    fn enqueue(&self, envelope: Envelope) -> Result<(), Envelope> {
        if !envelope.target.is_owned_by(&self.inner.address) {
            return Err(envelope);
        }
        let Some(mailbox) = self.inner.registry.mailbox(&envelope.target) else {
            return Err(envelope);
        };
        let correlation_id = envelope.correlation_id.clone();
        if let Some(correlation_id) = &correlation_id {
            self.inner.queued.insert(correlation_id.clone(), false);
        }
        if let Err(mpsc::error::SendError(envelope)) = mailbox.send(envelope) {
            if let Some(correlation_id) = &correlation_id {
                self.inner.queued.remove(correlation_id);
            }
            return Err(envelope);
        }
        TransportStats::bump(&self.inner.stats.requests_delivered);
        Ok(())
    }

    /// Flags a still-queued request so its worker skips it. Requests already running
    /// or answered are left alone.
    fn mark_withdrawn(&self, correlation_id: &str) {
        if let Some(mut withdrawn) = self.inner.queued.get_mut(correlation_id) {
            *withdrawn = true;
            trace!(%correlation_id, "Withdrew queued request");
        }
    }

    async fn withdraw(&self, target: &ActorId, correlation_id: &str) {
        if target.is_owned_by(&self.inner.address) {
            self.mark_withdrawn(correlation_id);
        } else if self.inner.network.capabilities().cancel_propagation {
            let frame = Frame::Cancel {
                correlation_id: correlation_id.to_string(),
            };
            if let Err(err) = self.inner.network.send(target.transport(), frame).await {
                debug!(%target, error = %err, "Could not propagate cancellation");
            }
        }
    }

    async fn accept(&self, frame: Frame) {
        match frame {
            Frame::Request(envelope) => {
                if let Err(envelope) = self.enqueue(envelope) {
                    self.refuse(envelope).await;
                }
            }
            Frame::Response(response) => self.complete(response),
            Frame::Cancel { correlation_id } => self.mark_withdrawn(&correlation_id),
        }
    }

    async fn refuse(&self, envelope: Envelope) {
        TransportStats::bump(&self.inner.stats.undeliverable);
        let target = envelope.target;
        match envelope.correlation_id {
            Some(correlation_id) => {
                self.inner.queued.remove(&correlation_id);
                debug!(%target, %correlation_id, "No recipient, rejecting request");
                let response = ResponseEnvelope {
                    correlation_id,
                    outcome: Outcome::Rejected(Rejection::UnreachableTarget(target)),
                };
                self.respond(&envelope.reply_to, response).await;
            }
            None => warn!(%target, from = %envelope.reply_to, "Dropping one-way message for unknown recipient"),
        }
    }

    async fn respond(&self, reply_to: &str, response: ResponseEnvelope) {
        if reply_to == self.inner.address {
            self.complete(response);
            return;
        }
        if let Err(err) = self.inner.network.send(reply_to, Frame::Response(response)).await {
            warn!(%reply_to, error = %err, "Failed to deliver response");
        }
    }

    fn complete(&self, response: ResponseEnvelope) {
        let correlation_id = response.correlation_id.clone();
        if self.inner.pending.complete(response) {
            TransportStats::bump(&self.inner.stats.responses_received);
        } else {
            TransportStats::bump(&self.inner.stats.late_responses);
            debug!(%correlation_id, "Discarding response with no waiting caller");
        }
    }

    /// Runs one queued call against `actor` and answers it if a reply is expected.
    async fn serve<A: RemoteActor>(&self, actor: &Mutex<A>, envelope: Envelope) {
        if let Some(correlation_id) = &envelope.correlation_id {
            if let Some((_, true)) = self.inner.queued.remove(correlation_id) {
                trace!(%correlation_id, "Skipping withdrawn request");
                return;
            }
        }

        let outcome = match envelope.decode::<A::Message, C>(&self.inner.codec) {
            Ok(message) => {
                trace!(target = %envelope.target, selector = message.selector(), "Dispatching");
                let mut actor = actor.lock().await;
                match actor.dispatch(message, &self.inner.codec).await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        TransportStats::bump(&self.inner.stats.protocol_errors);
                        warn!(target = %envelope.target, error = %err, "Could not encode return value");
                        Outcome::Rejected(Rejection::ProtocolMismatch(err.to_string()))
                    }
                }
            }
            Err(err) => {
                TransportStats::bump(&self.inner.stats.protocol_errors);
                warn!(target = %envelope.target, error = %err, "Payload does not decode as {}", A::TYPE_NAME);
                Outcome::Rejected(Rejection::ProtocolMismatch(err.to_string()))
            }
        };

        if let Some(correlation_id) = envelope.correlation_id {
            let response = ResponseEnvelope {
                correlation_id,
                outcome,
            };
            self.respond(&envelope.reply_to, response).await;
        }
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Rejects every call parked for an identity retired before an actor was bound.
async fn refuse_parked<C: Codec>(mut parked: Inbox, transport: Transport<C>) {
    while let Some(envelope) = parked.recv().await {
        transport.refuse(envelope).await;
    }
}

/// Drains frames from the network until the transport is dropped or shut down.
async fn route_inbound<C: Codec>(
    inner: Weak<TransportInner<C>>,
    mut frames: mpsc::Receiver<Frame>,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;

            () = shutdown.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        Transport { inner }.accept(frame).await;
    }
    trace!("Inbound router stopped");
}

/// Serves one recipient's mailbox in arrival order until the mailbox closes.
async fn run_mailbox<A: RemoteActor, C: Codec>(
    id: ActorId,
    actor: Arc<Mutex<A>>,
    mut inbox: Inbox,
    inner: Weak<TransportInner<C>>,
) {
    while let Some(envelope) = inbox.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        Transport { inner }.serve(&actor, envelope).await;
    }
    trace!(actor = %id, "Mailbox closed");
}
