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

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counters describing what a transport has done.
///
/// These are the observable side channel for deliveries that report no error to the
/// caller, in particular fire-and-forget calls to identities that do not exist.
#[derive(Debug, Default)]
pub struct TransportStats {
    /// Calls served by the local fast path.
    pub local_calls: AtomicUsize,
    /// Calls handed to the envelope path (own mailbox or network).
    pub remote_calls: AtomicUsize,
    /// Requests placed in a recipient mailbox.
    pub requests_delivered: AtomicUsize,
    /// Responses matched to a pending call.
    pub responses_received: AtomicUsize,
    /// Requests that named an identity with no recipient.
    pub undeliverable: AtomicUsize,
    /// Calls that failed with a timeout.
    pub timeouts: AtomicUsize,
    /// Calls withdrawn by their caller.
    pub cancellations: AtomicUsize,
    /// Payloads or responses that failed to decode.
    pub protocol_errors: AtomicUsize,
    /// Responses that arrived after their call was gone.
    pub late_responses: AtomicUsize,
}

impl TransportStats {
    /// Create new statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the number of local fast-path calls.
    #[must_use]
    pub fn local_calls(&self) -> usize {
        self.local_calls.load(Ordering::Relaxed)
    }

    /// Get the number of calls routed through envelopes.
    #[must_use]
    pub fn remote_calls(&self) -> usize {
        self.remote_calls.load(Ordering::Relaxed)
    }

    /// Get the number of requests delivered to mailboxes.
    #[must_use]
    pub fn requests_delivered(&self) -> usize {
        self.requests_delivered.load(Ordering::Relaxed)
    }

    /// Get the number of responses matched to a pending call.
    #[must_use]
    pub fn responses_received(&self) -> usize {
        self.responses_received.load(Ordering::Relaxed)
    }

    /// Get the number of undeliverable requests.
    #[must_use]
    pub fn undeliverable(&self) -> usize {
        self.undeliverable.load(Ordering::Relaxed)
    }

    /// Get the number of timed-out calls.
    #[must_use]
    pub fn timeouts(&self) -> usize {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Get the number of cancelled calls.
    #[must_use]
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::Relaxed)
    }

    /// Get the number of decode failures.
    #[must_use]
    pub fn protocol_errors(&self) -> usize {
        self.protocol_errors.load(Ordering::Relaxed)
    }

    /// Get the number of responses that arrived too late.
    #[must_use]
    pub fn late_responses(&self) -> usize {
        self.late_responses.load(Ordering::Relaxed)
    }
}
