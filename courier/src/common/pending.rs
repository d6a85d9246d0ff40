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

//! Calls awaiting a response, keyed by correlation id.

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::message::{Outcome, ResponseEnvelope};

#[derive(Debug, Default)]
pub(crate) struct PendingCalls {
    calls: DashMap<String, oneshot::Sender<Outcome>>,
}

impl PendingCalls {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Opens a call and returns the guard that owns its entry together with the
    /// receiver its response will arrive on.
    pub(crate) fn open(&self, correlation_id: String) -> (PendingGuard<'_>, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        self.calls.insert(correlation_id.clone(), tx);
        (
            PendingGuard {
                table: self,
                correlation_id,
            },
            rx,
        )
    }

    /// Completes the call named by `response`.
    ///
    /// Returns `false` when no caller is waiting any more: the call already timed
    /// out, was cancelled, or never existed.
    pub(crate) fn complete(&self, response: ResponseEnvelope) -> bool {
        match self.calls.remove(&response.correlation_id) {
            Some((_, tx)) => tx.send(response.outcome).is_ok(),
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }
}

/// Removes its entry from the pending table when dropped, whichever way the call
/// ends, including when the calling future itself is dropped.
pub(crate) struct PendingGuard<'a> {
    table: &'a PendingCalls,
    correlation_id: String,
}

impl PendingGuard<'_> {
    pub(crate) fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.calls.remove(&self.correlation_id);
    }
}
