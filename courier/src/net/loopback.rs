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

//! An in-memory network for transports living in one process.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use crate::message::{Frame, SendError};
use crate::traits::{Capabilities, FrameSink, Network};

/// Connects any number of [`LoopbackNetwork`]s by address.
///
/// Frames still cross a real transport boundary (encoded payload, inbound router,
/// mailbox), which makes the hub the network of choice for tests of remote paths.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    endpoints: Arc<DashMap<String, FrameSink>>,
}

impl LoopbackHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a network attached to this hub at `loopback://{name}`.
    ///
    /// A later network started under the same name replaces the earlier one.
    #[must_use]
    pub fn network(&self, name: &str) -> LoopbackNetwork {
        LoopbackNetwork {
            address: format!("loopback://{name}"),
            hub: self.clone(),
        }
    }

    /// Number of started networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Returns `true` if no network is started.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// One endpoint of a [`LoopbackHub`].
#[derive(Debug)]
pub struct LoopbackNetwork {
    address: String,
    hub: LoopbackHub,
}

#[async_trait]
impl Network for LoopbackNetwork {
    fn address(&self) -> &str {
        &self.address
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            ordered: true,
            cancel_propagation: true,
        }
    }

    fn start(&self, sink: FrameSink) {
        trace!(address = %self.address, "Loopback endpoint started");
        self.hub.endpoints.insert(self.address.clone(), sink);
    }

    async fn send(&self, to: &str, frame: Frame) -> Result<(), SendError> {
        let sink = self
            .hub
            .endpoints
            .get(to)
            .map(|sink| sink.clone())
            .ok_or_else(|| SendError::NoPeer(to.to_string()))?;
        if sink.send(frame).await.is_err() {
            self.hub.endpoints.remove_if(to, |_, sink| sink.is_closed());
            return Err(SendError::NoPeer(to.to_string()));
        }
        Ok(())
    }

    fn shutdown(&self) {
        self.hub.endpoints.remove(&self.address);
    }
}
