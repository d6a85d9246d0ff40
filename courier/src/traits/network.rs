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

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::message::{Frame, SendError};

/// Where a [`Network`] delivers the frames it receives.
pub type FrameSink = mpsc::Sender<Frame>;

/// Delivery guarantees a network declares to the transport above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Frames sent from one address to another arrive in send order.
    pub ordered: bool,
    /// Peers accept [`Frame::Cancel`] so a withdrawn call can be skipped remotely.
    pub cancel_propagation: bool,
}

/// Moves frames between transports identified by network address.
///
/// A network is attached to exactly one [`Transport`](crate::Transport), which calls
/// [`start`](Network::start) once with the sink that feeds its inbound router.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// The address peers use to reach this network; also the transport tag of every
    /// identity the attached transport allocates.
    fn address(&self) -> &str;

    /// The guarantees this network provides.
    fn capabilities(&self) -> Capabilities;

    /// Begins delivering inbound frames into `sink`.
    fn start(&self, sink: FrameSink);

    /// Sends a frame to the network at address `to`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::NoPeer`] when nothing listens at `to` or it cannot be
    /// reached, and [`SendError::Failed`] when the frame could not be sent over an
    /// established link.
    async fn send(&self, to: &str, frame: Frame) -> Result<(), SendError>;

    /// Stops accepting and sending frames.
    fn shutdown(&self) {}
}
