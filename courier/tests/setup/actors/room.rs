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

use std::collections::HashSet;
use std::time::Duration;

use courier::prelude::*;
use serde::{Deserialize, Serialize};

/// Errors a [`Room`] reports to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomError {
    /// Only members may post.
    NotAMember(ActorId),
    /// Posts must have text.
    EmptyMessage,
}

/// A chat room used across the integration tests.
#[derive(Debug, Default)]
pub struct Room {
    members: HashSet<ActorId>,
    seen: HashSet<ActorId>,
    history: Vec<String>,
    recorded: Vec<u32>,
    slept: Vec<u64>,
    in_flight: usize,
    max_in_flight: usize,
}

#[remote_actor]
impl Room {
    /// Admits `client`, greeting returning clients differently.
    #[remote]
    async fn join(&mut self, client: ActorId) -> String {
        self.members.insert(client.clone());
        if self.seen.insert(client) {
            "welcome".to_string()
        } else {
            "welcome back".to_string()
        }
    }

    /// Appends a post and returns the history length.
    #[remote]
    async fn post(&mut self, from: ActorId, text: String) -> Result<usize, RoomError> {
        if !self.members.contains(&from) {
            return Err(RoomError::NotAMember(from));
        }
        if text.trim().is_empty() {
            return Err(RoomError::EmptyMessage);
        }
        self.history.push(text);
        Ok(self.history.len())
    }

    #[remote]
    fn history(&self) -> Vec<String> {
        self.history.clone()
    }

    #[remote]
    fn members(&self) -> usize {
        self.members.len()
    }

    #[remote(oneway)]
    fn leave(&mut self, client: ActorId) {
        self.members.remove(&client);
    }

    #[remote(oneway)]
    fn record(&mut self, seq: u32) {
        self.recorded.push(seq);
    }

    #[remote]
    fn recorded(&self) -> Vec<u32> {
        self.recorded.clone()
    }

    /// Sleeps, holding the room, then reports how long.
    #[remote]
    async fn slow(&mut self, millis: u64) -> u64 {
        self.in_flight += 1;
        self.max_in_flight = self.max_in_flight.max(self.in_flight);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        self.slept.push(millis);
        self.in_flight -= 1;
        millis
    }

    /// Most `slow` calls ever running at once.
    #[remote]
    fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    #[remote]
    fn slept(&self) -> Vec<u64> {
        self.slept.clone()
    }

    /// Local helper, not part of the remote surface.
    pub fn is_member(&self, client: &ActorId) -> bool {
        self.members.contains(client)
    }
}
