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

//! Transport-scoped actor identities.

use std::fmt;

use mti::prelude::*;
use serde::{Deserialize, Serialize};

/// Maximum length of a type-id prefix accepted by `mti`.
const MAX_PREFIX_LEN: usize = 63;

/// The address of exactly one actor instance.
///
/// An `ActorId` names the actor's type (which selects the message protocol used to
/// interpret payloads sent to it), a per-transport unique instance id, and the
/// network address of the transport that owns the instance.
///
/// Equality and hashing are structural over all three parts, so an `ActorId` can key
/// a registry and be compared after crossing a process boundary. Identities are
/// created once by [`Transport::allocate`](crate::Transport::allocate) (or
/// [`Transport::allocate_named`](crate::Transport::allocate_named)) and never
/// reused once the actor is deregistered.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId {
    type_name: String,
    instance_id: String,
    transport: String,
}

impl ActorId {
    /// Builds an identity from its parts.
    ///
    /// This is how a peer process names a well-known actor it did not allocate,
    /// e.g. `ActorId::new("Room", "lobby", "10.0.0.7:4100")`.
    #[must_use]
    pub fn new(
        type_name: impl Into<String>,
        instance_id: impl Into<String>,
        transport: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            instance_id: instance_id.into(),
            transport: transport.into(),
        }
    }

    /// Generates a fresh identity for `type_name` owned by the transport at `transport`.
    ///
    /// The instance id is a time-ordered UUIDv7 type id whose prefix is derived from
    /// the type name, so ids sort by creation time and are unique without coordination.
    #[must_use]
    pub(crate) fn generate(type_name: &str, transport: &str) -> Self {
        let prefix = type_id_prefix(type_name);
        Self::new(
            type_name,
            prefix.as_str().create_type_id::<V7>().to_string(),
            transport,
        )
    }

    /// The actor type this identity was created under.
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The instance id, unique within the owning transport.
    #[inline]
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The network address of the transport that owns this actor.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// Returns `true` if the actor is owned by the transport listening at `address`.
    #[inline]
    #[must_use]
    pub fn is_owned_by(&self, address: &str) -> bool {
        self.transport == address
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.type_name, self.instance_id, self.transport)
    }
}

/// Lowercases the type name and keeps only characters `mti` accepts in a prefix.
fn type_id_prefix(type_name: &str) -> String {
    let prefix: String = type_name
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_PREFIX_LEN)
        .collect();
    if prefix.is_empty() {
        "actor".to_string()
    } else {
        prefix
    }
}
