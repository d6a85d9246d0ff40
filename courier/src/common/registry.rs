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

//! The recipient table of one transport.

use std::any::Any;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;

use crate::common::ActorId;
use crate::message::{Envelope, TransportError};

/// Sending half of a recipient's mailbox.
pub(crate) type Mailbox = mpsc::UnboundedSender<Envelope>;

/// Receiving half of a recipient's mailbox, drained by its worker.
pub(crate) type Inbox = mpsc::UnboundedReceiver<Envelope>;

/// A registered actor instance, type-erased. Always an `Arc<tokio::sync::Mutex<A>>`.
pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

enum Slot {
    /// Identity handed out but no actor bound yet; calls queue in `parked`.
    Reserved { mailbox: Mailbox, parked: Inbox },
    /// Actor bound and served by a mailbox worker.
    Live { mailbox: Mailbox, instance: Instance },
}

impl Slot {
    fn mailbox(&self) -> &Mailbox {
        match self {
            Self::Reserved { mailbox, .. } | Self::Live { mailbox, .. } => mailbox,
        }
    }
}

/// Result of looking an identity up in the registry.
pub(crate) enum Lookup {
    Live(Instance),
    Reserved,
    Absent,
}

/// What a retired identity left behind.
pub(crate) enum Retired {
    /// An actor was bound; its worker finishes what is already queued.
    Live,
    /// No actor was bound; the inbox holds every call queued meanwhile.
    Reserved(Inbox),
}

/// Maps identities owned by a transport to their mailboxes.
///
/// An identity moves `absent -> reserved -> live -> retired`, or straight from
/// `absent` to `live`. Retired identities are remembered and never bound again.
#[derive(Default)]
pub(crate) struct RecipientRegistry {
    slots: DashMap<ActorId, Slot>,
    retired: DashSet<ActorId>,
}

impl std::fmt::Debug for RecipientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientRegistry")
            .field("recipients", &self.slots.len())
            .field("retired", &self.retired.len())
            .finish()
    }
}

impl RecipientRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reserves `id` so calls to it queue until an actor is bound.
    pub(crate) fn reserve(&self, id: ActorId) -> Result<(), TransportError> {
        if self.retired.contains(&id) {
            return Err(TransportError::RegistrationConflict(id));
        }
        match self.slots.entry(id) {
            Entry::Occupied(occupied) => Err(TransportError::RegistrationConflict(
                occupied.key().clone(),
            )),
            Entry::Vacant(vacant) => {
                let (mailbox, parked) = mpsc::unbounded_channel();
                vacant.insert(Slot::Reserved { mailbox, parked });
                Ok(())
            }
        }
    }

    /// Binds `instance` to `id` and returns the inbox its worker must drain.
    ///
    /// For a reserved identity the inbox already holds every call made while it
    /// was reserved.
    pub(crate) fn activate(&self, id: ActorId, instance: Instance) -> Result<Inbox, TransportError> {
        if self.retired.contains(&id) {
            return Err(TransportError::RegistrationConflict(id));
        }
        match self.slots.entry(id) {
            Entry::Vacant(vacant) => {
                let (mailbox, inbox) = mpsc::unbounded_channel();
                vacant.insert(Slot::Live { mailbox, instance });
                Ok(inbox)
            }
            Entry::Occupied(mut occupied) => {
                let mailbox = match occupied.get() {
                    Slot::Reserved { mailbox, .. } => mailbox.clone(),
                    Slot::Live { .. } => {
                        return Err(TransportError::RegistrationConflict(occupied.key().clone()))
                    }
                };
                match occupied.insert(Slot::Live { mailbox, instance }) {
                    Slot::Reserved { parked, .. } => Ok(parked),
                    Slot::Live { .. } => Err(TransportError::RegistrationConflict(
                        occupied.key().clone(),
                    )),
                }
            }
        }
    }

    /// Removes `id` and retires it. Returns `None` if `id` was not present.
    ///
    /// Dropping the slot closes the mailbox, so a live worker finishes what is
    /// already queued and exits.
    pub(crate) fn retire(&self, id: &ActorId) -> Option<Retired> {
        let (_, slot) = self.slots.remove(id)?;
        self.retired.insert(id.clone());
        Some(match slot {
            Slot::Live { .. } => Retired::Live,
            Slot::Reserved { parked, .. } => Retired::Reserved(parked),
        })
    }

    pub(crate) fn mailbox(&self, id: &ActorId) -> Option<Mailbox> {
        self.slots.get(id).map(|slot| slot.mailbox().clone())
    }

    pub(crate) fn lookup(&self, id: &ActorId) -> Lookup {
        match self.slots.get(id).as_deref() {
            Some(Slot::Live { instance, .. }) => Lookup::Live(Arc::clone(instance)),
            Some(Slot::Reserved { .. }) => Lookup::Reserved,
            None => Lookup::Absent,
        }
    }

    pub(crate) fn is_retired(&self, id: &ActorId) -> bool {
        self.retired.contains(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
