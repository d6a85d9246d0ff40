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

use std::collections::BTreeSet;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::message::{CodecError, Outcome, TransportError};
use crate::traits::Codec;

/// The closed set of remote operations of one actor type.
///
/// Implemented by the message enum generated by
/// [`remote_actor`](crate::prelude::remote_actor): one variant per remote method, the
/// variant's fields being that method's parameters.
pub trait Protocol: Serialize + DeserializeOwned + Debug + Send + Sync + 'static {
    /// Every selector this protocol can carry, in declaration order.
    const SELECTORS: &'static [&'static str];

    /// The selector of this value's variant.
    fn selector(&self) -> &'static str;
}

/// One row of an actor's remote surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    /// Method name, which is also the protocol selector.
    pub selector: &'static str,
    /// `true` when the caller does not wait for a response.
    pub oneway: bool,
    /// `true` when the method returns `Result<T, E>` and may answer with a typed failure.
    pub fallible: bool,
}

/// An actor whose methods can be invoked through a [`Transport`](crate::Transport).
///
/// Usually generated by [`remote_actor`](crate::prelude::remote_actor). Hand-written
/// implementations are allowed; [`Transport::register`](crate::Transport::register)
/// checks them with [`verify_protocol`] before the actor becomes callable.
#[async_trait]
pub trait RemoteActor: Send + 'static {
    /// The message protocol for this actor type.
    type Message: Protocol;

    /// Stable type name carried in every [`ActorId`](crate::ActorId) of this type.
    const TYPE_NAME: &'static str;

    /// The declared remote surface.
    const METHODS: &'static [MethodSpec];

    /// Invokes the method selected by `message` and encodes what it returned.
    ///
    /// Methods returning `T` produce [`Outcome::Success`]; methods returning
    /// `Result<T, E>` produce [`Outcome::Success`] or [`Outcome::Failure`].
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the return value cannot be encoded.
    async fn dispatch<C: Codec>(
        &mut self,
        message: Self::Message,
        codec: &C,
    ) -> Result<Outcome, CodecError>;
}

/// Checks that an actor's declared methods and its protocol selectors describe the
/// same closed set of operations.
///
/// # Errors
///
/// Returns [`TransportError::ProtocolMismatch`] naming the offending selectors when a
/// method has no protocol case, a case has no method, or either side repeats a name.
pub fn verify_protocol<A: RemoteActor>() -> Result<(), TransportError> {
    let methods = unique_set(A::METHODS.iter().map(|m| m.selector), A::TYPE_NAME, "method")?;
    let cases = unique_set(
        <A::Message as Protocol>::SELECTORS.iter().copied(),
        A::TYPE_NAME,
        "protocol case",
    )?;

    if methods == cases {
        return Ok(());
    }

    let missing_cases: Vec<_> = methods.difference(&cases).copied().collect();
    let missing_methods: Vec<_> = cases.difference(&methods).copied().collect();
    Err(TransportError::ProtocolMismatch(format!(
        "{}: methods without protocol case {missing_cases:?}, protocol cases without method {missing_methods:?}",
        A::TYPE_NAME
    )))
}

fn unique_set<'a>(
    names: impl Iterator<Item = &'a str>,
    type_name: &str,
    what: &str,
) -> Result<BTreeSet<&'a str>, TransportError> {
    let mut set = BTreeSet::new();
    for name in names {
        if !set.insert(name) {
            return Err(TransportError::ProtocolMismatch(format!(
                "{type_name}: duplicate {what} `{name}`"
            )));
        }
    }
    Ok(set)
}
