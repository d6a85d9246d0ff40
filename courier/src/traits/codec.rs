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

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

use crate::message::CodecError;

/// A symmetric payload serialization format.
///
/// Two transports can talk to each other when their codecs agree on the encoding of
/// every protocol type they exchange. A disagreement is always reported as a decode
/// failure on whichever side notices it; it never panics.
///
/// The codec only covers payloads (protocol values, return values, application
/// errors). Frame metadata is encoded by the network layer independently, so a codec
/// mismatch can always be reported back to the caller.
pub trait Codec: Debug + Clone + Send + Sync + 'static {
    /// A short, stable name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Encodes a value.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the value cannot be represented in this format.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decodes a value.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the bytes are malformed, truncated, or do not
    /// describe a `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON payloads (UTF-8, human readable). The default codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Json;

impl Codec for Json {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::new(self.name(), e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::new(self.name(), e.to_string()))
    }
}

/// `MessagePack` payloads (binary, compact).
#[cfg(feature = "messagepack")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessagePack;

#[cfg(feature = "messagepack")]
impl Codec for MessagePack {
    fn name(&self) -> &'static str {
        "messagepack"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(value).map_err(|e| CodecError::new(self.name(), e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::new(self.name(), e.to_string()))
    }
}
