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

//! Binary framing for [`Frame`]s on byte streams.
//!
//! # Wire Format (version 1)
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ Body Length (4 bytes, big-endian u32, excludes header)        │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Protocol Version (1 byte, currently 0x01)                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Frame Kind (1 byte)                                           │
//! │   0x01 = Request                                              │
//! │   0x02 = Response                                             │
//! │   0x03 = Cancel                                               │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Metadata Length (4 bytes, big-endian u32)                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Metadata (JSON: correlation, routing, outcome status)         │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Payload (remaining bytes, produced by the transport's codec)  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The metadata encoding is fixed so that two transports configured with different
//! codecs still understand each other's routing and can report the mismatch.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::ActorId;
use crate::message::{Envelope, Frame, Outcome, Rejection, ResponseEnvelope};

/// Protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Frame kind: a call for a recipient.
pub const KIND_REQUEST: u8 = 0x01;

/// Frame kind: the answer to a call.
pub const KIND_RESPONSE: u8 = 0x02;

/// Frame kind: a caller withdrew a call.
pub const KIND_CANCEL: u8 = 0x03;

/// Frame header size: 4 bytes length + 1 byte version + 1 byte kind.
pub const HEADER_SIZE: usize = 6;

const EMPTY: &[u8] = &[];

/// Errors reading or writing frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// The peer sent something that is not a valid frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize, Deserialize)]
struct RequestMeta {
    correlation_id: Option<String>,
    target: ActorId,
    expects_reply: bool,
    reply_to: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Status {
    Success,
    Failure,
    Rejected(Rejection),
}

#[derive(Serialize, Deserialize)]
struct ResponseMeta {
    correlation_id: String,
    status: Status,
}

#[derive(Serialize, Deserialize)]
struct CancelMeta {
    correlation_id: String,
}

fn meta_bytes<T: Serialize>(meta: &T) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(meta).map_err(|e| WireError::Protocol(format!("metadata encoding failed: {e}")))
}

fn be_len(len: usize, what: &str) -> Result<[u8; 4], WireError> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| WireError::Protocol(format!("{what} too large for u32")))
}

/// Encodes `frame` into a complete wire frame, header included.
///
/// # Errors
///
/// Returns [`WireError::Protocol`] if the frame does not fit in a `u32` length.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, WireError> {
    let (kind, meta, payload): (u8, Vec<u8>, &[u8]) = match frame {
        Frame::Request(envelope) => (
            KIND_REQUEST,
            meta_bytes(&RequestMeta {
                correlation_id: envelope.correlation_id.clone(),
                target: envelope.target.clone(),
                expects_reply: envelope.expects_reply,
                reply_to: envelope.reply_to.clone(),
            })?,
            envelope.payload.as_slice(),
        ),
        Frame::Response(response) => {
            let (status, payload): (Status, &[u8]) = match &response.outcome {
                Outcome::Success(bytes) => (Status::Success, bytes.as_slice()),
                Outcome::Failure(bytes) => (Status::Failure, bytes.as_slice()),
                Outcome::Rejected(rejection) => (Status::Rejected(rejection.clone()), EMPTY),
            };
            let meta = meta_bytes(&ResponseMeta {
                correlation_id: response.correlation_id.clone(),
                status,
            })?;
            (KIND_RESPONSE, meta, payload)
        }
        Frame::Cancel { correlation_id } => (
            KIND_CANCEL,
            meta_bytes(&CancelMeta {
                correlation_id: correlation_id.clone(),
            })?,
            EMPTY,
        ),
    };

    let body_len = 4 + meta.len() + payload.len();
    let mut bytes = Vec::with_capacity(HEADER_SIZE + body_len);
    bytes.extend_from_slice(&be_len(body_len, "frame")?);
    bytes.push(PROTOCOL_VERSION);
    bytes.push(kind);
    bytes.extend_from_slice(&be_len(meta.len(), "metadata")?);
    bytes.extend_from_slice(&meta);
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

fn decode_body(kind: u8, body: &[u8]) -> Result<Frame, WireError> {
    if body.len() < 4 {
        return Err(WireError::Protocol("frame body shorter than its metadata length".into()));
    }
    let meta_len = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
    let rest = &body[4..];
    if meta_len > rest.len() {
        return Err(WireError::Protocol(format!(
            "metadata length {meta_len} exceeds body of {} bytes",
            rest.len()
        )));
    }
    let (meta, payload) = rest.split_at(meta_len);
    let malformed = |e: serde_json::Error| WireError::Protocol(format!("malformed metadata: {e}"));

    match kind {
        KIND_REQUEST => {
            let meta: RequestMeta = serde_json::from_slice(meta).map_err(malformed)?;
            Ok(Frame::Request(Envelope {
                correlation_id: meta.correlation_id,
                target: meta.target,
                payload: payload.to_vec(),
                expects_reply: meta.expects_reply,
                reply_to: meta.reply_to,
            }))
        }
        KIND_RESPONSE => {
            let meta: ResponseMeta = serde_json::from_slice(meta).map_err(malformed)?;
            let outcome = match meta.status {
                Status::Success => Outcome::Success(payload.to_vec()),
                Status::Failure => Outcome::Failure(payload.to_vec()),
                Status::Rejected(rejection) => Outcome::Rejected(rejection),
            };
            Ok(Frame::Response(ResponseEnvelope {
                correlation_id: meta.correlation_id,
                outcome,
            }))
        }
        KIND_CANCEL => {
            let meta: CancelMeta = serde_json::from_slice(meta).map_err(malformed)?;
            Ok(Frame::Cancel {
                correlation_id: meta.correlation_id,
            })
        }
        other => Err(WireError::Protocol(format!("Unknown frame kind: {other:#04x}"))),
    }
}

fn read_error(e: std::io::Error) -> WireError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        WireError::ConnectionClosed
    } else {
        WireError::Io(e)
    }
}

/// Reads one frame from the stream.
///
/// # Errors
///
/// * [`WireError::ConnectionClosed`] at end of stream.
/// * [`WireError::Protocol`] for an unsupported version, an unknown kind, a body
///   larger than `max_size`, or malformed metadata.
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<Frame, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await.map_err(read_error)?;

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let version = header[4];
    let kind = header[5];

    if version != PROTOCOL_VERSION {
        return Err(WireError::Protocol(format!(
            "Unsupported protocol version: {version}, expected {PROTOCOL_VERSION}"
        )));
    }
    if !matches!(kind, KIND_REQUEST | KIND_RESPONSE | KIND_CANCEL) {
        return Err(WireError::Protocol(format!("Unknown frame kind: {kind:#04x}")));
    }
    if length > max_size {
        return Err(WireError::Protocol(format!(
            "Frame size {length} exceeds maximum {max_size}"
        )));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await.map_err(read_error)?;
    decode_body(kind, &body)
}

/// Writes pre-encoded frame bytes and flushes.
///
/// # Errors
///
/// Returns [`WireError::Io`] if the stream fails.
pub async fn write_bytes<W>(writer: &mut W, bytes: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Encodes and writes one frame.
///
/// # Errors
///
/// See [`encode_frame`] and [`write_bytes`].
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(frame)?;
    write_bytes(writer, &bytes).await
}
