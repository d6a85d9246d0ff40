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


#![allow(dead_code, unused_doc_comments)]

use courier::prelude::*;

use crate::setup::{
    actors::{Room, RoomClient, RoomError},
    initialize_tracing, loopback_pair,
};

mod setup;

/// Tests the chat room scenario across two transports.
///
/// **Scenario:**
/// 1. The server transport spawns a `Room`.
/// 2. The client transport resolves the room's identity and calls `join` twice.
/// 3. The server deregisters the room; the client calls `join` again.
///
/// **Verification:**
/// - The first join answers `"welcome"`, the second `"welcome back"`.
/// - After teardown the call fails with `UnreachableTarget` naming the room.
#[tokio::test]
async fn test_remote_join_and_teardown() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let room = server.spawn(|_| Room::default())?;

    let me = ActorId::new("Client", "me", client.address());
    let remote = client.resolve::<Room>(room.id().clone())?;
    assert!(matches!(remote.route()?, Route::Remote));

    assert_eq!(remote.join(me.clone()).await?, "welcome");
    assert_eq!(remote.join(me.clone()).await?, "welcome back");

    assert!(server.deregister(room.id()));
    let err = remote.join(me).await.unwrap_err();
    assert_eq!(err, TransportError::UnreachableTarget(room.id().clone()));
    assert_eq!(client.pending_calls(), 0);
    assert_eq!(client.recipients(), 0);
    Ok(())
}

/// Tests that a room whose whole transport has shut down is unreachable.
///
/// **Verification:**
/// - After the server transport shuts down, a remote call fails with
///   `UnreachableTarget` naming the room rather than a network error.
#[tokio::test]
async fn test_shut_down_transport_is_unreachable() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let room = server.spawn(|_| Room::default())?;
    let me = ActorId::new("Client", "me", client.address());
    let remote = client.resolve::<Room>(room.id().clone())?;
    assert_eq!(remote.join(me.clone()).await?, "welcome");

    server.shutdown();
    assert_eq!(
        remote.join(me).await.unwrap_err(),
        TransportError::UnreachableTarget(room.id().clone())
    );
    assert_eq!(client.pending_calls(), 0);
    Ok(())
}

/// Tests that an application error crosses the transport with its type and value.
///
/// **Verification:**
/// - A stranger posting gets `CallError::Application(RoomError::NotAMember(stranger))`.
/// - An empty post gets `CallError::Application(RoomError::EmptyMessage)`.
/// - A valid post returns the new history length.
#[tokio::test]
async fn test_application_errors_round_trip() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let room = server.spawn(|_| Room::default())?;
    let remote = client.resolve::<Room>(room.id().clone())?;

    let member = ActorId::new("Client", "member", client.address());
    let stranger = ActorId::new("Client", "stranger", client.address());
    remote.join(member.clone()).await?;

    let err = remote.post(stranger.clone(), "hello".into()).await.unwrap_err();
    assert_eq!(err, CallError::Application(RoomError::NotAMember(stranger)));
    assert!(err.transport().is_none());

    let err = remote.post(member.clone(), "   ".into()).await.unwrap_err();
    assert_eq!(err.into_application(), Some(RoomError::EmptyMessage));

    assert_eq!(remote.post(member, "hello".into()).await?, 1);
    assert_eq!(remote.history().await?, vec!["hello".to_string()]);
    Ok(())
}

async fn conversation(room: &ActorRef<Room>, me: &ActorId, stranger: &ActorId) -> Vec<String> {
    vec![
        format!("{:?}", room.join(me.clone()).await),
        format!("{:?}", room.join(me.clone()).await),
        format!("{:?}", room.post(me.clone(), "first".into()).await),
        format!("{:?}", room.post(stranger.clone(), "intrusion".into()).await),
        format!("{:?}", room.post(me.clone(), String::new()).await),
        format!("{:?}", room.members().await),
        format!("{:?}", room.leave(me.clone()).await),
        format!("{:?}", room.members().await),
        format!("{:?}", room.history().await),
    ]
}

/// Tests locality transparency: the same call sequence yields the same results on a
/// local handle and on a remote handle.
///
/// **Scenario:**
/// 1. Two identical rooms live on the server.
/// 2. One is driven through the server's own handle (local fast path), the other
///    through a handle resolved on the client transport.
///
/// **Verification:**
/// - Both transcripts are identical, errors included.
/// - The local run never encodes a call, the remote run encodes every call.
#[tokio::test]
async fn test_local_and_remote_calls_agree() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let local_room = server.spawn(|_| Room::default())?;
    let remote_room = server.spawn(|_| Room::default())?;
    let remote = client.resolve::<Room>(remote_room.id().clone())?;
    assert!(matches!(local_room.route()?, Route::Local(_)));

    let me = ActorId::new("Client", "me", client.address());
    let stranger = ActorId::new("Client", "stranger", client.address());

    let local_transcript = conversation(&local_room, &me, &stranger).await;
    assert_eq!(server.stats().remote_calls(), 0);

    let remote_transcript = conversation(&remote, &me, &stranger).await;
    assert_eq!(local_transcript, remote_transcript);
    assert_eq!(client.stats().remote_calls(), local_transcript.len());
    assert!(server.stats().local_calls() >= local_transcript.len());
    Ok(())
}

/// Tests that a handle to a torn-down local actor fails the same way a remote one does.
#[tokio::test]
async fn test_local_teardown_is_unreachable() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, _client) = loopback_pair();
    let room = server.spawn(|_| Room::default())?;
    let me = ActorId::new("Client", "me", "loopback://client");

    assert_eq!(room.join(me.clone()).await?, "welcome");
    server.deregister(room.id());

    assert_eq!(
        room.join(me).await.unwrap_err(),
        TransportError::UnreachableTarget(room.id().clone())
    );
    Ok(())
}
