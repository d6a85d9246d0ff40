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

use std::time::Duration;

use courier::prelude::*;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::setup::{
    actors::{Room, RoomClient},
    eventually, initialize_tracing, loopback, loopback_pair,
};

mod setup;

/// Tests that calls time out and leave nothing behind in the pending table.
///
/// **Scenario:**
/// 1. A room is kept busy by calls that sleep longer than the caller's timeout.
/// 2. Twenty such calls are issued one after another.
///
/// **Verification:**
/// - Every call fails with `CallTimeout` carrying the handle's timeout.
/// - The pending table is empty after every failure and at the end.
/// - The responses that arrive afterwards are counted as late, not delivered.
#[tokio::test]
async fn test_timeouts_do_not_leak_pending_calls() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let room = server.spawn(|_| Room::default())?;
    let timeout = Duration::from_millis(5);
    let impatient = client
        .resolve::<Room>(room.id().clone())?
        .with_timeout(timeout);

    for _ in 0..20 {
        assert_eq!(
            impatient.slow(20).await.unwrap_err(),
            TransportError::CallTimeout(timeout)
        );
        assert_eq!(client.pending_calls(), 0);
    }
    assert_eq!(client.stats().timeouts(), 20);

    assert!(eventually(|| async { client.stats().late_responses() == 20 }).await);
    assert_eq!(client.stats().responses_received(), 0);
    assert_eq!(client.pending_calls(), 0);
    Ok(())
}

/// Tests cancelling a call while its recipient is running it.
///
/// **Verification:**
/// - The call returns `Cancelled` promptly.
/// - The pending table is empty and the cancellation is counted.
#[tokio::test]
async fn test_cancellation_returns_cancelled() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let room = server.spawn(|_| Room::default())?;
    let token = CancellationToken::new();
    let remote = client
        .resolve::<Room>(room.id().clone())?
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let started = tokio::time::Instant::now();
    assert_eq!(remote.slow(2_000).await.unwrap_err(), TransportError::Cancelled);
    assert!(started.elapsed() < Duration::from_millis(1_000));
    canceller.await?;

    assert_eq!(client.pending_calls(), 0);
    assert_eq!(client.stats().cancellations(), 1);

    // An already-cancelled token withdraws the call before it is sent.
    assert_eq!(remote.members().await.unwrap_err(), TransportError::Cancelled);
    assert_eq!(client.stats().cancellations(), 2);
    Ok(())
}

/// Tests that a cancelled call still queued at the recipient is never run.
///
/// **Scenario:**
/// 1. A first call keeps the room busy for 200ms.
/// 2. A second, cancellable call queues behind it and is cancelled after 20ms.
///
/// **Verification:**
/// - The room only ever slept for the first call.
#[tokio::test]
async fn test_cancelled_queued_call_is_skipped() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let room = server.spawn(|_| Room::default())?;
    let remote = client.resolve::<Room>(room.id().clone())?;

    let busy = {
        let remote = remote.clone();
        tokio::spawn(async move { remote.slow(200).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let token = CancellationToken::new();
    let cancellable = remote.clone().with_cancellation(token.clone());
    let queued = tokio::spawn(async move { cancellable.slow(1).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    assert_eq!(queued.await?.unwrap_err(), TransportError::Cancelled);
    assert_eq!(busy.await??, 200);
    assert_eq!(remote.slept().await?, vec![200]);
    assert_eq!(server.queued_requests(), 0);
    Ok(())
}

/// Tests that cancelling calls the room is already running leaves no bookkeeping
/// behind.
///
/// **Scenario:**
/// 1. Fifty times, a cancellable call starts running in the room.
/// 2. Once the room has taken it off its mailbox, the caller cancels.
///
/// **Verification:**
/// - Every call returns `Cancelled`.
/// - Every call still ran to completion in the room.
/// - No request is left queued on the server, and no call pending on the client.
#[tokio::test]
async fn test_cancelling_running_calls_leaves_nothing_queued() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let room = server.spawn(|_| Room::default())?;
    let remote = client.resolve::<Room>(room.id().clone())?;

    for n in 0..50 {
        let token = CancellationToken::new();
        let cancellable = remote.clone().with_cancellation(token.clone());
        let call = tokio::spawn(async move { cancellable.slow(10).await });

        assert!(
            eventually(|| async {
                server.stats().requests_delivered() == n + 1 && server.queued_requests() == 0
            })
            .await
        );
        token.cancel();
        assert_eq!(call.await?.unwrap_err(), TransportError::Cancelled);
    }

    assert!(eventually(|| async { room.slept().await.is_ok_and(|slept| slept.len() == 50) }).await);
    assert_eq!(server.queued_requests(), 0);
    assert_eq!(client.pending_calls(), 0);
    assert_eq!(client.stats().cancellations(), 50);
    Ok(())
}

/// Tests that calls queued for an identity that is retired before anything is
/// registered are rejected instead of left to time out.
///
/// **Verification:**
/// - The queued call fails with `UnreachableTarget` long before the call timeout.
/// - The server counts it as undeliverable and keeps nothing queued.
#[tokio::test]
async fn test_retired_reservation_rejects_queued_calls() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let id = server.allocate::<Room>();
    let me = ActorId::new("Client", "me", client.address());

    let remote = client.resolve::<Room>(id.clone())?;
    let join = tokio::spawn(async move { remote.join(me).await });
    assert!(eventually(|| async { server.stats().requests_delivered() == 1 }).await);
    assert_eq!(server.queued_requests(), 1);

    assert!(server.deregister(&id));
    let result = tokio::time::timeout(Duration::from_secs(1), join).await??;
    assert_eq!(result.unwrap_err(), TransportError::UnreachableTarget(id));

    assert_eq!(server.stats().undeliverable(), 1);
    assert_eq!(server.queued_requests(), 0);
    assert_eq!(server.recipients(), 0);
    assert_eq!(client.pending_calls(), 0);
    Ok(())
}

/// Tests that a recipient runs one call at a time when local and remote calls
/// arrive together.
///
/// **Scenario:**
/// 1. Ten calls through the server's own handle take the local fast path.
/// 2. Ten calls through a client handle arrive over the network.
/// 3. All twenty are issued at once.
///
/// **Verification:**
/// - Every call completes and the room slept twenty times.
/// - At most one `slow` call was ever running in the room.
#[tokio::test]
async fn test_local_and_remote_calls_never_overlap() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let room = server.spawn(|_| Room::default())?;
    let remote = client.resolve::<Room>(room.id().clone())?;
    assert!(matches!(room.route()?, Route::Local(_)));

    let calls = (0..20).map(|n| if n % 2 == 0 { room.slow(5) } else { remote.slow(5) });
    for result in join_all(calls).await {
        assert_eq!(result?, 5);
    }

    assert_eq!(room.slept().await?.len(), 20);
    assert_eq!(room.max_in_flight().await?, 1);
    assert_eq!(server.queued_requests(), 0);
    Ok(())
}

/// Tests that responses the caller cannot decode are counted as protocol errors.
///
/// **Verification:**
/// - A success payload of the wrong shape is a `ProtocolMismatch`.
/// - A failure answered for a method that cannot fail is a `ProtocolMismatch`.
/// - Both are counted in the caller's `protocol_errors`.
#[tokio::test]
async fn test_undecodable_responses_are_counted() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let room = server.spawn(|_| Room::default())?;
    let remote = client.resolve::<Room>(room.id().clone())?;

    let wrong_shape = Outcome::Success(b"\"not a number\"".to_vec());
    assert!(matches!(
        remote.decode_reply::<usize>(wrong_shape),
        Err(TransportError::ProtocolMismatch(_))
    ));
    assert_eq!(client.stats().protocol_errors(), 1);

    let failure = Outcome::Failure(b"null".to_vec());
    assert!(matches!(
        remote.decode_reply::<usize>(failure),
        Err(TransportError::ProtocolMismatch(_))
    ));
    assert_eq!(client.stats().protocol_errors(), 2);
    Ok(())
}

/// Tests the registration rules.
///
/// **Verification:**
/// - Registering a live identity again is a `RegistrationConflict`.
/// - A deregistered identity is retired and cannot be registered or named again.
/// - An identity owned by another transport cannot be registered here.
/// - An identity of another actor type is a `ProtocolMismatch`.
#[tokio::test]
async fn test_registration_conflicts() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();

    let id = server.allocate_named::<Room>("lobby")?;
    assert_eq!(id, ActorId::new("Room", "lobby", server.address()));
    assert_eq!(
        server.allocate_named::<Room>("lobby").unwrap_err(),
        TransportError::RegistrationConflict(id.clone())
    );

    let room = server.register(id.clone(), Room::default())?;
    assert_eq!(
        server.register(id.clone(), Room::default()).unwrap_err(),
        TransportError::RegistrationConflict(id.clone())
    );

    assert!(server.deregister(room.id()));
    assert!(!server.deregister(room.id()));
    assert_eq!(
        server.register(id.clone(), Room::default()).unwrap_err(),
        TransportError::RegistrationConflict(id.clone())
    );
    assert!(server.allocate_named::<Room>("lobby").is_err());

    let foreign = client.allocate::<Room>();
    assert_eq!(
        server.register(foreign.clone(), Room::default()).unwrap_err(),
        TransportError::RegistrationConflict(foreign)
    );

    let mislabelled = ActorId::new("Lamp", "x", server.address());
    assert!(matches!(
        server.register(mislabelled.clone(), Room::default()),
        Err(TransportError::ProtocolMismatch(_))
    ));
    assert!(matches!(
        client.resolve::<Room>(mislabelled),
        Err(TransportError::ProtocolMismatch(_))
    ));
    Ok(())
}

/// Tests that calls to an allocated but not yet registered identity wait for
/// registration instead of being dropped.
///
/// **Scenario:**
/// 1. The server allocates an identity without registering anything.
/// 2. A remote caller and a local caller both call it.
/// 3. The server registers a room under the identity.
///
/// **Verification:**
/// - Both calls complete, in the order they were queued.
#[tokio::test]
async fn test_calls_queue_until_registration() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let id = server.allocate::<Room>();
    let me = ActorId::new("Client", "me", client.address());

    let remote = client.resolve::<Room>(id.clone())?;
    let remote_join = {
        let me = me.clone();
        tokio::spawn(async move { remote.join(me).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let local = server.resolve::<Room>(id.clone())?;
    assert!(matches!(local.route()?, Route::Remote));
    let local_join = tokio::spawn(async move { local.join(me).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(server.recipients(), 1);

    let room = server.register(id, Room::default())?;
    assert_eq!(remote_join.await??, "welcome");
    assert_eq!(local_join.await??, "welcome back");
    assert!(matches!(room.route()?, Route::Local(_)));
    Ok(())
}

/// Tests the "no silent drop" rule.
///
/// **Verification:**
/// - A request to a missing identity on another transport is `UnreachableTarget`.
/// - A request to a missing identity on the caller's own transport is
///   `UnreachableTarget` without touching the network.
/// - A one-way call to a missing remote identity reports no error but is counted as
///   undeliverable by the receiving transport.
#[tokio::test]
async fn test_missing_recipients_are_reported() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let ghost = ActorId::new("Room", "ghost", server.address());
    let me = ActorId::new("Client", "me", client.address());

    let remote = client.resolve::<Room>(ghost.clone())?;
    assert_eq!(
        remote.join(me.clone()).await.unwrap_err(),
        TransportError::UnreachableTarget(ghost.clone())
    );

    let local = server.resolve::<Room>(ghost.clone())?;
    assert_eq!(
        local.join(me.clone()).await.unwrap_err(),
        TransportError::UnreachableTarget(ghost.clone())
    );

    remote.leave(me).await?;
    assert!(eventually(|| async { server.stats().undeliverable() == 2 }).await);
    assert_eq!(client.pending_calls(), 0);
    Ok(())
}

/// Tests that one-way calls from one sender are applied in send order.
///
/// **Verification:**
/// - The loopback network declares itself ordered.
/// - A hundred `record` calls followed by a `recorded` query observe 0..100 in order.
#[tokio::test]
async fn test_oneway_calls_are_fifo() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    assert!(client.capabilities().ordered);

    let room = server.spawn(|_| Room::default())?;
    let remote = client.resolve::<Room>(room.id().clone())?;

    for seq in 0..100 {
        remote.record(seq).await?;
    }
    assert_eq!(remote.recorded().await?, (0..100).collect::<Vec<_>>());
    Ok(())
}

/// Tests that a target on a transport nobody runs is reported as unreachable
/// rather than hanging.
#[tokio::test]
async fn test_unknown_network_address() -> anyhow::Result<()> {
    initialize_tracing();
    let hub = LoopbackHub::new();
    let client = loopback(&hub, "client");
    let nowhere = ActorId::new("Room", "lobby", "loopback://nowhere");
    let remote = client.resolve::<Room>(nowhere.clone())?;

    assert_eq!(
        remote.members().await.unwrap_err(),
        TransportError::UnreachableTarget(nowhere)
    );
    assert_eq!(client.pending_calls(), 0);
    Ok(())
}

/// Tests that the raw request API returns outcomes for requests and nothing for
/// one-way calls.
#[tokio::test]
async fn test_raw_request() -> anyhow::Result<()> {
    initialize_tracing();
    let (server, client) = loopback_pair();
    let room = server.spawn(|_| Room::default())?;

    let payload = Json.encode(&crate::setup::actors::RoomMessage::Members {})?;
    let outcome = client
        .request(room.id(), payload.clone(), true, &CallOptions::default())
        .await?;
    assert_eq!(outcome, Some(Outcome::Success(b"0".to_vec())));

    let none = client
        .request(room.id(), payload, false, &CallOptions::default())
        .await?;
    assert_eq!(none, None);
    Ok(())
}
