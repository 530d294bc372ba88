//! Integration coverage for the local RPC connection layer (C7), exercised
//! through two independently constructed, paired `LocalConnection`s.
//!
//! `Ping`/`Pong` from the specification's S5/S6 scenarios are carried here as
//! their registered wire types (`i32` request, `bool` response) rather than
//! dedicated structs, since nothing about the scenario depends on the
//! request/response shape beyond "one registered type in, one registered
//! type out."

use std::sync::Arc;

use futures::executor::block_on;

use vesper_core::codec::builtins::{BoolCodec, IntCodec};
use vesper_core::codec::single;
use vesper_core::{Engine, EngineConfig, HeapBufferAllocator, LocalConnection, ThreadContext, VesperError};

fn paired_connections() -> (Arc<LocalConnection>, Arc<LocalConnection>) {
    let allocator = Arc::new(HeapBufferAllocator::new());
    let mut engine_a = Engine::new(allocator.clone(), EngineConfig::default()).unwrap();
    engine_a
        .registry_mut()
        .register_with_id::<i32>(20, single::<i32, IntCodec>(IntCodec))
        .unwrap();
    engine_a
        .registry_mut()
        .register_with_id::<bool>(21, single::<bool, BoolCodec>(BoolCodec))
        .unwrap();
    let engine_b = engine_a.fork();

    let client = LocalConnection::new(Arc::new(ThreadContext::spawn("s5-client")), engine_a);
    let server = LocalConnection::new(Arc::new(ThreadContext::spawn("s5-server")), engine_b);
    LocalConnection::connect(&client, &server);
    (client, server)
}

/// S5 — RPC success: a `Ping` request yields a decoded `Pong { ok: true }`.
#[test]
fn s5_rpc_success_round_trip() {
    let (client, server) = paired_connections();
    let server_context = Arc::clone(server.context());
    server.handler::<i32, bool, _, _>(server_context, Some(|_ping: i32| async move { Ok(true) }));

    let ok = block_on(client.send::<i32, bool>(7)).unwrap();
    assert!(ok);
}

/// S6 — RPC handler error: the caller's future resolves to a `ServiceError`
/// whose message equals the handler's failure message.
#[test]
fn s6_rpc_handler_error_round_trip() {
    let (client, server) = paired_connections();
    let server_context = Arc::clone(server.context());
    server.handler::<i32, bool, _, _>(
        server_context,
        Some(|_req: i32| async move { Err(VesperError::ServiceError("boom".into())) }),
    );

    let err = block_on(client.send::<i32, bool>(1)).unwrap_err();
    match err {
        VesperError::ServiceError(message) => assert_eq!(message, "boom"),
        other => panic!("expected ServiceError, got {other:?}"),
    }
}

/// Closing one endpoint cascades to its peer: subsequent dispatch on either
/// side fails with `ConnectionClosed`.
#[test]
fn close_cascades_to_peer() {
    let (client, server) = paired_connections();
    let server_context = Arc::clone(server.context());
    server.handler::<i32, bool, _, _>(server_context, Some(|_req: i32| async move { Ok(true) }));

    client.close();
    assert!(client.is_closed());
    assert!(server.is_closed());

    let err = block_on(server.send::<i32, bool>(1)).unwrap_err();
    assert!(matches!(err, VesperError::ConnectionClosed));
}
