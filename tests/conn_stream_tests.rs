//! Connection and stream lifecycle: admission, re-parenting, done

use rcmgr::{
    Direction, Error, Limit, PeerId, ProtocolId, Resource, ResourceManager, ResourceScope,
    ScopeName, TransactionalScope,
};
use std::sync::{Arc, Barrier};
use std::thread;

fn manager() -> ResourceManager {
    ResourceManager::new(|name: &ScopeName| match name {
        ScopeName::Transient => Limit {
            conns: 2,
            fd: 1,
            streams_inbound: 2,
            ..Limit::unlimited()
        },
        ScopeName::Peer(_) => Limit {
            streams: 3,
            ..Limit::unlimited()
        },
        ScopeName::Protocol(_) => Limit {
            streams_outbound: 1,
            ..Limit::unlimited()
        },
        _ => Limit::unlimited(),
    })
}

#[test]
fn test_open_connection_counts_direction_and_fd() {
    let rm = manager();
    let conn = rm.open_connection(Direction::Outbound, true).unwrap();
    let transient = rm.view_transient().unwrap().stat();
    assert_eq!(transient.num_conns_outbound, 1);
    assert_eq!(transient.num_conns_inbound, 0);
    assert_eq!(transient.num_fd, 1);
    assert_eq!(conn.stat().num_conns(), 1);
    assert_eq!(conn.parents(), vec![ScopeName::Transient]);
    assert!(conn.peer_scope().is_none());
}

#[test]
fn test_fd_exhaustion_rejects_without_leaving_a_scope() {
    let rm = manager();
    let _first = rm.open_connection(Direction::Inbound, true).unwrap();
    let err = rm.open_connection(Direction::Inbound, true).unwrap_err();
    assert!(matches!(
        err,
        Error::LimitExceeded {
            resource: Resource::FileDescriptors,
            ..
        }
    ));
    assert_eq!(rm.snapshot().open_connections, 1);
    assert_eq!(rm.view_transient().unwrap().stat().num_fd, 1);

    // Without an fd the second connection still fits.
    let _second = rm.open_connection(Direction::Inbound, false).unwrap();
    assert!(rm.open_connection(Direction::Outbound, false).is_err());
}

#[test]
fn test_set_peer_moves_connection_out_of_transient() {
    let rm = manager();
    let peer = PeerId::new("QmConn");
    let conn = rm.open_connection(Direction::Inbound, true).unwrap();
    conn.reserve_memory(128).unwrap();

    conn.set_peer(&peer).unwrap();
    assert_eq!(conn.peer_scope().unwrap().peer(), &peer);
    assert_eq!(conn.parents(), vec![ScopeName::Peer(peer.clone())]);
    assert!(rm.view_transient().unwrap().stat().is_empty());

    let peer_stat = rm.view_peer(&peer).unwrap().stat();
    assert_eq!(peer_stat.memory, 128);
    assert_eq!(peer_stat.num_conns_inbound, 1);
    assert_eq!(peer_stat.num_fd, 1);

    conn.done();
    assert!(rm.view_peer(&peer).unwrap().stat().is_empty());
    assert!(rm.view_system().unwrap().stat().is_empty());
    assert!(rm.view_transient().unwrap().stat().is_empty());
}

#[test]
fn test_stream_is_bounded_by_peer_and_transient() {
    let rm = manager();
    let peer = PeerId::new("QmStreams");
    let _a = rm.open_stream(&peer, Direction::Inbound).unwrap();
    let _b = rm.open_stream(&peer, Direction::Inbound).unwrap();

    // Transient allows two inbound streams.
    let err = rm.open_stream(&peer, Direction::Inbound).unwrap_err();
    assert!(matches!(
        &err,
        Error::LimitExceeded { scope, resource: Resource::StreamsInbound, .. }
            if scope == "transient"
    ));

    // Peer allows three streams in total.
    let _c = rm.open_stream(&peer, Direction::Outbound).unwrap();
    let err = rm.open_stream(&peer, Direction::Outbound).unwrap_err();
    assert!(matches!(
        &err,
        Error::LimitExceeded { scope, resource: Resource::Streams, .. }
            if scope == "peer:QmStreams"
    ));
    assert_eq!(rm.snapshot().open_streams, 3);
}

#[test]
fn test_negotiated_stream_leaves_transient() {
    let rm = manager();
    let peer = PeerId::new("QmNeg");
    let proto = ProtocolId::new("/ipfs/bitswap/1.2.0");
    let stream = rm.open_stream(&peer, Direction::Inbound).unwrap();
    stream.reserve_memory(1024).unwrap();

    stream.set_protocol(&proto).unwrap();
    assert!(rm.view_transient().unwrap().stat().is_empty());
    assert_eq!(stream.protocol_scope().unwrap().protocol(), &proto);
    assert_eq!(rm.view_protocol(&proto).unwrap().stat().memory, 1024);
    assert_eq!(rm.view_peer(&peer).unwrap().stat().memory, 1024);
    assert!(stream.service_scope().is_none());

    stream.set_service("bitswap").unwrap();
    assert_eq!(stream.service_scope().unwrap().name(), "bitswap");
    let svc = rm.view_service("bitswap").unwrap().stat();
    assert_eq!(svc.memory, 1024);
    assert_eq!(svc.num_streams_inbound, 1);
    // System is still charged exactly once.
    assert_eq!(rm.view_system().unwrap().stat().memory, 1024);
    assert_eq!(rm.view_system().unwrap().stat().num_streams_inbound, 1);

    drop(stream);
    let snap = rm.snapshot();
    assert!(snap.system.is_empty());
    assert!(snap.peers.values().all(|s| s.is_empty()));
    assert!(snap.protocols.values().all(|s| s.is_empty()));
    assert!(snap.services.values().all(|s| s.is_empty()));
}

#[test]
fn test_service_before_protocol() {
    let rm = manager();
    let peer = PeerId::new("QmOrder");
    let stream = rm.open_stream(&peer, Direction::Outbound).unwrap();
    stream.set_service("identify").unwrap();
    assert_eq!(
        stream.parents(),
        vec![
            ScopeName::Peer(peer.clone()),
            ScopeName::Service("identify".to_string())
        ]
    );
    assert!(stream.protocol_scope().is_none());
}

#[test]
fn test_moving_onto_protocol_is_not_rechecked() {
    let rm = manager();
    let peer = PeerId::new("QmProto");
    let proto = ProtocolId::new("/echo/1.0.0");
    let first = rm.open_stream(&peer, Direction::Outbound).unwrap();
    first.set_protocol(&proto).unwrap();

    // Moving a second outbound stream onto the protocol is not re-checked,
    // but the protocol now reports usage past its ceiling.
    let second = rm.open_stream(&peer, Direction::Outbound).unwrap();
    second.set_protocol(&proto).unwrap();
    assert_eq!(
        rm.view_protocol(&proto).unwrap().stat().num_streams_outbound,
        2
    );

    // Memory reservations through the protocol still pass: only the
    // dimensions a request touches are checked.
    second.reserve_memory(10).unwrap();
}

#[test]
fn test_operations_after_done_fail() {
    let rm = manager();
    let peer = PeerId::new("QmDone");
    let stream = rm.open_stream(&peer, Direction::Inbound).unwrap();
    let conn = rm.open_connection(Direction::Inbound, false).unwrap();
    stream.done();
    conn.done();

    assert!(matches!(stream.reserve_memory(1), Err(Error::ScopeClosed { .. })));
    assert!(matches!(
        stream.set_protocol(&ProtocolId::new("/x")),
        Err(Error::ScopeClosed { .. })
    ));
    assert!(matches!(stream.set_service("x"), Err(Error::ScopeClosed { .. })));
    assert!(matches!(conn.set_peer(&peer), Err(Error::ScopeClosed { .. })));
    assert!(matches!(conn.begin_transaction(), Err(Error::ScopeClosed { .. })));
    assert!(stream.stat().is_empty());
    assert!(rm.view_system().unwrap().stat().is_empty());
}

#[test]
fn test_close_force_releases_open_scopes() {
    let rm = manager();
    let peer = PeerId::new("QmClose");
    let conn = rm.open_connection(Direction::Outbound, true).unwrap();
    let stream = rm.open_stream(&peer, Direction::Outbound).unwrap();
    stream.reserve_memory(4096).unwrap();

    rm.close().unwrap();
    assert!(matches!(rm.view_system(), Err(Error::ManagerClosed)));
    assert!(matches!(
        rm.open_stream(&peer, Direction::Inbound),
        Err(Error::ManagerClosed)
    ));
    assert!(matches!(stream.reserve_memory(1), Err(Error::ManagerClosed)));
    assert!(stream.stat().is_empty());
    assert!(conn.stat().is_empty());

    // Owned scopes outliving the manager's close drop without effect.
    drop(stream);
    drop(conn);
    assert!(rm.snapshot().system.is_empty());
}

fn memory_manager() -> ResourceManager {
    ResourceManager::new(|name: &ScopeName| match name {
        ScopeName::Transient => Limit::memory_only(100),
        ScopeName::Peer(_) => Limit::memory_only(10_000),
        ScopeName::Protocol(_) => Limit::memory_only(256),
        ScopeName::Service(_) => Limit::memory_only(512),
        _ => Limit::unlimited(),
    })
}

#[test]
fn test_connection_checked_against_peer_after_set_peer() {
    let rm = memory_manager();
    let peer = PeerId::new("QmRoomy");
    let conn = rm.open_connection(Direction::Inbound, false).unwrap();
    conn.reserve_memory(100).unwrap();
    let err = conn.reserve_memory(1).unwrap_err();
    assert!(matches!(&err, Error::LimitExceeded { scope, .. } if scope == "transient"));

    conn.set_peer(&peer).unwrap();
    // Transient no longer constrains the connection.
    conn.reserve_memory(5_000).unwrap();
    assert_eq!(rm.view_peer(&peer).unwrap().stat().memory, 5_100);
    assert!(rm.view_transient().unwrap().stat().is_empty());

    let err = conn.reserve_memory(4_901).unwrap_err();
    assert!(matches!(&err, Error::LimitExceeded { scope, .. } if scope == "peer:QmRoomy"));
}

#[test]
fn test_stream_checked_against_protocol_after_set_protocol() {
    let rm = memory_manager();
    let peer = PeerId::new("QmProtoMem");
    let proto = ProtocolId::new("/kad/1.0.0");
    let stream = rm.open_stream(&peer, Direction::Inbound).unwrap();
    stream.reserve_memory(50).unwrap();

    stream.set_protocol(&proto).unwrap();
    // Past the transient ceiling, within the protocol's.
    stream.reserve_memory(206).unwrap();
    let err = stream.reserve_memory(1).unwrap_err();
    assert!(matches!(
        &err,
        Error::LimitExceeded { scope, resource: Resource::Memory, .. }
            if scope == "protocol:/kad/1.0.0"
    ));
    assert_eq!(rm.view_protocol(&proto).unwrap().stat().memory, 256);
    assert_eq!(stream.stat().memory, 256);
}

#[test]
fn test_stream_checked_against_service_after_set_service() {
    let rm = memory_manager();
    let peer = PeerId::new("QmSvcMem");
    let busy = rm.open_stream(&peer, Direction::Outbound).unwrap();
    busy.set_service("dht").unwrap();
    busy.reserve_memory(500).unwrap();

    let stream = rm.open_stream(&peer, Direction::Outbound).unwrap();
    stream.reserve_memory(20).unwrap();
    stream.set_service("dht").unwrap();
    assert!(stream.reserve_memory(1).is_err());
    drop(busy);
    stream.reserve_memory(400).unwrap();
    assert_eq!(rm.view_service("dht").unwrap().stat().memory, 420);
}

#[test]
fn test_close_while_reservations_in_flight() {
    let rm = ResourceManager::new(|name: &ScopeName| match name {
        ScopeName::System => Limit::memory_only(1 << 20),
        _ => Limit::unlimited(),
    });
    let start = Arc::new(Barrier::new(9));
    let mut handles = vec![];

    for i in 0..8 {
        let rm = rm.clone();
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            let peer = PeerId::new(format!("QmRace{i}"));
            let stream = rm.open_stream(&peer, Direction::Inbound).unwrap();
            start.wait();
            for _ in 0..100_000 {
                match stream.reserve_memory(64) {
                    Ok(_) => stream.release_memory(64),
                    Err(Error::ManagerClosed) => return,
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
        }));
    }

    start.wait();
    rm.close().unwrap();
    for h in handles {
        h.join().expect("Thread panicked");
    }

    let snap = rm.snapshot();
    assert!(snap.system.is_empty());
    assert!(snap.peers.values().all(|s| s.is_empty()));
    assert_eq!(snap.open_streams, 0);
    assert!(matches!(rm.view_system(), Err(Error::ManagerClosed)));
}
