//! The null manager accepts everything and tracks nothing

use rcmgr::{
    Direction, ManagerSnapshot, MemoryStatus, PeakUsage, PeerId, ProtocolId, ResourceManager,
    ResourceScope, TransactionalScope,
};

#[test]
fn test_null_views_never_reject() {
    let rm = ResourceManager::null();
    for _ in 0..3 {
        let sys = rm.view_system().unwrap();
        assert_eq!(sys.reserve_memory(1 << 40).unwrap(), MemoryStatus::Ok);
        assert!(sys.stat().is_empty());
    }
    let peer = rm.view_peer(&PeerId::new("QmNull")).unwrap();
    assert!(peer.peer().is_empty());
    assert!(peer.stat().is_empty());
    assert_eq!(rm.view_service("svc").unwrap().name(), "");
    assert!(rm
        .view_protocol(&ProtocolId::new("/p"))
        .unwrap()
        .protocol()
        .is_empty());
}

#[test]
fn test_null_owned_scopes_return_null_getters() {
    let rm = ResourceManager::default();
    let conn = rm.open_connection(Direction::Inbound, true).unwrap();
    conn.set_peer(&PeerId::new("QmA")).unwrap();
    assert!(conn.peer_scope().unwrap().peer().is_empty());
    assert!(conn.parents().is_empty());

    let stream = rm.open_stream(&PeerId::new("QmA"), Direction::Outbound).unwrap();
    stream.set_protocol(&ProtocolId::new("/echo/1.0.0")).unwrap();
    stream.set_service("echo").unwrap();
    assert!(stream.protocol_scope().unwrap().protocol().is_empty());
    assert_eq!(stream.service_scope().unwrap().name(), "");

    let txn = stream.begin_transaction().unwrap();
    assert_eq!(txn.reserve_memory(usize::MAX).unwrap(), MemoryStatus::Ok);
    txn.done();
    txn.done();
    stream.done();
    conn.done();
}

#[test]
fn test_null_close_and_snapshot() {
    let rm = ResourceManager::null();
    rm.close().unwrap();
    // Closing a null manager does not change its behavior.
    assert!(rm.view_system().is_ok());
    assert_eq!(rm.snapshot(), ManagerSnapshot::default());
    assert_eq!(rm.peak_system_memory(), 0);
    assert_eq!(rm.peak_system_usage(), PeakUsage::default());
}
