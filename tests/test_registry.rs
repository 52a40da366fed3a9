use std::net::SocketAddr;

use rawserve::server::{Handle, ReadinessRegistry, RegistryError};

fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[test]
fn test_new_registry_is_empty() {
    let registry = ReadinessRegistry::new(128);

    assert_eq!(registry.capacity(), 128);
    assert!(registry.snapshot().is_empty());
    assert!(!registry.is_watched(Handle(0)));
}

#[test]
fn test_watch_is_idempotent() {
    let mut registry = ReadinessRegistry::new(16);
    registry.watch(Handle(3)).unwrap();
    registry.watch(Handle(3)).unwrap();

    assert_eq!(registry.snapshot(), vec![Handle(3)]);
}

#[test]
fn test_snapshot_is_ascending_across_words() {
    let mut registry = ReadinessRegistry::new(200);
    for h in [130, 5, 64, 0, 63, 199] {
        registry.watch(Handle(h)).unwrap();
    }

    assert_eq!(
        registry.snapshot(),
        [0, 5, 63, 64, 130, 199].map(Handle).to_vec()
    );
}

#[test]
fn test_watch_peer_records_address() {
    let mut registry = ReadinessRegistry::new(16);
    registry.watch_peer(Handle(4), peer(40000)).unwrap();

    assert!(registry.is_watched(Handle(4)));
    assert_eq!(registry.address_of(Handle(4)), Some(peer(40000)));
    assert_eq!(registry.peer_count(), 1);
}

#[test]
fn test_forget_clears_bit_and_address() {
    let mut registry = ReadinessRegistry::new(16);
    registry.watch_peer(Handle(4), peer(40000)).unwrap();
    registry.forget(Handle(4));

    assert!(!registry.is_watched(Handle(4)));
    assert_eq!(registry.address_of(Handle(4)), None);
    assert_eq!(registry.peer_count(), 0);
}

#[test]
fn test_forget_unwatched_is_noop() {
    let mut registry = ReadinessRegistry::new(16);
    registry.watch(Handle(1)).unwrap();
    registry.forget(Handle(9));
    registry.forget(Handle(1000));

    assert_eq!(registry.snapshot(), vec![Handle(1)]);
}

#[test]
fn test_unwatch_listener() {
    let mut registry = ReadinessRegistry::new(16);
    registry.watch(Handle(0)).unwrap();
    registry.unwatch(Handle(0));

    assert!(!registry.is_watched(Handle(0)));
}

#[test]
fn test_capacity_exceeded() {
    let mut registry = ReadinessRegistry::new(8);

    assert!(registry.watch(Handle(7)).is_ok());
    assert_eq!(
        registry.watch(Handle(8)),
        Err(RegistryError::CapacityExceeded {
            handle: Handle(8),
            capacity: 8
        })
    );
    assert!(registry.watch_peer(Handle(8), peer(1)).is_err());
    assert_eq!(registry.peer_count(), 0);
    assert!(!registry.is_watched(Handle(8)));
}

#[test]
fn test_zero_clears_everything() {
    let mut registry = ReadinessRegistry::new(16);
    registry.watch(Handle(0)).unwrap();
    registry.watch_peer(Handle(2), peer(1)).unwrap();
    registry.zero();

    assert!(registry.snapshot().is_empty());
    assert_eq!(registry.peer_count(), 0);
}

#[test]
fn test_handle_display() {
    assert_eq!(Handle(12).to_string(), "#12");
}
