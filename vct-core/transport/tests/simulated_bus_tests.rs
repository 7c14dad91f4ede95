//! 模拟总线测试

use std::time::Duration;
use vct_transport::*;

#[tokio::test]
async fn test_unscripted_pgn_is_silent() {
    let bus = SimulatedBus::new();
    let packets = bus.request(0xFED4, Destination::Global).await.unwrap();
    assert!(packets.is_empty());
    assert_eq!(bus.request_count(0xFED4, Destination::Global), 1);
}

#[tokio::test]
async fn test_rounds_are_counted_per_destination() {
    let bus = SimulatedBus::new();
    bus.respond(0xFED4, |req| {
        vec![Packet::new(req.pgn, 0x00, vec![req.round as u8])]
    });

    bus.request(0xFED4, Destination::Global).await.unwrap();
    let second = bus.request(0xFED4, Destination::Global).await.unwrap();
    let ds = bus.request(0xFED4, Destination::Specific(0)).await.unwrap();

    assert_eq!(second[0].data, vec![2]);
    assert_eq!(ds[0].data, vec![1]);
    assert_eq!(bus.request_count(0xFED4, Destination::Global), 2);
    assert_eq!(bus.request_count(0xFED4, Destination::Specific(0)), 1);
    assert_eq!(bus.requests().len(), 3);
}

#[tokio::test]
async fn test_disconnected_bus_fails_requests() {
    let bus = SimulatedBus::new();
    bus.disconnect();

    let result = bus.request(0xFED4, Destination::Global).await;
    assert!(matches!(result, Err(TransportError::Disconnected)));
    assert!(bus.send_keep_alive().await.is_err());
}

#[tokio::test]
async fn test_keep_alive_counter() {
    let bus = SimulatedBus::new();
    bus.send_keep_alive().await.unwrap();
    bus.send_keep_alive().await.unwrap();
    assert_eq!(bus.keep_alive_count(), 2);
}

#[test]
fn test_bus_config_defaults() {
    let config = BusConfig::default();
    assert_eq!(config.listen_window(), Duration::from_millis(600));
    assert_eq!(config.keep_alive_interval(), Duration::from_secs(1));

    let bus = SimulatedBus::with_config(BusConfig {
        listen_window_ms: 250,
        ..Default::default()
    });
    assert_eq!(bus.listen_window(), Duration::from_millis(250));
}
