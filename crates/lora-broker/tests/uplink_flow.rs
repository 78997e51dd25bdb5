// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end uplink and downlink flow through the broker, using the
//! in-process network server and the LoRaWAN MIC.

use lora_broker::{
    AesKey, ApplicationConfig, Broker, BrokerError, Collaborators, DeduplicatedUplink, DevAddr,
    DeviceConfig, DownlinkMessage, DownlinkOption, Eui64, GatewayMetadata, LorawanMetadata,
    LorawanMic, PeerRole, ProtocolMetadata, Registration, StaticApplications, StaticNetworkServer,
    UplinkMessage,
};
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_millis(300);

const APP_EUI: Eui64 = Eui64([0x70, 0xb3, 0xd5, 0x7e, 0xd0, 0, 0, 1]);
const DEV_EUI: Eui64 = Eui64([0, 0x04, 0xa3, 0x0b, 0, 0x1c, 0x05, 0x30]);
const DEV_ADDR: DevAddr = DevAddr([0x26, 0x01, 0x1a, 0x2b]);
const KEY: AesKey = AesKey([0x2b; 16]);

/// Build a signed unconfirmed data uplink.
fn phy_payload(key: &AesKey, dev_addr: DevAddr, f_cnt: u32, payload: &[u8]) -> Vec<u8> {
    let a = dev_addr.0;
    let mut phy = vec![0x40, a[3], a[2], a[1], a[0], 0x00];
    phy.extend_from_slice(&(f_cnt as u16).to_le_bytes());
    phy.push(1);
    phy.extend_from_slice(payload);
    let mic = LorawanMic::compute(key, dev_addr, f_cnt, &phy).unwrap();
    phy.extend_from_slice(&mic);
    phy
}

fn gateway(id: u8, rssi: f32) -> GatewayMetadata {
    GatewayMetadata {
        gateway_eui: Eui64([id; 8]),
        timestamp: 1_000_000,
        time: None,
        frequency: 868_100_000,
        rssi,
        snr: 5.0,
    }
}

fn copy(phy: &[u8], gateway_id: u8, options: Vec<DownlinkOption>) -> UplinkMessage {
    UplinkMessage {
        payload: phy.to_vec(),
        protocol_metadata: ProtocolMetadata::lorawan(LorawanMetadata {
            modulation: "LORA".into(),
            data_rate: "SF7BW125".into(),
            coding_rate: "4/5".into(),
            f_cnt: 0,
        }),
        gateway_metadata: gateway(gateway_id, -40.0 - f32::from(gateway_id)),
        downlink_options: options,
    }
}

fn device(key: AesKey, dev_eui: Eui64, f_cnt: u32) -> DeviceConfig {
    DeviceConfig {
        dev_addr: DEV_ADDR,
        app_eui: APP_EUI,
        dev_eui,
        nwk_s_key: key,
        f_cnt,
        uses_32bit_f_cnt: false,
        disable_f_cnt_check: false,
    }
}

struct Setup {
    broker: Arc<Broker>,
    network_server: Arc<StaticNetworkServer>,
}

fn setup(devices: Vec<DeviceConfig>, applications: Vec<ApplicationConfig>) -> Setup {
    let network_server = Arc::new(StaticNetworkServer::new(devices));
    let broker = Arc::new(Broker::new(
        WINDOW,
        16,
        Collaborators {
            network_server: network_server.clone(),
            applications: Arc::new(StaticApplications::new(&applications)),
            verifier: Arc::new(LorawanMic),
        },
    ));
    Setup {
        broker,
        network_server,
    }
}

fn default_setup(stored_f_cnt: u32) -> Setup {
    setup(
        vec![device(KEY, DEV_EUI, stored_f_cnt)],
        vec![ApplicationConfig {
            app_eui: APP_EUI,
            handler_id: "H1".into(),
        }],
    )
}

async fn expect_nothing<M>(registration: &mut Registration<M>) {
    let res = tokio::time::timeout(Duration::from_millis(50), registration.recv()).await;
    assert!(res.is_err(), "unexpected message delivered");
}

#[tokio::test]
async fn test_two_gateways_merge_into_one_uplink() {
    let Setup { broker, .. } = default_setup(0);
    let mut handler = broker.register_handler("H1");
    let phy = phy_payload(&KEY, DEV_ADDR, 7, b"temp=21");

    let opener = {
        let broker = broker.clone();
        let first = copy(&phy, 0xa, vec![DownlinkOption::new("R1:S1", 3)]);
        tokio::spawn(async move { broker.handle_uplink(first).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Folded into the open window, returns immediately.
    let second = copy(&phy, 0xb, vec![DownlinkOption::new("R2:S9", 8)]);
    broker.handle_uplink(second).await.unwrap();

    opener.await.unwrap().unwrap();

    let uplink: DeduplicatedUplink = handler.recv().await.unwrap();
    assert_eq!(uplink.payload, phy);
    assert_eq!(uplink.dev_eui, DEV_EUI);
    assert_eq!(uplink.app_eui, APP_EUI);
    assert_eq!(uplink.gateway_metadata.len(), 2);
    assert_eq!(uplink.gateway_metadata[0].gateway_eui, Eui64([0xa; 8]));
    assert_eq!(uplink.gateway_metadata[1].gateway_eui, Eui64([0xb; 8]));
    assert_eq!(uplink.protocol_metadata.lorawan.as_ref().unwrap().f_cnt, 7);
    assert!(uplink.server_time > 0);

    let template = uplink.response_template.unwrap();
    assert_eq!(template.downlink_option.identifier, "R2:S9");
    assert!(template.payload.is_empty());

    expect_nothing(&mut handler).await;

    let stats = broker.stats();
    assert_eq!(stats.uplinks_received, 2);
    assert_eq!(stats.duplicates_absorbed, 1);
    assert_eq!(stats.uplinks_forwarded, 1);
}

#[tokio::test]
async fn test_counter_is_persisted_by_network_server() {
    let Setup {
        broker,
        network_server,
    } = default_setup(10);
    let mut handler = broker.register_handler("H1");

    let phy = phy_payload(&KEY, DEV_ADDR, 12, b"x");
    broker.handle_uplink(copy(&phy, 1, Vec::new())).await.unwrap();
    assert!(handler.recv().await.unwrap().response_template.is_none());

    assert_eq!(network_server.stored_f_cnt(APP_EUI, DEV_EUI), Some(13));
}

#[tokio::test]
async fn test_replayed_counter_rejected() {
    let Setup { broker, .. } = default_setup(100);
    let mut handler = broker.register_handler("H1");

    let phy = phy_payload(&KEY, DEV_ADDR, 99, b"old");
    let err = broker.handle_uplink(copy(&phy, 1, Vec::new())).await.unwrap_err();

    assert_eq!(
        err,
        BrokerError::InvalidFrameCounter {
            stored: 100,
            received: 99
        }
    );
    assert!(err.is_security_relevant());
    expect_nothing(&mut handler).await;
    assert_eq!(broker.stats().uplinks_failed, 1);
}

#[tokio::test]
async fn test_unknown_dev_addr_not_found() {
    let Setup { broker, .. } = default_setup(0);
    let phy = phy_payload(&KEY, DevAddr([0x26, 0xff, 0xff, 0xff]), 1, b"x");

    let err = broker.handle_uplink(copy(&phy, 1, Vec::new())).await.unwrap_err();
    assert_eq!(err, BrokerError::NotFound);
}

#[tokio::test]
async fn test_wrong_key_no_match() {
    let Setup { broker, .. } = default_setup(0);
    let phy = phy_payload(&AesKey([0x99; 16]), DEV_ADDR, 1, b"x");

    let err = broker.handle_uplink(copy(&phy, 1, Vec::new())).await.unwrap_err();
    assert_eq!(err, BrokerError::NoMatch);
}

#[tokio::test]
async fn test_shared_dev_addr_resolved_by_mic() {
    let other_eui = Eui64([9; 8]);
    let other_key = AesKey([0x55; 16]);
    let Setup { broker, .. } = setup(
        vec![device(KEY, DEV_EUI, 0), device(other_key, other_eui, 0)],
        vec![ApplicationConfig {
            app_eui: APP_EUI,
            handler_id: "H1".into(),
        }],
    );
    let mut handler = broker.register_handler("H1");

    let phy = phy_payload(&other_key, DEV_ADDR, 3, b"x");
    broker.handle_uplink(copy(&phy, 1, Vec::new())).await.unwrap();

    assert_eq!(handler.recv().await.unwrap().dev_eui, other_eui);
}

#[tokio::test]
async fn test_32bit_counter_rollover() {
    let mut dev = device(KEY, DEV_EUI, 0x0001_fff0);
    dev.uses_32bit_f_cnt = true;
    let Setup { broker, .. } = setup(
        vec![dev],
        vec![ApplicationConfig {
            app_eui: APP_EUI,
            handler_id: "H1".into(),
        }],
    );
    let mut handler = broker.register_handler("H1");

    let phy = phy_payload(&KEY, DEV_ADDR, 0x0002_0005, b"x");
    broker.handle_uplink(copy(&phy, 1, Vec::new())).await.unwrap();

    let uplink = handler.recv().await.unwrap();
    assert_eq!(
        uplink.protocol_metadata.lorawan.unwrap().f_cnt,
        0x0002_0005
    );
}

#[tokio::test]
async fn test_missing_application_mapping() {
    let Setup { broker, .. } = setup(vec![device(KEY, DEV_EUI, 0)], Vec::new());
    let phy = phy_payload(&KEY, DEV_ADDR, 1, b"x");

    let err = broker.handle_uplink(copy(&phy, 1, Vec::new())).await.unwrap_err();
    assert_eq!(err, BrokerError::UnknownHandler(APP_EUI));
}

#[tokio::test]
async fn test_handler_not_connected() {
    let Setup { broker, .. } = default_setup(0);
    let phy = phy_payload(&KEY, DEV_ADDR, 1, b"x");

    let err = broker.handle_uplink(copy(&phy, 1, Vec::new())).await.unwrap_err();
    assert!(matches!(
        err,
        BrokerError::NotConnected {
            role: PeerRole::Handler,
            ..
        }
    ));
}

#[tokio::test]
async fn test_non_lorawan_uplink_rejected() {
    let Setup { broker, .. } = default_setup(0);
    let phy = phy_payload(&KEY, DEV_ADDR, 1, b"x");
    let mut uplink = copy(&phy, 1, Vec::new());
    uplink.protocol_metadata = ProtocolMetadata::default();

    let err = broker.handle_uplink(uplink).await.unwrap_err();
    assert_eq!(err, BrokerError::UnsupportedProtocol);
}

#[tokio::test]
async fn test_malformed_payload_rejected() {
    let Setup { broker, .. } = default_setup(0);
    let err = broker
        .handle_uplink(copy(&[0x40, 1, 2], 1, Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Decode(_)));
}

#[tokio::test]
async fn test_downlink_dispatch_by_routing_id() {
    let Setup { broker, .. } = default_setup(0);
    let mut r1 = broker.register_router("R1");

    broker
        .dispatch_downlink(DownlinkMessage {
            payload: vec![0xab],
            downlink_option: DownlinkOption::new("R1:S7", 1),
        })
        .await
        .unwrap();
    let received = r1.recv().await.unwrap();
    assert_eq!(received.payload, vec![0xab]);
    assert_eq!(received.downlink_option.identifier, "R1:S7");

    let err = broker
        .dispatch_downlink(DownlinkMessage {
            payload: vec![0xab],
            downlink_option: DownlinkOption::new("R9:S7", 1),
        })
        .await
        .unwrap_err();
    assert!(err.is_routing());
    expect_nothing(&mut r1).await;
}

#[tokio::test]
async fn test_superseded_router_receives_nothing() {
    let Setup { broker, .. } = default_setup(0);
    let mut old = broker.register_router("R1");
    let mut new = broker.register_router("R1");

    broker
        .dispatch_downlink(DownlinkMessage {
            payload: vec![1],
            downlink_option: DownlinkOption::new("R1:S1", 1),
        })
        .await
        .unwrap();

    assert!(new.recv().await.is_some());
    assert!(old.recv().await.is_none());

    // Late unregister of the superseded connection keeps the successor.
    assert!(!broker.unregister_router(&old));
    assert!(broker.routers().is_connected("R1"));
}
