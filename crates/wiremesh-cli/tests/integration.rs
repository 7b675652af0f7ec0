use std::collections::HashMap;

use uuid::Uuid;
use wiremesh_cli::commands;
use wiremesh_cli::config::{self, ConfigError};
use wiremesh_cli::error::CliError;
use wiremesh_core::{IntegrityError, RenderOptions};
use wiremesh_types::{Connection, ConnectionId, EnabledValue, Mobility, Network, Peer, Scripts};

// -- Helpers --

const HUB: Uuid = Uuid::from_u128(0xf000_0000_0000_4000_8000_0000_0000_0001);
const LAPTOP: Uuid = Uuid::from_u128(0x1000_0000_0000_4000_8000_0000_0000_0002);

fn peer(name: &str, address: [u8; 4], mobility: Mobility, endpoint: &str) -> Peer {
    Peer {
        name: name.into(),
        address: address.into(),
        mobility,
        endpoint: endpoint.into(),
        public_key: format!("{name}-pub"),
        private_key: format!("{name}-priv"),
        dns: EnabledValue::off(String::new()),
        mtu: EnabledValue::off(1420),
        persistent_keepalive: EnabledValue::off(25),
        scripts: Scripts::default(),
        created_at: None,
        updated_at: None,
    }
}

fn sample_network() -> Network {
    let mut network = Network::new("home", "10.0.0.0/24".parse().unwrap());
    network.peers = HashMap::from([
        (HUB, peer("home hub", [10, 0, 0, 1], Mobility::Static, "203.0.113.7:51820")),
        (LAPTOP, peer("laptop", [10, 0, 0, 2], Mobility::Roaming, "")),
    ]);
    network.connections = HashMap::from([(
        ConnectionId::new(HUB, LAPTOP),
        Connection {
            enabled: true,
            pre_shared_key: "psk".into(),
            allowed_ips_a_to_b: "10.0.0.2/32".into(),
            allowed_ips_b_to_a: "10.0.0.0/24".into(),
            persistent_keepalive: EnabledValue::on(25),
        },
    )]);
    network
}

// -- Tests --

#[tokio::test]
async fn save_and_load_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("home.toml");

    config::save(&path, &sample_network()).await.unwrap();
    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(contents.contains("identifier = \"home\""));

    let loaded = config::load(&path).await.unwrap();
    assert_eq!(loaded, sample_network());
}

#[tokio::test]
async fn save_and_load_json() {
    let tmp = tempfile::Builder::new().suffix(".json").tempfile().unwrap();

    config::save(tmp.path(), &sample_network()).await.unwrap();
    let contents = tokio::fs::read_to_string(tmp.path()).await.unwrap();
    assert!(contents.trim_start().starts_with('{'));

    let loaded = config::load(tmp.path()).await.unwrap();
    assert_eq!(loaded, sample_network());
}

#[tokio::test]
async fn load_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = config::load(&dir.path().join("absent.toml")).await.unwrap_err();
    assert!(matches!(err, ConfigError::Read(_)));
}

#[tokio::test]
async fn conf_is_written_under_peer_name() {
    let dir = tempfile::tempdir().unwrap();
    let network = sample_network();

    let rendered =
        commands::render_config(&network, &LAPTOP.to_string(), &RenderOptions::default()).unwrap();
    assert_eq!(rendered.file_name, "laptop.conf");

    let out = dir.path().join("configs");
    let path = commands::write_config(&out, &rendered).await.unwrap();
    assert_eq!(path, out.join("laptop.conf"));

    let written = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(written.starts_with("[Interface]\n"));
    assert!(written.contains("PrivateKey = laptop-priv\n"));
    assert!(written.contains("PublicKey = home hub-pub\n"));
    assert!(written.contains("Endpoint = 203.0.113.7:51820\n"));
    assert!(written.contains("AllowedIPs = 10.0.0.0/24\n"));
}

#[tokio::test]
async fn hub_conf_listens_and_skips_roaming_endpoint() {
    let network = sample_network();
    let rendered =
        commands::render_config(&network, &HUB.to_string(), &RenderOptions::default()).unwrap();

    assert_eq!(rendered.file_name, "home-hub.conf");
    assert!(rendered.contents.contains("ListenPort = 51820\n"));
    assert!(rendered.contents.contains("AllowedIPs = 10.0.0.2/32\n"));
    assert!(!rendered.contents.contains("Endpoint"));
}

#[tokio::test]
async fn next_address_and_check_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("home.toml");
    config::save(&path, &sample_network()).await.unwrap();

    let network = config::load(&path).await.unwrap();
    assert_eq!(commands::next_address(&network).unwrap().to_string(), "10.0.0.3");
    commands::check(&network).unwrap();
}

#[tokio::test]
async fn check_reports_duplicate_address() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("home.json");

    let mut network = sample_network();
    network
        .peers
        .insert(Uuid::new_v4(), peer("phone", [10, 0, 0, 2], Mobility::Roaming, ""));
    config::save(&path, &network).await.unwrap();

    let loaded = config::load(&path).await.unwrap();
    let err = commands::check(&loaded).unwrap_err();
    assert!(matches!(
        err,
        CliError::Integrity(IntegrityError::DuplicateAddress { .. })
    ));
}

#[tokio::test]
async fn validate_address_against_loaded_network() {
    let network = sample_network();

    let taken = commands::validate_payload(Some(&network), None, "address", r#""10.0.0.2""#)
        .unwrap();
    assert!(!taken.status);
    assert!(taken.msg.contains("laptop"));

    let own = LAPTOP.to_string();
    let same = commands::validate_payload(Some(&network), Some(&own), "address", r#""10.0.0.2""#)
        .unwrap();
    assert!(same.status, "{}", same.msg);
}
