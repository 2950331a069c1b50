//! RedisStore against a real redis server.
//!
//! Requires Docker; run with `cargo test -- --ignored`.

use redis::AsyncCommands;
use sonic_restapi_common::{field_values, DbId, FieldValuesExt, KvStore, RedisEndpoint, RedisStore};
use testcontainers::{
    core::{ContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage,
};

async fn start_redis() -> (testcontainers::ContainerAsync<GenericImage>, RedisEndpoint) {
    let container = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(ContainerPort::Tcp(6379))
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await
        .unwrap();

    let host = container.get_host().await.unwrap().to_string();
    let port = container.get_host_port_ipv4(6379).await.unwrap();
    (container, RedisEndpoint::Tcp { host, port })
}

#[tokio::test]
#[ignore]
async fn test_plain_table_roundtrip() {
    let (_container, endpoint) = start_redis().await;
    let store = RedisStore::connect(&endpoint, DbId::ConfigDb).await.unwrap();

    store
        .upsert("VLAN", "Vlan100", &field_values! { "vlanid" => "100" })
        .await
        .unwrap();
    store
        .upsert("VLAN_INTERFACE", "Vlan100|10.1.1.1/24", &Vec::new())
        .await
        .unwrap();

    let vlan = store.get("VLAN", "Vlan100").await.unwrap().unwrap();
    assert_eq!(vlan.get_field("vlanid"), Some("100"));

    let prefixes = store.scan("VLAN_INTERFACE", "Vlan100|*").await.unwrap();
    assert_eq!(prefixes.len(), 1);
    assert_eq!(prefixes[0].0, "Vlan100|10.1.1.1/24");
    assert!(prefixes[0].1.is_empty());

    store.delete("VLAN", "Vlan100").await.unwrap();
    assert!(store.get("VLAN", "Vlan100").await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_producer_table_protocol() {
    let (_container, endpoint) = start_redis().await;
    let store = RedisStore::connect(&endpoint, DbId::ApplDb)
        .await
        .unwrap()
        .with_producer_tables(["VNET_ROUTE_TUNNEL_TABLE"])
        .with_pending_reads(true);

    store
        .upsert(
            "VNET_ROUTE_TUNNEL_TABLE",
            "Vnet1:10.2.0.0/24",
            &field_values! { "endpoint" => "1.1.1.1" },
        )
        .await
        .unwrap();

    let client = redis::Client::open(endpoint.url(DbId::ApplDb)).unwrap();
    let mut conn = client.get_multiplexed_tokio_connection().await.unwrap();
    let pending: Option<String> = conn
        .hget("_VNET_ROUTE_TUNNEL_TABLE:Vnet1:10.2.0.0/24", "endpoint")
        .await
        .unwrap();
    assert_eq!(pending.as_deref(), Some("1.1.1.1"));
    let key_set: Vec<String> = conn.smembers("VNET_ROUTE_TUNNEL_TABLE_KEY_SET").await.unwrap();
    assert_eq!(key_set, vec!["Vnet1:10.2.0.0/24".to_string()]);

    let route = store
        .get("VNET_ROUTE_TUNNEL_TABLE", "Vnet1:10.2.0.0/24")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(route.get_field("endpoint"), Some("1.1.1.1"));

    store
        .delete("VNET_ROUTE_TUNNEL_TABLE", "Vnet1:10.2.0.0/24")
        .await
        .unwrap();
    let del_set: Vec<String> = conn.smembers("VNET_ROUTE_TUNNEL_TABLE_DEL_SET").await.unwrap();
    assert_eq!(del_set, vec!["Vnet1:10.2.0.0/24".to_string()]);
    assert!(store
        .get("VNET_ROUTE_TUNNEL_TABLE", "Vnet1:10.2.0.0/24")
        .await
        .unwrap()
        .is_none());
}
