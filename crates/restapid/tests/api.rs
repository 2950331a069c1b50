//! End-to-end tests of the v1 API over the in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sonic_restapi_common::{FieldValuesExt, KvStore};
use sonic_restapid::{
    build_router, AppState, FixedInterval, Gate, OverlayMgr, PeerIdentity, Stores, INDEX_BANNER,
};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    stores: Stores,
    gate: Arc<Gate>,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_propagation_ms(0).await
    }

    async fn with_propagation_ms(millis: u64) -> Self {
        let stores = Stores::in_memory();
        let mut mgr = OverlayMgr::new(stores.clone())
            .with_propagation(Arc::new(FixedInterval::from_millis(millis)));
        mgr.init().await.unwrap();
        let gate = Arc::new(Gate::new(mgr, vec!["SonicClient".into(), "*.sonic.net".into()]));
        Self {
            router: build_router(AppState::new(gate.clone())),
            stores,
            gate,
        }
    }

    /// Waits until every operation already holding the gate has finished.
    async fn settle(&self) {
        self.gate.run(|_mgr| async { Ok(()) }).await.unwrap();
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into()))
        };
        (status, json)
    }

    async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        };
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        self.send(request).await
    }

    async fn with_vnet(&self, name: &str, vnid: u32) {
        let (status, _) = self
            .call(
                Method::POST,
                "/v1/config/tunnel/decap/vxlan",
                Some(json!({"ip_addr": "10.0.0.1"})),
            )
            .await;
        assert!(status == StatusCode::NO_CONTENT || status == StatusCode::CONFLICT);

        let (status, body) = self
            .call(
                Method::POST,
                &format!("/v1/config/vrouter/{}", name),
                Some(json!({"vnid": vnid})),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT, "{}", body);
    }
}

#[tokio::test]
async fn test_index_and_heartbeat() {
    let app = TestApp::new().await;
    let (status, body) = app.call(Method::GET, "/v1/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String(INDEX_BANNER.into()));

    let (status, body) = app.call(Method::GET, "/v1/state/heartbeat", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["server_version"], "1.0.0");
    assert_eq!(body["routes_available"], -1);
    assert_eq!(body["reset_GUID"].as_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_vnet_id_reuse() {
    let app = TestApp::new().await;
    app.with_vnet("Vnet-A", 5000).await;

    let (status, body) = app
        .call(Method::POST, "/v1/config/vrouter/Vnet-B", Some(json!({"vnid": 5000})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["sub-code"], 0);

    let (status, _) = app.call(Method::DELETE, "/v1/config/vrouter/Vnet-A", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    app.with_vnet("Vnet-C", 6000).await;
    let record = app.stores.config_db.get("VNET", "Vnet1").await.unwrap().unwrap();
    assert_eq!(record.get_field("guid"), Some("Vnet-C"));

    let (status, body) = app.call(Method::GET, "/v1/config/vrouter/Vnet-C", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"vnet_id": "Vnet-C", "attr": {"vnid": 6000}}));

    let (status, body) = app.call(Method::GET, "/v1/config/vrouter/Vnet-A", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["fields"], json!(["Vnet-A"]));
}

#[tokio::test]
async fn test_vnet_requires_tunnel() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(Method::POST, "/v1/config/vrouter/Vnet-A", Some(json!({"vnid": 5000})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["sub-code"], 1);
}

#[tokio::test]
async fn test_vlan_lifecycle_and_dependency() {
    let app = TestApp::new().await;
    app.with_vnet("Vnet-A", 5000).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/v1/config/interface/vlan/100",
            Some(json!({"vnet_id": "Vnet-A", "ip_prefix": "10.1.1.1/24"})),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT, "{}", body);

    let local = app
        .stores
        .appl_db
        .get("VNET_ROUTE_TABLE", "Vnet1:10.1.1.0/24")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(local.get_field("ifname"), Some("Vlan100"));

    let (status, body) = app.call(Method::GET, "/v1/config/interface/vlan/100", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"vlan_id": 100, "attr": {"vnet_id": "Vnet-A", "ip_prefix": "10.1.1.1/24"}})
    );

    let (status, _) = app
        .call(
            Method::POST,
            "/v1/config/interface/vlan/100/member/Ethernet0",
            Some(json!({"tagging_mode": "tagged"})),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.call(Method::DELETE, "/v1/config/interface/vlan/100", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["sub-code"], 2);
    assert!(app.stores.config_db.exists("VLAN", "Vlan100").await.unwrap());

    let (status, _) = app
        .call(Method::DELETE, "/v1/config/vrouter/Vnet-A", None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(Method::DELETE, "/v1/config/interface/vlan/100/member/Ethernet0", None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::DELETE, "/v1/config/interface/vlan/100", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!app.stores.config_db.exists("VLAN", "Vlan100").await.unwrap());
    assert!(app
        .stores
        .appl_db
        .get("VNET_ROUTE_TABLE", "Vnet1:10.1.1.0/24")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_vlan_create_survives_client_disconnect() {
    let app = TestApp::with_propagation_ms(300).await;
    app.with_vnet("Vnet-A", 5000).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/config/interface/vlan/100")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"vnet_id": "Vnet-A", "ip_prefix": "10.1.1.1/24"}).to_string(),
        ))
        .unwrap();
    let outcome = tokio::time::timeout(Duration::from_millis(50), app.send(request)).await;
    assert!(outcome.is_err(), "request finished before the propagation wait");

    app.settle().await;

    assert!(app.stores.config_db.exists("VLAN", "Vlan100").await.unwrap());
    assert!(app.stores.config_db.exists("VLAN_INTERFACE", "Vlan100").await.unwrap());
    assert!(app
        .stores
        .config_db
        .exists("VLAN_INTERFACE", "Vlan100|10.1.1.1/24")
        .await
        .unwrap());
    let local = app
        .stores
        .appl_db
        .get("VNET_ROUTE_TABLE", "Vnet1:10.1.1.0/24")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(local.get_field("ifname"), Some("Vlan100"));
}

#[tokio::test]
async fn test_vlan_validation() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(Method::POST, "/v1/config/interface/vlan/5000", Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["fields"], json!(["vlan_id"]));

    let (status, body) = app.call(Method::GET, "/v1/config/interface/vlan/200", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["fields"], json!(["vlan_id"]));

    let (status, body) = app.call(Method::GET, "/v1/config/interface/vlans", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"], "No vnet_id specified");
}

#[tokio::test]
async fn test_route_append_remove() {
    let app = TestApp::new().await;
    app.with_vnet("Vnet-A", 5000).await;
    let uri = "/v1/config/vrouter/Vnet-A/routes";

    let (status, body) = app
        .call(
            Method::PATCH,
            uri,
            Some(json!([{"cmd": "add", "ip_prefix": "10.2.0.0/24", "nexthop": "1.1.1.1,2.2.2.2"}])),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT, "{}", body);

    let (status, _) = app
        .call(
            Method::PATCH,
            uri,
            Some(json!([{"cmd": "remove", "ip_prefix": "10.2.0.0/24", "nexthop": "1.1.1.1"}])),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.call(Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let routes = body.as_array().unwrap();
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0]["ip_prefix"], "10.2.0.0/24");
    assert_eq!(routes[0]["nexthop"], "2.2.2.2");

    let stored = app
        .stores
        .appl_db
        .get("VNET_ROUTE_TUNNEL_TABLE", "Vnet1:10.2.0.0/24")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_field("endpoint"), Some("2.2.2.2"));

    let (status, _) = app.call(Method::DELETE, uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = app.call(Method::GET, uri, None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_route_remove_identical_is_noop() {
    let app = TestApp::new().await;
    app.with_vnet("Vnet-A", 5000).await;
    let uri = "/v1/config/vrouter/Vnet-A/routes";

    let (status, body) = app
        .call(
            Method::PATCH,
            uri,
            Some(json!([{"cmd": "add", "ip_prefix": "10.2.0.0/24", "nexthop": "1.1.1.1"}])),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT, "{}", body);

    let (status, body) = app
        .call(
            Method::PATCH,
            uri,
            Some(json!([{"cmd": "remove", "ip_prefix": "10.2.0.0/24", "nexthop": "1.1.1.1"}])),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT, "{}", body);

    let stored = app
        .stores
        .appl_db
        .get("VNET_ROUTE_TUNNEL_TABLE", "Vnet1:10.2.0.0/24")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_field("endpoint"), Some("1.1.1.1"));
}

#[tokio::test]
async fn test_route_batch_partial_failure() {
    let app = TestApp::new().await;
    app.with_vnet("Vnet-A", 5000).await;

    let (status, body) = app
        .call(
            Method::PATCH,
            "/v1/config/vrouter/Vnet-A/routes",
            Some(json!([
                {"cmd": "add", "ip_prefix": "10.3.0.0/24", "nexthop": "1.1.1.1"},
                {"cmd": "delete", "ip_prefix": "10.4.0.0/24", "nexthop": "1.1.1.1"},
                {"cmd": "add", "ip_prefix": "10.5.0.1/24", "nexthop": "1.1.1.1"}
            ])),
        )
        .await;
    assert_eq!(status, StatusCode::MULTI_STATUS);
    let failed = body["failed"].as_array().unwrap();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0]["ip_prefix"], "10.4.0.0/24");
    assert_eq!(failed[0]["error_code"], 404);
    assert_eq!(failed[1]["error_msg"], "Incorrect IP Prefix");
}

#[tokio::test]
async fn test_route_query_validation() {
    let app = TestApp::new().await;
    app.with_vnet("Vnet-A", 5000).await;

    let (status, body) = app
        .call(Method::GET, "/v1/config/vrouter/Vnet-A/routes?vnid=1&vnid=2", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"], "May only specify one vnid");

    let (status, body) = app
        .call(Method::GET, "/v1/config/vrouter/Vnet-A/routes?ip_prefix=bogus", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"], "Invalid ip_prefix");
}

#[tokio::test]
async fn test_malformed_body() {
    let app = TestApp::new().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/config/vrouter/Vnet-A")
        .body(Body::from("{\"vnid\": 5000"))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Malformed arguments for API call");
    assert_eq!(body["error"]["details"], "Invalid character in JSON");
}

#[tokio::test]
async fn test_static_routes_and_expiry() {
    let app = TestApp::new().await;
    let (status, _) = app
        .call(
            Method::PATCH,
            "/v1/config/vrf/default/routes",
            Some(json!([
                {"cmd": "add", "ip_prefix": "10.10.0.0/16", "nexthop": "1.1.1.1", "persistent": "true"},
                {"cmd": "add", "ip_prefix": "0.0.0.0/0", "ifname": "null"}
            ])),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.call(Method::GET, "/v1/config/vrf/default/routes", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = app.call(Method::GET, "/v1/config/vrf/routes/expiry", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .call(Method::POST, "/v1/config/vrf/routes/expiry", Some(json!({"time": 600})))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = app.call(Method::GET, "/v1/config/vrf/routes/expiry", None).await;
    assert_eq!(body, json!({"time": 600}));
}

#[tokio::test]
async fn test_reset_status_and_bgp_profile() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(Method::POST, "/v1/config/resetstatus", Some(json!({"reset_status": "true"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"reset_status": "true"}));

    let (status, body) = app
        .call(Method::POST, "/v1/config/resetstatus", Some(json!({"reset_status": "yes"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["fields"], json!(["reset_status"]));

    let (status, _) = app
        .call(
            Method::POST,
            "/v1/config/bgp/profile/FROM_SDN",
            Some(json!({"community_id": "1234:5678"})),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = app.call(Method::GET, "/v1/config/bgp/profile/FROM_SDN", None).await;
    assert_eq!(body, json!({"community_id": "1234:5678"}));
}

#[tokio::test]
async fn test_untrusted_peer_rejected() {
    let app = TestApp::new().await;

    let mut request = Request::builder()
        .uri("/v1/state/heartbeat")
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(PeerIdentity::new(vec!["intruder.example.com".into()]));
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body["error"]["message"],
        "Authentication Fail with untrusted client cert"
    );

    let mut request = Request::builder()
        .uri("/v1/state/heartbeat")
        .body(Body::empty())
        .unwrap();
    request
        .extensions_mut()
        .insert(PeerIdentity::new(vec!["leaf.sonic.net".into()]));
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
}
