mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

use common::{read_json, test_config, TestApp};

fn create_payload(name: &str, quantity: i32, reorder_point: i32) -> Value {
    json!({
        "name": name,
        "description": "Stainless, M6",
        "category": "Fasteners",
        "quantity": quantity,
        "unitPrice": "0.40",
        "reorderPoint": reorder_point,
    })
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/inventory", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = read_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Unauthorized");
    assert!(body["timestamp"].is_string());

    let garbage = app
        .request(Method::GET, "/api/inventory", None, Some("not.a.jwt"))
        .await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn inventory_item_lifecycle() {
    let app = TestApp::new().await;

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/inventory",
            Some(create_payload("Hex bolt", 40, 10)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let item = read_json(response).await;
    assert_eq!(item["name"], "Hex bolt");
    assert_eq!(item["quantity"], 40);
    assert_eq!(item["reorderPoint"], 10);
    assert_eq!(item["createdBy"], app.user_id.to_string());
    let id = item["id"].as_str().unwrap().to_string();

    let fetched = app
        .request_authenticated(Method::GET, &format!("/api/inventory/{}", id), None)
        .await;
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(read_json(fetched).await["id"], id.as_str());

    let list = read_json(
        app.request_authenticated(Method::GET, "/api/inventory?page=1&pageSize=5", None)
            .await,
    )
    .await;
    assert_eq!(list["total"], 1);
    assert_eq!(list["pageSize"], 5);
    assert_eq!(list["items"][0]["id"], id.as_str());

    let history = read_json(
        app.request_authenticated(
            Method::GET,
            &format!("/api/transactions?itemId={}", id),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(history["total"], 1);
    assert_eq!(history["items"][0]["type"], "stock-in");
    assert_eq!(history["items"][0]["quantity"], 40);
    assert_eq!(history["items"][0]["notes"], "Initial stock");

    let updated = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/inventory/{}", id),
            Some(json!({"name": "Hex bolt M6", "reorderPoint": 50})),
        )
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let updated = read_json(updated).await;
    assert_eq!(updated["name"], "Hex bolt M6");
    assert_eq!(updated["quantity"], 40);

    // Raising the reorder point above the quantity raises the alert.
    let alerts = read_json(app.request_authenticated(Method::GET, "/api/alerts", None).await).await;
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["type"], "low_stock");
    assert_eq!(alerts[0]["itemId"], id.as_str());
}

#[tokio::test]
async fn create_rejects_invalid_payloads() {
    let app = TestApp::new().await;

    let blank_name = app
        .request_authenticated(
            Method::POST,
            "/api/inventory",
            Some(create_payload("   ", 1, 0)),
        )
        .await;
    assert_eq!(blank_name.status(), StatusCode::BAD_REQUEST);

    let negative = app
        .request_authenticated(
            Method::POST,
            "/api/inventory",
            Some(create_payload("Washer", -1, 0)),
        )
        .await;
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

    let missing_category = app
        .request_authenticated(
            Method::POST,
            "/api/inventory",
            Some(json!({"name": "Washer", "unitPrice": 1})),
        )
        .await;
    assert_eq!(missing_category.status(), StatusCode::BAD_REQUEST);
    let body = read_json(missing_category).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Bad Request");

    let list = read_json(app.request_authenticated(Method::GET, "/api/inventory", None).await).await;
    assert_eq!(list["total"], 0);
}

#[tokio::test]
async fn update_cannot_touch_quantity() {
    let app = TestApp::new().await;
    let item = app.seed_item("Spring", 12, 2).await;

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/inventory/{}", item.id),
            Some(json!({"quantity": 999})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid updates"));

    let stored = app.state.inventory.get_item(app.user_id, item.id).await.unwrap();
    assert_eq!(stored.quantity, 12);
}

#[tokio::test]
async fn other_users_items_are_not_found() {
    let app = TestApp::new().await;
    let item = app.seed_item("Gasket", 5, 1).await;
    let intruder = app.token_for(Uuid::new_v4());

    let get = app
        .request(
            Method::GET,
            &format!("/api/inventory/{}", item.id),
            None,
            Some(&intruder),
        )
        .await;
    assert_eq!(get.status(), StatusCode::NOT_FOUND);

    let stock_out = app
        .request(
            Method::POST,
            "/api/inventory/stock-out",
            Some(json!({"itemId": item.id, "quantity": 1})),
            Some(&intruder),
        )
        .await;
    assert_eq!(stock_out.status(), StatusCode::NOT_FOUND);

    let delete = app
        .request(
            Method::DELETE,
            &format!("/api/inventory/{}", item.id),
            None,
            Some(&intruder),
        )
        .await;
    assert_eq!(delete.status(), StatusCode::NOT_FOUND);

    let list = read_json(
        app.request(Method::GET, "/api/inventory", None, Some(&intruder))
            .await,
    )
    .await;
    assert_eq!(list["total"], 0);

    let stored = app.state.inventory.get_item(app.user_id, item.id).await.unwrap();
    assert_eq!(stored.quantity, 5);
}

#[tokio::test]
async fn search_matches_name_description_and_category() {
    let app = TestApp::new().await;
    app.seed_item("Copper pipe", 3, 1).await;
    app.seed_item("PVC elbow", 3, 1).await;

    let by_name = read_json(
        app.request_authenticated(Method::GET, "/api/inventory/search?q=COPPER", None)
            .await,
    )
    .await;
    assert_eq!(by_name.as_array().unwrap().len(), 1);
    assert_eq!(by_name[0]["name"], "Copper pipe");

    let by_category = read_json(
        app.request_authenticated(Method::GET, "/api/inventory/search?q=hardware", None)
            .await,
    )
    .await;
    assert_eq!(by_category.as_array().unwrap().len(), 2);

    let wildcard = read_json(
        app.request_authenticated(Method::GET, "/api/inventory/search?q=%25", None)
            .await,
    )
    .await;
    assert!(wildcard.as_array().unwrap().is_empty());

    let empty = read_json(
        app.request_authenticated(Method::GET, "/api/inventory/search", None)
            .await,
    )
    .await;
    assert!(empty.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn delete_follows_ledger_history() {
    let app = TestApp::new().await;
    let stocked = app.seed_item("Pallet", 4, 0).await;
    let empty = app.seed_item("Crate", 0, 0).await;

    let conflict = app
        .request_authenticated(Method::DELETE, &format!("/api/inventory/{}", stocked.id), None)
        .await;
    assert_eq!(conflict.status(), StatusCode::BAD_REQUEST);
    assert!(app.state.inventory.get_item(app.user_id, stocked.id).await.is_ok());

    let deleted = app
        .request_authenticated(Method::DELETE, &format!("/api/inventory/{}", empty.id), None)
        .await;
    assert_eq!(deleted.status(), StatusCode::OK);
    assert_eq!(read_json(deleted).await["success"], true);

    let gone = app
        .request_authenticated(Method::GET, &format!("/api/inventory/{}", empty.id), None)
        .await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    // Its low-stock alert went with it.
    let alerts = read_json(app.request_authenticated(Method::GET, "/api/alerts", None).await).await;
    assert!(alerts
        .as_array()
        .unwrap()
        .iter()
        .all(|alert| alert["itemId"] != empty.id.to_string()));
}

#[tokio::test]
async fn low_stock_alerts_cannot_be_dismissed() {
    let app = TestApp::new().await;
    app.seed_item("Fuse", 1, 5).await;

    let alerts = read_json(app.request_authenticated(Method::GET, "/api/alerts", None).await).await;
    let alert_id = alerts[0]["id"].as_str().unwrap().to_string();

    let response = app
        .request_authenticated(Method::DELETE, &format!("/api/alerts/{}", alert_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let missing = app
        .request_authenticated(
            Method::DELETE,
            &format!("/api/alerts/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_requests_use_the_error_body() {
    let app = TestApp::new().await;

    let bad_id = app
        .request_authenticated(Method::GET, "/api/inventory/not-a-uuid", None)
        .await;
    assert_eq!(bad_id.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(bad_id).await["success"], false);

    let bad_type = app
        .request_authenticated(Method::GET, "/api/transactions?type=adjust", None)
        .await;
    assert_eq!(bad_type.status(), StatusCode::BAD_REQUEST);

    let wrong_shape = app
        .request_authenticated(
            Method::POST,
            "/api/inventory/stock-in",
            Some(json!({"itemId": "abc", "quantity": "many"})),
        )
        .await;
    assert_eq!(wrong_shape.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(wrong_shape).await["error"], "Bad Request");
}

#[tokio::test]
async fn request_id_is_echoed_and_reported_on_errors() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api/inventory", None, None)
        .await;
    let header = response
        .headers()
        .get("x-request-id")
        .expect("request id header")
        .to_str()
        .unwrap()
        .to_string();
    let body = read_json(response).await;
    assert_eq!(body["request_id"], header.as_str());
}

#[tokio::test]
async fn health_endpoints_are_public() {
    let app = TestApp::new().await;

    let live = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(live.status(), StatusCode::OK);
    assert_eq!(read_json(live).await["status"], "up");

    let ready = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(ready.status(), StatusCode::OK);
    assert_eq!(read_json(ready).await["ready"], true);
}

#[tokio::test]
async fn api_is_rate_limited_per_client() {
    let mut cfg = test_config();
    cfg.rate_limit_requests_per_window = 2;
    let app = TestApp::with_config(cfg).await;

    for _ in 0..2 {
        let ok = app
            .request_authenticated(Method::GET, "/api/inventory", None)
            .await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert!(ok.headers().contains_key("x-ratelimit-remaining"));
    }

    let limited = app
        .request_authenticated(Method::GET, "/api/inventory", None)
        .await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.headers()["x-ratelimit-remaining"], "0");
    assert_eq!(read_json(limited).await["success"], false);

    // Health checks sit outside the limited surface.
    let health = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn prices_beyond_the_money_columns_are_bad_requests() {
    let app = TestApp::new().await;

    for price in [json!("79228162514264337593543950335"), json!(1e27), json!("0.00001")] {
        let mut payload = create_payload("Anvil", 1000, 0);
        payload["unitPrice"] = price.clone();
        let response = app
            .request_authenticated(Method::POST, "/api/inventory", Some(payload))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "unitPrice {price}");
        assert_eq!(read_json(response).await["success"], false);
    }

    // Price fits, but the opening stock value does not.
    let mut payload = create_payload("Anvil", 1000, 0);
    payload["unitPrice"] = json!("9999999999.9999");
    let response = app
        .request_authenticated(Method::POST, "/api/inventory", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let list = read_json(app.request_authenticated(Method::GET, "/api/inventory", None).await).await;
    assert_eq!(list["total"], 0);
}

#[tokio::test]
async fn far_out_pages_are_empty() {
    let app = TestApp::new().await;
    app.seed_item("Hinge", 3, 0).await;

    for uri in [
        "/api/inventory?page=18446744073709551615&pageSize=10",
        "/api/inventory?page=18446744073709551615",
        "/api/transactions?page=18446744073709551615&pageSize=100",
    ] {
        let response = app.request_authenticated(Method::GET, uri, None).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let body = read_json(response).await;
        assert_eq!(body["items"].as_array().map(Vec::len), Some(0), "{uri}");
        assert_eq!(body["total"], 1, "{uri}");
    }
}

#[tokio::test]
async fn null_description_clears_it() {
    let app = TestApp::new().await;
    let created = app
        .request_authenticated(Method::POST, "/api/inventory", Some(create_payload("Latch", 0, 0)))
        .await;
    let id = read_json(created).await["id"].as_str().unwrap().to_string();
    let uri = format!("/api/inventory/{id}");

    let renamed = read_json(
        app.request_authenticated(Method::PUT, &uri, Some(json!({ "name": "Door latch" })))
            .await,
    )
    .await;
    assert_eq!(renamed["description"], "Stainless, M6");

    let cleared = app
        .request_authenticated(Method::PUT, &uri, Some(json!({ "description": null })))
        .await;
    assert_eq!(cleared.status(), StatusCode::OK);
    let cleared = read_json(cleared).await;
    assert!(cleared["description"].is_null());
    assert_eq!(cleared["name"], "Door latch");
}
