mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use rstest::rstest;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use stockroom_api::{
    entities::{alert, stock_transaction, AlertType, TransactionType},
    errors::ServiceError,
    services::ledger::StockMovement,
};
use uuid::Uuid;

use common::{read_json, TestApp};

fn movement(item_id: Uuid, quantity: i32) -> StockMovement {
    StockMovement {
        item_id,
        quantity,
        notes: None,
    }
}

async fn alerts_of(app: &TestApp, item_id: Uuid, kind: AlertType) -> u64 {
    alert::Entity::find()
        .filter(alert::Column::ItemId.eq(item_id))
        .filter(alert::Column::AlertType.eq(kind))
        .count(app.state.db.as_ref())
        .await
        .unwrap()
}

async fn transactions_of(app: &TestApp, item_id: Uuid) -> Vec<stock_transaction::Model> {
    stock_transaction::Entity::find()
        .filter(stock_transaction::Column::ItemId.eq(item_id))
        .all(app.state.db.as_ref())
        .await
        .unwrap()
}

#[tokio::test]
async fn stock_out_then_in_moves_the_low_stock_alert() {
    let app = TestApp::new().await;
    let item = app.seed_item("Bearing", 10, 5).await;
    assert_eq!(alerts_of(&app, item.id, AlertType::LowStock).await, 0);

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/inventory/stock-out",
            Some(json!({"itemId": item.id, "quantity": 6, "notes": "Line 3"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["item"]["quantity"], 4);
    assert_eq!(body["transaction"]["type"], "stock-out");
    assert_eq!(body["transaction"]["quantity"], 6);
    assert_eq!(body["transaction"]["notes"], "Line 3");
    assert_eq!(alerts_of(&app, item.id, AlertType::LowStock).await, 1);

    // Staying low does not duplicate the alert.
    app.state
        .ledger
        .stock_out(app.user_id, movement(item.id, 1))
        .await
        .unwrap();
    assert_eq!(alerts_of(&app, item.id, AlertType::LowStock).await, 1);

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/inventory/stock-in",
            Some(json!({"itemId": item.id, "quantity": 4})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["item"]["quantity"], 7);
    assert_eq!(body["transaction"]["type"], "stock-in");
    assert_eq!(alerts_of(&app, item.id, AlertType::LowStock).await, 0);

    let history = transactions_of(&app, item.id).await;
    let net: i64 = history
        .iter()
        .map(|t| t.transaction_type.signed(t.quantity))
        .sum();
    assert_eq!(net, 7);
}

#[rstest]
#[case(0)]
#[case(-3)]
#[tokio::test]
async fn non_positive_quantities_are_rejected(#[case] quantity: i32) {
    let app = TestApp::new().await;
    let item = app.seed_item("Valve", 8, 2).await;

    for path in ["/api/inventory/stock-in", "/api/inventory/stock-out"] {
        let response = app
            .request_authenticated(
                Method::POST,
                path,
                Some(json!({"itemId": item.id, "quantity": quantity})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("Quantity must be greater than 0"));
    }

    let stored = app.state.inventory.get_item(app.user_id, item.id).await.unwrap();
    assert_eq!(stored.quantity, 8);
    assert_eq!(transactions_of(&app, item.id).await.len(), 1);
}

#[tokio::test]
async fn stock_out_beyond_available_writes_nothing() {
    let app = TestApp::new().await;
    let item = app.seed_item("Cable", 3, 0).await;

    let err = app
        .state
        .ledger
        .stock_out(app.user_id, movement(item.id, 4))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let response = app
        .request_authenticated(
            Method::POST,
            "/api/inventory/stock-out",
            Some(json!({"itemId": item.id, "quantity": 4})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let stored = app.state.inventory.get_item(app.user_id, item.id).await.unwrap();
    assert_eq!(stored.quantity, 3);
    assert_eq!(transactions_of(&app, item.id).await.len(), 1);
    assert_eq!(alerts_of(&app, item.id, AlertType::LowStock).await, 0);
}

#[tokio::test]
async fn emptying_an_item_raises_a_dismissable_notification() {
    let app = TestApp::new().await;
    let item = app.seed_item("Filter", 2, 0).await;

    app.state
        .ledger
        .stock_out(app.user_id, movement(item.id, 2))
        .await
        .unwrap();
    assert_eq!(alerts_of(&app, item.id, AlertType::OutOfStock).await, 1);
    assert_eq!(alerts_of(&app, item.id, AlertType::LowStock).await, 1);

    let out_of_stock = app
        .state
        .alerts
        .list(app.user_id, Some(item.id))
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.alert_type == AlertType::OutOfStock)
        .unwrap();
    app.state
        .alerts
        .dismiss(app.user_id, out_of_stock.id)
        .await
        .unwrap();
    assert_eq!(alerts_of(&app, item.id, AlertType::OutOfStock).await, 0);

    app.state
        .ledger
        .stock_in(app.user_id, movement(item.id, 5))
        .await
        .unwrap();
    assert_eq!(alerts_of(&app, item.id, AlertType::LowStock).await, 0);
}

#[tokio::test]
async fn restock_clears_pending_out_of_stock_notification() {
    let app = TestApp::new().await;
    let item = app.seed_item("Belt", 1, 0).await;

    app.state
        .ledger
        .stock_out(app.user_id, movement(item.id, 1))
        .await
        .unwrap();
    app.state
        .ledger
        .stock_in(app.user_id, movement(item.id, 1))
        .await
        .unwrap();
    assert_eq!(alerts_of(&app, item.id, AlertType::OutOfStock).await, 0);
}

#[tokio::test]
async fn create_with_zero_stock_has_empty_ledger_but_low_alert() {
    let app = TestApp::new().await;
    let item = app.seed_item("Placeholder", 0, 0).await;

    assert!(transactions_of(&app, item.id).await.is_empty());
    assert_eq!(alerts_of(&app, item.id, AlertType::LowStock).await, 1);
}

#[tokio::test]
async fn recorded_value_uses_unit_price_at_time_of_movement() {
    let app = TestApp::new().await;
    let item = app.seed_item("Nozzle", 10, 0).await;

    let entry = app
        .state
        .ledger
        .stock_out(app.user_id, movement(item.id, 4))
        .await
        .unwrap();
    assert_eq!(entry.transaction.transaction_type, TransactionType::StockOut);
    assert_eq!(entry.transaction.total_value, item.unit_price * rust_decimal::Decimal::from(4));
    assert_eq!(entry.transaction.created_by, app.user_id);
}

#[tokio::test]
async fn dashboard_and_reports_reflect_the_ledger() {
    let app = TestApp::new().await;
    let bolt = app.seed_item("Bolt", 10, 5).await;
    let nut = app.seed_item("Nut", 20, 2).await;

    app.state
        .ledger
        .stock_out(app.user_id, movement(bolt.id, 6))
        .await
        .unwrap();
    app.state
        .ledger
        .stock_in(app.user_id, movement(nut.id, 5))
        .await
        .unwrap();

    let stats = read_json(
        app.request_authenticated(Method::GET, "/api/dashboard/stats", None)
            .await,
    )
    .await;
    assert_eq!(stats["totalProducts"], 2);
    assert_eq!(stats["lowStockProducts"], 1);
    assert_eq!(stats["totalTransactions"], 4);
    assert_eq!(stats["recentTransactions"].as_array().unwrap().len(), 4);

    let volume = read_json(
        app.request_authenticated(Method::GET, "/api/dashboard/transactions?days=3", None)
            .await,
    )
    .await;
    assert_eq!(volume["labels"].as_array().unwrap().len(), 3);
    assert_eq!(volume["stockIn"][2], 35);
    assert_eq!(volume["stockOut"][2], 6);

    let too_many_days = app
        .request_authenticated(Method::GET, "/api/dashboard/transactions?days=400", None)
        .await;
    assert_eq!(too_many_days.status(), StatusCode::BAD_REQUEST);

    let categories = read_json(
        app.request_authenticated(Method::GET, "/api/dashboard/categories", None)
            .await,
    )
    .await;
    assert_eq!(categories["labels"][0], "Hardware");
    assert_eq!(categories["data"][0], 29);

    let report = read_json(
        app.request_authenticated(Method::GET, "/api/reports/inventory", None)
            .await,
    )
    .await;
    let bolt_row = report
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["name"] == "Bolt")
        .unwrap()
        .clone();
    assert_eq!(bolt_row["stockIn"], 10);
    assert_eq!(bolt_row["stockOut"], 6);
    assert_eq!(bolt_row["quantity"], 4);

    let outs = read_json(
        app.request_authenticated(Method::GET, "/api/reports/transactions?type=stock-out", None)
            .await,
    )
    .await;
    let outs = outs.as_array().unwrap();
    assert_eq!(outs.len(), 1);
    assert_eq!(outs[0]["itemName"], "Bolt");

    let inverted = app
        .request_authenticated(
            Method::GET,
            "/api/reports/transactions?startDate=2024-02-01&endDate=2024-01-01",
            None,
        )
        .await;
    assert_eq!(inverted.status(), StatusCode::BAD_REQUEST);

    let past = read_json(
        app.request_authenticated(
            Method::GET,
            "/api/reports/transactions?startDate=2020-01-01&endDate=2020-12-31",
            None,
        )
        .await,
    )
    .await;
    assert!(past.as_array().unwrap().is_empty());
}
