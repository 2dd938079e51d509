mod common;

use axum::http::{Method, StatusCode};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde_json::json;

use common::{response_json, TestApp};

/// Twenty hungry students race for ten portions. Exactly ten orders may
/// succeed and the stock must land on zero, never below.
#[tokio::test]
async fn concurrent_orders_never_oversell() {
    let app = TestApp::new().await;
    let biryani = app
        .seed_menu_item("Chicken Biryani", Decimal::new(12000, 2), 10)
        .await;
    let students: Vec<_> = (0..20)
        .map(|i| app.student(&format!("Student {}", i)))
        .collect();

    let requests = students.iter().map(|user| {
        app.request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "menu_item_id": biryani.id.to_string(), "quantity": 1 }]
            })),
            Some(&user.token),
        )
    });
    let responses = join_all(requests).await;

    let created = responses
        .iter()
        .filter(|r| r.status() == StatusCode::CREATED)
        .count();
    let rejected = responses
        .iter()
        .filter(|r| r.status() == StatusCode::UNPROCESSABLE_ENTITY)
        .count();
    assert_eq!(created, 10, "exactly the available portions are sold");
    assert_eq!(rejected, 10, "every other order is turned away");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/menu/{}", biryani.id),
            None,
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["stock"], 0);
}

#[tokio::test]
async fn taking_the_exact_remaining_stock_succeeds() {
    let app = TestApp::new().await;
    let samosa = app
        .seed_menu_item("Samosa", Decimal::new(1200, 2), 3)
        .await;
    let student = app.student("Asha Rao");

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "menu_item_id": samosa.id.to_string(), "quantity": 3 }]
            })),
            Some(&student.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/menu/{}", samosa.id),
            None,
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["stock"], 0);

    // The shelf is empty now
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "menu_item_id": samosa.id.to_string(), "quantity": 1 }]
            })),
            Some(&student.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

/// When one line of a multi-line order cannot be filled, lines that were
/// already decremented must be restored.
#[tokio::test]
async fn failed_multi_line_order_rolls_back_every_line() {
    let app = TestApp::new().await;
    let dal = app
        .seed_menu_item("Dal Fry", Decimal::new(4000, 2), 10)
        .await;
    let naan = app.seed_menu_item("Naan", Decimal::new(800, 2), 1).await;
    let student = app.student("Ben Okafor");

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [
                    { "menu_item_id": dal.id.to_string(), "quantity": 2 },
                    { "menu_item_id": naan.id.to_string(), "quantity": 3 }
                ]
            })),
            Some(&student.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    for (id, expected) in [(dal.id, 10), (naan.id, 1)] {
        let response = app
            .request(Method::GET, &format!("/api/v1/menu/{}", id), None, None)
            .await;
        let body = response_json(response).await;
        assert_eq!(body["data"]["stock"], expected);
    }

    // Nothing was recorded for the failed order either
    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some(&student.token))
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 0);
}
