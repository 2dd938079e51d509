mod common;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use common::{response_json, TestApp};

fn order_payload(menu_item_id: &str, quantity: i32) -> Value {
    json!({
        "items": [
            { "menu_item_id": menu_item_id, "quantity": quantity }
        ]
    })
}

#[tokio::test]
async fn placing_an_order_reserves_stock_and_copies_prices() {
    let app = TestApp::new().await;
    let dosa = app
        .seed_menu_item("Masala Dosa", Decimal::new(4500, 2), 10)
        .await;
    let student = app.student("Asha Rao");

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload(&dosa.id.to_string(), 2)),
            Some(&student.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["status"], "pending");
    assert_eq!(data["version"], 1);
    assert_eq!(data["customer_id"], student.id.to_string());
    assert_eq!(data["customer_name"], "Asha Rao");
    assert_eq!(data["payment_method"], "cash");
    assert_eq!(data["total_amount"], "90.00");
    let items = data["items"].as_array().expect("items array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Masala Dosa");
    assert_eq!(items[0]["unit_price"], "45.00");
    assert_eq!(items[0]["quantity"], 2);

    // The priced copy survives later menu edits; stock was taken up front
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/menu/{}", dosa.id),
            None,
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["stock"], 8);
}

#[tokio::test]
async fn ordering_more_than_stock_is_rejected_without_side_effects() {
    let app = TestApp::new().await;
    let wrap = app
        .seed_menu_item("Paneer Wrap", Decimal::new(6000, 2), 1)
        .await;
    let student = app.student("Ben Okafor");

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload(&wrap.id.to_string(), 3)),
            Some(&student.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("does not have enough stock"));

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/menu/{}", wrap.id),
            None,
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["stock"], 1);
}

#[tokio::test]
async fn unavailable_items_cannot_be_ordered() {
    let app = TestApp::new().await;
    let soup = app
        .seed_menu_item("Tomato Soup", Decimal::new(2500, 2), 10)
        .await;
    let staff = app.staff("Dana Lee");
    let student = app.student("Asha Rao");

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/menu/{}", soup.id),
            Some(json!({ "is_available": false })),
            Some(&staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload(&soup.id.to_string(), 1)),
            Some(&student.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("currently unavailable"));
}

#[tokio::test]
async fn malformed_orders_are_rejected() {
    let app = TestApp::new().await;
    let rice = app
        .seed_menu_item("Lemon Rice", Decimal::new(3000, 2), 5)
        .await;
    let student = app.student("Asha Rao");

    // No lines at all
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "items": [] })),
            Some(&student.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("Order must include at least one menu item"));

    // Zero quantity
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload(&rice.id.to_string(), 0)),
            Some(&student.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("valid menuItemId and quantity"));

    // Unknown menu item
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload(&uuid::Uuid::new_v4().to_string(), 1)),
            Some(&student.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("could not be found"));

    // Unsupported payment method
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "items": [{ "menu_item_id": rice.id.to_string(), "quantity": 1 }],
                "payment_method": "barter"
            })),
            Some(&student.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("Invalid payment method"));
}

#[tokio::test]
async fn students_only_see_their_own_orders() {
    let app = TestApp::new().await;
    let thali = app
        .seed_menu_item("Veg Thali", Decimal::new(8000, 2), 20)
        .await;
    let asha = app.student("Asha Rao");
    let ben = app.student("Ben Okafor");
    let staff = app.staff("Dana Lee");

    for user in [&asha, &ben] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/orders",
                Some(order_payload(&thali.id.to_string(), 1)),
                Some(&user.token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // Each student sees one order, the staff listing sees both
    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some(&asha.token))
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(
        body["data"]["items"][0]["customer_id"],
        asha.id.to_string()
    );

    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some(&staff.token))
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["total_pages"], 1);

    // Direct fetches follow the same ownership rule
    let asha_order_id = {
        let response = app
            .request(Method::GET, "/api/v1/orders", None, Some(&asha.token))
            .await;
        let body = response_json(response).await;
        body["data"]["items"][0]["id"]
            .as_str()
            .expect("order id")
            .to_string()
    };

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", asha_order_id),
            None,
            Some(&ben.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("not allowed to view this order"));

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", asha_order_id),
            None,
            Some(&staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn status_filter_and_invalid_status_values() {
    let app = TestApp::new().await;
    let idli = app
        .seed_menu_item("Idli Sambar", Decimal::new(3500, 2), 10)
        .await;
    let student = app.student("Asha Rao");
    let staff = app.staff("Dana Lee");

    let order_id = place_order(&app, &idli.id.to_string(), &student.token).await;
    advance_status(&app, &order_id, "preparing", &staff.token).await;

    let response = app
        .request(
            Method::GET,
            "/api/v1/orders?status=preparing",
            None,
            Some(&staff.token),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);

    let response = app
        .request(
            Method::GET,
            "/api/v1/orders?status=pending",
            None,
            Some(&staff.token),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 0);

    let response = app
        .request(
            Method::GET,
            "/api/v1/orders?status=microwaving",
            None,
            Some(&staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("Invalid status value"));
}

#[tokio::test]
async fn kitchen_flow_advances_one_step_at_a_time() {
    let app = TestApp::new().await;
    let curry = app
        .seed_menu_item("Egg Curry", Decimal::new(5500, 2), 10)
        .await;
    let student = app.student("Asha Rao");
    let staff = app.staff("Dana Lee");

    let order_id = place_order(&app, &curry.id.to_string(), &student.token).await;

    // Skipping straight to ready is rejected
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "ready" })),
            Some(&staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("Cannot transition from status 'pending' to 'ready'"));

    // The full forward flow works, bumping the version each step
    let body = advance_status(&app, &order_id, "preparing", &staff.token).await;
    assert_eq!(body["data"]["version"], 2);
    advance_status(&app, &order_id, "ready", &staff.token).await;
    let body = advance_status(&app, &order_id, "delivered", &staff.token).await;
    assert_eq!(body["data"]["status"], "delivered");
    assert_eq!(body["data"]["version"], 4);

    // Delivered is terminal
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "preparing" })),
            Some(&staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Rewriting the current status is a harmless no-op
    let body = advance_status(&app, &order_id, "delivered", &staff.token).await;
    assert_eq!(body["data"]["status"], "delivered");
}

#[tokio::test]
async fn status_updates_require_the_manage_permission() {
    let app = TestApp::new().await;
    let tea = app.seed_menu_item("Chai", Decimal::new(1500, 2), 10).await;
    let student = app.student("Asha Rao");

    let order_id = place_order(&app, &tea.id.to_string(), &student.token).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "preparing" })),
            Some(&student.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "preparing" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cancellation_rules_depend_on_role_and_state() {
    let app = TestApp::new().await;
    let pasta = app
        .seed_menu_item("Pesto Pasta", Decimal::new(7000, 2), 20)
        .await;
    let asha = app.student("Asha Rao");
    let ben = app.student("Ben Okafor");
    let staff = app.staff("Dana Lee");

    // A student can cancel their own pending order; stock is not returned
    let order_id = place_order(&app, &pasta.id.to_string(), &asha.token).await;
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
            Some(&asha.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/menu/{}", pasta.id),
            None,
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["stock"], 19);

    // Someone else's order is off limits
    let order_id = place_order(&app, &pasta.id.to_string(), &asha.token).await;
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
            Some(&ben.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Once the kitchen starts, students are too late but staff are not
    advance_status(&app, &order_id, "preparing", &staff.token).await;
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
            Some(&asha.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("error message")
        .contains("Only pending orders can be cancelled"));

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
            Some(&staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Delivered orders cannot be cancelled even by staff
    let order_id = place_order(&app, &pasta.id.to_string(), &asha.token).await;
    for status in ["preparing", "ready", "delivered"] {
        advance_status(&app, &order_id, status, &staff.token).await;
    }
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", order_id),
            None,
            Some(&staff.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn every_response_carries_a_request_id() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/menu", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());

    // Error payloads echo the id as well
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/menu/{}", uuid::Uuid::new_v4()),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let header_id = response
        .headers()
        .get("x-request-id")
        .expect("request id header")
        .to_str()
        .expect("header is ascii")
        .to_string();
    let body = response_json(response).await;
    assert_eq!(body["request_id"], header_id);
}

/// Place a one-line order and return the new order id.
async fn place_order(app: &TestApp, menu_item_id: &str, token: &str) -> String {
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(order_payload(menu_item_id, 1)),
            Some(token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    body["data"]["id"].as_str().expect("order id").to_string()
}

/// Drive an order to the given status and return the response body.
async fn advance_status(app: &TestApp, order_id: &str, status: &str, token: &str) -> Value {
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": status })),
            Some(token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    response_json(response).await
}
