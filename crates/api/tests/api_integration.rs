//! Integration tests for the API server.

use std::sync::OnceLock;

use api::InMemoryStores;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use chrono::{Duration, Utc};
use common::{ClinicId, RetryPolicy, ServiceId, SlotId, UserId};
use metrics_exporter_prometheus::PrometheusHandle;
use reservation::{Clinic, Patient, Service};
use slot_store::{NewSlot, SlotStore};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    stores: InMemoryStores,
    clinic_id: ClinicId,
    service_id: ServiceId,
}

async fn setup() -> TestApp {
    let stores = api::create_in_memory_state(RetryPolicy::immediate(3));
    let app = api::create_app(stores.state.clone(), get_metrics_handle(), "memory");

    let clinic_id = ClinicId::new();
    let service_id = ServiceId::new();
    stores
        .directory
        .add_clinic(Clinic {
            id: clinic_id,
            name: "Cardiology".to_string(),
            address: "123 Main St".to_string(),
            phone: "+1-555-0100".to_string(),
        })
        .await;
    stores
        .directory
        .add_service(Service {
            id: service_id,
            clinic_id,
            name: "Consultation".to_string(),
            description: String::new(),
            duration_min: 30,
            price_cents: 25_000,
        })
        .await;

    TestApp {
        app,
        stores,
        clinic_id,
        service_id,
    }
}

impl TestApp {
    async fn slot(&self, capacity: u32) -> SlotId {
        let start = Utc::now() + Duration::days(1);
        self.stores
            .slots
            .create_slot(NewSlot::new(
                self.service_id,
                self.clinic_id,
                start,
                start + Duration::minutes(30),
                capacity,
            ))
            .await
            .unwrap()
            .id
    }

    async fn patient(&self) -> UserId {
        let user_id = UserId::new();
        self.stores
            .directory
            .add_patient(Patient::new(user_id, "Test Patient"))
            .await;
        user_id
    }

    fn booking_body(&self, slot_id: SlotId) -> serde_json::Value {
        serde_json::json!({
            "clinic_id": self.clinic_id,
            "service_id": self.service_id,
            "slot_id": slot_id,
            "notes": "first visit",
        })
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn create_booking(&self, user_id: UserId, body: serde_json::Value) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/bookings")
                .header("content-type", "application/json")
                .header("x-user-id", user_id.to_string())
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
    }

    async fn cancel_booking(&self, user_id: UserId, booking_id: &str) -> Response {
        self.send(
            Request::builder()
                .method("PATCH")
                .uri(format!("/bookings/{booking_id}/cancel"))
                .header("x-user-id", user_id.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;

    let response = t.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"], "memory");
}

#[tokio::test]
async fn test_create_booking() {
    let t = setup().await;
    let slot_id = t.slot(1).await;
    let user_id = t.patient().await;

    let response = t.create_booking(user_id, t.booking_body(slot_id)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = json_body(response).await;
    assert_eq!(json["status"], "PENDING");
    assert_eq!(json["slot_id"], slot_id.to_string());
    assert_eq!(json["notes"], "first visit");
    assert_eq!(json["slot"]["available"], 0);
    assert_eq!(json["service"]["name"], "Consultation");
    assert_eq!(json["clinic"]["name"], "Cardiology");
}

#[tokio::test]
async fn test_full_slot_is_conflict() {
    let t = setup().await;
    let slot_id = t.slot(1).await;

    let first = t
        .create_booking(t.patient().await, t.booking_body(slot_id))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = t
        .create_booking(t.patient().await, t.booking_body(slot_id))
        .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let json = json_body(second).await;
    assert_eq!(json["kind"], "conflict");
    assert!(json["error"].as_str().unwrap().contains(&slot_id.to_string()));
}

#[tokio::test]
async fn test_missing_caller_is_unauthorized() {
    let t = setup().await;
    let slot_id = t.slot(1).await;

    let response = t
        .send(
            Request::builder()
                .method("POST")
                .uri("/bookings")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_string(&t.booking_body(slot_id)).unwrap(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = t
        .send(
            Request::builder()
                .uri("/bookings/my")
                .header("x-user-id", "not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["kind"], "unauthenticated");

    let slot = json_body(t.get(&format!("/slots/{slot_id}")).await).await;
    assert_eq!(slot["available"], 1);
}

#[tokio::test]
async fn test_unknown_patient_is_not_found() {
    let t = setup().await;
    let slot_id = t.slot(1).await;

    let response = t.create_booking(UserId::new(), t.booking_body(slot_id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["kind"], "not_found");
}

#[tokio::test]
async fn test_notes_too_long_is_bad_request() {
    let t = setup().await;
    let slot_id = t.slot(1).await;
    let mut body = t.booking_body(slot_id);
    body["notes"] = serde_json::Value::String("x".repeat(1001));

    let response = t.create_booking(t.patient().await, body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "validation");
}

#[tokio::test]
async fn test_list_my_bookings() {
    let t = setup().await;
    let user_id = t.patient().await;
    let other = t.patient().await;

    for _ in 0..2 {
        let slot_id = t.slot(1).await;
        let response = t.create_booking(user_id, t.booking_body(slot_id)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    let slot_id = t.slot(1).await;
    t.create_booking(other, t.booking_body(slot_id)).await;

    let response = t
        .send(
            Request::builder()
                .uri("/bookings/my")
                .header("x-user-id", user_id.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    let bookings = json.as_array().unwrap();
    assert_eq!(bookings.len(), 2);
    assert!(bookings.iter().all(|b| b["clinic"]["name"] == "Cardiology"));
}

#[tokio::test]
async fn test_cancel_booking_restores_capacity() {
    let t = setup().await;
    let slot_id = t.slot(1).await;
    let user_id = t.patient().await;

    let created = json_body(t.create_booking(user_id, t.booking_body(slot_id)).await).await;
    let booking_id = created["id"].as_str().unwrap().to_string();

    let response = t.cancel_booking(user_id, &booking_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "CANCELLED");

    let slot = json_body(t.get(&format!("/slots/{slot_id}")).await).await;
    assert_eq!(slot["available"], 1);

    let again = t.cancel_booking(user_id, &booking_id).await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_someone_elses_booking_is_not_found() {
    let t = setup().await;
    let slot_id = t.slot(1).await;

    let created = json_body(
        t.create_booking(t.patient().await, t.booking_body(slot_id))
            .await,
    )
    .await;
    let booking_id = created["id"].as_str().unwrap();

    let response = t.cancel_booking(t.patient().await, booking_id).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_booking_id_format() {
    let t = setup().await;

    let response = t.cancel_booking(t.patient().await, "not-a-uuid").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_nonexistent_slot() {
    let t = setup().await;

    let response = t.get(&format!("/slots/{}", SlotId::new())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_available_slots_for_service() {
    let t = setup().await;
    let open = t.slot(1).await;
    let full = t.slot(1).await;
    t.create_booking(t.patient().await, t.booking_body(full))
        .await;

    let response = t
        .get(&format!("/services/{}/slots", t.service_id))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    let ids: Vec<_> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec![open.to_string()]);
}

#[tokio::test]
async fn test_inverted_range_is_bad_request() {
    let t = setup().await;

    let response = t
        .get(&format!(
            "/services/{}/slots?from=2026-05-02T00:00:00Z&to=2026-05-01T00:00:00Z",
            t.service_id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup().await;

    let response = t.get("/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );
}
