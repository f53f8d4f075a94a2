use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;

use crate::config::LifecycleConfig;
use crate::tenancy::domain::{Actor, UnitStatus, UserId};
use crate::tenancy::memory::InMemoryTenancyStore;
use crate::tenancy::notify::RecordingNotifier;
use crate::tenancy::router::{
    tenancy_router, TenancyServices, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER,
};

fn request(
    method: Method,
    uri: &str,
    actor: Option<&Actor>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder
            .header(ACTOR_ID_HEADER, actor.user_id.as_str())
            .header(ACTOR_ROLE_HEADER, actor.role.label());
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("json body")))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

/// Router over a harness store, so fixtures and HTTP calls share state.
fn router_for(h: &Harness) -> axum::Router {
    let services = TenancyServices::new(
        h.store.clone(),
        Arc::new(RecordingNotifier::new()),
        LifecycleConfig::default(),
    );
    tenancy_router(Arc::new(services))
}

#[tokio::test]
async fn requests_without_an_actor_are_unauthenticated() {
    let router = tenancy_router(Arc::new(TenancyServices::new(
        Arc::new(InMemoryTenancyStore::new()),
        Arc::new(RecordingNotifier::new()),
        LifecycleConfig::default(),
    )));

    let response = router
        .oneshot(request(
            Method::POST,
            "/api/v1/properties",
            None,
            Some(json!({
                "name": "Birch House",
                "address": {
                    "street": "1 Birch St",
                    "city": "Ames",
                    "state": "IA",
                    "postal_code": "50010"
                }
            })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .is_some_and(|error| error.contains(ACTOR_ID_HEADER)));
}

#[tokio::test]
async fn unit_routes_map_domain_errors_to_status_codes() {
    let h = harness();
    let router = router_for(&h);
    let units_uri = format!("/api/v1/properties/{}/units", h.property.id);

    let created = router
        .clone()
        .oneshot(request(
            Method::POST,
            &units_uri,
            Some(&h.manager),
            Some(json!({"unit_number": "4A", "bedrooms": 2, "annual_rent": 1_320_000})),
        ))
        .await
        .expect("route executes");
    assert_eq!(created.status(), StatusCode::CREATED);
    let unit = read_json_body(created).await;
    assert_eq!(unit["status"], "vacant");

    let duplicate = router
        .clone()
        .oneshot(request(
            Method::POST,
            &units_uri,
            Some(&h.manager),
            Some(json!({"unit_number": "4a", "annual_rent": 1_000_000})),
        ))
        .await
        .expect("route executes");
    assert_eq!(duplicate.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let tenant = h.tenant("riley@tenants.test");
    let forbidden = router
        .clone()
        .oneshot(request(Method::GET, &units_uri, Some(&tenant), None))
        .await
        .expect("route executes");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let missing = router
        .oneshot(request(
            Method::GET,
            "/api/v1/applications/app-missing",
            Some(&h.manager),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_an_occupied_unit_conflicts() {
    let h = harness();
    let unit = h.unit("101", 1_200_000);
    let lease = h.lease_unit(&unit, "casey@tenants.test");
    let router = router_for(&h);

    let response = router
        .clone()
        .oneshot(request(
            Method::DELETE,
            &format!("/api/v1/units/{}", unit.id),
            Some(&h.manager),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let terminated = router
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/leases/{}/terminate", lease.id),
            Some(&h.manager),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(terminated.status(), StatusCode::OK);
    assert_eq!(h.fetch_unit(&unit.id).status, UnitStatus::Vacant);
}

#[tokio::test]
async fn invitation_round_trip_over_http() {
    let h = harness();
    let unit = h.unit("101", 1_200_000);
    let router = router_for(&h);

    let invited = router
        .clone()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/units/{}/tenant-invitations", unit.id),
            Some(&h.manager),
            Some(json!({
                "email": "jordan@tenants.test",
                "name": "Jordan Avery",
                "move_in_date": "2025-01-01",
                "lease_duration_months": 12
            })),
        ))
        .await
        .expect("route executes");
    assert_eq!(invited.status(), StatusCode::CREATED);
    let body = read_json_body(invited).await;
    assert_eq!(body["unit"]["status"], "reserved");
    assert!(body["tenant"].get("password_hash").is_none());

    let tenant_id = body["tenant"]["id"].as_str().expect("tenant id").to_string();
    let token = h.token_for(&UserId(tenant_id));

    let accepted = router
        .oneshot(request(
            Method::POST,
            "/api/v1/invitations/tenant/accept",
            None,
            Some(json!({"token": token, "password": "correct horse battery"})),
        ))
        .await
        .expect("route executes");

    assert_eq!(accepted.status(), StatusCode::CREATED);
    let body = read_json_body(accepted).await;
    assert_eq!(body["lease"]["monthly_rent"], 100_000);
    assert_eq!(body["lease"]["security_deposit"], 200_000);
    assert_eq!(body["lease"]["end_date"], "2026-01-01");
    assert_eq!(h.fetch_unit(&unit.id).status, UnitStatus::Occupied);
}
