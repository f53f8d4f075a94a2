use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::applications::{ApplicationRequest, ApplicationService, ReviewRequest};
use super::domain::{
    Actor, ApplicationId, LeaseId, MaintenanceRequestId, PropertyId, Role, UnitId, UserId,
};
use super::error::TenancyError;
use super::inventory::{InventoryService, NewProperty, NewUnit, PropertyUpdate, UnitUpdate};
use super::invitations::{AcceptInvitation, HomeownerInvite, InvitationService, TenantInvite};
use super::leases::LeaseIssuer;
use super::notify::Notifier;
use super::store::TenancyStore;
use super::sweeper::ExpirySweeper;
use crate::config::LifecycleConfig;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Every tenancy service wired over one store and notifier.
pub struct TenancyServices<S, N> {
    pub inventory: InventoryService<S>,
    pub applications: ApplicationService<S, N>,
    pub invitations: InvitationService<S, N>,
    pub leases: Arc<LeaseIssuer<S>>,
    pub sweeper: Arc<ExpirySweeper<S>>,
}

impl<S, N> TenancyServices<S, N>
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, lifecycle: LifecycleConfig) -> Self {
        let leases = Arc::new(LeaseIssuer::new(store.clone()));
        Self {
            inventory: InventoryService::new(store.clone()),
            applications: ApplicationService::new(
                store.clone(),
                notifier.clone(),
                leases.clone(),
            ),
            invitations: InvitationService::new(
                store.clone(),
                notifier,
                leases.clone(),
                lifecycle,
            ),
            leases,
            sweeper: Arc::new(ExpirySweeper::new(store, lifecycle)),
        }
    }
}

type Services<S, N> = State<Arc<TenancyServices<S, N>>>;

#[derive(Debug, Deserialize)]
pub(crate) struct MaintenanceRequestBody {
    #[serde(default)]
    pub(crate) unit_id: Option<UnitId>,
    pub(crate) description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnnouncementBody {
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) body: String,
}

/// HTTP surface of the tenancy lifecycle. Callers identify themselves with the
/// `x-actor-id` and `x-actor-role` headers.
pub fn tenancy_router<S, N>(services: Arc<TenancyServices<S, N>>) -> Router
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/properties", post(create_property::<S, N>))
        .route(
            "/api/v1/properties/:property_id",
            get(get_property::<S, N>).patch(update_property::<S, N>),
        )
        .route(
            "/api/v1/properties/:property_id/units",
            get(list_units::<S, N>).post(create_unit::<S, N>),
        )
        .route(
            "/api/v1/units/:unit_id",
            patch(update_unit::<S, N>).delete(delete_unit::<S, N>),
        )
        .route("/api/v1/applications", post(submit_application::<S, N>))
        .route(
            "/api/v1/applications/:application_id",
            get(get_application::<S, N>),
        )
        .route(
            "/api/v1/applications/:application_id/review",
            post(review_application::<S, N>),
        )
        .route(
            "/api/v1/applications/:application_id/withdraw",
            post(withdraw_application::<S, N>),
        )
        .route(
            "/api/v1/properties/:property_id/applications",
            get(list_applications::<S, N>),
        )
        .route(
            "/api/v1/properties/:property_id/homeowner-invitations",
            post(invite_homeowner::<S, N>),
        )
        .route(
            "/api/v1/units/:unit_id/tenant-invitations",
            post(invite_tenant::<S, N>),
        )
        .route(
            "/api/v1/users/:user_id/tenant-invitation",
            axum::routing::delete(cancel_tenant_invitation::<S, N>),
        )
        .route(
            "/api/v1/invitations/homeowner/accept",
            post(accept_homeowner_invitation::<S, N>),
        )
        .route(
            "/api/v1/invitations/tenant/accept",
            post(accept_tenant_invitation::<S, N>),
        )
        .route(
            "/api/v1/leases/:lease_id/terminate",
            post(terminate_lease::<S, N>),
        )
        .route(
            "/api/v1/properties/:property_id/maintenance-requests",
            post(open_maintenance_request::<S, N>),
        )
        .route(
            "/api/v1/maintenance-requests/:request_id/resolve",
            post(resolve_maintenance_request::<S, N>),
        )
        .route(
            "/api/v1/properties/:property_id/announcements",
            post(post_announcement::<S, N>),
        )
        .with_state(services)
}

/// Read the calling actor from request headers.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let Some(user_id) = header(ACTOR_ID_HEADER) else {
        return Err(unauthenticated(format!("missing {ACTOR_ID_HEADER} header")));
    };
    let role = match header(ACTOR_ROLE_HEADER) {
        Some("manager") => Role::Manager,
        Some("homeowner") => Role::Homeowner,
        Some("tenant") => Role::Tenant,
        Some(other) => return Err(unauthenticated(format!("unknown role {other:?}"))),
        None => {
            return Err(unauthenticated(format!(
                "missing {ACTOR_ROLE_HEADER} header"
            )))
        }
    };
    Ok(Actor::new(UserId(user_id.to_string()), role))
}

fn unauthenticated(message: String) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

pub(crate) fn error_status(error: &TenancyError) -> StatusCode {
    match error {
        TenancyError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TenancyError::Conflict(_) => StatusCode::CONFLICT,
        TenancyError::Unauthorized(_) => StatusCode::FORBIDDEN,
        TenancyError::NotFound { .. } => StatusCode::NOT_FOUND,
        TenancyError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for TenancyError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.to_string() });
        (error_status(&self), Json(payload)).into_response()
    }
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, TenancyError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error.into_response(),
    }
}

macro_rules! actor_or_reject {
    ($headers:expr) => {
        match actor_from_headers(&$headers) {
            Ok(actor) => actor,
            Err(rejection) => return rejection,
        }
    };
}

pub(crate) async fn create_property<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Json(request): Json<NewProperty>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::CREATED,
        services
            .inventory
            .create_property(&actor, request, Utc::now()),
    )
}

pub(crate) async fn get_property<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services
            .inventory
            .get_property(&actor, &PropertyId(property_id)),
    )
}

pub(crate) async fn update_property<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
    Json(update): Json<PropertyUpdate>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services
            .inventory
            .update_property(&actor, &PropertyId(property_id), update),
    )
}

pub(crate) async fn list_units<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services
            .inventory
            .list_units(&actor, &PropertyId(property_id)),
    )
}

pub(crate) async fn create_unit<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
    Json(request): Json<NewUnit>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::CREATED,
        services
            .inventory
            .create_unit(&actor, &PropertyId(property_id), request),
    )
}

pub(crate) async fn update_unit<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(unit_id): Path<String>,
    Json(update): Json<UnitUpdate>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services
            .inventory
            .update_unit(&actor, &UnitId(unit_id), update),
    )
}

pub(crate) async fn delete_unit<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(unit_id): Path<String>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services.inventory.delete_unit(&actor, &UnitId(unit_id)),
    )
}

pub(crate) async fn submit_application<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Json(request): Json<ApplicationRequest>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::CREATED,
        services.applications.submit(&actor, request, Utc::now()),
    )
}

pub(crate) async fn get_application<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services
            .applications
            .get(&actor, &ApplicationId(application_id)),
    )
}

pub(crate) async fn review_application<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services.applications.review(
            &actor,
            &ApplicationId(application_id),
            request,
            Utc::now(),
        ),
    )
}

pub(crate) async fn withdraw_application<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services
            .applications
            .withdraw(&actor, &ApplicationId(application_id), Utc::now()),
    )
}

pub(crate) async fn list_applications<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services
            .applications
            .list_for_property(&actor, &PropertyId(property_id)),
    )
}

pub(crate) async fn invite_homeowner<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
    Json(invite): Json<HomeownerInvite>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::CREATED,
        services.invitations.invite_homeowner(
            &actor,
            &PropertyId(property_id),
            invite,
            Utc::now(),
        ),
    )
}

pub(crate) async fn invite_tenant<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(unit_id): Path<String>,
    Json(invite): Json<TenantInvite>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::CREATED,
        services
            .invitations
            .invite_tenant(&actor, &UnitId(unit_id), invite, Utc::now()),
    )
}

pub(crate) async fn cancel_tenant_invitation<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services
            .invitations
            .cancel_tenant_invitation(&actor, &UserId(user_id)),
    )
}

/// Token holders are not yet authenticated, so acceptance takes no actor.
pub(crate) async fn accept_homeowner_invitation<S, N>(
    State(services): Services<S, N>,
    Json(request): Json<AcceptInvitation>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::OK,
        services
            .invitations
            .accept_homeowner_invitation(request, Utc::now()),
    )
}

pub(crate) async fn accept_tenant_invitation<S, N>(
    State(services): Services<S, N>,
    Json(request): Json<AcceptInvitation>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    respond(
        StatusCode::CREATED,
        services
            .invitations
            .accept_tenant_invitation(request, Utc::now()),
    )
}

pub(crate) async fn terminate_lease<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(lease_id): Path<String>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services
            .leases
            .terminate(&actor, &LeaseId(lease_id), Utc::now()),
    )
}

pub(crate) async fn open_maintenance_request<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
    Json(body): Json<MaintenanceRequestBody>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::CREATED,
        services.inventory.open_maintenance_request(
            &actor,
            &PropertyId(property_id),
            body.unit_id,
            &body.description,
            Utc::now(),
        ),
    )
}

pub(crate) async fn resolve_maintenance_request<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(request_id): Path<String>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::OK,
        services.inventory.resolve_maintenance_request(
            &actor,
            &MaintenanceRequestId(request_id),
            Utc::now(),
        ),
    )
}

pub(crate) async fn post_announcement<S, N>(
    State(services): Services<S, N>,
    headers: HeaderMap,
    Path(property_id): Path<String>,
    Json(body): Json<AnnouncementBody>,
) -> Response
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    let actor = actor_or_reject!(headers);
    respond(
        StatusCode::CREATED,
        services.inventory.post_announcement(
            &actor,
            &PropertyId(property_id),
            &body.title,
            &body.body,
            Utc::now(),
        ),
    )
}
