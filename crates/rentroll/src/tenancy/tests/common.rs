use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::config::LifecycleConfig;
use crate::tenancy::applications::{ApplicationRequest, ReviewOutcome, ReviewRequest};
use crate::tenancy::domain::{
    Actor, Address, Announcement, Application, ApplicationId, ApplicationStatus, Invitation,
    Lease, LeaseId, MaintenanceRequest, MaintenanceRequestId, Property, PropertyId,
    PropertyStatus, Role, Unit, UnitId, UnitStatus, User, UserId,
};
use crate::tenancy::error::{StoreError, TenancyError};
use crate::tenancy::inventory::{NewProperty, NewUnit};
use crate::tenancy::invitations::{TenantInvitationIssued, TenantInvite};
use crate::tenancy::memory::InMemoryTenancyStore;
use crate::tenancy::notify::RecordingNotifier;
use crate::tenancy::router::TenancyServices;
use crate::tenancy::store::TenancyStore;

pub(super) fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// Reference clock for the suites: a week and a half before the 2025 move-in.
pub(super) fn now() -> DateTime<Utc> {
    at(2024, 12, 20, 9)
}

pub(super) fn address() -> Address {
    Address {
        street: "114 Orchard Lane".to_string(),
        city: "Des Moines".to_string(),
        state: "IA".to_string(),
        postal_code: "50309".to_string(),
    }
}

pub(super) fn user(email: &str, role: Role, active: bool) -> User {
    User {
        id: UserId::generate(),
        email: email.to_string(),
        name: email.split('@').next().unwrap_or(email).to_string(),
        role,
        active,
        password_hash: None,
        invitation: Invitation::None,
        created_at: now(),
    }
}

pub(super) struct Harness<S = InMemoryTenancyStore> {
    pub(super) store: Arc<S>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) services: TenancyServices<S, RecordingNotifier>,
    pub(super) manager: Actor,
    pub(super) property: Property,
}

pub(super) fn harness() -> Harness {
    harness_with(InMemoryTenancyStore::new())
}

pub(super) fn harness_with<S: TenancyStore + 'static>(store: S) -> Harness<S> {
    let store = Arc::new(store);
    let notifier = Arc::new(RecordingNotifier::new());
    let services = TenancyServices::new(
        store.clone(),
        notifier.clone(),
        LifecycleConfig::default(),
    );

    let manager_account = store
        .insert_user(user("manager@rentroll.test", Role::Manager, true))
        .expect("manager stored");
    let manager = Actor::new(manager_account.id, Role::Manager);
    let property = services
        .inventory
        .create_property(
            &manager,
            NewProperty {
                name: "Orchard Commons".to_string(),
                address: address(),
                financials: Default::default(),
            },
            now(),
        )
        .expect("property created");

    Harness {
        store,
        notifier,
        services,
        manager,
        property,
    }
}

impl<S: TenancyStore + 'static> Harness<S> {
    pub(super) fn unit(&self, number: &str, annual_rent: u64) -> Unit {
        self.services
            .inventory
            .create_unit(
                &self.manager,
                &self.property.id,
                NewUnit {
                    unit_number: number.to_string(),
                    bedrooms: 2,
                    annual_rent,
                    under_maintenance: false,
                },
            )
            .expect("unit created")
    }

    pub(super) fn tenant(&self, email: &str) -> Actor {
        let account = self
            .store
            .insert_user(user(email, Role::Tenant, true))
            .expect("tenant stored");
        Actor::new(account.id, Role::Tenant)
    }

    pub(super) fn fetch_unit(&self, unit_id: &UnitId) -> Unit {
        self.store
            .fetch_unit(unit_id)
            .expect("store reachable")
            .expect("unit exists")
    }

    pub(super) fn fetch_user(&self, user_id: &UserId) -> User {
        self.store
            .fetch_user(user_id)
            .expect("store reachable")
            .expect("user exists")
    }

    pub(super) fn property_status(&self) -> PropertyStatus {
        self.store
            .fetch_property(&self.property.id)
            .expect("store reachable")
            .expect("property exists")
            .status
    }

    pub(super) fn invite(&self, unit: &Unit, email: &str) -> TenantInvitationIssued {
        self.services
            .invitations
            .invite_tenant(
                &self.manager,
                &unit.id,
                TenantInvite {
                    email: email.to_string(),
                    name: "Jordan Avery".to_string(),
                    move_in_date: date(2025, 1, 1),
                    lease_duration_months: 12,
                },
                now(),
            )
            .expect("invitation issued")
    }

    pub(super) fn apply(&self, tenant: &Actor, unit: &Unit) -> Application {
        self.services
            .applications
            .submit(
                tenant,
                ApplicationRequest {
                    unit_id: unit.id.clone(),
                    move_in_date: date(2025, 2, 1),
                    lease_duration_months: 12,
                    message: Some("Two adults, no pets".to_string()),
                },
                now(),
            )
            .expect("application submitted")
    }

    pub(super) fn decide(
        &self,
        application: &Application,
        status: ApplicationStatus,
    ) -> Result<ReviewOutcome, TenancyError> {
        self.services.applications.review(
            &self.manager,
            &application.id,
            ReviewRequest {
                status,
                notes: None,
                block: false,
                block_reason: None,
            },
            now(),
        )
    }

    /// Lease `unit` to a fresh tenant through an approved application.
    pub(super) fn lease_unit(&self, unit: &Unit, email: &str) -> Lease {
        let tenant = self.tenant(email);
        let application = self.apply(&tenant, unit);
        self.decide(&application, ApplicationStatus::Approved)
            .expect("approval succeeds")
            .lease
            .expect("lease issued")
    }

    pub(super) fn token_for(&self, user_id: &UserId) -> String {
        self.fetch_user(user_id)
            .invitation
            .pending()
            .expect("pending invitation")
            .token
            .0
            .clone()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// In-memory store whose user writes, one application's writes or maintenance purge can
/// be switched off, and whose lapsed-invitation listing can be pinned to an old snapshot.
#[derive(Default)]
pub(super) struct FlakyStore {
    inner: InMemoryTenancyStore,
    user_writes_fail: AtomicBool,
    failing_application: Mutex<Option<ApplicationId>>,
    maintenance_fails: AtomicBool,
    pinned_lapsed: Mutex<Option<Vec<User>>>,
}

impl FlakyStore {
    pub(super) fn fail_user_writes(&self, failing: bool) {
        self.user_writes_fail.store(failing, Ordering::SeqCst);
    }

    pub(super) fn fail_maintenance(&self, failing: bool) {
        self.maintenance_fails.store(failing, Ordering::SeqCst);
    }

    pub(super) fn fail_writes_to_application(&self, id: &ApplicationId) {
        *self.failing_application.lock().expect("failing application lock") = Some(id.clone());
    }

    /// Answer every later lapsed-invitation query with `users`, as a slow reader would.
    pub(super) fn pin_lapsed_listing(&self, users: Vec<User>) {
        *self.pinned_lapsed.lock().expect("pinned listing lock") = Some(users);
    }

    fn user_write(&self) -> Result<(), StoreError> {
        if self.user_writes_fail.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("users table offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl TenancyStore for FlakyStore {
    fn insert_property(&self, property: Property) -> Result<Property, StoreError> {
        self.inner.insert_property(property)
    }

    fn update_property(&self, property: Property) -> Result<(), StoreError> {
        self.inner.update_property(property)
    }

    fn set_property_status(
        &self,
        id: &PropertyId,
        status: PropertyStatus,
    ) -> Result<(), StoreError> {
        self.inner.set_property_status(id, status)
    }

    fn fetch_property(&self, id: &PropertyId) -> Result<Option<Property>, StoreError> {
        self.inner.fetch_property(id)
    }

    fn properties_for_homeowner(&self, homeowner: &UserId) -> Result<Vec<Property>, StoreError> {
        self.inner.properties_for_homeowner(homeowner)
    }

    fn insert_unit(&self, unit: Unit) -> Result<Unit, StoreError> {
        self.inner.insert_unit(unit)
    }

    fn compare_and_set_unit(&self, unit: Unit, expected: UnitStatus) -> Result<(), StoreError> {
        self.inner.compare_and_set_unit(unit, expected)
    }

    fn delete_unit_unless(&self, id: &UnitId, guarded: UnitStatus) -> Result<Unit, StoreError> {
        self.inner.delete_unit_unless(id, guarded)
    }

    fn fetch_unit(&self, id: &UnitId) -> Result<Option<Unit>, StoreError> {
        self.inner.fetch_unit(id)
    }

    fn units_for_property(&self, property_id: &PropertyId) -> Result<Vec<Unit>, StoreError> {
        self.inner.units_for_property(property_id)
    }

    fn insert_application(&self, application: Application) -> Result<Application, StoreError> {
        self.inner.insert_application(application)
    }

    fn update_application(&self, application: Application) -> Result<(), StoreError> {
        let failing = self.failing_application.lock().expect("failing application lock");
        if failing.as_ref() == Some(&application.id) {
            return Err(StoreError::Unavailable("applications table offline".to_string()));
        }
        drop(failing);
        self.inner.update_application(application)
    }

    fn fetch_application(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        self.inner.fetch_application(id)
    }

    fn applications_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<Application>, StoreError> {
        self.inner.applications_for_property(property_id)
    }

    fn insert_lease(&self, lease: Lease) -> Result<Lease, StoreError> {
        self.inner.insert_lease(lease)
    }

    fn update_lease(&self, lease: Lease) -> Result<(), StoreError> {
        self.inner.update_lease(lease)
    }

    fn delete_lease(&self, id: &LeaseId) -> Result<(), StoreError> {
        self.inner.delete_lease(id)
    }

    fn fetch_lease(&self, id: &LeaseId) -> Result<Option<Lease>, StoreError> {
        self.inner.fetch_lease(id)
    }

    fn leases_for_tenant(&self, tenant: &UserId) -> Result<Vec<Lease>, StoreError> {
        self.inner.leases_for_tenant(tenant)
    }

    fn leases_for_unit(&self, unit_id: &UnitId) -> Result<Vec<Lease>, StoreError> {
        self.inner.leases_for_unit(unit_id)
    }

    fn insert_user(&self, user: User) -> Result<User, StoreError> {
        self.user_write()?;
        self.inner.insert_user(user)
    }

    fn update_user(&self, user: User) -> Result<(), StoreError> {
        self.user_write()?;
        self.inner.update_user(user)
    }

    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        self.inner.fetch_user(id)
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_email(email)
    }

    fn find_user_by_invitation_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_invitation_token(token)
    }

    fn users_with_lapsed_invitations(&self, now: DateTime<Utc>) -> Result<Vec<User>, StoreError> {
        if let Some(pinned) = self.pinned_lapsed.lock().expect("pinned listing lock").clone() {
            return Ok(pinned);
        }
        self.inner.users_with_lapsed_invitations(now)
    }

    fn insert_maintenance_request(
        &self,
        request: MaintenanceRequest,
    ) -> Result<MaintenanceRequest, StoreError> {
        self.inner.insert_maintenance_request(request)
    }

    fn update_maintenance_request(&self, request: MaintenanceRequest) -> Result<(), StoreError> {
        self.inner.update_maintenance_request(request)
    }

    fn fetch_maintenance_request(
        &self,
        id: &MaintenanceRequestId,
    ) -> Result<Option<MaintenanceRequest>, StoreError> {
        self.inner.fetch_maintenance_request(id)
    }

    fn delete_resolved_maintenance_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        if self.maintenance_fails.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("maintenance table locked".to_string()));
        }
        self.inner.delete_resolved_maintenance_before(cutoff)
    }

    fn insert_announcement(&self, announcement: Announcement) -> Result<Announcement, StoreError> {
        self.inner.insert_announcement(announcement)
    }

    fn announcements_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<Announcement>, StoreError> {
        self.inner.announcements_for_property(property_id)
    }

    fn delete_announcements_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.inner.delete_announcements_before(cutoff)
    }
}
