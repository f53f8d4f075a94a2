use chrono::{DateTime, Utc};

use super::domain::{
    Announcement, Application, ApplicationId, Lease, LeaseId, MaintenanceRequest,
    MaintenanceRequestId, Property, PropertyId, PropertyStatus, Unit, UnitId, UnitStatus, User,
    UserId,
};
use super::error::StoreError;

/// Persistence seam for the tenancy lifecycle.
///
/// Every method is atomic for the single record it touches; nothing spans records.
/// Implementations enforce uniqueness of `(property, unit_number)`, of account email
/// (case-insensitive) and of the active lease per unit, reporting
/// [`StoreError::Conflict`] on violation.
pub trait TenancyStore: Send + Sync {
    fn insert_property(&self, property: Property) -> Result<Property, StoreError>;
    /// Writes every field except `status`, which only [`Self::set_property_status`] changes.
    fn update_property(&self, property: Property) -> Result<(), StoreError>;
    fn set_property_status(
        &self,
        id: &PropertyId,
        status: PropertyStatus,
    ) -> Result<(), StoreError>;
    fn fetch_property(&self, id: &PropertyId) -> Result<Option<Property>, StoreError>;
    fn properties_for_homeowner(&self, homeowner: &UserId) -> Result<Vec<Property>, StoreError>;

    fn insert_unit(&self, unit: Unit) -> Result<Unit, StoreError>;
    /// Replace the unit only if its stored status still equals `expected`.
    fn compare_and_set_unit(&self, unit: Unit, expected: UnitStatus) -> Result<(), StoreError>;
    /// Remove the unit unless its stored status is `guarded`.
    fn delete_unit_unless(&self, id: &UnitId, guarded: UnitStatus) -> Result<Unit, StoreError>;
    fn fetch_unit(&self, id: &UnitId) -> Result<Option<Unit>, StoreError>;
    fn units_for_property(&self, property_id: &PropertyId) -> Result<Vec<Unit>, StoreError>;

    fn insert_application(&self, application: Application) -> Result<Application, StoreError>;
    fn update_application(&self, application: Application) -> Result<(), StoreError>;
    fn fetch_application(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError>;
    fn applications_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<Application>, StoreError>;

    fn insert_lease(&self, lease: Lease) -> Result<Lease, StoreError>;
    fn update_lease(&self, lease: Lease) -> Result<(), StoreError>;
    fn delete_lease(&self, id: &LeaseId) -> Result<(), StoreError>;
    fn fetch_lease(&self, id: &LeaseId) -> Result<Option<Lease>, StoreError>;
    fn leases_for_tenant(&self, tenant: &UserId) -> Result<Vec<Lease>, StoreError>;
    fn leases_for_unit(&self, unit_id: &UnitId) -> Result<Vec<Lease>, StoreError>;

    fn insert_user(&self, user: User) -> Result<User, StoreError>;
    fn update_user(&self, user: User) -> Result<(), StoreError>;
    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, StoreError>;
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    fn find_user_by_invitation_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    /// Users whose pending invitation expired strictly before `now`.
    fn users_with_lapsed_invitations(&self, now: DateTime<Utc>) -> Result<Vec<User>, StoreError>;

    fn insert_maintenance_request(
        &self,
        request: MaintenanceRequest,
    ) -> Result<MaintenanceRequest, StoreError>;
    fn update_maintenance_request(&self, request: MaintenanceRequest) -> Result<(), StoreError>;
    fn fetch_maintenance_request(
        &self,
        id: &MaintenanceRequestId,
    ) -> Result<Option<MaintenanceRequest>, StoreError>;
    /// Delete resolved requests whose `resolved_at` is before `cutoff`, returning the count.
    fn delete_resolved_maintenance_before(&self, cutoff: DateTime<Utc>)
        -> Result<usize, StoreError>;

    fn insert_announcement(&self, announcement: Announcement) -> Result<Announcement, StoreError>;
    fn announcements_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<Announcement>, StoreError>;
    /// Delete announcements created before `cutoff`, returning the count.
    fn delete_announcements_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}
