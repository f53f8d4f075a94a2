use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{
    Announcement, AnnouncementId, Application, ApplicationId, Invitation, Lease, LeaseId,
    LeaseStatus, MaintenanceRequest, MaintenanceRequestId, MaintenanceStatus, Property,
    PropertyId, PropertyStatus, Unit, UnitId, UnitStatus, User, UserId,
};
use super::error::StoreError;
use super::store::TenancyStore;

#[derive(Default)]
struct Tables {
    properties: HashMap<PropertyId, Property>,
    units: HashMap<UnitId, Unit>,
    applications: HashMap<ApplicationId, Application>,
    leases: HashMap<LeaseId, Lease>,
    users: HashMap<UserId, User>,
    maintenance: HashMap<MaintenanceRequestId, MaintenanceRequest>,
    announcements: HashMap<AnnouncementId, Announcement>,
}

/// Process-local store backing the service binary and the test suites.
#[derive(Default)]
pub struct InMemoryTenancyStore {
    tables: Mutex<Tables>,
}

impl InMemoryTenancyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

fn unit_number_taken(tables: &Tables, unit: &Unit) -> bool {
    tables.units.values().any(|existing| {
        existing.id != unit.id
            && existing.property_id == unit.property_id
            && existing.unit_number.eq_ignore_ascii_case(&unit.unit_number)
    })
}

fn sorted_by<T, K: Ord>(mut records: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    records.sort_by_key(key);
    records
}

impl TenancyStore for InMemoryTenancyStore {
    fn insert_property(&self, property: Property) -> Result<Property, StoreError> {
        let mut tables = self.tables()?;
        if tables.properties.contains_key(&property.id) {
            return Err(StoreError::Conflict(format!("property {}", property.id)));
        }
        tables
            .properties
            .insert(property.id.clone(), property.clone());
        Ok(property)
    }

    fn update_property(&self, property: Property) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let stored = tables
            .properties
            .get_mut(&property.id)
            .ok_or(StoreError::NotFound)?;
        let status = stored.status;
        *stored = Property { status, ..property };
        Ok(())
    }

    fn set_property_status(
        &self,
        id: &PropertyId,
        status: PropertyStatus,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let stored = tables.properties.get_mut(id).ok_or(StoreError::NotFound)?;
        stored.status = status;
        Ok(())
    }

    fn fetch_property(&self, id: &PropertyId) -> Result<Option<Property>, StoreError> {
        Ok(self.tables()?.properties.get(id).cloned())
    }

    fn properties_for_homeowner(&self, homeowner: &UserId) -> Result<Vec<Property>, StoreError> {
        let tables = self.tables()?;
        let matching: Vec<_> = tables
            .properties
            .values()
            .filter(|property| property.is_owned_by(homeowner))
            .cloned()
            .collect();
        Ok(sorted_by(matching, |property: &Property| property.id.clone()))
    }

    fn insert_unit(&self, unit: Unit) -> Result<Unit, StoreError> {
        let mut tables = self.tables()?;
        if tables.units.contains_key(&unit.id) || unit_number_taken(&tables, &unit) {
            return Err(StoreError::Conflict(format!(
                "unit number {} already exists on property {}",
                unit.unit_number, unit.property_id
            )));
        }
        tables.units.insert(unit.id.clone(), unit.clone());
        Ok(unit)
    }

    fn compare_and_set_unit(&self, unit: Unit, expected: UnitStatus) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let found = tables
            .units
            .get(&unit.id)
            .map(|stored| stored.status)
            .ok_or(StoreError::NotFound)?;
        if found != expected {
            return Err(StoreError::UnitStatusMismatch {
                unit_id: unit.id,
                found,
            });
        }
        if unit_number_taken(&tables, &unit) {
            return Err(StoreError::Conflict(format!(
                "unit number {} already exists on property {}",
                unit.unit_number, unit.property_id
            )));
        }
        tables.units.insert(unit.id.clone(), unit);
        Ok(())
    }

    fn delete_unit_unless(&self, id: &UnitId, guarded: UnitStatus) -> Result<Unit, StoreError> {
        let mut tables = self.tables()?;
        let found = tables
            .units
            .get(id)
            .map(|stored| stored.status)
            .ok_or(StoreError::NotFound)?;
        if found == guarded {
            return Err(StoreError::UnitStatusMismatch {
                unit_id: id.clone(),
                found,
            });
        }
        tables.units.remove(id).ok_or(StoreError::NotFound)
    }

    fn fetch_unit(&self, id: &UnitId) -> Result<Option<Unit>, StoreError> {
        Ok(self.tables()?.units.get(id).cloned())
    }

    fn units_for_property(&self, property_id: &PropertyId) -> Result<Vec<Unit>, StoreError> {
        let tables = self.tables()?;
        let matching: Vec<_> = tables
            .units
            .values()
            .filter(|unit| &unit.property_id == property_id)
            .cloned()
            .collect();
        Ok(sorted_by(matching, |unit: &Unit| unit.unit_number.clone()))
    }

    fn insert_application(&self, application: Application) -> Result<Application, StoreError> {
        let mut tables = self.tables()?;
        if tables.applications.contains_key(&application.id) {
            return Err(StoreError::Conflict(format!(
                "application {}",
                application.id
            )));
        }
        tables
            .applications
            .insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn update_application(&self, application: Application) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let stored = tables
            .applications
            .get_mut(&application.id)
            .ok_or(StoreError::NotFound)?;
        *stored = application;
        Ok(())
    }

    fn fetch_application(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        Ok(self.tables()?.applications.get(id).cloned())
    }

    fn applications_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<Application>, StoreError> {
        let tables = self.tables()?;
        let matching: Vec<_> = tables
            .applications
            .values()
            .filter(|application| &application.property_id == property_id)
            .cloned()
            .collect();
        Ok(sorted_by(matching, |application: &Application| {
            (application.submitted_at, application.id.clone())
        }))
    }

    fn insert_lease(&self, lease: Lease) -> Result<Lease, StoreError> {
        let mut tables = self.tables()?;
        let duplicate_active = lease.status == LeaseStatus::Active
            && tables.leases.values().any(|existing| {
                existing.unit_id == lease.unit_id && existing.status == LeaseStatus::Active
            });
        if duplicate_active || tables.leases.contains_key(&lease.id) {
            return Err(StoreError::Conflict(format!(
                "unit {} already has an active lease",
                lease.unit_id
            )));
        }
        tables.leases.insert(lease.id.clone(), lease.clone());
        Ok(lease)
    }

    fn update_lease(&self, lease: Lease) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        if lease.status == LeaseStatus::Active
            && tables.leases.values().any(|existing| {
                existing.id != lease.id
                    && existing.unit_id == lease.unit_id
                    && existing.status == LeaseStatus::Active
            })
        {
            return Err(StoreError::Conflict(format!(
                "unit {} already has an active lease",
                lease.unit_id
            )));
        }
        let stored = tables
            .leases
            .get_mut(&lease.id)
            .ok_or(StoreError::NotFound)?;
        *stored = lease;
        Ok(())
    }

    fn delete_lease(&self, id: &LeaseId) -> Result<(), StoreError> {
        self.tables()?
            .leases
            .remove(id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn fetch_lease(&self, id: &LeaseId) -> Result<Option<Lease>, StoreError> {
        Ok(self.tables()?.leases.get(id).cloned())
    }

    fn leases_for_tenant(&self, tenant: &UserId) -> Result<Vec<Lease>, StoreError> {
        let tables = self.tables()?;
        let matching: Vec<_> = tables
            .leases
            .values()
            .filter(|lease| &lease.tenant == tenant)
            .cloned()
            .collect();
        Ok(sorted_by(matching, |lease: &Lease| lease.created_at))
    }

    fn leases_for_unit(&self, unit_id: &UnitId) -> Result<Vec<Lease>, StoreError> {
        let tables = self.tables()?;
        let matching: Vec<_> = tables
            .leases
            .values()
            .filter(|lease| &lease.unit_id == unit_id)
            .cloned()
            .collect();
        Ok(sorted_by(matching, |lease: &Lease| lease.created_at))
    }

    fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let mut tables = self.tables()?;
        let email_taken = tables
            .users
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&user.email));
        if email_taken || tables.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!(
                "an account for {} already exists",
                user.email
            )));
        }
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    fn update_user(&self, user: User) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let stored = tables.users.get_mut(&user.id).ok_or(StoreError::NotFound)?;
        *stored = user;
        Ok(())
    }

    fn fetch_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables()?.users.get(id).cloned())
    }

    fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    fn find_user_by_invitation_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables()?;
        Ok(tables
            .users
            .values()
            .find(|user| {
                user.invitation
                    .pending()
                    .is_some_and(|pending| pending.token.as_str() == token)
            })
            .cloned())
    }

    fn users_with_lapsed_invitations(&self, now: DateTime<Utc>) -> Result<Vec<User>, StoreError> {
        let tables = self.tables()?;
        let matching: Vec<_> = tables
            .users
            .values()
            .filter(|user| match &user.invitation {
                Invitation::Pending(pending) => pending.has_lapsed(now),
                _ => false,
            })
            .cloned()
            .collect();
        Ok(sorted_by(matching, |user: &User| user.id.clone()))
    }

    fn insert_maintenance_request(
        &self,
        request: MaintenanceRequest,
    ) -> Result<MaintenanceRequest, StoreError> {
        let mut tables = self.tables()?;
        if tables.maintenance.contains_key(&request.id) {
            return Err(StoreError::Conflict(format!(
                "maintenance request {}",
                request.id
            )));
        }
        tables
            .maintenance
            .insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn update_maintenance_request(&self, request: MaintenanceRequest) -> Result<(), StoreError> {
        let mut tables = self.tables()?;
        let stored = tables
            .maintenance
            .get_mut(&request.id)
            .ok_or(StoreError::NotFound)?;
        *stored = request;
        Ok(())
    }

    fn fetch_maintenance_request(
        &self,
        id: &MaintenanceRequestId,
    ) -> Result<Option<MaintenanceRequest>, StoreError> {
        Ok(self.tables()?.maintenance.get(id).cloned())
    }

    fn delete_resolved_maintenance_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut tables = self.tables()?;
        let before = tables.maintenance.len();
        tables.maintenance.retain(|_, request| {
            !(request.status == MaintenanceStatus::Resolved
                && request.resolved_at.is_some_and(|resolved| resolved < cutoff))
        });
        Ok(before - tables.maintenance.len())
    }

    fn insert_announcement(&self, announcement: Announcement) -> Result<Announcement, StoreError> {
        let mut tables = self.tables()?;
        if tables.announcements.contains_key(&announcement.id) {
            return Err(StoreError::Conflict(format!(
                "announcement {}",
                announcement.id
            )));
        }
        tables
            .announcements
            .insert(announcement.id.clone(), announcement.clone());
        Ok(announcement)
    }

    fn announcements_for_property(
        &self,
        property_id: &PropertyId,
    ) -> Result<Vec<Announcement>, StoreError> {
        let tables = self.tables()?;
        let matching: Vec<_> = tables
            .announcements
            .values()
            .filter(|announcement| &announcement.property_id == property_id)
            .cloned()
            .collect();
        Ok(sorted_by(matching, |announcement: &Announcement| {
            announcement.created_at
        }))
    }

    fn delete_announcements_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut tables = self.tables()?;
        let before = tables.announcements.len();
        tables
            .announcements
            .retain(|_, announcement| announcement.created_at >= cutoff);
        Ok(before - tables.announcements.len())
    }
}
