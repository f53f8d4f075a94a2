use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::access::{require_manager, require_reviewer, require_role};
use super::aggregator::refresh_property_status;
use super::domain::{
    Actor, Address, Announcement, AnnouncementId, HomeownerInvitationStatus, MaintenanceRequest,
    MaintenanceRequestId, MaintenanceStatus, Property, PropertyFinancials, PropertyId,
    PropertyStatus, Role, Unit, UnitId, UnitStatus,
};
use super::error::{StoreError, TenancyError};
use super::store::TenancyStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProperty {
    pub name: String,
    pub address: Address,
    #[serde(default)]
    pub financials: PropertyFinancials,
}

/// Manager edits. Status is never editable here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyUpdate {
    pub name: Option<String>,
    pub address: Option<Address>,
    pub financials: Option<PropertyFinancials>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUnit {
    pub unit_number: String,
    #[serde(default)]
    pub bedrooms: u8,
    pub annual_rent: u64,
    /// Units start vacant unless they are listed straight into maintenance.
    #[serde(default)]
    pub under_maintenance: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitUpdate {
    pub unit_number: Option<String>,
    pub bedrooms: Option<u8>,
    pub annual_rent: Option<u64>,
    /// Only `vacant` and `maintenance` can be set directly.
    pub status: Option<UnitStatus>,
}

/// Owner of property and unit records.
pub struct InventoryService<S> {
    store: Arc<S>,
}

impl<S> InventoryService<S>
where
    S: TenancyStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn create_property(
        &self,
        actor: &Actor,
        request: NewProperty,
        now: DateTime<Utc>,
    ) -> Result<Property, TenancyError> {
        require_role(actor, Role::Manager)?;
        let name = required("property name", &request.name)?;
        validate_address(&request.address)?;

        let property = Property {
            id: PropertyId::generate(),
            name,
            address: request.address,
            financials: request.financials,
            property_manager: actor.user_id.clone(),
            homeowner: None,
            homeowner_invitation_status: HomeownerInvitationStatus::None,
            status: PropertyStatus::Vacant,
            created_at: now,
        };
        let property = self.store.insert_property(property)?;
        info!(property_id = %property.id, manager = %actor.user_id, "property registered");
        Ok(property)
    }

    pub fn update_property(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
        update: PropertyUpdate,
    ) -> Result<Property, TenancyError> {
        let mut property = self.load_property(property_id)?;
        require_manager(actor, &property)?;

        if let Some(name) = update.name {
            property.name = required("property name", &name)?;
        }
        if let Some(address) = update.address {
            validate_address(&address)?;
            property.address = address;
        }
        if let Some(financials) = update.financials {
            property.financials = financials;
        }

        self.store.update_property(property)?;
        self.load_property(property_id)
    }

    pub fn get_property(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
    ) -> Result<Property, TenancyError> {
        let property = self.load_property(property_id)?;
        require_reviewer(actor, &property)?;
        Ok(property)
    }

    pub fn list_units(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
    ) -> Result<Vec<Unit>, TenancyError> {
        let property = self.load_property(property_id)?;
        require_reviewer(actor, &property)?;
        Ok(self.store.units_for_property(property_id)?)
    }

    pub fn create_unit(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
        request: NewUnit,
    ) -> Result<Unit, TenancyError> {
        let property = self.load_property(property_id)?;
        require_manager(actor, &property)?;

        let unit_number = required("unit number", &request.unit_number)?;
        if request.annual_rent == 0 {
            return Err(TenancyError::validation("annual rent must be positive"));
        }
        self.ensure_unit_number_free(property_id, &unit_number, None)?;

        let status = if request.under_maintenance {
            UnitStatus::Maintenance
        } else {
            UnitStatus::Vacant
        };
        let unit = Unit {
            id: UnitId::generate(),
            property_id: property_id.clone(),
            unit_number,
            bedrooms: request.bedrooms,
            annual_rent: request.annual_rent,
            status,
            current_tenant: None,
            current_lease: None,
        };
        let unit = self.store.insert_unit(unit).map_err(duplicate_number)?;
        refresh_property_status(self.store.as_ref(), property_id);

        info!(unit_id = %unit.id, %property_id, unit_number = %unit.unit_number, "unit created");
        Ok(unit)
    }

    pub fn update_unit(
        &self,
        actor: &Actor,
        unit_id: &UnitId,
        update: UnitUpdate,
    ) -> Result<Unit, TenancyError> {
        let unit = self.load_unit(unit_id)?;
        let property = self.load_property(&unit.property_id)?;
        require_manager(actor, &property)?;

        let current = unit.status;
        let mut edited = unit;

        if let Some(number) = update.unit_number {
            let number = required("unit number", &number)?;
            self.ensure_unit_number_free(&edited.property_id, &number, Some(&edited.id))?;
            edited.unit_number = number;
        }
        if let Some(bedrooms) = update.bedrooms {
            edited.bedrooms = bedrooms;
        }
        if let Some(annual_rent) = update.annual_rent {
            if annual_rent == 0 {
                return Err(TenancyError::validation("annual rent must be positive"));
            }
            edited.annual_rent = annual_rent;
        }
        if let Some(status) = update.status {
            edited.status = manual_transition(current, status)?;
        }

        self.store
            .compare_and_set_unit(edited.clone(), current)
            .map_err(duplicate_number)?;
        if edited.status != current {
            refresh_property_status(self.store.as_ref(), &edited.property_id);
            info!(
                unit_id = %edited.id,
                from = current.label(),
                to = edited.status.label(),
                "unit status changed"
            );
        }
        Ok(edited)
    }

    /// Delete a unit. Occupied units are refused until their lease is terminated.
    pub fn delete_unit(&self, actor: &Actor, unit_id: &UnitId) -> Result<Unit, TenancyError> {
        let unit = self.load_unit(unit_id)?;
        let property = self.load_property(&unit.property_id)?;
        require_manager(actor, &property)?;

        let removed = self
            .store
            .delete_unit_unless(unit_id, UnitStatus::Occupied)
            .map_err(|error| match error {
                StoreError::UnitStatusMismatch { unit_id, .. } => TenancyError::conflict(format!(
                    "unit {unit_id} is occupied; terminate its lease before deleting"
                )),
                other => other.into(),
            })?;
        refresh_property_status(self.store.as_ref(), &removed.property_id);

        info!(unit_id = %removed.id, property_id = %removed.property_id, "unit deleted");
        Ok(removed)
    }

    pub fn open_maintenance_request(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
        unit_id: Option<UnitId>,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<MaintenanceRequest, TenancyError> {
        let property = self.load_property(property_id)?;
        require_reviewer(actor, &property)?;
        let description = required("description", description)?;

        let request = MaintenanceRequest {
            id: MaintenanceRequestId::generate(),
            property_id: property_id.clone(),
            unit_id,
            description,
            status: MaintenanceStatus::Open,
            created_at: now,
            resolved_at: None,
        };
        Ok(self.store.insert_maintenance_request(request)?)
    }

    pub fn resolve_maintenance_request(
        &self,
        actor: &Actor,
        request_id: &MaintenanceRequestId,
        now: DateTime<Utc>,
    ) -> Result<MaintenanceRequest, TenancyError> {
        let request = self
            .store
            .fetch_maintenance_request(request_id)?
            .ok_or_else(|| TenancyError::not_found("maintenance request", request_id))?;
        let property = self.load_property(&request.property_id)?;
        require_reviewer(actor, &property)?;

        if request.status == MaintenanceStatus::Resolved {
            return Ok(request);
        }
        let resolved = MaintenanceRequest {
            status: MaintenanceStatus::Resolved,
            resolved_at: Some(now),
            ..request
        };
        self.store.update_maintenance_request(resolved.clone())?;
        Ok(resolved)
    }

    pub fn post_announcement(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
        title: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<Announcement, TenancyError> {
        let property = self.load_property(property_id)?;
        require_manager(actor, &property)?;

        let announcement = Announcement {
            id: AnnouncementId::generate(),
            property_id: property_id.clone(),
            title: required("title", title)?,
            body: body.trim().to_string(),
            created_at: now,
        };
        Ok(self.store.insert_announcement(announcement)?)
    }

    fn ensure_unit_number_free(
        &self,
        property_id: &PropertyId,
        unit_number: &str,
        except: Option<&UnitId>,
    ) -> Result<(), TenancyError> {
        let taken = self.store.units_for_property(property_id)?.iter().any(|unit| {
            Some(&unit.id) != except && unit.unit_number.eq_ignore_ascii_case(unit_number)
        });
        if taken {
            return Err(TenancyError::validation(format!(
                "unit number {unit_number} already exists on property {property_id}"
            )));
        }
        Ok(())
    }

    fn load_property(&self, property_id: &PropertyId) -> Result<Property, TenancyError> {
        self.store
            .fetch_property(property_id)?
            .ok_or_else(|| TenancyError::not_found("property", property_id))
    }

    fn load_unit(&self, unit_id: &UnitId) -> Result<Unit, TenancyError> {
        self.store
            .fetch_unit(unit_id)?
            .ok_or_else(|| TenancyError::not_found("unit", unit_id))
    }
}

/// Statuses a manager may set by hand; `reserved` and `occupied` belong to the
/// invitation and lease flows.
fn manual_transition(
    current: UnitStatus,
    requested: UnitStatus,
) -> Result<UnitStatus, TenancyError> {
    match (current, requested) {
        (
            UnitStatus::Vacant | UnitStatus::Maintenance,
            UnitStatus::Vacant | UnitStatus::Maintenance,
        ) => Ok(requested),
        (_, UnitStatus::Reserved | UnitStatus::Occupied) => Err(TenancyError::validation(
            format!("unit status {requested} is set by invitations and leases"),
        )),
        (current, _) => Err(TenancyError::conflict(format!(
            "unit is {current}; it cannot be moved to {requested} directly"
        ))),
    }
}

fn duplicate_number(error: StoreError) -> TenancyError {
    match error {
        StoreError::Conflict(detail) => TenancyError::Validation(detail),
        other => other.into(),
    }
}

fn required(field: &str, value: &str) -> Result<String, TenancyError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(TenancyError::validation(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

fn validate_address(address: &Address) -> Result<(), TenancyError> {
    required("street", &address.street)?;
    required("city", &address.city)?;
    required("postal code", &address.postal_code)?;
    Ok(())
}
