use std::sync::Arc;

use chrono::{DateTime, Months, NaiveDate, Utc};
use tracing::{error, info, warn};

use super::access::require_manager;
use super::aggregator::refresh_property_status;
use super::domain::{
    Actor, Lease, LeaseId, LeaseOrigin, LeaseStatus, PropertyId, Unit, UnitId, UnitStatus, UserId,
};
use super::error::{StoreError, TenancyError};
use super::store::TenancyStore;

/// Security deposit expressed in months of rent.
const DEPOSIT_MONTHS: u64 = 2;

/// Inputs for a new lease, whichever flow produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseTerms {
    pub tenant: UserId,
    pub property_id: PropertyId,
    pub unit_id: UnitId,
    pub move_in_date: NaiveDate,
    pub lease_duration_months: u32,
    /// Annual rent of the unit in minor currency units.
    pub annual_rent: u64,
    pub origin: LeaseOrigin,
}

impl LeaseTerms {
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.move_in_date
            .checked_add_months(Months::new(self.lease_duration_months))
    }

    /// Annual rent over twelve, rounded down.
    pub fn monthly_rent(&self) -> u64 {
        self.annual_rent / 12
    }

    pub fn security_deposit(&self) -> u64 {
        self.monthly_rent() * DEPOSIT_MONTHS
    }
}

/// Sole writer of leases and of the `occupied` unit status.
pub struct LeaseIssuer<S> {
    store: Arc<S>,
}

impl<S> LeaseIssuer<S>
where
    S: TenancyStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create an active lease and occupy the unit, which must currently be `expected`.
    ///
    /// The lease is written first and the unit flipped second with a compare-and-set,
    /// so a unit never reads `occupied` without its lease. When the flip loses a race the
    /// lease is removed again and the call fails with a conflict.
    pub fn issue(
        &self,
        terms: LeaseTerms,
        expected: UnitStatus,
        now: DateTime<Utc>,
    ) -> Result<Lease, TenancyError> {
        if terms.lease_duration_months == 0 {
            return Err(TenancyError::validation(
                "lease duration must be at least one month",
            ));
        }
        let end_date = terms
            .end_date()
            .ok_or_else(|| TenancyError::validation("lease end date is out of range"))?;

        let unit = self
            .store
            .fetch_unit(&terms.unit_id)?
            .ok_or_else(|| TenancyError::not_found("unit", &terms.unit_id))?;
        if unit.property_id != terms.property_id {
            return Err(TenancyError::validation(format!(
                "unit {} does not belong to property {}",
                unit.id, terms.property_id
            )));
        }
        if unit.status != expected {
            return Err(TenancyError::conflict(format!(
                "unit {} is {} (expected {})",
                unit.id, unit.status, expected
            )));
        }

        let lease = Lease {
            id: LeaseId::generate(),
            tenant: terms.tenant.clone(),
            property_id: terms.property_id.clone(),
            unit_id: terms.unit_id.clone(),
            start_date: terms.move_in_date,
            end_date,
            monthly_rent: terms.monthly_rent(),
            security_deposit: terms.security_deposit(),
            status: LeaseStatus::Active,
            origin: terms.origin.clone(),
            created_at: now,
            ended_at: None,
        };
        let lease = self.store.insert_lease(lease)?;

        let occupied = Unit {
            status: UnitStatus::Occupied,
            current_tenant: Some(lease.tenant.clone()),
            current_lease: Some(lease.id.clone()),
            ..unit
        };
        if let Err(failure) = self.store.compare_and_set_unit(occupied, expected) {
            self.discard(&lease);
            return Err(failure.into());
        }

        refresh_property_status(self.store.as_ref(), &lease.property_id);
        info!(
            lease_id = %lease.id,
            unit_id = %lease.unit_id,
            tenant = %lease.tenant,
            monthly_rent = lease.monthly_rent,
            "lease issued"
        );
        Ok(lease)
    }

    fn discard(&self, lease: &Lease) {
        match self.store.delete_lease(&lease.id) {
            Ok(()) => warn!(
                lease_id = %lease.id,
                unit_id = %lease.unit_id,
                "lease discarded after unit changed"
            ),
            Err(error) => {
                error!(lease_id = %lease.id, %error, "could not discard lease after unit changed")
            }
        }
    }

    /// End an active lease early and release its unit.
    ///
    /// The unit is released before the lease is marked terminated; if the second write
    /// fails the stale active lease still blocks a second lease on the unit.
    pub fn terminate(
        &self,
        actor: &Actor,
        lease_id: &LeaseId,
        now: DateTime<Utc>,
    ) -> Result<Lease, TenancyError> {
        let lease = self
            .store
            .fetch_lease(lease_id)?
            .ok_or_else(|| TenancyError::not_found("lease", lease_id))?;
        let property = self
            .store
            .fetch_property(&lease.property_id)?
            .ok_or_else(|| TenancyError::not_found("property", &lease.property_id))?;
        require_manager(actor, &property)?;

        if lease.status != LeaseStatus::Active {
            return Err(TenancyError::conflict(format!(
                "lease {} is already {}",
                lease.id,
                lease.status.label()
            )));
        }

        if let Some(unit) = self.store.fetch_unit(&lease.unit_id)? {
            if unit.current_lease.as_ref() == Some(&lease.id) {
                let released = Unit {
                    status: UnitStatus::Vacant,
                    current_tenant: None,
                    current_lease: None,
                    ..unit
                };
                self.store
                    .compare_and_set_unit(released, UnitStatus::Occupied)?;
            }
        }

        let terminated = Lease {
            status: LeaseStatus::Terminated,
            ended_at: Some(now),
            ..lease
        };
        self.store.update_lease(terminated.clone())?;
        refresh_property_status(self.store.as_ref(), &terminated.property_id);

        info!(lease_id = %terminated.id, unit_id = %terminated.unit_id, "lease terminated");
        Ok(terminated)
    }

    pub fn get(&self, lease_id: &LeaseId) -> Result<Lease, TenancyError> {
        self.store
            .fetch_lease(lease_id)?
            .ok_or_else(|| TenancyError::not_found("lease", lease_id))
    }

    /// The tenant's active lease, if any.
    pub fn active_lease_for(&self, tenant: &UserId) -> Result<Option<Lease>, StoreError> {
        Ok(self
            .store
            .leases_for_tenant(tenant)?
            .into_iter()
            .find(|lease| lease.status == LeaseStatus::Active))
    }
}
