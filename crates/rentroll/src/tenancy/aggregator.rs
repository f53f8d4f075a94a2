//! Property status rollup.
//!
//! The rollup is stored on the property record, but the derivation itself is a pure
//! function so it can be computed on demand.

use tracing::{debug, error, warn};

use super::domain::{PropertyId, PropertyStatus, UnitStatus};
use super::store::TenancyStore;

/// Derive a property's status from its units' statuses.
///
/// Returns `None` for an empty inventory, meaning "leave the stored status alone".
/// Any vacant unit makes the property vacant; a fully occupied-or-reserved inventory
/// is occupied; any other mix involves maintenance.
pub fn derive_property_status<I>(statuses: I) -> Option<PropertyStatus>
where
    I: IntoIterator<Item = UnitStatus>,
{
    let mut seen_any = false;
    let mut all_committed = true;

    for status in statuses {
        seen_any = true;
        match status {
            UnitStatus::Vacant => return Some(PropertyStatus::Vacant),
            UnitStatus::Occupied | UnitStatus::Reserved => {}
            UnitStatus::Maintenance => all_committed = false,
        }
    }

    match (seen_any, all_committed) {
        (false, _) => None,
        (true, true) => Some(PropertyStatus::Occupied),
        (true, false) => Some(PropertyStatus::Maintenance),
    }
}

/// Recompute and persist the status of `property_id`.
///
/// Never fails: a missing property or a store error is logged and the caller's unit
/// mutation stands. Returns the status now stored, when known.
pub fn refresh_property_status<S>(store: &S, property_id: &PropertyId) -> Option<PropertyStatus>
where
    S: TenancyStore + ?Sized,
{
    let property = match store.fetch_property(property_id) {
        Ok(Some(property)) => property,
        Ok(None) => {
            warn!(%property_id, "property missing during status refresh");
            return None;
        }
        Err(error) => {
            error!(%property_id, %error, "could not load property for status refresh");
            return None;
        }
    };

    let units = match store.units_for_property(property_id) {
        Ok(units) => units,
        Err(error) => {
            error!(%property_id, %error, "could not load units for status refresh");
            return Some(property.status);
        }
    };

    let Some(derived) = derive_property_status(units.iter().map(|unit| unit.status)) else {
        return Some(property.status);
    };

    if derived == property.status {
        return Some(derived);
    }

    match store.set_property_status(property_id, derived) {
        Ok(()) => {
            debug!(
                %property_id,
                from = property.status.label(),
                to = derived.label(),
                "property status refreshed"
            );
            Some(derived)
        }
        Err(error) => {
            error!(%property_id, %error, "could not persist property status");
            Some(property.status)
        }
    }
}
