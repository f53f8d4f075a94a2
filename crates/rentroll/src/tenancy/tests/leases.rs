use super::common::*;

use crate::tenancy::domain::{
    Actor, LeaseOrigin, LeaseStatus, PropertyStatus, Role, Unit, UnitStatus,
};
use crate::tenancy::error::TenancyError;
use crate::tenancy::leases::LeaseTerms;
use crate::tenancy::store::TenancyStore;

fn terms(h: &Harness, unit: &Unit, months: u32) -> LeaseTerms {
    let tenant = h.tenant(&format!("lease-{months}-{}@tenants.test", unit.unit_number));
    LeaseTerms {
        tenant: tenant.user_id.clone(),
        property_id: unit.property_id.clone(),
        unit_id: unit.id.clone(),
        move_in_date: date(2025, 1, 31),
        lease_duration_months: months,
        annual_rent: unit.annual_rent,
        origin: LeaseOrigin::Invitation {
            invitee: tenant.user_id,
        },
    }
}

#[test]
fn terms_derive_rent_deposit_and_end_date() {
    let h = harness();
    let unit = h.unit("101", 1_000_001);
    let terms = terms(&h, &unit, 1);

    assert_eq!(terms.monthly_rent(), 83_333);
    assert_eq!(terms.security_deposit(), 166_666);
    assert_eq!(terms.end_date(), Some(date(2025, 2, 28)));
}

#[test]
fn issue_refuses_a_unit_in_the_wrong_state() {
    let h = harness();
    let unit = h.unit("101", 1_200_000);
    let lease_terms = terms(&h, &unit, 12);

    let error = h
        .services
        .leases
        .issue(lease_terms, UnitStatus::Reserved, now())
        .expect_err("unit is vacant, not reserved");

    assert!(matches!(error, TenancyError::Conflict(_)));
    assert!(h
        .store
        .leases_for_unit(&unit.id)
        .expect("leases")
        .is_empty());
    assert_eq!(h.fetch_unit(&unit.id).status, UnitStatus::Vacant);
}

#[test]
fn zero_month_leases_are_invalid() {
    let h = harness();
    let unit = h.unit("101", 1_200_000);

    let error = h
        .services
        .leases
        .issue(terms(&h, &unit, 0), UnitStatus::Vacant, now())
        .expect_err("no duration");
    assert!(matches!(error, TenancyError::Validation(_)));
}

#[test]
fn at_most_one_active_lease_per_unit() {
    let h = harness();
    let unit = h.unit("101", 1_200_000);
    let first = h
        .services
        .leases
        .issue(terms(&h, &unit, 12), UnitStatus::Vacant, now())
        .expect("first lease");

    // The unit check passes; the store's active-lease constraint does not.
    let second = h
        .services
        .leases
        .issue(terms(&h, &unit, 6), UnitStatus::Occupied, now());

    assert!(matches!(second, Err(TenancyError::Conflict(_))));
    let active: Vec<_> = h
        .store
        .leases_for_unit(&unit.id)
        .expect("leases")
        .into_iter()
        .filter(|lease| lease.status == LeaseStatus::Active)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, first.id);
    assert_eq!(h.fetch_unit(&unit.id).current_lease, Some(first.id));
}

#[test]
fn termination_releases_the_unit_once() {
    let h = harness();
    let unit = h.unit("101", 1_200_000);
    let lease = h.lease_unit(&unit, "casey@tenants.test");
    assert_eq!(h.property_status(), PropertyStatus::Occupied);

    let terminated = h
        .services
        .leases
        .terminate(&h.manager, &lease.id, now())
        .expect("terminated");

    assert_eq!(terminated.status, LeaseStatus::Terminated);
    assert_eq!(terminated.ended_at, Some(now()));
    let unit = h.fetch_unit(&unit.id);
    assert_eq!(unit.status, UnitStatus::Vacant);
    assert!(unit.current_tenant.is_none());
    assert!(unit.current_lease.is_none());
    assert_eq!(h.property_status(), PropertyStatus::Vacant);

    let again = h.services.leases.terminate(&h.manager, &lease.id, now());
    assert!(matches!(again, Err(TenancyError::Conflict(_))));
    assert!(h
        .services
        .leases
        .active_lease_for(&lease.tenant)
        .expect("store")
        .is_none());
}

#[test]
fn tenants_cannot_terminate_leases() {
    let h = harness();
    let unit = h.unit("101", 1_200_000);
    let lease = h.lease_unit(&unit, "casey@tenants.test");
    let tenant = Actor::new(lease.tenant.clone(), Role::Tenant);

    let error = h
        .services
        .leases
        .terminate(&tenant, &lease.id, now())
        .expect_err("tenant");
    assert!(matches!(error, TenancyError::Unauthorized(_)));
    assert_eq!(
        h.services.leases.get(&lease.id).expect("lease").status,
        LeaseStatus::Active
    );
}
