use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rentroll::config::LifecycleConfig;
use rentroll::tenancy::{
    AcceptInvitation, Actor, Address, ApplicationRequest, ApplicationStatus, InMemoryTenancyStore,
    Invitation, LeaseStatus, NewProperty, NewUnit, NotificationTemplate, Property,
    PropertyStatus, RecordingNotifier, ReviewRequest, Role, TenancyError, TenancyServices,
    TenancyStore, TenantInvite, Unit, UnitStatus, User, UserId,
};

struct Portfolio {
    store: Arc<InMemoryTenancyStore>,
    notifier: Arc<RecordingNotifier>,
    services: TenancyServices<InMemoryTenancyStore, RecordingNotifier>,
    manager: Actor,
    property: Property,
}

fn clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 20, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn move_in() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid move-in date")
}

fn account(store: &InMemoryTenancyStore, email: &str, role: Role) -> Actor {
    let user = store
        .insert_user(User {
            id: UserId::generate(),
            email: email.to_string(),
            name: email.to_string(),
            role,
            active: true,
            password_hash: None,
            invitation: Invitation::None,
            created_at: clock(),
        })
        .expect("account stored");
    Actor::new(user.id, role)
}

fn portfolio() -> Portfolio {
    let store = Arc::new(InMemoryTenancyStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let services = TenancyServices::new(
        store.clone(),
        notifier.clone(),
        LifecycleConfig::default(),
    );
    let manager = account(&store, "lee@rentroll.test", Role::Manager);
    let property = services
        .inventory
        .create_property(
            &manager,
            NewProperty {
                name: "Harbor View".to_string(),
                address: Address {
                    street: "9 Wharf Road".to_string(),
                    city: "Portland".to_string(),
                    state: "ME".to_string(),
                    postal_code: "04101".to_string(),
                },
                financials: Default::default(),
            },
            clock(),
        )
        .expect("property created");

    Portfolio {
        store,
        notifier,
        services,
        manager,
        property,
    }
}

impl Portfolio {
    fn unit(&self, number: &str) -> Unit {
        self.services
            .inventory
            .create_unit(
                &self.manager,
                &self.property.id,
                NewUnit {
                    unit_number: number.to_string(),
                    bedrooms: 1,
                    annual_rent: 1_200_000,
                    under_maintenance: false,
                },
            )
            .expect("unit created")
    }

    fn unit_status(&self, unit: &Unit) -> UnitStatus {
        self.store
            .fetch_unit(&unit.id)
            .expect("store")
            .expect("unit exists")
            .status
    }

    fn property_status(&self) -> PropertyStatus {
        self.store
            .fetch_property(&self.property.id)
            .expect("store")
            .expect("property exists")
            .status
    }

    fn invite(&self, unit: &Unit, email: &str) -> String {
        let issued = self
            .services
            .invitations
            .invite_tenant(
                &self.manager,
                &unit.id,
                TenantInvite {
                    email: email.to_string(),
                    name: "Invited Tenant".to_string(),
                    move_in_date: move_in(),
                    lease_duration_months: 12,
                },
                clock(),
            )
            .expect("invitation issued");
        self.store
            .fetch_user(&issued.tenant.id)
            .expect("store")
            .and_then(|user| user.invitation.pending().map(|pending| pending.token.0.clone()))
            .expect("pending token")
    }
}

#[test]
fn approving_one_application_leases_the_unit_and_closes_competitors() {
    let portfolio = portfolio();
    let unit = portfolio.unit("1A");
    let other = portfolio.unit("1B");

    let applicants: Vec<Actor> = ["t1@tenants.test", "t2@tenants.test", "t3@tenants.test"]
        .into_iter()
        .map(|email| account(&portfolio.store, email, Role::Tenant))
        .collect();
    let applications: Vec<_> = applicants
        .iter()
        .map(|tenant| {
            portfolio
                .services
                .applications
                .submit(
                    tenant,
                    ApplicationRequest {
                        unit_id: unit.id.clone(),
                        move_in_date: move_in(),
                        lease_duration_months: 12,
                        message: None,
                    },
                    clock(),
                )
                .expect("application submitted")
        })
        .collect();

    let outcome = portfolio
        .services
        .applications
        .review(
            &portfolio.manager,
            &applications[1].id,
            ReviewRequest {
                status: ApplicationStatus::Approved,
                notes: None,
                block: false,
                block_reason: None,
            },
            clock(),
        )
        .expect("approved");

    let lease = outcome.lease.expect("lease issued on approval");
    assert_eq!(lease.tenant, applicants[1].user_id);
    assert_eq!(lease.monthly_rent, 100_000);
    assert_eq!(lease.security_deposit, 200_000);
    assert_eq!(outcome.auto_rejected.len(), 2);
    assert_eq!(portfolio.unit_status(&unit), UnitStatus::Occupied);
    assert_eq!(portfolio.unit_status(&other), UnitStatus::Vacant);
    // Any vacant unit keeps the property listed as vacant.
    assert_eq!(portfolio.property_status(), PropertyStatus::Vacant);

    for rejected in [&applications[0], &applications[2]] {
        let stored = portfolio
            .services
            .applications
            .get(&portfolio.manager, &rejected.id)
            .expect("application");
        assert_eq!(stored.status, ApplicationStatus::Rejected);
        assert!(!stored.blocked_from_property);
    }
}

#[test]
fn accepted_invitation_occupies_the_unit_until_terminated() {
    let portfolio = portfolio();
    let unit = portfolio.unit("2A");
    let token = portfolio.invite(&unit, "Jordan@Tenants.test");
    assert_eq!(portfolio.unit_status(&unit), UnitStatus::Reserved);
    assert_eq!(portfolio.property_status(), PropertyStatus::Occupied);

    let accepted = portfolio
        .services
        .invitations
        .accept_tenant_invitation(
            AcceptInvitation {
                token: token.clone(),
                password: Some("a sturdy passphrase".to_string()),
            },
            clock() + Duration::days(1),
        )
        .expect("accepted");

    assert_eq!(accepted.tenant.email, "jordan@tenants.test");
    assert!(accepted.tenant.active);
    assert_eq!(
        accepted.lease.end_date,
        NaiveDate::from_ymd_opt(2026, 1, 1).expect("date")
    );
    assert_eq!(portfolio.unit_status(&unit), UnitStatus::Occupied);
    assert_eq!(
        portfolio
            .notifier
            .sent_with(NotificationTemplate::LeaseIssued)
            .len(),
        1
    );

    let replay = portfolio.services.invitations.accept_tenant_invitation(
        AcceptInvitation {
            token,
            password: None,
        },
        clock() + Duration::days(1),
    );
    assert!(matches!(replay, Err(TenancyError::NotFound { .. })));

    let ended = portfolio
        .services
        .leases
        .terminate(
            &portfolio.manager,
            &accepted.lease.id,
            clock() + Duration::days(90),
        )
        .expect("terminated");
    assert_eq!(ended.status, LeaseStatus::Terminated);
    assert_eq!(portfolio.unit_status(&unit), UnitStatus::Vacant);
    assert_eq!(portfolio.property_status(), PropertyStatus::Vacant);
}

#[test]
fn abandoned_reservations_are_reclaimed_by_the_sweeper() {
    let portfolio = portfolio();
    let unit = portfolio.unit("3A");
    let token = portfolio.invite(&unit, "quinn@tenants.test");

    let second = portfolio.services.invitations.invite_tenant(
        &portfolio.manager,
        &unit.id,
        TenantInvite {
            email: "rowan@tenants.test".to_string(),
            name: "Rowan".to_string(),
            move_in_date: move_in(),
            lease_duration_months: 12,
        },
        clock(),
    );
    assert!(matches!(second, Err(TenancyError::Conflict(_))));

    let after_ttl = clock() + Duration::days(8);
    let report = portfolio
        .services
        .sweeper
        .run_once(after_ttl)
        .expect("sweep ran");
    assert_eq!(report.units_reclaimed, 1);
    assert_eq!(report.invitations_expired, 1);
    assert_eq!(portfolio.unit_status(&unit), UnitStatus::Vacant);
    assert_eq!(portfolio.property_status(), PropertyStatus::Vacant);

    let late = portfolio.services.invitations.accept_tenant_invitation(
        AcceptInvitation {
            token,
            password: Some("a sturdy passphrase".to_string()),
        },
        after_ttl,
    );
    assert!(late.is_err());
    assert_eq!(portfolio.unit_status(&unit), UnitStatus::Vacant);
    assert!(portfolio
        .store
        .leases_for_unit(&unit.id)
        .expect("store")
        .is_empty());
}
