use crate::infra::start_of_day;
use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::Args;
use rentroll::config::LifecycleConfig;
use rentroll::error::AppError;
use rentroll::tenancy::{
    AcceptInvitation, Actor, Address, ApplicationRequest, ApplicationStatus, InMemoryTenancyStore,
    Invitation, NewProperty, NewUnit, PropertyId, RecordingNotifier, ReviewRequest, Role,
    TenancyError, TenancyServices, TenancyStore, TenantInvite, Unit, User, UserId,
};
use std::sync::Arc;

type DemoServices = TenancyServices<InMemoryTenancyStore, RecordingNotifier>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Reference date for the walkthrough (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Stop before running the expiry sweep.
    #[arg(long)]
    pub(crate) skip_sweep: bool,
    /// Print the sweep report as JSON instead of a summary line.
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        today,
        skip_sweep,
        json,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let now = start_of_day(today) + chrono::Duration::hours(9);
    let move_in = today + chrono::Duration::days(14);

    let lifecycle = LifecycleConfig::default();
    let store = Arc::new(InMemoryTenancyStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let services = TenancyServices::new(store.clone(), notifier.clone(), lifecycle);

    println!("Tenancy lifecycle demo ({today})");
    let manager = seed_account(
        &store,
        "morgan@rentroll.demo",
        "Morgan Reyes",
        Role::Manager,
        now,
    )?;
    let property = services.inventory.create_property(
        &manager,
        NewProperty {
            name: "Maple Court".to_string(),
            address: Address {
                street: "220 Maple Court".to_string(),
                city: "Madison".to_string(),
                state: "WI".to_string(),
                postal_code: "53703".to_string(),
            },
            financials: Default::default(),
        },
        now,
    )?;
    let garden = add_unit(&services, &manager, &property.id, "101", 1_200_000)?;
    let corner = add_unit(&services, &manager, &property.id, "102", 1_500_000)?;
    let loft = add_unit(&services, &manager, &property.id, "103", 1_080_000)?;
    println!(
        "- Listed {} ({}) with units {}, {}, {}",
        property.name, property.id, garden.unit_number, corner.unit_number, loft.unit_number
    );

    println!("\nApplications");
    let first = seed_account(&store, "avery@tenants.demo", "Avery Kim", Role::Tenant, now)?;
    let second = seed_account(&store, "blake@tenants.demo", "Blake Ortiz", Role::Tenant, now)?;
    let mut submitted = Vec::new();
    for applicant in [&first, &second] {
        let application = services.applications.submit(
            applicant,
            ApplicationRequest {
                unit_id: garden.id.clone(),
                move_in_date: move_in,
                lease_duration_months: 12,
                message: Some("Looking for a twelve month lease.".to_string()),
            },
            now,
        )?;
        println!(
            "- {} applied for unit {} -> {}",
            applicant.user_id,
            garden.unit_number,
            application.status.label()
        );
        submitted.push(application);
    }

    services.applications.review(
        &manager,
        &submitted[0].id,
        review(ApplicationStatus::UnderReview, None),
        now,
    )?;
    let outcome = services.applications.review(
        &manager,
        &submitted[0].id,
        review(ApplicationStatus::Approved, Some("References verified.")),
        now,
    )?;
    if let Some(lease) = &outcome.lease {
        println!(
            "- Approved {}: lease {} at {} / month, deposit {}, ends {}",
            outcome.application.id,
            lease.id,
            money(lease.monthly_rent),
            money(lease.security_deposit),
            lease.end_date
        );
    }
    for rejected in &outcome.auto_rejected {
        println!("- Competing application {rejected} closed automatically");
    }

    println!("\nInvitations");
    let accepted_offer = services.invitations.invite_tenant(
        &manager,
        &corner.id,
        TenantInvite {
            email: "casey@tenants.demo".to_string(),
            name: "Casey Lin".to_string(),
            move_in_date: move_in,
            lease_duration_months: 6,
        },
        now,
    )?;
    println!(
        "- Reserved unit {} for {} until {}",
        accepted_offer.unit.unit_number, accepted_offer.tenant.email, accepted_offer.expires_at
    );
    let token = pending_token(&store, &accepted_offer.tenant.id)?;
    let accepted = services.invitations.accept_tenant_invitation(
        AcceptInvitation {
            token,
            password: Some("maple-court-demo".to_string()),
        },
        now + chrono::Duration::hours(3),
    )?;
    println!(
        "- {} accepted: lease {} at {} / month",
        accepted.tenant.email,
        accepted.lease.id,
        money(accepted.lease.monthly_rent)
    );

    let lapsing_offer = services.invitations.invite_tenant(
        &manager,
        &loft.id,
        TenantInvite {
            email: "drew@tenants.demo".to_string(),
            name: "Drew Patel".to_string(),
            move_in_date: move_in,
            lease_duration_months: 12,
        },
        now,
    )?;
    println!(
        "- Reserved unit {} for {} (left unanswered)",
        lapsing_offer.unit.unit_number, lapsing_offer.tenant.email
    );

    services.inventory.post_announcement(
        &manager,
        &property.id,
        "Window washing",
        "Crews on site Thursday morning.",
        now,
    )?;
    let request = services.inventory.open_maintenance_request(
        &manager,
        &property.id,
        Some(garden.id.clone()),
        "Replace smoke detector battery",
        now,
    )?;
    services
        .inventory
        .resolve_maintenance_request(&manager, &request.id, now)?;

    print_inventory(&services, &manager, &property.id)?;

    if skip_sweep {
        return Ok(());
    }

    let later = now + lifecycle.invitation_ttl + lifecycle.retention;
    println!("\nExpiry sweep at {later}");
    match services.sweeper.run_once(later) {
        Some(report) if json => match serde_json::to_string_pretty(&report) {
            Ok(body) => println!("{body}"),
            Err(err) => println!("  Sweep report unavailable: {err}"),
        },
        Some(report) => println!(
            "- {} maintenance requests and {} announcements retired; {} invitations expired, \
             {} units reclaimed, {} failures",
            report.maintenance_deleted,
            report.announcements_deleted,
            report.invitations_expired,
            report.units_reclaimed,
            report.failures.len()
        ),
        None => println!("- Another sweep is already running"),
    }
    print_inventory(&services, &manager, &property.id)?;

    println!("\nNotifications dispatched");
    for notification in notifier.sent() {
        println!(
            "  - {} -> {}",
            notification.template.label(),
            notification.recipient
        );
    }

    Ok(())
}

fn seed_account(
    store: &InMemoryTenancyStore,
    email: &str,
    name: &str,
    role: Role,
    now: DateTime<Utc>,
) -> Result<Actor, TenancyError> {
    let account = store.insert_user(User {
        id: UserId::generate(),
        email: email.to_string(),
        name: name.to_string(),
        role,
        active: true,
        password_hash: None,
        invitation: Invitation::None,
        created_at: now,
    })?;
    Ok(Actor::new(account.id, role))
}

fn add_unit(
    services: &DemoServices,
    manager: &Actor,
    property_id: &PropertyId,
    number: &str,
    annual_rent: u64,
) -> Result<Unit, TenancyError> {
    services.inventory.create_unit(
        manager,
        property_id,
        NewUnit {
            unit_number: number.to_string(),
            bedrooms: 2,
            annual_rent,
            under_maintenance: false,
        },
    )
}

fn review(status: ApplicationStatus, notes: Option<&str>) -> ReviewRequest {
    ReviewRequest {
        status,
        notes: notes.map(str::to_string),
        block: false,
        block_reason: None,
    }
}

/// Stands in for the invitee opening the link in their email.
fn pending_token(store: &InMemoryTenancyStore, user_id: &UserId) -> Result<String, TenancyError> {
    let user = store
        .fetch_user(user_id)?
        .ok_or_else(|| TenancyError::NotFound {
            entity: "user",
            id: user_id.to_string(),
        })?;
    user.invitation
        .pending()
        .map(|pending| pending.token.0.clone())
        .ok_or_else(|| TenancyError::Validation("invitation is no longer pending".to_string()))
}

fn print_inventory(
    services: &DemoServices,
    manager: &Actor,
    property_id: &PropertyId,
) -> Result<(), TenancyError> {
    let property = services.inventory.get_property(manager, property_id)?;
    println!("\n{} is {}", property.name, property.status.label());
    for unit in services.inventory.list_units(manager, property_id)? {
        let tenant = unit
            .current_tenant
            .as_ref()
            .map(|tenant| format!(" ({tenant})"))
            .unwrap_or_default();
        println!(
            "  - unit {}: {} at {} / year{}",
            unit.unit_number,
            unit.status.label(),
            money(unit.annual_rent),
            tenant
        );
    }
    Ok(())
}

fn money(minor_units: u64) -> String {
    format!("${}.{:02}", minor_units / 100, minor_units % 100)
}
