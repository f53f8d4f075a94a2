use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_sequence(prefix: &str) -> String {
    let id = RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(next_sequence($prefix))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

record_id!(PropertyId, "prop");
record_id!(UnitId, "unit");
record_id!(
    /// Identifier wrapper for tenant applications.
    ApplicationId,
    "app"
);
record_id!(LeaseId, "lease");
record_id!(UserId, "user");
record_id!(MaintenanceRequestId, "mnt");
record_id!(AnnouncementId, "ann");

/// Account role. Each account carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Manager,
    Homeowner,
    Tenant,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Manager => "manager",
            Role::Homeowner => "homeowner",
            Role::Tenant => "tenant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The authenticated caller of an operation, as resolved by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFinancials {
    pub purchase_price: Option<u64>,
    pub annual_operating_costs: Option<u64>,
}

/// Rollup status of a property, derived from its units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Vacant,
    Occupied,
    Maintenance,
}

impl PropertyStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PropertyStatus::Vacant => "vacant",
            PropertyStatus::Occupied => "occupied",
            PropertyStatus::Maintenance => "maintenance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeownerInvitationStatus {
    None,
    Pending,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub name: String,
    pub address: Address,
    pub financials: PropertyFinancials,
    pub property_manager: UserId,
    pub homeowner: Option<UserId>,
    pub homeowner_invitation_status: HomeownerInvitationStatus,
    pub status: PropertyStatus,
    pub created_at: DateTime<Utc>,
}

impl Property {
    pub fn is_managed_by(&self, user_id: &UserId) -> bool {
        &self.property_manager == user_id
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        self.homeowner.as_ref() == Some(user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Vacant,
    Reserved,
    Occupied,
    Maintenance,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 4] = [
        UnitStatus::Vacant,
        UnitStatus::Reserved,
        UnitStatus::Occupied,
        UnitStatus::Maintenance,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            UnitStatus::Vacant => "vacant",
            UnitStatus::Reserved => "reserved",
            UnitStatus::Occupied => "occupied",
            UnitStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub property_id: PropertyId,
    pub unit_number: String,
    pub bedrooms: u8,
    /// Annual rent in minor currency units.
    pub annual_rent: u64,
    pub status: UnitStatus,
    pub current_tenant: Option<UserId>,
    pub current_lease: Option<LeaseId>,
}

/// Application lifecycle. `Approved`, `Rejected` and `Withdrawn` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    pub const fn is_open(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Pending | ApplicationStatus::UnderReview
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub tenant: UserId,
    pub property_id: PropertyId,
    pub unit_id: UnitId,
    pub status: ApplicationStatus,
    pub move_in_date: NaiveDate,
    pub lease_duration_months: u32,
    pub message: Option<String>,
    pub review_notes: Option<String>,
    /// `None` on a reviewed application means the system closed it.
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub blocked_from_property: bool,
    pub block_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Active,
    Expired,
    Terminated,
    Renewed,
}

impl LeaseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            LeaseStatus::Active => "active",
            LeaseStatus::Expired => "expired",
            LeaseStatus::Terminated => "terminated",
            LeaseStatus::Renewed => "renewed",
        }
    }
}

/// What produced a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeaseOrigin {
    Application { application_id: ApplicationId },
    Invitation { invitee: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub tenant: UserId,
    pub property_id: PropertyId,
    pub unit_id: UnitId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub monthly_rent: u64,
    pub security_deposit: u64,
    pub status: LeaseStatus,
    pub origin: LeaseOrigin,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Single-use secret handed to an invitee.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvitationToken(pub String);

impl InvitationToken {
    const LENGTH: usize = 40;

    pub fn generate() -> Self {
        let token = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::LENGTH)
            .map(char::from)
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lease offer carried by a tenant invitation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantOffer {
    pub unit_id: UnitId,
    pub property_id: PropertyId,
    pub move_in_date: NaiveDate,
    pub lease_duration_months: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum InvitationOffer {
    Homeowner { property_id: PropertyId },
    Tenant(TenantOffer),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInvitation {
    pub token: InvitationToken,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub offer: InvitationOffer,
}

impl PendingInvitation {
    pub fn has_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Invitation slot on an account. A user holds at most one pending invitation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Invitation {
    #[default]
    None,
    Pending(PendingInvitation),
    Expired { expired_at: DateTime<Utc> },
    Accepted { accepted_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationState {
    None,
    Pending,
    Expired,
    Accepted,
}

impl Invitation {
    pub fn pending(&self) -> Option<&PendingInvitation> {
        match self {
            Invitation::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    pub fn tenant_offer(&self) -> Option<&TenantOffer> {
        match self.pending() {
            Some(PendingInvitation {
                offer: InvitationOffer::Tenant(offer),
                ..
            }) => Some(offer),
            _ => None,
        }
    }

    /// Observed state at `now`; a pending invitation past its expiry reads as expired.
    pub fn state(&self, now: DateTime<Utc>) -> InvitationState {
        match self {
            Invitation::None => InvitationState::None,
            Invitation::Pending(pending) if pending.has_lapsed(now) => InvitationState::Expired,
            Invitation::Pending(_) => InvitationState::Pending,
            Invitation::Expired { .. } => InvitationState::Expired,
            Invitation::Accepted { .. } => InvitationState::Accepted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub active: bool,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub invitation: Invitation,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    Open,
    InProgress,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    pub id: MaintenanceRequestId,
    pub property_id: PropertyId,
    pub unit_id: Option<UnitId>,
    pub description: String,
    pub status: MaintenanceStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: AnnouncementId,
    pub property_id: PropertyId,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}
