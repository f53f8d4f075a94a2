//! Tenancy lifecycle services.
//!
//! Services are synchronous and take `now` explicitly; the store is assumed to offer
//! per-record atomicity only, so multi-record operations order their writes so that a
//! partial failure never leaves a unit claiming a lease or invitation that does not exist.

pub(crate) mod access;
pub mod aggregator;
pub mod applications;
pub mod domain;
pub mod error;
pub mod inventory;
pub mod invitations;
pub mod leases;
pub mod memory;
pub mod notify;
pub(crate) mod password;
pub mod router;
pub mod store;
pub mod sweeper;

#[cfg(test)]
mod tests;

pub use aggregator::{derive_property_status, refresh_property_status};
pub use applications::{
    ApplicationRequest, ApplicationService, ReviewDecision, ReviewOutcome, ReviewRequest,
};
pub use domain::{
    Actor, Address, Announcement, AnnouncementId, Application, ApplicationId, ApplicationStatus,
    HomeownerInvitationStatus, Invitation, InvitationOffer, InvitationState, InvitationToken,
    Lease, LeaseId, LeaseOrigin, LeaseStatus, MaintenanceRequest, MaintenanceRequestId,
    MaintenanceStatus, PendingInvitation, Property, PropertyFinancials, PropertyId,
    PropertyStatus, Role, TenantOffer, Unit, UnitId, UnitStatus, User, UserId,
};
pub use error::{StoreError, TenancyError};
pub use inventory::{InventoryService, NewProperty, NewUnit, PropertyUpdate, UnitUpdate};
pub use invitations::{
    AcceptInvitation, HomeownerInvitationOutcome, HomeownerInvite, InvitationService,
    TenantInvitationAccepted, TenantInvitationIssued, TenantInvite,
};
pub use leases::{LeaseIssuer, LeaseTerms};
pub use memory::InMemoryTenancyStore;
pub use notify::{
    Notification, NotificationError, NotificationTemplate, Notifier, RecordingNotifier,
    TracingNotifier,
};
pub use router::{tenancy_router, TenancyServices, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
pub use store::TenancyStore;
pub use sweeper::{ExpirySweeper, SweepHandle, SweepReport};
