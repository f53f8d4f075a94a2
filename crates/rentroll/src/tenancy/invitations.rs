//! Homeowner and tenant invitations.
//!
//! Both flows store the invitation on the invitee's account before touching inventory:
//! a unit is flipped to `reserved` only once the invitation that justifies the
//! reservation is persisted, and reverted to `vacant` before that invitation is cleared.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::access::require_manager;
use super::aggregator::refresh_property_status;
use super::domain::{
    Actor, HomeownerInvitationStatus, Invitation, InvitationOffer, InvitationState,
    InvitationToken, Lease, LeaseOrigin, PendingInvitation, Property, PropertyId, Role,
    TenantOffer, Unit, UnitId, UnitStatus, User, UserId,
};
use super::error::{StoreError, TenancyError};
use super::leases::{LeaseIssuer, LeaseTerms};
use super::notify::{dispatch, Notification, NotificationTemplate, Notifier};
use super::password::hash_password;
use super::store::TenancyStore;
use crate::config::LifecycleConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeownerInvite {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantInvite {
    pub email: String,
    pub name: String,
    pub move_in_date: NaiveDate,
    pub lease_duration_months: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptInvitation {
    pub token: String,
    /// Required when the invited account has never been activated.
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HomeownerInvitationOutcome {
    /// An active homeowner account was attached to the property directly.
    Assigned { property: Property, homeowner: User },
    /// The homeowner must accept a token before the assignment is confirmed.
    Invited {
        property: Property,
        homeowner: User,
        expires_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantInvitationIssued {
    pub tenant: User,
    pub unit: Unit,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantInvitationAccepted {
    pub tenant: User,
    pub lease: Lease,
}

/// Issues, redeems and revokes invitation tokens.
pub struct InvitationService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    leases: Arc<LeaseIssuer<S>>,
    lifecycle: LifecycleConfig,
}

impl<S, N> InvitationService<S, N>
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        leases: Arc<LeaseIssuer<S>>,
        lifecycle: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            leases,
            lifecycle,
        }
    }

    fn pending(&self, offer: InvitationOffer, now: DateTime<Utc>) -> PendingInvitation {
        PendingInvitation {
            token: InvitationToken::generate(),
            issued_at: now,
            expires_at: now + self.lifecycle.invitation_ttl,
            offer,
        }
    }

    /// Invite a homeowner to a property, or attach an already active homeowner directly.
    pub fn invite_homeowner(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
        invite: HomeownerInvite,
        now: DateTime<Utc>,
    ) -> Result<HomeownerInvitationOutcome, TenancyError> {
        let property = self.load_property(property_id)?;
        require_manager(actor, &property)?;
        if let Some(current) = &property.homeowner {
            if !self.homeowner_invitation_lapsed(&property, current, now)? {
                return Err(TenancyError::conflict(format!(
                    "property {} already has a homeowner",
                    property.id
                )));
            }
            info!(
                property_id = %property.id,
                homeowner = %current,
                "lapsed homeowner invitation released"
            );
        }
        let (email, name) = contact(&invite.email, &invite.name)?;

        let existing = self.store.find_user_by_email(&email)?;
        if let Some(user) = &existing {
            if user.role != Role::Homeowner {
                return Err(TenancyError::conflict(format!(
                    "{email} belongs to a {} account",
                    user.role
                )));
            }
        }

        match existing {
            Some(user) if user.active => {
                let property = self.assign_homeowner(
                    property,
                    &user.id,
                    HomeownerInvitationStatus::Accepted,
                )?;
                info!(property_id = %property.id, homeowner = %user.id, "homeowner assigned");
                dispatch(
                    self.notifier.as_ref(),
                    Notification::new(&user.email, NotificationTemplate::HomeownerPropertyAssigned)
                        .detail("property_id", &property.id)
                        .detail("property_name", &property.name),
                );
                Ok(HomeownerInvitationOutcome::Assigned {
                    property,
                    homeowner: user,
                })
            }
            existing => {
                let homeowner = match existing {
                    // An outstanding token keeps covering every property it is attached to.
                    Some(user) if has_live_invitation(&user, now) => user,
                    Some(user) => {
                        let reissued = User {
                            invitation: Invitation::Pending(self.pending(
                                InvitationOffer::Homeowner {
                                    property_id: property.id.clone(),
                                },
                                now,
                            )),
                            ..user
                        };
                        self.store.update_user(reissued.clone())?;
                        reissued
                    }
                    None => self.store.insert_user(User {
                        id: UserId::generate(),
                        email,
                        name,
                        role: Role::Homeowner,
                        active: false,
                        password_hash: None,
                        invitation: Invitation::Pending(self.pending(
                            InvitationOffer::Homeowner {
                                property_id: property.id.clone(),
                            },
                            now,
                        )),
                        created_at: now,
                    })?,
                };

                let Some(pending) = homeowner.invitation.pending().cloned() else {
                    return Err(TenancyError::conflict("homeowner invitation was not stored"));
                };
                let property = self.assign_homeowner(
                    property,
                    &homeowner.id,
                    HomeownerInvitationStatus::Pending,
                )?;

                info!(
                    property_id = %property.id,
                    homeowner = %homeowner.id,
                    expires_at = %pending.expires_at,
                    "homeowner invited"
                );
                dispatch(
                    self.notifier.as_ref(),
                    Notification::new(&homeowner.email, NotificationTemplate::HomeownerInvitation)
                        .detail("property_id", &property.id)
                        .detail("property_name", &property.name)
                        .detail("token", pending.token.as_str())
                        .detail("expires_at", pending.expires_at.to_rfc3339()),
                );
                Ok(HomeownerInvitationOutcome::Invited {
                    property,
                    homeowner,
                    expires_at: pending.expires_at,
                })
            }
        }
    }

    /// True when the property only holds a pending homeowner whose token has expired.
    fn homeowner_invitation_lapsed(
        &self,
        property: &Property,
        homeowner: &UserId,
        now: DateTime<Utc>,
    ) -> Result<bool, TenancyError> {
        if property.homeowner_invitation_status != HomeownerInvitationStatus::Pending {
            return Ok(false);
        }
        Ok(match self.store.fetch_user(homeowner)? {
            Some(user) => user.invitation.state(now) == InvitationState::Expired,
            None => true,
        })
    }

    fn assign_homeowner(
        &self,
        property: Property,
        homeowner: &UserId,
        status: HomeownerInvitationStatus,
    ) -> Result<Property, TenancyError> {
        let assigned = Property {
            homeowner: Some(homeowner.clone()),
            homeowner_invitation_status: status,
            ..property
        };
        self.store.update_property(assigned.clone())?;
        Ok(assigned)
    }

    /// Redeem a homeowner token: activate the account and confirm every pending property.
    pub fn accept_homeowner_invitation(
        &self,
        request: AcceptInvitation,
        now: DateTime<Utc>,
    ) -> Result<User, TenancyError> {
        let (user, pending) = self.redeemable(&request.token, now)?;
        if user.role != Role::Homeowner
            || !matches!(pending.offer, InvitationOffer::Homeowner { .. })
        {
            return Err(TenancyError::validation(
                "token does not belong to a homeowner invitation",
            ));
        }
        let password_hash = self.password_for(&user, request.password.as_deref())?;

        let activated = User {
            active: true,
            password_hash,
            invitation: Invitation::Accepted { accepted_at: now },
            ..user
        };
        self.store.update_user(activated.clone())?;

        for property in self.store.properties_for_homeowner(&activated.id)? {
            if property.homeowner_invitation_status != HomeownerInvitationStatus::Pending {
                continue;
            }
            let property_id = property.id.clone();
            let confirmed = Property {
                homeowner_invitation_status: HomeownerInvitationStatus::Accepted,
                ..property
            };
            if let Err(error) = self.store.update_property(confirmed) {
                error!(
                    %property_id,
                    homeowner = %activated.id,
                    %error,
                    "could not confirm homeowner"
                );
            }
        }

        info!(homeowner = %activated.id, "homeowner invitation accepted");
        Ok(activated)
    }

    /// Invite a tenant into a vacant unit, reserving it for the invitation's lifetime.
    pub fn invite_tenant(
        &self,
        actor: &Actor,
        unit_id: &UnitId,
        invite: TenantInvite,
        now: DateTime<Utc>,
    ) -> Result<TenantInvitationIssued, TenancyError> {
        let unit = self.load_unit(unit_id)?;
        let property = self.load_property(&unit.property_id)?;
        require_manager(actor, &property)?;

        if invite.lease_duration_months == 0 {
            return Err(TenancyError::validation(
                "lease duration must be at least one month",
            ));
        }
        if unit.status != UnitStatus::Vacant {
            return Err(TenancyError::conflict(format!(
                "unit {} is {} and cannot be reserved",
                unit.id, unit.status
            )));
        }
        let (email, name) = contact(&invite.email, &invite.name)?;

        let offer = InvitationOffer::Tenant(TenantOffer {
            unit_id: unit.id.clone(),
            property_id: property.id.clone(),
            move_in_date: invite.move_in_date,
            lease_duration_months: invite.lease_duration_months,
        });
        let pending = self.pending(offer, now);

        let (tenant, previous) = match self.store.find_user_by_email(&email)? {
            Some(user) => {
                self.ensure_invitable(&user)?;
                let previous = user.invitation.clone();
                let invited = User {
                    invitation: Invitation::Pending(pending.clone()),
                    ..user
                };
                self.store.update_user(invited.clone())?;
                (invited, Some(previous))
            }
            None => {
                let invited = self.store.insert_user(User {
                    id: UserId::generate(),
                    email,
                    name,
                    role: Role::Tenant,
                    active: false,
                    password_hash: None,
                    invitation: Invitation::Pending(pending.clone()),
                    created_at: now,
                })?;
                (invited, None)
            }
        };

        // The invitation is stored; only now may the unit show as reserved.
        let reserved = Unit {
            status: UnitStatus::Reserved,
            ..unit
        };
        if let Err(failure) = self
            .store
            .compare_and_set_unit(reserved.clone(), UnitStatus::Vacant)
        {
            self.withdraw_invitation(tenant, previous.unwrap_or_default());
            return Err(failure.into());
        }
        refresh_property_status(self.store.as_ref(), &property.id);

        info!(
            unit_id = %reserved.id,
            tenant = %tenant.id,
            expires_at = %pending.expires_at,
            "tenant invited"
        );
        dispatch(
            self.notifier.as_ref(),
            Notification::new(&tenant.email, NotificationTemplate::TenantInvitation)
                .detail("unit_id", &reserved.id)
                .detail("unit_number", &reserved.unit_number)
                .detail("property_name", &property.name)
                .detail("token", pending.token.as_str())
                .detail("expires_at", pending.expires_at.to_rfc3339()),
        );

        Ok(TenantInvitationIssued {
            tenant,
            unit: reserved,
            expires_at: pending.expires_at,
        })
    }

    fn ensure_invitable(&self, user: &User) -> Result<(), TenancyError> {
        if user.role != Role::Tenant {
            return Err(TenancyError::conflict(format!(
                "{} belongs to a {} account",
                user.email, user.role
            )));
        }
        // A lapsed but unswept invitation still holds its unit, so it counts as outstanding.
        if user.invitation.pending().is_some() {
            return Err(TenancyError::conflict(format!(
                "{} already holds an outstanding invitation",
                user.email
            )));
        }
        if self.leases.active_lease_for(&user.id)?.is_some() {
            return Err(TenancyError::conflict(format!(
                "{} already holds an active lease",
                user.email
            )));
        }
        Ok(())
    }

    fn withdraw_invitation(&self, user: User, restored: Invitation) {
        let user_id = user.id.clone();
        let reverted = User {
            invitation: restored,
            ..user
        };
        if let Err(error) = self.store.update_user(reverted) {
            error!(%user_id, %error, "could not clear invitation after reservation failed");
        }
    }

    /// Redeem a tenant token: issue the lease against the reserved unit and activate
    /// the account.
    pub fn accept_tenant_invitation(
        &self,
        request: AcceptInvitation,
        now: DateTime<Utc>,
    ) -> Result<TenantInvitationAccepted, TenancyError> {
        let (user, pending) = self.redeemable(&request.token, now)?;
        let offer = match (&pending.offer, user.role) {
            (InvitationOffer::Tenant(offer), Role::Tenant) => offer.clone(),
            _ => {
                return Err(TenancyError::validation(
                    "token does not belong to a tenant invitation",
                ))
            }
        };
        // Hash before any inventory write so a rejected password leaves nothing behind.
        let password_hash = self.password_for(&user, request.password.as_deref())?;

        let unit = self.load_unit(&offer.unit_id)?;
        if unit.status != UnitStatus::Reserved {
            return Err(TenancyError::conflict(format!(
                "unit {} is no longer reserved for this invitation",
                unit.id
            )));
        }

        let terms = LeaseTerms {
            tenant: user.id.clone(),
            property_id: offer.property_id.clone(),
            unit_id: offer.unit_id.clone(),
            move_in_date: offer.move_in_date,
            lease_duration_months: offer.lease_duration_months,
            annual_rent: unit.annual_rent,
            origin: LeaseOrigin::Invitation {
                invitee: user.id.clone(),
            },
        };
        let lease = self.leases.issue(terms, UnitStatus::Reserved, now)?;

        let tenant = User {
            active: true,
            password_hash,
            invitation: Invitation::Accepted { accepted_at: now },
            ..user
        };
        self.store.update_user(tenant.clone())?;

        info!(tenant = %tenant.id, lease_id = %lease.id, "tenant invitation accepted");
        dispatch(
            self.notifier.as_ref(),
            Notification::new(&tenant.email, NotificationTemplate::LeaseIssued)
                .detail("lease_id", &lease.id)
                .detail("start_date", lease.start_date)
                .detail("end_date", lease.end_date)
                .detail("monthly_rent", lease.monthly_rent),
        );

        Ok(TenantInvitationAccepted { tenant, lease })
    }

    /// Revoke an outstanding tenant invitation and release its unit.
    pub fn cancel_tenant_invitation(
        &self,
        actor: &Actor,
        tenant_id: &UserId,
    ) -> Result<User, TenancyError> {
        let user = self
            .store
            .fetch_user(tenant_id)?
            .ok_or_else(|| TenancyError::not_found("user", tenant_id))?;
        let Some(offer) = user.invitation.tenant_offer().cloned() else {
            return Err(TenancyError::conflict(format!(
                "{tenant_id} has no outstanding tenant invitation"
            )));
        };
        let property = self.load_property(&offer.property_id)?;
        require_manager(actor, &property)?;

        release_reserved_unit(self.store.as_ref(), &offer.unit_id)?;

        let cleared = User {
            invitation: Invitation::None,
            ..user
        };
        self.store.update_user(cleared.clone())?;
        info!(tenant = %cleared.id, unit_id = %offer.unit_id, "tenant invitation cancelled");
        Ok(cleared)
    }

    fn redeemable(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<(User, PendingInvitation), TenancyError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TenancyError::validation("invitation token is required"));
        }
        let user = self
            .store
            .find_user_by_invitation_token(token)?
            .ok_or_else(|| TenancyError::not_found("invitation", "token"))?;
        let pending = user
            .invitation
            .pending()
            .cloned()
            .ok_or_else(|| TenancyError::not_found("invitation", "token"))?;
        if pending.has_lapsed(now) {
            warn!(
                user_id = %user.id,
                expired_at = %pending.expires_at,
                "expired invitation presented"
            );
            return Err(TenancyError::validation("invitation has expired"));
        }
        Ok((user, pending))
    }

    fn password_for(
        &self,
        user: &User,
        password: Option<&str>,
    ) -> Result<Option<String>, TenancyError> {
        match password {
            Some(password) => hash_password(password).map(Some),
            None if user.active => Ok(user.password_hash.clone()),
            None => Err(TenancyError::validation(
                "a password is required to activate the account",
            )),
        }
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

/// Move a reserved unit back to vacant and refresh its property.
///
/// Returns whether a reservation was released; a unit that is gone or no longer
/// reserved is left alone.
pub(crate) fn release_reserved_unit<S>(store: &S, unit_id: &UnitId) -> Result<bool, StoreError>
where
    S: TenancyStore + ?Sized,
{
    let Some(unit) = store.fetch_unit(unit_id)? else {
        return Ok(false);
    };
    if unit.status != UnitStatus::Reserved {
        return Ok(false);
    }

    let property_id = unit.property_id.clone();
    let released = Unit {
        status: UnitStatus::Vacant,
        current_tenant: None,
        current_lease: None,
        ..unit
    };
    match store.compare_and_set_unit(released, UnitStatus::Reserved) {
        Ok(()) => {
            refresh_property_status(store, &property_id);
            Ok(true)
        }
        Err(StoreError::UnitStatusMismatch { .. }) => Ok(false),
        Err(other) => Err(other),
    }
}

fn has_live_invitation(user: &User, now: DateTime<Utc>) -> bool {
    user.invitation
        .pending()
        .is_some_and(|pending| !pending.has_lapsed(now))
}

fn contact(email: &str, name: &str) -> Result<(String, String), TenancyError> {
    let email = email.trim().to_ascii_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(TenancyError::validation(format!(
            "{email:?} is not a valid email address"
        )));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(TenancyError::validation("invitee name is required"));
    }
    Ok((email, name.to_string()))
}
