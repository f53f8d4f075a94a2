use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::access::{require_applicant, require_reviewer, require_role};
use super::domain::{
    Actor, Application, ApplicationId, ApplicationStatus, Lease, LeaseOrigin, Property,
    PropertyId, Role, UnitId, UnitStatus, UserId,
};
use super::error::TenancyError;
use super::leases::{LeaseIssuer, LeaseTerms};
use super::notify::{dispatch, Notification, NotificationTemplate, Notifier};
use super::store::TenancyStore;

const UNIT_TAKEN_NOTE: &str =
    "Automatically rejected: the unit has been leased to another applicant.";

/// Tenant-submitted request to lease a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRequest {
    pub unit_id: UnitId,
    pub move_in_date: NaiveDate,
    pub lease_duration_months: u32,
    #[serde(default)]
    pub message: Option<String>,
}

/// Reviewer input as received from the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub status: ApplicationStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub block: bool,
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// A validated review decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    StartReview,
    Approve,
    Reject { block_reason: Option<String> },
}

impl ReviewRequest {
    pub fn decision(&self) -> Result<ReviewDecision, TenancyError> {
        let block_reason = self
            .block_reason
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty());

        match (self.status, self.block) {
            (ApplicationStatus::Rejected, true) => match block_reason {
                Some(reason) => Ok(ReviewDecision::Reject {
                    block_reason: Some(reason.to_string()),
                }),
                None => Err(TenancyError::validation(
                    "a block reason is required when blocking a tenant",
                )),
            },
            (ApplicationStatus::Rejected, false) => {
                Ok(ReviewDecision::Reject { block_reason: None })
            }
            (_, true) => Err(TenancyError::validation(
                "only a rejection can block a tenant from the property",
            )),
            (ApplicationStatus::UnderReview, false) => Ok(ReviewDecision::StartReview),
            (ApplicationStatus::Approved, false) => Ok(ReviewDecision::Approve),
            (status, false) => Err(TenancyError::validation(format!(
                "reviewers cannot set status {}",
                status.label()
            ))),
        }
    }
}

/// Result of a review, including the side effects of an approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewOutcome {
    pub application: Application,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<Lease>,
    pub auto_rejected: Vec<ApplicationId>,
}

/// Application intake, review and withdrawal.
pub struct ApplicationService<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    leases: Arc<LeaseIssuer<S>>,
}

impl<S, N> ApplicationService<S, N>
where
    S: TenancyStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, leases: Arc<LeaseIssuer<S>>) -> Self {
        Self {
            store,
            notifier,
            leases,
        }
    }

    /// Submit a new application for a vacant unit.
    pub fn submit(
        &self,
        actor: &Actor,
        request: ApplicationRequest,
        now: DateTime<Utc>,
    ) -> Result<Application, TenancyError> {
        require_role(actor, Role::Tenant)?;
        if request.lease_duration_months == 0 {
            return Err(TenancyError::validation(
                "lease duration must be at least one month",
            ));
        }

        let unit = self
            .store
            .fetch_unit(&request.unit_id)?
            .ok_or_else(|| TenancyError::not_found("unit", &request.unit_id))?;
        if unit.status != UnitStatus::Vacant {
            return Err(TenancyError::conflict(format!(
                "unit {} is {} and not accepting applications",
                unit.id, unit.status
            )));
        }
        let property = self.load_property(&unit.property_id)?;

        let history: Vec<Application> = self
            .store
            .applications_for_property(&property.id)?
            .into_iter()
            .filter(|application| application.tenant == actor.user_id)
            .collect();
        if history.iter().any(|application| application.blocked_from_property) {
            return Err(TenancyError::conflict(format!(
                "tenant is blocked from applying to property {}",
                property.id
            )));
        }
        if let Some(open) = history.iter().find(|application| application.status.is_open()) {
            return Err(TenancyError::conflict(format!(
                "application {} for this property is still {}",
                open.id,
                open.status.label()
            )));
        }

        let application = Application {
            id: ApplicationId::generate(),
            tenant: actor.user_id.clone(),
            property_id: property.id.clone(),
            unit_id: unit.id.clone(),
            status: ApplicationStatus::Pending,
            move_in_date: request.move_in_date,
            lease_duration_months: request.lease_duration_months,
            message: request
                .message
                .map(|message| message.trim().to_string())
                .filter(|message| !message.is_empty()),
            review_notes: None,
            reviewed_by: None,
            reviewed_at: None,
            blocked_from_property: false,
            block_reason: None,
            submitted_at: now,
        };
        let application = self.store.insert_application(application)?;

        info!(
            application_id = %application.id,
            unit_id = %application.unit_id,
            tenant = %application.tenant,
            "application submitted"
        );
        self.notify_user(
            &property.property_manager,
            NotificationTemplate::ApplicationSubmitted,
            &application,
        );
        Ok(application)
    }

    /// Record a manager or homeowner decision.
    ///
    /// An approval issues the lease first and then rejects every other open application
    /// for the same unit.
    pub fn review(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        request: ReviewRequest,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, TenancyError> {
        let decision = request.decision()?;
        let application = self.load(application_id)?;
        let property = self.load_property(&application.property_id)?;
        require_reviewer(actor, &property)?;

        if !application.status.is_open() {
            return Err(TenancyError::conflict(format!(
                "application {} is already {}",
                application.id,
                application.status.label()
            )));
        }
        if decision == ReviewDecision::StartReview
            && application.status == ApplicationStatus::UnderReview
        {
            return Err(TenancyError::conflict(format!(
                "application {} is already under review",
                application.id
            )));
        }

        let notes = request
            .notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty());
        let mut reviewed = Application {
            review_notes: notes,
            reviewed_by: Some(actor.user_id.clone()),
            reviewed_at: Some(now),
            ..application
        };

        let mut lease = None;
        let mut auto_rejected = Vec::new();
        match decision {
            ReviewDecision::StartReview => reviewed.status = ApplicationStatus::UnderReview,
            ReviewDecision::Reject { block_reason } => {
                reviewed.status = ApplicationStatus::Rejected;
                reviewed.blocked_from_property = block_reason.is_some();
                reviewed.block_reason = block_reason;
            }
            ReviewDecision::Approve => {
                let unit = self
                    .store
                    .fetch_unit(&reviewed.unit_id)?
                    .ok_or_else(|| TenancyError::not_found("unit", &reviewed.unit_id))?;
                let terms = LeaseTerms {
                    tenant: reviewed.tenant.clone(),
                    property_id: reviewed.property_id.clone(),
                    unit_id: reviewed.unit_id.clone(),
                    move_in_date: reviewed.move_in_date,
                    lease_duration_months: reviewed.lease_duration_months,
                    annual_rent: unit.annual_rent,
                    origin: LeaseOrigin::Application {
                        application_id: reviewed.id.clone(),
                    },
                };
                lease = Some(self.leases.issue(terms, UnitStatus::Vacant, now)?);
                reviewed.status = ApplicationStatus::Approved;
            }
        }

        if let Err(error) = self.store.update_application(reviewed.clone()) {
            if let Some(lease) = &lease {
                // The lease already holds the unit; competitors cannot win it either way.
                error!(
                    application_id = %reviewed.id,
                    lease_id = %lease.id,
                    %error,
                    "lease issued but approval not recorded"
                );
                self.reject_competitors(&reviewed, now);
            }
            return Err(error.into());
        }
        info!(
            application_id = %reviewed.id,
            status = reviewed.status.label(),
            reviewer = %actor.user_id,
            "application reviewed"
        );
        self.notify_user(
            &reviewed.tenant,
            NotificationTemplate::ApplicationReviewed,
            &reviewed,
        );

        if reviewed.status == ApplicationStatus::Approved {
            auto_rejected = self.reject_competitors(&reviewed, now);
        }

        Ok(ReviewOutcome {
            application: reviewed,
            lease,
            auto_rejected,
        })
    }

    /// Close every other open application for the approved unit. Failures are logged
    /// per application so one bad record does not stop the rest.
    fn reject_competitors(
        &self,
        approved: &Application,
        now: DateTime<Utc>,
    ) -> Vec<ApplicationId> {
        let competitors = match self.store.applications_for_property(&approved.property_id) {
            Ok(applications) => applications,
            Err(error) => {
                error!(
                    application_id = %approved.id,
                    %error,
                    "could not load competing applications"
                );
                return Vec::new();
            }
        };

        let mut rejected = Vec::new();
        for competitor in competitors.into_iter().filter(|candidate| {
            candidate.id != approved.id
                && candidate.unit_id == approved.unit_id
                && candidate.status.is_open()
        }) {
            let closed = Application {
                status: ApplicationStatus::Rejected,
                review_notes: Some(UNIT_TAKEN_NOTE.to_string()),
                reviewed_by: None,
                reviewed_at: Some(now),
                ..competitor
            };
            match self.store.update_application(closed.clone()) {
                Ok(()) => {
                    self.notify_user(
                        &closed.tenant,
                        NotificationTemplate::ApplicationReviewed,
                        &closed,
                    );
                    rejected.push(closed.id);
                }
                Err(error) => {
                    error!(application_id = %closed.id, %error, "could not auto-reject application")
                }
            }
        }

        if !rejected.is_empty() {
            info!(
                unit_id = %approved.unit_id,
                count = rejected.len(),
                "competing applications rejected"
            );
        }
        rejected
    }

    /// Tenant withdraws an open application. The unit is untouched.
    pub fn withdraw(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        now: DateTime<Utc>,
    ) -> Result<Application, TenancyError> {
        let application = self.load(application_id)?;
        require_applicant(actor, &application)?;

        if !application.status.is_open() {
            return Err(TenancyError::conflict(format!(
                "application {} is already {}",
                application.id,
                application.status.label()
            )));
        }

        let withdrawn = Application {
            status: ApplicationStatus::Withdrawn,
            reviewed_at: Some(now),
            ..application
        };
        self.store.update_application(withdrawn.clone())?;
        info!(application_id = %withdrawn.id, "application withdrawn");
        Ok(withdrawn)
    }

    pub fn get(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<Application, TenancyError> {
        let application = self.load(application_id)?;
        if actor.role == Role::Tenant {
            require_applicant(actor, &application)?;
        } else {
            let property = self.load_property(&application.property_id)?;
            require_reviewer(actor, &property)?;
        }
        Ok(application)
    }

    pub fn list_for_property(
        &self,
        actor: &Actor,
        property_id: &PropertyId,
    ) -> Result<Vec<Application>, TenancyError> {
        let property = self.load_property(property_id)?;
        require_reviewer(actor, &property)?;
        Ok(self.store.applications_for_property(property_id)?)
    }

    fn load(&self, application_id: &ApplicationId) -> Result<Application, TenancyError> {
        self.store
            .fetch_application(application_id)?
            .ok_or_else(|| TenancyError::not_found("application", application_id))
    }

    fn load_property(&self, property_id: &PropertyId) -> Result<Property, TenancyError> {
        self.store
            .fetch_property(property_id)?
            .ok_or_else(|| TenancyError::not_found("property", property_id))
    }

    fn notify_user(
        &self,
        user_id: &UserId,
        template: NotificationTemplate,
        application: &Application,
    ) {
        let recipient = match self.store.fetch_user(user_id) {
            Ok(Some(user)) => user.email,
            Ok(None) => {
                warn!(%user_id, template = template.label(), "notification recipient missing");
                return;
            }
            Err(error) => {
                warn!(%user_id, %error, "could not resolve notification recipient");
                return;
            }
        };
        let notification = Notification::new(recipient, template)
            .detail("application_id", &application.id)
            .detail("unit_id", &application.unit_id)
            .detail("status", application.status.label());
        dispatch(self.notifier.as_ref(), notification);
    }
}
