use super::domain::{Actor, Application, Property, Role};
use super::error::TenancyError;

pub(crate) fn require_role(actor: &Actor, role: Role) -> Result<(), TenancyError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(TenancyError::unauthorized(format!(
            "{} accounts cannot perform this action",
            actor.role
        )))
    }
}

pub(crate) fn require_manager(actor: &Actor, property: &Property) -> Result<(), TenancyError> {
    if actor.role == Role::Manager && property.is_managed_by(&actor.user_id) {
        Ok(())
    } else {
        Err(TenancyError::unauthorized(format!(
            "{} does not manage property {}",
            actor.user_id, property.id
        )))
    }
}

/// Managers and the assigned homeowner may review and read a property's pipeline.
pub(crate) fn require_reviewer(actor: &Actor, property: &Property) -> Result<(), TenancyError> {
    let allowed = match actor.role {
        Role::Manager => property.is_managed_by(&actor.user_id),
        Role::Homeowner => property.is_owned_by(&actor.user_id),
        Role::Tenant => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(TenancyError::unauthorized(format!(
            "{} has no relationship to property {}",
            actor.user_id, property.id
        )))
    }
}

pub(crate) fn require_applicant(
    actor: &Actor,
    application: &Application,
) -> Result<(), TenancyError> {
    if actor.role == Role::Tenant && application.tenant == actor.user_id {
        Ok(())
    } else {
        Err(TenancyError::unauthorized(format!(
            "application {} belongs to another tenant",
            application.id
        )))
    }
}
