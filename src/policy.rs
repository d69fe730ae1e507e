use crate::{auth::Principal, error::AppError, models::Advertisement};

/// A mutating operation subject to the ownership rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Permitted,
    Forbidden,
}

/// authorize
///
/// Only the creator may update or delete an advertisement. Pure; the rule is
/// currently the same for every `Operation`.
///
/// Callers must have loaded `advertisement` first (absent records are
/// `NotFound`, never `Forbidden`) and must not mutate anything before this
/// returns `Permitted`.
pub fn authorize(principal: &Principal, advertisement: &Advertisement, _operation: Operation) -> Decision {
    if principal.username == advertisement.creator {
        Decision::Permitted
    } else {
        Decision::Forbidden
    }
}

/// `authorize` as a `Result`, for use with `?` in handlers.
pub fn ensure_owner(
    principal: &Principal,
    advertisement: &Advertisement,
    operation: Operation,
) -> Result<(), AppError> {
    match authorize(principal, advertisement, operation) {
        Decision::Permitted => Ok(()),
        Decision::Forbidden => {
            tracing::warn!(
                user = %principal.username,
                advertisement_id = advertisement.id,
                ?operation,
                "ownership check denied"
            );
            Err(AppError::Forbidden(advertisement.id))
        }
    }
}
