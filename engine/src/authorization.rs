use optionpool_types::{CompanyId, OptionGrant, RuleViolation, UserId};

use crate::collaborators::Directory;
use crate::error::EngineResult;

/// Allow `actor` when they are the grant's linked grantee or an admin of the
/// company that owns the grant's plan.
pub fn authorize_grantee_or_admin(
    directory: &dyn Directory,
    company_id: CompanyId,
    grant: &OptionGrant,
    actor: UserId,
) -> EngineResult<()> {
    if let Some(shareholder_id) = grant.shareholder_id
        && directory.shareholder_linked_to_user(shareholder_id, actor)?
    {
        return Ok(());
    }
    if directory.is_admin(company_id, actor)? {
        return Ok(());
    }
    Err(RuleViolation::NotGrantee.into())
}
