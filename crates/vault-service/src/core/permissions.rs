//! Permission evaluator
//!
//! Every operation that reads or mutates account-scoped state goes through
//! [`authorize`]. The rule is the same for users and API keys:
//!
//! - the principal's role must be at least the action's minimum role, and
//! - the target account must be in the principal's account set, unless the
//!   principal is a Superuser
//!
//! The Superuser bypass skips the membership check only, never the role check.

use thiserror::Error;
use tracing::warn;
use vault_core::{Action, Principal, Role};

/// Why an authorization check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The principal's role is below the action's minimum
    InsufficientRole { required: Role, actual: Role },
    /// The account is outside the principal's account set
    NotAMember,
}

/// Error returned when a principal may not perform an action
///
/// This is a SECURITY-RELEVANT error; every denial is logged.
#[derive(Error, Debug, Clone)]
#[error("{identity} may not {action}{}", account_suffix(.account_id))]
pub struct PermissionDenied {
    pub identity: String,
    pub action: Action,
    pub account_id: Option<i64>,
    pub reason: DenialReason,
}

fn account_suffix(account_id: &Option<i64>) -> String {
    account_id
        .map(|id| format!(" on account {}", id))
        .unwrap_or_default()
}

fn check_role(principal: &Principal, action: Action, account_id: Option<i64>) -> Result<(), PermissionDenied> {
    let required = action.min_role();
    if principal.role >= required {
        return Ok(());
    }

    warn!(
        principal = %principal.identity,
        action = %action,
        mutation = action.is_mutation(),
        account_id = ?account_id,
        required = %required,
        actual = %principal.role,
        "SECURITY: Permission denied, insufficient role"
    );
    Err(PermissionDenied {
        identity: principal.identity.clone(),
        action,
        account_id,
        reason: DenialReason::InsufficientRole {
            required,
            actual: principal.role,
        },
    })
}

/// Authorize an action against a specific account
///
/// # Security
/// Must be called before any state is touched on behalf of the account.
pub fn authorize(principal: &Principal, action: Action, account_id: i64) -> Result<(), PermissionDenied> {
    check_role(principal, action, Some(account_id))?;

    if principal.can_act_for(account_id) {
        return Ok(());
    }

    warn!(
        principal = %principal.identity,
        action = %action,
        mutation = action.is_mutation(),
        account_id,
        "SECURITY: Permission denied, account outside principal's set"
    );
    Err(PermissionDenied {
        identity: principal.identity.clone(),
        action,
        account_id: Some(account_id),
        reason: DenialReason::NotAMember,
    })
}

/// Authorize an action that is not tied to one account (listing, account creation)
///
/// Only the role is checked; callers must still filter results to the
/// principal's accounts.
pub fn authorize_role(principal: &Principal, action: Action) -> Result<(), PermissionDenied> {
    check_role(principal, action, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_with_role_allowed() {
        let admin = Principal::user("a", Role::Admin).with_accounts([7]);
        assert!(authorize(&admin, Action::ManageSubstores, 7).is_ok());
        assert!(authorize(&admin, Action::ReadSubstores, 7).is_ok());
    }

    #[test]
    fn test_non_member_denied() {
        let admin = Principal::user("a", Role::Admin).with_accounts([9]);
        let err = authorize(&admin, Action::ManageSubstores, 7).unwrap_err();
        assert_eq!(err.reason, DenialReason::NotAMember);
        assert_eq!(err.account_id, Some(7));
    }

    #[test]
    fn test_role_below_minimum_denied() {
        let standard = Principal::user("s", Role::Standard).with_accounts([7]);
        let err = authorize(&standard, Action::ManageKeypairs, 7).unwrap_err();
        assert!(matches!(
            err.reason,
            DenialReason::InsufficientRole {
                required: Role::Admin,
                actual: Role::Standard
            }
        ));
        assert!(authorize(&standard, Action::SignAssertion, 7).is_ok());
    }

    #[test]
    fn test_superuser_bypasses_membership() {
        let root = Principal::user("root", Role::Superuser);
        assert!(authorize(&root, Action::ManageSubstores, 42).is_ok());
        assert!(authorize_role(&root, Action::ManageAccounts).is_ok());
    }

    #[test]
    fn test_account_creation_requires_superuser() {
        let admin = Principal::user("a", Role::Admin).with_accounts([7]);
        assert!(authorize_role(&admin, Action::ManageAccounts).is_err());
        assert!(authorize(&admin, Action::ManageAccounts, 7).is_err());
    }

    #[test]
    fn test_api_key_principal_same_rule() {
        let key = Principal::api_key("bot", Role::Standard).with_accounts([7]);
        assert!(authorize(&key, Action::SignAssertion, 7).is_ok());
        assert!(authorize(&key, Action::SignAssertion, 8).is_err());
    }

    #[test]
    fn test_denial_message() {
        let admin = Principal::user("alice", Role::Admin).with_accounts([9]);
        let err = authorize(&admin, Action::ManageSubstores, 7).unwrap_err();
        assert_eq!(err.to_string(), "alice may not manage-substores on account 7");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn role() -> impl Strategy<Value = Role> {
            prop_oneof![Just(Role::Standard), Just(Role::Admin), Just(Role::Superuser)]
        }

        fn action() -> impl Strategy<Value = Action> {
            prop_oneof![
                Just(Action::ReadAccounts),
                Just(Action::ManageAccounts),
                Just(Action::ReadModels),
                Just(Action::ManageModels),
                Just(Action::ReadKeypairs),
                Just(Action::ManageKeypairs),
                Just(Action::ReadSubstores),
                Just(Action::ManageSubstores),
                Just(Action::ReadSigningLog),
                Just(Action::SignAssertion),
            ]
        }

        proptest! {
            #[test]
            fn prop_authorize_is_role_and_membership(
                role in role(),
                action in action(),
                accounts in proptest::collection::btree_set(0i64..8, 0..4),
                target in 0i64..8,
            ) {
                let principal = Principal::user("p", role).with_accounts(accounts.iter().copied());
                let expected = role >= action.min_role()
                    && (role == Role::Superuser || accounts.contains(&target));
                prop_assert_eq!(authorize(&principal, action, target).is_ok(), expected);
            }
        }
    }
}
