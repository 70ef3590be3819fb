//! Principals, roles and the actions they can be authorized for

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Role tiers, ordered from least to most privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum Role {
    /// Can read entities of its accounts and request signatures
    Standard = 100,
    /// Can additionally manage models, keypairs and sub-stores of its accounts
    Admin = 200,
    /// Acts for every account
    Superuser = 300,
}

impl Role {
    /// Numeric level, as stored in the users table
    pub fn level(self) -> u16 {
        self as u16
    }

    /// Parse a stored numeric level
    pub fn from_level(level: u16) -> Option<Self> {
        match level {
            100 => Some(Role::Standard),
            200 => Some(Role::Admin),
            300 => Some(Role::Superuser),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Standard => write!(f, "standard"),
            Role::Admin => write!(f, "admin"),
            Role::Superuser => write!(f, "superuser"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(Role::Standard),
            "admin" => Ok(Role::Admin),
            "superuser" => Ok(Role::Superuser),
            _ => Err(CoreError::UnknownRole(s.to_string())),
        }
    }
}

/// How the principal authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrincipalKind {
    /// An interactive user holding a session token
    User,
    /// An API caller presenting an API key
    ApiKey,
}

/// The authenticated caller of a request
///
/// Built by the authentication layer and immutable for the lifetime of the
/// request. It owns nothing persisted; it only carries the capabilities that
/// are checked at each operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Username or API key owner
    pub identity: String,

    /// Credential type the principal was resolved from
    pub kind: PrincipalKind,

    /// Role tier
    pub role: Role,

    /// IDs of the accounts this principal may act for
    #[serde(default)]
    pub accounts: BTreeSet<i64>,
}

impl Principal {
    /// Create a principal with no accounts
    pub fn new(identity: impl Into<String>, kind: PrincipalKind, role: Role) -> Self {
        Self {
            identity: identity.into(),
            kind,
            role,
            accounts: BTreeSet::new(),
        }
    }

    /// Create a user principal
    pub fn user(identity: impl Into<String>, role: Role) -> Self {
        Self::new(identity, PrincipalKind::User, role)
    }

    /// Create an API-key principal
    pub fn api_key(identity: impl Into<String>, role: Role) -> Self {
        Self::new(identity, PrincipalKind::ApiKey, role)
    }

    /// Set the account set (builder pattern)
    pub fn with_accounts(mut self, accounts: impl IntoIterator<Item = i64>) -> Self {
        self.accounts = accounts.into_iter().collect();
        self
    }

    /// Whether the principal bypasses account membership
    pub fn is_superuser(&self) -> bool {
        self.role == Role::Superuser
    }

    /// Whether the account is in the principal's account set
    pub fn is_member_of(&self, account_id: i64) -> bool {
        self.accounts.contains(&account_id)
    }

    /// Membership test honouring the Superuser bypass
    pub fn can_act_for(&self, account_id: i64) -> bool {
        self.is_superuser() || self.is_member_of(account_id)
    }
}

/// Actions that are gated by the permission evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    ReadAccounts,
    ManageAccounts,
    ReadModels,
    ManageModels,
    ReadKeypairs,
    ManageKeypairs,
    ReadSubstores,
    ManageSubstores,
    ReadSigningLog,
    SignAssertion,
}

impl Action {
    /// Minimum role needed for the action
    pub fn min_role(self) -> Role {
        match self {
            Action::ReadAccounts
            | Action::ReadModels
            | Action::ReadKeypairs
            | Action::ReadSubstores
            | Action::ReadSigningLog
            | Action::SignAssertion => Role::Standard,

            Action::ManageModels | Action::ManageKeypairs | Action::ManageSubstores => Role::Admin,

            Action::ManageAccounts => Role::Superuser,
        }
    }

    /// Whether the action changes persisted state
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Action::ManageAccounts
                | Action::ManageModels
                | Action::ManageKeypairs
                | Action::ManageSubstores
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::ReadAccounts => "read-accounts",
            Action::ManageAccounts => "manage-accounts",
            Action::ReadModels => "read-models",
            Action::ManageModels => "manage-models",
            Action::ReadKeypairs => "read-keypairs",
            Action::ManageKeypairs => "manage-keypairs",
            Action::ReadSubstores => "read-substores",
            Action::ManageSubstores => "manage-substores",
            Action::ReadSigningLog => "read-signing-log",
            Action::SignAssertion => "sign-assertion",
        };
        f.write_str(name)
    }
}
