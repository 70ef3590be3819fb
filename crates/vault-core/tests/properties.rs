//! Property-Based Tests for signing and authorization invariants
//!
//! These tests verify for arbitrary inputs that:
//! 1. SIGNATURES: any well-formed assertion signed by a key verifies under
//!    that key and under no other
//! 2. INTEGRITY: altering any header after signing breaks verification
//! 3. ROLES: the role ordering is total and action minimums respect it
//!
//! Uses proptest for property-based testing with arbitrary inputs.

use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;
use vault_core::assertion::headers;
use vault_core::{Action, Assertion, AssertionKind, KeyPair, Principal, Role, SignedAssertion};

fn serial_assertion(
    brand: &str,
    model: &str,
    serial: &str,
    extra: BTreeMap<String, Value>,
) -> Assertion {
    Assertion::builder(AssertionKind::Serial)
        .header(headers::BRAND_ID, brand)
        .header(headers::MODEL, model)
        .header(headers::SERIAL, serial)
        .header(headers::DEVICE_KEY, "AcbBTQRWhcGAARAA")
        .extra_headers(extra)
        .build()
        .expect("required headers are present")
}

fn role_strategy() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Standard), Just(Role::Admin), Just(Role::Superuser)]
}

fn action_strategy() -> impl Strategy<Value = Action> {
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

// =============================================================================
// SIGNATURES
// =============================================================================

proptest! {
    /// A signed assertion verifies under the signing key and yields the same headers
    #[test]
    fn prop_signed_assertion_verifies(
        brand in "[a-z]{3,12}",
        model in "[a-z0-9-]{1,16}",
        serial in "[A-Z0-9]{4,20}",
        extra in prop::collection::btree_map("x-[a-z]{1,8}", "[a-z0-9]{1,8}", 0..4),
    ) {
        let extra = extra.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
        let assertion = serial_assertion(&brand, &model, &serial, extra);
        let kp = KeyPair::generate();

        let signed = kp.sign_assertion(&assertion).unwrap();
        let verified = kp.public_key().verify_assertion(&signed).unwrap();

        prop_assert_eq!(verified, assertion);
        prop_assert_eq!(signed.key_id(), Some(kp.key_id().to_string()));
    }

    /// Verification fails under any other key
    #[test]
    fn prop_other_key_rejects(
        brand in "[a-z]{3,12}",
        serial in "[A-Z0-9]{4,20}",
    ) {
        let assertion = serial_assertion(&brand, "m1", &serial, BTreeMap::new());
        let signer = KeyPair::generate();
        let other = KeyPair::generate();

        let signed = signer.sign_assertion(&assertion).unwrap();

        prop_assert!(other.public_key().verify_assertion(&signed).is_err());
    }
}

// =============================================================================
// INTEGRITY
// =============================================================================

proptest! {
    /// Swapping the payload for a different serial invalidates the signature
    #[test]
    fn prop_tampered_serial_rejected(
        serial in "[A-Z0-9]{4,20}",
        forged in "[A-Z0-9]{4,20}",
    ) {
        prop_assume!(serial != forged);
        let kp = KeyPair::generate();
        let signed = kp
            .sign_assertion(&serial_assertion("acme", "m1", &serial, BTreeMap::new()))
            .unwrap();

        let mut cose = signed.cose().clone();
        let tampered = serial_assertion("acme", "m1", &forged, BTreeMap::new());
        cose.payload = Some(tampered.to_bytes().unwrap());
        let bytes = coset_bytes(cose);
        let forged_signed = SignedAssertion::from_bytes(&bytes).unwrap();

        prop_assert!(kp.public_key().verify_assertion(&forged_signed).is_err());
    }
}

fn coset_bytes(cose: coset::CoseSign1) -> Vec<u8> {
    use coset::CborSerializable;
    cose.to_vec().unwrap()
}

// =============================================================================
// ROLES
// =============================================================================

proptest! {
    /// Role levels round-trip and order the same way as the enum
    #[test]
    fn prop_role_level_order(a in role_strategy(), b in role_strategy()) {
        prop_assert_eq!(Role::from_level(a.level()), Some(a));
        prop_assert_eq!(a.cmp(&b), a.level().cmp(&b.level()));
    }

    /// A role that meets an action minimum also meets it for every higher role
    #[test]
    fn prop_higher_role_never_loses_actions(
        role in role_strategy(),
        action in action_strategy(),
    ) {
        if role >= action.min_role() {
            prop_assert!(Role::Superuser >= action.min_role());
        }
        if action.is_mutation() {
            prop_assert!(action.min_role() >= Role::Admin);
        }
    }

    /// Only superusers act for accounts outside their set
    #[test]
    fn prop_membership_bypass_is_superuser_only(
        role in role_strategy(),
        member in prop::collection::btree_set(1i64..50, 0..5),
        account in 1i64..50,
    ) {
        let principal = Principal::user("someone", role).with_accounts(member.clone());
        let expected = role == Role::Superuser || member.contains(&account);
        prop_assert_eq!(principal.can_act_for(account), expected);
    }
}
