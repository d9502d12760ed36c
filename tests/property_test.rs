use proptest::prelude::*;

use pardaaf_core::auth::{CredentialService, Principal};
use pardaaf_core::db::catalog::is_valid_codename;
use pardaaf_core::services::fx::adjusted_rate;

proptest! {
    #[test]
    fn credential_round_trip_for_any_principal(
        user_id in 1i64..1_000_000,
        username in "[a-z][a-z0-9_]{0,15}",
        level in 1u8..=5,
        tenant in "[a-z][a-z0-9_]{0,15}",
    ) {
        let service = CredentialService::new("prop-secret");
        let principal = Principal { user_id, username, level, tenant };
        let pair = service.issue_pair(&principal).unwrap();
        let verified = service.verify_access(&pair.access_token, 1).unwrap();
        prop_assert_eq!(verified, principal);
    }

    #[test]
    fn non_afn_rates_pass_through_unchanged(
        rate in 0.0001f64..100_000.0,
        quote in "[A-Z]{3}",
    ) {
        prop_assume!(quote != "AFN");
        prop_assert_eq!(adjusted_rate(&quote, rate), rate);
    }

    #[test]
    fn afn_adjustment_is_exactly_minus_two_and_a_half_percent(
        rate in 0.0001f64..100_000.0,
    ) {
        let adjusted = adjusted_rate("AFN", rate);
        prop_assert!((adjusted - rate * 0.975).abs() < 1e-9 * rate.max(1.0));
        prop_assert!(adjusted < rate);
    }

    #[test]
    fn valid_codenames_are_accepted(codename in "[a-z][a-z0-9_]{0,30}") {
        prop_assert!(is_valid_codename(&codename));
    }

    #[test]
    fn uppercase_or_spaced_codenames_are_rejected(
        codename in "[A-Z][a-zA-Z ]{0,10}",
    ) {
        prop_assert!(!is_valid_codename(&codename));
    }
}
