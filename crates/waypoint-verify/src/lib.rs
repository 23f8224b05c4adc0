//! # waypoint-verify
//!
//! Tool result verification for the waypoint runtime.
//!
//! [`SchemaVerifier`] implements
//! [`ResultVerifier`](waypoint_core::traits::ResultVerifier). The dispatcher
//! runs it on every result a tool reports as successful; a failing report
//! turns the step into a failed step.

pub mod engine;

pub use engine::{CheckFn, SchemaVerifier};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use waypoint_contracts::error::WaypointError;
    use waypoint_core::traits::ResultVerifier;

    use super::SchemaVerifier;

    #[test]
    fn test_contract_pass() {
        let verifier = SchemaVerifier::new();
        let report = verifier.verify("anything", &json!({ "status": "success", "x": 1 })).unwrap();
        assert!(report.passed, "failures: {:?}", report.failures);
    }

    #[test]
    fn test_contract_violations() {
        let verifier = SchemaVerifier::new();
        for bad in [json!("ok"), json!({}), json!({ "status": "done" })] {
            let report = verifier.verify("anything", &bad).unwrap();
            assert!(!report.passed, "expected failure for {bad}");
            assert!(report.failures.iter().all(|f| f.rule_id == "result-contract"));
        }
    }

    #[test]
    fn test_action_schema() {
        let mut verifier = SchemaVerifier::new();
        verifier
            .register_schema(
                "create_payment",
                json!({
                    "type": "object",
                    "properties": { "payment_id": { "type": "string", "pattern": "^pay_[0-9a-f]{12}$" } },
                    "required": ["payment_id"]
                }),
            )
            .unwrap();

        let good = json!({ "status": "success", "payment_id": "pay_0123456789ab" });
        assert!(verifier.verify("create_payment", &good).unwrap().passed);

        let report = verifier.verify("create_payment", &json!({ "status": "success", "payment_id": "x" })).unwrap();
        assert!(!report.passed);
        assert_eq!(report.failures[0].rule_id, "json-schema");

        // Other actions are not affected.
        assert!(verifier.verify("noop", &json!({ "status": "success" })).unwrap().passed);
    }

    #[test]
    fn test_invalid_schema_is_a_config_error() {
        let mut verifier = SchemaVerifier::new();
        let result = verifier.register_schema("x", json!({ "type": 12 }));
        assert!(matches!(result, Err(WaypointError::ConfigError { .. })));
    }

    #[test]
    fn test_required_fields_and_checks() {
        let mut verifier = SchemaVerifier::new();
        verifier.require_fields("make_payment", &["transaction_id", "receipt.amount"]);
        verifier.register_check(
            "make_payment",
            "txn-prefix",
            Box::new(|result: &Value| match result["transaction_id"].as_str() {
                Some(id) if id.starts_with("TXN-") => None,
                _ => Some("transaction_id must start with TXN-".to_string()),
            }),
        );

        let report = verifier
            .verify("make_payment", &json!({ "status": "success", "transaction_id": "ABC" }))
            .unwrap();
        assert!(!report.passed);
        let rules: Vec<_> = report.failures.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(rules, ["required-field", "txn-prefix"]);
        assert!(report.summary().contains("receipt.amount"));

        let ok = json!({ "status": "success", "transaction_id": "TXN-10000", "receipt": { "amount": 10 } });
        assert!(verifier.verify("make_payment", &ok).unwrap().passed);
    }
}
