//! Simulated banking tools for the waypoint reference runtime.
//!
//! All data in this module is hardcoded and fictional. No external systems
//! are contacted. Each tool honours the tool contract: a JSON object whose
//! `status` is `success` or `failed`, plus tool-specific fields.

use std::sync::Arc;

use serde_json::{json, Value};

use waypoint_contracts::{
    error::{WaypointError, WaypointResult},
    plan::Params,
};
use waypoint_core::{dispatch::ToolRegistry, traits::Tool};
use waypoint_policy::rule::parse_amount;

/// Amounts above this fail `make_payment` with `amount_exceeds_authorization_limit`.
pub const AUTHORIZATION_LIMIT: f64 = 1000.0;

/// Account used when a request does not name one.
pub const DEMO_ACCOUNT: &str = "12345678";

// ── Helpers ──────────────────────────────────────────────────────────────────

fn amount_param(params: &Params) -> WaypointResult<f64> {
    params
        .get("amount")
        .and_then(parse_amount)
        .ok_or_else(|| WaypointError::ToolFailed {
            reason: "amount is missing or not a number".to_string(),
        })
}

fn str_param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn failed(reason: &str) -> Value {
    json!({ "status": "failed", "reason": reason })
}

// ── create_payment ───────────────────────────────────────────────────────────

/// Creates a domestic payment. Only GBP is supported.
///
/// Invalid requests are reported as errors from inside the tool, the way an
/// upstream payments API would reject them.
pub struct CreatePayment;

impl Tool for CreatePayment {
    fn name(&self) -> &str {
        "create_payment"
    }

    fn invoke(&self, params: &Params) -> WaypointResult<Value> {
        let amount = amount_param(params)?;
        if amount <= 0.0 {
            return Err(WaypointError::ToolFailed {
                reason: "Amount must be > 0".to_string(),
            });
        }
        let currency = str_param(params, "currency").unwrap_or("GBP");
        if !currency.eq_ignore_ascii_case("GBP") {
            return Err(WaypointError::ToolFailed {
                reason: "Only GBP supported in demo".to_string(),
            });
        }

        let hex = uuid::Uuid::new_v4().simple().to_string();
        let payment_id = format!("pay_{}", &hex[..12]);
        Ok(json!({
            "status": "success",
            "payment_id": payment_id,
            "amount": amount,
            "currency": "GBP",
        }))
    }
}

// ── make_payment ─────────────────────────────────────────────────────────────

/// Moves money between accounts once the payment has been approved.
pub struct MakePayment;

impl Tool for MakePayment {
    fn name(&self) -> &str {
        "make_payment"
    }

    fn invoke(&self, params: &Params) -> WaypointResult<Value> {
        let approved = params.get("approved").and_then(Value::as_bool).unwrap_or(false);
        if !approved {
            return Ok(failed("approval_required"));
        }
        let amount = amount_param(params)?;
        if amount > AUTHORIZATION_LIMIT {
            return Ok(failed("amount_exceeds_authorization_limit"));
        }
        Ok(json!({
            "status": "success",
            "transaction_id": format!("TXN-{}", (amount * 1000.0).round() as i64),
            "amount": amount,
        }))
    }
}

// ── confirm_transaction ──────────────────────────────────────────────────────

pub struct ConfirmTransaction;

impl Tool for ConfirmTransaction {
    fn name(&self) -> &str {
        "confirm_transaction"
    }

    fn invoke(&self, _params: &Params) -> WaypointResult<Value> {
        Ok(json!({ "status": "success", "message": "confirmed" }))
    }
}

// ── get_statement ────────────────────────────────────────────────────────────

/// Returns a short fake statement for `account_id` covering `months`.
pub struct GetStatement;

impl Tool for GetStatement {
    fn name(&self) -> &str {
        "get_statement"
    }

    fn invoke(&self, params: &Params) -> WaypointResult<Value> {
        let account_id = str_param(params, "account_id").unwrap_or(DEMO_ACCOUNT);
        let months = params.get("months").and_then(Value::as_u64).unwrap_or(1);
        Ok(json!({
            "status": "success",
            "account_id": account_id,
            "period_months": months,
            "transactions": [
                { "id": "t1", "amount": -12.5, "desc": "Coffee" },
                { "id": "t2", "amount": -120.0, "desc": "Grocery" },
            ],
        }))
    }
}

// ── check_balance ────────────────────────────────────────────────────────────

pub struct CheckBalance;

impl Tool for CheckBalance {
    fn name(&self) -> &str {
        "check_balance"
    }

    fn invoke(&self, _params: &Params) -> WaypointResult<Value> {
        Ok(json!({
            "status": "success",
            "account_number": DEMO_ACCOUNT,
            "balance": 1250.0,
            "currency": "GBP",
        }))
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Look up a banking tool by the name an agent configuration uses.
pub fn banking_tool(name: &str) -> Option<Arc<dyn Tool>> {
    let tool: Arc<dyn Tool> = match name {
        "create_payment" => Arc::new(CreatePayment),
        "make_payment" => Arc::new(MakePayment),
        "confirm_transaction" => Arc::new(ConfirmTransaction),
        "get_statement" => Arc::new(GetStatement),
        "check_balance" => Arc::new(CheckBalance),
        _ => return None,
    };
    Some(tool)
}

/// A registry holding the named banking tools plus the built-in `noop`.
///
/// # Errors
///
/// `ConfigError` when a name does not correspond to a banking tool.
pub fn registry_for(names: &[String]) -> WaypointResult<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for name in names {
        let tool = banking_tool(name).ok_or_else(|| WaypointError::ConfigError {
            reason: format!("unknown tool '{name}'"),
        })?;
        registry.register(tool);
    }
    Ok(registry)
}
