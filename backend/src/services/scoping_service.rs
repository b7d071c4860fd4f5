//! Scoping calculator.
//!
//! A package's price and timeline start from its base values. Every active
//! rule whose condition matches the visitor's quiz answers is then applied in
//! priority order (lowest first): fixed rules add cents, percent rules scale
//! the running price. Timeline deltas add weeks. Both totals are floored at 0
//! after each step.

use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::package::Package;
use crate::models::scoping::{AdjustmentType, RuleOperator, ScopingFactor, ScopingRule};

/// Quiz answers keyed by factor key.
pub type ScopingInputs = Map<String, Value>;

/// One applied rule in a calculation.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AppliedAdjustment {
    pub rule_id: Uuid,
    pub factor_key: String,
    pub description: Option<String>,
    pub price_delta_cents: i64,
    pub timeline_delta_weeks: i32,
    pub running_price_cents: i64,
    pub running_timeline_weeks: i32,
}

/// Result of pricing a package against a set of answers.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ScopingResult {
    pub package_id: Uuid,
    pub base_price_cents: i64,
    pub base_timeline_weeks: i32,
    pub total_price_cents: i64,
    pub total_timeline_weeks: i32,
    pub adjustments: Vec<AppliedAdjustment>,
}

/// Base values the calculation starts from.
#[derive(Debug, Clone, Copy)]
pub struct BasePricing {
    pub package_id: Uuid,
    pub price_cents: i64,
    pub timeline_weeks: i32,
}

impl From<&Package> for BasePricing {
    fn from(package: &Package) -> Self {
        Self {
            package_id: package.id,
            price_cents: package.base_price_cents,
            timeline_weeks: package.base_timeline_weeks,
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" | "" => Some(false),
            _ => None,
        },
        Value::Null => Some(false),
        _ => None,
    }
}

/// Scalar equality that treats `5` and `"5"` as equal and compares strings
/// case-insensitively.
fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.trim().eq_ignore_ascii_case(y.trim()),
        (Value::Bool(x), Value::Bool(y)) => x == y,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => a == b,
        },
    }
}

/// Equality where a multi-select answer matches if any chosen value matches.
fn answer_eq(answer: &Value, expected: &Value) -> bool {
    match answer {
        Value::Array(items) => items.iter().any(|item| scalar_eq(item, expected)),
        other => scalar_eq(other, expected),
    }
}

fn compare(answer: Option<&Value>, expected: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (answer.and_then(as_number), as_number(expected)) {
        (Some(a), Some(e)) => cmp(a, e),
        _ => false,
    }
}

/// Whether a rule condition holds for the given answer.
///
/// A missing answer never matches, except for `is_false`.
pub fn condition_matches(operator: RuleOperator, expected: &Value, answer: Option<&Value>) -> bool {
    let answer = answer.filter(|v| !v.is_null());

    match operator {
        RuleOperator::Equals => answer.is_some_and(|a| answer_eq(a, expected)),
        RuleOperator::NotEquals => answer.is_some_and(|a| !answer_eq(a, expected)),
        RuleOperator::In => match (answer, expected) {
            (Some(a), Value::Array(allowed)) => allowed.iter().any(|e| answer_eq(a, e)),
            _ => false,
        },
        RuleOperator::Contains => match answer {
            Some(Value::Array(items)) => items.iter().any(|item| scalar_eq(item, expected)),
            Some(Value::String(s)) => expected
                .as_str()
                .is_some_and(|needle| s.to_lowercase().contains(&needle.to_lowercase())),
            _ => false,
        },
        RuleOperator::Gt => compare(answer, expected, |a, e| a > e),
        RuleOperator::Gte => compare(answer, expected, |a, e| a >= e),
        RuleOperator::Lt => compare(answer, expected, |a, e| a < e),
        RuleOperator::Lte => compare(answer, expected, |a, e| a <= e),
        RuleOperator::IsTrue => answer.and_then(as_bool) == Some(true),
        RuleOperator::IsFalse => answer.map_or(true, |a| as_bool(a) == Some(false)),
    }
}

/// Largest timeline change a single rule may make.
pub const MAX_TIMELINE_ADJUSTMENT_WEEKS: i32 = 520;

/// Check that a rule's value fits its operator.
pub fn validate_rule(
    operator: RuleOperator,
    value: &Value,
    adjustment_type: AdjustmentType,
    price_adjustment: f64,
    timeline_adjustment_weeks: i32,
) -> Result<()> {
    if operator == RuleOperator::In && !value.is_array() {
        return Err(AppError::Validation(
            "Operator 'in' requires an array value".to_string(),
        ));
    }
    if operator.is_numeric() && as_number(value).is_none() {
        return Err(AppError::Validation(format!(
            "Operator '{}' requires a numeric value",
            serde_json::to_value(operator)?
                .as_str()
                .unwrap_or_default()
        )));
    }
    if !operator.is_unary() && !operator.is_numeric() && value.is_null() {
        return Err(AppError::Validation("Rule value is required".to_string()));
    }
    if !price_adjustment.is_finite() {
        return Err(AppError::Validation(
            "price_adjustment must be a finite number".to_string(),
        ));
    }
    if adjustment_type == AdjustmentType::Percent && price_adjustment <= -100.0 {
        return Err(AppError::Validation(
            "Percent adjustments must be greater than -100".to_string(),
        ));
    }
    if timeline_adjustment_weeks.unsigned_abs() > MAX_TIMELINE_ADJUSTMENT_WEEKS.unsigned_abs() {
        return Err(AppError::Validation(format!(
            "timeline_adjustment_weeks must be between -{0} and {0}",
            MAX_TIMELINE_ADJUSTMENT_WEEKS
        )));
    }
    Ok(())
}

/// Price a package against quiz answers.
pub fn calculate(base: BasePricing, rules: &[ScopingRule], inputs: &ScopingInputs) -> ScopingResult {
    let mut matching: Vec<&ScopingRule> = rules
        .iter()
        .filter(|r| r.is_active && r.package_id == base.package_id)
        .filter(|r| condition_matches(r.operator, &r.value, inputs.get(&r.factor_key)))
        .collect();
    // stable: equal priorities keep creation order
    matching.sort_by_key(|r| (r.priority, r.created_at));

    let mut price = base.price_cents.max(0);
    let mut timeline = base.timeline_weeks.max(0);
    let mut adjustments = Vec::with_capacity(matching.len());

    for rule in matching {
        let next_price = match rule.price_adjustment_type {
            AdjustmentType::Fixed => price as f64 + rule.price_adjustment,
            AdjustmentType::Percent => price as f64 * (1.0 + rule.price_adjustment / 100.0),
        }
        .round()
        .max(0.0) as i64;
        let next_timeline = timeline.saturating_add(rule.timeline_adjustment_weeks).max(0);

        adjustments.push(AppliedAdjustment {
            rule_id: rule.id,
            factor_key: rule.factor_key.clone(),
            description: rule.description.clone(),
            price_delta_cents: next_price - price,
            timeline_delta_weeks: next_timeline - timeline,
            running_price_cents: next_price,
            running_timeline_weeks: next_timeline,
        });

        price = next_price;
        timeline = next_timeline;
    }

    ScopingResult {
        package_id: base.package_id,
        base_price_cents: base.price_cents,
        base_timeline_weeks: base.timeline_weeks,
        total_price_cents: price,
        total_timeline_weeks: timeline,
        adjustments,
    }
}

/// Keys of required factors that have no usable answer.
pub fn missing_required(factors: &[ScopingFactor], inputs: &ScopingInputs) -> Vec<String> {
    factors
        .iter()
        .filter(|f| f.is_active && f.is_required)
        .filter(|f| match inputs.get(&f.key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            Some(_) => false,
        })
        .map(|f| f.key.clone())
        .collect()
}

/// Loads packages, factors and rules and runs the calculator.
pub struct ScopingService {
    db: PgPool,
}

impl ScopingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Active package by ID.
    pub async fn active_package(&self, package_id: Uuid) -> Result<Package> {
        sqlx::query_as::<_, Package>("SELECT * FROM packages WHERE id = $1 AND is_active = true")
            .bind(package_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Package not found".to_string()))
    }

    /// Active factors for a package, including global ones.
    pub async fn factors_for_package(&self, package_id: Uuid) -> Result<Vec<ScopingFactor>> {
        let factors = sqlx::query_as::<_, ScopingFactor>(
            r#"
            SELECT * FROM scoping_factors
            WHERE is_active = true AND (package_id = $1 OR package_id IS NULL)
            ORDER BY sort_order, label
            "#,
        )
        .bind(package_id)
        .fetch_all(&self.db)
        .await?;

        Ok(factors)
    }

    /// Active rules for a package in application order.
    pub async fn rules_for_package(&self, package_id: Uuid) -> Result<Vec<ScopingRule>> {
        let rules = sqlx::query_as::<_, ScopingRule>(
            r#"
            SELECT * FROM scoping_rules
            WHERE package_id = $1 AND is_active = true
            ORDER BY priority, created_at
            "#,
        )
        .bind(package_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rules)
    }

    /// Validate answers and price a package loaded by [`active_package`](Self::active_package).
    pub async fn calculate(&self, package: &Package, inputs: &ScopingInputs) -> Result<ScopingResult> {
        let package_id = package.id;
        let factors = self.factors_for_package(package_id).await?;
        let missing = missing_required(&factors, inputs);
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "Missing required answers: {}",
                missing.join(", ")
            )));
        }

        let rules = self.rules_for_package(package_id).await?;
        let result = calculate(BasePricing::from(package), &rules, inputs);

        tracing::debug!(
            package_id = %package_id,
            rules_applied = result.adjustments.len(),
            total_price_cents = result.total_price_cents,
            "Scoping calculated"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scoping::FactorInputType;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn base(package_id: Uuid) -> BasePricing {
        BasePricing {
            package_id,
            price_cents: 1_000_000,
            timeline_weeks: 4,
        }
    }

    fn rule(
        package_id: Uuid,
        key: &str,
        operator: RuleOperator,
        value: Value,
        kind: AdjustmentType,
        amount: f64,
        weeks: i32,
        priority: i32,
    ) -> ScopingRule {
        ScopingRule {
            id: Uuid::new_v4(),
            package_id,
            factor_key: key.to_string(),
            operator,
            value,
            price_adjustment_type: kind,
            price_adjustment: amount,
            timeline_adjustment_weeks: weeks,
            priority,
            description: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn inputs(value: Value) -> ScopingInputs {
        value.as_object().cloned().unwrap()
    }

    fn factor(key: &str, required: bool) -> ScopingFactor {
        ScopingFactor {
            id: Uuid::new_v4(),
            package_id: None,
            key: key.to_string(),
            label: key.to_string(),
            help_text: None,
            input_type: FactorInputType::Select,
            options: json!([]),
            is_required: required,
            sort_order: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // condition_matches
    // -----------------------------------------------------------------------

    #[test]
    fn test_equals_string_case_insensitive() {
        assert!(condition_matches(
            RuleOperator::Equals,
            &json!("HubSpot"),
            Some(&json!("hubspot"))
        ));
        assert!(!condition_matches(
            RuleOperator::Equals,
            &json!("hubspot"),
            Some(&json!("salesforce"))
        ));
    }

    #[test]
    fn test_equals_number_and_numeric_string() {
        assert!(condition_matches(RuleOperator::Equals, &json!(5), Some(&json!("5"))));
    }

    #[test]
    fn test_equals_multi_select_any() {
        assert!(condition_matches(
            RuleOperator::Equals,
            &json!("marketo"),
            Some(&json!(["hubspot", "marketo"]))
        ));
    }

    #[test]
    fn test_missing_answer_never_matches() {
        for op in [
            RuleOperator::Equals,
            RuleOperator::NotEquals,
            RuleOperator::In,
            RuleOperator::Contains,
            RuleOperator::Gt,
            RuleOperator::IsTrue,
        ] {
            assert!(!condition_matches(op, &json!(1), None), "{:?}", op);
            assert!(!condition_matches(op, &json!(1), Some(&Value::Null)), "{:?}", op);
        }
    }

    #[test]
    fn test_is_false_matches_missing() {
        assert!(condition_matches(RuleOperator::IsFalse, &Value::Null, None));
        assert!(condition_matches(RuleOperator::IsFalse, &Value::Null, Some(&json!(false))));
        assert!(condition_matches(RuleOperator::IsFalse, &Value::Null, Some(&json!("no"))));
        assert!(!condition_matches(RuleOperator::IsFalse, &Value::Null, Some(&json!(true))));
    }

    #[test]
    fn test_is_true_accepts_common_truthy_answers() {
        for v in [json!(true), json!("yes"), json!("TRUE"), json!(1)] {
            assert!(condition_matches(RuleOperator::IsTrue, &Value::Null, Some(&v)));
        }
        assert!(!condition_matches(RuleOperator::IsTrue, &Value::Null, Some(&json!("maybe"))));
    }

    #[test]
    fn test_in_operator() {
        let allowed = json!(["enterprise", "mid_market"]);
        assert!(condition_matches(RuleOperator::In, &allowed, Some(&json!("enterprise"))));
        assert!(!condition_matches(RuleOperator::In, &allowed, Some(&json!("smb"))));
        assert!(!condition_matches(RuleOperator::In, &json!("enterprise"), Some(&json!("enterprise"))));
    }

    #[test]
    fn test_contains_operator() {
        assert!(condition_matches(
            RuleOperator::Contains,
            &json!("salesforce"),
            Some(&json!(["hubspot", "salesforce"]))
        ));
        assert!(condition_matches(
            RuleOperator::Contains,
            &json!("migration"),
            Some(&json!("Data Migration from legacy CRM"))
        ));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(condition_matches(RuleOperator::Gt, &json!(50), Some(&json!(51))));
        assert!(!condition_matches(RuleOperator::Gt, &json!(50), Some(&json!(50))));
        assert!(condition_matches(RuleOperator::Gte, &json!(50), Some(&json!("50"))));
        assert!(condition_matches(RuleOperator::Lt, &json!(10), Some(&json!(9.5))));
        assert!(condition_matches(RuleOperator::Lte, &json!(10), Some(&json!(10))));
        assert!(!condition_matches(RuleOperator::Gt, &json!(10), Some(&json!("lots"))));
    }

    #[test]
    fn test_not_equals() {
        assert!(condition_matches(RuleOperator::NotEquals, &json!("a"), Some(&json!("b"))));
        assert!(!condition_matches(RuleOperator::NotEquals, &json!("a"), Some(&json!("A"))));
    }

    // -----------------------------------------------------------------------
    // calculate
    // -----------------------------------------------------------------------

    #[test]
    fn test_no_rules_returns_base() {
        let pkg = Uuid::new_v4();
        let result = calculate(base(pkg), &[], &inputs(json!({})));
        assert_eq!(result.total_price_cents, 1_000_000);
        assert_eq!(result.total_timeline_weeks, 4);
        assert!(result.adjustments.is_empty());
    }

    #[test]
    fn test_sums_matching_fixed_rules() {
        let pkg = Uuid::new_v4();
        let rules = vec![
            rule(pkg, "crm", RuleOperator::Equals, json!("salesforce"), AdjustmentType::Fixed, 250_000.0, 2, 10),
            rule(pkg, "users", RuleOperator::Gt, json!(50), AdjustmentType::Fixed, 100_000.0, 1, 20),
            rule(pkg, "crm", RuleOperator::Equals, json!("hubspot"), AdjustmentType::Fixed, 50_000.0, 0, 5),
        ];
        let result = calculate(
            base(pkg),
            &rules,
            &inputs(json!({"crm": "salesforce", "users": 120})),
        );
        assert_eq!(result.total_price_cents, 1_350_000);
        assert_eq!(result.total_timeline_weeks, 7);
        assert_eq!(result.adjustments.len(), 2);
    }

    #[test]
    fn test_applies_in_priority_order() {
        let pkg = Uuid::new_v4();
        // percent first (priority 1) then fixed (priority 2): 1_000_000 * 1.1 + 100_000
        let rules = vec![
            rule(pkg, "rush", RuleOperator::IsTrue, Value::Null, AdjustmentType::Fixed, 100_000.0, 0, 2),
            rule(pkg, "rush", RuleOperator::IsTrue, Value::Null, AdjustmentType::Percent, 10.0, 0, 1),
        ];
        let result = calculate(base(pkg), &rules, &inputs(json!({"rush": true})));
        assert_eq!(result.total_price_cents, 1_200_000);
        assert_eq!(result.adjustments[0].price_delta_cents, 100_000);
        assert_eq!(result.adjustments[0].running_price_cents, 1_100_000);
        assert_eq!(result.adjustments[1].price_delta_cents, 100_000);

        // reversed priorities: (1_000_000 + 100_000) * 1.1
        let rules = vec![
            rule(pkg, "rush", RuleOperator::IsTrue, Value::Null, AdjustmentType::Fixed, 100_000.0, 0, 1),
            rule(pkg, "rush", RuleOperator::IsTrue, Value::Null, AdjustmentType::Percent, 10.0, 0, 2),
        ];
        let result = calculate(base(pkg), &rules, &inputs(json!({"rush": true})));
        assert_eq!(result.total_price_cents, 1_210_000);
    }

    #[test]
    fn test_equal_priority_keeps_creation_order() {
        let pkg = Uuid::new_v4();
        let mut first = rule(pkg, "a", RuleOperator::IsTrue, Value::Null, AdjustmentType::Percent, 50.0, 0, 1);
        let mut second = rule(pkg, "a", RuleOperator::IsTrue, Value::Null, AdjustmentType::Fixed, 10.0, 0, 1);
        let now = Utc::now();
        first.created_at = now;
        second.created_at = now + Duration::seconds(1);
        let result = calculate(base(pkg), &[second.clone(), first.clone()], &inputs(json!({"a": true})));
        assert_eq!(result.adjustments[0].rule_id, first.id);
        assert_eq!(result.adjustments[1].rule_id, second.id);
    }

    #[test]
    fn test_price_and_timeline_floor_at_zero() {
        let pkg = Uuid::new_v4();
        let rules = vec![rule(
            pkg,
            "discount",
            RuleOperator::IsTrue,
            Value::Null,
            AdjustmentType::Fixed,
            -5_000_000.0,
            -10,
            1,
        )];
        let result = calculate(base(pkg), &rules, &inputs(json!({"discount": "yes"})));
        assert_eq!(result.total_price_cents, 0);
        assert_eq!(result.total_timeline_weeks, 0);
        assert_eq!(result.adjustments[0].price_delta_cents, -1_000_000);
        assert_eq!(result.adjustments[0].timeline_delta_weeks, -4);
    }

    #[test]
    fn test_extreme_timeline_adjustment_saturates() {
        let pkg = Uuid::new_v4();
        let rules = vec![
            rule(pkg, "a", RuleOperator::IsTrue, Value::Null, AdjustmentType::Fixed, 0.0, i32::MAX, 1),
            rule(pkg, "a", RuleOperator::IsTrue, Value::Null, AdjustmentType::Fixed, 0.0, i32::MAX, 2),
        ];
        let result = calculate(base(pkg), &rules, &inputs(json!({"a": true})));
        assert_eq!(result.total_timeline_weeks, i32::MAX);
        assert_eq!(result.adjustments[1].timeline_delta_weeks, 0);
    }

    #[test]
    fn test_percent_rounds_to_cent() {
        let pkg = Uuid::new_v4();
        let rules = vec![rule(pkg, "x", RuleOperator::IsTrue, Value::Null, AdjustmentType::Percent, 33.333, 0, 1)];
        let b = BasePricing { package_id: pkg, price_cents: 1001, timeline_weeks: 1 };
        let result = calculate(b, &rules, &inputs(json!({"x": true})));
        assert_eq!(result.total_price_cents, 1335);
    }

    #[test]
    fn test_inactive_and_foreign_rules_skipped() {
        let pkg = Uuid::new_v4();
        let mut inactive = rule(pkg, "x", RuleOperator::IsTrue, Value::Null, AdjustmentType::Fixed, 1.0, 0, 1);
        inactive.is_active = false;
        let foreign = rule(Uuid::new_v4(), "x", RuleOperator::IsTrue, Value::Null, AdjustmentType::Fixed, 1.0, 0, 1);
        let result = calculate(base(pkg), &[inactive, foreign], &inputs(json!({"x": true})));
        assert!(result.adjustments.is_empty());
        assert_eq!(result.total_price_cents, 1_000_000);
    }

    // -----------------------------------------------------------------------
    // missing_required / validate_rule
    // -----------------------------------------------------------------------

    #[test]
    fn test_missing_required() {
        let factors = vec![factor("crm", true), factor("users", true), factor("notes", false)];
        let missing = missing_required(&factors, &inputs(json!({"crm": "hubspot", "users": ""})));
        assert_eq!(missing, vec!["users".to_string()]);

        let missing = missing_required(&factors, &inputs(json!({"crm": [], "users": 0})));
        assert_eq!(missing, vec!["crm".to_string()]);
    }

    #[test]
    fn test_validate_rule() {
        assert!(validate_rule(RuleOperator::In, &json!("a"), AdjustmentType::Fixed, 0.0, 0).is_err());
        assert!(validate_rule(RuleOperator::In, &json!(["a"]), AdjustmentType::Fixed, 0.0, 0).is_ok());
        assert!(validate_rule(RuleOperator::Gt, &json!("ten"), AdjustmentType::Fixed, 0.0, 0).is_err());
        assert!(validate_rule(RuleOperator::Gt, &json!(10), AdjustmentType::Fixed, 0.0, 0).is_ok());
        assert!(validate_rule(RuleOperator::Equals, &Value::Null, AdjustmentType::Fixed, 0.0, 0).is_err());
        assert!(validate_rule(RuleOperator::IsTrue, &Value::Null, AdjustmentType::Fixed, 0.0, 0).is_ok());
        assert!(validate_rule(RuleOperator::IsTrue, &Value::Null, AdjustmentType::Percent, -100.0, 0).is_err());
        assert!(validate_rule(RuleOperator::IsTrue, &Value::Null, AdjustmentType::Percent, -50.0, 0).is_ok());
        assert!(validate_rule(RuleOperator::IsTrue, &Value::Null, AdjustmentType::Fixed, 0.0, 520).is_ok());
        assert!(validate_rule(RuleOperator::IsTrue, &Value::Null, AdjustmentType::Fixed, 0.0, -521).is_err());
        assert!(validate_rule(RuleOperator::IsTrue, &Value::Null, AdjustmentType::Fixed, 0.0, i32::MAX).is_err());
        assert!(validate_rule(RuleOperator::IsTrue, &Value::Null, AdjustmentType::Fixed, 0.0, i32::MIN).is_err());
    }
}
