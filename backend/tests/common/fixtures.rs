//! Request bodies for the end-to-end tests.

#![allow(dead_code)]

use serde_json::{json, Value};

pub fn service(id: &str) -> Value {
    json!({
        "slug": format!("crm-setup-{}", id),
        "name": "CRM Setup",
        "tagline": "Get your CRM right the first time",
        "category": "crm",
        "features": ["Data model", "Pipeline design"],
    })
}

pub fn package(service_id: &str, id: &str, base_price_cents: i64, weeks: i32) -> Value {
    json!({
        "service_id": service_id,
        "slug": format!("starter-{}", id),
        "name": "Starter",
        "base_price_cents": base_price_cents,
        "base_timeline_weeks": weeks,
        "features": ["One pipeline"],
    })
}

pub fn number_factor(package_id: &str, key: &str) -> Value {
    json!({
        "package_id": package_id,
        "key": key,
        "label": "How many users?",
        "input_type": "number",
        "is_required": true,
    })
}

pub fn select_factor(package_id: &str, key: &str) -> Value {
    json!({
        "package_id": package_id,
        "key": key,
        "label": "Current CRM",
        "input_type": "select",
        "options": [
            { "value": "hubspot", "label": "HubSpot" },
            { "value": "salesforce", "label": "Salesforce" },
        ],
    })
}

#[allow(clippy::too_many_arguments)]
pub fn rule(
    package_id: &str,
    factor_key: &str,
    operator: &str,
    value: Value,
    adjustment_type: &str,
    adjustment: f64,
    weeks: i32,
    priority: i32,
) -> Value {
    json!({
        "package_id": package_id,
        "factor_key": factor_key,
        "operator": operator,
        "value": value,
        "price_adjustment_type": adjustment_type,
        "price_adjustment": adjustment,
        "timeline_adjustment_weeks": weeks,
        "priority": priority,
    })
}

pub fn contact_form(id: &str) -> Value {
    json!({
        "name": "Ada Lovelace",
        "email": format!("ada+{}@example.com", id),
        "company": "Analytical Engines",
        "message": "We need help cleaning up our pipeline stages.",
        "source": "e2e",
    })
}

pub fn company(id: &str) -> Value {
    json!({
        "name": format!("Acme {}", id),
        "domain": format!("acme-{}.example.com", id),
        "industry": "Manufacturing",
    })
}

pub fn deal(company_id: &str, title: &str, value_cents: i64, stage: &str) -> Value {
    json!({
        "company_id": company_id,
        "title": title,
        "value_cents": value_cents,
        "stage": stage,
    })
}

pub fn tf_task(project_id: Option<&str>, title: &str, status: &str) -> Value {
    json!({
        "project_id": project_id,
        "title": title,
        "status": status,
        "tags": ["e2e"],
    })
}
