//! # Capacity Plan
//!
//! Structured content of the plan the planner stage proposes, and the
//! approval request built from it.

use chrono::{DateTime, Utc};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::models::round6;

/// Longest summary taken from the head of a plan with no summary section
const SUMMARY_FALLBACK_CHARS: usize = 500;

/// An action that needs human authorization before execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProposedAction {
    /// Stable identifier, e.g. "fuel_order"
    pub action_id: String,
    /// Short label shown on the approval card
    pub action: String,
    pub description: String,
    /// Estimated cost in USD
    #[serde(default)]
    pub estimated_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AircraftAssignment {
    /// Route code, e.g. "SEA-LAX"
    pub route: String,
    /// Aircraft type, e.g. "767-300F"
    pub aircraft: String,
    /// Planned cargo weight in kilograms
    pub cargo_kg: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CrewAssignment {
    /// Flight number, e.g. "ZV101"
    pub flight: String,
    pub captain: String,
    pub first_officer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_engineer: Option<String>,
}

/// Machine-readable part of the planner's output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanProposal {
    #[serde(default)]
    pub proposed_actions: Vec<ProposedAction>,
    #[serde(default)]
    pub aircraft_assignments: Vec<AircraftAssignment>,
    #[serde(default)]
    pub crew_assignments: Vec<CrewAssignment>,
}

impl PlanProposal {
    /// Sum of the actions' estimated costs
    pub fn actions_cost(&self) -> f64 {
        round6(self.proposed_actions.iter().map(|a| a.estimated_cost).sum())
    }

    /// JSON schema handed to the live planner so it can emit a parseable block
    pub fn json_schema() -> String {
        serde_json::to_string_pretty(&schemars::schema_for!(PlanProposal)).unwrap_or_default()
    }
}

/// Snapshot emitted once per successful pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanApprovalRequest {
    pub session_id: String,
    pub plan_summary: String,
    pub proposed_actions: Vec<ProposedAction>,
    pub total_cost_estimate: f64,
    pub aircraft_assignments: Vec<AircraftAssignment>,
    pub crew_assignments: Vec<CrewAssignment>,
    pub timestamp: DateTime<Utc>,
}

impl HumanApprovalRequest {
    /// Build the approval request from the planner output.
    ///
    /// The cost estimate is the pipeline's own usage cost plus the estimated
    /// cost of every proposed action.
    pub fn from_plan(
        session_id: &str,
        plan_text: &str,
        proposal: PlanProposal,
        pipeline_cost_usd: f64,
    ) -> Self {
        let total_cost_estimate = round6(pipeline_cost_usd + proposal.actions_cost());
        Self {
            session_id: session_id.to_string(),
            plan_summary: extract_summary(plan_text),
            proposed_actions: proposal.proposed_actions,
            total_cost_estimate,
            aircraft_assignments: proposal.aircraft_assignments,
            crew_assignments: proposal.crew_assignments,
            timestamp: Utc::now(),
        }
    }
}

/// Pull the executive summary section out of a plan.
///
/// Falls back to the first 500 characters when the plan has no such section.
pub fn extract_summary(plan_text: &str) -> String {
    const MARKER: &str = "EXECUTIVE SUMMARY";

    if let Some(start) = plan_text.find(MARKER) {
        let body_from = start + MARKER.len();
        if let Some(offset) = plan_text[body_from..].find("##") {
            return plan_text[start..body_from + offset].trim().to_string();
        }
    }

    let mut head: String = plan_text.chars().take(SUMMARY_FALLBACK_CHARS).collect();
    head.push_str("...");
    head
}

fn json_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").expect("static regex is valid")
    })
}

/// Parse the last fenced JSON block of a plan as a [`PlanProposal`]
pub fn parse_plan_proposal(plan_text: &str) -> Option<PlanProposal> {
    json_block_regex()
        .captures_iter(plan_text)
        .filter_map(|c| c.get(1))
        .filter_map(|m| serde_json::from_str::<PlanProposal>(m.as_str()).ok())
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal() -> PlanProposal {
        PlanProposal {
            proposed_actions: vec![
                ProposedAction {
                    action_id: "aircraft_booking".into(),
                    action: "Confirm Aircraft Assignments".into(),
                    description: "Book aircraft".into(),
                    estimated_cost: 45000.0,
                },
                ProposedAction {
                    action_id: "notify_partners".into(),
                    action: "Notify Partners".into(),
                    description: "Send schedule".into(),
                    estimated_cost: 0.0,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_summary_section() {
        let plan = "# PLAN\n\n## EXECUTIVE SUMMARY\nVolume is up 12%.\nRisk: Low\n\n## AIRCRAFT ASSIGNMENTS\n...";
        let summary = extract_summary(plan);
        assert!(summary.starts_with("EXECUTIVE SUMMARY"));
        assert!(summary.contains("Risk: Low"));
        assert!(!summary.contains("AIRCRAFT"));
    }

    #[test]
    fn test_extract_summary_fallback() {
        let plan = "x".repeat(800);
        let summary = extract_summary(&plan);
        assert_eq!(summary.len(), 503);
        assert!(summary.ends_with("..."));

        let short = extract_summary("no sections here");
        assert_eq!(short, "no sections here...");
    }

    #[test]
    fn test_extract_summary_multibyte() {
        let plan = "é".repeat(600);
        let summary = extract_summary(&plan);
        assert_eq!(summary.chars().count(), 503);
    }

    #[test]
    fn test_approval_cost_is_derived() {
        let req = HumanApprovalRequest::from_plan("s-1", "plan", proposal(), 0.0125);
        assert_eq!(req.total_cost_estimate, 45000.0125);
        assert_eq!(req.proposed_actions.len(), 2);
        assert_eq!(req.session_id, "s-1");
    }

    #[test]
    fn test_parse_plan_proposal() {
        let text = r#"## EXECUTIVE SUMMARY
All good.

```json
{"proposed_actions": [{"action_id": "fuel_order", "action": "Order Fuel", "description": "Pre-order fuel", "estimated_cost": 31470.0}],
 "aircraft_assignments": [{"route": "SEA-LAX", "aircraft": "767-300F", "cargo_kg": 22340}],
 "crew_assignments": [{"flight": "ZV101", "captain": "Chen", "first_officer": "Liu"}]}
```
"#;
        let parsed = parse_plan_proposal(text).unwrap();
        assert_eq!(parsed.proposed_actions[0].action_id, "fuel_order");
        assert_eq!(parsed.aircraft_assignments[0].cargo_kg, 22340);
        assert_eq!(parsed.crew_assignments[0].flight_engineer, None);

        assert!(parse_plan_proposal("no json here").is_none());
        assert!(parse_plan_proposal("```json\n{not json}\n```").is_none());
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = PlanProposal::json_schema();
        assert!(schema.contains("proposed_actions"));
        assert!(schema.contains("cargo_kg"));
    }
}
