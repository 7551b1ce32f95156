//! System prompts for live stages

use crate::models::WorkflowRequest;
use crate::plan::PlanProposal;
use crate::workflow::StageId;

pub const DATA_ANALYST_PROMPT: &str = r#"You are the Data Analyst for an air cargo carrier.

Compile the operational data a capacity planner needs for the requested hub
and period:
1. Shipment counts, weights and volumes, with the top destinations
2. Aircraft fleet availability and specifications
3. Historical monthly volumes and the trend for the coming month
4. Routes served from the hub with distances and flight times
5. Crew availability by role

Report figures in tables or lists. Do not make recommendations."#;

pub const CAPACITY_CALC_PROMPT: &str = r#"You are the Capacity Calculator for an air cargo carrier.

From the shipment and fleet data you are given, calculate:
- Aircraft needed per route, with load factors
- Fuel required per route and the total fuel cost
- Crew required per flight, including flight engineers where the aircraft needs one
- Overall fleet utilization

Show the calculation for every figure."#;

pub const DOC_RESEARCHER_PROMPT: &str = r#"You are the Document Researcher for an air cargo carrier.

Check the proposed capacity calculations against:
- aircraft_specs.md (payload and range limits)
- faa_regulations.md (flight time and duty limits)
- crew_policies.md (rest requirements, qualifications)
- historical_reports.md (lessons from past periods)

List every constraint that applies and whether the calculations satisfy it."#;

pub const PLANNER_PROMPT: &str = r#"You are the Capacity Planner for an air cargo carrier.

Write the final capacity plan from the data, calculations and policy research
you are given. Use these sections, each starting with a `##` heading:

## EXECUTIVE SUMMARY
## AIRCRAFT ASSIGNMENTS
## CREW ASSIGNMENTS
## FUEL PLAN
## RISKS
## ACTIONS REQUIRING APPROVAL

End the plan with one fenced ```json block that matches this JSON schema:

{schema}"#;

/// System prompt for a live stage
pub fn system_prompt(stage: StageId) -> String {
    match stage {
        StageId::DataAnalyst => DATA_ANALYST_PROMPT.to_string(),
        StageId::CapacityCalc => CAPACITY_CALC_PROMPT.to_string(),
        StageId::DocResearcher => DOC_RESEARCHER_PROMPT.to_string(),
        StageId::Planner => PLANNER_PROMPT.replace("{schema}", &PlanProposal::json_schema()),
    }
}

/// Human-readable description of what a stage is asked to do
pub fn task_description(stage: StageId, request: &WorkflowRequest) -> String {
    match stage {
        StageId::DataAnalyst => format!(
            "Analyzing shipments from {} hub ({} to {})",
            request.hub, request.date_from, request.date_to
        ),
        StageId::CapacityCalc => "Calculating aircraft, fuel and crew requirements".to_string(),
        StageId::DocResearcher => {
            "Checking the calculations against policies and regulations".to_string()
        }
        StageId::Planner => "Synthesizing the final capacity plan".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_planner_prompt_has_schema() {
        let prompt = system_prompt(StageId::Planner);
        assert!(!prompt.contains("{schema}"));
        assert!(prompt.contains("proposed_actions"));
        assert!(prompt.contains("## EXECUTIVE SUMMARY"));
    }

    #[test]
    fn test_first_task_names_request() {
        let request = WorkflowRequest::new(
            "2026-01-01".parse().unwrap(),
            "2026-01-31".parse().unwrap(),
            "Seattle",
        )
        .unwrap();
        assert_eq!(
            task_description(StageId::DataAnalyst, &request),
            "Analyzing shipments from Seattle hub (2026-01-01 to 2026-01-31)"
        );
    }
}
