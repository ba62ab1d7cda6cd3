//! `switchboard ask`: run one request through the workflow engine.

use switchboard_core::{WorkflowConfig, WorkflowEngine, WorkflowOutcome};

use super::print_json;

/// Run `request` with an engine built from `config` and print the outcome.
pub async fn run(config: WorkflowConfig, request: &str, json: bool) -> Result<(), String> {
    let engine = WorkflowEngine::from_config(config);
    let outcome = engine.run(request).await;
    report(&outcome, json)
}

/// Print an outcome. A run that ended in failure is reported as an error
/// after its answer has been printed.
pub fn report(outcome: &WorkflowOutcome, json: bool) -> Result<(), String> {
    if json {
        print_json(outcome)?;
    } else {
        println!("{}", outcome.final_answer);
        if !outcome.records.is_empty() {
            println!();
            println!(
                "{}",
                console::style(format!(
                    "{} record(s), {} refinement pass(es), path: {}",
                    outcome.records.len(),
                    outcome.iterations,
                    describe_path(outcome)
                ))
                .dim()
            );
        }
    }

    if outcome.success {
        Ok(())
    } else {
        Err(format!(
            "workflow ended in {}: {}",
            outcome.terminal_stage,
            outcome
                .failure_reason
                .as_deref()
                .unwrap_or("no reason recorded")
        ))
    }
}

fn describe_path(outcome: &WorkflowOutcome) -> String {
    outcome
        .stage_path
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" → ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::workflow::Stage;

    fn outcome(success: bool, terminal: Stage) -> WorkflowOutcome {
        WorkflowOutcome {
            success,
            final_answer: "answer".to_string(),
            terminal_stage: terminal,
            failure_reason: (!success).then(|| "no applicable capability for this request".to_string()),
            error_message: None,
            iterations: 0,
            records: Vec::new(),
            stage_path: vec![Stage::Init, terminal],
        }
    }

    #[test]
    fn test_successful_outcome_reports_ok() {
        assert!(report(&outcome(true, Stage::FinalAnswer), false).is_ok());
    }

    #[test]
    fn test_failed_outcome_reports_reason() {
        let err = report(&outcome(false, Stage::Failure), true).unwrap_err();
        assert!(err.contains("no applicable capability"));
    }

    #[test]
    fn test_describe_path_joins_stage_names() {
        let o = outcome(true, Stage::FinalAnswer);
        assert_eq!(describe_path(&o), format!("{} → {}", Stage::Init.as_str(), Stage::FinalAnswer.as_str()));
    }
}
