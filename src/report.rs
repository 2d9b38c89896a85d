use tracing::info;

use crate::config::Environment;
use crate::deploy::{Outcome, ServiceOutcome};

pub fn log_current_status(environment: &Environment) {
    for service in &environment.services {
        let definition = match &service.task_definition {
            Some(definition) => definition,
            None => continue,
        };

        info!(
            status = %service.status,
            running = service.running_count,
            "service {} - task {} - family {} revision {} - actual image {}",
            service.name,
            service.task_reference.as_deref().unwrap_or_default(),
            definition.family,
            definition.revision,
            definition.primary_image().unwrap_or("<none>")
        );
    }
}

fn describe(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Updated { task_definition } => format!("updated to {}", task_definition),
        Outcome::UpToDate { image } => format!("up to date ({})", image),
        Outcome::WouldUpdate { current, desired } => {
            format!("would update {} -> {}", current, desired)
        }
        Outcome::NotRunning => String::from("skipped, not running in the cluster"),
        Outcome::FetchFailed { reason } => format!("skipped, {}", reason),
        Outcome::UpdateFailed {
            task_definition,
            reason,
        } => format!("registered {} but update failed, {}", task_definition, reason),
    }
}

/// One line per service followed by the tally.
pub fn render_summary(outcomes: &[ServiceOutcome]) -> String {
    let lines = outcomes
        .iter()
        .fold(String::from(""), |mut acc, service_outcome| {
            let line = format!(
                "{}: {}\n",
                service_outcome.service,
                describe(&service_outcome.outcome)
            );

            acc.push_str(&line);
            return acc;
        });

    let changed = outcomes
        .iter()
        .filter(|entry| {
            matches!(
                entry.outcome,
                Outcome::Updated { .. } | Outcome::WouldUpdate { .. }
            )
        })
        .count();
    let up_to_date = outcomes
        .iter()
        .filter(|entry| matches!(entry.outcome, Outcome::UpToDate { .. }))
        .count();
    let failed = outcomes.iter().filter(|entry| entry.outcome.is_error()).count();
    let skipped = outcomes.len() - changed - up_to_date;

    format!(
        "{}{} service(s): {} updated, {} up to date, {} skipped ({} on error)",
        lines,
        outcomes.len(),
        changed,
        up_to_date,
        skipped,
        failed
    )
}
