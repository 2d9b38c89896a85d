use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::Environment;
use crate::deploy::Error;
use crate::orchestrator::{Orchestrator, RemoteError};

/// Names of the services to query, in environment order.
///
/// Without a filter every service is picked. With one, only services named
/// in it are. Task-only entries are never picked. Unknown names in the
/// filter are ignored, but an empty result is an error.
pub fn select_services(environment: &Environment, filter: &[String]) -> Result<Vec<String>, Error> {
    let mut selected: Vec<String> = Vec::new();

    for name in filter {
        if !environment.services.iter().any(|service| &service.name == name) {
            warn!("service {} is not declared in this environment", name);
        }
    }

    for service in &environment.services {
        if service.task_only {
            continue;
        }
        if !filter.is_empty() && !filter.contains(&service.name) {
            continue;
        }
        if !selected.contains(&service.name) {
            selected.push(service.name.clone());
        }
    }

    if selected.is_empty() {
        return Err(Error::NoServicesSelected);
    }

    return Ok(selected);
}

/// Records the cluster's view of `names` on the matching environment
/// entries. Entries the cluster does not know keep an empty task reference.
pub async fn fetch_status<O>(
    orchestrator: &O,
    environment: &mut Environment,
    names: &[String],
) -> Result<(), Error>
where
    O: Orchestrator + ?Sized,
{
    let result = orchestrator
        .describe_services(&environment.ecs_cluster, names)
        .await
        .map_err(Error::StatusLookup)?;

    for failure in &result.failures {
        warn!(
            "cluster {} could not describe {}: {}",
            environment.ecs_cluster, failure.reference, failure.reason
        );
    }

    for remote in &result.services {
        let matching = environment
            .services
            .iter_mut()
            .filter(|service| !service.task_only && service.name == remote.name);

        for service in matching {
            service.task_reference = remote.task_definition.clone();
            service.status = remote.status.clone();
            service.running_count = remote.running_count;
        }
    }

    return Ok(());
}

/// Fetches the current task definition of every service with a task
/// reference. A failed lookup only skips that service; the failures are
/// returned keyed by service name.
pub async fn fetch_definitions<O>(
    orchestrator: &O,
    environment: &mut Environment,
) -> HashMap<String, RemoteError>
where
    O: Orchestrator + ?Sized,
{
    let mut failures = HashMap::new();

    for service in environment.services.iter_mut() {
        let reference = match &service.task_reference {
            Some(reference) if !reference.is_empty() => reference.clone(),
            _ => continue,
        };

        debug!("describing task definition {} of {}", reference, service.name);
        match orchestrator.describe_task_definition(&reference).await {
            Ok(definition) => service.task_definition = Some(definition),
            Err(error) => {
                warn!(
                    code = %error.code,
                    "unable to describe task definition {} of {}: {}",
                    reference, service.name, error
                );
                failures.insert(service.name.clone(), error);
            }
        }
    }

    return failures;
}
