use std::collections::HashMap;

use tracing::{info, warn};

use crate::config::{self, Environment, Service};
use crate::ecs::SessionError;
use crate::orchestrator::{Orchestrator, RemoteError, TaskDefinition};
use crate::reconcile::{self, AmbiguousTag, Decision, ImageOverride};
use crate::report;
use crate::status;

/// Errors that abort the whole run.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("No services selected")]
    NoServicesSelected,

    #[error("Unable to describe services: {0}")]
    StatusLookup(RemoteError),

    #[error("Service {service}: {source}")]
    AmbiguousTag {
        service: String,
        source: AmbiguousTag,
    },

    #[error("Error while registering task definition {family}: {source}")]
    Registration { family: String, source: RemoteError },
}

/// Everything one `deploy` invocation was asked to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployOptions {
    pub environment: String,
    pub overrides: ImageOverride,
    pub services: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Updated { task_definition: String },
    UpToDate { image: String },
    WouldUpdate { current: String, desired: String },
    NotRunning,
    FetchFailed { reason: String },
    UpdateFailed { task_definition: String, reason: String },
}

impl Outcome {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Outcome::FetchFailed { .. } | Outcome::UpdateFailed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceOutcome {
    pub service: String,
    pub outcome: Outcome,
}

/// Reconciles the selected services of `environment` against the desired
/// images, registering and rolling out a new task definition for each one
/// that drifted.
pub async fn run<O>(
    orchestrator: &O,
    environment: &mut Environment,
    options: &DeployOptions,
) -> Result<Vec<ServiceOutcome>, Error>
where
    O: Orchestrator + ?Sized,
{
    let selected = status::select_services(environment, &options.services)?;
    info!("selected services: {}", selected.join(", "));

    status::fetch_status(orchestrator, environment, &selected).await?;
    let failures = status::fetch_definitions(orchestrator, environment).await;
    report::log_current_status(environment);

    // Every desired image is checked before the first registration.
    let mut desired_images = HashMap::new();
    for service in environment.services.iter().filter(|service| {
        selected.contains(&service.name)
            && service.task_definition.is_some()
            && !failures.contains_key(&service.name)
    }) {
        let image = reconcile::desired_image(&service.registry, &options.overrides).map_err(
            |source| Error::AmbiguousTag {
                service: service.name.clone(),
                source,
            },
        )?;
        desired_images.insert(service.name.clone(), image);
    }

    let mut outcomes = Vec::new();
    for service in environment
        .services
        .iter()
        .filter(|service| selected.contains(&service.name))
    {
        let outcome = match (&service.task_definition, failures.get(&service.name)) {
            (_, Some(error)) => Outcome::FetchFailed {
                reason: error.to_string(),
            },
            (None, None) => {
                warn!("service {} is not running in {}", service.name, environment.ecs_cluster);
                Outcome::NotRunning
            }
            (Some(definition), None) => {
                reconcile_service(
                    orchestrator,
                    &environment.ecs_cluster,
                    service,
                    definition,
                    &desired_images[&service.name],
                    options.dry_run,
                )
                .await?
            }
        };

        outcomes.push(ServiceOutcome {
            service: service.name.clone(),
            outcome,
        });
    }

    return Ok(outcomes);
}

async fn reconcile_service<O>(
    orchestrator: &O,
    cluster: &str,
    service: &Service,
    definition: &TaskDefinition,
    desired: &str,
    dry_run: bool,
) -> Result<Outcome, Error>
where
    O: Orchestrator + ?Sized,
{
    let current = match definition.primary_image() {
        Some(image) => image,
        None => {
            warn!(
                "task definition {} of {} has no container image, skipping",
                definition.identifier(),
                service.name
            );
            return Ok(Outcome::FetchFailed {
                reason: format!("{} has no container image", definition.identifier()),
            });
        }
    };

    match reconcile::decide(current, desired) {
        Decision::UpToDate => {
            info!(
                "skipping update of {}, identical image detected: {}",
                service.name, current
            );
            Ok(Outcome::UpToDate {
                image: current.to_string(),
            })
        }
        Decision::Stale { current, desired } if dry_run => {
            info!("{} would move from {} to {}", service.name, current, desired);
            Ok(Outcome::WouldUpdate { current, desired })
        }
        Decision::Stale { desired, .. } => {
            info!("desired image for {}: {}", service.name, desired);
            execute(orchestrator, cluster, service, definition, &desired).await
        }
    }
}

/// Registers a copy of `definition` running `desired` and forces the
/// service onto it. A failed registration aborts the run, a failed update
/// only this service.
async fn execute<O>(
    orchestrator: &O,
    cluster: &str,
    service: &Service,
    definition: &TaskDefinition,
    desired: &str,
) -> Result<Outcome, Error>
where
    O: Orchestrator + ?Sized,
{
    let registration = definition.with_image(desired);
    let registered = orchestrator
        .register_task_definition(&registration)
        .await
        .map_err(|source| Error::Registration {
            family: definition.family.clone(),
            source,
        })?;

    let task_definition = registered.identifier();
    info!("registered new task definition: {}", task_definition);

    match orchestrator
        .update_service(cluster, &service.name, &task_definition)
        .await
    {
        Ok(()) => {
            info!("service {} is redeploying with {}", service.name, task_definition);
            Ok(Outcome::Updated { task_definition })
        }
        Err(error) => {
            warn!(
                code = %error.code,
                "error while updating service {}: {}",
                service.name, error
            );
            Ok(Outcome::UpdateFailed {
                task_definition,
                reason: error.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{run, DeployOptions, Error, Outcome, ServiceOutcome};
    use crate::config::{Environment, Service};
    use crate::orchestrator::fake::{Call, FakeCluster};
    use crate::reconcile::{AmbiguousTag, ImageOverride};

    fn demo() -> Environment {
        Environment {
            github: None,
            ecs_cluster: String::from("demo-cluster"),
            ecs_region: String::from("eu-west-1"),
            services: vec![Service::new("web", "repo/web")],
        }
    }

    fn options(image: Option<&str>, tag: Option<&str>) -> DeployOptions {
        DeployOptions {
            environment: String::from("demo"),
            overrides: ImageOverride {
                image: image.map(String::from),
                tag: tag.map(String::from),
            },
            ..Default::default()
        }
    }

    fn outcome(service: &str, outcome: Outcome) -> ServiceOutcome {
        ServiceOutcome {
            service: service.to_string(),
            outcome,
        }
    }

    #[tokio::test]
    async fn redeploys_a_stale_service_once() {
        let cluster = FakeCluster::default().with_service("web", "repo/web:1.0");

        let outcomes = run(&cluster, &mut demo(), &options(None, Some("2.0")))
            .await
            .unwrap();
        assert_eq!(
            vec![outcome(
                "web",
                Outcome::Updated {
                    task_definition: String::from("web:2")
                }
            )],
            outcomes
        );

        let writes = cluster.writes();
        assert_eq!(2, writes.len());
        match &writes[0] {
            Call::Register(registration) => {
                assert_eq!("web", registration.family);
                assert_eq!(
                    Some("repo/web:2.0"),
                    registration.container_definitions[0].image()
                );
                assert_eq!(
                    Some(String::from("arn:aws:iam::123456789012:role/web")),
                    registration.task_role_arn
                );
            }
            other => panic!("Expected a registration, got {:?}", other),
        }
        assert_eq!(
            Call::Update {
                service: String::from("web"),
                task_definition: String::from("web:2"),
            },
            writes[1]
        );
        assert_eq!(Some(String::from("repo/web:2.0")), cluster.current_image("web"));

        cluster.clear_calls();
        let outcomes = run(&cluster, &mut demo(), &options(None, Some("2.0")))
            .await
            .unwrap();
        assert_eq!(
            vec![outcome(
                "web",
                Outcome::UpToDate {
                    image: String::from("repo/web:2.0")
                }
            )],
            outcomes
        );
        assert!(cluster.writes().is_empty());
    }

    #[tokio::test]
    async fn image_override_is_used_as_base() {
        let cluster = FakeCluster::default().with_service("web", "repo/web:1.0");

        run(&cluster, &mut demo(), &options(Some("other/web"), Some("2.0")))
            .await
            .unwrap();

        assert_eq!(Some(String::from("other/web:2.0")), cluster.current_image("web"));
    }

    #[tokio::test]
    async fn ambiguous_tag_fails_before_any_write() {
        let cluster = FakeCluster::default().with_service("web", "repo/web:1.0");

        let result = run(&cluster, &mut demo(), &options(Some("other/web:1.5"), Some("2.0"))).await;

        assert_eq!(
            Some(Error::AmbiguousTag {
                service: String::from("web"),
                source: AmbiguousTag {
                    image: String::from("other/web:1.5"),
                    tag: String::from("2.0"),
                },
            }),
            result.err()
        );
        assert!(cluster.writes().is_empty());
    }

    #[tokio::test]
    async fn ambiguous_tag_on_a_later_service_aborts_before_earlier_writes() {
        let cluster = FakeCluster::default()
            .with_service("web", "repo/web:1.0")
            .with_service("api", "repo/api:1.0");
        let mut environment = demo();
        environment.services.push(Service::new("api", "repo/api:latest"));

        let result = run(&cluster, &mut environment, &options(None, Some("2.0"))).await;

        match result.err() {
            Some(Error::AmbiguousTag { service, .. }) => assert_eq!("api", service),
            other => panic!("Expected `AmbiguousTag` error, got {:?}", other),
        }
        assert!(cluster.writes().is_empty());
    }

    #[tokio::test]
    async fn tagged_registry_of_a_service_not_running_is_ignored() {
        let cluster = FakeCluster::default().with_service("web", "repo/web:1.0");
        let mut environment = demo();
        environment.services.push(Service::new("api", "repo/api:latest"));

        let outcomes = run(&cluster, &mut environment, &options(None, Some("2.0")))
            .await
            .unwrap();

        assert_eq!(
            vec![
                outcome(
                    "web",
                    Outcome::Updated {
                        task_definition: String::from("web:2")
                    }
                ),
                outcome("api", Outcome::NotRunning),
            ],
            outcomes
        );
        assert_eq!(Some(String::from("repo/web:2.0")), cluster.current_image("web"));
    }

    #[tokio::test]
    async fn tagged_registry_of_a_service_failing_its_fetch_is_ignored() {
        let cluster = FakeCluster::default()
            .with_service("web", "repo/web:1.0")
            .with_service("api", "repo/api:1.0")
            .failing_definition("api:1");
        let mut environment = demo();
        environment.services.push(Service::new("api", "repo/api:latest"));

        let outcomes = run(&cluster, &mut environment, &options(None, Some("2.0")))
            .await
            .unwrap();

        assert!(outcomes[1].outcome.is_error());
        assert_eq!(Some(String::from("repo/web:2.0")), cluster.current_image("web"));
    }

    #[tokio::test]
    async fn task_only_services_are_left_alone() {
        let cluster = FakeCluster::default()
            .with_service("web", "repo/web:1.0")
            .with_service("migrate", "repo/web:1.0");
        let mut environment = demo();
        let mut migrate = Service::new("migrate", "repo/web");
        migrate.task_only = true;
        environment.services.push(migrate);

        let mut all = options(None, Some("2.0"));
        all.services = vec![String::from("web"), String::from("migrate")];
        let outcomes = run(&cluster, &mut environment, &all).await.unwrap();

        assert_eq!(1, outcomes.len());
        for call in cluster.calls() {
            match call {
                Call::DescribeServices(names) => assert_eq!(vec![String::from("web")], names),
                Call::Update { service, .. } => assert_eq!("web", service),
                Call::DescribeTaskDefinition(reference) => assert_eq!("web:1", reference),
                Call::Register(registration) => assert_eq!("web", registration.family),
            }
        }
        assert_eq!(Some(String::from("repo/web:1.0")), cluster.current_image("migrate"));
    }

    #[tokio::test]
    async fn only_task_only_selection_is_rejected() {
        let cluster = FakeCluster::default();
        let mut environment = demo();
        environment.services[0].task_only = true;

        let result = run(&cluster, &mut environment, &options(None, Some("2.0"))).await;
        assert_eq!(Some(Error::NoServicesSelected), result.err());
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_does_not_block_other_services() {
        let cluster = FakeCluster::default()
            .with_service("web", "repo/web:1.0")
            .with_service("api", "repo/api:1.0")
            .failing_definition("web:1");
        let mut environment = demo();
        environment.services.push(Service::new("api", "repo/api"));

        let outcomes = run(&cluster, &mut environment, &options(None, Some("2.0")))
            .await
            .unwrap();

        assert!(outcomes[0].outcome.is_error());
        assert_eq!(
            outcome(
                "api",
                Outcome::Updated {
                    task_definition: String::from("api:2")
                }
            ),
            outcomes[1]
        );
        assert_eq!(Some(String::from("repo/web:1.0")), cluster.current_image("web"));
    }

    #[tokio::test]
    async fn update_failure_continues_with_next_service() {
        let cluster = FakeCluster::default()
            .with_service("web", "repo/web:1.0")
            .with_service("api", "repo/api:1.0")
            .failing_update("web");
        let mut environment = demo();
        environment.services.push(Service::new("api", "repo/api"));

        let outcomes = run(&cluster, &mut environment, &options(None, Some("2.0")))
            .await
            .unwrap();

        match &outcomes[0].outcome {
            Outcome::UpdateFailed {
                task_definition, ..
            } => assert_eq!("web:2", task_definition),
            other => panic!("Expected `UpdateFailed`, got {:?}", other),
        }
        assert_eq!(Some(String::from("repo/api:2.0")), cluster.current_image("api"));
    }

    #[tokio::test]
    async fn registration_failure_aborts_the_run() {
        let cluster = FakeCluster::default()
            .with_service("web", "repo/web:1.0")
            .with_service("api", "repo/api:1.0")
            .failing_registrations();
        let mut environment = demo();
        environment.services.push(Service::new("api", "repo/api"));

        let result = run(&cluster, &mut environment, &options(None, Some("2.0"))).await;

        match result.err() {
            Some(Error::Registration { family, .. }) => assert_eq!("web", family),
            other => panic!("Expected `Registration` error, got {:?}", other),
        }
        assert!(!cluster
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Update { .. })));
        assert_eq!(
            1,
            cluster
                .calls()
                .iter()
                .filter(|call| matches!(call, Call::Register(_)))
                .count()
        );
    }

    #[tokio::test]
    async fn service_missing_from_cluster_is_reported() {
        let cluster = FakeCluster::default();

        let outcomes = run(&cluster, &mut demo(), &options(None, Some("2.0")))
            .await
            .unwrap();

        assert_eq!(vec![outcome("web", Outcome::NotRunning)], outcomes);
        assert!(cluster.writes().is_empty());
    }

    #[tokio::test]
    async fn dry_run_performs_no_writes() {
        let cluster = FakeCluster::default().with_service("web", "repo/web:1.0");
        let mut dry = options(None, Some("2.0"));
        dry.dry_run = true;

        let outcomes = run(&cluster, &mut demo(), &dry).await.unwrap();

        assert_eq!(
            vec![outcome(
                "web",
                Outcome::WouldUpdate {
                    current: String::from("repo/web:1.0"),
                    desired: String::from("repo/web:2.0"),
                }
            )],
            outcomes
        );
        assert!(cluster.writes().is_empty());
    }

    #[tokio::test]
    async fn registry_is_used_per_service() {
        let cluster = FakeCluster::default()
            .with_service("web", "repo/web:1.0")
            .with_service("api", "repo/api:1.0");
        let mut environment = demo();
        environment.services.push(Service::new("api", "repo/api"));

        run(&cluster, &mut environment, &options(None, Some("3.0")))
            .await
            .unwrap();

        assert_eq!(Some(String::from("repo/web:3.0")), cluster.current_image("web"));
        assert_eq!(Some(String::from("repo/api:3.0")), cluster.current_image("api"));
    }
}
