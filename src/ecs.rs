use async_trait::async_trait;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_sdk_ecs::model;
use aws_types::credentials::ProvideCredentials;
use aws_types::region::Region;

use crate::orchestrator::{
    ClusterServices, LookupFailure, Orchestrator, Registration, RemoteError, ServiceStatus,
    TaskDefinition,
};

/// DescribeServices accepts at most this many names per request.
const DESCRIBE_SERVICES_BATCH: usize = 10;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SessionError {
    #[error("Unable to load credentials for profile `{0}`: {1}")]
    Credentials(String, String),
}

pub struct Ecs {
    client: aws_sdk_ecs::Client,
}

impl Ecs {
    /// Builds a client for `region`. A named profile is resolved eagerly so a
    /// broken profile fails before the first ECS call.
    pub async fn connect(region: &str, profile: Option<&str>) -> Result<Self, SessionError> {
        let mut loader = aws_config::from_env().region(Region::new(region.to_string()));

        if let Some(profile) = profile {
            let provider = ProfileFileCredentialsProvider::builder()
                .profile_name(profile)
                .build();
            if let Err(error) = provider.provide_credentials().await {
                return Err(SessionError::Credentials(
                    profile.to_string(),
                    error.to_string(),
                ));
            }
            loader = loader.credentials_provider(provider);
        }

        let sdk_config = loader.load().await;
        let client = aws_sdk_ecs::Client::new(&sdk_config);

        return Ok(Self { client });
    }
}

fn remote_error(error: aws_sdk_ecs::Error) -> RemoteError {
    use aws_sdk_ecs::Error;

    let code = match &error {
        Error::ServerException(_) => "ServerException",
        Error::ClientException(_) => "ClientException",
        Error::InvalidParameterException(_) => "InvalidParameterException",
        Error::ClusterNotFoundException(_) => "ClusterNotFoundException",
        Error::ServiceNotFoundException(_) => "ServiceNotFoundException",
        Error::ServiceNotActiveException(_) => "ServiceNotActiveException",
        Error::PlatformUnknownException(_) => "PlatformUnknownException",
        Error::PlatformTaskDefinitionIncompatibilityException(_) => {
            "PlatformTaskDefinitionIncompatibilityException"
        }
        Error::AccessDeniedException(_) => "AccessDeniedException",
        _ => "Unhandled",
    };

    return RemoteError::new(code, error.to_string());
}

fn task_definition_from(definition: &model::TaskDefinition) -> TaskDefinition {
    TaskDefinition {
        family: definition.family().unwrap_or_default().to_string(),
        revision: definition.revision(),
        container_definitions: definition
            .container_definitions()
            .unwrap_or_else(|| &[])
            .to_vec(),
        task_role_arn: definition.task_role_arn().map(String::from),
        execution_role_arn: definition.execution_role_arn().map(String::from),
        network_mode: definition.network_mode().cloned(),
        cpu: definition.cpu().map(String::from),
        memory: definition.memory().map(String::from),
        requires_compatibilities: definition
            .requires_compatibilities()
            .unwrap_or_else(|| &[])
            .to_vec(),
    }
}

/// Task definition of the `PRIMARY` deployment, falling back to the first
/// one listed.
fn current_task_definition(service: &model::Service) -> Option<String> {
    let deployments = service.deployments().unwrap_or_else(|| &[]);
    deployments
        .iter()
        .find(|deployment| deployment.status() == Some("PRIMARY"))
        .or_else(|| deployments.first())
        .and_then(|deployment| deployment.task_definition())
        .map(String::from)
}

#[async_trait]
impl Orchestrator for Ecs {
    async fn describe_services(
        &self,
        cluster: &str,
        names: &[String],
    ) -> Result<ClusterServices, RemoteError> {
        let mut result = ClusterServices::default();

        for batch in names.chunks(DESCRIBE_SERVICES_BATCH) {
            let output = match self
                .client
                .describe_services()
                .cluster(cluster)
                .set_services(Some(batch.to_vec()))
                .send()
                .await
            {
                Ok(data) => data,
                Err(error) => return Err(remote_error(error.into())),
            };

            for service in output.services().unwrap_or_else(|| &[]) {
                let name = match service.service_name() {
                    Some(name) => name.to_string(),
                    None => continue,
                };
                result.services.push(ServiceStatus {
                    name,
                    task_definition: current_task_definition(service),
                    status: service.status().unwrap_or_default().to_string(),
                    running_count: service.running_count(),
                });
            }

            for failure in output.failures().unwrap_or_else(|| &[]) {
                result.failures.push(LookupFailure {
                    reference: failure.arn().unwrap_or_default().to_string(),
                    reason: failure.reason().unwrap_or_default().to_string(),
                });
            }
        }

        return Ok(result);
    }

    async fn describe_task_definition(
        &self,
        reference: &str,
    ) -> Result<TaskDefinition, RemoteError> {
        let output = match self
            .client
            .describe_task_definition()
            .task_definition(reference)
            .send()
            .await
        {
            Ok(data) => data,
            Err(error) => return Err(remote_error(error.into())),
        };

        match output.task_definition() {
            Some(definition) => Ok(task_definition_from(definition)),
            None => Err(RemoteError::new(
                "ClientException",
                format!("no task definition returned for {}", reference),
            )),
        }
    }

    async fn register_task_definition(
        &self,
        registration: &Registration,
    ) -> Result<TaskDefinition, RemoteError> {
        let requires_compatibilities = if registration.requires_compatibilities.is_empty() {
            None
        } else {
            Some(registration.requires_compatibilities.clone())
        };

        let output = match self
            .client
            .register_task_definition()
            .family(&registration.family)
            .set_container_definitions(Some(registration.container_definitions.clone()))
            .set_task_role_arn(registration.task_role_arn.clone())
            .set_execution_role_arn(registration.execution_role_arn.clone())
            .set_network_mode(registration.network_mode.clone())
            .set_cpu(registration.cpu.clone())
            .set_memory(registration.memory.clone())
            .set_requires_compatibilities(requires_compatibilities)
            .send()
            .await
        {
            Ok(data) => data,
            Err(error) => return Err(remote_error(error.into())),
        };

        match output.task_definition() {
            Some(definition) => Ok(task_definition_from(definition)),
            None => Err(RemoteError::new(
                "ClientException",
                format!("no task definition returned for family {}", registration.family),
            )),
        }
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        task_definition: &str,
    ) -> Result<(), RemoteError> {
        let result = self
            .client
            .update_service()
            .cluster(cluster)
            .service(service)
            .task_definition(task_definition)
            .force_new_deployment(true)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) => Err(remote_error(error.into())),
        }
    }
}
