//! The remote contract the deploy pipeline depends on.
//!
//! Four operations are all this tool needs from a container orchestrator:
//! describe services, describe a task definition, register a task
//! definition and force a service redeploy. [`crate::ecs::Ecs`] implements
//! them against AWS ECS.

use async_trait::async_trait;
use aws_sdk_ecs::model::{Compatibility, ContainerDefinition, NetworkMode};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Snapshot of one service as reported by the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceStatus {
    pub name: String,
    /// Task definition of the most recent deployment.
    pub task_definition: Option<String>,
    pub status: String,
    pub running_count: i32,
}

/// A name the cluster could not describe, with the reason it gave.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupFailure {
    pub reference: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterServices {
    pub services: Vec<ServiceStatus>,
    pub failures: Vec<LookupFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub family: String,
    pub revision: i32,
    pub container_definitions: Vec<ContainerDefinition>,
    pub task_role_arn: Option<String>,
    pub execution_role_arn: Option<String>,
    pub network_mode: Option<NetworkMode>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub requires_compatibilities: Vec<Compatibility>,
}

impl TaskDefinition {
    /// `family:revision`, accepted anywhere ECS takes a task definition.
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.family, self.revision)
    }

    /// Image of the first container, the only one this tool manages.
    pub fn primary_image(&self) -> Option<&str> {
        self.container_definitions
            .first()
            .and_then(|container| container.image())
    }

    /// A registration copying this definition with the first container's
    /// image replaced.
    pub fn with_image(&self, image: &str) -> Registration {
        let mut container_definitions = self.container_definitions.clone();
        if let Some(primary) = container_definitions.first_mut() {
            primary.image = Some(image.to_string());
        }

        Registration {
            family: self.family.clone(),
            container_definitions,
            task_role_arn: self.task_role_arn.clone(),
            execution_role_arn: self.execution_role_arn.clone(),
            network_mode: self.network_mode.clone(),
            cpu: self.cpu.clone(),
            memory: self.memory.clone(),
            requires_compatibilities: self.requires_compatibilities.clone(),
        }
    }
}

/// Request for a new revision of a task definition family.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub family: String,
    pub container_definitions: Vec<ContainerDefinition>,
    pub task_role_arn: Option<String>,
    pub execution_role_arn: Option<String>,
    pub network_mode: Option<NetworkMode>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub requires_compatibilities: Vec<Compatibility>,
}

#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn describe_services(
        &self,
        cluster: &str,
        names: &[String],
    ) -> Result<ClusterServices, RemoteError>;

    async fn describe_task_definition(&self, reference: &str)
        -> Result<TaskDefinition, RemoteError>;

    /// Returns the registered definition, carrying its new revision.
    async fn register_task_definition(
        &self,
        registration: &Registration,
    ) -> Result<TaskDefinition, RemoteError>;

    /// Points the service at `task_definition` and forces a new deployment.
    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        task_definition: &str,
    ) -> Result<(), RemoteError>;
}
