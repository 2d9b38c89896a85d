use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::{fs, io, path::PathBuf};
use validator::{Validate, ValidationError};

use crate::orchestrator::TaskDefinition;

pub const PRIMARY_DIR: &str = "gtd";
pub const FALLBACK_DIR: &str = "configs";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("No configuration found, tried: {}", display_paths(.0))]
    NotFound(Vec<PathBuf>),

    #[error("Parsing error in {0}: {1}")]
    ParsingError(String, String),

    #[error("Validation errors in {0}: {1}")]
    ValidationError(String, String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One deployable entry of an environment.
///
/// The first four fields come from the configuration file; the rest are
/// filled in while the deploy pipeline runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Service {
    #[validate(length(min = 1, message = "service name must not be empty"))]
    pub name: String,

    #[validate(length(min = 1, message = "service registry must not be empty"))]
    pub registry: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(default, rename = "taskonly")]
    pub task_only: bool,

    #[serde(skip)]
    pub task_reference: Option<String>,

    #[serde(skip)]
    pub status: String,

    #[serde(skip)]
    pub running_count: i32,

    #[serde(skip)]
    pub task_definition: Option<TaskDefinition>,
}

impl Service {
    pub fn new(name: impl Into<String>, registry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: registry.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = "validate_unique_names"))]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,

    #[validate(length(min = 1, message = "ecs_cluster must not be empty"))]
    pub ecs_cluster: String,

    #[validate(length(min = 1, message = "ecs_region must not be empty"))]
    pub ecs_region: String,

    #[validate]
    pub services: Vec<Service>,
}

/// Directories searched, in order, for `<environment>.yaml`.
#[derive(Debug, Clone)]
pub struct SearchPaths {
    pub primary: PathBuf,
    pub fallback: PathBuf,
}

impl Default for SearchPaths {
    fn default() -> Self {
        Self {
            primary: PathBuf::from(PRIMARY_DIR),
            fallback: PathBuf::from(FALLBACK_DIR),
        }
    }
}

impl SearchPaths {
    pub fn with_primary(mut self, primary: Option<PathBuf>) -> Self {
        if let Some(primary) = primary {
            self.primary = primary;
        }
        self
    }

    fn candidates(&self, environment: &str) -> Vec<PathBuf> {
        let file_name = format!("{}.yaml", environment);
        vec![self.primary.join(&file_name), self.fallback.join(&file_name)]
    }
}

pub fn load(environment: &str, search: &SearchPaths) -> Result<Environment, Error> {
    let candidates = search.candidates(environment);
    let path = match candidates.iter().find(|path| path.is_file()) {
        Some(path) => path,
        None => return Err(Error::NotFound(candidates)),
    };

    tracing::debug!("loading environment {} from {}", environment, path.display());
    return parse(path);
}

pub fn parse(path: &PathBuf) -> Result<Environment, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::NotFound(vec![path.clone()])),
            _ => Err(Error::Unknown(error.to_string())),
        },
    }?;

    let environment: Environment = match serde_yaml::from_str(&contents) {
        Ok(data) => Ok(data),
        Err(error) => Err(Error::ParsingError(
            path.display().to_string(),
            error.to_string(),
        )),
    }?;

    match environment.validate() {
        Ok(_) => (),
        Err(error) => {
            return Err(Error::ValidationError(
                path.display().to_string(),
                error.to_string(),
            ))
        }
    }

    return Ok(environment);
}

fn validate_unique_names(environment: &Environment) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for service in &environment.services {
        if !seen.insert(service.name.as_str()) {
            let mut error = ValidationError::new("duplicate_service_name");
            error.message = Some(format!("service `{}` is declared twice", service.name).into());
            return Err(error);
        }
    }

    return Ok(());
}
