//! Cirrus-CI GraphQL collaborator.
//!
//! The provenance check correlates image labels against real build and task
//! records. All queries are read-only and go through [`CirrusApi`], so tests
//! can substitute canned replies; [`CirrusClient`] is the production
//! implementation speaking JSON-over-POST to the public endpoint.

use chrono::{DateTime, Utc};
use log::debug;
use serde_json::{Value, json};
use std::sync::OnceLock;
use std::time::Duration;

/// Public GraphQL endpoint for Cirrus-CI.
const CIRRUS_GQL_URL: &str = "https://api.cirrus-ci.com/graphql";

/// Network timeout for GraphQL requests.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Cirrus-CI build IDs are never small; anything at or below this is noise.
pub const MIN_PLAUSIBLE_BUILD_ID: u64 = 123_456_789;

/// Errors arising from Cirrus-CI queries.
///
/// These signal an environment fault rather than a content problem; the
/// provenance check surfaces them as `INDETERMINATE`.
#[derive(Debug, thiserror::Error)]
pub enum CirrusError {
    /// The HTTP transport failed.
    #[error("Cirrus-CI request failed: {reason}")]
    Transport {
        /// Description of the transport failure.
        reason: String,
    },

    /// The service replied with GraphQL errors and no data.
    #[error("Bad Cirrus-CI GraphQL query or service failure: {errors}")]
    Query {
        /// The reported GraphQL errors, serialized for diagnosis.
        errors: String,
    },

    /// The reply parsed but was missing an expected field.
    #[error("Unexpected Cirrus-CI reply shape: missing {field}")]
    Shape {
        /// Dotted path of the missing field.
        field: &'static str,
    },
}

/// One task record of a build, as needed for provenance filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDetail {
    /// Task ID.
    pub id: u64,
    /// Full task name.
    pub name: String,
    /// Task name alias, e.g. `image_build`.
    pub name_alias: String,
    /// Final task status, e.g. `COMPLETED`.
    pub status: String,
    /// Environment variables the task was triggered with.
    pub base_environment: Vec<String>,
    /// When the task reached its final status.
    pub final_status: Option<DateTime<Utc>>,
}

/// Read-only queries against the Cirrus-CI API.
#[cfg_attr(test, mockall::automock)]
pub trait CirrusApi {
    /// Whether Cirrus-CI knows the GitHub repository `owner/name`.
    ///
    /// # Errors
    ///
    /// Returns [`CirrusError`] on transport or service failure.
    fn repository_exists(&self, owner: &str, name: &str) -> Result<bool, CirrusError>;

    /// Build IDs found for `sha` in `owner/name`.
    ///
    /// # Errors
    ///
    /// Returns [`CirrusError`] on transport or service failure.
    fn builds_for_commit(&self, owner: &str, name: &str, sha: &str)
    -> Result<Vec<u64>, CirrusError>;

    /// Branch the build ran on.
    ///
    /// # Errors
    ///
    /// Returns [`CirrusError`] on transport or service failure.
    fn build_branch(&self, id: u64) -> Result<String, CirrusError>;

    /// When the build was created.
    ///
    /// # Errors
    ///
    /// Returns [`CirrusError`] on transport or service failure.
    fn build_created(&self, id: u64) -> Result<DateTime<Utc>, CirrusError>;

    /// Task details of the build.
    ///
    /// # Errors
    ///
    /// Returns [`CirrusError`] on transport or service failure.
    fn build_tasks(&self, id: u64) -> Result<Vec<TaskDetail>, CirrusError>;
}

/// GraphQL client for the public Cirrus-CI endpoint.
pub struct CirrusClient {
    url: String,
}

impl CirrusClient {
    /// Client against the public endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: CIRRUS_GQL_URL.to_owned(),
        }
    }

    /// Client against a custom endpoint (tests point this at a stub server).
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Issue one query, returning the `data` object.
    fn query(&self, query: &str, variables: Value) -> Result<Value, CirrusError> {
        let body = json!({"query": query, "variables": variables});
        let response = http_agent()
            .post(&self.url)
            .send_json(&body)
            .map_err(|err| CirrusError::Transport {
                reason: err.to_string(),
            })?;
        let reply: Value =
            response
                .into_body()
                .read_json()
                .map_err(|err| CirrusError::Transport {
                    reason: err.to_string(),
                })?;
        debug!("Cirrus-CI API reply: {reply}");

        let errors = reply.get("errors").filter(|errors| !errors.is_null());
        let data = reply.get("data").filter(|data| !data.is_null());
        match (data, errors) {
            (None, Some(errors)) => Err(CirrusError::Query {
                errors: errors.to_string(),
            }),
            (Some(data), _) => Ok(data.clone()),
            (None, None) => Err(CirrusError::Shape { field: "data" }),
        }
    }
}

impl Default for CirrusClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CirrusApi for CirrusClient {
    fn repository_exists(&self, owner: &str, name: &str) -> Result<bool, CirrusError> {
        let data = self.query(
            "query gh_repo_id($owner: String!, $name: String!) {\n\
             \x20 ownerRepository(platform: \"github\", owner: $owner, name: $name) { id }\n\
             }",
            json!({"owner": owner, "name": name}),
        )?;
        let id = data
            .pointer("/ownerRepository/id")
            .and_then(parse_id)
            .unwrap_or(0);
        Ok(id != 0)
    }

    fn builds_for_commit(
        &self,
        owner: &str,
        name: &str,
        sha: &str,
    ) -> Result<Vec<u64>, CirrusError> {
        let data = self.query(
            "query builds_by_commit($owner: String!, $name: String!, $sha: String!) {\n\
             \x20 searchBuilds(repositoryOwner: $owner, repositoryName: $name, SHA: $sha) { id }\n\
             }",
            json!({"owner": owner, "name": name, "sha": sha}),
        )?;
        let Some(Value::Array(builds)) = data.get("searchBuilds") else {
            return Err(CirrusError::Shape {
                field: "searchBuilds",
            });
        };
        Ok(builds
            .iter()
            .filter_map(|build| build.get("id").and_then(parse_id))
            .collect())
    }

    fn build_branch(&self, id: u64) -> Result<String, CirrusError> {
        let data = self.query(
            "query build_branch($bid: ID!) { build(id: $bid) { branch } }",
            json!({"bid": id.to_string()}),
        )?;
        data.pointer("/build/branch")
            .and_then(Value::as_str)
            .map(|branch| branch.trim().to_owned())
            .ok_or(CirrusError::Shape {
                field: "build.branch",
            })
    }

    fn build_created(&self, id: u64) -> Result<DateTime<Utc>, CirrusError> {
        let data = self.query(
            "query started_status($bid: ID!) { build(id: $bid) { buildCreatedTimestamp } }",
            json!({"bid": id.to_string()}),
        )?;
        data.pointer("/build/buildCreatedTimestamp")
            .and_then(epoch_millis)
            .ok_or(CirrusError::Shape {
                field: "build.buildCreatedTimestamp",
            })
    }

    fn build_tasks(&self, id: u64) -> Result<Vec<TaskDetail>, CirrusError> {
        let data = self.query(
            "query task_details($bid: ID!) {\n\
             \x20 build(id: $bid) {\n\
             \x20   tasks { id name nameAlias status baseEnvironment finalStatusTimestamp }\n\
             \x20 }\n\
             }",
            json!({"bid": id.to_string()}),
        )?;
        let Some(Value::Array(tasks)) = data.pointer("/build/tasks") else {
            return Err(CirrusError::Shape {
                field: "build.tasks",
            });
        };
        Ok(tasks.iter().filter_map(parse_task).collect())
    }
}

/// Parse a numeric or string-wrapped ID value.
fn parse_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

/// Parse an epoch-milliseconds value, numeric or string-wrapped.
fn epoch_millis(value: &Value) -> Option<DateTime<Utc>> {
    let millis = match value {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => text.parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp_millis(millis)
}

/// Parse one task object; malformed tasks are dropped rather than fatal.
fn parse_task(task: &Value) -> Option<TaskDetail> {
    Some(TaskDetail {
        id: task.get("id").and_then(parse_id)?,
        name: task.get("name")?.as_str()?.trim().to_owned(),
        name_alias: task
            .get("nameAlias")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        status: task
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        base_environment: task
            .get("baseEnvironment")
            .and_then(Value::as_array)
            .map(|environment| {
                environment
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default(),
        final_status: task.get("finalStatusTimestamp").and_then(epoch_millis),
    })
}

/// Shared ureq agent with request timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(QUERY_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}
