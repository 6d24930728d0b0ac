pub mod action;
pub mod config;
pub mod context;
pub mod doctor;
pub mod feedback;
pub mod generate;
pub mod heuristics;
pub mod list;
pub mod migrate;
pub mod seed;
pub mod stats;
pub mod sync_health;

use std::future::Future;

use adpilot_core::config::{AppConfig, LoadOptions};
use adpilot_core::errors::{ApplicationError, InterfaceError};
use serde::Serialize;
use serde_json::Value;
use tracing::error;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DATABASE: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_INPUT: u8 = 6;
pub const EXIT_OPERATION: u8 = 7;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success_with_data(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            correlation_id: None,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &'static str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::from_failure(command, CommandFailure::new(error_class, message, exit_code))
    }

    fn from_failure(command: &str, failure: CommandFailure) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(failure.error_class.to_string()),
            message: failure.message,
            correlation_id: failure.correlation_id,
            data: None,
        };
        Self { exit_code: failure.exit_code, output: serialize_payload(payload) }
    }
}

/// Error leg of a command body: class, message, exit code.
#[derive(Debug, Clone)]
pub struct CommandFailure {
    pub error_class: &'static str,
    pub message: String,
    pub exit_code: u8,
    pub correlation_id: Option<String>,
}

impl CommandFailure {
    pub fn new(error_class: &'static str, message: impl Into<String>, exit_code: u8) -> Self {
        Self { error_class, message: message.into(), exit_code, correlation_id: None }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new("invalid_input", message, EXIT_INPUT)
    }

    /// Maps a service error through the interface taxonomy so the operator sees a stable
    /// class plus a correlation id that also appears in the logs.
    pub fn application(command: &str, error: ApplicationError) -> Self {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        error!(
            event_name = "cli.command.failed",
            command,
            correlation_id = %correlation_id,
            error = %error,
            "command failed"
        );

        let interface = error.into_interface(correlation_id.clone());
        let error_class = match &interface {
            InterfaceError::BadRequest { .. } => "invalid_request",
            InterfaceError::NotFound { .. } => "not_found",
            InterfaceError::ServiceUnavailable { .. } => "service_unavailable",
            InterfaceError::Internal { .. } => "internal",
        };
        let detail = match &interface {
            InterfaceError::BadRequest { message, .. }
            | InterfaceError::NotFound { message, .. }
            | InterfaceError::ServiceUnavailable { message, .. }
            | InterfaceError::Internal { message, .. } => message.clone(),
        };

        Self {
            error_class,
            message: format!("{} ({detail})", interface.user_message()),
            exit_code: EXIT_OPERATION,
            correlation_id: Some(correlation_id),
        }
    }
}

/// Successful command body output.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub message: String,
    pub data: Option<Value>,
}

impl CommandOutput {
    pub fn message(message: impl Into<String>) -> Self {
        Self { message: message.into(), data: None }
    }

    pub fn with_data<T: Serialize>(message: impl Into<String>, data: &T) -> Result<Self, CommandFailure> {
        let data = serde_json::to_value(data)
            .map_err(|error| CommandFailure::new("serialization", error.to_string(), EXIT_OPERATION))?;
        Ok(Self { message: message.into(), data: Some(data) })
    }
}

/// Loads configuration, builds a current-thread runtime and drives `body` to completion.
pub fn execute<F, Fut>(command: &str, options: &LoadOptions, body: F) -> CommandResult
where
    F: FnOnce(AppConfig) -> Fut,
    Fut: Future<Output = Result<CommandOutput, CommandFailure>>,
{
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME,
            );
        }
    };

    match runtime.block_on(body(config)) {
        Ok(output) => CommandResult::success_with_data(command, output.message, output.data),
        Err(failure) => CommandResult::from_failure(command, failure),
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
