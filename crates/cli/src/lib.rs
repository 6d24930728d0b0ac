pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use adpilot_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use adpilot_core::domain::entity::{Provider, ScopeType};
use adpilot_core::domain::metrics::MetricsWindow;
use adpilot_core::domain::recommendation::{
    Category, FeedbackType, Priority, RecommendationAction, RecommendationFilters,
    RecommendationStatus,
};
use clap::{Args, Parser, Subcommand};

use crate::commands::action::ActionArgs;
use crate::commands::feedback::FeedbackArgs;
use crate::commands::generate::GenerateArgs;
use crate::commands::heuristics::HeuristicsOp;
use crate::commands::sync_health::SyncHealthArgs;

#[derive(Debug, Parser)]
#[command(
    name = "adpilot",
    about = "Adpilot operator CLI",
    long_about = "Generate, inspect and act on ad-account recommendations from playbooks and heuristics.",
    after_help = "Examples:\n  adpilot doctor --json\n  adpilot seed --file demo.json\n  adpilot generate --account acct-1 --provider meta\n  adpilot list --account acct-1 --status proposed"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Path to adpilot.toml")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[arg(long, global = true, value_parser = parse_log_format, help = "Override logging.format (compact|pretty|json)")]
    log_format: Option<LogFormat>,
    #[arg(long, global = true, help = "Enable LLM enrichment regardless of configuration")]
    llm: bool,
}

impl GlobalArgs {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
                log_format: self.log_format,
                llm_enabled: self.llm.then_some(true),
                ..ConfigOverrides::default()
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, playbooks, LLM readiness and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Import campaigns, ad groups, ads and daily insights from a JSON file")]
    Seed {
        #[arg(long)]
        file: PathBuf,
    },
    #[command(about = "Evaluate playbooks for an account and persist new recommendations")]
    Generate {
        #[arg(long)]
        account: String,
        #[arg(long, value_parser = parse_provider)]
        provider: Provider,
        #[arg(long, value_parser = parse_scope)]
        entity_type: Option<ScopeType>,
        #[arg(long = "entity-id")]
        entity_ids: Vec<String>,
        #[arg(long = "playbook")]
        playbooks: Vec<String>,
        #[arg(long = "window", value_parser = parse_window)]
        windows: Vec<MetricsWindow>,
    },
    #[command(about = "Run the daily-metrics heuristic rules and manage their recommendations")]
    Heuristics {
        #[command(subcommand)]
        command: HeuristicsCommand,
    },
    #[command(about = "List recommendations with their recent feedback")]
    List {
        #[arg(long)]
        account: String,
        #[arg(long, value_parser = parse_provider)]
        provider: Option<Provider>,
        #[arg(long, value_parser = parse_status)]
        status: Option<RecommendationStatus>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,
        #[arg(long, value_parser = parse_scope)]
        scope_type: Option<ScopeType>,
    },
    #[command(about = "Summarise recommendations by status, priority and category")]
    Stats {
        #[arg(long)]
        account: String,
    },
    #[command(about = "Accept, reject, snooze, apply or revert a recommendation")]
    Action {
        id: String,
        #[arg(value_parser = parse_action)]
        action: RecommendationAction,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long)]
        snooze_days: Option<i64>,
        #[arg(long, help = "JSON recorded as the apply result")]
        result: Option<String>,
    },
    #[command(about = "Record thumbs up/down or a comment on a recommendation")]
    Feedback {
        id: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        user: String,
        #[arg(long = "type", value_parser = parse_feedback_type)]
        feedback_type: FeedbackType,
        #[arg(long)]
        comment: Option<String>,
    },
    #[command(about = "Check entity consistency and classify provider sync errors")]
    SyncHealth {
        #[arg(long)]
        account: String,
        #[arg(long, value_parser = parse_provider)]
        provider: Provider,
        #[arg(long = "error", help = "Provider error message from a failed sync (repeatable)")]
        errors: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
enum HeuristicsCommand {
    #[command(about = "Evaluate all heuristic rules for an account's active campaigns")]
    Run {
        #[arg(long)]
        account: String,
    },
    #[command(about = "List proposed, unexpired and unsnoozed recommendations")]
    Active {
        #[arg(long)]
        account: String,
    },
    #[command(about = "List every unexpired recommendation")]
    All {
        #[arg(long)]
        account: String,
    },
    Accept {
        id: String,
    },
    Reject {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Snooze {
        id: String,
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
}

impl From<HeuristicsCommand> for HeuristicsOp {
    fn from(command: HeuristicsCommand) -> Self {
        match command {
            HeuristicsCommand::Run { account } => Self::Run { account_id: account },
            HeuristicsCommand::Active { account } => Self::Active { account_id: account },
            HeuristicsCommand::All { account } => Self::All { account_id: account },
            HeuristicsCommand::Accept { id } => Self::Accept { id },
            HeuristicsCommand::Reject { id, reason } => Self::Reject { id, reason },
            HeuristicsCommand::Snooze { id, days } => Self::Snooze { id, days },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.global.load_options();

    // Logging falls back to defaults when the config is broken; the command reports why.
    let logging = AppConfig::load(options.clone())
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    logging::init(&logging);

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Doctor { json } => {
            let (output, healthy) = commands::doctor::run(&options, json);
            commands::CommandResult { exit_code: if healthy { 0 } else { 1 }, output }
        }
        Command::Seed { file } => commands::seed::run(&options, &file),
        Command::Generate { account, provider, entity_type, entity_ids, playbooks, windows } => {
            commands::generate::run(
                &options,
                GenerateArgs { account_id: account, provider, entity_type, entity_ids, playbooks, windows },
            )
        }
        Command::Heuristics { command } => commands::heuristics::run(&options, command.into()),
        Command::List { account, provider, status, priority, category, scope_type } => {
            let filters = RecommendationFilters { provider, status, priority, category, scope_type };
            commands::list::run(&options, account, filters)
        }
        Command::Stats { account } => commands::stats::run(&options, account),
        Command::Action { id, action, reason, snooze_days, result } => commands::action::run(
            &options,
            ActionArgs { recommendation_id: id, action, reason, snooze_days, result },
        ),
        Command::Feedback { id, account, user, feedback_type, comment } => commands::feedback::run(
            &options,
            FeedbackArgs { recommendation_id: id, account_id: account, user_id: user, feedback_type, comment },
        ),
        Command::SyncHealth { account, provider, errors } => commands::sync_health::run(
            &options,
            SyncHealthArgs { account_id: account, provider, errors },
        ),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn parse_provider(value: &str) -> Result<Provider, String> {
    Provider::parse(value).ok_or_else(|| format!("unknown provider `{value}` (expected meta|google)"))
}

fn parse_scope(value: &str) -> Result<ScopeType, String> {
    ScopeType::parse(value).ok_or_else(|| format!("unknown entity type `{value}` (expected campaign|ad_group|ad)"))
}

fn parse_window(value: &str) -> Result<MetricsWindow, String> {
    MetricsWindow::parse(value).ok_or_else(|| format!("unknown window `{value}` (expected 7d|14d|30d)"))
}

fn parse_status(value: &str) -> Result<RecommendationStatus, String> {
    RecommendationStatus::parse(value).ok_or_else(|| format!("unknown status `{value}`"))
}

fn parse_priority(value: &str) -> Result<Priority, String> {
    Priority::parse(value).ok_or_else(|| format!("unknown priority `{value}`"))
}

fn parse_category(value: &str) -> Result<Category, String> {
    Category::parse(value).ok_or_else(|| format!("unknown category `{value}`"))
}

fn parse_action(value: &str) -> Result<RecommendationAction, String> {
    value.parse::<RecommendationAction>().map_err(|error| error.to_string())
}

fn parse_feedback_type(value: &str) -> Result<FeedbackType, String> {
    value.parse::<FeedbackType>().map_err(|error| error.to_string())
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse::<LogFormat>().map_err(|error| error.to_string())
}
