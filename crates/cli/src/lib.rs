pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::runtime::Runtime;

use sejong_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use sejong_db::GatewaySlot;
use sejong_service::SessionStore;

use commands::purchase::ReceiptArgs;
use commands::{bootstrap_failure, CliRuntime, CommandResult, EXIT_CONFIG};

#[derive(Debug, Parser)]
#[command(
    name = "sejong",
    about = "Sejong cultural intern dashboard operator CLI",
    long_about = "Review requests, lesson plans and flights, record purchases and receipts, and inspect student budgets against the dashboard backend.",
    after_help = "Examples:\n  sejong doctor --json\n  sejong admin-login --code $SEJONG_ADMIN_ACCESS_CODE\n  sejong requests --status pending\n  sejong approve request r-1 --yes\n  sejong receipt r-1 --file scan.jpg --amount 35000 --date 2025-03-02"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Read configuration from this file")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Include underlying error detail in failures")]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config, gateway reachability, and the stored session")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Sign in as a student")]
    Login {
        #[arg(long)]
        name: String,
        #[arg(long, value_name = "YYYY-MM-DD")]
        birth_date: NaiveDate,
        #[arg(long)]
        password: Option<String>,
    },
    #[command(about = "Sign in as an administrator with the access code")]
    AdminLogin {
        #[arg(long)]
        code: String,
    },
    #[command(about = "Clear the stored session")]
    Logout,
    #[command(about = "List purchase requests with their normalized status")]
    Requests {
        #[arg(long, help = "Comma-separated statuses, e.g. pending,approved")]
        status: Option<String>,
        #[arg(long, help = "Only requests from this student (administrators)")]
        user: Option<String>,
    },
    #[command(about = "List lesson plans")]
    LessonPlans {
        #[arg(long)]
        status: Option<String>,
    },
    #[command(about = "List flight requests")]
    Flights {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },
    #[command(about = "List institutes")]
    Institutes,
    #[command(about = "List exam questions")]
    ExamQuestions {
        #[arg(long, help = "Only active questions, in exam order")]
        active: bool,
    },
    #[command(about = "Approve a record (request, lesson-plan, flight, budget)")]
    Approve {
        kind: String,
        id: String,
        #[arg(long, help = "Confirm the approval; without it nothing is written")]
        yes: bool,
    },
    #[command(about = "Reject a record with a reason shown to the student")]
    Reject {
        kind: String,
        id: String,
        #[arg(long)]
        reason: String,
    },
    #[command(about = "Activate an institute or exam question")]
    Activate { kind: String, id: String },
    #[command(about = "Deactivate an institute or exam question")]
    Deactivate { kind: String, id: String },
    #[command(about = "Decide the special baggage attached to a flight request")]
    Baggage {
        id: String,
        #[arg(long, conflicts_with = "reject", required_unless_present = "reject")]
        approve: bool,
        #[arg(long, value_name = "REASON")]
        reject: Option<String>,
    },
    #[command(about = "Mark an approved flight request as ticketed")]
    Complete { id: String },
    #[command(about = "Submit a lesson plan for review")]
    SubmitPlan {
        #[arg(help = "Student id (administrators only)")]
        user: Option<String>,
    },
    #[command(about = "Mark an approved online request as purchased")]
    Purchase {
        id: String,
        #[arg(long, help = "Final amount paid, if it differs from the requested price")]
        amount: Option<Decimal>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
    },
    #[command(about = "Upload an offline receipt and mark the request purchased")]
    Receipt {
        id: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        amount: Decimal,
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: NaiveDate,
        #[arg(long)]
        store: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    #[command(about = "Show a student's lesson-material budget")]
    Budget {
        #[arg(help = "Student id (administrators only)")]
        user: Option<String>,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                debug: self.debug.then_some(true),
                ..ConfigOverrides::default()
            },
        }
    }
}

fn init_logging(config: &AppConfig) {
    use sejong_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    // stdout carries the command outcome, so logs go to stderr
    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_max_level(log_level)
                .with_writer(std::io::stderr)
                .compact()
                .init();
        }
        Pretty => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_max_level(log_level)
                .with_writer(std::io::stderr)
                .pretty()
                .init();
        }
        Json => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_max_level(log_level)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
    }
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    // Logging follows the config when it loads; commands report config errors themselves.
    let loaded = AppConfig::load(options.clone()).ok();
    init_logging(loaded.as_ref().unwrap_or(&AppConfig::default()));

    let result = match cli.command {
        Command::Config => commands::config::run(options),
        Command::Logout => {
            let path = loaded
                .map(|config| config.session.path)
                .unwrap_or_else(|| AppConfig::default().session.path);
            commands::auth::logout(&SessionStore::new(path))
        }
        command => match runtime() {
            Ok(runtime) => runtime.block_on(dispatch(command, options)),
            Err(error) => {
                CommandResult::failure("runtime", "runtime", format!("{error:#}"), EXIT_CONFIG)
            }
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

async fn dispatch(command: Command, options: LoadOptions) -> CommandResult {
    let slot = GatewaySlot::new();

    if let Command::Doctor { json } = command {
        return commands::doctor::run(options, &slot, json).await;
    }

    let name = command_name(&command);
    let rt = match CliRuntime::connect(options, &slot).await {
        Ok(rt) => rt,
        Err(error) => return bootstrap_failure(name, &error),
    };

    match command {
        Command::Login { name, birth_date, password } => {
            commands::auth::login(&rt, name, birth_date, password).await
        }
        Command::AdminLogin { code } => commands::auth::admin_login(&rt, code),
        Command::Requests { status, user } => commands::records::requests(&rt, status, user).await,
        Command::LessonPlans { status } => commands::records::lesson_plans(&rt, status).await,
        Command::Flights { status, user } => commands::records::flights(&rt, status, user).await,
        Command::Institutes => commands::records::institutes(&rt).await,
        Command::ExamQuestions { active } => commands::records::exam_questions(&rt, active).await,
        Command::Approve { kind, id, yes } => commands::review::approve(&rt, kind, id, yes).await,
        Command::Reject { kind, id, reason } => {
            commands::review::reject(&rt, kind, id, reason).await
        }
        Command::Activate { kind, id } => commands::review::set_active(&rt, kind, id, true).await,
        Command::Deactivate { kind, id } => {
            commands::review::set_active(&rt, kind, id, false).await
        }
        Command::Baggage { id, approve: _, reject } => {
            let approve = reject.is_none();
            commands::review::baggage(&rt, id, approve, reject).await
        }
        Command::Complete { id } => commands::review::complete(&rt, id).await,
        Command::SubmitPlan { user } => commands::review::submit_plan(&rt, user).await,
        Command::Purchase { id, amount, date } => {
            commands::purchase::purchase(&rt, id, amount, date).await
        }
        Command::Receipt { id, file, amount, date, store, note } => {
            let args = ReceiptArgs { file, amount, date, store, note };
            commands::purchase::receipt(&rt, id, args).await
        }
        Command::Budget { user } => commands::budget::run(&rt, user).await,
        Command::Doctor { .. } | Command::Config | Command::Logout => CommandResult::failure(
            name,
            "internal",
            "command does not run against the backend",
            EXIT_CONFIG,
        ),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Doctor { .. } => "doctor",
        Command::Config => "config",
        Command::Login { .. } => "login",
        Command::AdminLogin { .. } => "admin-login",
        Command::Logout => "logout",
        Command::Requests { .. } => "requests",
        Command::LessonPlans { .. } => "lesson-plans",
        Command::Flights { .. } => "flights",
        Command::Institutes => "institutes",
        Command::ExamQuestions { .. } => "exam-questions",
        Command::Approve { .. } => "approve",
        Command::Reject { .. } => "reject",
        Command::Activate { .. } => "activate",
        Command::Deactivate { .. } => "deactivate",
        Command::Baggage { .. } => "baggage",
        Command::Complete { .. } => "complete",
        Command::SubmitPlan { .. } => "submit-plan",
        Command::Purchase { .. } => "purchase",
        Command::Receipt { .. } => "receipt",
        Command::Budget { .. } => "budget",
    }
}
