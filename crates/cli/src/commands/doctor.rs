use std::time::Instant;

use sejong_core::config::{AppConfig, LoadOptions};
use sejong_db::GatewaySlot;
use sejong_service::{bootstrap, BootstrapError, ServiceContext, Session, SessionStore};
use serde::Serialize;

use super::CommandResult;

const EXIT_DOCTOR_FAILED: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Verdict {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    status: Verdict,
    details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_ms: Option<u128>,
}

impl Check {
    fn new(name: &'static str, status: Verdict, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into(), elapsed_ms: None }
    }

    fn timed(mut self, started: Instant) -> Self {
        self.elapsed_ms = Some(started.elapsed().as_millis());
        self
    }
}

#[derive(Debug, Serialize)]
struct Report {
    overall_status: Verdict,
    summary: String,
    checks: Vec<Check>,
}

impl Report {
    fn from_checks(checks: Vec<Check>) -> Self {
        let failed = checks.iter().filter(|check| check.status == Verdict::Fail).count();
        let passed = checks.iter().filter(|check| check.status == Verdict::Pass).count();
        let overall_status = if failed > 0 { Verdict::Fail } else { Verdict::Pass };
        let summary = format!(
            "doctor: {passed} passed, {failed} failed, {} skipped",
            checks.len() - passed - failed
        );
        Self { overall_status, summary, checks }
    }
}

/// Exits 1 when any check fails.
pub async fn run(options: LoadOptions, slot: &GatewaySlot, json_output: bool) -> CommandResult {
    let report = Report::from_checks(collect_checks(options, slot).await);
    let exit_code = if report.overall_status == Verdict::Fail { EXIT_DOCTOR_FAILED } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor report could not be encoded\",\"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };
    CommandResult { exit_code, output }
}

async fn collect_checks(options: LoadOptions, slot: &GatewaySlot) -> Vec<Check> {
    let started = Instant::now();
    let application = match bootstrap(options, slot).await {
        Ok(application) => application,
        Err(error) => {
            let name = match error {
                BootstrapError::Config(_) => "config_validation",
                BootstrapError::Gateway(_) => "gateway_client",
            };
            let mut checks = vec![Check::new(name, Verdict::Fail, error.to_string())];
            checks.extend(["gateway_reachability", "feature_settings", "session_state"].map(
                |name| Check::new(name, Verdict::Skipped, "configuration did not load"),
            ));
            return checks;
        }
    };

    vec![
        Check::new(
            "config_validation",
            Verdict::Pass,
            format!("gateway `{}`", application.config.gateway.url),
        )
        .timed(started),
        check_gateway(&application.config, &application.context).await,
        check_features(&application.context).await,
        check_session(&application.config),
    ]
}

async fn check_gateway(config: &AppConfig, context: &ServiceContext) -> Check {
    let started = Instant::now();
    let check = match context.settings.system_settings().await {
        Ok(settings) => Check::new(
            "gateway_reachability",
            Verdict::Pass,
            format!("reached `{}` ({} system settings)", config.rest_base_url(), settings.len()),
        ),
        Err(error) => Check::new(
            "gateway_reachability",
            Verdict::Fail,
            format!("could not reach `{}`: {error}", config.rest_base_url()),
        ),
    };
    check.timed(started)
}

/// Informational: a failing feature table does not fail the doctor run.
async fn check_features(context: &ServiceContext) -> Check {
    let started = Instant::now();
    let check = match context.settings.feature_settings().await {
        Ok(features) => {
            let active: Vec<&str> = features
                .iter()
                .filter(|feature| feature.is_active)
                .map(|feature| feature.feature_name.as_str())
                .collect();
            let details = if active.is_empty() {
                format!("{} features, none active", features.len())
            } else {
                format!("{} features, active: {}", features.len(), active.join(", "))
            };
            Check::new("feature_settings", Verdict::Pass, details)
        }
        Err(error) => Check::new("feature_settings", Verdict::Skipped, error.to_string()),
    };
    check.timed(started)
}

fn check_session(config: &AppConfig) -> Check {
    match SessionStore::new(config.session.path.clone()).load() {
        Some(Session::Admin { signed_in_at }) => Check::new(
            "session_state",
            Verdict::Pass,
            format!("administrator since {signed_in_at}"),
        ),
        Some(Session::Student { profile, signed_in_at }) => Check::new(
            "session_state",
            Verdict::Pass,
            format!("student `{}` since {signed_in_at}", profile.id),
        ),
        None => Check::new(
            "session_state",
            Verdict::Skipped,
            format!("no session at `{}`", config.session.path.display()),
        ),
    }
}

fn render_human(report: &Report) -> String {
    let mut lines = vec![report.summary.clone()];
    lines.extend(report.checks.iter().map(|check| {
        let marker = match check.status {
            Verdict::Pass => "ok",
            Verdict::Fail => "fail",
            Verdict::Skipped => "skip",
        };
        match check.elapsed_ms {
            Some(ms) => format!("- [{marker}] {} ({ms}ms): {}", check.name, check.details),
            None => format!("- [{marker}] {}: {}", check.name, check.details),
        }
    }));
    lines.join("\n")
}
