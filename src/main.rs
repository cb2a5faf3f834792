//! testwire - distributed test runner
//!
//! Runs declared, parameterized test suites in this process or across a
//! TCP connection, with log and statistics events streamed back while a
//! remote run is in flight.
//!
//! ## Usage
//!
//! ```bash
//! # Run the compiled-in suite locally
//! testwire local
//!
//! # Run one test, quick category only
//! testwire local --test channel.connect --category quick
//!
//! # Serve the suite for a remote driver
//! testwire listen --endpoint 0.0.0.0:8888
//!
//! # Drive a target on another machine and keep a JUnit report
//! testwire connect --endpoint 10.0.0.5 --junit-result run.junit.xml
//!
//! # Launch a target through a helper that dials back
//! testwire device --launcher "./run-app {endpoint}"
//!
//! # Re-render a saved result file
//! testwire result run.xml --csv run.csv
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod cli;
mod config;
mod errors;
mod host;
mod invoke;
mod launch;
mod model;
mod output;
mod serial;
mod session;
mod suite;
mod utils;
mod wire;

use cli::Args;
use config::settings::{KEY_CURRENT_CATEGORY, KEY_CURRENT_FEATURES, KEY_DISABLE_TIMEOUTS,
    KEY_LOCAL_LOG_LEVEL, KEY_LOG_LEVEL};
use config::SettingsBag;
use errors::{ExternalToolError, InternalError, ProgramError};
use model::{ResultSummary, TestPath, TestResult, TestStatus};
use output::ResultPrinter;
use session::{ConsoleBackend, LocalSession, TestConfiguration};
use suite::builtin::selfcheck_suite;
use utils::logger::{init_logger, LogLevel};
use wire::RemoteSession;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(logging_level(&args.command));

    let code = match dispatch(args).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            failure_code(&error)
        }
    };
    std::process::exit(code);
}

async fn dispatch(args: Args) -> Result<i32> {
    match args.command {
        cli::Command::Local(local_args) => run_local(local_args).await,
        cli::Command::Connect(connect_args) => run_connect(connect_args).await,
        cli::Command::Listen(listen_args) => run_listen(listen_args).await,
        cli::Command::Device(device_args) => run_device(device_args).await,
        cli::Command::Result(result_args) => show_result(result_args),
    }
}

/// Level for this process; unknown strings are rejected later, against
/// the settings, where a clean error can still be reported.
fn logging_level(command: &cli::Command) -> LogLevel {
    let common = match command {
        cli::Command::Local(args) => &args.common,
        cli::Command::Connect(args) => &args.common,
        cli::Command::Listen(args) => &args.common,
        cli::Command::Device(args) => &args.common,
        cli::Command::Result(_) => return LogLevel::Warn,
    };
    if common.debug {
        return LogLevel::Debug;
    }
    LogLevel::from_str(&common.log_level).unwrap_or(LogLevel::Warn)
}

/// Exit code for a failed command.
fn failure_code(error: &anyhow::Error) -> i32 {
    for cause in error.chain() {
        if cause.downcast_ref::<ExternalToolError>().is_some() {
            return 255;
        }
        if cause.downcast_ref::<InternalError>().is_some() {
            return -1;
        }
    }
    1
}

/// Exit code for a finished run.
fn exit_code(result: &TestResult) -> i32 {
    match ResultSummary::from_result(result).exit_status() {
        TestStatus::Success | TestStatus::None => 0,
        TestStatus::Unstable => 2,
        TestStatus::Canceled => 3,
        TestStatus::Error | TestStatus::Ignored => 1,
    }
}

async fn run_local(args: cli::LocalArgs) -> Result<i32> {
    let settings = build_settings(&args.common)?;
    let backend = console_backend(&args.common);
    let mut session =
        LocalSession::new(selfcheck_suite(), settings)?.with_backend(backend);
    apply_selection(&mut session, &args.run)?;

    if args.run.save_options {
        save_selection(&session, &args.common)?;
    }
    if print_local_info(&session, &args.run) {
        return Ok(0);
    }

    let token = cancel_on_ctrl_c();
    let started = Instant::now();
    let result = match &args.run.test {
        Some(name) => {
            let path = match session.find_case(name)? {
                Some(path) => path,
                None => return Err(ProgramError::new(format!("no test named {name}")).into()),
            };
            session.run(&path, &token).await?
        }
        None => session.run_all(&token).await?,
    };
    let elapsed = started.elapsed().as_millis() as u64;

    println!(
        "{}",
        printer(args.common.no_color, args.run.show_ignored).format_report(&result, elapsed)
    );
    write_outputs(&args.run, &result)?;
    Ok(exit_code(&result))
}

async fn run_connect(args: cli::ConnectArgs) -> Result<i32> {
    let mut settings = build_settings(&args.common)?;
    apply_remote_selection(&mut settings, &args.run)?;
    let endpoint = wire::parse_endpoint(&args.endpoint)?;

    info!("Connecting to {endpoint}");
    let mut remote =
        RemoteSession::connect(&endpoint, &settings, console_backend(&args.common)).await?;
    finish_remote(remote_flow(&mut remote, &args.run, &settings).await, remote, &args).await
}

async fn run_device(args: cli::DeviceArgs) -> Result<i32> {
    let mut settings = build_settings(&args.common)?;
    apply_remote_selection(&mut settings, &args.run)?;
    let endpoint = wire::parse_endpoint(&args.endpoint)?;

    let listener = TcpListener::bind(&endpoint)
        .await
        .with_context(|| format!("Failed to bind {endpoint}"))?;
    let launcher = launch::HelperLauncher::new(&args.launcher)?
        .with_ready_timeout(Duration::from_secs(args.ready_timeout));
    let target = launcher.launch(&listener, &endpoint).await?;
    // The helper dies with this handle once the session is over.
    let _helper = target.helper;

    let mut remote =
        RemoteSession::over(target.stream, &settings, console_backend(&args.common)).await?;
    let connect_args = cli::ConnectArgs {
        endpoint: args.endpoint,
        wait: args.wait,
        common: args.common,
        run: args.run,
    };
    finish_remote(
        remote_flow(&mut remote, &connect_args.run, &settings).await,
        remote,
        &connect_args,
    )
    .await
}

/// The run itself, separated so shutdown still happens when it fails.
async fn remote_flow(
    remote: &mut RemoteSession,
    run: &cli::RunArgs,
    settings: &SettingsBag,
) -> Result<Option<(TestResult, u64)>> {
    if run.show_categories || run.show_features || run.show_config {
        let info = remote.suite_info().await?;
        print_remote_info(&info, run, settings);
        return Ok(None);
    }

    let root = remote.load_test_suite().await?;
    let path = match &run.test {
        Some(name) => find_case_in_mirror(name, settings)?,
        None => root.path.clone(),
    };
    let case = remote.resolve_test(&path).await?;
    info!("Running {}", case.name.full_name());

    let token = cancel_on_ctrl_c();
    let started = Instant::now();
    let result = remote.run_test(&case.path, &token).await?;
    Ok(Some((result, started.elapsed().as_millis() as u64)))
}

async fn finish_remote(
    outcome: Result<Option<(TestResult, u64)>>,
    remote: RemoteSession,
    args: &cli::ConnectArgs,
) -> Result<i32> {
    if args.wait {
        drop(remote);
    } else if let Err(error) = remote.shutdown().await {
        warn!("shutdown failed: {error}");
    }

    match outcome? {
        None => Ok(0),
        Some((result, elapsed)) => {
            println!(
                "{}",
                printer(args.common.no_color, args.run.show_ignored)
                    .format_report(&result, elapsed)
            );
            write_outputs(&args.run, &result)?;
            Ok(exit_code(&result))
        }
    }
}

async fn run_listen(args: cli::ListenArgs) -> Result<i32> {
    let settings = build_settings(&args.common)?;
    let endpoint = wire::parse_endpoint(&args.endpoint)?;
    let listener = TcpListener::bind(&endpoint)
        .await
        .with_context(|| format!("Failed to bind {endpoint}"))?;

    let shutdown = cancel_on_ctrl_c();
    wire::serve(listener, selfcheck_suite(), settings, shutdown).await?;
    Ok(0)
}

fn show_result(args: cli::ResultArgs) -> Result<i32> {
    let result = output::load_result_xml(&args.input)?;
    println!(
        "{}",
        printer(args.no_color, args.show_ignored)
            .format_report(&result, result.elapsed_ms().unwrap_or(0))
    );

    if let Some(path) = &args.csv {
        output::export_csv(path, &result)?;
    }
    if let Some(path) = &args.junit_result {
        output::save_junit_xml(path, &result)?;
    }
    Ok(exit_code(&result))
}

/// Settings file overlaid with command-line assignments and flags.
fn build_settings(common: &cli::CommonArgs) -> Result<SettingsBag> {
    let mut settings = match &common.settings {
        Some(path) => SettingsBag::load(path)?,
        None => SettingsBag::load_default()?,
    };
    settings.apply_assignments(common.set.iter().map(String::as_str))?;

    if LogLevel::from_str(&common.log_level).is_none() {
        return Err(ProgramError::new(format!("unknown log level: {}", common.log_level)).into());
    }
    if let Some(level) = &common.local_log_level {
        if LogLevel::from_str(level).is_none() {
            return Err(ProgramError::new(format!("unknown log level: {level}")).into());
        }
        settings.set(KEY_LOCAL_LOG_LEVEL, level.as_str());
    }
    if common.debug {
        settings.set(KEY_DISABLE_TIMEOUTS, "true");
        settings.set(KEY_LOG_LEVEL, "debug");
    }
    Ok(settings)
}

fn console_backend(common: &cli::CommonArgs) -> Arc<ConsoleBackend> {
    let level = if common.debug { 10 } else { 0 };
    Arc::new(ConsoleBackend::new().with_debug_level(level))
}

fn printer(no_color: bool, show_ignored: bool) -> ResultPrinter {
    let mut printer = ResultPrinter::new();
    if no_color {
        printer = printer.no_color();
    }
    if show_ignored {
        printer = printer.show_ignored();
    }
    printer
}

fn apply_selection(session: &mut LocalSession, run: &cli::RunArgs) -> Result<()> {
    if let Some(category) = &run.category {
        session.configuration_mut().select_category(category)?;
    }
    if let Some(tokens) = &run.features {
        session.configuration_mut().apply_feature_tokens(tokens)?;
    }
    Ok(())
}

/// Selection for a remote run travels inside the handshake settings.
/// Validated here against the compiled-in suite, so mistakes fail
/// before a connection is made; the target validates again on its side.
fn apply_remote_selection(settings: &mut SettingsBag, run: &cli::RunArgs) -> Result<()> {
    let mut mirror = TestConfiguration::from_suite(&selfcheck_suite());
    mirror.load_from_settings(settings)?;
    if let Some(category) = &run.category {
        mirror.select_category(category)?;
        settings.set(KEY_CURRENT_CATEGORY, category);
    }
    if let Some(tokens) = &run.features {
        mirror.apply_feature_tokens(tokens)?;
        settings.set(KEY_CURRENT_FEATURES, tokens);
    }
    Ok(())
}

/// Driver and target compile in the same suite, so dotted-name lookup
/// runs against the local copy; the target re-validates the path.
fn find_case_in_mirror(name: &str, settings: &SettingsBag) -> Result<TestPath> {
    let mut mirror = LocalSession::new(selfcheck_suite(), settings.clone())?;
    match mirror.find_case(name)? {
        Some(path) => Ok(path),
        None => Err(ProgramError::new(format!("no test named {name}")).into()),
    }
}

fn save_selection(session: &LocalSession, common: &cli::CommonArgs) -> Result<()> {
    let mut persisted = session.settings().clone();
    session.configuration().save_to_settings(&mut persisted);
    let path = common
        .settings
        .clone()
        .unwrap_or_else(SettingsBag::default_save_path);
    persisted.save(&path)?;
    info!("Saved selection to {}", path.display());
    Ok(())
}

/// Listings requested by `--show-*`; returns true when one was printed.
fn print_local_info(session: &LocalSession, run: &cli::RunArgs) -> bool {
    let mut handled = false;
    if run.show_categories {
        println!("Categories:");
        for category in session.suite().categories() {
            println!("  {category}");
        }
        handled = true;
    }
    if run.show_features {
        println!("Features:");
        for feature in session.configuration().features() {
            let marker = if feature.enabled { "+" } else { "-" };
            let fixed = if feature.spec.constant.is_some() {
                " (constant)"
            } else {
                ""
            };
            println!(
                "  {marker}{} {}{fixed}",
                feature.spec.name, feature.spec.description
            );
        }
        handled = true;
    }
    if run.show_config {
        println!("Suite: {}", session.suite().name);
        println!(
            "Category: {}",
            session.configuration().current_category().unwrap_or("all")
        );
        for (key, value) in session.settings().iter() {
            println!("  {key} = {value}");
        }
        handled = true;
    }
    handled
}

fn print_remote_info(info: &wire::SuiteInfo, run: &cli::RunArgs, settings: &SettingsBag) {
    if run.show_categories {
        println!("Categories:");
        for category in &info.categories {
            println!("  {category}");
        }
    }
    if run.show_features {
        println!("Features:");
        for feature in &info.features {
            let marker = if feature.enabled { "+" } else { "-" };
            println!("  {marker}{} {}", feature.name, feature.description);
        }
    }
    if run.show_config {
        println!("Suite: {}", info.name);
        for (key, value) in settings.iter() {
            println!("  {key} = {value}");
        }
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, canceling");
            trigger.cancel();
        }
    });
    token
}

fn write_outputs(run: &cli::RunArgs, result: &TestResult) -> Result<()> {
    if let Some(path) = &run.result {
        output::save_result_xml(path, result)?;
    }
    if let Some(path) = &run.junit_result {
        output::save_junit_xml(path, result)?;
    }
    if let Some(dir) = &run.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let id = generate_run_id();
        if run.result.is_none() {
            output::save_result_xml(&dir.join(format!("{id}.xml")), result)?;
        }
        if run.junit_result.is_none() {
            output::save_junit_xml(&dir.join(format!("{id}.junit.xml")), result)?;
        }
    }
    Ok(())
}

/// Unique file stem for generated result files.
fn generate_run_id() -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("run_{timestamp}_{random:04}")
}

#[cfg(test)]
mod main_tests {
    use super::*;
    use model::TestName;

    fn leaf(status: TestStatus) -> TestResult {
        let mut root = TestResult::new(TestName::new("run"));
        root.add_child(TestResult::with_status(TestName::new("case"), status));
        root
    }

    #[test]
    fn test_exit_codes_map_to_status() {
        assert_eq!(exit_code(&leaf(TestStatus::Success)), 0);
        assert_eq!(exit_code(&leaf(TestStatus::Error)), 1);
        assert_eq!(exit_code(&leaf(TestStatus::Unstable)), 2);
        assert_eq!(exit_code(&leaf(TestStatus::Canceled)), 3);
        assert_eq!(exit_code(&leaf(TestStatus::Ignored)), 0);
    }

    #[test]
    fn test_error_precedence_over_unstable() {
        let mut root = TestResult::new(TestName::new("run"));
        root.add_child(TestResult::with_status(TestName::new("a"), TestStatus::Unstable));
        root.add_child(TestResult::with_status(TestName::new("b"), TestStatus::Error));
        assert_eq!(exit_code(&root), 1);
    }

    #[test]
    fn test_failure_codes() {
        let launcher: anyhow::Error = ExternalToolError::new("helper died").into();
        assert_eq!(failure_code(&launcher), 255);

        let internal: anyhow::Error = InternalError::new("bad tree").into();
        assert_eq!(failure_code(&internal.context("resolving")), -1);

        let program: anyhow::Error = ProgramError::new("unknown category").into();
        assert_eq!(failure_code(&program), 1);
    }

    #[test]
    fn test_generate_run_id_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }
}
