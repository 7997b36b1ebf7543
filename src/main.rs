use clap::{Arg, Command};
use feedback_triage::config::Config;
use feedback_triage::email::{load_emails, Email};
use feedback_triage::engine::TriageEngine;
use feedback_triage::recorder::{JsonFileLogStore, LogStore, MemoryLogStore};
use feedback_triage::tracker::{DisabledTracker, IssueTracker, JiraClient};
use log::LevelFilter;
use std::process;
use std::str::FromStr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("feedback-triage")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Match incoming feedback email against triage rules and file Jira issues")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("triage.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and list its rules")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("emails")
                .long("emails")
                .value_name("FILE")
                .help("JSON file with one email or an array of emails to triage")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("preview")
                .long("preview")
                .value_name("RULE_ID")
                .help("Show what one rule would do with each email, without calling Jira")
                .requires("emails")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("FILE")
                .help("JSON file holding triage log entries across runs")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("confirm-draft")
                .long("confirm-draft")
                .value_names(["EMAIL_ID", "RULE_ID"])
                .num_args(2)
                .help("Submit the stored draft for one email and rule")
                .requires("log-file")
                .conflicts_with_all(["emails", "preview"])
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("triage.yaml");

    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration {config_path}: {e}");
            process::exit(1);
        }
    };

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        config
            .logging
            .as_ref()
            .and_then(|l| LevelFilter::from_str(&l.level).ok())
            .unwrap_or(LevelFilter::Info)
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    let store = open_store(matches.get_one::<String>("log-file"));

    if let Some(mut ids) = matches.get_many::<String>("confirm-draft") {
        let (Some(email_id), Some(rule_id)) = (ids.next(), ids.next()) else {
            eprintln!("--confirm-draft needs EMAIL_ID and RULE_ID");
            process::exit(2);
        };
        confirm_draft(&config, store, email_id, rule_id).await;
        return;
    }

    let Some(emails_path) = matches.get_one::<String>("emails") else {
        eprintln!(
            "Nothing to do: pass --emails FILE, --confirm-draft, --test-config or --generate-config"
        );
        process::exit(2);
    };

    let emails = match load_emails(emails_path) {
        Ok(emails) => emails,
        Err(e) => {
            eprintln!("Error loading emails: {e:#}");
            process::exit(1);
        }
    };

    if let Some(rule_id) = matches.get_one::<String>("preview") {
        preview_rule(&config, rule_id, &emails);
        return;
    }

    let engine = match TriageEngine::new(&config, build_tracker(&config), store) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("{e}");
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };

    match engine.run_pass(&emails).await {
        Ok(report) => print_json(&report),
        Err(e) => {
            eprintln!("❌ Triage pass failed: {e}");
            process::exit(1);
        }
    }
}

fn open_store(log_file: Option<&String>) -> Arc<dyn LogStore> {
    let Some(path) = log_file else {
        return Arc::new(MemoryLogStore::new());
    };

    match JsonFileLogStore::open(path) {
        Ok(store) => {
            log::info!("Using triage log {path}");
            Arc::new(store)
        }
        Err(e) => {
            eprintln!("Error opening triage log: {e:#}");
            process::exit(1);
        }
    }
}

async fn confirm_draft(
    config: &Config,
    store: Arc<dyn LogStore>,
    email_id: &str,
    rule_id: &str,
) {
    let engine = match TriageEngine::new(config, build_tracker(config), store) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };

    match engine.confirm_draft(email_id, rule_id).await {
        Ok(entry) => print_json(&entry),
        Err(e) => {
            eprintln!("❌ Could not confirm draft: {e}");
            process::exit(1);
        }
    }
}

fn build_tracker(config: &Config) -> Arc<dyn IssueTracker> {
    let Some(settings) = config.jira.as_ref() else {
        log::warn!("No Jira settings configured; auto-create rules will fail");
        return Arc::new(DisabledTracker);
    };

    match JiraClient::new(settings) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            log::warn!("{e}; auto-create rules will fail");
            Arc::new(DisabledTracker)
        }
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the rules and Jira settings to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();
    println!("Match policy: {:?}", config.match_policy);
    println!("Number of rules: {}", config.rules.len());
    for (i, rule) in config.rules.iter().enumerate() {
        println!(
            "  Rule {}: {} [{}] {}:{} -> {}/{} ({:?})",
            i + 1,
            rule.name,
            rule.behavior,
            rule.trigger.kind(),
            rule.trigger.value().unwrap_or("?"),
            rule.target.project,
            rule.target.issue_type,
            rule.status
        );
    }

    if let Err(e) = config.validate() {
        println!("❌ Configuration validation failed:");
        println!("Error: {e}");
        process::exit(1);
    }

    match config.jira.as_ref().map(|j| j.missing_fields()) {
        None => println!("⚠️  No Jira settings; auto-create rules will fail"),
        Some(missing) if !missing.is_empty() => {
            println!("⚠️  Missing Jira settings: {}", missing.join(", "))
        }
        Some(_) => println!("Jira settings complete."),
    }
    println!("✅ Configuration is valid");
}

fn preview_rule(config: &Config, rule_id: &str, emails: &[Email]) {
    let store = Arc::new(MemoryLogStore::new());
    let engine = match TriageEngine::new(config, Arc::new(DisabledTracker), store) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };

    let mut previews = Vec::with_capacity(emails.len());
    for email in emails {
        match engine.preview(email, rule_id) {
            Ok(preview) => previews.push(preview),
            Err(e) => {
                eprintln!("❌ {e}");
                process::exit(1);
            }
        }
    }
    print_json(&previews);
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing output: {e}");
            process::exit(1);
        }
    }
}
