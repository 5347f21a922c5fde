use clap::{Arg, Command};
use inbox_sentry::config::Config;
use inbox_sentry::gmail::oauth::{OAuthClient, TokenStore};
use inbox_sentry::gmail::{GmailClient, GmailSettings};
use inbox_sentry::machine_learning::trained::TrainedClassifier;
use inbox_sentry::machine_learning::Classifier;
use inbox_sentry::scanner::{Pipeline, ScanError, Scanner, MAX_RESULTS_CEILING};
use inbox_sentry::{RawEmail, SpamClassifier};
use log::{error, warn, LevelFilter};
use serde_json::json;
use std::path::Path;
use std::process;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let matches = Command::new("inbox-sentry")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scan a Gmail inbox and flag likely spam and phishing")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("inbox-sentry.yaml"),
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
                .help("Check the configuration and model artifact, then exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("auth-url")
                .long("auth-url")
                .help("Print the Google consent URL for read-only Gmail access")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("exchange-code")
                .long("exchange-code")
                .value_name("CODE")
                .help("Exchange an authorization code for tokens and store them")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("session")
                .long("session")
                .help("Report whether a stored token exists")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("logout")
                .long("logout")
                .help("Delete the stored token")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("scan")
                .long("scan")
                .help("Fetch and classify recent inbox messages")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-results")
                .long("max-results")
                .value_name("N")
                .help("Number of messages to scan (1-500)")
                .value_parser(clap::value_parser!(usize))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("classify")
                .long("classify")
                .value_name("FILE")
                .help("Classify a JSON array of messages without contacting Gmail")
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
        .unwrap_or("inbox-sentry.yaml");
    let config_found = Path::new(config_path).exists();
    let mut config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };
    config.apply_env_overrides();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        config.logging.level_filter()
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if !config_found {
        warn!("Configuration file '{config_path}' not found, using default configuration");
    }

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    let http = match reqwest::Client::builder()
        .timeout(Duration::from_secs(config.gmail.timeout_seconds))
        .user_agent(concat!("inbox-sentry/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            eprintln!("Error creating HTTP client: {e}");
            process::exit(1);
        }
    };
    let oauth = OAuthClient::new(
        http.clone(),
        config.oauth.client_id.clone(),
        config.oauth.client_secret.clone(),
        config.oauth.redirect_uri.clone(),
    );
    let token_store = TokenStore::new(&config.oauth.token_path);

    if matches.get_flag("auth-url") {
        match oauth.authorization_url(None) {
            Ok(url) => print_json(&json!({ "authorization_url": url.as_str() })),
            Err(e) => fail(&format!("Failed to build authorization URL: {e}")),
        }
        return;
    }

    if let Some(code) = matches.get_one::<String>("exchange-code") {
        match oauth.exchange_code(code).await {
            Ok(token) => match token_store.save(&token) {
                Ok(()) => print_json(&json!({ "status": "success" })),
                Err(e) => fail(&e.to_string()),
            },
            Err(e) => fail(&format!("Failed to fetch token: {e}")),
        }
        return;
    }

    if matches.get_flag("session") {
        match token_store.load() {
            Ok(Some(_)) => print_json(&json!({ "status": "authenticated" })),
            Ok(None) => {
                print_json(&json!({ "status": "unauthenticated" }));
                process::exit(1);
            }
            Err(e) => fail(&e.to_string()),
        }
        return;
    }

    if matches.get_flag("logout") {
        match token_store.delete() {
            Ok(_) => print_json(&json!({ "status": "logged_out" })),
            Err(e) => fail(&e.to_string()),
        }
        return;
    }

    let classifier = Classifier::select(
        TrainedClassifier::load(Path::new(&config.model.path)),
        config.model.fallback,
    );
    let pipeline = Pipeline::new(classifier);

    if let Some(email_file) = matches.get_one::<String>("classify") {
        classify_file(&pipeline, email_file);
        return;
    }

    if matches.get_flag("scan") {
        let max_results = matches
            .get_one::<usize>("max-results")
            .copied()
            .unwrap_or(config.scan.max_results);
        let settings = GmailSettings {
            api_base: config.gmail.api_base.clone(),
            user_id: config.scan.user_id.clone(),
            label: config.scan.label.clone(),
            timeout: Duration::from_secs(config.gmail.timeout_seconds),
        };
        let gmail = GmailClient::new(http, settings, oauth, token_store);

        if let Err(e) = scan(&gmail, &pipeline, max_results).await {
            error!("Scan failed: {e}");
            print_json(&json!({ "error": e.code() }));
            process::exit(1);
        }
        return;
    }

    eprintln!("No action given. Run with --help for usage.");
    process::exit(2);
}

async fn scan(gmail: &GmailClient, pipeline: &Pipeline, max_results: usize) -> Result<(), ScanError> {
    let session = gmail.authorize().await?;
    let result = Scanner::new(session, pipeline).scan(max_results).await?;
    print_json(&result);
    Ok(())
}

fn classify_file(pipeline: &Pipeline, path: &str) {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => fail(&format!("Error reading {path}: {e}")),
    };
    let emails: Vec<RawEmail> = match serde_json::from_str(&content) {
        Ok(emails) => emails,
        Err(e) => fail(&format!("Error parsing {path}: {e}")),
    };

    match pipeline.classify(emails) {
        Ok(result) => print_json(&result),
        Err(e) => {
            error!("{e}");
            print_json(&json!({ "error": ScanError::from(e).code() }));
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("Testing configuration...");
    println!("Model artifact: {}", config.model.path);
    println!("Fallback policy: {:?}", config.model.fallback);
    println!(
        "Scan: label {}, {} messages (ceiling {})",
        config.scan.label, config.scan.max_results, MAX_RESULTS_CEILING
    );
    println!("Token store: {}", config.oauth.token_path);
    if config.oauth.client_id.is_empty() {
        println!("Warning: oauth.client_id is not set, authorization will fail");
    }

    let trained = TrainedClassifier::load(Path::new(&config.model.path));
    println!(
        "Classifier: {}",
        Classifier::select(trained, config.model.fallback).name()
    );

    let problems = config.validate();
    if problems.is_empty() {
        println!("Configuration is valid.");
    } else {
        println!("Configuration validation failed:");
        for problem in &problems {
            println!("  - {problem}");
        }
        process::exit(1);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if Path::new(path).exists() {
        Config::from_file(path)
    } else {
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => fail(&format!("Error encoding output: {e}")),
    }
}

fn fail(message: &str) -> ! {
    print_json(&json!({ "error": message }));
    process::exit(1);
}
