//! Command-line entry point for the certification ledger.
//!
//! # Responsibility
//! - Map argv commands onto `CertificationService` use cases.
//! - Print results as JSON for scripting.
//!
//! Environment:
//! - `OPENAI_API_KEY`: enables the vision classifier; otherwise the offline
//!   classifier answers.
//! - `CARBONLEDGER_CONFIG`: optional JSON config file.
//! - `CARBONLEDGER_LOG_DIR`: optional absolute log directory.

use carbonledger_core::{
    core_version, init_logging_from_config, open_db, policies, ActivityKind, CannedReplyClassifier,
    CertificationService, Classifier, CoreConfig, Evidence, EvidenceVerifier,
    OpenAiVisionClassifier, SqliteRecordStore, SubmissionMetadata,
};
use log::warn;
use std::process::ExitCode;
use std::sync::Arc;
use uuid::Uuid;

const USAGE: &str = "usage:
  carbonledger catalog
  carbonledger submit <db> <user_id> <activity> <image_path> [key=value ...]
      keys: start_date end_date category condition quantity
  carbonledger resume <db> <record_id>
  carbonledger progress <db> <user_id>
  carbonledger history <db> <user_id> [limit]
  carbonledger version";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<(), String> {
    let Some((command, rest)) = args.split_first() else {
        return Err(USAGE.to_string());
    };
    let config = load_config()?;
    if let Ok(log_dir) = std::env::var("CARBONLEDGER_LOG_DIR") {
        init_logging_from_config(&config, &log_dir)?;
    }

    match (command.as_str(), rest) {
        ("version", []) => {
            println!("carbonledger_core version={}", core_version());
            Ok(())
        }
        ("catalog", []) => {
            for row in policies() {
                println!(
                    "{:<17} {:<14} kg={:<5} points={:<3} tree={}",
                    row.kind.as_str(),
                    row.label,
                    row.base_carbon_reduction_kg,
                    row.base_points,
                    row.grows_tree
                );
            }
            Ok(())
        }
        ("submit", [db, user_id, activity, image_path, pairs @ ..]) => {
            let activity = ActivityKind::parse(activity)
                .ok_or_else(|| format!("unknown activity `{activity}`"))?;
            let metadata = parse_metadata(pairs)?;
            let bytes = std::fs::read(image_path)
                .map_err(|err| format!("failed to read `{image_path}`: {err}"))?;
            let evidence = Evidence::new(image_path.as_str(), bytes);

            let mut conn = open_db(db).map_err(|err| err.to_string())?;
            let store = SqliteRecordStore::try_new(&mut conn).map_err(|err| err.to_string())?;
            let mut service = CertificationService::new(store, build_verifier(&config)?);
            let record = service
                .submit_activity(user_id, activity, &evidence, &metadata)
                .map_err(|err| err.to_string())?;
            print_json(&record)
        }
        ("resume", [db, record_id]) => {
            let record_id =
                Uuid::parse_str(record_id).map_err(|err| format!("invalid record id: {err}"))?;
            let mut conn = open_db(db).map_err(|err| err.to_string())?;
            let store = SqliteRecordStore::try_new(&mut conn).map_err(|err| err.to_string())?;
            let mut service = CertificationService::new(store, build_verifier(&config)?);
            let record = service
                .resume_pending(record_id)
                .map_err(|err| err.to_string())?;
            print_json(&record)
        }
        ("progress", [db, user_id]) => {
            let mut conn = open_db(db).map_err(|err| err.to_string())?;
            let store = SqliteRecordStore::try_new(&mut conn).map_err(|err| err.to_string())?;
            let service = CertificationService::new(store, build_verifier(&config)?);
            print_json(&service.progress(user_id).map_err(|err| err.to_string())?)
        }
        ("history", [db, user_id, limit @ ..]) if limit.len() <= 1 => {
            let limit = match limit.first() {
                Some(raw) => Some(
                    raw.parse::<u32>()
                        .map_err(|err| format!("invalid limit `{raw}`: {err}"))?,
                ),
                None => None,
            };
            let mut conn = open_db(db).map_err(|err| err.to_string())?;
            let store = SqliteRecordStore::try_new(&mut conn).map_err(|err| err.to_string())?;
            let service = CertificationService::new(store, build_verifier(&config)?);
            print_json(
                &service
                    .history(user_id, limit)
                    .map_err(|err| err.to_string())?,
            )
        }
        _ => Err(USAGE.to_string()),
    }
}

fn load_config() -> Result<CoreConfig, String> {
    match std::env::var("CARBONLEDGER_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|err| format!("failed to read config `{path}`: {err}"))?;
            CoreConfig::from_json_str(&raw).map_err(|err| err.to_string())
        }
        Err(_) => Ok(CoreConfig::default()),
    }
}

fn build_verifier(config: &CoreConfig) -> Result<EvidenceVerifier, String> {
    let classifier: Arc<dyn Classifier> = match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Arc::new(
            OpenAiVisionClassifier::new(&config.classifier, key, config.verifier.timeout())
                .map_err(|err| err.to_string())?,
        ),
        _ => {
            warn!("event=classifier_select module=cli status=offline reason=missing_api_key");
            Arc::new(CannedReplyClassifier::offline())
        }
    };
    Ok(EvidenceVerifier::new(classifier, config.verifier.clone()))
}

fn parse_metadata(pairs: &[String]) -> Result<SubmissionMetadata, String> {
    let mut metadata = SubmissionMetadata::default();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got `{pair}`"))?;
        let value = value.to_string();
        match key {
            "start_date" => metadata.start_date = Some(value),
            "end_date" => metadata.end_date = Some(value),
            "category" => metadata.category = Some(value),
            "condition" => metadata.condition = Some(value),
            "quantity" => {
                metadata.quantity = Some(
                    value
                        .parse()
                        .map_err(|err| format!("invalid quantity `{value}`: {err}"))?,
                )
            }
            other => return Err(format!("unknown metadata key `{other}`")),
        }
    }
    Ok(metadata)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
    println!("{text}");
    Ok(())
}
