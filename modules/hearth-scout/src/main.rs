use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use forecast_client::ForecastClient;
use formrunner_client::FormRunnerClient;
use hearth_common::config::{ConfigCache, HouseholdSnapshot, StaticConfigSource};
use hearth_common::store::{EventStore, MemoryStore};
use hearth_common::types::{Channel, EventStatus};
use hearth_common::Config;
use hearth_notify::{EmailChannel, MemoryTokenStore, Notifier, OAuthToken, SmsChannel, TokenStore};
use hearth_register::{EmergencyStop, Registrar, RegistrantProfile};
use hearth_scout::calendar::CalendarClient;
use hearth_scout::classifier::ClaudeClassifier;
use hearth_scout::filters::FilterEngine;
use hearth_scout::ingest::RawCandidate;
use hearth_scout::pipeline::{retention_cutoff, DiscoveryPipeline};
use hearth_scout::scoring::{HistoryModel, OrderingMode, ScoringEngine};
use twilio::TwilioClient;

#[derive(Parser)]
#[command(name = "hearth-scout", about = "Household event discovery pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one discovery pass over a scraped candidate batch.
    Run {
        /// JSON file of raw candidate events.
        #[arg(long)]
        input: PathBuf,
        /// Optional JSON file of inbound replies to apply after sending
        /// approval requests, driving approved events on to registration.
        #[arg(long)]
        replies: Option<PathBuf>,
        /// Sort urgent events (registration opening soon, nearly full)
        /// ahead of everything else.
        #[arg(long)]
        urgent: bool,
        /// Events surfaced for approval per run.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Apply the retention policy: delete events older than the window.
    Reap {
        #[arg(long, default_value_t = 365)]
        days: i64,
    },
}

#[derive(Debug, Deserialize)]
struct InboundReply {
    recipient: String,
    text: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hearth=info".parse()?))
        .init();

    info!("Hearth Scout starting...");

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            input,
            replies,
            urgent,
            limit,
        } => run_discovery(input, replies, urgent, limit).await,
        Command::Reap { days } => reap(days).await,
    }
}

async fn run_discovery(
    input: PathBuf,
    replies: Option<PathBuf>,
    urgent: bool,
    limit: usize,
) -> Result<()> {
    let config = Config::from_env();
    config.log_redacted();

    let store = MemoryStore::new();
    let household = household_from_env();
    let config_cache = Arc::new(ConfigCache::new(Arc::new(StaticConfigSource(household))));

    // Collaborators
    let forecast = Arc::new(ForecastClient::new(
        &config.forecast_api_url,
        &config.forecast_api_key,
    ));
    let classifier = Arc::new(ClaudeClassifier::new(&config.anthropic_api_key));

    let mut filter_engine = FilterEngine::new(forecast).with_classifier(classifier);
    if let (Ok(url), Ok(key)) = (
        std::env::var("CALENDAR_API_URL"),
        std::env::var("CALENDAR_API_KEY"),
    ) {
        filter_engine = filter_engine.with_calendar(Arc::new(CalendarClient::new(&url, &key)));
    }

    let scoring = ScoringEngine::new(Arc::new(HistoryModel::new(vec![])));
    let ordering = if urgent {
        OrderingMode::UrgentPriority
    } else {
        OrderingMode::Default
    };

    let pipeline = DiscoveryPipeline::new(store.clone(), filter_engine, scoring, config_cache)
        .with_ordering(ordering)
        .with_proposal_limit(limit);

    // Discovery
    let raw = read_json::<Vec<RawCandidate>>(&input)
        .with_context(|| format!("reading candidates from {}", input.display()))?;
    let outcome = pipeline.run(raw).await?;

    // Approval requests
    let channel = match config.approval_channel.as_str() {
        "email" => Channel::Email,
        _ => Channel::Sms,
    };
    let notifier = build_notifier(&config, store.clone(), channel).await;
    for event in &outcome.proposed {
        if let Err(error) = notifier.send(event, &config.approval_recipient, channel).await {
            warn!(event = %event.title, %error, "Failed to send approval request");
        }
    }

    // Inbound replies (normally arriving via the messaging webhook; a file
    // here so a single pass can exercise the whole flow).
    if let Some(path) = replies {
        let inbound = read_json::<Vec<InboundReply>>(&path)
            .with_context(|| format!("reading replies from {}", path.display()))?;
        for reply in inbound {
            notifier
                .handle_inbound(&reply.recipient, &reply.text, Utc::now())
                .await?;
        }
        register_approved(&config, &store).await?;
    }

    notifier.sweep_timeouts(Utc::now()).await?;

    info!(
        proposed = outcome.stats.proposed,
        passed = outcome.stats.filtered_pass,
        failed = outcome.stats.filtered_fail,
        "Discovery pass complete"
    );
    Ok(())
}

/// Register every approved event: automation for free ones, the manual
/// path for anything with a cost.
async fn register_approved(config: &Config, store: &Arc<MemoryStore>) -> Result<()> {
    let driver = Arc::new(FormRunnerClient::new(
        &config.formrunner_url,
        config.formrunner_token.as_deref(),
    ));
    let registrar = Registrar::new(
        driver,
        store.clone(),
        store.clone(),
        Arc::new(EmergencyStop::new()),
        RegistrantProfile::standard(
            &config.registrant_name,
            &config.registrant_email,
            &config.registrant_phone,
        ),
    );

    let approved: Vec<_> = store
        .active_events()
        .await?
        .into_iter()
        .filter(|e| e.status == EventStatus::Approved)
        .collect();

    for event in approved {
        if event.is_free() {
            match registrar.register(&event).await {
                Ok(attempt) if attempt.success => {
                    info!(event = %event.title, confirmation = ?attempt.confirmation_number, "Registered")
                }
                Ok(attempt) => {
                    warn!(event = %event.title, error = ?attempt.error, "Registration failed")
                }
                Err(error) => warn!(event = %event.title, %error, "Registration aborted"),
            }
        } else {
            registrar.manual_path(&event).await?;
            info!(event = %event.title, url = %event.registration_url, "Manual registration link ready");
        }
    }
    Ok(())
}

async fn build_notifier(config: &Config, store: Arc<MemoryStore>, channel: Channel) -> Notifier {
    let notifier = Notifier::new(store.clone(), store);
    match channel {
        Channel::Sms => {
            let client = TwilioClient::new(&config.twilio_account_sid, &config.twilio_auth_token);
            notifier.with_channel(Arc::new(SmsChannel::new(client, &config.twilio_from_number)))
        }
        Channel::Email => {
            let tokens = Arc::new(MemoryTokenStore::new());
            seed_mail_token(&*tokens, &config.mail_user).await;
            notifier.with_channel(Arc::new(EmailChannel::new(
                &config.mail_api_url,
                &config.mail_user,
                tokens,
            )))
        }
    }
}

/// Seed the mail token from the environment when present. In a durable
/// deployment the token store is backed by the credential store instead.
async fn seed_mail_token(tokens: &MemoryTokenStore, user: &str) {
    let (Ok(access), Ok(refresh)) = (
        std::env::var("MAIL_ACCESS_TOKEN"),
        std::env::var("MAIL_REFRESH_TOKEN"),
    ) else {
        return;
    };
    let token = OAuthToken {
        access_token: access,
        refresh_token: refresh,
        expires_at: Utc::now() + chrono::Duration::minutes(50),
    };
    if let Err(error) = tokens.put(user, "mail", &token).await {
        warn!(%error, "Failed to seed mail token");
    }
}

async fn reap(days: i64) -> Result<()> {
    let store = MemoryStore::new();
    let reaped = store
        .reap_events_older_than(retention_cutoff(Utc::now(), days))
        .await?;
    info!(reaped, days, "Retention pass complete");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn household_from_env() -> HouseholdSnapshot {
    let mut builder_budget = 0u32;
    if let Ok(raw) = std::env::var("BUDGET_CEILING_CENTS") {
        builder_budget = raw.parse().unwrap_or(0);
    }

    let child_birthdates = std::env::var("CHILD_BIRTHDATES")
        .map(|raw| {
            raw.split(',')
                .filter_map(|d| chrono::NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
                .collect()
        })
        .unwrap_or_default();

    let min_lead_hours = std::env::var("MIN_LEAD_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(12);
    let max_lead_days = std::env::var("MAX_LEAD_DAYS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);

    HouseholdSnapshot::builder()
        .budget_ceiling_cents(builder_budget)
        .child_birthdates(child_birthdates)
        .min_lead_hours(min_lead_hours)
        .max_lead_days(max_lead_days)
        .build()
}
