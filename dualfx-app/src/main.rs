//! # Rate Desk
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter
//! - Create the rate lock and claim services over the simulated feed
//! - Run one desk command

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dualfx_hex::{ClaimService, RateLockService, SimulatedRateFeed};
use dualfx_repo::{Repo, build_repo};
use dualfx_types::domain::{rate_in_effect, verify_chain};
use dualfx_types::validation::validate_award;
use dualfx_types::{
    AppError, AuditLogRepository, CurrencyCode, LockRequest, MonetaryAmount, OrderId, Rate,
    RateEvent, RateSource, RecordAwardRequest, ShortfallPaymentRequest, TransactionContext,
    UserId,
};

type DeskService = RateLockService<SimulatedRateFeed, Arc<Repo>>;

#[derive(Parser)]
#[command(name = "rate-desk")]
#[command(author, version, about = "USD/ZWG exchange rate desk", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and print a live rate
    Fetch {
        /// Rate source (reserve_bank, interbank, clinic_rate, parallel)
        #[arg(long)]
        source: Option<RateSource>,
    },
    /// Lock a rate for an order and print both equivalents of an amount
    Quote {
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value = "USD")]
        currency: CurrencyCode,
        #[arg(long)]
        order: String,
        /// Lock this rate instead of the live one
        #[arg(long)]
        rate: Option<Decimal>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Run the background refresh and print rate updates
    Watch {
        /// Stop after this many refreshes
        #[arg(long, default_value_t = 5)]
        ticks: usize,
    },
    /// Check a medical-aid award against an order total
    ValidateAward {
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value = "USD")]
        currency: CurrencyCode,
        #[arg(long)]
        order_total_usd: Decimal,
        #[arg(long)]
        rate: Decimal,
    },
    /// Lock a rate, record an award and optionally take the shortfall
    Claim {
        #[arg(long)]
        order: String,
        #[arg(long)]
        order_total: Decimal,
        #[arg(long, default_value = "USD")]
        order_currency: CurrencyCode,
        #[arg(long)]
        award: Decimal,
        #[arg(long, default_value = "USD")]
        award_currency: CurrencyCode,
        #[arg(long)]
        claim_reference: Option<String>,
        /// Shortfall amount the patient pays now
        #[arg(long)]
        pay: Option<Decimal>,
        #[arg(long, default_value = "USD")]
        pay_currency: CurrencyCode,
    },
    /// List rate audit entries
    Audit {
        #[arg(long)]
        order: Option<String>,
        /// Check the hash chain over the whole log
        #[arg(long)]
        verify: bool,
        /// Print the locked rate in effect at this RFC 3339 time
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dualfx_hex=debug,dualfx_app=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Adds the failure code and form field to a service error.
fn describe(err: AppError) -> anyhow::Error {
    match err.as_domain() {
        Some(domain) => anyhow::anyhow!("{} [{} on `{}`]", domain, domain.code(), domain.field()),
        None => anyhow::Error::new(err),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = config::Config::from_env()?;
    tracing::debug!(database = %config.database_url, source = %config.rate.default_source, "Loaded configuration");

    // Build repository (handles connection and migration)
    let repo = Arc::new(build_repo(&config.database_url).await?);

    let feed = SimulatedRateFeed::new(config.base_rate);
    let service: DeskService = RateLockService::new(feed, repo.clone(), config.rate.clone());
    let user = UserId::from(config.desk_user.as_str());

    match cli.command {
        Commands::Fetch { source } => {
            let source = source.unwrap_or(config.rate.default_source);
            let rate = service.fetch_live_rate_from(source).await.map_err(describe)?;
            print_json(&rate)?;
        }

        Commands::Quote {
            amount,
            currency,
            order,
            rate,
            reason,
        } => {
            let lock = lock_for_order(&service, &user, &order, rate, reason).await?;
            let money = MonetaryAmount::new(amount, currency)
                .map_err(|e| describe(e.into()))?;
            let equivalents = service.quote(&money).await.map_err(describe)?;
            print_json(&serde_json::json!({
                "lock": lock,
                "equivalents": equivalents,
            }))?;
            service
                .complete("quote printed", user)
                .await
                .map_err(describe)?;
        }

        Commands::Watch { ticks } => watch(&service, ticks).await?,

        Commands::ValidateAward {
            amount,
            currency,
            order_total_usd,
            rate,
        } => {
            let rate = Rate::new(rate).map_err(|e| describe(e.into()))?;
            let order_total = MonetaryAmount::new(order_total_usd, CurrencyCode::USD)
                .map_err(|e| describe(e.into()))?
                .equivalents(rate)
                .map_err(|e| describe(e.into()))?;
            let award = validate_award(amount, currency, &order_total, rate)
                .map_err(|e| describe(e.into()))?;
            print_json(&serde_json::json!({
                "rate": rate,
                "award": award,
                "order_total": order_total,
                "shortfall_usd": (order_total.usd - award.usd).max(Decimal::ZERO),
            }))?;
        }

        Commands::Claim {
            order,
            order_total,
            order_currency,
            award,
            award_currency,
            claim_reference,
            pay,
            pay_currency,
        } => {
            lock_for_order(&service, &user, &order, None, None).await?;
            let claims = ClaimService::new(repo.clone());

            let mut recorded = claims
                .record_award(
                    &service,
                    RecordAwardRequest {
                        order_id: OrderId::from(order.as_str()),
                        claim_reference,
                        amount: award,
                        currency: award_currency,
                        order_total,
                        order_currency,
                    },
                )
                .await
                .map_err(describe)?;

            if let Some(amount) = pay {
                recorded = claims
                    .pay_shortfall(ShortfallPaymentRequest {
                        award_id: recorded.id,
                        amount,
                        currency: pay_currency,
                        recorded_by: user.clone(),
                    })
                    .await
                    .map_err(describe)?;
            }
            print_json(&recorded)?;
            service
                .complete("claim recorded", user)
                .await
                .map_err(describe)?;
        }

        Commands::Audit { order, verify, at } => {
            let entries = match &order {
                Some(order) => repo.list_for_order(&OrderId::from(order.as_str())).await?,
                None => repo.list().await?,
            };
            print_json(&entries)?;

            if let Some(at) = at {
                match rate_in_effect(&entries, at) {
                    Some(rate) => println!("Locked rate in effect at {}: {}", at, rate),
                    None => println!("No rate was locked at {}", at),
                }
            }
            if verify {
                let all = repo.list().await?;
                verify_chain(&all).context("audit log failed verification")?;
                println!("✓ {} audit entries verified", all.len());
            }
        }
    }

    Ok(())
}

/// Fetches a live rate and locks it (or `manual_rate`) for `order`.
async fn lock_for_order(
    service: &DeskService,
    user: &UserId,
    order: &str,
    manual_rate: Option<Decimal>,
    reason: Option<String>,
) -> Result<dualfx_types::RateLock> {
    if let Err(e) = service.fetch_live_rate().await {
        if manual_rate.is_none() {
            return Err(describe(e));
        }
        tracing::warn!(error = %e, "No live rate; manual rate will be checked against the band only");
    }

    let context = TransactionContext::for_order(OrderId::from(order));
    let req = match (manual_rate, reason) {
        (Some(rate), reason) => {
            LockRequest::manual(rate, reason.unwrap_or_default(), user.clone(), context)
        }
        (None, Some(reason)) => LockRequest::live(user.clone(), context).with_reason(reason),
        (None, None) => LockRequest::live(user.clone(), context),
    };
    service.lock(req).await.map_err(describe)
}

async fn watch(service: &DeskService, ticks: usize) -> Result<()> {
    let mut events = service.subscribe();
    let first = service.fetch_live_rate().await.map_err(describe)?;
    print_json(&first)?;
    service.start_refresh();

    let mut seen = 0;
    while seen < ticks {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event @ (RateEvent::LiveRateUpdated(_) | RateEvent::RefreshFailed { .. })) => {
                    seen += 1;
                    print_json(&event)?;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Watcher fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    service.stop_refresh();
    Ok(())
}
