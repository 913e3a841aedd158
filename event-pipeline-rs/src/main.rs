// event-pipeline/src/main.rs
// Tops up the puzzle pool with generated events
//
// Usage: event-pipeline [YEAR]

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use futures::future::join_all;
use log::{error, info, warn};

use event_pipeline::config::DEFAULT_PROVIDER;
use event_pipeline::openai::OpenAITransport;
use event_pipeline::{
    build_orchestrator, GenerateOptions, GenerationOrchestrator, GenerationResult,
    InMemoryBreakerRegistry, JsonYearPool, PipelineConfig, Selection, TransportConfig,
    WorkSelector, YearPool,
};

fn parse_year_arg() -> Result<Option<i32>> {
    match env::args().nth(1) {
        None => Ok(None),
        Some(arg) => match arg.trim().parse::<i32>() {
            Ok(year) => Ok(Some(year)),
            Err(_) => bail!("usage: event-pipeline [YEAR] (got '{}')", arg),
        },
    }
}

async fn run_year(
    orchestrator: &GenerationOrchestrator,
    pool: &JsonYearPool,
    year: i32,
    needed: usize,
) -> Result<GenerationResult> {
    let options = GenerateOptions {
        target_event_count: Some(needed),
        ..GenerateOptions::default()
    };
    let result = orchestrator.generate_for_year(year, Some(options)).await;

    if result.is_success() {
        let added = pool
            .import_events(year, &result.events)
            .await
            .with_context(|| format!("failed to import events for year {}", year))?;
        info!("Year {}: imported {} new events", year, added);
    } else if let Some(reason) = result.failure_reason() {
        warn!("Year {}: {} ({}), will retry on a later run", year, result.status, reason);
    }

    Ok(result)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = PipelineConfig::from_provider(&**DEFAULT_PROVIDER)
        .context("invalid pipeline configuration")?;
    let transport_config = TransportConfig::from_provider(&**DEFAULT_PROVIDER)
        .context("invalid transport configuration")?;

    info!(
        "Starting event pipeline: models [{}], target {} events, pool {}",
        config
            .models
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", "),
        config.target_event_count,
        config.pool_path.display()
    );

    let pool = JsonYearPool::open(config.pool_path.clone())
        .await?
        .with_target(config.target_event_count);
    let seeded = pool.ensure_years(config.year_range.clone()).await?;
    if seeded > 0 {
        info!("Seeded {} candidate years", seeded);
    }

    let transport = Arc::new(OpenAITransport::new(transport_config)?);
    let registry = Arc::new(InMemoryBreakerRegistry::new(config.breaker_config()));
    let orchestrator = build_orchestrator(&config, transport, registry);
    let selector = WorkSelector::new(config.target_event_count);

    let targets = match parse_year_arg()? {
        Some(year) => {
            let existing = pool.hints(year).await?.map(|h| h.len()).unwrap_or(0);
            let needed = config.target_event_count.saturating_sub(existing);
            if needed == 0 {
                info!("Year {} already has {} events, nothing to do", year, existing);
                Vec::new()
            } else {
                vec![(year, needed)]
            }
        }
        None => {
            let batch = selector.next_batch(&pool, config.batch_size.max(1)).await?;
            if batch.is_empty() {
                info!("{}", Selection::NoWorkAvailable);
            }
            batch.into_iter().map(|s| (s.year, s.needed)).collect()
        }
    };

    let runs = targets
        .iter()
        .map(|&(year, needed)| run_year(&orchestrator, &pool, year, needed));
    let results = join_all(runs).await;

    let mut failures = 0;
    for result in results {
        match result {
            Ok(result) if result.is_success() => {}
            Ok(_) => failures += 1,
            Err(e) => {
                failures += 1;
                error!("{:#}", e);
            }
        }
    }

    let stats = pool.pool_stats().await?;
    info!(
        "Pool: {} years, {} used, {} available, {} below {} events; {} of {} runs incomplete",
        stats.total,
        stats.used,
        stats.available,
        stats.insufficient_events,
        config.target_event_count,
        failures,
        targets.len()
    );

    Ok(())
}
