//! Conference Central Demo
//!
//! Runs the service over the in-memory adapters and walks through:
//! - Conference creation (with confirmation message)
//! - A race for the last seat between two attendees
//! - Filtered and unfiltered queries
//! - Cancellation and a reconciliation sweep
//!
//! # Usage
//!
//! ```bash
//! CC_INDEXING_MODE=deferred CC_METRICS_ADDR=127.0.0.1:9000 \
//!     cargo run --bin conference-central-demo
//! ```

use anyhow::Context;
use conference_central::telemetry::init_tracing;
use conference_central::{
    Config, ConferenceApi, ConferenceForm, ConferenceQueryForm, FilterForm, Identity, LogNotifier,
};
use conference_central_runtime::metrics::MetricsServer;
use conference_central_testing::{InMemoryCache, InMemoryRecordStore, InMemorySearchEngine};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("loading configuration")?;
    init_tracing(&config.telemetry.log_level);

    let mut metrics = config.telemetry.metrics_addr.map(MetricsServer::new);
    if let Some(server) = metrics.as_mut() {
        server.start().context("starting metrics exporter")?;
    }

    println!("\n============================================");
    println!("   Conference Central - Live Demo");
    println!("   indexing: {}", config.sync.mode);
    println!("============================================\n");

    let api = ConferenceApi::new(
        &config,
        Arc::new(InMemoryRecordStore::new()),
        &InMemorySearchEngine::new(),
        Arc::new(InMemoryCache::new()),
        Arc::new(LogNotifier::new()),
    )?;

    let organizer = Identity::new("organizer", "organizer@example.com");
    let ada = Identity::new("ada", "ada@example.com");
    let grace = Identity::new("grace", "grace@example.com");

    println!("1. Creating conferences...");
    let dotgo = api
        .create_conference(
            Some(&organizer),
            &ConferenceForm {
                name: "dotGo".into(),
                city: "Paris".into(),
                topics: vec!["Go".into(), "Systems".into()],
                start_date: Some("2016-10-10".into()),
                max_attendees: Some(1.into()),
                ..ConferenceForm::default()
            },
        )
        .await?;
    api.create_conference(
        Some(&organizer),
        &ConferenceForm {
            name: "RustConf".into(),
            city: "Portland".into(),
            start_date: Some("2016-09-09".into()),
            max_attendees: Some("500".into()),
            ..ConferenceForm::default()
        },
    )
    .await?;
    let dotgo_key = dotgo.key.encode();
    println!("   dotGo key: {dotgo_key}\n");

    println!("2. Two attendees race for the only dotGo seat...");
    let (first, second) = tokio::join!(
        api.register(Some(&ada), &dotgo_key),
        api.register(Some(&grace), &dotgo_key)
    );
    for (who, outcome) in [("ada", first), ("grace", second)] {
        match outcome {
            Ok(()) => println!("   {who}: registered"),
            Err(err) => println!("   {who}: {err} ({})", err.kind()),
        }
    }
    let seats = api.get_conference(&dotgo_key).await?.seats_available;
    println!("   seats left: {seats}\n");

    api.wait_for_indexing().await;

    println!("3. Queries...");
    let all = api.query_conferences(&ConferenceQueryForm::default()).await?;
    println!("   unfiltered: {}", names(&all));
    let paris = api
        .query_conferences(&ConferenceQueryForm::new(vec![FilterForm::new(
            "City", "=", "Paris",
        )]))
        .await?;
    println!("   city = Paris: {}", names(&paris));
    let illegal = api
        .query_conferences(&ConferenceQueryForm::new(vec![
            FilterForm::new("Month", ">", 3),
            FilterForm::new("MaxAttendees", "<", 10),
        ]))
        .await;
    if let Err(err) = illegal {
        println!("   month > 3 and maxAttendees < 10: {err}");
    }
    println!();

    println!("4. Everyone cancels...");
    for who in [&ada, &grace] {
        if api.cancel(Some(who), &dotgo_key).await.is_ok() {
            println!("   {}: cancelled", who.user_id);
        }
    }
    api.wait_for_indexing().await;

    let report = api.reconcile().await?;
    println!(
        "\n5. Reconciliation: scanned {}, updated {}, removed {}, added {}",
        report.scanned, report.updated, report.removed, report.added
    );

    if let Some(rendered) = metrics.as_ref().and_then(MetricsServer::render) {
        println!("\n6. Metrics snapshot:\n{rendered}");
    }

    api.shutdown().await;
    println!("\nDone.");
    Ok(())
}

fn names(conferences: &[conference_central::Conference]) -> String {
    conferences
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
