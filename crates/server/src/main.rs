use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};

use triage_auth::{AuthConfig, TokenBroker, TokenSource};
use triage_chat::{ChatConfig, ChatGateway, GraphChatGateway};
use triage_crypto::{FieldCipher, parse_master_key};
use triage_llm::{HttpLlmClient, LlmClient, LlmConfig};
use triage_mail::{GraphMailGateway, MailConfig, MailGateway};
use triage_pipeline::{
    Classifier, Escalator, ExpertiseMap, Orchestrator, PipelineConfig, PipelineMetrics, Responder,
    Scheduler,
};
use triage_ratelimit::{RateLimitConfig, SlidingWindowLimiter};
use triage_server::api::{AppState, router};
use triage_server::config::TriageConfig;
use triage_state::StateStore;
use triage_state_memory::MemoryStateStore;
use triage_store::TriageStore;
use triage_store_memory::MemoryTriageStore;
use triage_store_postgres::{PostgresStoreConfig, PostgresTriageStore};

/// Triage mail pipeline HTTP server.
#[derive(Parser, Debug)]
#[command(name = "triage-server", about = "Mail triage pipeline server")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "triage.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber from RUST_LOG or default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = TriageConfig::load(Some(&cli.config))?;

    // Field cipher for data at rest. Without a configured key a fixed dev
    // key is used and a warning logged — not suitable for production.
    let cipher = if config.encryption.key.is_empty() {
        warn!("ENCRYPTION_KEY not set, using an insecure development key");
        FieldCipher::new("dev", parse_master_key(&"00".repeat(32))?)
    } else {
        let mut cipher = FieldCipher::new(
            &config.encryption.key_id,
            parse_master_key(&config.encryption.key)?,
        );
        for (id, raw) in &config.encryption.retired_keys {
            cipher = cipher.with_retired_key(id, parse_master_key(raw)?);
        }
        cipher
    };

    // Short-TTL state (tokens, idempotency marks, lockout counters).
    let state: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

    // Durable store: Postgres when configured, in-memory otherwise.
    let store: Arc<dyn TriageStore> = match config.store.database_url {
        Some(ref url) => {
            let mut pg = PostgresStoreConfig::new(url.as_str());
            if let Some(ref prefix) = config.store.table_prefix {
                pg = pg.with_prefix(prefix.as_str());
            }
            let store = PostgresTriageStore::new(&pg, cipher).await?;
            info!("postgres store initialized");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryTriageStore::new())
        }
    };

    // Platform token broker. Credentials are required for the real
    // gateways; without them the server still starts for local inspection
    // but outbound calls will fail.
    let auth_enabled = !config.auth.tenant_id.is_empty() && !config.auth.client_id.is_empty();
    let mut auth_config = AuthConfig::new(
        config.auth.tenant_id.clone(),
        config.auth.client_id.clone(),
        config.auth.client_secret.clone(),
    )
    .with_lockout(
        config.auth.max_failed_auth_attempts,
        config.auth.auth_lockout_duration,
    );
    if let Some(ref authority) = config.auth.authority {
        auth_config = auth_config.with_authority(authority.as_str());
    }
    if let Some(ref scope) = config.auth.scope {
        auth_config = auth_config.with_scope(scope.as_str());
    }
    auth_config.token_cache_ttl_seconds = config.auth.token_cache_ttl;

    let broker = Arc::new(TokenBroker::new(auth_config.clone(), Arc::clone(&state))?);
    let tokens: Arc<dyn TokenSource> = Arc::clone(&broker) as Arc<dyn TokenSource>;

    // Platform gateways.
    let mail_config = MailConfig::new(config.pipeline.target_mailbox.clone())
        .with_batch_size(config.pipeline.batch_size);
    let mail: Arc<dyn MailGateway> =
        Arc::new(GraphMailGateway::new(mail_config, Arc::clone(&tokens))?);
    let chat: Arc<dyn ChatGateway> =
        Arc::new(GraphChatGateway::new(ChatConfig::new(), Arc::clone(&tokens))?);

    // LLM client.
    let llm_config = LlmConfig::new(
        config.llm.endpoint.clone(),
        config.llm.model.clone(),
        config.llm.api_key.clone(),
    )
    .with_timeout(config.llm.timeout_seconds)
    .with_temperature(config.llm.temperature)
    .with_max_tokens(config.llm.max_tokens)
    .with_max_retries(config.llm.max_retries);
    let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(llm_config)?);

    // Pipeline wiring.
    let expertise = if config.pipeline.expertise.is_empty() {
        ExpertiseMap::default()
    } else {
        config
            .pipeline
            .expertise
            .iter()
            .fold(ExpertiseMap::new(), |map, (role, addresses)| {
                map.with_role(role.as_str(), addresses.clone())
            })
    };

    let pipeline_config = PipelineConfig {
        batch_size: config.pipeline.batch_size,
        max_processing_time: Duration::from_secs(
            config.pipeline.max_processing_time_minutes * 60,
        ),
        retry_attempts: config.pipeline.retry_attempts,
        retry_delay: Duration::from_secs(config.pipeline.retry_delay_seconds),
        thresholds: config.thresholds(),
        prompt_body_chars: 2_000,
        max_email_body_length: config.pipeline.max_email_body_length,
        expertise,
        owner_address: config.pipeline.owner_address.clone(),
        // Workers are bounded by both the batch and the model budget.
        worker_concurrency: (config.pipeline.batch_size as usize)
            .min(config.rate_limit.requests)
            .max(1),
    };
    pipeline_config.validate()?;

    let window = Duration::from_secs(config.rate_limit.window_seconds);
    let cycle_limiter = Arc::new(SlidingWindowLimiter::new(RateLimitConfig::new(
        config.rate_limit.requests,
        window,
    )));
    let llm_limiter = Arc::new(SlidingWindowLimiter::new(RateLimitConfig::new(
        config.rate_limit.requests,
        window,
    )));

    let classifier = Classifier::new(Arc::clone(&llm), pipeline_config.prompt_body_chars);
    let responder = Responder::new(
        Arc::clone(&llm),
        Arc::clone(&mail),
        pipeline_config.prompt_body_chars,
    );
    let escalator = Escalator::new(
        Arc::clone(&llm),
        Arc::clone(&chat),
        pipeline_config.expertise.clone(),
        pipeline_config.owner_address.clone(),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&state),
        Arc::clone(&mail),
        classifier,
        responder,
        escalator,
        cycle_limiter,
        llm_limiter,
        Arc::new(PipelineMetrics::new()),
        pipeline_config,
    ));

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&orchestrator),
        Duration::from_secs(config.pipeline.polling_interval_minutes * 60),
    ));

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let scheduler_handle = tokio::spawn(Arc::clone(&scheduler).run(shutdown_rx));

    let app_state = AppState {
        scheduler: Arc::clone(&scheduler),
        store: Arc::clone(&store),
        chat: Arc::clone(&chat),
        auth: auth_enabled.then(|| Arc::new(auth_config)),
    };
    let app = router(app_state);

    // Resolve the bind address (CLI overrides take precedence).
    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "triage-server listening");

    // Serve with graceful shutdown on SIGINT / SIGTERM.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the scheduler; its in-flight cycle finishes first.
    let _ = shutdown_tx.send(()).await;
    let _ = scheduler_handle.await;

    info!("triage-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful
/// shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
