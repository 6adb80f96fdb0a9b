use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};
use utility_bot::cache::MessageCache;
use utility_bot::clock::{Clock, SystemClock};
use utility_bot::config::Settings;
use utility_bot::deliver::Deliverer;
use utility_bot::dispatch::{Dispatcher, DispatcherConfig};
use utility_bot::limiter::RateLimiter;
use utility_bot::messages;
use utility_bot::middleware::{Interceptor, Logging, Pipeline, RateLimiting};
use utility_bot::onboarding::Onboarding;
use utility_bot::telegram::{self, TelegramDeliverer};

/// Regex patterns for redacting the bot token from log output
struct RedactionPatterns {
    token_url: Regex,
    token_bare: Regex,
    token_prefixed: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_url: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token_bare: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token_prefixed: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token_url
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token_bare
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token_prefixed
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Redaction must be in place before the first log line
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting Utility Bot...");

    let settings = init_settings();
    info!(bot_name = %settings.bot_name, "Configuration loaded.");

    let bot = Bot::new(settings.telegram_token.clone());
    let deliverer: Arc<dyn Deliverer> = Arc::new(TelegramDeliverer::new(bot.clone()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let limiter = Arc::new(RateLimiter::new(
        settings.rate_limit_per_minute,
        settings.rate_period(),
    ));
    let cache = Arc::new(MessageCache::new(settings.cache_capacity)?);
    let onboarding = Arc::new(Onboarding::new(
        messages::default_stages(),
        settings.session_timeout(),
        cache.clone(),
        deliverer.clone(),
    ));

    let interceptors: Vec<Arc<dyn Interceptor>> = vec![
        Arc::new(Logging),
        Arc::new(RateLimiting::new(limiter.clone(), clock.clone())),
    ];
    let pipeline = Pipeline::new(interceptors, deliverer.clone(), clock.clone());

    let dispatcher = Arc::new(Dispatcher::new(
        pipeline,
        onboarding,
        limiter,
        cache,
        deliverer,
        clock,
        DispatcherConfig {
            stage_delay: settings.stage_delay(),
            enable_animations: settings.enable_animations,
            admin_ids: settings.admin_ids(),
        },
    ));

    let shutdown = CancellationToken::new();
    let sweeper = dispatcher.spawn_sweeper(settings.sweep_interval(), shutdown.clone());
    info!(
        sweep_interval_secs = settings.sweep_interval_secs,
        session_timeout_secs = settings.session_timeout_secs,
        "Session sweeper started."
    );

    info!("Bot is running...");
    telegram::run(bot, dispatcher).await;

    // Polling stopped (ctrl-c); wind the sweeper down too
    shutdown.cancel();
    let _ = sweeper.await;
    info!("Bot stopped.");

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Settings {
    match Settings::new() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}
