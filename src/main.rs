// Archivo: main.rs
// Propósito: bucle de sondeo que descarga los feeds RSS/Atom (y los
// documentos JSON indicados) cada `period` minutos y los guarda en la base
// mediante `feed_extractor`.
mod config;

use anyhow::Context as _;
use clap::Parser;
use config::Settings;
use flow::engine::FlowEngineConfig;
use flow::{ActionsPlotter, Data, FlowEngine};
use flow_persistence::DieselStore;
use rss_domain::{feed_extractor, read_feed, FeedFetcher, EXTRACTED_MODELS};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Espera tras una pasada fallida antes de reintentar.
const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Tiempo máximo de cada descarga.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

fn init_logging() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env()
                                                  .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
                             .init();
}

/// Ejecuta la cadena sobre un documento en una sesión propia.
fn ingest(engine: &FlowEngine, store: &DieselStore, source: &str, document: Data) -> anyhow::Result<()> {
    let session = store.session();
    let report = engine.run(&session, document)
                       .with_context(|| format!("no se pudo procesar '{}'", source))?;
    log::info!("'{}' procesado en {} ms", source, report.elapsed_ms());
    Ok(())
}

/// Lee y guarda todos los feeds. Cada feed usa su propia sesión, así que un
/// fallo no deshace los feeds anteriores de la misma pasada.
fn ingest_all(engine: &FlowEngine, store: &DieselStore, fetcher: &FeedFetcher, settings: &Settings) -> anyhow::Result<()> {
    for url in settings.rss.iter() {
        log::info!("Descargando '{}'", url);
        let document = fetcher.fetch(url).with_context(|| format!("no se pudo leer '{}'", url))?;
        ingest(engine, store, url, document)?;
    }
    for path in settings.feeds.iter() {
        log::info!("Leyendo '{}'", path.display());
        let document = read_feed(path)?;
        ingest(engine, store, &path.display().to_string(), document)?;
    }
    for model in EXTRACTED_MODELS {
        log::info!("\t{}: {} guardados", model, store.count(model)?);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let mut settings = Settings::parse();
    settings.complete();
    settings.log_summary();
    settings.validate()?;

    let chain = Arc::new(feed_extractor());
    if let Some(graph) = &settings.graph {
        let path = ActionsPlotter::new().plot(&chain, graph)?;
        log::info!("Grafo guardado en '{}'", path.display());
    }

    log::info!("Abriendo la base '{}'", settings.db_url());
    let store = DieselStore::new(settings.db_url()).with_context(|| format!("no se pudo abrir '{}'", settings.db_url()))?;
    let engine = FlowEngine::new(chain, FlowEngineConfig { name: "rss".into() });
    let fetcher = FeedFetcher::new(FETCH_TIMEOUT)?;

    log::info!("Inicio del bucle");
    let mut last_pass: Option<Instant> = None;
    loop {
        if last_pass.map_or(true, |t| t.elapsed() >= settings.period()) {
            match ingest_all(&engine, &store, &fetcher, &settings) {
                Ok(()) => {
                    last_pass = Some(Instant::now());
                    if settings.once {
                        break;
                    }
                }
                Err(e) if settings.once => return Err(e),
                Err(e) => {
                    log::error!("error: {:#}", e);
                    thread::sleep(RETRY_DELAY);
                    continue;
                }
            }
        }
        thread::sleep(Duration::from_secs(1));
    }
    log::info!("Fin del bucle");
    Ok(())
}
