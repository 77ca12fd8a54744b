// Archivo: config.rs
// Propósito: parámetros del binario (línea de comandos, variables de entorno
// y `.env`) y su validación.
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Base de datos usada si no se indica ninguna.
pub const DEFAULT_DB: &str = "rss.sqlite";

/// Feeds leídos si no se indica ni `--rss` ni `--feed`.
pub const DEFAULT_RSS: &[&str] = &["https://www.reddit.com/r/news/.rss", "https://habr.com/rss/hubs/all/"];

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("period debe ser > 0 (recibido: {0})")]
    InvalidPeriod(i64),
    #[error("la lista de feeds (--rss / --feed) está vacía")]
    NoFeeds,
    #[error("la URL de la base de datos está vacía")]
    EmptyDb,
}

/// Lee periódicamente documentos de feed y los guarda en la base de datos.
#[derive(Debug, Parser)]
#[command(name = "rss-flow", version)]
pub struct Settings {
    /// Ruta de la base SQLite (también `DATABASE_URL`) [por defecto: rss.sqlite]
    #[arg(long, env = "RSS_FLOW_DB_URL")]
    pub db: Option<String>,
    /// Frecuencia de lectura, en minutos
    #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
    pub period: i64,
    /// URL de un feed RSS/Atom; se puede repetir
    #[arg(long, env = "RSS_FLOW_RSS", value_delimiter = ',')]
    pub rss: Vec<String>,
    /// Documento de feed (JSON ya parseado) a leer; se puede repetir
    #[arg(long = "feed", env = "RSS_FLOW_FEEDS", value_delimiter = ',')]
    pub feeds: Vec<PathBuf>,
    /// Ruta donde guardar el grafo de la cadena (se añade `.dot`)
    #[arg(short, long)]
    pub graph: Option<PathBuf>,
    /// Hace una sola pasada y termina
    #[arg(long)]
    pub once: bool,
}

impl Settings {
    /// Completa los valores derivados: `DATABASE_URL` como segunda opción
    /// para la base, las URLs por defecto si no hay ninguna fuente y el grafo
    /// sin la extensión `.dot`.
    pub fn complete(&mut self) {
        if self.rss.is_empty() && self.feeds.is_empty() {
            self.rss = DEFAULT_RSS.iter().map(|url| url.to_string()).collect();
        }
        if self.db.is_none() {
            self.db = std::env::var("DATABASE_URL").ok();
        }
        if let Some(graph) = &self.graph {
            if graph.extension().is_some_and(|ext| ext == "dot") {
                self.graph = Some(graph.with_extension(""));
            }
        }
    }

    pub fn db_url(&self) -> &str {
        self.db.as_deref().unwrap_or(DEFAULT_DB)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period.max(1) as u64 * 60)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period < 1 {
            return Err(ConfigError::InvalidPeriod(self.period));
        }
        if self.rss.is_empty() && self.feeds.is_empty() {
            return Err(ConfigError::NoFeeds);
        }
        if self.db_url().trim().is_empty() {
            return Err(ConfigError::EmptyDb);
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        log::info!("Parámetros:");
        log::info!("\tdb: {}", self.db_url());
        log::info!("\tperiod: {} minutos", self.period);
        log::info!("\trss:");
        for url in self.rss.iter() {
            log::info!("\t - {}", url);
        }
        log::info!("\tfeeds:");
        for feed in self.feeds.iter() {
            log::info!("\t - {}", feed.display());
        }
        match &self.graph {
            Some(graph) => log::info!("\tgraph: {}", graph.display()),
            None => log::info!("\tgraph: no definido"),
        }
    }
}
