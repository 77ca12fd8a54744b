// Archivo: engine.rs
// Propósito: implementar `FlowEngine`, el envoltorio que ejecuta una cadena
// compartida dentro de un scope de sesión y deja constancia en el log.
//
// Nota: el motor no decide cuándo reintentar. Un fallo se devuelve al
// llamador (por ejemplo el bucle de sondeo del binario) sin confirmar nada.
use crate::chain::Chain;
use crate::data::Data;
use crate::errors::Result;
use crate::session::{scope, Context, OrmSession};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Configuración simple del motor.
#[derive(Debug, Clone)]
pub struct FlowEngineConfig {
    /// Nombre usado en los mensajes de log.
    pub name: String,
}

impl Default for FlowEngineConfig {
    fn default() -> Self {
        Self { name: "flow".into() }
    }
}

/// Resultado de una ejecución completa.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub output: Data,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Motor de ejecución de una cadena.
///
/// La cadena se comparte (`Arc<Chain>`), así que varios hilos pueden usar el
/// mismo motor; cada hilo pasa su propia sesión.
pub struct FlowEngine {
    chain: Arc<Chain>,
    config: FlowEngineConfig,
    runs: AtomicU64,
}

impl FlowEngine {
    pub fn new(chain: Arc<Chain>, config: FlowEngineConfig) -> Self {
        Self { chain,
               config,
               runs: AtomicU64::new(0) }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Número de ejecuciones iniciadas.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Ejecuta la cadena con `session` enlazada. Confirma si todo fue bien;
    /// si algo falla el error se devuelve y la sesión queda sin confirmar.
    pub fn run(&self, session: &dyn OrmSession, input: Data) -> Result<RunReport> {
        let run = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = Utc::now();
        log::info!("[{}] ejecución #{} iniciada", self.config.name, run);
        match scope(session, |ctx| self.chain.call(input, ctx)) {
            Ok(output) => {
                let report = RunReport { output,
                                         started_at,
                                         finished_at: Utc::now() };
                log::info!("[{}] ejecución #{} confirmada en {} ms", self.config.name, run, report.elapsed_ms());
                Ok(report)
            }
            Err(e) => {
                log::error!("[{}] ejecución #{} fallida: {}", self.config.name, run, e);
                Err(e)
            }
        }
    }

    /// Ejecuta la cadena sin sesión (las acciones de persistencia fallan).
    pub fn run_detached(&self, input: Data) -> Result<Data> {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.chain.call(input, &Context::detached())
    }
}
