// Archivo: stubs.rs
// Propósito: implementación en memoria de `OrmSession` para pruebas y
// wiring rápido. No es durable: guarda los objetos registrados en `added`
// y los confirmados en `committed`.
use crate::data::Record;
use crate::errors::{FlowError, Result};
use crate::model::{ModelSchema, ObjectRef};
use crate::session::OrmSession;
use std::sync::{Mutex, MutexGuard};

/// Sesión falsa que conserva todos los resultados en memoria.
pub struct InMemorySession {
    /// Objetos registrados y todavía sin confirmar.
    added: Mutex<Vec<ObjectRef>>,
    /// Objetos confirmados, en orden de confirmación.
    committed: Mutex<Vec<ObjectRef>>,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self { added: Mutex::new(Vec::new()),
               committed: Mutex::new(Vec::new()) }
    }

    /// Helper para mapear `Mutex::lock()` en un `Result` con
    /// `FlowError::Storage`.
    fn lock<'a, T>(&'a self, m: &'a Mutex<T>) -> std::result::Result<MutexGuard<'a, T>, FlowError> {
        m.lock().map_err(|e| FlowError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    /// Copia de los objetos pendientes de confirmar.
    pub fn added(&self) -> Vec<ObjectRef> {
        self.added.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Copia de los objetos confirmados.
    pub fn committed(&self) -> Vec<ObjectRef> {
        self.committed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for InMemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl OrmSession for InMemorySession {
    fn add(&self, obj: ObjectRef) -> Result<()> {
        self.lock(&self.added)?.push(obj);
        Ok(())
    }

    /// Busca primero entre los pendientes y después entre los confirmados.
    fn get_or_create(&self, model: &ModelSchema, defaults: Record, lookup: Record) -> Result<(ObjectRef, bool)> {
        {
            let added = self.lock(&self.added)?;
            let committed = self.lock(&self.committed)?;
            for obj in added.iter().chain(committed.iter()) {
                if obj.matches(&model.name, &lookup)? {
                    return Ok((obj.clone(), false));
                }
            }
        }

        let obj = ObjectRef::new(model);
        for (field, value) in lookup.into_iter().chain(defaults) {
            obj.set(&field, value)?;
        }
        self.add(obj.clone())?;
        Ok((obj, true))
    }

    fn commit(&self) -> Result<()> {
        let mut added = self.lock(&self.added)?;
        let mut committed = self.lock(&self.committed)?;
        committed.append(&mut added);
        Ok(())
    }
}
