// Archivo: session.rs
// Propósito: definir el contrato de sesión ORM (`OrmSession`) que deben
// implementar los backends (SQLite, en memoria, etc.) y el `Context` que
// transporta la sesión enlazada a lo largo de una invocación de cadena.
use crate::data::Record;
use crate::errors::{FlowError, Result};
use crate::model::{ModelSchema, ObjectRef};
use std::cell::Cell;

/// Contrato mínimo de una sesión de persistencia.
///
/// Para soportar un ORM o almacenamiento distinto basta con implementar este
/// trait. Los métodos reciben `&self`: las implementaciones usan mutabilidad
/// interior (por ejemplo `Mutex`) igual que los repositorios en memoria.
pub trait OrmSession: Send + Sync {
    /// Registra un objeto nuevo en la sesión.
    fn add(&self, obj: ObjectRef) -> Result<()>;

    /// Busca un objeto de tipo `model` cuyos campos coincidan con `lookup`.
    /// Si existe lo devuelve con `false`; si no, crea uno nuevo con los campos
    /// de `lookup` y `defaults`, lo registra y lo devuelve con `true`.
    fn get_or_create(&self, model: &ModelSchema, defaults: Record, lookup: Record) -> Result<(ObjectRef, bool)>;

    /// Confirma todos los cambios pendientes.
    fn commit(&self) -> Result<()>;
}

/// Contexto de ejecución pasado explícitamente a cada acción.
///
/// Un contexto `detached` no tiene sesión: las acciones que necesitan
/// persistencia fallan con `FlowError::ContextMissing`.
#[derive(Clone, Copy)]
pub struct Context<'s> {
    session: Option<&'s dyn OrmSession>,
}

impl Context<'static> {
    pub fn detached() -> Self {
        Context { session: None }
    }
}

impl<'s> Context<'s> {
    pub fn bound(session: &'s dyn OrmSession) -> Self {
        Context { session: Some(session) }
    }

    /// Sesión enlazada o `ContextMissing`.
    pub fn session(&self) -> Result<&'s dyn OrmSession> {
        self.session.ok_or(FlowError::ContextMissing)
    }

    pub fn is_bound(&self) -> bool {
        self.session.is_some()
    }
}

thread_local! {
    static SCOPE_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Libera la marca de scope activo al salir (también si hay panic).
struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        SCOPE_ACTIVE.with(|a| a.set(false));
    }
}

/// Ejecuta `body` con `session` enlazada.
///
/// - Si `body` termina con `Ok`, se llama a `commit` y se devuelve el valor.
/// - Si `body` falla, el error se propaga sin cambios y no se confirma nada.
/// - Sólo puede haber un scope activo por hilo; anidar devuelve
///   `FlowError::Config`.
///
/// ```rust
/// use flow::{scope, Chain, Context, Data, InMemorySession, Root};
/// let session = InMemorySession::new();
/// let chain = Chain::new(Root);
/// let out = scope(&session, |ctx| chain.call(Data::Int(1), ctx)).unwrap();
/// assert_eq!(out, Data::Int(1));
/// ```
pub fn scope<'s, T, F>(session: &'s dyn OrmSession, body: F) -> Result<T>
    where F: FnOnce(&Context<'s>) -> Result<T>
{
    if SCOPE_ACTIVE.with(|a| a.replace(true)) {
        log::warn!("scope rechazado: ya hay una sesión enlazada en este hilo");
        return Err(FlowError::Config("ya hay una sesión enlazada en este hilo".into()));
    }
    let _guard = ScopeGuard;
    let ctx = Context::bound(session);
    let value = body(&ctx)?;
    session.commit()?;
    log::info!("sesión confirmada");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::InMemorySession;

    #[test]
    fn detached_context_has_no_session() {
        let ctx = Context::detached();
        assert!(!ctx.is_bound());
        assert!(matches!(ctx.session(), Err(FlowError::ContextMissing)));
    }

    #[test]
    fn nested_scope_is_rejected_and_guard_released() {
        let outer = InMemorySession::new();
        let inner = InMemorySession::new();
        let res = scope(&outer, |_| scope(&inner, |_| Ok(())));
        assert!(matches!(res, Err(FlowError::Config(_))));
        // el guard se liberó: un scope nuevo funciona
        scope(&outer, |_| Ok(())).expect("scope after failure");
    }
}
