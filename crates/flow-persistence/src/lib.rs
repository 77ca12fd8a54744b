//! Persistencia SQLite para las sesiones de `flow`.
//! Este archivo expone el módulo `schema` y reexporta el almacén Diesel
//! (`DieselStore`) y su unidad de trabajo (`DieselSession`), que implementa
//! `flow::OrmSession`. La implementación está en `object_store.rs`.

mod object_store;
pub mod schema;

pub use object_store::{new_from_env, DieselSession, DieselStore, MIGRATIONS};
