//! Crate `flow`: DSL declarativo de cadenas de acciones sobre registros
//!
//! Este crate define el modelo de datos (`Data`, `Record`), el protocolo de
//! acciones (`Action`), la cadena que las enlaza (`Chain`, con `then` y
//! `for_each`), acciones básicas (`Root`, `GetField`, `Lambda`,
//! `FieldsTransform`, `DebugLog`), el materializador con deduplicación
//! (`ModelObjectCreate`) y el contrato de sesión de persistencia
//! (`OrmSession`) junto con una implementación en memoria útil para pruebas
//! (`InMemorySession`). También expone un plotter DOT (`ActionsPlotter`) y un
//! motor auxiliar (`FlowEngine`).
//!
//! Diseño resumido:
//! - La sesión se pasa explícitamente en un `Context`; `scope` la enlaza,
//!   confirma si la ejecución termina bien y no confirma nada si falla.
//! - `for_each` es secuencial y ordenado; el primer fallo aborta la llamada.
//! - Idempotencia: con `unique` el materializador hace get-or-create.
//!
//! Ejemplo rápido:
//! ```rust
//! use flow::{scope, Chain, InMemorySession, Model, ModelObjectCreate, Root};
//! use serde_json::json;
//!
//! struct Book;
//! impl Model for Book {
//!     const NAME: &'static str = "Book";
//!     const FIELDS: &'static [&'static str] = &["author", "name"];
//! }
//!
//! let chain = Chain::new(Root).for_each(ModelObjectCreate::new::<Book>().unique(["name", "author"]));
//! let session = InMemorySession::new();
//! let books = json!([{"author": "Y", "name": "X"}, {"author": "Y", "name": "X"}]);
//! scope(&session, |ctx| chain.call(books.into(), ctx)).unwrap();
//! assert_eq!(session.committed().len(), 1);
//! ```
pub mod action;
pub mod actions;
pub mod chain;
pub mod data;
pub mod engine;
pub mod errors;
pub mod materialize;
pub mod model;
pub mod plot;
pub mod session;
pub mod stubs;

pub use action::*;
pub use actions::*;
pub use chain::*;
pub use data::*;
pub use engine::*;
pub use errors::*;
pub use materialize::*;
pub use model::*;
pub use plot::*;
pub use session::*;
pub use stubs::*;
