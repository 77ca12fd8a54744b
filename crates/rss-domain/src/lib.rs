//! Dominio de ingesta RSS construido sobre `flow`.
//!
//! Modelos (`User`, `Tag`, `Post`), la acción de usuario `RenameFields`, la
//! cadena `feed_extractor` y la lectura de feeds: RSS/Atom descargados por
//! HTTP o documentos JSON ya parseados.
mod errors;
mod feed;
mod model;
mod rename_fields;
mod workflow;

pub use errors::DomainError;
pub use feed::{parse_feed, parse_xml_feed, read_feed, FeedFetcher};
pub use model::{Post, Tag, User};
pub use rename_fields::RenameFields;
pub use workflow::{feed_extractor, normalize_date, EXTRACTED_MODELS};
