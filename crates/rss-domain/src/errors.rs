// error.rs
use flow::FlowError;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DomainError {
  #[error("Fecha inválida: {0}")]
  InvalidDate(String),
  #[error("Documento de feed inválido: {0}")]
  InvalidFeed(String),
  #[error("Error de serialización: {0}")]
  SerializationError(String),
  #[error("Error de descarga: {0}")]
  Fetch(String),
}

impl From<serde_json::Error> for DomainError {
  fn from(e: serde_json::Error) -> Self {
    Self::SerializationError(e.to_string())
  }
}

impl From<reqwest::Error> for DomainError {
  fn from(e: reqwest::Error) -> Self {
    Self::Fetch(e.to_string())
  }
}

impl From<feed_rs::parser::ParseFeedError> for DomainError {
  fn from(e: feed_rs::parser::ParseFeedError) -> Self {
    Self::InvalidFeed(e.to_string())
  }
}

impl From<DomainError> for FlowError {
  fn from(e: DomainError) -> Self {
    FlowError::Transform(e.to_string())
  }
}
