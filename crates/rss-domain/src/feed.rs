// feed.rs
use crate::DomainError;
use chrono::{DateTime, SecondsFormat, Utc};
use feed_rs::model::Entry;
use flow::Data;
use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use std::time::Duration;

/// Lee un documento de feed ya parseado (JSON con la forma de `feedparser`:
/// un objeto con la lista `entries`).
pub fn parse_feed(text: &str) -> Result<Data, DomainError> {
  let value: serde_json::Value = serde_json::from_str(text)?;
  match value.get("entries") {
    Some(serde_json::Value::Array(_)) => Ok(Data::from(value)),
    Some(_) => Err(DomainError::InvalidFeed("'entries' no es una lista".into())),
    None => Err(DomainError::InvalidFeed("falta la clave 'entries'".into())),
  }
}

/// Igual que `parse_feed` pero leyendo de un fichero.
pub fn read_feed(path: impl AsRef<Path>) -> Result<Data, DomainError> {
  let path = path.as_ref();
  let text = std::fs::read_to_string(path).map_err(|e| {
                                            DomainError::InvalidFeed(format!("no se pudo leer {}: {}", path.display(), e))
                                          })?;
  let document = parse_feed(&text)?;
  log::debug!("{}: {} entradas", path.display(), entry_count(&document));
  Ok(document)
}

/// Convierte un feed RSS o Atom en un documento con la forma de
/// `parse_feed`. Cada entrada lleva `id`, `title`, `link`, `author` (si el
/// feed lo indica), `published_parsed` / `updated_parsed` en RFC 3339 y
/// `tags` como lista de `{"term": ..}`.
pub fn parse_xml_feed(bytes: &[u8]) -> Result<Data, DomainError> {
  let feed = feed_rs::parser::parse(bytes)?;
  let mut head = Map::new();
  head.insert("title".into(), feed.title.map_or(JsonValue::Null, |t| JsonValue::String(t.content)));
  head.insert("link".into(),
              feed.links.first().map_or(JsonValue::Null, |l| JsonValue::String(l.href.clone())));
  let entries: Vec<JsonValue> = feed.entries.iter().map(entry_record).collect();

  let mut document = Map::new();
  document.insert("feed".into(), JsonValue::Object(head));
  document.insert("entries".into(), JsonValue::Array(entries));
  Ok(Data::from(JsonValue::Object(document)))
}

fn entry_record(entry: &Entry) -> JsonValue {
  let text = |s: &str| JsonValue::String(s.to_string());
  let mut record = Map::new();
  record.insert("id".into(), text(&entry.id));
  record.insert("title".into(), entry.title.as_ref().map_or(JsonValue::Null, |t| text(&t.content)));
  record.insert("link".into(), entry.links.first().map_or(JsonValue::Null, |l| text(&l.href)));
  if let Some(author) = entry.authors.first() {
    record.insert("author".into(), text(&author.name));
  }
  if let Some(date) = entry.published {
    record.insert("published_parsed".into(), date_text(date));
  }
  if let Some(date) = entry.updated {
    record.insert("updated_parsed".into(), date_text(date));
  }
  let tags = entry.categories
                  .iter()
                  .map(|c| {
                    let mut tag = Map::new();
                    tag.insert("term".into(), text(&c.term));
                    JsonValue::Object(tag)
                  })
                  .collect();
  record.insert("tags".into(), JsonValue::Array(tags));
  JsonValue::Object(record)
}

fn date_text(date: DateTime<Utc>) -> JsonValue {
  JsonValue::String(date.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Descarga feeds RSS/Atom por HTTP.
pub struct FeedFetcher {
  client: reqwest::blocking::Client,
}

impl FeedFetcher {
  pub fn new(timeout: Duration) -> Result<Self, DomainError> {
    let client = reqwest::blocking::Client::builder().user_agent(concat!("rss-flow/", env!("CARGO_PKG_VERSION")))
                                                     .timeout(timeout)
                                                     .build()?;
    Ok(Self { client })
  }

  /// Descarga `url` y la convierte con `parse_xml_feed`.
  pub fn fetch(&self, url: &str) -> Result<Data, DomainError> {
    let response = self.client.get(url).send()?.error_for_status()?;
    let body = response.bytes()?;
    let document = parse_xml_feed(&body)?;
    log::debug!("{}: {} bytes, {} entradas", url, body.len(), entry_count(&document));
    Ok(document)
  }
}

fn entry_count(document: &Data) -> usize {
  document.as_record().and_then(|r| r.get("entries")).and_then(Data::as_list).map_or(0, <[Data]>::len)
}
