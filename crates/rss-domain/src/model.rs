// model.rs
use chrono::{DateTime, Utc};
use flow::Model;
use serde::{Deserialize, Serialize};

/// Autor de una entrada del feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub name: String,
}

impl Model for User {
  const NAME: &'static str = "User";
  const FIELDS: &'static [&'static str] = &["name"];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
  pub name: String,
}

impl Model for Tag {
  const NAME: &'static str = "Tag";
  const FIELDS: &'static [&'static str] = &["name"];
}

/// Entrada del feed. `guid` identifica la entrada entre lecturas sucesivas.
///
/// Los atributos pueden quedar vacíos (`content` no lo rellena el extractor),
/// por eso casi todos son opcionales al rehidratar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
  pub title: Option<String>,
  pub guid: Option<String>,
  pub link: Option<String>,
  pub date: Option<DateTime<Utc>>,
  pub user: Option<User>,
  pub tags: Option<Vec<Tag>>,
  pub content: Option<String>,
}

impl Post {
  /// Nombres de las etiquetas en orden.
  pub fn tag_names(&self) -> Vec<&str> {
    self.tags.iter().flatten().map(|t| t.name.as_str()).collect()
  }
}

impl Model for Post {
  const NAME: &'static str = "Post";
  const FIELDS: &'static [&'static str] = &["title", "guid", "link", "date", "user", "tags", "content"];
}
