// workflow.rs
use crate::model::{Post, Tag, User};
use crate::rename_fields::RenameFields;
use crate::DomainError;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use flow::{Chain, Data, FieldsTransform, FlowError, GetField, Lambda, Model, ModelObjectCreate};

/// Convierte una fecha del feed a `DateTime<Utc>`.
///
/// Acepta texto RFC 3339 o RFC 2822 y la forma `struct_time` de feedparser
/// (lista con al menos año, mes, día, hora, minuto y segundo).
pub fn normalize_date(value: &Data) -> Result<DateTime<Utc>, DomainError> {
  match value {
    Data::Text(s) => DateTime::parse_from_rfc3339(s).or_else(|_| DateTime::parse_from_rfc2822(s))
                                                   .map(|d| d.with_timezone(&Utc))
                                                   .map_err(|_| DomainError::InvalidDate(s.clone())),
    Data::List(items) if items.len() >= 6 => {
      let mut parts = [0i64; 6];
      for (slot, item) in parts.iter_mut().zip(items.iter()) {
        *slot = item.as_int().ok_or_else(|| DomainError::InvalidDate(value.to_string()))?;
      }
      let [year, month, day, hour, minute, second] = parts;
      let as_u32 = |n: i64| u32::try_from(n).map_err(|_| DomainError::InvalidDate(value.to_string()));
      let year = i32::try_from(year).map_err(|_| DomainError::InvalidDate(value.to_string()))?;
      Utc.with_ymd_and_hms(year, as_u32(month)?, as_u32(day)?, as_u32(hour)?, as_u32(minute)?, as_u32(second)?)
         .single()
         .ok_or_else(|| DomainError::InvalidDate(value.to_string()))
    }
    other => Err(DomainError::InvalidDate(other.to_string())),
  }
}

fn date_to_text() -> Lambda {
  Lambda::new(|value| {
    let date = normalize_date(&value)?;
    Ok(Data::from(date.to_rfc3339_opts(SecondsFormat::Secs, true)))
  })
}

/// Lista de etiquetas de feedparser (`[{"term": ..}, ..]`) a lista de nombres.
fn terms() -> Lambda {
  Lambda::new(|value| {
    let mut names = Vec::new();
    for tag in value.into_items()? {
      let term = tag.as_record().and_then(|r| r.get("term")).cloned();
      match term {
        Some(term) => names.push(term),
        None => {
          return Err(FlowError::MissingKey { key: "term".into(),
                                             record: tag.to_string() })
        }
      }
    }
    Ok(Data::List(names))
  })
}

/// Cadena que lleva un documento de feed hasta objetos `User`, `Tag` y
/// `Post` de la sesión activa.
///
/// Por cada entrada: `updated_parsed` pasa a llamarse `published_parsed`, se
/// normaliza la fecha, el autor y las etiquetas se materializan sin
/// duplicados por nombre y por último se materializa el `Post` (único por
/// `guid`, que se lee de la clave `id` de la entrada).
pub fn feed_extractor() -> Chain {
  let user = ModelObjectCreate::new::<User>().fields(["name"]).unique(["name"]);
  let tags = Chain::new(terms()).for_each(ModelObjectCreate::new::<Tag>().fields(["name"]).unique(["name"]));
  let transform = FieldsTransform::new().field("published_parsed", date_to_text())
                                        .field("author", user)
                                        .field("tags", tags);
  let store = ModelObjectCreate::new::<Post>().fields(["title", "guid", "link", "date", "user", "tags"])
                                              .fields_map([("guid", "id"),
                                                           ("date", "published_parsed"),
                                                           ("user", "author")])
                                              .unique(["guid"]);

  Chain::new(GetField::new("entries")).for_each(RenameFields::new([("updated_parsed", "published_parsed")]))
                                      .then(transform)
                                      .then(store)
                                      .rewind()
}

/// Nombre del modelo de cada objeto que produce `feed_extractor`.
pub const EXTRACTED_MODELS: [&str; 3] = [User::NAME, Tag::NAME, Post::NAME];

#[cfg(test)]
mod tests {
  use super::*;
  use flow::{Action, ActionsPlotter, Context};
  use serde_json::json;

  #[test]
  fn dates_are_normalized_to_utc() {
    let expected = Utc.with_ymd_and_hms(2018, 5, 1, 8, 0, 0).unwrap();
    assert_eq!(normalize_date(&Data::from("2018-05-01T10:00:00+02:00")).unwrap(), expected);
    assert_eq!(normalize_date(&Data::from("Tue, 01 May 2018 08:00:00 GMT")).unwrap(), expected);
    assert_eq!(normalize_date(&Data::from(json!([2018, 5, 1, 8, 0, 0, 1, 121, 0]))).unwrap(), expected);
    assert!(matches!(normalize_date(&Data::from("ayer")), Err(DomainError::InvalidDate(_))));
    assert!(matches!(normalize_date(&Data::from(json!([2018, 13, 1, 8, 0, 0]))), Err(DomainError::InvalidDate(_))));
    assert!(normalize_date(&Data::Null).is_err());
  }

  #[test]
  fn date_lambda_reports_transform_errors() {
    let err = date_to_text().run(Data::from("nunca"), &Context::detached()).unwrap_err();
    assert!(matches!(err, FlowError::Transform(_)));
  }

  #[test]
  fn terms_extracts_names_in_order() {
    let out = terms().run(json!([{"term": "b", "scheme": null}, {"term": "a"}]).into(), &Context::detached())
                     .unwrap();
    assert_eq!(out, Data::from(json!(["b", "a"])));
    assert!(matches!(terms().run(json!([{"label": "x"}]).into(), &Context::detached()),
                     Err(FlowError::MissingKey { .. })));
  }

  #[test]
  fn extractor_graph_shows_every_stage() {
    let dot = ActionsPlotter::new().render(&feed_extractor());
    assert!(dot.contains("GetField\\n'entries'"));
    assert!(dot.contains("RenameFields"));
    assert!(dot.contains("label=\"'author'\""));
    assert!(dot.contains("Post(title,\\nguid (from 'id')"));
    assert!(dot.contains("Tag(name)"));
  }
}
