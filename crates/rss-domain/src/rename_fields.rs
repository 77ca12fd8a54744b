// rename_fields.rs
use flow::{Action, ActionKind, Context, Data, Result};
use indexmap::IndexMap;

/// Renombra claves del registro: `fields_map` va de nombre viejo a nombre
/// nuevo. Las claves ausentes se ignoran.
///
/// Es también el ejemplo de acción definida fuera de `flow` que se combina
/// con las acciones básicas en una cadena.
pub struct RenameFields {
  fields_map: IndexMap<String, String>,
}

impl RenameFields {
  pub fn new<I, K, V>(fields_map: I) -> Self
    where I: IntoIterator<Item = (K, V)>,
          K: Into<String>,
          V: Into<String>
  {
    Self { fields_map: fields_map.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
  }

  pub fn fields_map(&self) -> &IndexMap<String, String> {
    &self.fields_map
  }
}

impl Action for RenameFields {
  fn run(&self, input: Data, _ctx: &Context<'_>) -> Result<Data> {
    let mut record = input.into_record()?;
    for (old, new) in self.fields_map.iter() {
      if let Some(value) = record.shift_remove(old) {
        record.insert(new.clone(), value);
      }
    }
    Ok(Data::Record(record))
  }

  fn kind(&self) -> ActionKind<'_> {
    ActionKind::Custom { name: "RenameFields" }
  }
}
