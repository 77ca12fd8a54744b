// Archivo: materialize.rs
// Propósito: `ModelObjectCreate`, la acción que vuelca un registro en un
// objeto de modelo y lo registra en la sesión enlazada, con deduplicación
// opcional por clave única (get-or-create).
use crate::action::{Action, ActionKind};
use crate::data::{Data, Record};
use crate::errors::{FlowError, Result};
use crate::model::{Model, ModelSchema, ObjectRef};
use crate::session::Context;
use indexmap::IndexMap;

/// Rellena un objeto de modelo con campos del registro y lo añade a la
/// sesión actual.
///
/// - `fields`: atributos del modelo a asignar. Si no se indica, se usan todas
///   las claves del registro de entrada.
/// - `fields_map`: campo del modelo → clave del registro, para cuando los
///   nombres difieren.
/// - `unique`: atributos que forman la clave única. Si ya existe un objeto con
///   esos valores se reutiliza y sus demás campos se sobrescriben (gana la
///   última escritura) en lugar de crear un duplicado.
///
/// ```rust
/// use flow::{Model, ModelObjectCreate};
/// struct Post;
/// impl Model for Post {
///     const NAME: &'static str = "Post";
///     const FIELDS: &'static [&'static str] = &["title", "guid", "date"];
/// }
/// let store = ModelObjectCreate::new::<Post>()
///     .fields(["title", "guid", "date"])
///     .fields_map([("guid", "id"), ("date", "published_parsed")])
///     .unique(["guid"]);
/// assert_eq!(store.source_key("guid"), "id");
/// ```
#[derive(Debug, Clone)]
pub struct ModelObjectCreate {
    model: ModelSchema,
    fields: Option<Vec<String>>,
    fields_map: IndexMap<String, String>,
    unique: Option<Vec<String>>,
}

impl ModelObjectCreate {
    pub fn new<M: Model>() -> Self {
        Self::for_schema(M::schema())
    }

    pub fn for_schema(model: ModelSchema) -> Self {
        Self { model,
               fields: None,
               fields_map: IndexMap::new(),
               unique: None }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn fields_map<I, K, V>(mut self, map: I) -> Self
        where I: IntoIterator<Item = (K, V)>,
              K: Into<String>,
              V: Into<String>
    {
        self.fields_map = map.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn unique<I, S>(mut self, fields: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        self.unique = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn model(&self) -> &ModelSchema {
        &self.model
    }

    /// Clave del registro de la que se lee el atributo `field`.
    pub fn source_key<'a>(&'a self, field: &'a str) -> &'a str {
        self.fields_map.get(field).map(String::as_str).unwrap_or(field)
    }

    fn value_for<'r>(&self, record: &'r Record, field: &str) -> Result<&'r Data> {
        let key = self.source_key(field);
        record.get(key).ok_or_else(|| FlowError::MissingKey { key: key.to_string(),
                                                              record: Data::Record(record.clone()).to_string() })
    }

    /// Normaliza la entrada a registro y decide la lista de campos a asignar.
    fn prepare(&self, input: Data) -> Result<(Record, Vec<String>)> {
        match input {
            Data::Record(record) => {
                let fields = match &self.fields {
                    Some(f) => f.clone(),
                    None => record.keys().cloned().collect(),
                };
                Ok((record, fields))
            }
            scalar => {
                let fields = self.fields.clone().unwrap_or_default();
                if fields.len() != 1 {
                    return Err(FlowError::AmbiguousScalar { value: scalar.to_string(),
                                                            fields: fields.len() });
                }
                let mut record = Record::new();
                record.insert(self.source_key(&fields[0]).to_string(), scalar);
                Ok((record, fields))
            }
        }
    }
}

impl Action for ModelObjectCreate {
    fn run(&self, input: Data, ctx: &Context<'_>) -> Result<Data> {
        let session = ctx.session()?;
        let (record, fields) = self.prepare(input)?;

        let obj = match &self.unique {
            Some(unique) => {
                let mut lookup = Record::new();
                for field in unique {
                    lookup.insert(field.clone(), self.value_for(&record, field)?.clone());
                }
                let (obj, created) = session.get_or_create(&self.model, Record::new(), lookup)?;
                log::debug!("{}: get_or_create (creado: {})", self.model.name, created);
                obj
            }
            None => {
                let obj = ObjectRef::new(&self.model);
                session.add(obj.clone())?;
                obj
            }
        };

        for field in fields.iter() {
            if !obj.has_attribute(field)? {
                return Err(FlowError::MissingAttribute { model: self.model.name.clone(),
                                                         attribute: field.clone() });
            }
            obj.set(field, self.value_for(&record, field)?.clone())?;
        }

        Ok(Data::Object(obj))
    }

    fn kind(&self) -> ActionKind<'_> {
        ActionKind::ModelObjectCreate { model: &self.model.name,
                                        fields: self.fields.as_deref(),
                                        fields_map: &self.fields_map,
                                        unique: self.unique.as_deref() }
    }
}
