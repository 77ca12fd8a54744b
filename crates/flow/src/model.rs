// Archivo: model.rs
// Propósito: describir tipos de modelo (`ModelSchema`, trait `Model`) y las
// instancias que produce el materializador (`ModelObject`, `ObjectRef`).
use crate::data::{record_to_json, Data, Record};
use crate::errors::{FlowError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Tipo de modelo: nombre y atributos que expone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    pub name: String,
    pub fields: Vec<String>,
}

impl ModelSchema {
    pub fn new<I, S>(name: &str, fields: I) -> Self
        where I: IntoIterator<Item = S>,
              S: Into<String>
    {
        Self { name: name.to_string(),
               fields: fields.into_iter().map(Into::into).collect() }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// Trait implementado por los structs de dominio que pueden materializarse.
///
/// ```rust
/// use flow::Model;
/// struct Book;
/// impl Model for Book {
///     const NAME: &'static str = "Book";
///     const FIELDS: &'static [&'static str] = &["author", "name"];
/// }
/// assert!(Book::schema().has_field("author"));
/// ```
pub trait Model {
    const NAME: &'static str;
    const FIELDS: &'static [&'static str];

    fn schema() -> ModelSchema {
        ModelSchema::new(Self::NAME, Self::FIELDS.iter().copied())
    }
}

/// Instancia de un modelo. Una instancia nueva tiene todos sus atributos en
/// `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelObject {
    pub id: Uuid,
    pub model: String,
    pub fields: Record,
}

impl ModelObject {
    pub fn new(schema: &ModelSchema) -> Self {
        Self { id: Uuid::new_v4(),
               model: schema.name.clone(),
               fields: schema.fields.iter().map(|f| (f.clone(), Data::Null)).collect() }
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// JSON con los campos del objeto más su `id`.
    pub fn to_json(&self) -> JsonValue {
        let mut value = record_to_json(&self.fields);
        if let JsonValue::Object(map) = &mut value {
            map.insert("id".to_string(), JsonValue::String(self.id.to_string()));
        }
        value
    }

    /// Rehidrata el objeto en un tipo de dominio vía serde.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(|e| FlowError::Other(format!("{} → tipo: {}", self.model, e)))
    }
}

/// Handle compartido a una instancia de modelo.
///
/// El materializador devuelve siempre un `ObjectRef`; la sesión guarda otro
/// handle al mismo objeto, de modo que las actualizaciones posteriores
/// (get-or-create) se ven en ambos.
#[derive(Clone)]
pub struct ObjectRef(Arc<Mutex<ModelObject>>);

impl ObjectRef {
    /// Crea una instancia nueva (sin persistir) del modelo.
    pub fn new(schema: &ModelSchema) -> Self {
        Self::from_object(ModelObject::new(schema))
    }

    pub fn from_object(object: ModelObject) -> Self {
        ObjectRef(Arc::new(Mutex::new(object)))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ModelObject>> {
        self.0.lock().map_err(|e| FlowError::Storage(format!("mutex poisoned: {:?}", e)))
    }

    pub fn id(&self) -> Result<Uuid> {
        Ok(self.lock()?.id)
    }

    /// Reasigna el id; un backend lo usa al fusionar el objeto con una fila
    /// ya guardada bajo la misma clave única.
    pub fn set_id(&self, id: Uuid) -> Result<()> {
        self.lock()?.id = id;
        Ok(())
    }

    pub fn model_name(&self) -> Result<String> {
        Ok(self.lock()?.model.clone())
    }

    pub fn has_attribute(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.has_attribute(name))
    }

    /// Valor actual de un atributo (`None` si el modelo no lo expone).
    pub fn get(&self, name: &str) -> Result<Option<Data>> {
        Ok(self.lock()?.fields.get(name).cloned())
    }

    /// Asigna un atributo existente del modelo.
    pub fn set(&self, name: &str, value: Data) -> Result<()> {
        let mut obj = self.lock()?;
        let model = obj.model.clone();
        match obj.fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(FlowError::MissingAttribute { model,
                                                      attribute: name.to_string() }),
        }
    }

    /// Copia del estado actual del objeto.
    pub fn snapshot(&self) -> Result<ModelObject> {
        Ok(self.lock()?.clone())
    }

    /// ¿Es del modelo `model` y coinciden todos los campos de `lookup`?
    pub fn matches(&self, model: &str, lookup: &Record) -> Result<bool> {
        let obj = self.lock()?;
        if obj.model != model {
            return Ok(false);
        }
        Ok(lookup.iter().all(|(k, v)| obj.fields.get(k) == Some(v)))
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn to_json(&self) -> JsonValue {
        match self.lock() {
            Ok(obj) => obj.to_json(),
            Err(_) => JsonValue::Null,
        }
    }

    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        self.snapshot()?.to_typed()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.snapshot(), other.snapshot()) {
            (Ok(a), Ok(b)) => a.model == b.model && a.fields == b.fields,
            _ => false,
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Ok(obj) => write!(f, "<{}({}) {}>", obj.model, obj.id, record_to_json(&obj.fields)),
            Err(_) => write!(f, "<object (locked)>"),
        }
    }
}
