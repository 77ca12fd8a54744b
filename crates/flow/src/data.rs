// Archivo: data.rs
// Propósito: modelo de datos que circula por las cadenas de acciones.
//
// Los registros son mapas ordenados `nombre de campo -> valor`. Los valores
// pueden ser escalares, listas, registros anidados o referencias a objetos
// materializados (`ObjectRef`).
use crate::model::ObjectRef;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::fmt;

/// Registro: mapa ordenado por inserción.
pub type Record = IndexMap<String, Data>;

/// Valor que fluye entre acciones.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Data {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Data>),
    Record(Record),
    /// Referencia a un objeto de modelo (nuevo o recuperado del store).
    Object(ObjectRef),
}

impl Data {
    /// Nombre corto del tipo, usado en mensajes de error.
    pub fn type_name(&self) -> &'static str {
        match self {
            Data::Null => "null",
            Data::Bool(_) => "bool",
            Data::Int(_) => "int",
            Data::Float(_) => "float",
            Data::Text(_) => "text",
            Data::List(_) => "list",
            Data::Record(_) => "record",
            Data::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Data::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Data::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Data::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Data::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Data]> {
        match self {
            Data::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Data::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Consume el valor y devuelve sus elementos si es iterable (lista).
    pub fn into_items(self) -> crate::Result<Vec<Data>> {
        match self {
            Data::List(items) => Ok(items),
            other => Err(crate::FlowError::type_mismatch("list", &other)),
        }
    }

    /// Consume el valor y devuelve el registro.
    pub fn into_record(self) -> crate::Result<Record> {
        match self {
            Data::Record(r) => Ok(r),
            other => Err(crate::FlowError::type_mismatch("record", &other)),
        }
    }

    /// Convierte a JSON. Los objetos se expanden a sus campos más `id`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Data::Null => JsonValue::Null,
            Data::Bool(b) => JsonValue::Bool(*b),
            Data::Int(i) => JsonValue::from(*i),
            Data::Float(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number)
                                                             .unwrap_or(JsonValue::Null),
            Data::Text(s) => JsonValue::String(s.clone()),
            Data::List(items) => JsonValue::Array(items.iter().map(Data::to_json).collect()),
            Data::Record(r) => record_to_json(r),
            Data::Object(o) => o.to_json(),
        }
    }
}

/// Convierte un registro en un objeto JSON preservando el orden de campos.
pub fn record_to_json(record: &Record) -> JsonValue {
    let map: serde_json::Map<String, JsonValue> = record.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
    JsonValue::Object(map)
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<JsonValue> for Data {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Data::Null,
            JsonValue::Bool(b) => Data::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Data::Int(i),
                None => Data::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Data::Text(s),
            JsonValue::Array(items) => Data::List(items.into_iter().map(Data::from).collect()),
            JsonValue::Object(map) => Data::Record(map.into_iter().map(|(k, v)| (k, Data::from(v))).collect()),
        }
    }
}

impl From<bool> for Data {
    fn from(b: bool) -> Self {
        Data::Bool(b)
    }
}

impl From<i64> for Data {
    fn from(i: i64) -> Self {
        Data::Int(i)
    }
}

impl From<f64> for Data {
    fn from(f: f64) -> Self {
        Data::Float(f)
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Data::Text(s.to_string())
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Data::Text(s)
    }
}

impl From<Record> for Data {
    fn from(r: Record) -> Self {
        Data::Record(r)
    }
}

impl From<ObjectRef> for Data {
    fn from(o: ObjectRef) -> Self {
        Data::Object(o)
    }
}

impl<T: Into<Data>> From<Vec<T>> for Data {
    fn from(items: Vec<T>) -> Self {
        Data::List(items.into_iter().map(Into::into).collect())
    }
}
