// Archivo: actions.rs
// Propósito: acciones básicas reutilizables (ancla, debug, acceso a campo,
// envoltorio de funciones y transformación por campos).
use crate::action::{Action, ActionKind};
use crate::chain::Chain;
use crate::data::Data;
use crate::errors::{FlowError, Result};
use crate::session::Context;
use indexmap::IndexMap;

/// Acción que no hace nada. Útil como primera acción:
/// `Chain::new(Root).for_each(accion)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Root;

impl Action for Root {
    fn run(&self, input: Data, _ctx: &Context<'_>) -> Result<Data> {
        Ok(input)
    }

    fn kind(&self) -> ActionKind<'_> {
        ActionKind::Root
    }
}

/// Registra su entrada en el log y la devuelve sin cambios.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugLog;

impl Action for DebugLog {
    fn run(&self, input: Data, _ctx: &Context<'_>) -> Result<Data> {
        log::info!("{}", input);
        Ok(input)
    }

    fn kind(&self) -> ActionKind<'_> {
        ActionKind::Debug
    }
}

/// Devuelve el valor de un campo del registro de entrada.
#[derive(Debug, Clone)]
pub struct GetField {
    field: String,
}

impl GetField {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Action for GetField {
    fn run(&self, input: Data, _ctx: &Context<'_>) -> Result<Data> {
        let mut record = input.into_record()?;
        match record.shift_remove(&self.field) {
            Some(value) => Ok(value),
            None => Err(FlowError::MissingKey { key: self.field.clone(),
                                                record: Data::Record(record).to_string() }),
        }
    }

    fn kind(&self) -> ActionKind<'_> {
        ActionKind::GetField { field: &self.field }
    }
}

type LambdaFn = dyn Fn(Data) -> Result<Data> + Send + Sync;

/// Envuelve cualquier función de un argumento como acción.
pub struct Lambda {
    func: Box<LambdaFn>,
}

impl Lambda {
    /// Función que puede fallar.
    pub fn new<F>(func: F) -> Self
        where F: Fn(Data) -> Result<Data> + Send + Sync + 'static
    {
        Self { func: Box::new(func) }
    }

    /// Función infalible.
    pub fn map<F>(func: F) -> Self
        where F: Fn(Data) -> Data + Send + Sync + 'static
    {
        Self::new(move |d| Ok(func(d)))
    }
}

impl Action for Lambda {
    fn run(&self, input: Data, _ctx: &Context<'_>) -> Result<Data> {
        (self.func)(input)
    }

    fn kind(&self) -> ActionKind<'_> {
        ActionKind::Lambda
    }
}

/// Aplica sub-cadenas a campos concretos del registro y guarda el resultado
/// en el mismo campo.
///
/// El registro se recibe por valor, así que el reemplazo en sitio nunca es
/// visible a través de otro alias. Los campos no mencionados no cambian y un
/// mapa vacío es la identidad.
///
/// ```rust
/// use flow::{Context, Data, FieldsTransform, Chain};
/// use serde_json::json;
///
/// let t = FieldsTransform::new()
///     .field_fn("b", |x| Data::Int(x.as_int().unwrap_or(0) * 20));
/// let out = Chain::new(t).call(json!({"b": 10, "c": 1}).into(), &Context::detached()).unwrap();
/// assert_eq!(out, Data::from(json!({"b": 200, "c": 1})));
/// ```
#[derive(Default)]
pub struct FieldsTransform {
    transformations: IndexMap<String, Chain>,
}

impl FieldsTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Añade (o reemplaza) la transformación de `field`. Acepta una acción o
    /// una cadena completa.
    pub fn field(mut self, field: impl Into<String>, action: impl Into<Chain>) -> Self {
        self.transformations.insert(field.into(), action.into());
        self
    }

    /// Atajo para funciones infalibles (se envuelven en `Lambda`).
    pub fn field_fn<F>(self, field: impl Into<String>, func: F) -> Self
        where F: Fn(Data) -> Data + Send + Sync + 'static
    {
        self.field(field, Lambda::map(func))
    }

    pub fn transformations(&self) -> &IndexMap<String, Chain> {
        &self.transformations
    }
}

impl Action for FieldsTransform {
    fn run(&self, input: Data, ctx: &Context<'_>) -> Result<Data> {
        let mut record = input.into_record()?;
        for (key, transformation) in self.transformations.iter() {
            if !record.contains_key(key) {
                return Err(FlowError::MissingKey { key: key.clone(),
                                                   record: Data::Record(record).to_string() });
            }
            let current = record.get_mut(key).map(std::mem::take).unwrap_or_default();
            let value = transformation.call(current, ctx)?;
            record.insert(key.clone(), value);
        }
        Ok(Data::Record(record))
    }

    fn kind(&self) -> ActionKind<'_> {
        ActionKind::FieldsTransform { transformations: &self.transformations }
    }
}
