// Archivo: action.rs
// Propósito: definir el protocolo de acciones (`Action`) y la vista etiquetada
// de cada variante (`ActionKind` / `ActionTag`) usada por el plotter.
use crate::chain::Chain;
use crate::data::Data;
use crate::errors::Result;
use crate::session::Context;
use indexmap::IndexMap;
use std::fmt;

/// Unidad de transformación enlazable en una cadena.
///
/// Toda acción concreta implementa `run`, que hace el trabajo real. El
/// usuario nunca llama a `run` directamente: la ejecución pasa por
/// `Chain::call`, que aplica `for_each` y `then` de forma uniforme.
pub trait Action: Send + Sync {
    /// Transforma `input`. Puede tener efectos (por ejemplo persistencia a
    /// través de `ctx`).
    fn run(&self, input: Data, ctx: &Context<'_>) -> Result<Data>;

    /// Vista etiquetada de la acción con su configuración.
    fn kind(&self) -> ActionKind<'_>;
}

/// Variantes conocidas de acción, con su configuración prestada.
pub enum ActionKind<'a> {
    Root,
    Debug,
    Lambda,
    GetField {
        field: &'a str,
    },
    FieldsTransform {
        transformations: &'a IndexMap<String, Chain>,
    },
    ModelObjectCreate {
        model: &'a str,
        fields: Option<&'a [String]>,
        fields_map: &'a IndexMap<String, String>,
        unique: Option<&'a [String]>,
    },
    /// Acción definida por el usuario; `name` identifica su tipo.
    Custom {
        name: &'static str,
    },
}

/// Etiqueta plana de cada variante; clave del registro de renderers. Las
/// acciones de usuario se distinguen por su nombre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionTag {
    Root,
    Debug,
    Lambda,
    GetField,
    FieldsTransform,
    ModelObjectCreate,
    Custom(&'static str),
}

impl ActionKind<'_> {
    pub fn tag(&self) -> ActionTag {
        match self {
            ActionKind::Root => ActionTag::Root,
            ActionKind::Debug => ActionTag::Debug,
            ActionKind::Lambda => ActionTag::Lambda,
            ActionKind::GetField { .. } => ActionTag::GetField,
            ActionKind::FieldsTransform { .. } => ActionTag::FieldsTransform,
            ActionKind::ModelObjectCreate { .. } => ActionTag::ModelObjectCreate,
            ActionKind::Custom { name } => ActionTag::Custom(*name),
        }
    }

    /// Nombre para mostrar (etiquetas de grafo, logs).
    pub fn name(&self) -> &str {
        self.tag().as_str()
    }
}

impl ActionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTag::Root => "Root",
            ActionTag::Debug => "Debug",
            ActionTag::Lambda => "Lambda",
            ActionTag::GetField => "GetField",
            ActionTag::FieldsTransform => "FieldsTransform",
            ActionTag::ModelObjectCreate => "ModelObjectCreate",
            ActionTag::Custom(name) => *name,
        }
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
