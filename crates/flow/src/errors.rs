// Archivo: errors.rs
// Propósito: definir los errores de construcción y ejecución de cadenas de
// acciones y el alias Result<T> usado por las APIs del crate.
use thiserror::Error;

/// Errores comunes del motor de acciones.
///
/// - `Config`: configuración inválida detectada al construir una acción o al
///   abrir un scope de persistencia.
/// - `ContextMissing`: un materializador se ejecutó sin sesión enlazada.
/// - `MissingKey` / `MissingAttribute` / `AmbiguousScalar`: violaciones de
///   contrato del llamador durante la materialización.
/// - `TypeMismatch`: el dato no tiene la forma que la acción espera.
/// - `Transform`: fallo reportado por una transformación de usuario.
/// - `Storage`: error del backend de almacenamiento.
/// - `Other`: cualquier otro error.
#[derive(Error, Debug)]
pub enum FlowError {
  /// Configuración inválida (por ejemplo scopes anidados o campos vacíos).
  #[error("Error de configuración: {0}")]
  Config(String),
  /// No hay sesión ORM enlazada al contexto de ejecución.
  #[error("No hay sesión activa: ¿olvidaste ejecutar la cadena dentro de `session::scope`?")]
  ContextMissing,
  /// El registro no contiene la clave requerida.
  #[error("el registro no tiene la clave '{key}' (recibido: {record})")]
  MissingKey { key: String, record: String },
  /// El modelo no expone el atributo configurado.
  #[error("el modelo {model} no tiene el atributo {attribute}")]
  MissingAttribute { model: String, attribute: String },
  /// Valor escalar recibido con un número de campos distinto de uno.
  #[error("se recibió un valor escalar ({value}) pero hay {fields} campos configurados")]
  AmbiguousScalar { value: String, fields: usize },
  /// Tipo de dato inesperado para la acción.
  #[error("se esperaba {expected}, se recibió {got}")]
  TypeMismatch { expected: String, got: String },
  /// Error reportado por una transformación (lambda) de usuario.
  #[error("Error de transformación: {0}")]
  Transform(String),
  /// Error genérico de almacenamiento (BD, mutex envenenado, etc.).
  #[error("Error de almacenamiento: {0}")]
  Storage(String),
  /// Otro tipo de error.
  #[error("Otro: {0}")]
  Other(String),
}

impl FlowError {
  pub(crate) fn type_mismatch(expected: &str, got: &crate::data::Data) -> Self {
    FlowError::TypeMismatch { expected: expected.to_string(),
                              got: got.type_name().to_string() }
  }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, FlowError>;
