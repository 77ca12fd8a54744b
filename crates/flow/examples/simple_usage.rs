use flow::engine::FlowEngineConfig;
use flow::errors::FlowError;
use flow::{ActionsPlotter, Chain, Data, FieldsTransform, FlowEngine, InMemorySession, Model, ModelObjectCreate, Root};
use serde_json::json;
use std::sync::Arc;

struct Book;

impl Model for Book {
    const NAME: &'static str = "Book";
    const FIELDS: &'static [&'static str] = &["author", "name"];
}

fn main() -> Result<(), FlowError> {
    // Cadena: por cada libro, normalizar el autor y materializar sin duplicados
    let normalize = FieldsTransform::new().field_fn("author", |a| Data::from(a.as_text().unwrap_or_default().trim()));
    let chain = Chain::new(Root).for_each(normalize)
                                .then(ModelObjectCreate::new::<Book>().unique(["name", "author"]));

    println!("{}", ActionsPlotter::new().render(&chain));

    let engine = FlowEngine::new(Arc::new(chain), FlowEngineConfig { name: "books".into() });
    let session = InMemorySession::new();
    let books = json!([
        {"author": " Y ", "name": "X"},
        {"author": "Y", "name": "X"},
        {"author": "Z", "name": "W"}
    ]);
    let report = engine.run(&session, books.into())?;
    println!("salida: {}", report.output);

    for obj in session.committed() {
        println!("confirmado: {}", obj.to_json());
    }
    Ok(())
}
