use flow::{scope, Chain, Context, Data, FieldsTransform, FlowError, Model, ModelObjectCreate, OrmSession, Record, Root};
use flow_persistence::DieselStore;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use uuid::Uuid;

#[derive(Debug, Deserialize, PartialEq)]
struct Author {
  name: String,
}

impl Model for Author {
  const NAME: &'static str = "Author";
  const FIELDS: &'static [&'static str] = &["name"];
}

struct Book;

impl Model for Book {
  const NAME: &'static str = "Book";
  const FIELDS: &'static [&'static str] = &["title", "author", "year"];
}

fn temp_store() -> DieselStore {
  // Base SQLite en un fichero temporal: cada test usa la suya.
  let tmp_path = std::env::temp_dir().join(format!("flow_persistence_test_{}.db", Uuid::new_v4()));
  DieselStore::new(tmp_path.to_str().unwrap()).expect("failed to open store")
}

fn books_chain() -> Chain {
  let author = ModelObjectCreate::new::<Author>().fields(["name"]).unique(["name"]);
  Chain::new(Root).for_each(FieldsTransform::new().field("author", author))
                  .then(ModelObjectCreate::new::<Book>().unique(["title"]))
}

fn run(store: &DieselStore, chain: &Chain, input: serde_json::Value) -> flow::Result<Data> {
  let session = store.session();
  scope(&session, |ctx| chain.call(input.into(), ctx))
}

#[test]
fn committed_objects_survive_the_session() {
  let store = temp_store();
  let input = json!([
    {"title": "A", "author": "Ana", "year": 2001},
    {"title": "B", "author": "Ana", "year": 2003}
  ]);
  run(&store, &books_chain(), input).unwrap();

  assert_eq!(store.count("Author").unwrap(), 1);
  assert_eq!(store.count("Book").unwrap(), 2);
  let books = store.load_all("Book").unwrap();
  let titles: Vec<_> = books.iter().map(|b| b.get("title").unwrap().unwrap()).collect();
  assert_eq!(titles, vec![Data::from("A"), Data::from("B")]);

  // Las referencias se resuelven al mismo handle dentro de una carga.
  let a1 = books[0].get("author").unwrap().unwrap();
  let a2 = books[1].get("author").unwrap().unwrap();
  assert!(a1.as_object().unwrap().ptr_eq(a2.as_object().unwrap()));
  assert_eq!(a1.as_object().unwrap().to_typed::<Author>().unwrap(), Author { name: "Ana".into() });
}

#[test]
fn second_run_deduplicates_against_stored_rows() {
  let store = temp_store();
  let chain = books_chain();
  let input = json!([{"title": "A", "author": "Ana", "year": 2001}]);
  run(&store, &chain, input.clone()).unwrap();
  run(&store, &chain, input).unwrap();
  assert_eq!(store.count("Author").unwrap(), 1);
  assert_eq!(store.count("Book").unwrap(), 1);
}

#[test]
fn existing_rows_are_updated_last_write_wins() {
  let store = temp_store();
  let chain = books_chain();
  run(&store, &chain, json!([{"title": "A", "author": "Ana", "year": 2001}])).unwrap();
  run(&store, &chain, json!([{"title": "A", "author": "Luis", "year": 2010}])).unwrap();

  assert_eq!(store.count("Book").unwrap(), 1);
  assert_eq!(store.count("Author").unwrap(), 2);
  let book = &store.load_all("Book").unwrap()[0];
  assert_eq!(book.get("year").unwrap(), Some(Data::Int(2010)));
  let author = book.get("author").unwrap().unwrap();
  assert_eq!(author.as_object().unwrap().get("name").unwrap(), Some(Data::from("Luis")));
}

#[test]
fn failed_run_writes_nothing() {
  let store = temp_store();
  // El segundo libro no tiene `title`, que es la clave única.
  let input = json!([
    {"title": "A", "author": "Ana", "year": 2001},
    {"author": "Ana", "year": 2003}
  ]);
  let res = run(&store, &books_chain(), input);
  match res {
    Err(FlowError::MissingKey { key, .. }) => assert_eq!(key, "title"),
    other => panic!("expected MissingKey, got {:?}", other),
  }
  assert_eq!(store.count("Author").unwrap(), 0);
  assert_eq!(store.count("Book").unwrap(), 0);
}

#[test]
fn get_or_create_reports_creation_and_reuses_pending_objects() {
  let store = temp_store();
  let session = store.session();
  let mut lookup = Record::new();
  lookup.insert("name".into(), Data::from("Ana"));

  let (first, created) = session.get_or_create(&Author::schema(), Record::new(), lookup.clone()).unwrap();
  assert!(created);
  let (again, created) = session.get_or_create(&Author::schema(), Record::new(), lookup.clone()).unwrap();
  assert!(!created);
  assert!(first.ptr_eq(&again));
  assert_eq!(session.pending().unwrap().len(), 1);
  session.commit().unwrap();

  let other = store.session();
  let (stored, created) = other.get_or_create(&Author::schema(), Record::new(), lookup).unwrap();
  assert!(!created);
  assert_eq!(stored.id().unwrap(), first.id().unwrap());
}

#[test]
fn overlapping_sessions_keep_one_row_per_unique_key() {
  let store = temp_store();
  let chain = books_chain();
  let first = store.session();
  let second = store.session();

  // Las dos sesiones resuelven las claves antes de que ninguna confirme.
  chain.call(json!([{"title": "A", "author": "Ana", "year": 2001}]).into(), &Context::bound(&first))
       .unwrap();
  let out = chain.call(json!([{"title": "A", "author": "Ana", "year": 2005}]).into(), &Context::bound(&second))
                 .unwrap();
  first.commit().unwrap();
  second.commit().unwrap();

  assert_eq!(store.count("Author").unwrap(), 1);
  assert_eq!(store.count("Book").unwrap(), 1);
  let book = &store.load_all("Book").unwrap()[0];
  assert_eq!(book.get("year").unwrap(), Some(Data::Int(2005)));
  let author = book.get("author").unwrap().unwrap();
  assert_eq!(author.as_object().unwrap().to_typed::<Author>().unwrap(), Author { name: "Ana".into() });

  // El handle devuelto por la segunda sesión ahora apunta a la fila guardada.
  let returned = match out {
    Data::List(items) => items[0].as_object().unwrap().clone(),
    other => panic!("expected list, got {:?}", other),
  };
  assert_eq!(returned.id().unwrap(), book.id().unwrap());
}

#[test]
fn concurrent_runs_do_not_duplicate_unique_rows() {
  let store = temp_store();
  let barrier = Arc::new(Barrier::new(2));
  let handles: Vec<_> = (0..2).map(|_| {
                                let store = store.clone();
                                let barrier = barrier.clone();
                                thread::spawn(move || {
                                  let chain = Chain::new(Root).for_each(ModelObjectCreate::new::<Author>().fields(["name"])
                                                                                                       .unique(["name"]));
                                  let session = store.session();
                                  scope(&session, |ctx| {
                                    let out = chain.call(json!(["Ana"]).into(), ctx)?;
                                    // ambos get_or_create terminan antes de cualquier commit
                                    barrier.wait();
                                    Ok(out)
                                  })
                                })
                              })
                              .collect();
  for handle in handles {
    handle.join().unwrap().unwrap();
  }
  assert_eq!(store.count("Author").unwrap(), 1);
}

#[test]
fn empty_database_url_is_rejected() {
  assert!(matches!(DieselStore::new("  "), Err(FlowError::Config(_))));
}
