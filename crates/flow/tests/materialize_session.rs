use flow::errors::{FlowError, Result};
use flow::{scope, Chain, Context, Data, InMemorySession, Model, ModelObjectCreate, ModelSchema, ObjectRef,
           OrmSession, Record, Root};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Deserialize, PartialEq)]
struct Book {
  author: Option<String>,
  name: Option<String>,
}

impl Model for Book {
  const NAME: &'static str = "Book";
  const FIELDS: &'static [&'static str] = &["author", "name"];
}

fn books(chain: Chain, input: serde_json::Value) -> (InMemorySession, Result<Data>) {
  let session = InMemorySession::new();
  let res = scope(&session, |ctx| chain.call(input.into(), ctx));
  (session, res)
}

fn committed_books(session: &InMemorySession) -> Vec<Book> {
  session.committed().iter().map(|o| o.to_typed::<Book>().unwrap()).collect()
}

#[test]
fn default_fields_copy_every_record_key() {
  let chain = Chain::new(Root).for_each(ModelObjectCreate::new::<Book>());
  let (session, res) = books(chain, json!([{"author": "Y", "name": "X"}]));
  res.unwrap();
  assert_eq!(committed_books(&session),
             vec![Book { author: Some("Y".into()),
                         name: Some("X".into()) }]);
}

#[test]
fn duplicates_without_unique_create_separate_objects() {
  let chain = Chain::new(Root).for_each(ModelObjectCreate::new::<Book>());
  let item = json!({"author": "Y", "name": "X"});
  let (session, res) = books(chain, json!([item.clone(), item]));
  let out = res.unwrap();
  assert_eq!(session.committed().len(), 2);
  let objects = out.as_list().unwrap();
  let (a, b) = (objects[0].as_object().unwrap(), objects[1].as_object().unwrap());
  assert!(!a.ptr_eq(b));
  // Mismos campos, misma igualdad de valor.
  assert_eq!(a, b);
}

#[test]
fn unique_deduplicates_within_a_run() {
  let chain = Chain::new(Root).for_each(ModelObjectCreate::new::<Book>().unique(["name", "author"]));
  let item = json!({"author": "Y", "name": "X"});
  let (session, res) = books(chain, json!([item.clone(), item]));
  let out = res.unwrap();
  assert_eq!(session.committed().len(), 1);
  let objects = out.as_list().unwrap();
  assert!(objects[0].as_object().unwrap().ptr_eq(objects[1].as_object().unwrap()));
}

#[test]
fn repeated_runs_are_idempotent_with_unique() {
  let chain = Chain::new(Root).for_each(ModelObjectCreate::new::<Book>().unique(["name"]));
  let session = InMemorySession::new();
  let input = json!([{"author": "A", "name": "X"}, {"author": "B", "name": "Z"}]);
  for _ in 0..2 {
    scope(&session, |ctx| chain.call(input.clone().into(), ctx)).unwrap();
  }
  assert_eq!(session.committed().len(), 2);
}

#[test]
fn last_write_wins_on_non_unique_fields() {
  let chain = Chain::new(Root).for_each(ModelObjectCreate::new::<Book>().unique(["name"]));
  let (session, res) = books(chain, json!([{"author": "A", "name": "X"}, {"author": "B", "name": "X"}]));
  res.unwrap();
  assert_eq!(committed_books(&session),
             vec![Book { author: Some("B".into()),
                         name: Some("X".into()) }]);
}

#[test]
fn fields_subset_leaves_other_attributes_null() {
  let chain = Chain::new(Root).for_each(ModelObjectCreate::new::<Book>().fields(["name"]));
  let (session, res) = books(chain, json!([{"author": "Y", "name": "X", "year": 1999}]));
  res.unwrap();
  assert_eq!(committed_books(&session),
             vec![Book { author: None,
                         name: Some("X".into()) }]);
}

#[test]
fn fields_map_reads_from_renamed_keys() {
  let create = ModelObjectCreate::new::<Book>().fields(["name", "author"])
                                               .fields_map([("name", "title"), ("author", "writer")])
                                               .unique(["name"]);
  let chain = Chain::new(Root).for_each(create);
  let input = json!([{"title": "X", "writer": "Y"}, {"title": "X", "writer": "Y"}]);
  let (session, res) = books(chain, input);
  res.unwrap();
  assert_eq!(committed_books(&session),
             vec![Book { author: Some("Y".into()),
                         name: Some("X".into()) }]);
}

#[test]
fn scalar_input_fills_the_single_field() {
  let chain = Chain::new(Root).for_each(ModelObjectCreate::new::<Book>().fields(["name"]).unique(["name"]));
  let (session, res) = books(chain, json!(["X", "Z", "X"]));
  res.unwrap();
  let mut names: Vec<_> = committed_books(&session).into_iter().filter_map(|b| b.name).collect();
  names.sort();
  assert_eq!(names, vec!["X", "Z"]);
}

#[test]
fn materializer_without_session_fails() {
  let chain = Chain::new(ModelObjectCreate::new::<Book>());
  let res = chain.call(json!({"name": "X"}).into(), &Context::detached());
  assert!(matches!(res, Err(FlowError::ContextMissing)));
}

#[test]
fn missing_source_key_is_named_in_the_error() {
  let create = ModelObjectCreate::new::<Book>().fields(["name"]).fields_map([("name", "title")]);
  let (session, res) = books(Chain::new(create), json!({"name": "X"}));
  match res {
    Err(FlowError::MissingKey { key, .. }) => assert_eq!(key, "title"),
    other => panic!("expected MissingKey, got {:?}", other),
  }
  assert!(session.committed().is_empty());
}

#[test]
fn unknown_attribute_names_model_and_field() {
  let (_, res) = books(Chain::new(ModelObjectCreate::new::<Book>()), json!({"name": "X", "year": 1999}));
  match res {
    Err(FlowError::MissingAttribute { model, attribute }) => {
      assert_eq!(model, "Book");
      assert_eq!(attribute, "year");
    }
    other => panic!("expected MissingAttribute, got {:?}", other),
  }
}

#[test]
fn failure_mid_run_leaves_nothing_committed() {
  // El tercer elemento es un escalar y no hay un único campo configurado.
  let chain = Chain::new(Root).for_each(ModelObjectCreate::new::<Book>());
  let input = json!([{"name": "A"}, {"name": "B"}, "C"]);
  let (session, res) = books(chain, input);
  assert!(matches!(res, Err(FlowError::AmbiguousScalar { fields: 0, .. })));
  assert!(session.committed().is_empty());
  assert_eq!(session.added().len(), 2);
}

/// Sesión que delega en memoria y cuenta las confirmaciones.
struct CountingSession {
  inner: InMemorySession,
  commits: AtomicUsize,
}

impl OrmSession for CountingSession {
  fn add(&self, obj: ObjectRef) -> Result<()> {
    self.inner.add(obj)
  }

  fn get_or_create(&self, model: &ModelSchema, defaults: Record, lookup: Record) -> Result<(ObjectRef, bool)> {
    self.inner.get_or_create(model, defaults, lookup)
  }

  fn commit(&self) -> Result<()> {
    self.commits.fetch_add(1, Ordering::SeqCst);
    self.inner.commit()
  }
}

#[test]
fn scope_commits_exactly_once_on_success_and_never_on_failure() {
  let session = CountingSession { inner: InMemorySession::new(),
                                  commits: AtomicUsize::new(0) };
  let chain = Chain::new(Root).for_each(ModelObjectCreate::new::<Book>());
  scope(&session, |ctx| chain.call(json!([{"name": "A"}, {"name": "B"}]).into(), ctx)).unwrap();
  assert_eq!(session.commits.load(Ordering::SeqCst), 1);
  assert_eq!(session.inner.committed().len(), 2);

  let res = scope(&session, |ctx| chain.call(json!(["bad"]).into(), ctx));
  assert!(res.is_err());
  assert_eq!(session.commits.load(Ordering::SeqCst), 1);
}

#[test]
fn nested_scope_is_a_configuration_error() {
  let outer = InMemorySession::new();
  let inner = InMemorySession::new();
  let res = scope(&outer, |_| scope(&inner, |_| Ok(Data::Null)));
  assert!(matches!(res, Err(FlowError::Config(_))));
  assert!(outer.committed().is_empty());
  // El guard se libera: un scope posterior funciona.
  assert!(scope(&inner, |_| Ok(())).is_ok());
}
