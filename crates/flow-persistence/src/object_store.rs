use crate::schema;
use crate::schema::objects::dsl as objects_dsl;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::result::Error as DieselError;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use flow::{Data, FlowError, ModelObject, ModelSchema, ObjectRef, OrmSession, Record, Result};
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");
type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;
/// Clave con la que se guarda una referencia a otro objeto dentro de `fields`.
const REF_KEY: &str = "$ref";
/// Pragmas aplicados a cada conexión nueva del pool.
#[derive(Debug)]
struct SqlitePragmas;
impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
  fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
    conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
        .map_err(diesel::r2d2::Error::QueryError)
  }
}
/// Almacén SQLite de objetos de modelo.
///
/// Cada instancia se guarda como una fila de `objects` con sus campos en
/// JSON; `seq` conserva el orden de inserción.
#[derive(Clone)]
pub struct DieselStore {
  pool: Arc<DbPool>,
}
impl DieselStore {
  /// Abre (o crea) la base en `database_url` y aplica las migraciones
  /// pendientes.
  pub fn new(database_url: &str) -> Result<Self> {
    if database_url.trim().is_empty() {
      return Err(FlowError::Config("la URL de la base de datos está vacía".into()));
    }
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = Pool::builder().max_size(4)
                              .connection_customizer(Box::new(SqlitePragmas))
                              .build(manager)
                              .map_err(|e| FlowError::Storage(format!("pool: {}", e)))?;
    let store = DieselStore { pool: Arc::new(pool) };
    let mut conn = store.conn()?;
    let applied = conn.run_pending_migrations(MIGRATIONS)
                      .map_err(|e| FlowError::Storage(format!("migraciones: {}", e)))?;
    if !applied.is_empty() {
      log::info!("{} migraciones aplicadas en {}", applied.len(), database_url);
    }
    Ok(store)
  }
  fn conn_raw(&self) -> std::result::Result<DbConn, r2d2::Error> {
    self.pool.get()
  }
  fn conn(&self) -> Result<DbConn> {
    self.conn_raw().map_err(|e| FlowError::Storage(format!("pool: {}", e)))
  }
  /// Nueva sesión sobre este almacén. Cada ejecución de una cadena debería
  /// usar su propia sesión.
  pub fn session(&self) -> DieselSession {
    DieselSession { store: self.clone(),
                    state: Mutex::new(SessionState::default()) }
  }
  /// Todos los objetos guardados de `model`, en orden de inserción.
  pub fn load_all(&self, model: &str) -> Result<Vec<ObjectRef>> {
    self.session().load_all(model)
  }
  /// Número de filas guardadas de `model`.
  pub fn count(&self, model: &str) -> Result<i64> {
    let mut conn = self.conn()?;
    map_db_err(objects_dsl::objects.filter(objects_dsl::model.eq(model))
                                   .count()
                                   .get_result::<i64>(&mut conn))
  }
}
#[derive(Debug, Queryable)]
struct ObjectRow {
  #[allow(dead_code)]
  pub seq: i64,
  pub id: String,
  pub model: String,
  pub fields: String,
  #[allow(dead_code)]
  pub updated_at_ts: i64,
}
#[derive(Debug, Insertable)]
#[diesel(table_name = schema::objects)]
struct NewObjectRow {
  pub id: String,
  pub model: String,
  pub fields: String,
  pub updated_at_ts: i64,
}
fn map_db_err<T>(res: std::result::Result<T, DieselError>) -> Result<T> {
  res.map_err(|e| FlowError::Storage(format!("db: {}", e)))
}
#[derive(Default)]
struct SessionState {
  /// Objetos nuevos registrados con `add` o creados por `get_or_create`.
  pending: Vec<ObjectRef>,
  /// Objetos ya guardados que esta sesión ha cargado (mapa de identidad).
  tracked: IndexMap<Uuid, ObjectRef>,
  /// Clave única de cada objeto pendiente creado por `get_or_create`.
  keys: HashMap<Uuid, Record>,
}

/// Id nuevo de los objetos pendientes que se fusionan con una fila guardada.
type IdMap = HashMap<Uuid, Uuid>;

/// Error dentro de la transacción de `commit`.
enum CommitError {
  Db(DieselError),
  Flow(FlowError),
}

impl From<DieselError> for CommitError {
  fn from(e: DieselError) -> Self {
    CommitError::Db(e)
  }
}

impl From<FlowError> for CommitError {
  fn from(e: FlowError) -> Self {
    CommitError::Flow(e)
  }
}

/// Sesión de unidad de trabajo sobre `DieselStore`.
///
/// Nada llega a la base hasta `commit`; si la sesión se descarta sin
/// confirmar, los cambios se pierden.
///
/// Dos sesiones pueden crear a la vez un objeto con la misma clave única. El
/// `commit` vuelve a buscar esas claves dentro de una transacción
/// `IMMEDIATE`: si otra sesión ya guardó la fila, el objeto pendiente toma su
/// `id` y la actualiza en lugar de insertar un duplicado.
pub struct DieselSession {
  store: DieselStore,
  state: Mutex<SessionState>,
}

impl DieselSession {
  fn lock(&self) -> Result<MutexGuard<'_, SessionState>> {
    self.state.lock().map_err(|e| FlowError::Storage(format!("mutex poisoned: {:?}", e)))
  }

  /// Objetos nuevos pendientes de confirmar.
  pub fn pending(&self) -> Result<Vec<ObjectRef>> {
    Ok(self.lock()?.pending.clone())
  }

  /// Carga todas las filas de `model` en orden de inserción.
  pub fn load_all(&self, model: &str) -> Result<Vec<ObjectRef>> {
    let mut conn = self.store.conn()?;
    let rows = map_db_err(objects_dsl::objects.filter(objects_dsl::model.eq(model))
                                              .order(objects_dsl::seq.asc())
                                              .load::<ObjectRow>(&mut conn))?;
    let mut state = self.lock()?;
    rows.into_iter().map(|row| hydrate(&mut conn, &mut state, row)).collect()
  }
}

impl OrmSession for DieselSession {
  fn add(&self, obj: ObjectRef) -> Result<()> {
    self.lock()?.pending.push(obj);
    Ok(())
  }

  /// Busca primero en memoria (pendientes y cargados) y después en las filas
  /// guardadas del modelo que la sesión todavía no ha cargado.
  fn get_or_create(&self, model: &ModelSchema, defaults: Record, lookup: Record) -> Result<(ObjectRef, bool)> {
    let mut state = self.lock()?;
    for obj in state.pending.iter().chain(state.tracked.values()) {
      if obj.matches(&model.name, &lookup)? {
        return Ok((obj.clone(), false));
      }
    }

    let mut conn = self.store.conn()?;
    let wanted = encode_lookup(&lookup, &IdMap::new())?;
    let found = find_stored(&mut conn, &model.name, &wanted, |row| row_is_tracked(&state, row))?;
    if let Some(row) = found {
      log::debug!("{} {} encontrado en la base", model.name, row.id);
      let obj = hydrate(&mut conn, &mut state, row)?;
      return Ok((obj, false));
    }

    let obj = ObjectRef::new(model);
    for (field, value) in lookup.iter().chain(defaults.iter()) {
      obj.set(field, value.clone())?;
    }
    if !lookup.is_empty() {
      state.keys.insert(obj.id()?, lookup);
    }
    state.pending.push(obj.clone());
    Ok((obj, true))
  }

  /// Inserta o actualiza (por `id`) todos los objetos de la sesión en una
  /// sola transacción.
  fn commit(&self) -> Result<()> {
    let mut state = self.lock()?;
    let now = chrono::Utc::now().timestamp_millis();
    let mut conn = self.store.conn()?;

    let outcome = conn.immediate_transaction::<_, CommitError, _>(|conn| {
                        let ids = claim_stored_keys(conn, &state)?;
                        let rows = rows_to_write(&state, &ids, now)?;
                        use schema::objects::dsl::*;
                        for row in rows.iter() {
                          diesel::insert_into(objects).values(row)
                                                      .on_conflict(id)
                                                      .do_update()
                                                      .set((fields.eq(&row.fields), updated_at_ts.eq(row.updated_at_ts)))
                                                      .execute(conn)?;
                        }
                        Ok((ids, rows.len()))
                      });
    let (ids, written) = match outcome {
      Ok(done) => done,
      Err(CommitError::Db(e)) => return Err(FlowError::Storage(format!("db: {}", e))),
      Err(CommitError::Flow(e)) => return Err(e),
    };

    let pending = std::mem::take(&mut state.pending);
    for obj in pending {
      let mut oid = obj.id()?;
      if let Some(stored) = ids.get(&oid) {
        log::debug!("{} fusionado con la fila {}", oid, stored);
        obj.set_id(*stored)?;
        oid = *stored;
      }
      state.tracked.insert(oid, obj);
    }
    state.keys.clear();
    log::debug!("{} objetos guardados", written);
    Ok(())
  }
}

/// Para cada objeto pendiente con clave única, busca una fila guardada con la
/// misma clave (quizá escrita por otra sesión después de `get_or_create`).
fn claim_stored_keys(conn: &mut SqliteConnection, state: &SessionState) -> Result<IdMap> {
  let mut ids = IdMap::new();
  for obj in state.pending.iter() {
    let oid = obj.id()?;
    let lookup = match state.keys.get(&oid) {
      Some(lookup) => lookup,
      None => continue,
    };
    let model = obj.model_name()?;
    let wanted = encode_lookup(lookup, &ids)?;
    if let Some(row) = find_stored(conn, &model, &wanted, |_| false)? {
      let stored = Uuid::parse_str(&row.id).map_err(|e| FlowError::Storage(format!("uuid inválido {}: {}", row.id, e)))?;
      ids.insert(oid, stored);
    }
  }
  Ok(ids)
}

fn rows_to_write(state: &SessionState, ids: &IdMap, now: i64) -> Result<Vec<NewObjectRow>> {
  let mut rows = Vec::with_capacity(state.pending.len() + state.tracked.len());
  for obj in state.pending.iter().chain(state.tracked.values()) {
    let snapshot = obj.snapshot()?;
    let oid = ids.get(&snapshot.id).copied().unwrap_or(snapshot.id);
    rows.push(NewObjectRow { id: oid.to_string(),
                             model: snapshot.model.clone(),
                             fields: encode_record(&snapshot.fields, ids)?.to_string(),
                             updated_at_ts: now });
  }
  Ok(rows)
}

/// Primera fila de `model` (en orden de inserción) cuyos campos guardados
/// coinciden con `wanted`, saltando las que indique `skip`.
fn find_stored<F>(conn: &mut SqliteConnection,
                  model: &str,
                  wanted: &[(String, JsonValue)],
                  skip: F)
                  -> Result<Option<ObjectRow>>
  where F: Fn(&ObjectRow) -> bool
{
  let rows = map_db_err(objects_dsl::objects.filter(objects_dsl::model.eq(model))
                                            .order(objects_dsl::seq.asc())
                                            .load::<ObjectRow>(conn))?;
  for row in rows {
    if skip(&row) {
      continue;
    }
    let stored = parse_fields(&row)?;
    if wanted.iter().all(|(k, v)| stored.get(k) == Some(v)) {
      return Ok(Some(row));
    }
  }
  Ok(None)
}

fn row_is_tracked(state: &SessionState, row: &ObjectRow) -> bool {
  Uuid::parse_str(&row.id).map(|id| state.tracked.contains_key(&id)).unwrap_or(false)
}

fn parse_fields(row: &ObjectRow) -> Result<serde_json::Map<String, JsonValue>> {
  match serde_json::from_str::<JsonValue>(&row.fields) {
    Ok(JsonValue::Object(map)) => Ok(map),
    Ok(other) => Err(FlowError::Storage(format!("campos de {} no son un objeto JSON: {}", row.id, other))),
    Err(e) => Err(FlowError::Storage(format!("json de {}: {}", row.id, e))),
  }
}

fn encode_lookup(lookup: &Record, ids: &IdMap) -> Result<Vec<(String, JsonValue)>> {
  lookup.iter().map(|(k, v)| Ok((k.clone(), encode(v, ids)?))).collect()
}

/// Codifica un valor para guardarlo: los objetos se sustituyen por
/// `{"$ref": id}`, con el id ya fusionado si está en `ids`.
fn encode(value: &Data, ids: &IdMap) -> Result<JsonValue> {
  Ok(match value {
       Data::Object(obj) => {
         let oid = obj.id()?;
         let oid = ids.get(&oid).copied().unwrap_or(oid);
         let mut reference = serde_json::Map::new();
         reference.insert(REF_KEY.to_string(), JsonValue::String(oid.to_string()));
         JsonValue::Object(reference)
       }
       Data::List(items) => JsonValue::Array(items.iter().map(|v| encode(v, ids)).collect::<Result<_>>()?),
       Data::Record(record) => encode_record(record, ids)?,
       scalar => scalar.to_json(),
     })
}

fn encode_record(record: &Record, ids: &IdMap) -> Result<JsonValue> {
  let mut map = serde_json::Map::new();
  for (k, v) in record.iter() {
    map.insert(k.clone(), encode(v, ids)?);
  }
  Ok(JsonValue::Object(map))
}

/// Convierte una fila en `ObjectRef`, reutilizando el handle si la sesión ya
/// la cargó. El objeto se registra antes de decodificar sus campos para que
/// las referencias circulares terminen.
fn hydrate(conn: &mut SqliteConnection, state: &mut SessionState, row: ObjectRow) -> Result<ObjectRef> {
  let oid = Uuid::parse_str(&row.id).map_err(|e| FlowError::Storage(format!("uuid inválido {}: {}", row.id, e)))?;
  if let Some(obj) = state.tracked.get(&oid) {
    return Ok(obj.clone());
  }
  let stored = parse_fields(&row)?;
  let obj = ObjectRef::from_object(ModelObject { id: oid,
                                                 model: row.model.clone(),
                                                 fields: stored.keys().map(|k| (k.clone(), Data::Null)).collect() });
  state.tracked.insert(oid, obj.clone());
  for (field, value) in stored {
    let decoded = decode(conn, state, value)?;
    obj.set(&field, decoded)?;
  }
  Ok(obj)
}
fn decode(conn: &mut SqliteConnection, state: &mut SessionState, value: JsonValue) -> Result<Data> {
  match value {
    JsonValue::Object(map) if map.len() == 1 && map.get(REF_KEY).is_some_and(JsonValue::is_string) => {
      let target = map.get(REF_KEY).and_then(JsonValue::as_str).unwrap_or_default().to_string();
      resolve(conn, state, &target).map(Data::Object)
    }
    JsonValue::Object(map) => {
      let mut record = Record::new();
      for (k, v) in map {
        record.insert(k, decode(conn, state, v)?);
      }
      Ok(Data::Record(record))
    }
    JsonValue::Array(items) => Ok(Data::List(items.into_iter()
                                                  .map(|v| decode(conn, state, v))
                                                  .collect::<Result<_>>()?)),
    scalar => Ok(Data::from(scalar)),
  }
}
/// Devuelve el objeto con id `target`, cargándolo si hace falta.
fn resolve(conn: &mut SqliteConnection, state: &mut SessionState, target: &str) -> Result<ObjectRef> {
  let known = Uuid::parse_str(target).ok().and_then(|oid| state.tracked.get(&oid).cloned());
  if let Some(obj) = known {
    return Ok(obj);
  }
  let row = map_db_err(objects_dsl::objects.filter(objects_dsl::id.eq(target))
                                           .first::<ObjectRow>(conn)
                                           .optional())?;
  match row {
    Some(row) => hydrate(conn, state, row),
    None => Err(FlowError::Storage(format!("referencia a un objeto inexistente: {}", target))),
  }
}
/// Abre el almacén indicado por `RSS_FLOW_DB_URL` o, si no existe,
/// `DATABASE_URL` (se carga `.env` si está presente).
pub fn new_from_env() -> Result<DieselStore> {
  dotenvy::dotenv().ok();
  let url = std::env::var("RSS_FLOW_DB_URL").or_else(|_| std::env::var("DATABASE_URL"))
                                            .map_err(|_| {
                                              FlowError::Config("RSS_FLOW_DB_URL / DATABASE_URL no definidas".into())
                                            })?;
  DieselStore::new(&url)
}
