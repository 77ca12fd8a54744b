// Esquema Diesel para SQLite.
// Tabla única: objects (una fila por instancia de modelo, campos en JSON)
diesel::table! {
    objects (seq) {
        seq -> BigInt,
        id -> Text,
        model -> Text,
        fields -> Text,
        updated_at_ts -> BigInt,
    }
}
