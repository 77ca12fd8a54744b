// Archivo: plot.rs
// Propósito: dibujar una cadena de acciones como grafo Graphviz (texto DOT).
//
// El recorrido es de sólo lectura. Cada variante de acción se dibuja con el
// renderer registrado para su `ActionTag`; las que no tienen renderer propio
// reciben una etiqueta genérica con el nombre de la variante.
use crate::action::{ActionKind, ActionTag};
use crate::chain::{Chain, NodeId};
use crate::errors::{FlowError, Result};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Función que dibuja el nodo `id` de `chain`. `prev` es el nodo DOT del que
/// cuelga (si hay) y `edge_label` la etiqueta de esa arista.
pub type Renderer = fn(&mut ActionsPlotter, &Chain, NodeId, Option<usize>, Option<&str>);

/// Dibuja cadenas de acciones como grafos DOT.
pub struct ActionsPlotter {
    out: String,
    depth: usize,
    node_num: usize,
    cluster_num: usize,
    renderers: HashMap<ActionTag, Renderer>,
}

impl ActionsPlotter {
    /// Plotter con los renderers propios de `FieldsTransform`, `GetField` y
    /// `ModelObjectCreate` ya registrados.
    pub fn new() -> Self {
        let mut plotter = Self { out: String::new(),
                                 depth: 0,
                                 node_num: 0,
                                 cluster_num: 0,
                                 renderers: HashMap::new() };
        plotter.register(ActionTag::FieldsTransform, plot_fields_transform);
        plotter.register(ActionTag::GetField, plot_get_field);
        plotter.register(ActionTag::ModelObjectCreate, plot_model_object_create);
        plotter
    }

    /// Registra (o reemplaza) el renderer de una variante.
    pub fn register(&mut self, tag: ActionTag, renderer: Renderer) {
        self.renderers.insert(tag, renderer);
    }

    /// Devuelve el texto DOT de `chain`, empezando por su raíz.
    pub fn render(&mut self, chain: &Chain) -> String {
        self.out.clear();
        self.node_num = 0;
        self.cluster_num = 0;
        self.depth = 1;
        self.out.push_str("digraph {\n");
        self.dispatch(chain, chain.root(), None, None);
        self.out.push_str("}\n");
        std::mem::take(&mut self.out)
    }

    /// Escribe el grafo en `path` (se fuerza la extensión `.dot`) y devuelve
    /// la ruta final.
    pub fn plot(&mut self, chain: &Chain, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref().with_extension("dot");
        let dot = self.render(chain);
        std::fs::write(&path, dot).map_err(|e| FlowError::Other(format!("no se pudo escribir {}: {}", path.display(), e)))?;
        Ok(path)
    }

    fn dispatch(&mut self, chain: &Chain, id: NodeId, prev: Option<usize>, edge_label: Option<&str>) {
        let tag = match kind_of(chain, id) {
            Some(kind) => kind.tag(),
            None => return,
        };
        match self.renderers.get(&tag).copied() {
            Some(renderer) => renderer(self, chain, id, prev, edge_label),
            None => plot_generic(self, chain, id, prev, edge_label),
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Declara un nodo con `label`, lo une a `prev` y devuelve su número.
    pub fn add_node(&mut self, label: &str, prev: Option<usize>, edge_label: Option<&str>) -> usize {
        let current = self.node_num;
        self.node_num += 1;
        self.line(&format!("{} [label=\"{}\"];", current, escape(label)));
        if let Some(prev) = prev {
            let mut edge = format!("{} -> {} [constraint=false", prev, current);
            if let Some(label) = edge_label {
                let _ = write!(edge, ", label=\"{}\"", escape(label));
            }
            edge.push_str("];");
            self.line(&edge);
        }
        current
    }

    /// Dibuja los sucesores `for_each` y `next` del nodo `id`.
    pub fn plot_successors(&mut self, chain: &Chain, id: NodeId, current: usize) {
        if let Some(each) = chain.for_each_of(id) {
            self.dispatch(chain, each, Some(current), Some("for_each"));
        }
        if let Some(next) = chain.next_of(id) {
            self.dispatch(chain, next, Some(current), None);
        }
    }

    /// Abre un subgrafo `cluster_N` con `label`; devuelve tras cerrarlo.
    pub fn cluster<F>(&mut self, label: &str, body: F)
        where F: FnOnce(&mut ActionsPlotter)
    {
        let n = self.cluster_num;
        self.cluster_num += 1;
        self.line(&format!("subgraph cluster_{} {{", n));
        self.depth += 1;
        self.line(&format!("label=\"{}\";", escape(label)));
        self.line("color=blue;");
        self.line("node [style=filled];");
        body(self);
        self.depth -= 1;
        self.line("}");
    }
}

impl Default for ActionsPlotter {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_of(chain: &Chain, id: NodeId) -> Option<ActionKind<'_>> {
    chain.action(id).map(|a| a.kind())
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn plot_generic(p: &mut ActionsPlotter, chain: &Chain, id: NodeId, prev: Option<usize>, edge_label: Option<&str>) {
    let label = kind_of(chain, id).map(|k| k.name().to_string()).unwrap_or_default();
    let current = p.add_node(&label, prev, edge_label);
    p.plot_successors(chain, id, current);
}

fn plot_fields_transform(p: &mut ActionsPlotter,
                         chain: &Chain,
                         id: NodeId,
                         prev: Option<usize>,
                         edge_label: Option<&str>) {
    let current = p.add_node(ActionTag::FieldsTransform.as_str(), prev, edge_label);
    if let Some(ActionKind::FieldsTransform { transformations }) = kind_of(chain, id) {
        if !transformations.is_empty() {
            p.cluster(ActionTag::FieldsTransform.as_str(), |p| {
                 for (name, sub) in transformations.iter() {
                     let label = format!("'{}'", name);
                     p.dispatch(sub, sub.root(), Some(current), Some(label.as_str()));
                 }
             });
        }
    }
    p.plot_successors(chain, id, current);
}

fn plot_get_field(p: &mut ActionsPlotter, chain: &Chain, id: NodeId, prev: Option<usize>, edge_label: Option<&str>) {
    let label = match kind_of(chain, id) {
        Some(ActionKind::GetField { field }) => format!("GetField\n'{}'", field),
        other => other.map(|k| k.name().to_string()).unwrap_or_default(),
    };
    let current = p.add_node(&label, prev, edge_label);
    p.plot_successors(chain, id, current);
}

fn plot_model_object_create(p: &mut ActionsPlotter,
                            chain: &Chain,
                            id: NodeId,
                            prev: Option<usize>,
                            edge_label: Option<&str>) {
    let label = match kind_of(chain, id) {
        Some(ActionKind::ModelObjectCreate { model, fields, fields_map, .. }) => {
            let desc: Vec<String> = match fields {
                Some(fields) => fields.iter()
                                      .map(|f| match fields_map.get(f) {
                                          Some(src) => format!("{} (from '{}')", f, src),
                                          None => f.clone(),
                                      })
                                      .collect(),
                None => vec!["*".to_string()],
            };
            format!("ModelObjectCreate\n\n{}({})", model, desc.join(",\n"))
        }
        other => other.map(|k| k.name().to_string()).unwrap_or_default(),
    };
    let current = p.add_node(&label, prev, edge_label);
    p.plot_successors(chain, id, current);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::actions::{FieldsTransform, GetField, Lambda, Root};
    use crate::data::Data;
    use crate::session::Context;
    use crate::materialize::ModelObjectCreate;
    use crate::model::ModelSchema;

    fn sample() -> Chain {
        let tags = Chain::new(Lambda::map(|d| d)).for_each(ModelObjectCreate::for_schema(ModelSchema::new("Tag",
                                                                                                         ["name"]))
                                                                 .fields(["name"])
                                                                 .unique(["name"]));
        Chain::new(GetField::new("entries")).for_each(FieldsTransform::new().field("tags", tags))
                                            .then(ModelObjectCreate::for_schema(ModelSchema::new("Post",
                                                                                                 ["guid", "tags"]))
                                                  .fields(["guid", "tags"])
                                                  .fields_map([("guid", "id")]))
                                            .rewind()
    }

    #[test]
    fn renders_custom_labels_clusters_and_edges() {
        let dot = ActionsPlotter::new().render(&sample());
        assert!(dot.starts_with("digraph {\n"));
        assert!(dot.contains("0 [label=\"GetField\\n'entries'\"];"));
        assert!(dot.contains("0 -> 1 [constraint=false, label=\"for_each\"];"));
        assert!(dot.contains("subgraph cluster_0 {"));
        assert!(dot.contains("label=\"'tags'\""));
        assert!(dot.contains("Post(guid (from 'id'),\\ntags)"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn unregistered_kinds_get_generic_label_and_registry_overrides() {
        let chain = Chain::new(Root).then(Lambda::map(|d| d));
        let dot = ActionsPlotter::new().render(&chain);
        assert!(dot.contains("0 [label=\"Root\"];"));
        assert!(dot.contains("1 [label=\"Lambda\"];"));

        fn shout(p: &mut ActionsPlotter, chain: &Chain, id: NodeId, prev: Option<usize>, edge: Option<&str>) {
            let current = p.add_node("ROOT!", prev, edge);
            p.plot_successors(chain, id, current);
        }
        let mut plotter = ActionsPlotter::new();
        plotter.register(ActionTag::Root, shout);
        let dot = plotter.render(&chain);
        assert!(dot.contains("0 [label=\"ROOT!\"];"));
        assert!(dot.contains("0 -> 1 [constraint=false];"));
    }

    struct Upper;
    impl Action for Upper {
        fn run(&self, input: Data, _ctx: &Context<'_>) -> Result<Data> {
            Ok(input)
        }
        fn kind(&self) -> ActionKind<'_> {
            ActionKind::Custom { name: "Upper" }
        }
    }

    struct Lower;
    impl Action for Lower {
        fn run(&self, input: Data, _ctx: &Context<'_>) -> Result<Data> {
            Ok(input)
        }
        fn kind(&self) -> ActionKind<'_> {
            ActionKind::Custom { name: "Lower" }
        }
    }

    #[test]
    fn user_actions_have_their_own_renderer_key() {
        fn boxed(p: &mut ActionsPlotter, chain: &Chain, id: NodeId, prev: Option<usize>, edge: Option<&str>) {
            let current = p.add_node("[Upper]", prev, edge);
            p.plot_successors(chain, id, current);
        }
        let chain = Chain::new(Upper).then(Lower);
        let mut plotter = ActionsPlotter::new();
        plotter.register(ActionTag::Custom("Upper"), boxed);
        let dot = plotter.render(&chain);
        assert!(dot.contains("0 [label=\"[Upper]\"];"));
        assert!(dot.contains("1 [label=\"Lower\"];"));
        assert_ne!(ActionTag::Custom("Upper"), ActionTag::Custom("Lower"));
    }

    #[test]
    fn plot_writes_file_with_dot_extension() {
        let base = std::env::temp_dir().join(format!("flow_plot_{}", uuid::Uuid::new_v4()));
        let path = ActionsPlotter::new().plot(&sample(), base.with_extension("png")).unwrap();
        assert_eq!(path, base.with_extension("dot"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("digraph {\n"));
        assert!(written.contains("GetField\\n'entries'"));
        std::fs::remove_file(&path).unwrap();
    }
}
