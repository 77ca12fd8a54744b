// Archivo: chain.rs
// Propósito: implementar la cadena de acciones (arena de nodos con enlaces
// `next` / `for_each` y referencia a la raíz) y su semántica de ejecución.
use crate::action::Action;
use crate::data::Data;
use crate::errors::{FlowError, Result};
use crate::session::Context;
use std::fmt;

/// Índice de un nodo dentro de una `Chain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

struct Node {
    action: Box<dyn Action>,
    next: Option<NodeId>,
    for_each: Option<NodeId>,
    root: NodeId,
}

/// Cadena de acciones con raíz única.
///
/// Cada nodo tiene como mucho un sucesor `next` (se ejecuta sobre la salida
/// del nodo) y un sucesor `for_each` (se ejecuta una vez por elemento de la
/// salida; sus resultados, en orden, reemplazan la salida antes de `next`).
///
/// `then` y `for_each` enlazan al nodo cursor y mueven el cursor al nodo
/// enlazado, lo que permite encadenar de forma fluida:
///
/// ```rust
/// use flow::{Chain, Context, Data, GetField, Lambda};
/// use serde_json::json;
///
/// let chain = Chain::new(GetField::new("values"))
///     .for_each(Lambda::map(|x| Data::Int(x.as_int().unwrap_or(0) * 2)));
/// let out = chain.call(json!({"values": [1, 2, 3]}).into(), &Context::detached()).unwrap();
/// assert_eq!(out, Data::from(json!([2, 4, 6])));
/// ```
pub struct Chain {
    nodes: Vec<Node>,
    cursor: NodeId,
}

const ROOT: NodeId = NodeId(0);

impl Chain {
    /// Crea una cadena con `action` como raíz.
    pub fn new<A: Action + 'static>(action: A) -> Self {
        Self::from_boxed(Box::new(action))
    }

    pub fn from_boxed(action: Box<dyn Action>) -> Self {
        Chain { nodes: vec![Node { action,
                                   next: None,
                                   for_each: None,
                                   root: ROOT }],
                cursor: ROOT }
    }

    /// Enlaza `successor` como `next` del cursor y mueve el cursor al cursor
    /// de la cadena enlazada.
    pub fn then(mut self, successor: impl Into<Chain>) -> Self {
        let (entry, cursor) = self.absorb(successor.into());
        let at = self.cursor;
        self.nodes[at.0].next = Some(entry);
        self.cursor = cursor;
        self
    }

    /// Enlaza `successor` como `for_each` del cursor y mueve el cursor al
    /// cursor de la cadena enlazada.
    pub fn for_each(mut self, successor: impl Into<Chain>) -> Self {
        let (entry, cursor) = self.absorb(successor.into());
        let at = self.cursor;
        self.nodes[at.0].for_each = Some(entry);
        self.cursor = cursor;
        self
    }

    /// Devuelve el cursor a la raíz.
    pub fn rewind(mut self) -> Self {
        self.cursor = ROOT;
        self
    }

    /// Mueve los nodos de `other` a esta arena, reasignando índices y raíz.
    /// Devuelve (entrada, cursor) de `other` ya reubicados.
    fn absorb(&mut self, other: Chain) -> (NodeId, NodeId) {
        let offset = self.nodes.len();
        let shift = |id: NodeId| NodeId(id.0 + offset);
        for node in other.nodes {
            self.nodes.push(Node { action: node.action,
                                   next: node.next.map(shift),
                                   for_each: node.for_each.map(shift),
                                   root: ROOT });
        }
        (shift(ROOT), shift(other.cursor))
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn cursor(&self) -> NodeId {
        self.cursor
    }

    /// Raíz registrada en el nodo `id` (`None` si `id` no es de esta cadena).
    pub fn root_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).map(|n| n.root)
    }

    pub fn next_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.next)
    }

    pub fn for_each_of(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.for_each)
    }

    pub fn action(&self, id: NodeId) -> Option<&dyn Action> {
        self.nodes.get(id.0).map(|n| n.action.as_ref())
    }

    /// Número de nodos alcanzables desde la raíz.
    pub fn len(&self) -> usize {
        self.ids().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nodos alcanzables desde la raíz, en orden de inserción. Un enlace
    /// reemplazado tras `rewind` deja su subcadena en la arena, pero ya no
    /// aparece aquí.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut reachable = vec![false; self.nodes.len()];
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            if reachable[id.0] {
                continue;
            }
            reachable[id.0] = true;
            let node = &self.nodes[id.0];
            stack.extend(node.next.into_iter().chain(node.for_each));
        }
        reachable.into_iter().enumerate().filter(|(_, r)| *r).map(|(i, _)| NodeId(i))
    }

    /// Punto de entrada único: ejecuta la cadena desde la raíz.
    pub fn call(&self, input: Data, ctx: &Context<'_>) -> Result<Data> {
        self.call_from(ROOT, input, ctx)
    }

    /// Ejecuta desde el nodo `id` aplicando la semántica de la cadena:
    /// `run`, después `for_each` (si hay) y por último `next` (si hay).
    /// Un `id` de otra cadena devuelve `FlowError::Config`.
    pub fn call_from(&self, id: NodeId, input: Data, ctx: &Context<'_>) -> Result<Data> {
        let node = self.nodes
                       .get(id.0)
                       .ok_or_else(|| FlowError::Config(format!("el nodo {} no pertenece a la cadena", id.0)))?;
        log::debug!("ejecutando nodo {} ({})", id.0, node.action.kind().name());
        let mut result = node.action.run(input, ctx)?;

        if let Some(each) = node.for_each {
            let items = result.into_items()?;
            let mut collected = Vec::with_capacity(items.len());
            for item in items {
                collected.push(self.call_from(each, item, ctx)?);
            }
            result = Data::List(collected);
        }

        match node.next {
            Some(next) => self.call_from(next, result, ctx),
            None => Ok(result),
        }
    }
}

impl<A: Action + 'static> From<A> for Chain {
    fn from(action: A) -> Self {
        Chain::new(action)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for (i, node) in self.nodes.iter().enumerate() {
            list.entry(&format_args!("{}:{} next={:?} for_each={:?}",
                                     i,
                                     node.action.kind().name(),
                                     node.next.map(|n| n.0),
                                     node.for_each.map(|n| n.0)));
        }
        list.finish()
    }
}
