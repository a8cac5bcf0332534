//! Grafo de llamadas.
//!
//! La máquina objetivo tiene 128 bytes de RAM compartidos con la pila
//! de hardware y no existen marcos de activación, por lo cual toda
//! forma de recursión se rechaza. El recorrido utiliza una pila
//! explícita y reporta todos los ciclos que encuentra.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, info};

use crate::{
    error::CompileError,
    table::TypeTable,
    types::{Intrinsic, Subroutine, SubroutineId, TypeId},
};

#[derive(Clone, Debug, Default)]
pub struct CallGraph {
    edges: BTreeMap<SubroutineId, BTreeSet<SubroutineId>>,

    /// Orden topológico, callees primero.
    order: Vec<SubroutineId>,
}

struct Frame {
    id: SubroutineId,
    callees: Vec<SubroutineId>,
    next: usize,
}

impl CallGraph {
    /// Construye el grafo a partir del punto de entrada y de toda raíz
    /// de ciclo de vida.
    pub fn build(types: &TypeTable) -> Result<CallGraph, Vec<CompileError>> {
        let roots = types
            .subroutines()
            .filter(|sub| sub.entry_point)
            .chain(types.subroutines().filter(|sub| sub.root && !sub.entry_point))
            .map(|sub| sub.id);

        let mut graph = CallGraph::default();
        let mut errors = Vec::new();
        let mut visited = HashSet::new();

        for root in roots {
            if visited.contains(&root) {
                continue;
            }

            let mut path: Vec<Frame> = vec![graph.frame(types, root)];
            while let Some(frame) = path.last_mut() {
                let Some(&callee) = frame.callees.get(frame.next) else {
                    let done = path.pop().map(|frame| frame.id);
                    if let Some(id) = done {
                        visited.insert(id);
                        graph.order.push(id);
                    }

                    continue;
                };

                frame.next += 1;

                if let Some(start) = path.iter().position(|frame| frame.id == callee) {
                    let cycle: Vec<&str> = path[start..]
                        .iter()
                        .map(|frame| &*types[frame.id].full_name)
                        .chain(std::iter::once(&*types[callee].full_name))
                        .collect();

                    errors.push(CompileError::Recursion {
                        subroutine: types[callee].full_name.to_string(),
                        path: cycle.join(" -> "),
                    });
                } else if !visited.contains(&callee) {
                    let frame = graph.frame(types, callee);
                    path.push(frame);
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        info!(
            "Call graph has {} reachable subroutines, maximum call depth {}",
            graph.order.len(),
            graph.max_depth()
        );

        Ok(graph)
    }

    /// Registra un nodo y sus aristas, junto con su marco de recorrido.
    fn frame(&mut self, types: &TypeTable, id: SubroutineId) -> Frame {
        let subroutine = &types[id];
        let callees = if walks_body(subroutine) {
            let mut seen = BTreeSet::new();
            subroutine
                .instructions
                .iter()
                .filter_map(|instruction| instruction.callee())
                .filter(|&callee| seen.insert(callee))
                .collect()
        } else {
            Vec::new()
        };

        self.edges.insert(id, callees.iter().copied().collect());
        debug!("Call graph node {} with {} callees", subroutine, callees.len());

        Frame { id, callees, next: 0 }
    }

    pub fn contains(&self, id: SubroutineId) -> bool {
        self.edges.contains_key(&id)
    }

    pub fn callees(&self, id: SubroutineId) -> impl Iterator<Item = SubroutineId> + '_ {
        self.edges.get(&id).into_iter().flatten().copied()
    }

    /// Todas las subrutinas alcanzables, callees antes que callers.
    pub fn topological_order(&self) -> &[SubroutineId] {
        &self.order
    }

    /// Orden de compilación restringido a las subrutinas de un tipo.
    pub fn compilation_order(&self, ty: TypeId) -> Vec<SubroutineId> {
        self.order.iter().copied().filter(|id| id.ty == ty).collect()
    }

    /// Profundidad máxima de llamadas anidadas, contando a la raíz.
    ///
    /// Cada nivel consume dos bytes de pila de hardware.
    pub fn max_depth(&self) -> usize {
        let mut depths: BTreeMap<SubroutineId, usize> = BTreeMap::new();
        for &id in &self.order {
            let depth = 1 + self
                .callees(id)
                .filter_map(|callee| depths.get(&callee))
                .max()
                .copied()
                .unwrap_or(0);

            depths.insert(id, depth);
        }

        depths.values().max().copied().unwrap_or(0)
    }

    /// Describe el grafo con una línea por arista.
    pub fn print(&self, types: &TypeTable) -> String {
        let mut output = String::new();
        for &id in &self.order {
            output.push_str(&types[id].full_name);
            output.push('\n');

            for callee in self.callees(id) {
                output.push_str("    -> ");
                output.push_str(&types[callee].full_name);
                output.push('\n');
            }
        }

        output
    }
}

/// Determina si las llamadas dentro del cuerpo de la subrutina cuentan.
///
/// Los intrínsecos de sitio de llamada y las implementaciones provistas
/// o ignoradas nunca ejecutan el cuerpo que trae la entrada.
fn walks_body(subroutine: &Subroutine) -> bool {
    matches!(subroutine.intrinsic, None | Some(Intrinsic::AlwaysInline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{frontend::Module, ingest::ingest};
    use serde_json::json;

    fn call(name: &str) -> serde_json::Value {
        json!({ "opcode": "call", "operand": { "method": { "type": "Game", "name": name } } })
    }

    fn types(subroutines: serde_json::Value) -> TypeTable {
        let module: Module = serde_json::from_value(json!({
            "types": [{ "name": "Game", "subroutines": subroutines }]
        }))
        .unwrap();

        ingest(&module).unwrap().types
    }

    fn id(types: &TypeTable, name: &str) -> SubroutineId {
        types.lookup("Game").unwrap().subroutine(name).unwrap().id
    }

    #[test]
    fn callees_precede_callers() {
        let types = types(json!([
            { "name": "Main", "entry": true, "instructions": [call("Draw"), call("Sound"), { "opcode": "ret" }] },
            { "name": "Draw", "instructions": [call("Sound"), { "opcode": "ret" }] },
            { "name": "Sound", "instructions": [{ "opcode": "ret" }] },
            { "name": "Unused", "instructions": [{ "opcode": "ret" }] }
        ]));

        let graph = CallGraph::build(&types).unwrap();
        let order = graph.topological_order();
        let position = |name| order.iter().position(|&sub| sub == id(&types, name)).unwrap();

        assert_eq!(order.len(), 3);
        assert!(position("Sound") < position("Draw"));
        assert!(position("Draw") < position("Main"));
        assert!(!graph.contains(id(&types, "Unused")));
        assert_eq!(graph.max_depth(), 3);

        let game = types.lookup("Game").unwrap().id;
        assert_eq!(graph.compilation_order(game), order.to_vec());
    }

    #[test]
    fn mutual_recursion_names_the_cycle() {
        let types = types(json!([
            { "name": "Main", "entry": true, "instructions": [call("A"), { "opcode": "ret" }] },
            { "name": "A", "instructions": [call("B"), { "opcode": "ret" }] },
            { "name": "B", "instructions": [call("A"), { "opcode": "ret" }] }
        ]));

        let errors = CallGraph::build(&types).unwrap_err();
        assert_eq!(errors.len(), 1);

        match &errors[0] {
            CompileError::Recursion { subroutine, path } => {
                assert_eq!(subroutine, "Game::A");
                assert_eq!(path, "Game::A -> Game::B -> Game::A");
            }

            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn self_recursion_is_rejected() {
        let types = types(json!([
            { "name": "Main", "entry": true, "instructions": [call("Main"), { "opcode": "ret" }] }
        ]));

        let errors = CallGraph::build(&types).unwrap_err();
        assert!(matches!(&errors[0], CompileError::Recursion { subroutine, .. } if subroutine == "Game::Main"));
    }

    #[test]
    fn intrinsic_bodies_are_not_walked() {
        let types = types(json!([
            { "name": "Main", "entry": true, "instructions": [call("Wait"), { "opcode": "ret" }] },
            {
                "name": "Wait",
                "intrinsic": "ignore_implementation",
                "instructions": [call("Main"), { "opcode": "ret" }]
            }
        ]));

        let graph = CallGraph::build(&types).unwrap();
        assert_eq!(graph.callees(id(&types, "Wait")).count(), 0);
        assert_eq!(graph.topological_order().len(), 2);
    }

    #[test]
    fn roots_are_reachable_without_callers() {
        let types = types(json!([
            { "name": "Main", "entry": true, "instructions": [{ "opcode": "ret" }] },
            { "name": "Kernel", "root": true, "instructions": [call("Draw"), { "opcode": "ret" }] },
            { "name": "Draw", "instructions": [{ "opcode": "ret" }] }
        ]));

        let graph = CallGraph::build(&types).unwrap();
        assert!(graph.contains(id(&types, "Draw")));
        assert_eq!(graph.topological_order()[0], id(&types, "Main"));
        assert!(graph.print(&types).contains("Game::Kernel\n    -> Game::Draw\n"));
    }
}
