use std::collections::{HashMap, HashSet};
use tabbycat::{GraphBuilder, GraphType, Identity, Edge, StmtList, AttrList, AttrType};
use tabbycat::attributes::{shape, label, Shape, RankDir, rankdir};
use crate::{EngineError, Operation, Value};

fn trace(root: &Value) -> (HashMap<usize, Value>, HashSet<(usize, usize)>) {
    let mut nodes = HashMap::new();
    let mut edges = HashSet::new();

    for node in root.topological_order() {
        for child in node.previous() {
            edges.insert((child.id(), node.id()));
        }
        nodes.insert(node.id(), node);
    }

    (nodes, edges)
}

fn identity(id: String) -> Result<Identity, EngineError> {
    Identity::id(id).map_err(|e| EngineError::Graph(e.to_string()))
}

fn operation_identity(node_id: usize, operation: Operation) -> Result<Identity, EngineError> {
    identity(format!("node_{}_{}", node_id, operation.name()))
}

fn node_statements(node_id: usize, node: &Value) -> Result<StmtList, EngineError> {
    let node_identity = identity(format!("node_{}", node_id))?;

    let statements = StmtList::new()
        .add_node(
            node_identity.clone(),
            None,
            Some(
                AttrList::new()
                    .add_pair(
                        label(
                            &format!(
                                "{} | data: {:.4} | grad: {:.4}",
                                node.name().unwrap_or_default(),
                                node.data(),
                                node.grad()
                            )
                        )
                    )
            )
        );

    if node.operation() == Operation::Input {
        return Ok(statements);
    }

    let node_operation_identity = operation_identity(node_id, node.operation())?;

    Ok(statements
        .add_node(
            node_operation_identity.clone(),
            None,
            Some(
                AttrList::new()
                    .add_pair(label(&node.operation().to_string()))
                    .add_pair(shape(Shape::Circle))
            )
        ).add_edge(
            Edge::head_node(node_operation_identity, None)
                .arrow_to_node(node_identity, None)
        ))
}

/// Renders the graph reachable from `root` as a DOT digraph, one record per
/// value and one circle per operation.
pub fn create_graph(root: &Value) -> Result<tabbycat::Graph, EngineError> {
    let (nodes, edges) = trace(root);

    // Sorted so the output is stable from run to run.
    let mut node_ids = nodes.keys().copied().collect::<Vec<_>>();
    node_ids.sort_unstable();
    let mut edge_ids = edges.into_iter().collect::<Vec<_>>();
    edge_ids.sort_unstable();

    let mut node_stmts = StmtList::new();
    for node_id in node_ids {
        if let Some(node) = nodes.get(&node_id) {
            node_stmts = node_stmts.extend(node_statements(node_id, node)?);
        }
    }

    let mut edge_stmts = StmtList::new();
    for (child_id, parent_id) in edge_ids {
        let Some(parent) = nodes.get(&parent_id) else {
            continue;
        };

        edge_stmts = edge_stmts.add_edge(
            Edge::head_node(identity(format!("node_{}", child_id))?, None)
                .arrow_to_node(operation_identity(parent_id, parent.operation())?, None)
        );
    }

    GraphBuilder::default()
        .strict(true)
        .graph_type(GraphType::DiGraph)
        .id(identity("G".to_string())?)
        .stmts(
            StmtList::new()
                .add_attr(
                    AttrType::Graph,
                    AttrList::new()
                        .add_pair(rankdir(RankDir::LR))
                )
                .add_attr(
                    AttrType::Node,
                    AttrList::new()
                        .add_pair(
                            // Tabbycat doesn't seem to support: `shape(Shape::Mrecord)`
                            (identity("shape".to_string())?, identity("Mrecord".to_string())?)
                        )
                )
                .extend(node_stmts)
                .extend(edge_stmts)
        )
        .build()
        .map_err(|e| EngineError::Graph(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_collects_every_node_and_edge() {
        let a = Value::from(2.0);
        let b = Value::from(3.0);
        let c = &a * &b;
        let d = &c + &a;

        let (nodes, edges) = trace(&d);

        assert_eq!(nodes.len(), 4);
        assert_eq!(edges.len(), 4);
        assert!(edges.contains(&(a.id(), c.id())));
        assert!(edges.contains(&(a.id(), d.id())));
    }

    #[test]
    fn test_create_graph_renders_dot() {
        let a = Value::from(2.0).with_name("a");
        let b = Value::from(-3.0).with_name("b");
        let c = (&a * &b).relu();
        c.backward();

        let dot = create_graph(&c).unwrap().to_string();

        assert!(dot.contains("digraph"));
        assert!(dot.contains(&format!("node_{}", a.id())));
        assert!(dot.contains(&format!("node_{}_relu", c.id())));
        assert!(dot.contains("ReLU"));
    }
}
