//! Correlation Graph Construction
//! Mission: Link a finding's events to the entities they touch

use super::models::{CorrelationGraph, GraphEdge, GraphNode, NormalisedEvent};

/// Build the entity graph for a set of supporting events.
///
/// The first event is the trigger; earlier sequence events are chained to it
/// with `preceded_by` edges so the causal order survives in the finding.
pub fn build_correlation_graph(events: &[NormalisedEvent]) -> CorrelationGraph {
    let mut graph = CorrelationGraph {
        nodes: Vec::new(),
        edges: Vec::new(),
    };
    let Some(trigger) = events.first() else {
        return graph;
    };

    push_node(&mut graph, &node_id("asset", &trigger.asset_id), "asset", &trigger.asset_id);
    push_node(
        &mut graph,
        &node_id("identity", &trigger.identity_id),
        "identity",
        &trigger.identity_id,
    );

    for event in events {
        let event_node = node_id("event", &event.event_id);
        push_node(&mut graph, &event_node, "event", &event.event_type);
        graph.edges.push(GraphEdge {
            source: event_node.clone(),
            target: node_id("asset", &trigger.asset_id),
            relation: "observed_on".to_string(),
        });
        graph.edges.push(GraphEdge {
            source: event_node.clone(),
            target: node_id("identity", &trigger.identity_id),
            relation: "attributed_to".to_string(),
        });

        if let Some(process) = &event.process_lineage {
            let process_node = node_id("process", &process.process_name);
            push_node(&mut graph, &process_node, "process", &process.process_name);
            graph.edges.push(GraphEdge {
                source: event_node.clone(),
                target: process_node,
                relation: "spawned".to_string(),
            });
        }
        if let Some(flow) = &event.network_flow {
            let destination_node = node_id("destination", &flow.destination);
            push_node(&mut graph, &destination_node, "destination", &flow.destination);
            graph.edges.push(GraphEdge {
                source: event_node.clone(),
                target: destination_node,
                relation: "connected_to".to_string(),
            });
        }
    }

    // Chain sequence events oldest → trigger.
    for pair in events.windows(2) {
        graph.edges.push(GraphEdge {
            source: node_id("event", &pair[0].event_id),
            target: node_id("event", &pair[1].event_id),
            relation: "preceded_by".to_string(),
        });
    }

    graph
}

fn node_id(kind: &str, value: &str) -> String {
    format!("{kind}:{value}")
}

fn push_node(graph: &mut CorrelationGraph, id: &str, node_type: &str, label: &str) {
    if graph.nodes.iter().any(|node| node.node_id == id) {
        return;
    }
    graph.nodes.push(GraphNode {
        node_id: id.to_string(),
        node_type: node_type.to_string(),
        label: label.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::models::{NetworkFlow, ProcessLineage};
    use chrono::Utc;
    use std::collections::HashMap;

    fn make_event(event_id: &str, event_type: &str) -> NormalisedEvent {
        NormalisedEvent {
            event_id: event_id.to_string(),
            tenant_id: "tenant-aabbccdd".to_string(),
            asset_id: "asset-01234567".to_string(),
            identity_id: "user-00000001".to_string(),
            event_type: event_type.to_string(),
            occurred_at: Utc::now(),
            received_at: Utc::now(),
            attributes: HashMap::new(),
            network_flow: None,
            process_lineage: None,
        }
    }

    #[test]
    fn test_graph_links_event_to_asset_and_identity() {
        let graph = build_correlation_graph(&[make_event("evt-1", "process.spawn")]);
        assert_eq!(graph.nodes.len(), 3);
        assert!(graph
            .edges
            .iter()
            .any(|edge| edge.relation == "observed_on"));
        assert!(graph
            .edges
            .iter()
            .any(|edge| edge.relation == "attributed_to"));
    }

    #[test]
    fn test_sequence_events_chained_in_order() {
        let graph = build_correlation_graph(&[
            make_event("evt-1", "process.spawn"),
            make_event("evt-2", "network.egress"),
        ]);
        let chain: Vec<&GraphEdge> = graph
            .edges
            .iter()
            .filter(|edge| edge.relation == "preceded_by")
            .collect();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].source, "event:evt-1");
        assert_eq!(chain[0].target, "event:evt-2");
    }

    #[test]
    fn test_process_and_destination_nodes() {
        let mut event = make_event("evt-1", "network.egress");
        event.process_lineage = Some(ProcessLineage {
            process_name: "curl".to_string(),
            parent_process: Some("bash".to_string()),
            command_line: None,
        });
        event.network_flow = Some(NetworkFlow {
            destination: "203.0.113.7".to_string(),
            port: Some(443),
            protocol: Some("tcp".to_string()),
        });
        let graph = build_correlation_graph(&[event]);
        assert!(graph.nodes.iter().any(|node| node.node_type == "process"));
        assert!(graph
            .nodes
            .iter()
            .any(|node| node.node_type == "destination"));
    }

    #[test]
    fn test_empty_events_yield_empty_graph() {
        let graph = build_correlation_graph(&[]);
        assert!(graph.nodes.is_empty());
        assert!(graph.edges.is_empty());
    }
}
