
use std::collections::{BTreeMap, BTreeSet};

use crate::core::payload::{DecodedStats, NodeStats};

/// Job-level columns of the summary row derived from the payload.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct SummaryFields {
  pub total_time: Option<f64>,
  pub gpus: Option<f64>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct NodeRecord {
  pub node_name: String,
  pub cpus: Option<f64>,
  pub total_memory: Option<f64>,
  pub used_memory: Option<f64>,
  pub total_time: Option<f64>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct GpuRecord {
  pub gpu_index: String,
  pub utilization: Option<f64>,
  pub used_memory: Option<f64>,
  pub total_memory: Option<f64>,
}

/// Row-sets ready to be written to the external schema.
/// `node_gpus` only holds nodes that reported at least one GPU metric.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct MappedStats {
  pub summary: SummaryFields,
  pub nodes: Vec<NodeRecord>,
  pub node_gpus: BTreeMap<String, Vec<GpuRecord>>,
}

pub fn map_stats(decoded: Option<&DecodedStats>) -> MappedStats {
  let Some(decoded) = decoded else {
    return MappedStats::default();
  };

  let mut mapped = MappedStats {
    summary: SummaryFields {
      total_time: decoded.total_time,
      gpus: decoded.gpus,
    },
    ..Default::default()
  };

  for (node_name, node) in decoded.nodes.iter().flatten() {
    mapped.nodes.push(NodeRecord {
      node_name: node_name.clone(),
      cpus: node.cpus,
      total_memory: node.total_memory,
      used_memory: node.used_memory,
      total_time: node.total_time,
    });

    if has_gpu_data(node) {
      mapped.node_gpus.insert(node_name.clone(), map_gpus(node));
    }
  }

  mapped
}

fn has_gpu_data(node: &NodeStats) -> bool {
  node.gpu_utilization.as_ref().is_some_and(|m| !m.is_empty())
    || node.gpu_used_memory.as_ref().is_some_and(|m| !m.is_empty())
    || node.gpu_total_memory.as_ref().is_some_and(|m| !m.is_empty())
}

/// One record per GPU index seen in any of the three maps.
fn map_gpus(node: &NodeStats) -> Vec<GpuRecord> {
  let utilization = node.gpu_utilization.as_ref();
  let used = node.gpu_used_memory.as_ref();
  let total = node.gpu_total_memory.as_ref();

  let indexes: BTreeSet<&String> = utilization
    .into_iter()
    .flat_map(|m| m.keys())
    .chain(used.into_iter().flat_map(|m| m.keys()))
    .chain(total.into_iter().flat_map(|m| m.keys()))
    .collect();

  indexes
    .into_iter()
    .map(|index| GpuRecord {
      gpu_index: index.clone(),
      utilization: utilization.and_then(|m| m.get(index)).copied().flatten(),
      used_memory: used.and_then(|m| m.get(index)).copied().flatten(),
      total_memory: total.and_then(|m| m.get(index)).copied().flatten(),
    })
    .collect()
}
