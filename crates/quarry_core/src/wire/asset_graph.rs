use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use protobuf::CodedInputStream;
use protobuf::CodedOutputStream;

use crate::asset_graph::AssetGraph;
use crate::asset_graph::AssetGraphEdgeType;
use crate::asset_graph::AssetGraphNode;
use crate::asset_graph::AssetNode;
use crate::asset_graph::DependencyNode;
use crate::asset_graph::ResolvedSymbol;

use super::next_field;
use super::read_enum;
use super::read_json;
use super::read_message;
use super::skip_field;
use super::wire_enum;
use super::write_bool;
use super::write_enum;
use super::write_json;
use super::write_message;
use super::WireError;
use super::WireMessage;
use super::LENGTH_DELIMITED;
use super::VARINT;

wire_enum!(AssetGraphEdgeType, "AssetGraphEdgeType", {
  AssetGraphEdgeType::Entry = 0,
  AssetGraphEdgeType::Dependency = 1,
  AssetGraphEdgeType::Resolution = 2,
});

/// An edge between two nodes addressed by their position in the node list
struct Edge {
  from: u32,
  to: u32,
  edge_type: AssetGraphEdgeType,
}

impl WireMessage for Edge {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    // Node 0 is a valid endpoint, so positions are always written
    out.write_uint32(1, self.from)?;
    out.write_uint32(2, self.to)?;
    write_enum(out, 3, self.edge_type)
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut from = None;
    let mut to = None;
    let mut edge_type = AssetGraphEdgeType::Entry;

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, VARINT) => from = Some(input.read_uint32()?),
        (2, VARINT) => to = Some(input.read_uint32()?),
        (3, VARINT) => edge_type = read_enum(input)?,
        _ => skip_field(input, wire_type)?,
      }
    }

    Ok(Edge {
      from: from.ok_or(WireError::MissingField("Edge.from"))?,
      to: to.ok_or(WireError::MissingField("Edge.to"))?,
      edge_type,
    })
  }
}

struct UsedSymbol {
  symbol: String,
  resolved: Option<ResolvedSymbol>,
}

impl WireMessage for UsedSymbol {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    out.write_string(1, &self.symbol)?;
    if let Some(resolved) = &self.resolved {
      out.write_string(2, &resolved.asset)?;
      out.write_string(3, &resolved.symbol)?;
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut symbol = String::new();
    let mut asset = None;
    let mut resolved_symbol = None;

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => symbol = input.read_string()?,
        (2, LENGTH_DELIMITED) => asset = Some(input.read_string()?),
        (3, LENGTH_DELIMITED) => resolved_symbol = Some(input.read_string()?),
        _ => skip_field(input, wire_type)?,
      }
    }

    let resolved = match (asset, resolved_symbol) {
      (Some(asset), Some(symbol)) => Some(ResolvedSymbol { asset, symbol }),
      _ => None,
    };

    Ok(UsedSymbol { symbol, resolved })
  }
}

impl WireMessage for DependencyNode {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    write_message(out, 1, self.dependency.as_ref())?;
    write_bool(out, 2, self.complete)?;
    if let Some(request) = self.corresponding_request {
      out.write_uint64(3, request)?;
    }
    write_bool(out, 4, self.deferred)?;
    write_bool(out, 5, self.excluded)?;
    write_bool(out, 6, self.has_deferred)?;
    for symbol in &self.used_symbols_down {
      out.write_string(7, symbol)?;
    }
    for (symbol, resolved) in &self.used_symbols_up {
      write_message(
        out,
        8,
        &UsedSymbol {
          symbol: symbol.clone(),
          resolved: resolved.clone(),
        },
      )?;
    }
    write_bool(out, 9, self.used_symbols_down_dirty)?;
    write_bool(out, 10, self.used_symbols_up_dirty_down)?;
    write_bool(out, 11, self.used_symbols_up_dirty_up)?;
    for diagnostic in &self.diagnostics {
      write_json(out, 12, diagnostic)?;
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut dependency = None;
    let mut complete = false;
    let mut corresponding_request = None;
    let mut deferred = false;
    let mut excluded = false;
    let mut has_deferred = false;
    let mut used_symbols_down = BTreeSet::new();
    let mut used_symbols_up = BTreeMap::new();
    let mut used_symbols_down_dirty = false;
    let mut used_symbols_up_dirty_down = false;
    let mut used_symbols_up_dirty_up = false;
    let mut diagnostics = Vec::new();

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => dependency = Some(read_message(input)?),
        (2, VARINT) => complete = input.read_bool()?,
        (3, VARINT) => corresponding_request = Some(input.read_uint64()?),
        (4, VARINT) => deferred = input.read_bool()?,
        (5, VARINT) => excluded = input.read_bool()?,
        (6, VARINT) => has_deferred = input.read_bool()?,
        (7, LENGTH_DELIMITED) => {
          used_symbols_down.insert(input.read_string()?);
        }
        (8, LENGTH_DELIMITED) => {
          let used = read_message::<UsedSymbol>(input)?;
          used_symbols_up.insert(used.symbol, used.resolved);
        }
        (9, VARINT) => used_symbols_down_dirty = input.read_bool()?,
        (10, VARINT) => used_symbols_up_dirty_down = input.read_bool()?,
        (11, VARINT) => used_symbols_up_dirty_up = input.read_bool()?,
        (12, LENGTH_DELIMITED) => diagnostics.push(read_json(input)?),
        _ => skip_field(input, wire_type)?,
      }
    }

    let dependency = dependency.ok_or(WireError::MissingField("DependencyNode.dependency"))?;

    Ok(DependencyNode {
      dependency: Arc::new(dependency),
      complete,
      corresponding_request,
      deferred,
      excluded,
      has_deferred,
      used_symbols_down,
      used_symbols_up,
      used_symbols_down_dirty,
      used_symbols_up_dirty_down,
      used_symbols_up_dirty_up,
      diagnostics,
    })
  }
}

impl WireMessage for AssetNode {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    write_message(out, 1, self.asset.as_ref())?;
    if let Some(request) = self.corresponding_request {
      out.write_uint64(2, request)?;
    }
    for symbol in &self.used_symbols {
      out.write_string(3, symbol)?;
    }
    write_bool(out, 4, self.has_deferred)?;
    write_bool(out, 5, self.used_symbols_down_dirty)?;
    write_bool(out, 6, self.used_symbols_up_dirty)?;
    for diagnostic in &self.diagnostics {
      write_json(out, 7, diagnostic)?;
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut asset = None;
    let mut corresponding_request = None;
    let mut used_symbols = BTreeSet::new();
    let mut has_deferred = false;
    let mut used_symbols_down_dirty = false;
    let mut used_symbols_up_dirty = false;
    let mut diagnostics = Vec::new();

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => asset = Some(read_message(input)?),
        (2, VARINT) => corresponding_request = Some(input.read_uint64()?),
        (3, LENGTH_DELIMITED) => {
          used_symbols.insert(input.read_string()?);
        }
        (4, VARINT) => has_deferred = input.read_bool()?,
        (5, VARINT) => used_symbols_down_dirty = input.read_bool()?,
        (6, VARINT) => used_symbols_up_dirty = input.read_bool()?,
        (7, LENGTH_DELIMITED) => diagnostics.push(read_json(input)?),
        _ => skip_field(input, wire_type)?,
      }
    }

    let asset = asset.ok_or(WireError::MissingField("AssetNode.asset"))?;

    Ok(AssetNode {
      asset: Arc::new(asset),
      corresponding_request,
      used_symbols,
      has_deferred,
      used_symbols_down_dirty,
      used_symbols_up_dirty,
      diagnostics,
    })
  }
}

impl WireMessage for AssetGraphNode {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    match self {
      AssetGraphNode::Root => out.write_bytes(1, &[])?,
      AssetGraphNode::EntrySpecifier(specifier) => out.write_string(2, specifier)?,
      AssetGraphNode::EntryFile(entry) => write_message(out, 3, entry)?,
      AssetGraphNode::Dependency(node) => write_message(out, 4, node)?,
      AssetGraphNode::Asset(node) => write_message(out, 5, node)?,
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut node = None;

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => {
          input.read_bytes()?;
          node = Some(AssetGraphNode::Root);
        }
        (2, LENGTH_DELIMITED) => node = Some(AssetGraphNode::EntrySpecifier(input.read_string()?)),
        (3, LENGTH_DELIMITED) => node = Some(AssetGraphNode::EntryFile(read_message(input)?)),
        (4, LENGTH_DELIMITED) => node = Some(AssetGraphNode::Dependency(read_message(input)?)),
        (5, LENGTH_DELIMITED) => node = Some(AssetGraphNode::Asset(read_message(input)?)),
        _ => skip_field(input, wire_type)?,
      }
    }

    node.ok_or(WireError::MissingField("AssetGraphNode.node"))
  }
}

impl WireMessage for AssetGraph {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    let mut positions = HashMap::new();
    for (position, (id, node)) in self.nodes().enumerate() {
      positions.insert(id, position as u32);
      write_message(out, 1, node)?;
    }

    for (from, to, edge_type) in self.edges() {
      let (Some(from), Some(to)) = (positions.get(&from), positions.get(&to)) else {
        return Err(WireError::InvalidGraph(String::from("edge to a removed node")));
      };

      write_message(
        out,
        2,
        &Edge {
          from: *from,
          to: *to,
          edge_type,
        },
      )?;
    }

    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => nodes.push(read_message::<AssetGraphNode>(input)?),
        (2, LENGTH_DELIMITED) => {
          let edge = read_message::<Edge>(input)?;
          edges.push((edge.from as usize, edge.to as usize, edge.edge_type));
        }
        _ => skip_field(input, wire_type)?,
      }
    }

    AssetGraph::from_parts(nodes, edges).ok_or_else(|| {
      WireError::InvalidGraph(String::from("missing root node or dangling edge"))
    })
  }
}
