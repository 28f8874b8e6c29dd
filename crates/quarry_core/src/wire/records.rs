use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use protobuf::CodedInputStream;
use protobuf::CodedOutputStream;

use crate::types::Asset;
use crate::types::BundleBehavior;
use crate::types::Dependency;
use crate::types::Entry;
use crate::types::Environment;
use crate::types::EnvironmentContext;
use crate::types::FileType;
use crate::types::Location;
use crate::types::OutputFormat;
use crate::types::Priority;
use crate::types::SourceLocation;
use crate::types::SourceType;
use crate::types::SpecifierType;
use crate::types::Symbol;
use crate::types::Target;
use crate::types::TargetSourceMapOptions;

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
use super::write_optional_string;
use super::write_string;
use super::WireEnum;
use super::WireError;
use super::WireMessage;
use super::LENGTH_DELIMITED;
use super::VARINT;

wire_enum!(SpecifierType, "SpecifierType", {
  SpecifierType::CommonJS = 0,
  SpecifierType::Esm = 1,
  SpecifierType::Url = 2,
  SpecifierType::Custom = 3,
});

wire_enum!(Priority, "Priority", {
  Priority::Sync = 0,
  Priority::Parallel = 1,
  Priority::Lazy = 2,
  Priority::Conditional = 3,
});

wire_enum!(BundleBehavior, "BundleBehavior", {
  BundleBehavior::Inline = 0,
  BundleBehavior::Isolated = 1,
});

wire_enum!(EnvironmentContext, "EnvironmentContext", {
  EnvironmentContext::Browser = 0,
  EnvironmentContext::WebWorker = 1,
  EnvironmentContext::ServiceWorker = 2,
  EnvironmentContext::Worklet = 3,
  EnvironmentContext::Node = 4,
  EnvironmentContext::ElectronMain = 5,
  EnvironmentContext::ElectronRenderer = 6,
});

wire_enum!(OutputFormat, "OutputFormat", {
  OutputFormat::Global = 0,
  OutputFormat::CommonJS = 1,
  OutputFormat::EsModule = 2,
});

wire_enum!(SourceType, "SourceType", {
  SourceType::Script = 0,
  SourceType::Module = 1,
});

fn path_string(path: &std::path::Path) -> String {
  path.to_string_lossy().into_owned()
}

/// An entry of a map field
#[derive(Clone, Debug, PartialEq)]
pub struct MapEntry<V> {
  pub key: String,
  pub value: V,
}

impl<V: WireMessage> WireMessage for MapEntry<V> {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    out.write_string(1, &self.key)?;
    write_message(out, 2, &self.value)
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut key = String::new();
    let mut value = None;

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => key = input.read_string()?,
        (2, LENGTH_DELIMITED) => value = Some(read_message(input)?),
        _ => skip_field(input, wire_type)?,
      }
    }

    Ok(MapEntry {
      key,
      value: value.ok_or(WireError::MissingField("MapEntry.value"))?,
    })
  }
}

fn write_map<V: WireMessage + Clone>(
  out: &mut CodedOutputStream<'_>,
  field: u32,
  map: &IndexMap<String, V>,
) -> Result<(), WireError> {
  for (key, value) in map {
    write_message(
      out,
      field,
      &MapEntry {
        key: key.clone(),
        value: value.clone(),
      },
    )?;
  }
  Ok(())
}

fn read_map_entry<V: WireMessage>(
  input: &mut CodedInputStream<'_>,
  map: &mut IndexMap<String, V>,
) -> Result<(), WireError> {
  let entry = read_message::<MapEntry<V>>(input)?;
  map.insert(entry.key, entry.value);
  Ok(())
}

impl WireMessage for Location {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    if self.line != 0 {
      out.write_uint32(1, self.line)?;
    }
    if self.column != 0 {
      out.write_uint32(2, self.column)?;
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut location = Location::default();

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, VARINT) => location.line = input.read_uint32()?,
        (2, VARINT) => location.column = input.read_uint32()?,
        _ => skip_field(input, wire_type)?,
      }
    }

    Ok(location)
  }
}

impl WireMessage for SourceLocation {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    write_string(out, 1, &path_string(&self.file_path))?;
    write_message(out, 2, &self.start)?;
    write_message(out, 3, &self.end)
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut loc = SourceLocation::default();

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => loc.file_path = PathBuf::from(input.read_string()?),
        (2, LENGTH_DELIMITED) => loc.start = read_message(input)?,
        (3, LENGTH_DELIMITED) => loc.end = read_message(input)?,
        _ => skip_field(input, wire_type)?,
      }
    }

    Ok(loc)
  }
}

impl WireMessage for TargetSourceMapOptions {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    write_optional_string(out, 1, self.source_root.as_deref())?;
    if let Some(inline) = self.inline {
      out.write_bool(2, inline)?;
    }
    if let Some(inline_sources) = self.inline_sources {
      out.write_bool(3, inline_sources)?;
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut options = TargetSourceMapOptions::default();

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => options.source_root = Some(input.read_string()?),
        (2, VARINT) => options.inline = Some(input.read_bool()?),
        (3, VARINT) => options.inline_sources = Some(input.read_bool()?),
        _ => skip_field(input, wire_type)?,
      }
    }

    Ok(options)
  }
}

impl WireMessage for Environment {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    write_enum(out, 1, self.context)?;
    write_enum(out, 2, self.output_format)?;
    write_enum(out, 3, self.source_type)?;
    write_bool(out, 4, self.is_library)?;
    write_bool(out, 5, self.should_optimize)?;
    write_bool(out, 6, self.should_scope_hoist)?;
    if let Some(source_map) = &self.source_map {
      write_message(out, 7, source_map)?;
    }
    if let Some(loc) = &self.loc {
      write_message(out, 8, loc)?;
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut env = Environment {
      context: EnvironmentContext::Browser,
      output_format: OutputFormat::Global,
      source_type: SourceType::Script,
      ..Environment::default()
    };

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, VARINT) => env.context = read_enum(input)?,
        (2, VARINT) => env.output_format = read_enum(input)?,
        (3, VARINT) => env.source_type = read_enum(input)?,
        (4, VARINT) => env.is_library = input.read_bool()?,
        (5, VARINT) => env.should_optimize = input.read_bool()?,
        (6, VARINT) => env.should_scope_hoist = input.read_bool()?,
        (7, LENGTH_DELIMITED) => env.source_map = Some(read_message(input)?),
        (8, LENGTH_DELIMITED) => env.loc = Some(read_message(input)?),
        _ => skip_field(input, wire_type)?,
      }
    }

    Ok(env)
  }
}

impl WireMessage for Target {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    write_string(out, 1, &path_string(&self.dist_dir))?;
    write_optional_string(out, 2, self.dist_entry.as_deref().map(path_string).as_deref())?;
    write_string(out, 3, &self.name)?;
    write_string(out, 4, &self.public_url)?;
    write_message(out, 5, self.env.as_ref())?;
    if let Some(loc) = &self.loc {
      write_message(out, 6, loc)?;
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut target = Target {
      name: String::new(),
      public_url: String::new(),
      ..Target::default()
    };

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => target.dist_dir = PathBuf::from(input.read_string()?),
        (2, LENGTH_DELIMITED) => target.dist_entry = Some(PathBuf::from(input.read_string()?)),
        (3, LENGTH_DELIMITED) => target.name = input.read_string()?,
        (4, LENGTH_DELIMITED) => target.public_url = input.read_string()?,
        (5, LENGTH_DELIMITED) => target.env = Arc::new(read_message(input)?),
        (6, LENGTH_DELIMITED) => target.loc = Some(read_message(input)?),
        _ => skip_field(input, wire_type)?,
      }
    }

    Ok(target)
  }
}

impl WireMessage for Symbol {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    write_string(out, 2, &self.local)?;
    if let Some(loc) = &self.loc {
      write_message(out, 3, loc)?;
    }
    write_bool(out, 4, self.is_weak)?;
    if !self.meta.is_empty() {
      write_json(out, 5, &self.meta)?;
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut symbol = Symbol::default();

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (2, LENGTH_DELIMITED) => symbol.local = input.read_string()?,
        (3, LENGTH_DELIMITED) => symbol.loc = Some(read_message(input)?),
        (4, VARINT) => symbol.is_weak = input.read_bool()?,
        (5, LENGTH_DELIMITED) => symbol.meta = read_json(input)?,
        _ => skip_field(input, wire_type)?,
      }
    }

    Ok(symbol)
  }
}

impl WireMessage for Dependency {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    write_string(out, 1, &self.id)?;
    write_string(out, 2, &self.specifier)?;
    write_enum(out, 3, self.specifier_type)?;
    write_enum(out, 4, self.priority)?;
    if let Some(bundle_behavior) = self.bundle_behavior {
      out.write_enum(5, bundle_behavior.to_wire())?;
    }
    write_message(out, 6, self.env.as_ref())?;
    write_optional_string(out, 7, self.source_asset_id.as_deref())?;
    write_optional_string(out, 8, self.source_path.as_deref().map(path_string).as_deref())?;
    write_optional_string(out, 9, self.resolve_from.as_deref().map(path_string).as_deref())?;
    write_bool(out, 10, self.is_entry)?;
    write_bool(out, 11, self.is_optional)?;
    write_bool(out, 12, self.needs_stable_name)?;
    if let Some(loc) = &self.loc {
      write_message(out, 13, loc)?;
    }
    write_optional_string(out, 14, self.pipeline.as_deref())?;
    if let Some(symbols) = &self.symbols {
      // Distinguishes "imports nothing" from "unknown imports"
      out.write_bool(15, true)?;
      write_map(out, 16, symbols)?;
    }
    if let Some(target) = &self.target {
      write_message(out, 17, target.as_ref())?;
    }
    if !self.meta.is_empty() {
      write_json(out, 18, &self.meta)?;
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut dependency = Dependency {
      specifier_type: SpecifierType::CommonJS,
      priority: Priority::Sync,
      ..Dependency::default()
    };

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => dependency.id = input.read_string()?,
        (2, LENGTH_DELIMITED) => dependency.specifier = input.read_string()?,
        (3, VARINT) => dependency.specifier_type = read_enum(input)?,
        (4, VARINT) => dependency.priority = read_enum(input)?,
        (5, VARINT) => dependency.bundle_behavior = Some(read_enum(input)?),
        (6, LENGTH_DELIMITED) => dependency.env = Arc::new(read_message(input)?),
        (7, LENGTH_DELIMITED) => dependency.source_asset_id = Some(input.read_string()?),
        (8, LENGTH_DELIMITED) => {
          dependency.source_path = Some(PathBuf::from(input.read_string()?))
        }
        (9, LENGTH_DELIMITED) => {
          dependency.resolve_from = Some(PathBuf::from(input.read_string()?))
        }
        (10, VARINT) => dependency.is_entry = input.read_bool()?,
        (11, VARINT) => dependency.is_optional = input.read_bool()?,
        (12, VARINT) => dependency.needs_stable_name = input.read_bool()?,
        (13, LENGTH_DELIMITED) => dependency.loc = Some(read_message(input)?),
        (14, LENGTH_DELIMITED) => dependency.pipeline = Some(input.read_string()?),
        (15, VARINT) => {
          if input.read_bool()? {
            dependency.symbols.get_or_insert_with(IndexMap::new);
          }
        }
        (16, LENGTH_DELIMITED) => {
          read_map_entry(input, dependency.symbols.get_or_insert_with(IndexMap::new))?
        }
        (17, LENGTH_DELIMITED) => dependency.target = Some(Box::new(read_message(input)?)),
        (18, LENGTH_DELIMITED) => dependency.meta = read_json(input)?,
        _ => skip_field(input, wire_type)?,
      }
    }

    Ok(dependency)
  }
}

impl WireMessage for Asset {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    write_string(out, 1, &self.id)?;
    if let Some(bundle_behavior) = self.bundle_behavior {
      out.write_enum(2, bundle_behavior.to_wire())?;
    }
    write_message(out, 3, self.env.as_ref())?;
    write_string(out, 4, &path_string(&self.file_path))?;
    write_string(out, 5, self.file_type.extension())?;
    write_map(out, 6, &self.dependencies)?;
    if let Some(symbols) = &self.symbols {
      out.write_bool(7, true)?;
      write_map(out, 8, symbols)?;
    }
    write_string(out, 9, &self.content_key)?;
    write_optional_string(out, 10, self.map_key.as_deref())?;
    write_optional_string(out, 11, self.ast_key.as_deref())?;
    write_optional_string(out, 12, self.output_hash.as_deref())?;
    write_optional_string(out, 13, self.unique_key.as_deref())?;
    write_optional_string(out, 14, self.pipeline.as_deref())?;
    write_optional_string(out, 15, self.query.as_deref())?;
    write_bool(out, 16, self.side_effects)?;
    write_bool(out, 17, self.is_bundle_splittable)?;
    write_bool(out, 18, self.is_source)?;
    if !self.meta.is_empty() {
      write_json(out, 19, &self.meta)?;
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut asset = Asset::default();

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => asset.id = input.read_string()?,
        (2, VARINT) => asset.bundle_behavior = Some(read_enum(input)?),
        (3, LENGTH_DELIMITED) => asset.env = Arc::new(read_message(input)?),
        (4, LENGTH_DELIMITED) => asset.file_path = PathBuf::from(input.read_string()?),
        (5, LENGTH_DELIMITED) => asset.file_type = FileType::from_extension(&input.read_string()?),
        (6, LENGTH_DELIMITED) => read_map_entry(input, &mut asset.dependencies)?,
        (7, VARINT) => {
          if input.read_bool()? {
            asset.symbols.get_or_insert_with(IndexMap::new);
          }
        }
        (8, LENGTH_DELIMITED) => {
          read_map_entry(input, asset.symbols.get_or_insert_with(IndexMap::new))?
        }
        (9, LENGTH_DELIMITED) => asset.content_key = input.read_string()?,
        (10, LENGTH_DELIMITED) => asset.map_key = Some(input.read_string()?),
        (11, LENGTH_DELIMITED) => asset.ast_key = Some(input.read_string()?),
        (12, LENGTH_DELIMITED) => asset.output_hash = Some(input.read_string()?),
        (13, LENGTH_DELIMITED) => asset.unique_key = Some(input.read_string()?),
        (14, LENGTH_DELIMITED) => asset.pipeline = Some(input.read_string()?),
        (15, LENGTH_DELIMITED) => asset.query = Some(input.read_string()?),
        (16, VARINT) => asset.side_effects = input.read_bool()?,
        (17, VARINT) => asset.is_bundle_splittable = input.read_bool()?,
        (18, VARINT) => asset.is_source = input.read_bool()?,
        (19, LENGTH_DELIMITED) => asset.meta = read_json(input)?,
        _ => skip_field(input, wire_type)?,
      }
    }

    Ok(asset)
  }
}

impl WireMessage for Entry {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError> {
    write_string(out, 1, &path_string(&self.file_path))?;
    write_string(out, 2, &path_string(&self.package_path))?;
    write_optional_string(out, 3, self.target.as_deref())?;
    if let Some(loc) = &self.loc {
      write_message(out, 4, loc)?;
    }
    Ok(())
  }

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError> {
    let mut entry = Entry::default();

    while let Some((field, wire_type)) = next_field(input)? {
      match (field, wire_type) {
        (1, LENGTH_DELIMITED) => entry.file_path = PathBuf::from(input.read_string()?),
        (2, LENGTH_DELIMITED) => entry.package_path = PathBuf::from(input.read_string()?),
        (3, LENGTH_DELIMITED) => entry.target = Some(input.read_string()?),
        (4, LENGTH_DELIMITED) => entry.loc = Some(read_message(input)?),
        _ => skip_field(input, wire_type)?,
      }
    }

    Ok(entry)
  }
}
