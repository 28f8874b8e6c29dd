//! Field-numbered binary encoding of graph records
//!
//! Records use the protobuf wire format so the persisted graph can be read across versions.
//! Optional fields are only written when present, scalars at their default are skipped and
//! unknown fields are ignored on read. Enum values are stable and must never be renumbered.

use protobuf::CodedInputStream;
use protobuf::CodedOutputStream;
use thiserror::Error;

mod asset_graph;
mod records;

pub use self::records::MapEntry;

#[derive(Debug, Error)]
pub enum WireError {
  #[error(transparent)]
  Protobuf(#[from] protobuf::Error),
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error("Unknown value {value} for {name}")]
  UnknownEnumValue { name: &'static str, value: i32 },
  #[error("Missing required field {0}")]
  MissingField(&'static str),
  #[error("Unexpected wire type {0}")]
  UnexpectedWireType(u32),
  #[error("Invalid asset graph: {0}")]
  InvalidGraph(String),
}

const VARINT: u32 = 0;
const FIXED64: u32 = 1;
const LENGTH_DELIMITED: u32 = 2;
const FIXED32: u32 = 5;

/// A record with a binary wire encoding
pub trait WireMessage: Sized {
  fn write_to(&self, out: &mut CodedOutputStream<'_>) -> Result<(), WireError>;

  fn read_from(input: &mut CodedInputStream<'_>) -> Result<Self, WireError>;
}

pub fn encode<T: WireMessage>(message: &T) -> Result<Vec<u8>, WireError> {
  let mut bytes = Vec::new();
  {
    let mut out = CodedOutputStream::vec(&mut bytes);
    message.write_to(&mut out)?;
    out.flush()?;
  }
  Ok(bytes)
}

pub fn decode<T: WireMessage>(bytes: &[u8]) -> Result<T, WireError> {
  let mut input = CodedInputStream::from_bytes(bytes);
  T::read_from(&mut input)
}

/// Enums with fixed wire values
pub(crate) trait WireEnum: Sized + Copy {
  const NAME: &'static str;

  fn to_wire(self) -> i32;

  fn from_wire(value: i32) -> Option<Self>;
}

macro_rules! wire_enum {
  ($name:ty, $label:literal, { $($variant:path = $value:literal),+ $(,)? }) => {
    impl $crate::wire::WireEnum for $name {
      const NAME: &'static str = $label;

      fn to_wire(self) -> i32 {
        match self {
          $($variant => $value),+
        }
      }

      fn from_wire(value: i32) -> Option<Self> {
        match value {
          $($value => Some($variant),)+
          _ => None,
        }
      }
    }
  };
}

pub(crate) use wire_enum;

/// The field number and wire type of the next field, `None` at the end of the message
fn next_field(input: &mut CodedInputStream<'_>) -> Result<Option<(u32, u32)>, WireError> {
  Ok(input.read_raw_tag_or_eof()?.map(|tag| (tag >> 3, tag & 7)))
}

fn skip_field(input: &mut CodedInputStream<'_>, wire_type: u32) -> Result<(), WireError> {
  match wire_type {
    VARINT => {
      input.read_raw_varint64()?;
    }
    FIXED64 => {
      input.read_fixed64()?;
    }
    LENGTH_DELIMITED => {
      input.read_bytes()?;
    }
    FIXED32 => {
      input.read_fixed32()?;
    }
    other => return Err(WireError::UnexpectedWireType(other)),
  }
  Ok(())
}

fn write_message<T: WireMessage>(
  out: &mut CodedOutputStream<'_>,
  field: u32,
  message: &T,
) -> Result<(), WireError> {
  let bytes = encode(message)?;
  out.write_bytes(field, &bytes)?;
  Ok(())
}

fn read_message<T: WireMessage>(input: &mut CodedInputStream<'_>) -> Result<T, WireError> {
  let bytes = input.read_bytes()?;
  decode(&bytes)
}

fn write_string(out: &mut CodedOutputStream<'_>, field: u32, value: &str) -> Result<(), WireError> {
  if !value.is_empty() {
    out.write_string(field, value)?;
  }
  Ok(())
}

fn write_optional_string(
  out: &mut CodedOutputStream<'_>,
  field: u32,
  value: Option<&str>,
) -> Result<(), WireError> {
  if let Some(value) = value {
    out.write_string(field, value)?;
  }
  Ok(())
}

fn write_bool(out: &mut CodedOutputStream<'_>, field: u32, value: bool) -> Result<(), WireError> {
  if value {
    out.write_bool(field, value)?;
  }
  Ok(())
}

fn write_enum<T: WireEnum>(
  out: &mut CodedOutputStream<'_>,
  field: u32,
  value: T,
) -> Result<(), WireError> {
  let value = value.to_wire();
  if value != 0 {
    out.write_enum(field, value)?;
  }
  Ok(())
}

fn read_enum<T: WireEnum>(input: &mut CodedInputStream<'_>) -> Result<T, WireError> {
  let value = input.read_int32()?;
  T::from_wire(value).ok_or(WireError::UnknownEnumValue {
    name: T::NAME,
    value,
  })
}

/// Schemaless payloads such as plugin metadata travel as JSON
fn write_json<T: serde::Serialize>(
  out: &mut CodedOutputStream<'_>,
  field: u32,
  value: &T,
) -> Result<(), WireError> {
  let bytes = serde_json::to_vec(value)?;
  out.write_bytes(field, &bytes)?;
  Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(
  input: &mut CodedInputStream<'_>,
) -> Result<T, WireError> {
  let bytes = input.read_bytes()?;
  Ok(serde_json::from_slice(&bytes)?)
}
