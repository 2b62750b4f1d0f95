//! Archiver / Unarchiver: named-field, typed, forward-compatible model archives.
//!
//! Every value is self-describing (`{"type": ..., "value": ...}`), objects keep
//! their fields sorted, and floats round-trip bit-identically. Unknown fields
//! are ignored on read; reading a field as a different type than it was written
//! fails with `ArchiveTypeMismatch`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ForgeResult, GraphForgeError};
use crate::invalid_argument;

use super::layout::PortMemoryLayout;
use super::model::Model;
use super::node::{Node, NodeId};
use super::port_elements::PortElements;
use super::port_type::{PortData, PortType};
use super::registry::NodeRegistry;
use super::shape::TensorShape;

/// Reserved per-node fields; kinds must not write names starting with `_`
const TYPE_FIELD: &str = "_type";
const KIND_FIELD: &str = "_kind";
const ID_FIELD: &str = "_id";
const INPUTS_FIELD: &str = "_inputs";
const OUTPUTS_FIELD: &str = "_outputs";

/// `f64` that survives a text round trip bit-for-bit.
///
/// Finite values are written as JSON numbers; NaN and infinities are written
/// as their IEEE-754 bit pattern in hex.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveFloat(pub f64);

impl PartialEq for ArchiveFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Serialize for ArchiveFloat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_finite() {
            serializer.serialize_f64(self.0)
        } else {
            serializer.serialize_str(&format!("0x{:016x}", self.0.to_bits()))
        }
    }
}

impl<'de> Deserialize<'de> for ArchiveFloat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FloatVisitor;

        impl<'de> Visitor<'de> for FloatVisitor {
            type Value = ArchiveFloat;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or a hex bit pattern")
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(ArchiveFloat(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(ArchiveFloat(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(ArchiveFloat(v as f64))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                let hex = v
                    .strip_prefix("0x")
                    .ok_or_else(|| E::custom(format!("bad float bit pattern '{}'", v)))?;
                u64::from_str_radix(hex, 16)
                    .map(|bits| ArchiveFloat(f64::from_bits(bits)))
                    .map_err(E::custom)
            }
        }

        deserializer.deserialize_any(FloatVisitor)
    }
}

/// A typed archive value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArchiveValue {
    Bool(bool),
    Int(i64),
    Float(ArchiveFloat),
    String(String),
    IntList(Vec<i64>),
    FloatList(Vec<ArchiveFloat>),
    StringList(Vec<String>),
    Object(ArchiveObject),
    ObjectList(Vec<ArchiveObject>),
}

impl ArchiveValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ArchiveValue::Bool(_) => "bool",
            ArchiveValue::Int(_) => "int",
            ArchiveValue::Float(_) => "float",
            ArchiveValue::String(_) => "string",
            ArchiveValue::IntList(_) => "int_list",
            ArchiveValue::FloatList(_) => "float_list",
            ArchiveValue::StringList(_) => "string_list",
            ArchiveValue::Object(_) => "object",
            ArchiveValue::ObjectList(_) => "object_list",
        }
    }
}

/// Named fields of one archived entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveObject {
    fields: BTreeMap<String, ArchiveValue>,
}

macro_rules! typed_field {
    ($get:ident, $get_or:ident, $get_opt:ident, $ty:ty, $expected:literal) => {
        pub fn $get(&self, name: &str) -> ForgeResult<$ty> {
            self.$get_opt(name)?
                .ok_or_else(|| missing_field(name, $expected))
        }

        pub fn $get_or(&self, name: &str, default: $ty) -> ForgeResult<$ty> {
            Ok(self.$get_opt(name)?.unwrap_or(default))
        }
    };
}

impl ArchiveObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveValue> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: ArchiveValue) -> &mut Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.set(name, ArchiveValue::Bool(value))
    }

    pub fn set_int(&mut self, name: &str, value: i64) -> &mut Self {
        self.set(name, ArchiveValue::Int(value))
    }

    pub fn set_usize(&mut self, name: &str, value: usize) -> &mut Self {
        self.set(name, ArchiveValue::Int(value as i64))
    }

    pub fn set_float(&mut self, name: &str, value: f64) -> &mut Self {
        self.set(name, ArchiveValue::Float(ArchiveFloat(value)))
    }

    pub fn set_string(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.set(name, ArchiveValue::String(value.into()))
    }

    pub fn set_int_list(&mut self, name: &str, values: Vec<i64>) -> &mut Self {
        self.set(name, ArchiveValue::IntList(values))
    }

    pub fn set_usize_list(&mut self, name: &str, values: &[usize]) -> &mut Self {
        self.set_int_list(name, values.iter().map(|&v| v as i64).collect())
    }

    pub fn set_float_list(&mut self, name: &str, values: &[f64]) -> &mut Self {
        self.set(
            name,
            ArchiveValue::FloatList(values.iter().map(|&v| ArchiveFloat(v)).collect()),
        )
    }

    pub fn set_string_list(&mut self, name: &str, values: Vec<String>) -> &mut Self {
        self.set(name, ArchiveValue::StringList(values))
    }

    pub fn set_object(&mut self, name: &str, value: ArchiveObject) -> &mut Self {
        self.set(name, ArchiveValue::Object(value))
    }

    pub fn set_object_list(&mut self, name: &str, values: Vec<ArchiveObject>) -> &mut Self {
        self.set(name, ArchiveValue::ObjectList(values))
    }

    pub fn set_port_type(&mut self, name: &str, value: PortType) -> &mut Self {
        self.set_string(name, value.name())
    }

    pub fn set_shape(&mut self, name: &str, shape: &TensorShape) -> &mut Self {
        self.set_usize_list(name, &shape.to_vec())
    }

    pub fn set_layout(&mut self, name: &str, layout: &PortMemoryLayout) -> &mut Self {
        let mut object = ArchiveObject::new();
        object
            .set_usize_list("size", layout.size())
            .set_usize_list("stride", layout.extent())
            .set_usize_list("offset", layout.offset());
        self.set_object(name, object)
    }

    /// Integral and boolean data become int lists, floating data float lists
    pub fn set_data(&mut self, name: &str, data: &PortData) -> &mut Self {
        if data.port_type().is_floating_point() {
            self.set_float_list(name, &data.to_f64_vec())
        } else {
            let values = match data {
                PortData::Int64(v) => v.clone(),
                other => other.to_f64_vec().iter().map(|&v| v as i64).collect(),
            };
            self.set_int_list(name, values)
        }
    }

    fn typed<'a, T>(
        &'a self,
        name: &str,
        expected: &'static str,
        extract: impl FnOnce(&'a ArchiveValue) -> Option<T>,
    ) -> ForgeResult<Option<T>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(value) => {
                let actual = value.type_name();
                extract(value)
                    .map(Some)
                    .ok_or_else(|| GraphForgeError::ArchiveTypeMismatch {
                        field: name.to_string(),
                        expected,
                        actual,
                    })
            }
        }
    }

    fn get_bool_opt(&self, name: &str) -> ForgeResult<Option<bool>> {
        self.typed(name, "bool", |v| match v {
            ArchiveValue::Bool(b) => Some(*b),
            _ => None,
        })
    }

    fn get_int_opt(&self, name: &str) -> ForgeResult<Option<i64>> {
        self.typed(name, "int", |v| match v {
            ArchiveValue::Int(i) => Some(*i),
            _ => None,
        })
    }

    fn get_float_opt(&self, name: &str) -> ForgeResult<Option<f64>> {
        self.typed(name, "float", |v| match v {
            ArchiveValue::Float(f) => Some(f.0),
            _ => None,
        })
    }

    fn get_string_opt(&self, name: &str) -> ForgeResult<Option<String>> {
        self.typed(name, "string", |v| match v {
            ArchiveValue::String(s) => Some(s.clone()),
            _ => None,
        })
    }

    fn get_int_list_opt(&self, name: &str) -> ForgeResult<Option<Vec<i64>>> {
        self.typed(name, "int_list", |v| match v {
            ArchiveValue::IntList(list) => Some(list.clone()),
            _ => None,
        })
    }

    fn get_float_list_opt(&self, name: &str) -> ForgeResult<Option<Vec<f64>>> {
        self.typed(name, "float_list", |v| match v {
            ArchiveValue::FloatList(list) => Some(list.iter().map(|f| f.0).collect()),
            _ => None,
        })
    }

    fn get_string_list_opt(&self, name: &str) -> ForgeResult<Option<Vec<String>>> {
        self.typed(name, "string_list", |v| match v {
            ArchiveValue::StringList(list) => Some(list.clone()),
            _ => None,
        })
    }

    typed_field!(get_bool, get_bool_or, get_bool_opt, bool, "bool");
    typed_field!(get_int, get_int_or, get_int_opt, i64, "int");
    typed_field!(get_float, get_float_or, get_float_opt, f64, "float");
    typed_field!(get_string, get_string_or, get_string_opt, String, "string");
    typed_field!(get_int_list, get_int_list_or, get_int_list_opt, Vec<i64>, "int_list");
    typed_field!(get_float_list, get_float_list_or, get_float_list_opt, Vec<f64>, "float_list");
    typed_field!(
        get_string_list,
        get_string_list_or,
        get_string_list_opt,
        Vec<String>,
        "string_list"
    );

    pub fn get_object(&self, name: &str) -> ForgeResult<&ArchiveObject> {
        self.typed(name, "object", |v| match v {
            ArchiveValue::Object(o) => Some(o),
            _ => None,
        })?
        .ok_or_else(|| missing_field(name, "object"))
    }

    pub fn get_object_list(&self, name: &str) -> ForgeResult<&[ArchiveObject]> {
        self.typed(name, "object_list", |v| match v {
            ArchiveValue::ObjectList(list) => Some(list.as_slice()),
            _ => None,
        })?
        .ok_or_else(|| missing_field(name, "object_list"))
    }

    pub fn get_usize(&self, name: &str) -> ForgeResult<usize> {
        to_usize(name, self.get_int(name)?)
    }

    pub fn get_usize_or(&self, name: &str, default: usize) -> ForgeResult<usize> {
        match self.get_int_opt(name)? {
            Some(value) => to_usize(name, value),
            None => Ok(default),
        }
    }

    pub fn get_usize_list(&self, name: &str) -> ForgeResult<Vec<usize>> {
        self.get_int_list(name)?
            .into_iter()
            .map(|v| to_usize(name, v))
            .collect()
    }

    pub fn get_port_type(&self, name: &str) -> ForgeResult<PortType> {
        self.get_string(name)?.parse()
    }

    pub fn get_shape(&self, name: &str) -> ForgeResult<TensorShape> {
        let dims = self.get_usize_list(name)?;
        let shape = TensorShape::from_slice(&dims)
            .ok_or_else(|| {
                invalid_argument!("field '{}' is not a tensor shape: {:?}", name, dims)
            })?;
        shape.validate()?;
        Ok(shape)
    }

    /// Layouts written as `extent` are still accepted
    pub fn get_layout(&self, name: &str) -> ForgeResult<PortMemoryLayout> {
        let object = self.get_object(name)?;
        let stride = if object.contains("stride") {
            object.get_usize_list("stride")?
        } else {
            object.get_usize_list("extent")?
        };
        PortMemoryLayout::new(
            object.get_usize_list("size")?,
            stride,
            object.get_usize_list("offset")?,
        )
    }

    /// Read data written by [`set_data`](Self::set_data) as `port_type`
    pub fn get_data(&self, name: &str, port_type: PortType) -> ForgeResult<PortData> {
        if port_type.is_floating_point() {
            Ok(PortData::from_f64s(port_type, &self.get_float_list(name)?))
        } else if port_type == PortType::Int64 {
            Ok(PortData::Int64(self.get_int_list(name)?))
        } else {
            let values: Vec<f64> = self.get_int_list(name)?.iter().map(|&v| v as f64).collect();
            Ok(PortData::from_f64s(port_type, &values))
        }
    }
}

fn missing_field(name: &str, expected: &'static str) -> GraphForgeError {
    GraphForgeError::ArchiveTypeMismatch {
        field: name.to_string(),
        expected,
        actual: "missing",
    }
}

fn to_usize(name: &str, value: i64) -> ForgeResult<usize> {
    usize::try_from(value)
        .map_err(|_| invalid_argument!("field '{}' must be non-negative, got {}", name, value))
}

/// Writes models to archive objects and JSON text
#[derive(Debug, Default, Clone, Copy)]
pub struct Archiver;

impl Archiver {
    pub fn new() -> Self {
        Self
    }

    /// Archive every node of `model` in topological order
    pub fn archive_model(&self, model: &Model) -> ArchiveObject {
        let nodes = model
            .topological_order()
            .into_iter()
            .filter_map(|id| model.node(id).ok())
            .map(|node| self.archive_node(model, node))
            .collect();
        let mut object = ArchiveObject::new();
        object.set_string(TYPE_FIELD, "Model").set_object_list("nodes", nodes);
        object
    }

    fn archive_node(&self, model: &Model, node: &Node) -> ArchiveObject {
        let mut object = ArchiveObject::new();
        node.kind().write_to_archive(&mut object);

        let inputs = node
            .inputs()
            .iter()
            .map(|input| {
                let elements = input
                    .elements()
                    .ranges()
                    .iter()
                    .map(|range| {
                        let port_name = model
                            .node(range.port.node)
                            .ok()
                            .and_then(|producer| producer.outputs().get(range.port.port))
                            .map(|port| port.name())
                            .unwrap_or_default();
                        let mut entry = ArchiveObject::new();
                        entry
                            .set_usize("node", range.port.node.0)
                            .set_string("port", port_name)
                            .set_usize("start", range.start)
                            .set_usize("count", range.count);
                        entry
                    })
                    .collect();
                let mut port = ArchiveObject::new();
                port.set_string("name", input.name())
                    .set_port_type("type", input.element_type())
                    .set_usize("size", input.size())
                    .set_object_list("elements", elements);
                port
            })
            .collect();

        let outputs = node
            .outputs()
            .iter()
            .map(|output| {
                let mut port = ArchiveObject::new();
                port.set_string("name", output.name())
                    .set_port_type("type", output.element_type())
                    .set_usize("size", output.size());
                port
            })
            .collect();

        object
            .set_string(TYPE_FIELD, node.type_name())
            .set_string(KIND_FIELD, node.kind_name())
            .set_usize(ID_FIELD, node.id().0)
            .set_object_list(INPUTS_FIELD, inputs)
            .set_object_list(OUTPUTS_FIELD, outputs);
        object
    }

    pub fn to_json(&self, model: &Model) -> ForgeResult<String> {
        Ok(serde_json::to_string_pretty(&self.archive_model(model))?)
    }
}

/// Restores models from archive objects, resolving kinds through a registry
#[derive(Debug, Clone, Copy)]
pub struct Unarchiver<'r> {
    registry: &'r NodeRegistry,
}

impl Default for Unarchiver<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl Unarchiver<'static> {
    /// Unarchiver over every built-in node kind
    pub fn new() -> Self {
        Self {
            registry: NodeRegistry::global(),
        }
    }
}

impl<'r> Unarchiver<'r> {
    pub fn with_registry(registry: &'r NodeRegistry) -> Self {
        Self { registry }
    }

    pub fn unarchive_model(&self, archive: &ArchiveObject) -> ForgeResult<Model> {
        let mut model = Model::new();
        let mut ids: HashMap<usize, NodeId> = HashMap::new();

        for entry in archive.get_object_list("nodes")? {
            let type_name = entry.get_string(TYPE_FIELD)?;
            let kind_name = match entry.get_string_opt(KIND_FIELD)? {
                Some(kind) => kind,
                None => base_kind_name(&type_name).to_string(),
            };
            let registration = self
                .registry
                .get(&kind_name)
                .ok_or_else(|| GraphForgeError::UnknownKind(kind_name.clone()))?;
            let kind = (registration.unarchive)(entry)?;
            if kind.type_name() != type_name {
                return Err(invalid_argument!(
                    "archived node is '{}' but its fields describe '{}'",
                    type_name,
                    kind.type_name()
                ));
            }

            let archived_inputs = entry.get_object_list(INPUTS_FIELD)?;
            let mut inputs = Vec::new();
            for spec in kind.input_ports() {
                let port = archived_inputs
                    .iter()
                    .map(|port| port.get_string("name").map(|name| (name, port)))
                    .collect::<ForgeResult<Vec<_>>>()?
                    .into_iter()
                    .find(|(name, _)| name == spec.name)
                    .map(|(_, port)| port);
                let elements = match port {
                    Some(port) => self.read_elements(&model, &ids, port, spec.element_type)?,
                    None => PortElements::empty(spec.element_type),
                };
                inputs.push(elements);
            }

            let archived_id = entry.get_usize(ID_FIELD)?;
            let id = model.add_node(kind, inputs)?;
            tracing::debug!(
                archived = archived_id,
                node = id.0,
                kind = %type_name,
                "node restored"
            );
            ids.insert(archived_id, id);
        }
        Ok(model)
    }

    fn read_elements(
        &self,
        model: &Model,
        ids: &HashMap<usize, NodeId>,
        port: &ArchiveObject,
        element_type: PortType,
    ) -> ForgeResult<PortElements> {
        let mut elements = PortElements::empty(element_type);
        for range in port.get_object_list("elements")? {
            let archived = range.get_usize("node")?;
            let producer = *ids.get(&archived).ok_or_else(|| {
                invalid_argument!("input refers to node {} which precedes no consumer", archived)
            })?;
            let whole = model.output_port(producer, &range.get_string("port")?)?;
            elements.append(&whole.slice(range.get_usize("start")?, range.get_usize("count")?)?)?;
        }
        Ok(elements)
    }

    pub fn from_json(&self, text: &str) -> ForgeResult<Model> {
        let archive: ArchiveObject = serde_json::from_str(text)?;
        self.unarchive_model(&archive)
    }
}

/// `UnaryOperationNode<float>` -> `UnaryOperationNode`
pub fn base_kind_name(type_name: &str) -> &str {
    type_name
        .split_once('<')
        .map(|(base, _)| base)
        .unwrap_or(type_name)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_fields() {
        let mut object = ArchiveObject::new();
        object
            .set_int("size", 3)
            .set_string("name", "clock")
            .set_float_list("weights", &[0.5, -1.25]);

        assert_eq!(object.get_usize("size").unwrap(), 3);
        assert_eq!(object.get_string("name").unwrap(), "clock");
        assert_eq!(object.get_float_list("weights").unwrap(), vec![0.5, -1.25]);
        assert_eq!(object.get_float_or("missing", 2.0).unwrap(), 2.0);
    }

    #[test]
    fn test_type_mismatch() {
        let mut object = ArchiveObject::new();
        object.set_string("size", "three");
        match object.get_int("size") {
            Err(GraphForgeError::ArchiveTypeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, "int");
                assert_eq!(actual, "string");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(object.get_int_or("size", 1).is_err());
    }

    #[test]
    fn test_float_bits_survive_json() {
        let values = [
            0.1,
            -0.0,
            f64::MIN_POSITIVE,
            f64::MAX,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NAN,
            1.0 / 3.0,
        ];
        let mut object = ArchiveObject::new();
        object.set_float_list("values", &values);
        let text = serde_json::to_string(&object).unwrap();
        let restored: ArchiveObject = serde_json::from_str(&text).unwrap();
        let restored = restored.get_float_list("values").unwrap();
        for (a, b) in values.iter().zip(&restored) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_values_are_self_describing() {
        let mut object = ArchiveObject::new();
        object.set_bool("flag", true);
        let text = serde_json::to_string(&object).unwrap();
        assert_eq!(text, r#"{"flag":{"type":"bool","value":true}}"#);
    }

    #[test]
    fn test_layout_is_written_with_stride() {
        let layout = PortMemoryLayout::new(vec![2, 3], vec![4, 5], vec![1, 1]).unwrap();
        let mut object = ArchiveObject::new();
        object.set_layout("layout", &layout);
        let written = object.get_object("layout").unwrap();
        assert!(written.contains("stride"));
        assert!(!written.contains("extent"));
        assert_eq!(object.get_layout("layout").unwrap(), layout);

        let mut legacy = ArchiveObject::new();
        legacy
            .set_usize_list("size", &[2, 3])
            .set_usize_list("extent", &[4, 5])
            .set_usize_list("offset", &[1, 1]);
        let mut object = ArchiveObject::new();
        object.set_object("layout", legacy);
        assert_eq!(object.get_layout("layout").unwrap(), layout);
    }

    #[test]
    fn test_base_kind_name() {
        assert_eq!(base_kind_name("UnaryOperationNode<float>"), "UnaryOperationNode");
        assert_eq!(base_kind_name("ClockNode"), "ClockNode");
    }
}
