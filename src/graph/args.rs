//! Argument grammar for the generic `AddNode` entry point.
//!
//! ```text
//! port elements  3.output  3.output[1]  3.output[0..2]  {0.output, 2.output[1..3]}
//! lists          [1, 2.5, -3]
//! matrices       [[1, 2], [3, 4]]
//! shapes         [rows, columns, channels]
//! layouts        size=[2,2];stride=[4,4];offset=[1,1]
//! ```
//! Scalars use Rust literal syntax; enumerations use their contract names.

use std::fmt;
use std::str::FromStr;

use crate::error::{ForgeResult, GraphForgeError};

use super::layout::PortMemoryLayout;
use super::model::Model;
use super::node::NodeId;
use super::port_elements::PortElements;
use super::port_type::PortType;
use super::shape::TensorShape;

/// One positional argument of a kind's AddNode schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    /// Value used when the argument is omitted; `None` means required
    pub default: Option<&'static str>,
}

impl ArgSpec {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            default: Some(default),
        }
    }
}

/// Positional string arguments checked against a schema
#[derive(Debug, Clone)]
pub struct NodeArgs<'a> {
    kind: &'a str,
    specs: &'static [ArgSpec],
    values: Vec<&'a str>,
}

impl<'a> NodeArgs<'a> {
    /// Bind `values` to `specs`, filling omitted trailing arguments with defaults
    pub fn new(kind: &'a str, specs: &'static [ArgSpec], values: &[&'a str]) -> ForgeResult<Self> {
        if values.len() > specs.len() {
            return Err(GraphForgeError::arg_parse(
                kind,
                &values.join(" "),
                format!("expects at most {} arguments, got {}", specs.len(), values.len()),
            ));
        }
        let mut bound = values.to_vec();
        for spec in &specs[values.len()..] {
            match spec.default {
                Some(default) => bound.push(default),
                None => {
                    return Err(GraphForgeError::arg_parse(
                        spec.name,
                        "",
                        format!("required argument of {} is missing", kind),
                    ))
                }
            }
        }
        Ok(Self {
            kind,
            specs,
            values: bound,
        })
    }

    pub fn kind(&self) -> &str {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn raw(&self, index: usize) -> ForgeResult<(&'static str, &'a str)> {
        match (self.specs.get(index), self.values.get(index)) {
            (Some(spec), Some(value)) => Ok((spec.name, value.trim())),
            _ => Err(crate::internal_error!(
                "{} schema has no argument #{}",
                self.kind,
                index
            )),
        }
    }

    fn error(&self, index: usize, reason: impl Into<String>) -> GraphForgeError {
        match self.raw(index) {
            Ok((name, value)) => GraphForgeError::arg_parse(name, value, reason),
            Err(err) => err,
        }
    }

    /// Any `FromStr` scalar or enumeration
    pub fn parse<T>(&self, index: usize) -> ForgeResult<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let (_, value) = self.raw(index)?;
        value.parse().map_err(|e: T::Err| self.error(index, e.to_string()))
    }

    pub fn string(&self, index: usize) -> ForgeResult<String> {
        let (_, value) = self.raw(index)?;
        Ok(value.trim_matches('"').to_string())
    }

    pub fn port_type(&self, index: usize) -> ForgeResult<PortType> {
        self.parse(index)
    }

    pub fn f64_list(&self, index: usize) -> ForgeResult<Vec<f64>> {
        let (_, value) = self.raw(index)?;
        parse_list(value).map_err(|reason| self.error(index, reason))
    }

    pub fn usize_list(&self, index: usize) -> ForgeResult<Vec<usize>> {
        let (_, value) = self.raw(index)?;
        parse_list(value).map_err(|reason| self.error(index, reason))
    }

    pub fn matrix(&self, index: usize) -> ForgeResult<Vec<Vec<f64>>> {
        let (_, value) = self.raw(index)?;
        let rows = bracketed(value).map_err(|reason| self.error(index, reason))?;
        split_top_level(rows)
            .into_iter()
            .map(|row| parse_list(row).map_err(|reason| self.error(index, reason)))
            .collect()
    }

    pub fn shape(&self, index: usize) -> ForgeResult<TensorShape> {
        let dims = self.usize_list(index)?;
        let shape = TensorShape::from_slice(&dims)
            .ok_or_else(|| self.error(index, "shape needs 1 or 3 dimensions"))?;
        shape.validate().map_err(|e| self.error(index, e.to_string()))?;
        Ok(shape)
    }

    pub fn layout(&self, index: usize) -> ForgeResult<PortMemoryLayout> {
        let (_, value) = self.raw(index)?;
        let mut size = None;
        let mut extent = None;
        let mut offset = None;
        for part in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, list) = part
                .split_once('=')
                .ok_or_else(|| self.error(index, format!("'{}' is not key=[...]", part)))?;
            let list: Vec<usize> =
                parse_list(list.trim()).map_err(|reason| self.error(index, reason))?;
            match key.trim() {
                "size" => size = Some(list),
                "stride" | "extent" => extent = Some(list),
                "offset" => offset = Some(list),
                other => return Err(self.error(index, format!("unknown layout key '{}'", other))),
            }
        }
        let size = size.ok_or_else(|| self.error(index, "layout needs size=[...]"))?;
        let extent = extent.unwrap_or_else(|| size.clone());
        let offset = offset.unwrap_or_else(|| vec![0; size.len()]);
        PortMemoryLayout::new(size, extent, offset).map_err(|e| self.error(index, e.to_string()))
    }

    /// Resolve port references against `model`
    pub fn port_elements(&self, index: usize, model: &Model) -> ForgeResult<PortElements> {
        let (_, value) = self.raw(index)?;
        let inner = value
            .strip_prefix('{')
            .and_then(|v| v.strip_suffix('}'))
            .unwrap_or(value)
            .trim();
        let mut parts = Vec::new();
        for token in split_top_level(inner) {
            parts.push(self.port_reference(index, token, model)?);
        }
        if parts.is_empty() {
            return Ok(PortElements::empty(PortType::REAL));
        }
        PortElements::concat(&parts).map_err(|e| self.error(index, e.to_string()))
    }

    fn port_reference(
        &self,
        index: usize,
        token: &str,
        model: &Model,
    ) -> ForgeResult<PortElements> {
        let (node, rest) = token
            .split_once('.')
            .ok_or_else(|| self.error(index, format!("'{}' is not node.port", token)))?;
        let node: usize = node
            .trim()
            .parse()
            .map_err(|_| self.error(index, format!("'{}' is not a node id", node)))?;
        let (port, range) = match rest.split_once('[') {
            Some((port, range)) => (port, Some(range.trim_end_matches(']'))),
            None => (rest, None),
        };
        let whole = model
            .output_port(NodeId(node), port.trim())
            .map_err(|e| self.error(index, e.to_string()))?;
        let (start, count) = match range {
            None => (0, whole.size()),
            Some(range) => match range.split_once("..") {
                Some((a, b)) => {
                    let a: usize = parse_scalar(a).map_err(|r| self.error(index, r))?;
                    let b: usize = parse_scalar(b).map_err(|r| self.error(index, r))?;
                    if b < a {
                        return Err(self.error(index, format!("empty range {}..{}", a, b)));
                    }
                    (a, b - a)
                }
                None => (parse_scalar(range).map_err(|r| self.error(index, r))?, 1),
            },
        };
        whole
            .slice(start, count)
            .map_err(|e| self.error(index, e.to_string()))
    }
}

fn bracketed(value: &str) -> Result<&str, String> {
    value
        .trim()
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .ok_or_else(|| format!("expected [...], got '{}'", value))
}

fn parse_scalar<T: FromStr>(value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", value.trim()))
}

fn parse_list<T: FromStr>(value: &str) -> Result<Vec<T>, String> {
    split_top_level(bracketed(value)?)
        .into_iter()
        .map(parse_scalar)
        .collect()
}

/// Split on commas that are not nested inside brackets or braces
fn split_top_level(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(value[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}
