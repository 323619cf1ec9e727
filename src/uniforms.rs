//! The per-sandbox uniform table shared by every pass.
//!
//! One table lives in each [`Sandbox`](crate::Sandbox) and is handed by
//! reference to every draw. Passes publish their output textures into it, so
//! a later pass in the same frame reads what an earlier one produced.

use std::collections::BTreeMap;

use glam::{Vec2, Vec3, Vec4};

use crate::backend::{Extent, TargetHandle};

pub const U_RESOLUTION: &str = "u_resolution";
pub const U_TIME: &str = "u_time";
pub const U_DELTA: &str = "u_delta";
pub const U_FRAME: &str = "u_frame";
pub const U_SCENE: &str = "u_scene";

/// A single uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    /// A target's texture, or nothing bound yet.
    Texture(Option<TargetHandle>),
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        UniformValue::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        UniformValue::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        UniformValue::Vec4(v)
    }
}

impl From<TargetHandle> for UniformValue {
    fn from(v: TargetHandle) -> Self {
        UniformValue::Texture(Some(v))
    }
}

/// Name → value map, always holding the reserved frame uniforms.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformTable {
    values: BTreeMap<String, UniformValue>,
}

impl Default for UniformTable {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformTable {
    /// Creates a table with `u_resolution`, `u_time`, `u_delta` and `u_frame` zeroed.
    pub fn new() -> Self {
        let mut values = BTreeMap::new();
        values.insert(U_RESOLUTION.to_string(), UniformValue::Vec2(Vec2::ZERO));
        values.insert(U_TIME.to_string(), UniformValue::Float(0.0));
        values.insert(U_DELTA.to_string(), UniformValue::Float(0.0));
        values.insert(U_FRAME.to_string(), UniformValue::Int(0));
        Self { values }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<UniformValue> {
        self.values.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UniformValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.values.get(name) {
            Some(UniformValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        match self.values.get(name) {
            Some(UniformValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn vec2(&self, name: &str) -> Option<Vec2> {
        match self.values.get(name) {
            Some(UniformValue::Vec2(v)) => Some(*v),
            _ => None,
        }
    }

    /// Texture bound under `name`, if the entry exists and is set.
    pub fn texture(&self, name: &str) -> Option<TargetHandle> {
        match self.values.get(name) {
            Some(UniformValue::Texture(t)) => *t,
            _ => None,
        }
    }

    pub fn set_texture(&mut self, name: &str, target: TargetHandle) {
        self.set(name, UniformValue::Texture(Some(target)));
    }

    pub fn set_resolution(&mut self, size: Extent) {
        self.set(U_RESOLUTION, size.as_vec2());
    }

    pub fn resolution(&self) -> Vec2 {
        self.vec2(U_RESOLUTION).unwrap_or(Vec2::ZERO)
    }

    /// Names of every texture-valued entry.
    pub fn texture_names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().filter_map(|(k, v)| match v {
            UniformValue::Texture(_) => Some(k.as_str()),
            _ => None,
        })
    }

    /// Drops texture entries published by a previous graph.
    pub(crate) fn clear_pass_textures(&mut self) {
        self.values.retain(|name, value| {
            !(matches!(value, UniformValue::Texture(_)) && is_pass_texture(name))
        });
    }
}

/// Whether `name` is one of the texture uniforms owned by the pass graph.
pub fn is_pass_texture(name: &str) -> bool {
    name == U_SCENE
        || numbered_suffix(name, "u_buffer")
        || numbered_suffix(name, "u_doubleBuffer")
}

fn numbered_suffix(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}
