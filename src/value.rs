// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 处理器参数的动态值以及原始字符串到基本类型的转换。

use serde::de::DeserializeOwned;

use crate::{exception::Exception, request::Request};

/// 映射后的单个参数值。
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Str(String),
    Int(i32),
    Long(i64),
    Short(i16),
    Byte(i8),
    Bool(bool),
    Double(f64),
    Float(f32),
    Char(char),
    /// 由映射器从消息体得到的结构化数据
    Json(serde_json::Value),
    /// 整个请求
    Request(Box<Request>),
}

/// 可以被识别的基本类型名称。
pub const PRIMITIVE_TYPES: [&str; 9] = [
    "string", "int", "long", "bool", "double", "short", "float", "char", "byte",
];

pub fn is_primitive(type_name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&normalize(type_name))
}

fn normalize(type_name: &str) -> &str {
    match type_name {
        "String" | "str" => "string",
        "Integer" | "i32" => "int",
        "Long" | "i64" => "long",
        "boolean" | "Boolean" => "bool",
        "Double" | "f64" => "double",
        "Short" | "i16" => "short",
        "Float" | "f32" => "float",
        "Character" => "char",
        "Byte" | "i8" => "byte",
        other => other,
    }
}

impl Value {
    /// 把原始字符串转换为声明的类型。
    ///
    /// 数字或布尔字面量非法时返回 `InvalidArgument`。
    /// 无法识别的类型名称得到 `Value::Null`。
    pub fn coerce(type_name: &str, raw: &str) -> Result<Value, Exception> {
        let invalid = |e: &dyn std::fmt::Display| {
            Exception::InvalidArgument(format!("Cannot convert '{}' to {}: {}", raw, type_name, e))
        };
        let value = match normalize(type_name) {
            "string" => Value::Str(raw.to_string()),
            "int" => Value::Int(raw.parse().map_err(|e| invalid(&e))?),
            "long" => Value::Long(raw.parse().map_err(|e| invalid(&e))?),
            "short" => Value::Short(raw.parse().map_err(|e| invalid(&e))?),
            "byte" => Value::Byte(raw.parse().map_err(|e| invalid(&e))?),
            "bool" => Value::Bool(raw.parse().map_err(|e| invalid(&e))?),
            "double" => Value::Double(raw.parse().map_err(|e| invalid(&e))?),
            "float" => Value::Float(raw.parse().map_err(|e| invalid(&e))?),
            "char" => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(invalid(&"expected exactly one character")),
                }
            }
            _ => Value::Null,
        };
        Ok(value)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// 任何整数类型都会被放宽为 `i64`。
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            Value::Short(v) => Some(*v as i64),
            Value::Byte(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Float(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Value::Request(r) => Some(r),
            _ => None,
        }
    }

    /// 把结构化的消息体反序列化为具体类型。
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, Exception> {
        match self {
            Value::Json(json) => serde_json::from_value(json.clone())
                .map_err(|e| Exception::InvalidArgument(format!("Body does not match the expected shape: {}", e))),
            Value::Str(text) => serde_json::from_str(text)
                .map_err(|e| Exception::InvalidArgument(format!("Body does not match the expected shape: {}", e))),
            other => Err(Exception::InvalidArgument(format!(
                "Value {:?} cannot be deserialized",
                other
            ))),
        }
    }
}
