// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 路径参数与消息体之外的参数来源：查询字符串、请求头以及整个请求。

use crate::{exception::Exception, request::Request, value::Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterResolver {
    Query {
        name: String,
        type_name: String,
        default: Option<String>,
    },
    Header {
        name: String,
    },
    Request,
}

impl ParameterResolver {
    /// 以字符串形式读取查询参数。
    pub fn query(name: &str) -> Self {
        Self::query_as(name, "string")
    }

    pub fn query_as(name: &str, type_name: &str) -> Self {
        ParameterResolver::Query {
            name: name.to_string(),
            type_name: type_name.to_string(),
            default: None,
        }
    }

    pub fn query_or(name: &str, type_name: &str, default: &str) -> Self {
        ParameterResolver::Query {
            name: name.to_string(),
            type_name: type_name.to_string(),
            default: Some(default.to_string()),
        }
    }

    pub fn header(name: &str) -> Self {
        ParameterResolver::Header {
            name: name.to_string(),
        }
    }

    pub fn request() -> Self {
        ParameterResolver::Request
    }

    /// 缺失的查询参数或头部解析为 `Value::Null`，除非提供了默认值。
    pub fn resolve(&self, request: &Request) -> Result<Value, Exception> {
        match self {
            ParameterResolver::Query {
                name,
                type_name,
                default,
            } => match request.query_parameter(name).or_else(|| default.clone()) {
                Some(raw) => Value::coerce(type_name, &raw),
                None => Ok(Value::Null),
            },
            ParameterResolver::Header { name } => Ok(request
                .header_value(name)
                .map_or(Value::Null, |v| Value::Str(v.to_string()))),
            ParameterResolver::Request => Ok(Value::Request(Box::new(request.clone()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::HttpRequestMethod;

    fn request() -> Request {
        Request::has(HttpRequestMethod::Get, "/items?page=3&q=red%20pen")
            .unwrap()
            .with_header("X-Tenant", "acme")
    }

    #[test]
    fn test_query_resolution() {
        let r = request();
        assert_eq!(ParameterResolver::query("q").resolve(&r).unwrap(), Value::Str("red pen".into()));
        assert_eq!(ParameterResolver::query_as("page", "int").resolve(&r).unwrap(), Value::Int(3));
        assert_eq!(ParameterResolver::query("missing").resolve(&r).unwrap(), Value::Null);
        assert_eq!(
            ParameterResolver::query_or("size", "int", "20").resolve(&r).unwrap(),
            Value::Int(20)
        );
    }

    #[test]
    fn test_header_and_request_resolution() {
        let r = request();
        assert_eq!(
            ParameterResolver::header("x-tenant").resolve(&r).unwrap(),
            Value::Str("acme".into())
        );
        let whole = ParameterResolver::request().resolve(&r).unwrap();
        assert_eq!(whole.as_request().map(Request::path), Some("/items"));
    }

    #[test]
    fn test_query_coercion_failure() {
        let r = Request::has(HttpRequestMethod::Get, "/items?page=abc").unwrap();
        assert!(ParameterResolver::query_as("page", "int").resolve(&r).is_err());
    }
}
