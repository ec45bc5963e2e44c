// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 消息体映射器：把请求体转换为处理器参数。

use std::sync::Arc;

use crate::{body::Body, exception::Exception, param::CONTENT_TYPE, request::Request, value::Value};

pub trait Mapper: Send + Sync {
    /// 把请求体映射为 `type_name` 声明的参数值。
    fn from_body(&self, request: &Request, type_name: &str) -> Result<Value, Exception>;
}

/// 默认映射器，按 JSON 解析消息体。
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMapper;

impl Mapper for JsonMapper {
    fn from_body(&self, request: &Request, type_name: &str) -> Result<Value, Exception> {
        if let Some(content_type) = request.header_value(CONTENT_TYPE) {
            if !content_type.to_ascii_lowercase().contains("json") {
                return Err(Exception::UnsupportedMediaType(format!(
                    "Cannot map {} body to {}",
                    content_type, type_name
                )));
            }
        }
        let body: &Body = request.body();
        if !body.has_content() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body.bytes())
            .map(Value::Json)
            .map_err(|e| Exception::InvalidArgument(format!("Body is not valid JSON for {}: {}", type_name, e)))
    }
}

/// 原样把消息体作为字符串传给处理器。
#[derive(Debug, Default, Clone, Copy)]
pub struct TextMapper;

impl Mapper for TextMapper {
    fn from_body(&self, request: &Request, _type_name: &str) -> Result<Value, Exception> {
        Ok(Value::Str(request.body().content().into_owned()))
    }
}

/// 按配置中的名称查找映射器。未配置时使用 JSON。
pub fn mapper_named(name: Option<&str>) -> Result<Arc<dyn Mapper>, Exception> {
    match name.map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("json") => Ok(Arc::new(JsonMapper)),
        Some("text") => Ok(Arc::new(TextMapper)),
        Some(other) => Err(Exception::Configuration(format!("Unknown mapper: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::HttpRequestMethod;

    fn post(body: &str) -> Request {
        Request::has(HttpRequestMethod::Post, "/items")
            .unwrap()
            .with_body(Body::from_text(body))
    }

    #[test]
    fn test_json_mapper() {
        let value = JsonMapper.from_body(&post(r#"{"name":"pen"}"#), "Item").unwrap();
        assert_eq!(value, Value::Json(serde_json::json!({"name": "pen"})));
    }

    #[test]
    fn test_json_mapper_rejects_other_media_types() {
        let request = post("name=pen").with_header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        let e = JsonMapper.from_body(&request, "Item").unwrap_err();
        assert_eq!(e.status_code(), 415);
    }

    #[test]
    fn test_json_mapper_invalid_json() {
        let e = JsonMapper.from_body(&post("{not json"), "Item").unwrap_err();
        assert_eq!(e.status_code(), 400);
    }

    #[test]
    fn test_text_mapper() {
        let value = TextMapper.from_body(&post("plain words"), "string").unwrap();
        assert_eq!(value, Value::Str("plain words".into()));
    }

    #[test]
    fn test_mapper_named() {
        assert!(mapper_named(None).is_ok());
        assert!(mapper_named(Some("Text")).is_ok());
        assert!(mapper_named(Some("xml")).is_err());
    }
}
