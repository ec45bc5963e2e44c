// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Action 与路由匹配模块
//!
//! 一个 `Action` 由以下部分组成：
//! - HTTP 方法与 URI 模板（例如 `/users/{userId}/orders/{orderId}`）。
//! - 目标方法描述（`to` 规格），例如 `order(String userId, int orderId, body: Order order)`。
//! - 消息体映射器以及可选的查询/头部参数解析器。
//!
//! ## 匹配算法
//! 模板在构造时被切分为交替出现的字面量段与参数段。匹配时从左到右扫描路径：
//! 字面量段必须在游标之后找到（第一个字面量必须锚定在位置 0）；
//! 参数段的结束位置推迟到下一个字面量出现的位置，若参数是最后一段则截止到下一个 `/` 或路径末尾。
//! 扫描结束后路径必须被完全消费，只允许多出一个结尾的 `/`。
//!
//! 匹配不做回溯：存在重叠的模板时，先注册的先匹配。

use std::{fmt, sync::Arc};

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::{
    exception::Exception,
    mapper::{JsonMapper, Mapper},
    param::HttpRequestMethod,
    request::Request,
    resolver::ParameterResolver,
    uri::Uri,
    value::{is_primitive, Value},
};

lazy_static! {
    static ref TO_SIGNATURE: Regex =
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)\s*$").expect("valid to-signature pattern");
}

/// 模板中的一段：字面量或者 `{name}` 参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    value: String,
    is_parameter: bool,
}

impl PathSegment {
    fn literal(value: &str) -> Self {
        Self {
            value: value.to_string(),
            is_parameter: false,
        }
    }

    fn parameter(name: &str) -> Self {
        Self {
            value: name.to_string(),
            is_parameter: true,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_parameter(&self) -> bool {
        self.is_parameter
    }
}

/// 编译后的 URI 模板。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matchable {
    template: String,
    segments: Vec<PathSegment>,
}

impl Matchable {
    pub fn compile(template: &str) -> Result<Self, Exception> {
        let unbalanced = || Exception::Configuration(format!("URI template has unbalanced braces: {}", template));
        let mut segments = Vec::new();
        let mut rest = template;
        while !rest.is_empty() {
            match rest.find(|c: char| c == '{' || c == '}') {
                None => {
                    segments.push(PathSegment::literal(rest));
                    break;
                }
                Some(open) if rest[open..].starts_with('{') => {
                    if open > 0 {
                        segments.push(PathSegment::literal(&rest[..open]));
                    }
                    let close = rest[open + 1..].find(|c: char| c == '{' || c == '}').ok_or_else(unbalanced)?;
                    let close = open + 1 + close;
                    if !rest[close..].starts_with('}') {
                        return Err(unbalanced());
                    }
                    let name = rest[open + 1..close].trim();
                    if name.is_empty() {
                        return Err(Exception::Configuration(format!(
                            "URI template has an unnamed parameter: {}",
                            template
                        )));
                    }
                    if matches!(segments.last(), Some(PathSegment { is_parameter: true, .. })) {
                        return Err(Exception::Configuration(format!(
                            "URI template has adjacent parameters without a separator: {}",
                            template
                        )));
                    }
                    segments.push(PathSegment::parameter(name));
                    rest = &rest[close + 1..];
                }
                Some(_) => return Err(unbalanced()),
            }
        }
        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter(|s| s.is_parameter)
            .map(|s| s.value.as_str())
            .collect()
    }

    /// 对路径执行匹配，成功时返回按模板顺序捕获的原始参数。
    fn match_path(&self, path: &str) -> Option<Vec<RawPathParameter>> {
        let mut cursor = 0;
        let mut parameters = Vec::new();
        let mut pending: Option<(&str, usize)> = None;

        for (index, segment) in self.segments.iter().enumerate() {
            if segment.is_parameter {
                pending = Some((segment.value.as_str(), cursor));
                continue;
            }
            let found = cursor + path.get(cursor..)?.find(&segment.value)?;
            if index == 0 && found != 0 {
                return None;
            }
            if let Some((name, start)) = pending.take() {
                if found == start {
                    return None;
                }
                parameters.push(RawPathParameter::new(name, &path[start..found]));
            } else if found != cursor {
                return None;
            }
            cursor = found + segment.value.len();
        }

        if let Some((name, start)) = pending {
            let end = path[start..].find('/').map_or(path.len(), |p| start + p);
            if end == start {
                return None;
            }
            parameters.push(RawPathParameter::new(name, &path[start..end]));
            cursor = end;
        }

        let remaining = &path[cursor..];
        if remaining.is_empty() || remaining == "/" {
            Some(parameters)
        } else {
            None
        }
    }
}

/// 目标方法中的一个形参。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodParameter {
    pub type_name: String,
    pub name: String,
    pub is_body: bool,
}

/// 解析后的目标方法描述：`methodName(type name, ..., body: type name)`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToSignature {
    method_name: String,
    parameters: Vec<MethodParameter>,
}

impl ToSignature {
    pub fn parse(to: &str) -> Result<Self, Exception> {
        let captures = TO_SIGNATURE
            .captures(to)
            .ok_or_else(|| Exception::Configuration(format!("Malformed to-signature: {}", to)))?;
        let method_name = captures[1].to_string();
        let mut parameters = Vec::new();
        for raw in captures[2].split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (is_body, declaration) = match raw.strip_prefix("body:") {
                Some(rest) => (true, rest.trim()),
                None => (false, raw),
            };
            let (type_name, name) = match declaration.rsplit_once(char::is_whitespace) {
                Some((t, n)) if !t.trim().is_empty() && !n.is_empty() => (t.trim(), n),
                _ => {
                    return Err(Exception::Configuration(format!(
                        "Parameter must be declared as 'type name': {} in {}",
                        raw, to
                    )))
                }
            };
            parameters.push(MethodParameter {
                type_name: type_name.to_string(),
                name: name.to_string(),
                is_body,
            });
        }
        if parameters.iter().filter(|p| p.is_body).count() > 1 {
            return Err(Exception::Configuration(format!("Only one body parameter is allowed: {}", to)));
        }
        Ok(Self {
            method_name,
            parameters,
        })
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn parameters(&self) -> &[MethodParameter] {
        &self.parameters
    }

    pub fn body_parameter(&self) -> Option<&MethodParameter> {
        self.parameters.iter().find(|p| p.is_body)
    }
}

impl fmt::Display for ToSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parameters: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let prefix = if p.is_body { "body: " } else { "" };
                format!("{}{} {}", prefix, p.type_name, p.name)
            })
            .collect();
        write!(f, "{}({})", self.method_name, parameters.join(", "))
    }
}

/// 匹配过程中捕获的原始路径参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPathParameter {
    pub name: String,
    pub value: String,
}

impl RawPathParameter {
    fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// 一次匹配的结果。未匹配时 `action` 为 `None`。
#[derive(Debug, Clone)]
pub struct MatchResults<'a> {
    action: Option<&'a Action>,
    parameters: Vec<RawPathParameter>,
}

impl<'a> MatchResults<'a> {
    pub fn unmatched() -> Self {
        Self {
            action: None,
            parameters: Vec::new(),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.action.is_some()
    }

    pub fn action(&self) -> Option<&'a Action> {
        self.action
    }

    pub fn raw_parameters(&self) -> &[RawPathParameter] {
        &self.parameters
    }

    pub fn raw_parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappedParameter {
    pub type_name: String,
    pub value: Value,
}

/// 一个请求解析后的参数列表，由分发步骤消费一次。
#[derive(Debug, Clone, PartialEq)]
pub struct MappedParameters {
    pub action_id: usize,
    pub http_method: HttpRequestMethod,
    pub method_name: String,
    pub mapped: Vec<MappedParameter>,
}

impl MappedParameters {
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.mapped.iter().map(|p| &p.value)
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.mapped.get(index).map(|p| &p.value)
    }

    pub fn len(&self) -> usize {
        self.mapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapped.is_empty()
    }

    /// 取出全部值，交给处理器。
    pub fn into_values(self) -> Vec<Value> {
        self.mapped.into_iter().map(|p| p.value).collect()
    }
}

pub struct Action {
    id: usize,
    method: HttpRequestMethod,
    matchable: Matchable,
    to: ToSignature,
    mapper: Arc<dyn Mapper>,
    resolvers: Vec<ParameterResolver>,
    additional_parameters: Vec<Value>,
}

impl Action {
    /// 构造 Action，并校验模板与目标方法描述的一致性。
    pub fn new(
        id: usize,
        method: HttpRequestMethod,
        uri: &str,
        to: &str,
        mapper: Option<Arc<dyn Mapper>>,
    ) -> Result<Self, Exception> {
        let action = Self {
            id,
            method,
            matchable: Matchable::compile(uri)?,
            to: ToSignature::parse(to)?,
            mapper: mapper.unwrap_or_else(|| Arc::new(JsonMapper)),
            resolvers: Vec::new(),
            additional_parameters: Vec::new(),
        };
        action.check_order()?;
        for p in action.to.parameters.iter().filter(|p| !p.is_body && !is_primitive(&p.type_name)) {
            warn!(
                "Action {} 的参数 {} 声明了无法识别的类型 {}，匹配时将得到空值",
                action.id, p.name, p.type_name
            );
        }
        Ok(action)
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.mapper = mapper;
        self
    }

    /// 追加查询、头部等参数解析器，结果排在目标方法参数之后。
    pub fn with_resolvers(mut self, resolvers: Vec<ParameterResolver>) -> Self {
        self.resolvers = resolvers;
        self
    }

    /// 追加带外参数，原样放在所有请求参数之后。
    pub fn with_additional_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.additional_parameters = parameters;
        self
    }

    /// 路径参数必须出现在模板中、顺序与模板一致，并且排在消息体参数之前。
    fn check_order(&self) -> Result<(), Exception> {
        let template_names = self.matchable.parameter_names();
        let mut last_position = None;
        let mut seen_body = false;
        for p in &self.to.parameters {
            if p.is_body {
                seen_body = true;
                continue;
            }
            let position = template_names.iter().position(|n| *n == p.name).ok_or_else(|| {
                Exception::Configuration(format!(
                    "Parameter {} of {} is not a path parameter of {}",
                    p.name,
                    self.to,
                    self.matchable.template()
                ))
            })?;
            if seen_body {
                return Err(Exception::Configuration(format!(
                    "Path parameter {} must precede the body parameter in {}",
                    p.name, self.to
                )));
            }
            if last_position.map_or(false, |last| position < last) {
                return Err(Exception::Configuration(format!(
                    "Path parameters of {} are not declared in the order of {}",
                    self.to,
                    self.matchable.template()
                )));
            }
            last_position = Some(position);
        }
        Ok(())
    }

    /// 方法与路径都匹配时返回携带原始参数的结果。
    ///
    /// URI 必须是 `http`/`https` 的绝对形式，否则属于调用方违约。
    pub fn match_with(&self, method: HttpRequestMethod, uri: &Uri) -> Result<MatchResults<'_>, Exception> {
        if !uri.is_http() {
            return Err(Exception::InvalidArgument(format!(
                "URI must be absolute with an http or https scheme: {}",
                uri
            )));
        }
        if method != self.method {
            return Ok(MatchResults::unmatched());
        }
        Ok(match self.matchable.match_path(uri.path()) {
            Some(parameters) => MatchResults {
                action: Some(self),
                parameters,
            },
            None => MatchResults::unmatched(),
        })
    }

    /// 按声明顺序把请求映射为处理器参数。
    pub fn map(&self, request: &Request, results: &MatchResults<'_>) -> Result<MappedParameters, Exception> {
        let mut mapped = Vec::with_capacity(
            self.to.parameters.len() + self.resolvers.len() + self.additional_parameters.len(),
        );
        for p in &self.to.parameters {
            let value = if p.is_body {
                self.mapper.from_body(request, &p.type_name)?
            } else {
                match results.raw_parameter(&p.name) {
                    Some(raw) => Value::coerce(&p.type_name, raw)?,
                    None => Value::Null,
                }
            };
            mapped.push(MappedParameter {
                type_name: p.type_name.clone(),
                value,
            });
        }
        for resolver in &self.resolvers {
            let type_name = match resolver {
                ParameterResolver::Query { type_name, .. } => type_name.clone(),
                ParameterResolver::Header { .. } => "string".to_string(),
                ParameterResolver::Request => "request".to_string(),
            };
            mapped.push(MappedParameter {
                type_name,
                value: resolver.resolve(request)?,
            });
        }
        for value in &self.additional_parameters {
            mapped.push(MappedParameter {
                type_name: "additional".to_string(),
                value: value.clone(),
            });
        }
        Ok(MappedParameters {
            action_id: self.id,
            http_method: self.method,
            method_name: self.to.method_name.clone(),
            mapped,
        })
    }
}

impl Action {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn uri(&self) -> &str {
        self.matchable.template()
    }

    pub fn to(&self) -> &ToSignature {
        &self.to
    }

    pub fn matchable(&self) -> &Matchable {
        &self.matchable
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("uri", &self.matchable.template())
            .field("to", &self.to.to_string())
            .finish()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} -> {}", self.method, self.matchable.template(), self.to)
    }
}
