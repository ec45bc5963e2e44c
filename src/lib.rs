pub mod action;
pub mod body;
pub mod completes;
pub mod config;
pub mod dispatcher;
pub mod error_handler;
pub mod exception;
pub mod filter;
pub mod header;
pub mod mapper;
pub mod param;
pub mod parser;
pub mod pool;
pub mod request;
pub mod request_parser;
pub mod resolver;
pub mod resource;
pub mod response;
pub mod response_parser;
pub mod server;
pub mod uri;
pub mod value;

pub use action::{Action, MappedParameters, MatchResults, ToSignature};
pub use body::Body;
pub use completes::Completes;
pub use config::Config;
pub use dispatcher::{Dispatcher, Signal};
pub use error_handler::{ErrorHandler, ErrorHandlers};
pub use exception::Exception;
pub use filter::{Filters, RequestFilter, ResponseFilter, StandardHeadersFilter};
pub use header::{Header, Headers};
pub use mapper::{JsonMapper, Mapper, TextMapper};
pub use param::{HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use request_parser::RequestParser;
pub use resolver::ParameterResolver;
pub use resource::{Dispatchable, Resource, ResourceBuilder};
pub use response::Response;
pub use response_parser::ResponseParser;
pub use server::{Server, ServerHandle};
pub use uri::Uri;
pub use value::Value;
