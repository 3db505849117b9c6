//! # restline
//!
//! An async HTTP request-dispatch framework: routes requests to handler
//! methods, resolves their arguments from the request, negotiates how the
//! return value is written, and sheds load when the server is saturated.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use restline::config::Config;
//! use restline::dispatcher::Dispatcher;
//! use restline::handler::{Args, HandlerMethod, InvokeError, Param, ParamType, ReturnValue};
//! use restline::route::{Mapping, Route};
//! use restline::server::Server;
//!
//! async fn greet(args: Args) -> Result<ReturnValue, InvokeError> {
//!     let name: String = args.get(0)?;
//!     Ok(ReturnValue::text(format!("Hello, {name}!")))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default().with_env_overrides()?;
//!     let dispatcher = Arc::new(Dispatcher::new(&config.dispatcher));
//!     dispatcher.route(
//!         Route::new(Mapping::get("/hello")).handler_method(
//!             HandlerMethod::new("Greeter", "greet", greet)
//!                 .param(Param::query("name", ParamType::of::<String>()).default_value("world"))
//!                 .returns::<String>(),
//!         ),
//!     );
//!
//!     Server::bind("127.0.0.1:8080", config.server).await?.run(dispatcher).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod http;
pub mod resolver;
pub mod route;
pub mod serialize;
pub mod server;

pub use dispatcher::{Dispatcher, RequestTask};
pub use error::WebError;
pub use http::{Headers, MediaType, Method, Request, Response, StatusCode};
pub use route::{Mapping, Route};
pub use server::{Server, ServerError};
