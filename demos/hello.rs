//! A small restline service.
//!
//! ```text
//! cargo run --example hello
//! curl 'http://127.0.0.1:8080/hello?name=ferris'
//! curl 'http://127.0.0.1:8080/users/7?format=json'
//! curl -X POST -H 'Content-Type: application/json' -d '{"name":"ada"}' http://127.0.0.1:8080/users
//! ```
//!
//! Set `RUST_LOG=restline=debug` to watch requests move through the pipeline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use restline::config::Config;
use restline::dispatcher::Dispatcher;
use restline::error::WebError;
use restline::handler::{Args, HandlerMethod, InvokeError, Param, ParamType, ReturnValue};
use restline::http::MediaType;
use restline::route::{Mapping, Route};
use restline::server::Server;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    #[serde(default)]
    id: u32,
    name: String,
}

async fn hello(args: Args) -> Result<ReturnValue, InvokeError> {
    let name: String = args.get(0)?;
    Ok(ReturnValue::text(format!("Hello, {name}!")))
}

async fn find_user(args: Args) -> Result<ReturnValue, InvokeError> {
    let id: u32 = args.get(0)?;
    if id == 0 {
        return Err(WebError::NotFound("no user 0".into()).into());
    }
    ReturnValue::entity(&User {
        id,
        name: format!("user-{id}"),
    })
}

async fn create_user(args: Args) -> Result<ReturnValue, InvokeError> {
    let mut user: User = args.get(0)?;
    user.id = 42;
    args.response().set_status(restline::StatusCode::Created);
    ReturnValue::entity(&user)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("restline=info")),
        )
        .init();

    let config = Config::default().with_env_overrides()?;
    let dispatcher = Arc::new(Dispatcher::new(&config.dispatcher));

    dispatcher
        .route(
            Route::new(Mapping::get("/hello")).handler_method(
                HandlerMethod::new("Demo", "hello", hello)
                    .param(Param::query("name", ParamType::of::<String>()).default_value("world"))
                    .returns::<String>(),
            ),
        )
        .route(
            Route::new(Mapping::get("/users/{id}")).handler_method(
                HandlerMethod::new("Users", "find", find_user)
                    .param(Param::path("id", ParamType::of::<u32>()))
                    .returns::<User>(),
            ),
        )
        .route(
            Route::new(Mapping::post("/users").consumes(MediaType::application_json()))
                .handler_method(
                    HandlerMethod::new("Users", "create", create_user)
                        .param(Param::body("user", ParamType::entity::<User>()))
                        .returns::<User>(),
                )
                .on_complete(|request, response, error| {
                    tracing::debug!(
                        path = request.path(),
                        status = %response.status(),
                        failed = error.is_some(),
                        "user creation finished"
                    );
                    Ok(())
                }),
        );

    let server = Server::bind("127.0.0.1:8080", config.server).await?;
    println!("Listening on http://{}", server.local_addr());
    server
        .run_until(dispatcher, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
