//! Ordered request filters run around the dispatch pipeline.

use std::sync::Arc;

use super::Dispatcher;
use crate::error::WebError;
use crate::handler::BoxFuture;
use crate::http::{Request, Response};

/// Intercepts a request before routing.
///
/// A filter either passes the request on with
/// [`FilterChain::do_filter`] or answers it itself. A filter that returns
/// without calling the chain short-circuits: no route runs, and whatever it
/// left on the response is committed. A returned error goes through the
/// exception handlers unless the response was already sent.
///
/// ```
/// use std::sync::Arc;
/// use restline::dispatcher::{Filter, FilterChain};
/// use restline::handler::BoxFuture;
/// use restline::http::{Request, Response, StatusCode};
/// use restline::WebError;
///
/// struct RequireToken;
///
/// impl Filter for RequireToken {
///     fn filter<'a>(
///         &'a self,
///         request: &'a Arc<Request>,
///         response: &'a Response,
///         chain: FilterChain<'a>,
///     ) -> BoxFuture<'a, Option<WebError>> {
///         Box::pin(async move {
///             if request.headers().contains("authorization") {
///                 return chain.do_filter(request, response).await;
///             }
///             response.send(StatusCode::Unauthorized, None, "");
///             None
///         })
///     }
/// }
/// ```
pub trait Filter: Send + Sync + 'static {
    fn filter<'a>(
        &'a self,
        request: &'a Arc<Request>,
        response: &'a Response,
        chain: FilterChain<'a>,
    ) -> BoxFuture<'a, Option<WebError>>;

    /// Lower runs first; equal orders keep registration order.
    fn order(&self) -> i32 {
        0
    }
}

/// The filters not yet run for one request, then the pipeline itself.
pub struct FilterChain<'a> {
    filters: &'a [Arc<dyn Filter>],
    dispatcher: &'a Dispatcher,
}

impl<'a> FilterChain<'a> {
    pub(super) fn new(filters: &'a [Arc<dyn Filter>], dispatcher: &'a Dispatcher) -> Self {
        Self {
            filters,
            dispatcher,
        }
    }

    /// Runs the next filter, or routes the request once none are left.
    pub fn do_filter(
        self,
        request: &'a Arc<Request>,
        response: &'a Response,
    ) -> BoxFuture<'a, Option<WebError>> {
        match self.filters.split_first() {
            Some((first, rest)) => {
                first.filter(request, response, FilterChain::new(rest, self.dispatcher))
            }
            None => Box::pin(self.dispatcher.process(request, response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::dispatcher::RequestTask;
    use crate::http::{Method, StatusCode};
    use crate::route::{Mapping, Route};

    struct Recording {
        label: &'static str,
        order: i32,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Filter for Recording {
        fn filter<'a>(
            &'a self,
            request: &'a Arc<Request>,
            response: &'a Response,
            chain: FilterChain<'a>,
        ) -> BoxFuture<'a, Option<WebError>> {
            Box::pin(async move {
                self.seen.lock().push(self.label);
                chain.do_filter(request, response).await
            })
        }

        fn order(&self) -> i32 {
            self.order
        }
    }

    struct Deny;

    impl Filter for Deny {
        fn filter<'a>(
            &'a self,
            request: &'a Arc<Request>,
            response: &'a Response,
            chain: FilterChain<'a>,
        ) -> BoxFuture<'a, Option<WebError>> {
            Box::pin(async move {
                match request.headers().get("x-deny") {
                    Some("send") => {
                        response.send(StatusCode::Unauthorized, Some("text/plain"), "denied");
                        None
                    }
                    Some("error") => Some(WebError::Status {
                        status: StatusCode::Forbidden,
                        message: "forbidden".into(),
                    }),
                    Some(_) => None,
                    None => chain.do_filter(request, response).await,
                }
            })
        }
    }

    fn reached() -> Route {
        Route::new(Mapping::get("/")).handle(|request, response| {
            request.attributes().set("reached", true);
            response.set_body("routed");
            Ok(())
        })
    }

    fn denying_dispatcher() -> Dispatcher {
        let dispatcher = Dispatcher::builder().filter(Deny).build();
        dispatcher.route(reached());
        dispatcher
    }

    async fn send_with(dispatcher: &Dispatcher, deny: Option<&str>) -> (Response, Arc<Request>) {
        let mut builder = Request::builder(Method::Get, "/");
        if let Some(deny) = deny {
            builder = builder.header("X-Deny", deny);
        }
        let (task, completion) = RequestTask::new(builder.build());
        dispatcher.service(task.clone()).await;
        assert!(completion.await.is_some());
        (task.response().clone(), Arc::clone(task.request()))
    }

    #[tokio::test]
    async fn filters_run_by_order_before_routing() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = Dispatcher::builder()
            .filter(Recording { label: "late", order: 10, seen: Arc::clone(&seen) })
            .filter(Recording { label: "early", order: -10, seen: Arc::clone(&seen) })
            .filter(Recording { label: "middle", order: 0, seen: Arc::clone(&seen) })
            .build();
        dispatcher.route(reached());

        let (response, request) = send_with(&dispatcher, None).await;
        assert_eq!(*seen.lock(), ["early", "middle", "late"]);
        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(request.attributes().get::<bool>("reached"), Some(true));
    }

    #[tokio::test]
    async fn filter_can_answer_without_routing() {
        let dispatcher = denying_dispatcher();
        let (response, request) = send_with(&dispatcher, Some("send")).await;
        assert!(response.is_committed());
        assert_eq!(response.status(), StatusCode::Unauthorized);
        assert_eq!(&response.body()[..], b"denied");
        assert_eq!(request.attributes().get::<bool>("reached"), None);
    }

    #[tokio::test]
    async fn filter_error_reaches_exception_handlers() {
        let dispatcher = denying_dispatcher();
        let (response, request) = send_with(&dispatcher, Some("error")).await;
        assert!(response.is_committed());
        assert_eq!(response.status(), StatusCode::Forbidden);
        assert_eq!(request.attributes().get::<bool>("reached"), None);
    }

    #[tokio::test]
    async fn silent_short_circuit_still_commits() {
        let dispatcher = denying_dispatcher();
        let (response, request) = send_with(&dispatcher, Some("quiet")).await;
        assert!(response.is_committed());
        assert_eq!(response.status(), StatusCode::Ok);
        assert!(response.body().is_empty());
        assert_eq!(request.attributes().get::<bool>("reached"), None);
    }

    #[tokio::test]
    async fn passing_filter_keeps_pipeline_result() {
        let dispatcher = denying_dispatcher();
        let (response, _) = send_with(&dispatcher, None).await;
        assert_eq!(&response.body()[..], b"routed");
    }
}
