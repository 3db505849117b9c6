//! Lock-free route lookup with serialized registration.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use super::Route;
use crate::context::PathVariables;
use crate::http::Request;

/// A matched route and the variables its path template captured.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<Route>,
    pub variables: PathVariables,
}

/// Registered routes, read through a snapshot swapped on every registration.
///
/// Matching never locks; registrations serialize among themselves.
#[derive(Default)]
pub struct RouteRegistry {
    routes: ArcSwap<Vec<Arc<Route>>>,
    write: Mutex<()>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, route: Route) {
        let _guard = self.write.lock();
        debug!(mapping = %route.mapping(), "route registered");
        let mut routes = Vec::clone(&self.routes.load());
        routes.push(Arc::new(route));
        self.routes.store(Arc::new(routes));
    }

    /// The current routes, in registration order.
    pub fn routes(&self) -> Arc<Vec<Arc<Route>>> {
        self.routes.load_full()
    }

    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.load().is_empty()
    }

    /// Picks the most specific matching route; ties go to the one with more
    /// media constraints, then to the earliest registered.
    pub fn match_route(&self, request: &Request) -> Option<RouteMatch> {
        let routes = self.routes.load();
        routes
            .iter()
            .enumerate()
            .filter_map(|(position, route)| {
                route.mapping().matches(request).map(|variables| {
                    let rank = (
                        route.mapping().pattern().specificity(),
                        std::cmp::Reverse(route.mapping().media_constraints()),
                        position,
                    );
                    (rank, route, variables)
                })
            })
            .min_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, route, variables)| RouteMatch {
                route: Arc::clone(route),
                variables,
            })
    }
}

impl std::fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("routes", &self.len())
            .finish()
    }
}
