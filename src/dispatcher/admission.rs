//! Load shedding: rejected work and work left over at shutdown.

use std::sync::atomic::Ordering;

use tracing::warn;

use super::{Dispatcher, ErrorBody, RequestTask};
use crate::error::WebError;
use crate::http::{MediaType, StatusCode};

impl Dispatcher {
    /// Refuses a task the transport could not admit.
    ///
    /// Counts the rejection, writes a 429 unless the response is already
    /// committed, and completes the task's promise either way. Safe to call
    /// concurrently with anything else touching the task.
    pub fn handle_rejected_work(&self, task: &RequestTask, reason: &str) {
        let rejected = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(path = task.request().path(), reason, rejected, "request rejected");

        let error = WebError::TooManyRequests(format!("request rejected: {reason}"));
        terminate(task, StatusCode::TooManyRequests, error);
    }

    /// Answers every task still pending at shutdown with a 503 and completes
    /// its promise. Tasks that already committed keep their response.
    pub fn handle_unfinished_works<I>(&self, tasks: I)
    where
        I: IntoIterator<Item = RequestTask>,
    {
        let mut unfinished = 0usize;
        for task in tasks {
            if task.is_done() {
                continue;
            }
            unfinished += 1;
            let error = WebError::Unavailable("server is shutting down".to_owned());
            terminate(&task, StatusCode::ServiceUnavailable, error);
        }
        if unfinished > 0 {
            warn!(unfinished, "completed unfinished requests at shutdown");
        }
    }

    /// Requests rejected since start.
    pub fn reject_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

fn terminate(task: &RequestTask, status: StatusCode, error: WebError) {
    let body = ErrorBody::new(status, error.to_string(), task.request().path()).to_bytes();
    let content_type = MediaType::application_json().to_string();
    task.response().send(status, Some(&content_type), body);
    task.finish(Some(error));
}
