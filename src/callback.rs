//! Single-use loopback HTTP endpoint that receives Bear's `x-success` / `x-error` callback.

use crate::params::Params;
use axum::extract::{RawQuery, State};
use axum::routing::get;
use axum::Router;
use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const RELATIVE_PATH_SUCCESS: &str = "success";
const RELATIVE_PATH_ERROR: &str = "error";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Success { payload: Params },
    Failure { payload: Params },
}

impl CallbackOutcome {
    pub fn payload(&self) -> &Params {
        match self {
            CallbackOutcome::Success { payload } => payload,
            CallbackOutcome::Failure { payload } => payload,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallbackOutcome::Success { .. })
    }
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to start callback listener: {0}")]
    Bind(#[source] io::Error),
    #[error("callback timed out after {0:?}")]
    DeadlineExceeded(Duration),
    #[error("callback listener closed before a result arrived")]
    Closed,
}

/// Publish-once slot shared by both handlers. Taking the sender out of the slot is the
/// gate: whichever hit takes it publishes, every later hit finds `None`.
struct Completion {
    sender: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
}

impl Completion {
    fn new(sender: oneshot::Sender<CallbackOutcome>) -> Self {
        Completion {
            sender: Mutex::new(Some(sender)),
        }
    }

    fn publish(&self, outcome: CallbackOutcome) -> Publish {
        let sender = match self.sender.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(sender) => match sender.send(outcome) {
                Ok(()) => Publish::Delivered,
                Err(_) => Publish::NoWaiter,
            },
            None => Publish::AlreadyCompleted,
        }
    }
}

/// What happened to a single callback hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Publish {
    Delivered,
    /// An earlier hit already completed the request.
    AlreadyCompleted,
    /// The waiter gave up before this hit arrived.
    NoWaiter,
}

fn log_publish(kind: &str, publish: Publish) {
    match publish {
        Publish::Delivered => debug!(kind, "callback received"),
        Publish::AlreadyCompleted => debug!(kind, "ignoring repeated callback"),
        Publish::NoWaiter => debug!(kind, "callback arrived after the waiter stopped"),
    }
}

pub struct CallbackListener {
    base_url: String,
    success_url: String,
    error_url: String,
    outcome: Option<oneshot::Receiver<CallbackOutcome>>,
    stop: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Binds an OS-assigned loopback port and starts serving in the background.
    pub async fn start() -> Result<CallbackListener, ListenerError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(ListenerError::Bind)?;
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        let base_url = format!("http://{}", addr);

        let (outcome_tx, outcome_rx) = oneshot::channel();
        let router = Router::new()
            .route(&format!("/{}", RELATIVE_PATH_SUCCESS), get(handle_success))
            .route(&format!("/{}", RELATIVE_PATH_ERROR), get(handle_error))
            .with_state(Arc::new(Completion::new(outcome_tx)));

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let shutdown = async move {
                let _ = stop_rx.await;
            };
            if let Err(err) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(%err, "callback listener stopped with an error");
            }
        });

        debug!(%base_url, "callback listener started");
        Ok(CallbackListener {
            success_url: format!("{}/{}", base_url, RELATIVE_PATH_SUCCESS),
            error_url: format!("{}/{}", base_url, RELATIVE_PATH_ERROR),
            base_url,
            outcome: Some(outcome_rx),
            stop: Some(stop_tx),
            server: Some(server),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn success_url(&self) -> &str {
        &self.success_url
    }

    pub fn error_url(&self) -> &str {
        &self.error_url
    }

    /// Waits for the first callback or until `deadline` elapses, then shuts the listener down.
    ///
    /// One-shot: a second call returns [`ListenerError::Closed`].
    pub async fn wait(&mut self, deadline: Duration) -> Result<CallbackOutcome, ListenerError> {
        let result = match self.outcome.take() {
            Some(outcome) => match tokio::time::timeout(deadline, outcome).await {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(_)) => Err(ListenerError::Closed),
                Err(_) => Err(ListenerError::DeadlineExceeded(deadline)),
            },
            None => Err(ListenerError::Closed),
        };
        self.shutdown().await;
        result
    }

    /// Stops the server and closes the socket. Idempotent.
    pub async fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let mut server = match self.server.take() {
            Some(server) => server,
            None => return,
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%err, "callback listener task failed"),
            Err(_) => {
                warn!(base_url = %self.base_url, "callback listener did not stop in time, aborting");
                server.abort();
            }
        }
        debug!(base_url = %self.base_url, "callback listener stopped");
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

async fn handle_success(
    State(completion): State<Arc<Completion>>,
    RawQuery(query): RawQuery,
) -> &'static str {
    let payload = Params::from_query(query.as_deref().unwrap_or(""));
    log_publish("success", completion.publish(CallbackOutcome::Success { payload }));
    "ok"
}

async fn handle_error(
    State(completion): State<Arc<Completion>>,
    RawQuery(query): RawQuery,
) -> &'static str {
    let payload = Params::from_query(query.as_deref().unwrap_or(""));
    log_publish("error", completion.publish(CallbackOutcome::Failure { payload }));
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    async fn hit(url: &str) -> reqwest::StatusCode {
        reqwest::get(url).await.unwrap().status()
    }

    #[test]
    fn publish_distinguishes_repeat_from_missing_waiter() {
        let (tx, rx) = oneshot::channel();
        let completion = Completion::new(tx);
        drop(rx);
        assert_eq!(
            completion.publish(CallbackOutcome::Success { payload: Params::new() }),
            Publish::NoWaiter
        );
        assert_eq!(
            completion.publish(CallbackOutcome::Success { payload: Params::new() }),
            Publish::AlreadyCompleted
        );

        let (tx, mut rx) = oneshot::channel();
        let completion = Completion::new(tx);
        assert_eq!(
            completion.publish(CallbackOutcome::Failure { payload: Params::new() }),
            Publish::Delivered
        );
        assert_eq!(
            completion.publish(CallbackOutcome::Success { payload: Params::new() }),
            Publish::AlreadyCompleted
        );
        assert!(matches!(rx.try_recv(), Ok(CallbackOutcome::Failure { .. })));
    }

    #[tokio::test]
    async fn start_returns_loopback_urls() {
        let mut listener = CallbackListener::start().await.unwrap();

        assert!(listener.base_url().starts_with("http://127.0.0.1:"));
        assert_eq!(
            listener.success_url(),
            format!("{}/success", listener.base_url())
        );
        assert_eq!(listener.error_url(), format!("{}/error", listener.base_url()));

        listener.shutdown().await;
    }

    #[tokio::test]
    async fn success_hit_resolves_with_payload() {
        let mut listener = CallbackListener::start().await.unwrap();
        let url = format!("{}?identifier=XYZ&title=A%20B", listener.success_url());

        assert_eq!(hit(&url).await, reqwest::StatusCode::OK);

        let outcome = listener.wait(Duration::from_secs(2)).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.payload().get("identifier"), Some("XYZ"));
        assert_eq!(outcome.payload().get("title"), Some("A B"));
    }

    #[tokio::test]
    async fn first_hit_wins_and_later_hits_are_acknowledged() {
        let mut listener = CallbackListener::start().await.unwrap();
        let first = format!("{}?identifier=first", listener.success_url());
        let second = format!("{}?errorMessage=late", listener.error_url());
        let third = format!("{}?identifier=third", listener.success_url());

        assert_eq!(hit(&first).await, reqwest::StatusCode::OK);
        assert_eq!(hit(&second).await, reqwest::StatusCode::OK);
        assert_eq!(hit(&third).await, reqwest::StatusCode::OK);

        let outcome = listener.wait(Duration::from_secs(2)).await.unwrap();
        assert_eq!(
            outcome,
            CallbackOutcome::Success {
                payload: Params::from_query("identifier=first")
            }
        );
    }

    #[tokio::test]
    async fn error_first_resolves_failure() {
        let mut listener = CallbackListener::start().await.unwrap();
        let error = format!("{}?errorMessage=bad&errorCode=x-error", listener.error_url());
        let success = format!("{}?identifier=later", listener.success_url());

        hit(&error).await;
        hit(&success).await;

        let outcome = listener.wait(Duration::from_secs(2)).await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.payload().get("errorMessage"), Some("bad"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_hits_publish_exactly_once() {
        let mut listener = CallbackListener::start().await.unwrap();
        let mut hits = Vec::new();
        for i in 0..16 {
            let url = if i % 2 == 0 {
                format!("{}?n={}", listener.success_url(), i)
            } else {
                format!("{}?n={}", listener.error_url(), i)
            };
            hits.push(tokio::spawn(async move { hit(&url).await }));
        }
        for handle in hits {
            assert_eq!(handle.await.unwrap(), reqwest::StatusCode::OK);
        }

        let outcome = listener.wait(Duration::from_secs(2)).await.unwrap();
        let n: usize = outcome.payload().get("n").unwrap().parse().unwrap();
        assert_eq!(outcome.is_success(), n % 2 == 0);
        assert_eq!(outcome.payload().get_all("n").len(), 1);
    }

    #[tokio::test]
    async fn wait_times_out_and_tears_down() {
        let mut listener = CallbackListener::start().await.unwrap();
        let success_url = listener.success_url().to_string();

        let started = Instant::now();
        let result = listener.wait(Duration::from_millis(100)).await;

        assert!(matches!(result, Err(ListenerError::DeadlineExceeded(_))));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(reqwest::get(&success_url).await.is_err());
    }

    #[tokio::test]
    async fn second_wait_reports_closed() {
        let mut listener = CallbackListener::start().await.unwrap();
        let _ = listener.wait(Duration::from_millis(10)).await;

        let again = listener.wait(Duration::from_millis(10)).await;
        assert!(matches!(again, Err(ListenerError::Closed)));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_without_wait() {
        let mut listener = CallbackListener::start().await.unwrap();
        let base_url = listener.base_url().to_string();

        listener.shutdown().await;
        listener.shutdown().await;

        assert!(reqwest::get(&format!("{}/success", base_url)).await.is_err());
    }
}
