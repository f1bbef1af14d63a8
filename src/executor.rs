use crate::callback::{CallbackListener, CallbackOutcome, ListenerError};
use crate::client::UrlOpener;
use crate::error::{ActionError, ExecutionFailure, DEFAULT_APPLICATION_ERROR};
use crate::params::Params;
use crate::x_callback_url::{build_url, XCallbackUrl, BEAR_SCHEME};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Value of `x-source` on every request that asks for a callback.
pub const CALLBACK_SOURCE: &str = "bearx";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How an action is dispatched. Mutually exclusive flags are validated by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub enable_callback: bool,
    pub no_callback: bool,
    /// Endpoint that receives both `x-success` and `x-error`; no local listener is started.
    pub callback_override: Option<String>,
    /// How long to wait for the callback. Zero never waits.
    pub timeout: Duration,
    pub dry_run: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        ExecuteOptions {
            enable_callback: false,
            no_callback: false,
            callback_override: None,
            timeout: DEFAULT_TIMEOUT,
            dry_run: false,
        }
    }
}

impl ExecuteOptions {
    pub fn callback_enabled(&self) -> bool {
        !self.no_callback && (self.enable_callback || self.callback_override.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub action: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

/// Dispatches actions to Bear and turns the asynchronous callback into a result.
pub struct Executor<O> {
    opener: O,
    options: ExecuteOptions,
}

impl<O: UrlOpener> Executor<O> {
    pub fn new(opener: O, options: ExecuteOptions) -> Self {
        Executor { opener, options }
    }

    pub async fn execute(
        &self,
        action: &str,
        params: Params,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let mut listener = None;
        let mut routing = None;

        if self.options.callback_enabled() {
            if let Some(endpoint) = &self.options.callback_override {
                routing = Some((endpoint.clone(), endpoint.clone()));
            } else if !self.options.timeout.is_zero() {
                let started = CallbackListener::start().await.map_err(|err| {
                    ExecutionFailure::new(
                        action,
                        build_url(action, &params),
                        ActionError::LocalSetupFailure {
                            message: err.to_string(),
                        },
                    )
                })?;
                routing = Some((
                    started.success_url().to_string(),
                    started.error_url().to_string(),
                ));
                listener = Some(started);
            }
        }

        let mut request = XCallbackUrl::with_params(BEAR_SCHEME, action, params);
        if let Some((success_url, error_url)) = routing {
            request.set_callback(&success_url, &error_url, CALLBACK_SOURCE);
        }

        let mut result = ExecutionResult {
            action: action.to_string(),
            url: request.to_string(),
            data: None,
        };

        if self.options.dry_run {
            debug!(url = %result.url, "dry run, not opening");
            teardown(&mut listener).await;
            return Ok(result);
        }

        // Blocks until `open` returns; the listener keeps accepting in the background.
        if let Err(err) = self.opener.open(&result.url) {
            teardown(&mut listener).await;
            return Err(ExecutionFailure::new(
                action,
                &result.url,
                ActionError::TransportFailure {
                    message: err.to_string(),
                },
            ));
        }
        info!(action = %action, "opened bear url");

        let mut listener = match listener {
            Some(listener) => listener,
            None => return Ok(result),
        };

        debug!(timeout = ?self.options.timeout, "waiting for callback");
        let outcome = listener
            .wait(self.options.timeout)
            .await
            .map_err(|err| ExecutionFailure::new(action, &result.url, classify_wait_error(err)))?;

        match outcome {
            CallbackOutcome::Failure { payload } => Err(ExecutionFailure::new(
                action,
                &result.url,
                application_error(&payload),
            )),
            CallbackOutcome::Success { payload } => {
                result.data = Some(payload.to_data());
                Ok(result)
            }
        }
    }
}

async fn teardown(listener: &mut Option<CallbackListener>) {
    if let Some(listener) = listener {
        listener.shutdown().await;
    }
}

fn classify_wait_error(err: ListenerError) -> ActionError {
    match err {
        ListenerError::DeadlineExceeded(_) => ActionError::Timeout,
        other => ActionError::LocalSetupFailure {
            message: other.to_string(),
        },
    }
}

fn application_error(payload: &Params) -> ActionError {
    let field = |key: &str| {
        payload
            .get(key)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    ActionError::ApplicationError {
        message: field("errorMessage").unwrap_or_else(|| DEFAULT_APPLICATION_ERROR.to_string()),
        code: field("errorCode"),
    }
}
