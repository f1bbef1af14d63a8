use bearx::client::OpenError;
use bearx::error::{ActionError, ErrorKind};
use bearx::executor::{ExecuteOptions, Executor, CALLBACK_SOURCE};
use bearx::params::Params;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

fn query_value(url: &str, key: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn note_params() -> Params {
    let mut params = Params::new();
    params.set("id", "7E4B681B");
    params.set("header", "Secondary Title");
    params
}

fn waiting(timeout: Duration) -> ExecuteOptions {
    ExecuteOptions {
        enable_callback: true,
        timeout,
        ..ExecuteOptions::default()
    }
}

/// Plays Bear: after `delay`, calls back on the endpoint named by `route` with `query`.
fn calling_back(
    route: &'static str,
    query: &'static str,
    delay: Duration,
    opened: Arc<Mutex<Vec<String>>>,
) -> impl Fn(&str) -> Result<(), OpenError> {
    move |url: &str| {
        opened.lock().unwrap().push(url.to_string());
        let endpoint = query_value(url, route).expect("callback url in request");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = reqwest::get(&format!("{}?{}", endpoint, query)).await;
        });
        Ok(())
    }
}

async fn refuses_connections(url: &str) -> bool {
    reqwest::get(url).await.is_err()
}

#[tokio::test]
async fn success_callback_becomes_result_data() {
    let opened = Arc::new(Mutex::new(Vec::new()));
    let opener = calling_back(
        "x-success",
        "identifier=ABC&title=Groceries%20list&tags=%5B%22home%22%5D",
        Duration::from_millis(50),
        opened.clone(),
    );
    let executor = Executor::new(opener, waiting(Duration::from_secs(2)));

    let result = executor.execute("open-note", note_params()).await.unwrap();

    assert_eq!(result.action, "open-note");
    let data = result.data.unwrap();
    assert_eq!(data["identifier"], json!("ABC"));
    assert_eq!(data["title"], json!("Groceries list"));
    assert_eq!(data["tags"], json!(["home"]));

    let opened = opened.lock().unwrap();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0], result.url);
    assert_eq!(query_value(&result.url, "x-source").as_deref(), Some(CALLBACK_SOURCE));
    assert!(result.url.contains("header=Secondary%20Title"));
}

#[tokio::test]
async fn error_callback_is_application_error_before_deadline() {
    let opener = calling_back(
        "x-error",
        "errorMessage=bad&errorCode=x-error",
        Duration::from_millis(100),
        Arc::new(Mutex::new(Vec::new())),
    );
    let executor = Executor::new(opener, waiting(Duration::from_secs(2)));

    let started = Instant::now();
    let failure = executor.execute("open-note", note_params()).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        failure.error,
        ActionError::ApplicationError {
            message: "bad".into(),
            code: Some("x-error".into()),
        }
    );
    assert_eq!(failure.action, "open-note");
    assert!(failure.url.starts_with("bear://x-callback-url/open-note?"));
}

#[tokio::test]
async fn missing_callback_times_out_on_schedule() {
    let opener = |_: &str| -> Result<(), OpenError> { Ok(()) };
    let executor = Executor::new(opener, waiting(Duration::from_millis(100)));

    let started = Instant::now();
    let failure = executor.execute("create", Params::new()).await.unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(failure.error.kind(), ErrorKind::Timeout);
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(2));
    let success_url = query_value(&failure.url, "x-success").unwrap();
    assert!(refuses_connections(&success_url).await);
}

#[tokio::test]
async fn override_endpoint_never_waits() {
    let opened = Arc::new(Mutex::new(Vec::new()));
    let recorder = opened.clone();
    let opener = move |url: &str| -> Result<(), OpenError> {
        recorder.lock().unwrap().push(url.to_string());
        Ok(())
    };
    let options = ExecuteOptions {
        callback_override: Some("http://127.0.0.1:9/elsewhere".into()),
        timeout: Duration::from_secs(30),
        ..ExecuteOptions::default()
    };
    let executor = Executor::new(opener, options);

    let started = Instant::now();
    let result = executor.execute("create", Params::new()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(result.data, None);
    assert_eq!(
        query_value(&result.url, "x-success").as_deref(),
        Some("http://127.0.0.1:9/elsewhere")
    );
    assert_eq!(
        query_value(&result.url, "x-error").as_deref(),
        Some("http://127.0.0.1:9/elsewhere")
    );
    assert_eq!(opened.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn zero_timeout_is_fire_and_forget() {
    let executor = Executor::new(
        |_: &str| -> Result<(), OpenError> { Ok(()) },
        waiting(Duration::from_secs(0)),
    );

    let result = executor.execute("today", Params::new()).await.unwrap();

    assert_eq!(result.url, "bear://x-callback-url/today");
    assert_eq!(result.data, None);
}

#[tokio::test]
async fn no_callback_wins_over_override() {
    let options = ExecuteOptions {
        no_callback: true,
        callback_override: Some("http://127.0.0.1:9/cb".into()),
        ..ExecuteOptions::default()
    };
    let executor = Executor::new(|_: &str| -> Result<(), OpenError> { Ok(()) }, options);

    let result = executor.execute("tags", Params::new()).await.unwrap();

    assert_eq!(result.url, "bear://x-callback-url/tags");
}

#[tokio::test]
async fn dry_run_builds_url_without_opening() {
    let opener = |_: &str| -> Result<(), OpenError> { panic!("dry run must not open") };
    let options = ExecuteOptions {
        dry_run: true,
        ..waiting(Duration::from_secs(5))
    };
    let executor = Executor::new(opener, options);

    let started = Instant::now();
    let result = executor.execute("/open-note", note_params()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(result.url.starts_with("bear://x-callback-url/open-note?"));
    assert!(result.url.contains("id=7E4B681B"));
    assert_eq!(result.data, None);
    let success_url = query_value(&result.url, "x-success").unwrap();
    assert!(success_url.starts_with("http://127.0.0.1:"));
    assert!(refuses_connections(&success_url).await);
}

#[tokio::test]
async fn launch_failure_is_transport_failure() {
    let opener = |_: &str| -> Result<(), OpenError> {
        Err(OpenError::Other("no handler for bear://".into()))
    };
    let executor = Executor::new(opener, waiting(Duration::from_secs(5)));

    let started = Instant::now();
    let failure = executor.execute("create", Params::new()).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(
        failure.error,
        ActionError::TransportFailure {
            message: "no handler for bear://".into(),
        }
    );
    assert_eq!(failure.error.exit_code(), 4);
    let success_url = query_value(&failure.url, "x-success").unwrap();
    assert!(refuses_connections(&success_url).await);
}
