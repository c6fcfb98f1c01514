use std::rc::Rc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::api::retry::{with_retry, RetryOutcome, RetryPolicy, Sleeper, ThreadSleeper};
use crate::api::transport::{ApiRequest, ApiResponse, Transport};
use crate::error::SyncError;
use crate::inventory::normalize::coerce_numeric_fields;
use crate::inventory::types::{Batch, BatchStatus};

pub const LOGIN_PATH: &str = "/api/users/login";
pub const WHOAMI_PATH: &str = "/api/users/me";
pub const STATUS_PATH: &str = "/api/data-process/status";
pub const LOGS_PATH: &str = "/api/data-process/logs";
pub const HEALTH_PATH: &str = "/api/health";
pub const INVENTORY_PATH: &str = "/api/data-process/inventory";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleaningStatus {
    Idle,
    Cleaning,
}

/// Authenticated session against one inventory API.
///
/// Holds the bearer token between calls; every method takes `&mut self` or
/// `&self` on a single thread, there is no internal locking.
pub struct ApiConnection {
    transport: Box<dyn Transport>,
    sleeper: Rc<dyn Sleeper>,
    username: String,
    password: String,
    token: Option<String>,
    retry_policy: RetryPolicy,
    clean_retry_delay: Duration,
    send_timeout: Duration,
}

impl ApiConnection {
    pub fn new(transport: Box<dyn Transport>, username: &str, password: &str) -> Self {
        ApiConnection {
            transport,
            sleeper: Rc::new(ThreadSleeper),
            username: username.to_string(),
            password: password.to_string(),
            token: None,
            retry_policy: RetryPolicy::default(),
            clean_retry_delay: Duration::from_secs(10),
            send_timeout: Duration::from_secs(30),
        }
    }

    #[cfg(test)]
    pub fn with_sleeper(mut self, sleeper: Rc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, SyncError> {
        self.transport.execute(request, self.token.as_deref())
    }

    /// Exchange credentials for a bearer token.
    pub fn login(&mut self) -> Result<(), SyncError> {
        info!("Attempting to login to {}...", self.base_url());

        let request = ApiRequest::post(
            LOGIN_PATH,
            json!({
                "username": self.username,
                "password": self.password,
            }),
        );
        let response = self.transport.execute(&request, None)?;

        if response.is_success() {
            let token = response
                .json()
                .get("token")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| SyncError::Auth("login response carried no token".to_string()))?;
            self.token = Some(token);
            info!("Login successful");
            return Ok(());
        }

        self.token = None;
        warn!("Login failed with status {}", response.status);
        if response.status == 404 {
            return Err(SyncError::EndpointNotFound {
                url: format!("{}{}", self.base_url(), LOGIN_PATH),
            });
        }
        Err(SyncError::Auth(format!(
            "login failed with status {}: {}",
            response.status,
            response.error_message()
        )))
    }

    /// `Ok(false)` when there is no token or the server rejects it.
    pub fn validate_token(&self) -> Result<bool, SyncError> {
        if self.token.is_none() {
            return Ok(false);
        }

        debug!("Validating token...");
        let response = self.execute(&ApiRequest::get(WHOAMI_PATH))?;
        if response.is_success() {
            debug!(user = %response.json(), "Token validation response");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn refresh_token_if_needed(&mut self) -> Result<(), SyncError> {
        match self.validate_token() {
            Ok(true) => Ok(()),
            Ok(false) => {
                info!("Token invalid, refreshing...");
                self.login()
            }
            Err(e) => {
                warn!(error = %e, "Token validation error, logging in again");
                self.login()
            }
        }
    }

    pub fn check_cleaning_status(&self) -> Result<CleaningStatus, SyncError> {
        debug!("Checking cleaning status...");
        let response = self.execute(&ApiRequest::get(STATUS_PATH))?;
        if !response.is_success() {
            return Err(SyncError::Server {
                status: response.status,
                message: format!("failed to check status: {}", response.error_message()),
            });
        }

        let status = response.json();
        debug!(status = %status, "Current status");
        let cleaning = status
            .get("is_cleaning")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(if cleaning {
            CleaningStatus::Cleaning
        } else {
            CleaningStatus::Idle
        })
    }

    /// Poll the status endpoint every `interval` until cleanup finishes or
    /// `timeout` worth of waiting has passed. Errors count as "not done yet".
    pub fn wait_for_cleaning_complete(
        &self,
        timeout: Duration,
        interval: Duration,
    ) -> Result<(), SyncError> {
        let interval = interval.max(Duration::from_secs(1));
        let mut waited = Duration::ZERO;

        while waited < timeout {
            match self.check_cleaning_status() {
                Ok(CleaningStatus::Idle) => return Ok(()),
                Ok(CleaningStatus::Cleaning) => info!("System is currently cleaning logs"),
                Err(e) => warn!(error = %e, "Error checking status"),
            }

            info!("Waiting {} seconds before next check...", interval.as_secs());
            self.sleeper.sleep(interval);
            waited += interval;
        }

        Err(SyncError::CleaningTimeout {
            waited_secs: waited.as_secs(),
        })
    }

    /// Delete the server's processing logs. A 500 gets one more try after a pause.
    pub fn clean_logs(&self) -> Result<(), SyncError> {
        info!("Cleaning up processing logs...");
        let request = ApiRequest::delete(LOGS_PATH);

        let mut response = self.execute(&request)?;
        if response.status == 500 {
            info!(
                "Server busy, waiting {} seconds before retry...",
                self.clean_retry_delay.as_secs()
            );
            self.sleeper.sleep(self.clean_retry_delay);
            response = self.execute(&request)?;
        }

        if response.is_success() {
            info!("Logs cleaned successfully");
            Ok(())
        } else {
            Err(SyncError::Server {
                status: response.status,
                message: format!("failed to clean logs: {}", response.error_message()),
            })
        }
    }

    /// Current processing logs, or an empty object if they cannot be fetched.
    pub fn check_logs(&self) -> Value {
        debug!("Checking processing logs...");
        match self.execute(&ApiRequest::get(LOGS_PATH)) {
            Ok(response) if response.is_success() => response.json(),
            Ok(response) => {
                warn!("Failed to get logs: {}", response.status);
                Value::Object(Map::new())
            }
            Err(e) => {
                warn!(error = %e, "Error checking logs");
                Value::Object(Map::new())
            }
        }
    }

    /// Processing state of one batch; `None` when the server has no record of it.
    pub fn batch_status(&self, batch_id: &str) -> Result<Option<BatchStatus>, SyncError> {
        let response = self.execute(&ApiRequest::get(format!("{}/{}", STATUS_PATH, batch_id)))?;
        match response.status {
            404 => Ok(None),
            _ if response.is_success() => {
                let body = response.json();
                let status = body.get("status").cloned().unwrap_or(body);
                Ok(Some(serde_json::from_value(status)?))
            }
            status => Err(SyncError::Server {
                status,
                message: response.error_message(),
            }),
        }
    }

    /// Post `batch` to the inventory endpoint with retry and backoff.
    pub fn send_data(&mut self, batch: &mut Batch) -> RetryOutcome<Value> {
        let policy = self.retry_policy;
        let sleeper = Rc::clone(&self.sleeper);
        let outcome = with_retry(&policy, sleeper.as_ref(), || self.attempt_send(batch));

        if outcome.is_success() {
            info!(batch_id = %batch.batch_id, attempts = outcome.attempts(), "Request successful");
        } else {
            warn!(batch_id = %batch.batch_id, attempts = outcome.attempts(), "Giving up on batch");
        }
        outcome
    }

    fn attempt_send(&mut self, batch: &mut Batch) -> Result<Value, SyncError> {
        self.refresh_token_if_needed()
            .map_err(|e| SyncError::Auth(format!("Authentication failed: {}", e)))?;

        debug!("Checking server status...");
        let health = self.execute(&ApiRequest::get(HEALTH_PATH))?;
        if !health.is_success() {
            return Err(SyncError::Server {
                status: health.status,
                message: "Server is not healthy".to_string(),
            });
        }

        coerce_numeric_fields(&mut batch.items);
        let body = serde_json::to_value(&*batch)?;
        debug!(body = %body, "Sending request");

        let request = ApiRequest::post(INVENTORY_PATH, body).with_timeout(self.send_timeout);
        let response = self.execute(&request)?;
        info!("Response status code: {}", response.status);

        if response.is_success() {
            return Ok(response.json());
        }

        let error = SyncError::from_server_message(response.status, response.error_message());
        if let SyncError::TransientServer(_) = error {
            warn!("Server transaction error detected");
        }
        Err(error)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::retry::tests::RecordingSleeper;
    use crate::inventory::batch::prepare_batch;
    use reqwest::Method;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};

    #[derive(Debug, Clone)]
    pub(crate) struct Call {
        pub method: Method,
        pub path: String,
        pub token: Option<String>,
        pub body: Option<Value>,
        pub timeout: Option<Duration>,
    }

    type Scripted = Result<ApiResponse, String>;

    #[derive(Default)]
    struct FakeState {
        routes: HashMap<(Method, String), VecDeque<Scripted>>,
        calls: Vec<Call>,
    }

    /// Scripted responses per route; the last one for a route repeats.
    #[derive(Clone, Default)]
    pub(crate) struct FakeTransport {
        state: Rc<RefCell<FakeState>>,
    }

    impl FakeTransport {
        pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
            self.push(method, path, Ok(ApiResponse { status, body: body.to_string() }))
        }

        pub fn fail(&self, method: Method, path: &str, message: &str) -> &Self {
            self.push(method, path, Err(message.to_string()))
        }

        fn push(&self, method: Method, path: &str, scripted: Scripted) -> &Self {
            self.state
                .borrow_mut()
                .routes
                .entry((method, path.to_string()))
                .or_default()
                .push_back(scripted);
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.state.borrow().calls.clone()
        }

        pub fn count(&self, method: Method, path: &str) -> usize {
            self.state
                .borrow()
                .calls
                .iter()
                .filter(|c| c.method == method && c.path == path)
                .count()
        }
    }

    impl Transport for FakeTransport {
        fn execute(&self, request: &ApiRequest, token: Option<&str>) -> Result<ApiResponse, SyncError> {
            let mut state = self.state.borrow_mut();
            state.calls.push(Call {
                method: request.method.clone(),
                path: request.path.clone(),
                token: token.map(str::to_string),
                body: request.body.clone(),
                timeout: request.timeout,
            });

            let key = (request.method.clone(), request.path.clone());
            let scripted = match state.routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            };

            match scripted {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(SyncError::Transport(message)),
                None => Ok(ApiResponse {
                    status: 404,
                    body: json!({"error": "Not found"}).to_string(),
                }),
            }
        }

        fn base_url(&self) -> &str {
            "http://inventory.test"
        }
    }

    fn connection(fake: &FakeTransport) -> (ApiConnection, Rc<RecordingSleeper>) {
        let sleeper = Rc::new(RecordingSleeper::default());
        let conn = ApiConnection::new(Box::new(fake.clone()), "admin", "secret")
            .with_sleeper(sleeper.clone());
        (conn, sleeper)
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    fn logged_in_fake() -> FakeTransport {
        let fake = FakeTransport::default();
        fake.respond(Method::POST, LOGIN_PATH, 200, json!({"token": "tok-1"}));
        fake.respond(Method::GET, WHOAMI_PATH, 200, json!({"username": "admin"}));
        fake.respond(Method::GET, HEALTH_PATH, 200, json!({"status": "ok"}));
        fake
    }

    fn sample_batch() -> Batch {
        prepare_batch(
            &json!([{
                "serialnumber": "TEST123",
                "manufacturer": "Dell",
                "model": "Latitude 5420",
                "ram_gb": 16,
                "disks": "SSD:512GB:Samsung EVO"
            }]),
            "python_sync",
        )
        .unwrap()
    }

    #[test]
    fn test_login_stores_token_and_sends_credentials() {
        let fake = logged_in_fake();
        let (mut conn, _) = connection(&fake);

        conn.login().unwrap();
        assert_eq!(conn.token(), Some("tok-1"));

        let calls = fake.calls();
        assert_eq!(calls[0].token, None);
        assert_eq!(
            calls[0].body,
            Some(json!({"username": "admin", "password": "secret"}))
        );

        assert!(conn.validate_token().unwrap());
        assert_eq!(fake.calls()[1].token.as_deref(), Some("tok-1"));
    }

    #[test]
    fn test_login_404_reports_endpoint() {
        let fake = FakeTransport::default();
        let (mut conn, _) = connection(&fake);

        match conn.login() {
            Err(SyncError::EndpointNotFound { url }) => {
                assert_eq!(url, "http://inventory.test/api/users/login")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_login_rejected_credentials() {
        let fake = FakeTransport::default();
        fake.respond(Method::POST, LOGIN_PATH, 401, json!({"error": "Invalid credentials"}));
        let (mut conn, _) = connection(&fake);

        assert!(matches!(conn.login(), Err(SyncError::Auth(_))));
        assert_eq!(conn.token(), None);
    }

    #[test]
    fn test_login_transport_failure() {
        let fake = FakeTransport::default();
        fake.fail(Method::POST, LOGIN_PATH, "connection refused");
        let (mut conn, _) = connection(&fake);

        assert!(matches!(conn.login(), Err(SyncError::Transport(_))));
    }

    #[test]
    fn test_validate_without_token_skips_network() {
        let fake = logged_in_fake();
        let (conn, _) = connection(&fake);

        assert!(!conn.validate_token().unwrap());
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn test_refresh_relogs_when_token_rejected() {
        let fake = FakeTransport::default();
        fake.respond(Method::POST, LOGIN_PATH, 200, json!({"token": "tok-1"}));
        fake.respond(Method::POST, LOGIN_PATH, 200, json!({"token": "tok-2"}));
        fake.respond(Method::GET, WHOAMI_PATH, 401, json!({"error": "expired"}));
        let (mut conn, _) = connection(&fake);

        conn.login().unwrap();
        conn.refresh_token_if_needed().unwrap();
        assert_eq!(conn.token(), Some("tok-2"));
        assert_eq!(fake.count(Method::POST, LOGIN_PATH), 2);
    }

    #[test]
    fn test_cleaning_status_values() {
        let fake = FakeTransport::default();
        fake.respond(Method::GET, STATUS_PATH, 200, json!({"is_cleaning": true}));
        fake.respond(Method::GET, STATUS_PATH, 200, json!({"is_cleaning": false}));
        let (conn, _) = connection(&fake);

        assert_eq!(conn.check_cleaning_status().unwrap(), CleaningStatus::Cleaning);
        assert_eq!(conn.check_cleaning_status().unwrap(), CleaningStatus::Idle);
    }

    #[test]
    fn test_wait_for_cleaning_polls_until_idle() {
        let fake = FakeTransport::default();
        fake.respond(Method::GET, STATUS_PATH, 200, json!({"is_cleaning": true}));
        fake.fail(Method::GET, STATUS_PATH, "timed out");
        fake.respond(Method::GET, STATUS_PATH, 200, json!({"is_cleaning": false}));
        let (conn, sleeper) = connection(&fake);

        conn.wait_for_cleaning_complete(Duration::from_secs(60), Duration::from_secs(5))
            .unwrap();
        assert_eq!(*sleeper.waits.borrow(), secs(&[5, 5]));
        assert_eq!(fake.count(Method::GET, STATUS_PATH), 3);
    }

    #[test]
    fn test_wait_for_cleaning_times_out() {
        let fake = FakeTransport::default();
        fake.respond(Method::GET, STATUS_PATH, 200, json!({"is_cleaning": true}));
        let (conn, sleeper) = connection(&fake);

        let err = conn
            .wait_for_cleaning_complete(Duration::from_secs(10), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, SyncError::CleaningTimeout { waited_secs: 10 }));
        assert_eq!(*sleeper.waits.borrow(), secs(&[5, 5]));
    }

    #[test]
    fn test_clean_logs_retries_once_on_500() {
        let fake = FakeTransport::default();
        fake.respond(Method::DELETE, LOGS_PATH, 500, json!({"error": "busy"}));
        fake.respond(Method::DELETE, LOGS_PATH, 200, json!({"success": true}));
        let (conn, sleeper) = connection(&fake);

        conn.clean_logs().unwrap();
        assert_eq!(fake.count(Method::DELETE, LOGS_PATH), 2);
        assert_eq!(*sleeper.waits.borrow(), secs(&[10]));
    }

    #[test]
    fn test_clean_logs_gives_up_after_second_500() {
        let fake = FakeTransport::default();
        fake.respond(Method::DELETE, LOGS_PATH, 500, json!({"error": "busy"}));
        let (conn, _) = connection(&fake);

        assert!(matches!(
            conn.clean_logs(),
            Err(SyncError::Server { status: 500, .. })
        ));
        assert_eq!(fake.count(Method::DELETE, LOGS_PATH), 2);
    }

    #[test]
    fn test_clean_logs_other_failure_not_retried() {
        let fake = FakeTransport::default();
        fake.respond(Method::DELETE, LOGS_PATH, 403, json!({"error": "forbidden"}));
        let (conn, sleeper) = connection(&fake);

        assert!(conn.clean_logs().is_err());
        assert_eq!(fake.count(Method::DELETE, LOGS_PATH), 1);
        assert!(sleeper.waits.borrow().is_empty());
    }

    #[test]
    fn test_check_logs_empty_on_failure() {
        let fake = FakeTransport::default();
        fake.fail(Method::GET, LOGS_PATH, "connection reset");
        let (conn, _) = connection(&fake);
        assert_eq!(conn.check_logs(), json!({}));

        let fake = FakeTransport::default();
        fake.respond(Method::GET, LOGS_PATH, 500, json!({"error": "boom"}));
        let (conn, _) = connection(&fake);
        assert_eq!(conn.check_logs(), json!({}));
    }

    #[test]
    fn test_check_logs_returns_body() {
        let fake = FakeTransport::default();
        fake.respond(Method::GET, LOGS_PATH, 200, json!({"logs": [{"batch_id": "SYNC_1"}]}));
        let (conn, _) = connection(&fake);
        assert_eq!(conn.check_logs()["logs"][0]["batch_id"], "SYNC_1");
    }

    #[test]
    fn test_batch_status_lookup() {
        let fake = FakeTransport::default();
        fake.respond(
            Method::GET,
            "/api/data-process/status/SYNC_20250219144551",
            200,
            json!({"success": true, "status": {"batch_id": "SYNC_20250219144551", "status": "completed", "processed_count": 1}}),
        );
        let (conn, _) = connection(&fake);

        let status = conn.batch_status("SYNC_20250219144551").unwrap().unwrap();
        assert_eq!(status.status.as_deref(), Some("completed"));
        assert_eq!(status.processed_count, Some(1));

        assert!(conn.batch_status("SYNC_unknown").unwrap().is_none());
    }

    #[test]
    fn test_send_data_success() {
        let fake = logged_in_fake();
        fake.respond(Method::POST, INVENTORY_PATH, 200, json!({"success": true, "processed": 1}));
        let (mut conn, sleeper) = connection(&fake);
        let mut batch = sample_batch();

        let outcome = conn.send_data(&mut batch);
        assert_eq!(
            outcome,
            RetryOutcome::Succeeded {
                value: json!({"success": true, "processed": 1}),
                attempts: 1
            }
        );
        assert!(sleeper.waits.borrow().is_empty());

        let post = fake
            .calls()
            .into_iter()
            .find(|c| c.path == INVENTORY_PATH)
            .unwrap();
        assert_eq!(post.token.as_deref(), Some("tok-1"));
        assert_eq!(post.timeout, Some(Duration::from_secs(30)));
        let body = post.body.unwrap();
        assert_eq!(body["metadata"]["checksum"], batch.metadata.checksum);
        assert_eq!(body["items"][0]["ram_gb"], 16.0);
        assert_eq!(body["items"][0]["disks"][0]["size_gb"], 512.0);
    }

    #[test]
    fn test_send_data_retries_transaction_abort() {
        let fake = logged_in_fake();
        fake.respond(
            Method::POST,
            INVENTORY_PATH,
            500,
            json!({"error": "current transaction is aborted, commands ignored until end of transaction block"}),
        );
        fake.respond(Method::POST, INVENTORY_PATH, 200, json!({"success": true}));
        let (mut conn, sleeper) = connection(&fake);

        let outcome = conn.send_data(&mut sample_batch());
        assert!(outcome.is_success());
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(*sleeper.waits.borrow(), secs(&[10, 20]));
        assert_eq!(fake.count(Method::POST, INVENTORY_PATH), 2);
    }

    #[test]
    fn test_send_data_schema_error_is_fatal() {
        let fake = logged_in_fake();
        fake.respond(
            Method::POST,
            INVENTORY_PATH,
            500,
            json!({"error": "column \"battery\" does not exist"}),
        );
        let (mut conn, sleeper) = connection(&fake);

        let outcome = conn.send_data(&mut sample_batch());
        match outcome {
            RetryOutcome::Failed { error, attempts } => {
                assert_eq!(attempts, 1);
                assert!(error.starts_with("Database schema error"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(fake.count(Method::POST, INVENTORY_PATH), 1);
        assert!(sleeper.waits.borrow().is_empty());
    }

    #[test]
    fn test_send_data_unhealthy_server() {
        let fake = FakeTransport::default();
        fake.respond(Method::POST, LOGIN_PATH, 200, json!({"token": "tok-1"}));
        fake.respond(Method::GET, WHOAMI_PATH, 200, json!({}));
        fake.respond(Method::GET, HEALTH_PATH, 503, json!({"status": "down"}));
        let (mut conn, sleeper) = connection(&fake);

        let outcome = conn.send_data(&mut sample_batch());
        assert_eq!(
            outcome,
            RetryOutcome::Failed {
                error: "Server returned HTTP 503: Server is not healthy".to_string(),
                attempts: 2
            }
        );
        assert_eq!(*sleeper.waits.borrow(), secs(&[20]));
        assert_eq!(fake.count(Method::POST, INVENTORY_PATH), 0);
    }

    #[test]
    fn test_send_data_logs_in_when_no_token() {
        let fake = logged_in_fake();
        fake.respond(Method::POST, INVENTORY_PATH, 200, json!({"success": true}));
        let (mut conn, _) = connection(&fake);

        assert!(conn.send_data(&mut sample_batch()).is_success());
        assert_eq!(fake.count(Method::POST, LOGIN_PATH), 1);
        assert_eq!(conn.token(), Some("tok-1"));
    }
}
