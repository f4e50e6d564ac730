//! DevTools-protocol implementation of the interaction surface.
//!
//! One [`CdpSurface`] wraps one page target: a WebSocket carrying
//! id-correlated JSON-RPC commands, with a background task reading
//! responses. Element-level operations run as `Runtime.evaluate` calls
//! against a page-side handle registry (`window.__tcRefs`), so the rest of
//! the crate only ever sees opaque [`ElementRef`] ids.
//!
//! [`CdpProvider`] owns the browser side: it either launches the configured
//! binary with a remote-debugging port or attaches to an existing DevTools
//! HTTP endpoint, mints page targets through `/json/new`, and applies the
//! persisted session blob (cookies) to each fresh handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{Mutex, oneshot};
use tokio_tungstenite::tungstenite::Message;

use crate::config::BrowserConfig;
use crate::error::SurfaceError;
use crate::retry::{self, RetryPolicy};
use crate::session::SessionState;
use crate::surface::{ElementRef, Surface, SurfaceProvider};

/// How often element-wait loops re-check the page.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default bound for commands that carry no explicit timeout.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Quote a string for safe embedding in a JavaScript expression.
fn js_quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Virtual key code for the small set of named keys the system sends.
fn key_code(key: &str) -> i64 {
    match key {
        "Enter" => 13,
        "Tab" => 9,
        "Escape" => 27,
        _ => 0,
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

// ---------------------------------------------------------------------------
// CdpSurface
// ---------------------------------------------------------------------------

/// A single page target driven over the DevTools protocol.
pub struct CdpSurface {
    next_id: AtomicU64,
    pending: PendingMap,
    writer: Mutex<
        futures::stream::SplitSink<
            tokio_tungstenite::WebSocketStream<
                tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
            >,
            Message,
        >,
    >,
    reader_handle: tokio::task::JoinHandle<()>,
    closed: AtomicBool,
}

impl CdpSurface {
    /// Connect to a page target's WebSocket debugger URL.
    pub async fn connect(ws_url: &str) -> Result<Self, SurfaceError> {
        let (stream, _) = tokio_tungstenite::connect_async(ws_url).await.map_err(|e| {
            SurfaceError::Connection {
                endpoint: ws_url.to_string(),
                reason: e.to_string(),
            }
        })?;
        let (writer, mut reader) = stream.split();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let pending_for_reader = Arc::clone(&pending);
        let reader_handle = tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                let Ok(Message::Text(text)) = frame else {
                    continue;
                };
                let Ok(value) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                // Responses carry an id; events do not and are not needed.
                if let Some(id) = value.get("id").and_then(Value::as_u64)
                    && let Some(tx) = pending_for_reader.lock().await.remove(&id)
                {
                    let _ = tx.send(value);
                }
            }
        });

        tracing::debug!(url = ws_url, "page target connected");
        Ok(Self {
            next_id: AtomicU64::new(1),
            pending,
            writer: Mutex::new(writer),
            reader_handle,
            closed: AtomicBool::new(false),
        })
    }

    /// Send a command and wait for its correlated response.
    async fn send(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, SurfaceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SurfaceError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = json!({ "id": id, "method": method, "params": params }).to_string();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        self.writer
            .lock()
            .await
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| SurfaceError::Protocol {
                detail: format!("{method} send failed: {e}"),
            })?;

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(SurfaceError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(SurfaceError::Timeout {
                    operation: "command",
                    timeout,
                });
            }
        };

        if let Some(error) = response.get("error") {
            return Err(SurfaceError::Protocol {
                detail: format!("{method}: {error}"),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Evaluate a JavaScript expression, returning its JSON value.
    async fn evaluate(&self, expression: &str, timeout: Duration) -> Result<Value, SurfaceError> {
        let result = self
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
                timeout,
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let detail = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str)
                .unwrap_or("unknown exception")
                .to_string();
            return Err(SurfaceError::Protocol { detail });
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Poll `expression` until it evaluates truthy or `timeout` elapses.
    async fn poll_until(
        &self,
        operation: &'static str,
        expression: &str,
        timeout: Duration,
    ) -> Result<(), SurfaceError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.evaluate(expression, COMMAND_TIMEOUT.min(timeout)).await {
                Ok(Value::Bool(true)) => return Ok(()),
                // Falsy or a transient evaluation error: keep polling.
                Ok(_) | Err(SurfaceError::Protocol { .. }) => {}
                Err(e) => return Err(e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SurfaceError::Timeout { operation, timeout });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Apply a persisted session blob (cookie import).
    pub(crate) async fn apply_session(&self, session: &SessionState) -> Result<(), SurfaceError> {
        let Some(cookies) = session.data.get("cookies").filter(|c| c.is_array()) else {
            tracing::debug!("session blob carries no cookies, nothing to apply");
            return Ok(());
        };
        self.send("Network.enable", json!({}), COMMAND_TIMEOUT).await?;
        self.send(
            "Network.setCookies",
            json!({ "cookies": cookies }),
            COMMAND_TIMEOUT,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Surface for CdpSurface {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), SurfaceError> {
        let result = self
            .send("Page.navigate", json!({ "url": url }), timeout)
            .await?;
        if let Some(error_text) = result.get("errorText").and_then(Value::as_str)
            && !error_text.is_empty()
        {
            return Err(SurfaceError::Navigation {
                reason: error_text.to_string(),
            });
        }
        self.poll_until(
            "navigate",
            "document.readyState === 'complete' || document.readyState === 'interactive'",
            timeout,
        )
        .await
    }

    async fn reload(&self, timeout: Duration) -> Result<(), SurfaceError> {
        self.send("Page.reload", json!({}), timeout).await?;
        // Give the reload a moment to tear the old document down before the
        // readiness poll can observe the stale one.
        tokio::time::sleep(POLL_INTERVAL).await;
        self.poll_until(
            "reload",
            "document.readyState === 'complete' || document.readyState === 'interactive'",
            timeout,
        )
        .await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), SurfaceError> {
        let expression = format!(
            "document.querySelector({}) !== null",
            js_quote(selector)
        );
        self.poll_until("wait_for", &expression, timeout).await
    }

    async fn is_visible(&self, selector: &str) -> Result<bool, SurfaceError> {
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); \
             return !!el && el.getClientRects().length > 0; }})()",
            js_quote(selector)
        );
        Ok(self.evaluate(&expression, COMMAND_TIMEOUT).await? == Value::Bool(true))
    }

    async fn click(&self, selector: &str) -> Result<(), SurfaceError> {
        let quoted = js_quote(selector);
        let expression = format!(
            "(() => {{ const el = document.querySelector({quoted}); \
             if (!el) return false; el.focus(); el.click(); return true; }})()"
        );
        match self.evaluate(&expression, COMMAND_TIMEOUT).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(SurfaceError::ElementNotFound {
                selector: selector.to_string(),
            }),
        }
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), SurfaceError> {
        let quoted_selector = js_quote(selector);
        let quoted_text = js_quote(text);
        // Handles both form controls (.value) and contenteditable
        // composers (textContent), then fires an input event so the page's
        // own listeners notice the change.
        let expression = format!(
            "(() => {{ const el = document.querySelector({quoted_selector}); \
             if (!el) return false; el.focus(); \
             if ('value' in el) {{ el.value = {quoted_text}; }} \
             else {{ el.textContent = {quoted_text}; }} \
             el.dispatchEvent(new InputEvent('input', {{ bubbles: true }})); \
             return true; }})()"
        );
        match self.evaluate(&expression, COMMAND_TIMEOUT).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(SurfaceError::ElementNotFound {
                selector: selector.to_string(),
            }),
        }
    }

    async fn press_key(&self, selector: &str, key: &str) -> Result<(), SurfaceError> {
        // Focus the element, then deliver the key through the input domain
        // so it is indistinguishable from a hardware keystroke.
        self.click(selector).await?;
        let code = key_code(key);
        let text = if key == "Enter" { "\r" } else { "" };
        self.send(
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyDown",
                "windowsVirtualKeyCode": code,
                "key": key,
                "text": text,
            }),
            COMMAND_TIMEOUT,
        )
        .await?;
        self.send(
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "windowsVirtualKeyCode": code,
                "key": key,
            }),
            COMMAND_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementRef>, SurfaceError> {
        let expression = format!(
            "(() => {{ window.__tcRefs = window.__tcRefs || []; \
             return Array.from(document.querySelectorAll({})).map(el => \
             window.__tcRefs.push(el) - 1); }})()",
            js_quote(selector)
        );
        let value = self.evaluate(&expression, COMMAND_TIMEOUT).await?;
        Ok(ref_ids(&value))
    }

    async fn query_within(
        &self,
        element: ElementRef,
        selector: &str,
    ) -> Result<Vec<ElementRef>, SurfaceError> {
        let expression = format!(
            "(() => {{ const root = (window.__tcRefs || [])[{}]; \
             if (!root) return []; \
             return Array.from(root.querySelectorAll({})).map(el => \
             window.__tcRefs.push(el) - 1); }})()",
            element.0,
            js_quote(selector)
        );
        let value = self.evaluate(&expression, COMMAND_TIMEOUT).await?;
        Ok(ref_ids(&value))
    }

    async fn attribute(
        &self,
        element: ElementRef,
        name: &str,
    ) -> Result<Option<String>, SurfaceError> {
        let expression = format!(
            "(() => {{ const el = (window.__tcRefs || [])[{}]; \
             return el ? el.getAttribute({}) : null; }})()",
            element.0,
            js_quote(name)
        );
        match self.evaluate(&expression, COMMAND_TIMEOUT).await? {
            Value::String(s) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    async fn hover(&self, element: ElementRef) -> Result<(), SurfaceError> {
        let expression = format!(
            "(() => {{ const el = (window.__tcRefs || [])[{}]; \
             if (!el) return false; \
             el.dispatchEvent(new MouseEvent('mouseover', {{ bubbles: true }})); \
             el.dispatchEvent(new MouseEvent('mouseenter')); \
             return true; }})()",
            element.0
        );
        match self.evaluate(&expression, COMMAND_TIMEOUT).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(SurfaceError::ElementNotFound {
                selector: format!("element #{}", element.0),
            }),
        }
    }

    async fn click_element(&self, element: ElementRef) -> Result<(), SurfaceError> {
        let expression = format!(
            "(() => {{ const el = (window.__tcRefs || [])[{}]; \
             if (!el) return false; el.click(); return true; }})()",
            element.0
        );
        match self.evaluate(&expression, COMMAND_TIMEOUT).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(SurfaceError::ElementNotFound {
                selector: format!("element #{}", element.0),
            }),
        }
    }

    async fn current_location(&self) -> Result<String, SurfaceError> {
        match self.evaluate("window.location.href", COMMAND_TIMEOUT).await? {
            Value::String(href) => Ok(href),
            other => Err(SurfaceError::Protocol {
                detail: format!("unexpected location value: {other}"),
            }),
        }
    }

    async fn export_session(&self) -> Result<serde_json::Value, SurfaceError> {
        let result = self
            .send("Network.getAllCookies", json!({}), COMMAND_TIMEOUT)
            .await?;
        let cookies = result.get("cookies").cloned().unwrap_or(json!([]));
        Ok(json!({ "cookies": cookies }))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Fire-and-forget: the reader is about to go away, so there is no
        // point correlating a response.
        let frame = json!({
            "id": self.next_id.fetch_add(1, Ordering::SeqCst),
            "method": "Page.close",
            "params": {},
        })
        .to_string();
        if let Err(e) = self.writer.lock().await.send(Message::Text(frame.into())).await {
            tracing::debug!(error = %e, "page close notification failed");
        }
        self.reader_handle.abort();
    }
}

impl Drop for CdpSurface {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// Interpret an evaluate result as a list of registry indexes.
fn ref_ids(value: &Value) -> Vec<ElementRef> {
    value
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_u64)
                .map(ElementRef)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// CdpProvider
// ---------------------------------------------------------------------------

/// Browsing-context owner: one browser process (launched or attached), many
/// page targets.
pub struct CdpProvider {
    endpoint: String,
    http: reqwest::Client,
    child: Mutex<Option<tokio::process::Child>>,
}

impl CdpProvider {
    /// Launch the configured browser (or attach to a running one) and wait
    /// for its DevTools endpoint to come up.
    pub async fn start(config: &BrowserConfig) -> Result<Self, SurfaceError> {
        let (endpoint, child) = match &config.attach_to {
            Some(endpoint) => (endpoint.trim_end_matches('/').to_string(), None),
            None => {
                let endpoint = format!("http://127.0.0.1:{}", config.debug_port);
                let mut command = tokio::process::Command::new(&config.binary);
                command
                    .arg(format!("--remote-debugging-port={}", config.debug_port))
                    .args(&config.launch_args)
                    .stdout(std::process::Stdio::null())
                    .stderr(std::process::Stdio::null());
                if config.headless {
                    command.arg("--headless=new");
                }
                let child = command.spawn().map_err(|e| SurfaceError::Connection {
                    endpoint: config.binary.clone(),
                    reason: format!("failed to launch browser: {e}"),
                })?;
                tracing::info!(binary = %config.binary, port = config.debug_port, "browser launched");
                (endpoint, Some(child))
            }
        };

        let http = reqwest::Client::new();
        let version_url = format!("{endpoint}/json/version");
        let probe = http.clone();
        retry::with_backoff(
            RetryPolicy::new(20, Duration::from_millis(250)),
            "devtools endpoint probe",
            || {
                let probe = probe.clone();
                let version_url = version_url.clone();
                async move {
                    probe
                        .get(&version_url)
                        .send()
                        .await
                        .and_then(reqwest::Response::error_for_status)
                        .map(|_| ())
                }
            },
        )
        .await
        .map_err(|e| SurfaceError::Connection {
            endpoint: endpoint.clone(),
            reason: format!("devtools endpoint never became ready: {e}"),
        })?;

        Ok(Self {
            endpoint,
            http,
            child: Mutex::new(child),
        })
    }
}

#[async_trait]
impl SurfaceProvider for CdpProvider {
    async fn open(
        &self,
        session: Option<&SessionState>,
    ) -> Result<Arc<dyn Surface>, SurfaceError> {
        let target: Value = self
            .http
            .put(format!("{}/json/new", self.endpoint))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| SurfaceError::Connection {
                endpoint: self.endpoint.clone(),
                reason: format!("tab creation failed: {e}"),
            })?
            .json()
            .await
            .map_err(|e| SurfaceError::Protocol {
                detail: format!("tab descriptor was not JSON: {e}"),
            })?;

        let ws_url = target
            .get("webSocketDebuggerUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| SurfaceError::Protocol {
                detail: "tab descriptor missing webSocketDebuggerUrl".to_string(),
            })?;

        let surface = CdpSurface::connect(ws_url).await?;
        if let Some(session) = session {
            surface.apply_session(session).await?;
        }
        Ok(Arc::new(surface))
    }

    async fn close(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "browser process already gone");
            }
            let _ = child.wait().await;
            tracing::info!("browser process stopped");
        }
    }
}
