// src/ami/session.rs
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::ami::codec::Action;
use crate::ami::connection::{AmiConnection, AmiError, Connector, TcpConnector};
use crate::config::{ConnectionParams, SessionOptions};
use crate::models::status::{parse_status_response, SessionResult};

/// Runs complete polling sessions: connect, banner, login, one
/// `ExtensionState` per extension, logoff, close.
///
/// Every session owns its own connection. Nothing is shared between
/// concurrent polls and nothing is retried.
pub struct StatusPoller<C = TcpConnector> {
    connector: C,
    options: SessionOptions,
}

impl StatusPoller<TcpConnector> {
    pub fn tcp(options: SessionOptions) -> Self {
        Self::new(TcpConnector, options)
    }
}

impl<C: Connector> StatusPoller<C> {
    pub fn new(connector: C, options: SessionOptions) -> Self {
        Self { connector, options }
    }

    /// Poll `query` in order and return whatever could be decoded.
    ///
    /// Never fails: session-level problems yield an empty map, per-extension
    /// problems leave that extension out. Repeated extensions are queried
    /// again and the last answer wins.
    pub async fn poll_statuses(&self, params: &ConnectionParams, query: &[String]) -> SessionResult {
        self.poll_statuses_with_cancel(params, query, &CancellationToken::new())
            .await
    }

    /// Like [`poll_statuses`](Self::poll_statuses), but stops early once
    /// `cancel` fires, closing the connection and returning partial results.
    #[instrument(skip_all, fields(server = %params.server_id(), extensions = query.len()))]
    pub async fn poll_statuses_with_cancel(
        &self,
        params: &ConnectionParams,
        query: &[String],
        cancel: &CancellationToken,
    ) -> SessionResult {
        let mut results = SessionResult::new();

        if !params.is_complete() {
            debug!("AMI connection parameters incomplete, status polling disabled");
            return results;
        }
        if cancel.is_cancelled() {
            return results;
        }

        let mut connection = tokio::select! {
            biased;
            _ = cancel.cancelled() => return results,
            opened = self.open(params) => match opened {
                Ok(connection) => connection,
                Err(e) => {
                    error!("AMI connect to {} failed: {}", params.server_id(), e);
                    return results;
                }
            },
        };

        let handshake = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AmiError::Cancelled),
            outcome = self.handshake(&mut connection, params) => outcome,
        };

        if let Err(e) = handshake {
            match e {
                AmiError::Cancelled => warn!("AMI session cancelled during login"),
                e => error!("AMI session with {} aborted: {}", params.server_id(), e),
            }
            connection.close(self.options.exchange_timeout).await;
            return results;
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AmiError::Cancelled),
            outcome = self.query_all(&mut connection, query, &mut results) => outcome,
        };

        match outcome {
            Ok(()) => self.logoff(&mut connection).await,
            Err(AmiError::Cancelled) => {
                warn!("AMI session cancelled after {} of {} statuses", results.len(), query.len());
            }
            Err(e) => {
                error!(
                    "AMI session aborted after {} of {} statuses: {}",
                    results.len(),
                    query.len(),
                    e
                );
                self.logoff(&mut connection).await;
            }
        }

        connection.close(self.options.exchange_timeout).await;

        info!("AMI status poll finished: {}/{} extensions", results.len(), query.len());
        results
    }

    async fn open(&self, params: &ConnectionParams) -> Result<AmiConnection, AmiError> {
        let wait = self.options.connect_timeout;
        debug!("Connecting to AMI: {}", params.server_id());

        let transport = timeout(wait, self.connector.open(params.host.clone(), params.port))
            .await
            .map_err(|_| AmiError::ConnectTimeout(wait))??;

        Ok(AmiConnection::new(transport))
    }

    async fn handshake(
        &self,
        connection: &mut AmiConnection,
        params: &ConnectionParams,
    ) -> Result<(), AmiError> {
        let banner = connection.read_banner(self.options.banner_timeout).await?;
        debug!("AMI banner: {}", banner);

        let login = Action::login(connection.next_action_id(), &params.username, &params.secret);
        let reply = connection.exchange(&login, self.options.exchange_timeout).await?;

        if !reply.is_success() {
            debug!(
                response = reply.response(),
                reason = reply.get_header("Message"),
                "AMI login rejected"
            );
            return Err(AmiError::AuthenticationFailed);
        }

        info!("✅ Authenticated to AMI: {}", params.server_id());
        Ok(())
    }

    async fn query_all(
        &self,
        connection: &mut AmiConnection,
        query: &[String],
        results: &mut SessionResult,
    ) -> Result<(), AmiError> {
        for extension in query {
            let action = Action::extension_state(
                connection.next_action_id(),
                extension,
                &self.options.context,
            );

            match connection.exchange(&action, self.options.exchange_timeout).await {
                Ok(reply) => match parse_status_response(extension, reply.raw()) {
                    Some(status) => {
                        debug!("Extension {} -> {:?} ({})", extension, status.kind, status.text);
                        results.insert(extension.clone(), status);
                    }
                    None => warn!("No status in ExtensionState reply for {}, skipping", extension),
                },
                Err(AmiError::Timeout(wait)) => {
                    warn!("ExtensionState for {} timed out after {:?}, skipping", extension, wait);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn logoff(&self, connection: &mut AmiConnection) {
        let logoff = Action::logoff(connection.next_action_id());
        if let Err(e) = connection.send(&logoff, self.options.exchange_timeout).await {
            debug!("AMI logoff failed (ignored): {}", e);
        }
    }
}

/// One-shot poll over plain TCP
pub async fn poll_statuses(
    params: &ConnectionParams,
    query: &[String],
    options: SessionOptions,
) -> SessionResult {
    StatusPoller::tcp(options).poll_statuses(params, query).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ami::connection::{AmiTransport, MockConnector};
    use crate::models::status::StatusKind;
    use async_trait::async_trait;
    use bytes::BytesMut;
    use std::collections::HashMap;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const BANNER: &str = "Asterisk Call Manager/5.0.1\r\n";

    #[derive(Debug, Clone)]
    enum Reply {
        Status(i32, Option<&'static str>),
        NoStatus,
        Hang,
        Disconnect,
    }

    /// What the fake server does; extensions without an entry get `Hang`.
    #[derive(Debug, Clone)]
    struct Script {
        banner: bool,
        login_ok: bool,
        replies: HashMap<String, Vec<Reply>>,
        // Bytes handed out per read call, to force partial reads
        chunk: usize,
    }

    impl Script {
        fn new() -> Self {
            Self {
                banner: true,
                login_ok: true,
                replies: HashMap::new(),
                chunk: 7,
            }
        }

        fn reply(mut self, exten: &str, reply: Reply) -> Self {
            self.replies.entry(exten.to_string()).or_default().push(reply);
            self
        }
    }

    #[derive(Debug, Default)]
    struct Counters {
        opens: AtomicUsize,
        closes: AtomicUsize,
        sent: Mutex<Vec<String>>,
    }

    impl Counters {
        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        fn sent_actions(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    struct ScriptedTransport {
        script: Script,
        counters: Arc<Counters>,
        outbox: Vec<u8>,
        disconnected: bool,
    }

    impl ScriptedTransport {
        fn new(mut script: Script, counters: Arc<Counters>) -> Self {
            let outbox = if script.banner { BANNER.as_bytes().to_vec() } else { Vec::new() };
            // Per-extension replies are consumed front to back
            for replies in script.replies.values_mut() {
                replies.reverse();
            }
            Self {
                script,
                counters,
                outbox,
                disconnected: false,
            }
        }

        fn header<'a>(block: &'a str, key: &str) -> Option<&'a str> {
            block.lines().find_map(|line| {
                let (k, v) = line.split_once(':')?;
                (k.trim() == key).then(|| v.trim())
            })
        }
    }

    #[async_trait]
    impl AmiTransport for ScriptedTransport {
        async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            let block = String::from_utf8_lossy(data).to_string();
            let action = Self::header(&block, "Action").unwrap_or_default().to_string();
            let id = Self::header(&block, "ActionID").unwrap_or_default().to_string();
            self.counters.sent.lock().unwrap().push(match Self::header(&block, "Exten") {
                Some(exten) => format!("{} {}", action, exten),
                None => action.clone(),
            });

            let reply = match action.as_str() {
                "Login" if self.script.login_ok => {
                    format!("Response: Success\r\nActionID: {}\r\nMessage: Authentication accepted\r\n\r\n", id)
                }
                "Login" => {
                    format!("Response: Error\r\nActionID: {}\r\nMessage: Authentication failed\r\n\r\n", id)
                }
                "ExtensionState" => {
                    let exten = Self::header(&block, "Exten").unwrap_or_default().to_string();
                    let next = self
                        .script
                        .replies
                        .get_mut(&exten)
                        .and_then(|replies| replies.pop())
                        .unwrap_or(Reply::Hang);
                    match next {
                        Reply::Status(code, text) => {
                            let mut body = format!(
                                "Response: Success\r\nActionID: {}\r\nMessage: Extension Status\r\nExten: {}\r\nContext: from-internal\r\nStatus: {}\r\n",
                                id, exten, code
                            );
                            if let Some(text) = text {
                                body.push_str(&format!("StatusText: {}\r\n", text));
                            }
                            body.push_str("\r\n");
                            body
                        }
                        Reply::NoStatus => {
                            format!("Response: Error\r\nActionID: {}\r\nMessage: Extension not found\r\n\r\n", id)
                        }
                        Reply::Hang => String::new(),
                        Reply::Disconnect => {
                            self.disconnected = true;
                            String::new()
                        }
                    }
                }
                _ => String::new(),
            };

            self.outbox.extend_from_slice(reply.as_bytes());
            Ok(())
        }

        async fn read(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
            if self.outbox.is_empty() {
                if self.disconnected {
                    return Ok(0);
                }
                std::future::pending::<()>().await;
            }
            let n = self.script.chunk.min(self.outbox.len());
            buf.extend_from_slice(&self.outbox[..n]);
            self.outbox.drain(..n);
            Ok(n)
        }

        async fn close(&mut self) -> io::Result<()> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scripted_connector(script: Script, counters: Arc<Counters>) -> MockConnector {
        let mut connector = MockConnector::new();
        connector.expect_open().returning(move |_, _| {
            counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedTransport::new(script.clone(), counters.clone())) as Box<dyn AmiTransport>)
        });
        connector
    }

    fn params() -> ConnectionParams {
        ConnectionParams::new("pbx.test", 5038, "directory", "s3cret")
    }

    fn query(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn poller(connector: MockConnector) -> StatusPoller<MockConnector> {
        StatusPoller::new(connector, SessionOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_every_extension_in_order() {
        let counters = Arc::new(Counters::default());
        let script = Script::new()
            .reply("101", Reply::Status(0, Some("Idle")))
            .reply("102", Reply::Status(1, None))
            .reply("103", Reply::Status(8, Some("Ringing")));
        let poller = poller(scripted_connector(script, counters.clone()));

        let results = poller.poll_statuses(&params(), &query(&["101", "102", "103"])).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results["101"].kind, StatusKind::Available);
        assert_eq!(results["101"].text, "Idle");
        assert_eq!(results["102"].kind, StatusKind::InCall);
        assert_eq!(results["102"].text, "On Call");
        assert_eq!(results["103"].kind, StatusKind::Ringing);
        assert_eq!(
            counters.sent_actions(),
            vec![
                "Login",
                "ExtensionState 101",
                "ExtensionState 102",
                "ExtensionState 103",
                "Logoff"
            ]
        );
        assert_eq!(counters.opens(), 1);
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_extension_is_left_out() {
        let counters = Arc::new(Counters::default());
        let script = Script::new()
            .reply("101", Reply::Status(0, None))
            .reply("102", Reply::Status(1, None))
            .reply("103", Reply::Hang);
        let poller = poller(scripted_connector(script, counters.clone()));

        let results = poller.poll_statuses(&params(), &query(&["101", "102", "103"])).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["101"].kind, StatusKind::Available);
        assert_eq!(results["102"].kind, StatusKind::InCall);
        assert!(!results.contains_key("103"));
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_in_the_middle_does_not_stop_the_loop() {
        let counters = Arc::new(Counters::default());
        let script = Script::new()
            .reply("101", Reply::Status(2, None))
            .reply("102", Reply::Hang)
            .reply("103", Reply::Status(16, None))
            .reply("104", Reply::Status(0, None));
        let poller = poller(scripted_connector(script, counters.clone()));

        let results = poller
            .poll_statuses(&params(), &query(&["101", "102", "103", "104"]))
            .await;

        assert_eq!(results.len(), 3);
        assert!(!results.contains_key("102"));
        assert_eq!(results["103"].kind, StatusKind::OnHold);
        assert_eq!(results["104"].kind, StatusKind::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_without_status_is_skipped() {
        let counters = Arc::new(Counters::default());
        let script = Script::new()
            .reply("101", Reply::NoStatus)
            .reply("102", Reply::Status(4, None));
        let poller = poller(scripted_connector(script, counters.clone()));

        let results = poller.poll_statuses(&params(), &query(&["101", "102"])).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results["102"].kind, StatusKind::Unregistered);
        assert_eq!(results["102"].text, "Not Registered");
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_extension_last_answer_wins() {
        let counters = Arc::new(Counters::default());
        let script = Script::new()
            .reply("101", Reply::Status(0, None))
            .reply("101", Reply::Status(2, Some("Busy now")));
        let poller = poller(scripted_connector(script, counters.clone()));

        let results = poller.poll_statuses(&params(), &query(&["101", "101"])).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results["101"].kind, StatusKind::Busy);
        assert_eq!(results["101"].text, "Busy now");
        assert_eq!(
            counters
                .sent_actions()
                .iter()
                .filter(|a| a.as_str() == "ExtensionState 101")
                .count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_query_logs_in_and_out_only() {
        let counters = Arc::new(Counters::default());
        let poller = poller(scripted_connector(Script::new(), counters.clone()));

        let results = poller.poll_statuses(&params(), &[]).await;

        assert!(results.is_empty());
        assert_eq!(counters.sent_actions(), vec!["Login", "Logoff"]);
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_credentials_never_connect() {
        let mut connector = MockConnector::new();
        connector.expect_open().never();
        let poller = poller(connector);

        let incomplete = [
            ConnectionParams::new("", 5038, "directory", "s3cret"),
            ConnectionParams::new("pbx.test", 5038, "", "s3cret"),
            ConnectionParams::new("pbx.test", 5038, "directory", ""),
        ];

        for params in incomplete {
            let results = poller.poll_statuses(&params, &query(&["101"])).await;
            assert!(results.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_rejected_queries_nothing() {
        let counters = Arc::new(Counters::default());
        let mut script = Script::new().reply("101", Reply::Status(0, None));
        script.login_ok = false;
        let poller = poller(scripted_connector(script, counters.clone()));

        let results = poller.poll_statuses(&params(), &query(&["101", "102"])).await;

        assert!(results.is_empty());
        assert_eq!(counters.sent_actions(), vec!["Login"]);
        assert_eq!(counters.opens(), 1);
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_banner_aborts_before_login() {
        let counters = Arc::new(Counters::default());
        let mut script = Script::new().reply("101", Reply::Status(0, None));
        script.banner = false;
        let poller = poller(scripted_connector(script, counters.clone()));

        let results = poller.poll_statuses(&params(), &query(&["101"])).await;

        assert!(results.is_empty());
        assert!(counters.sent_actions().is_empty());
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_refused_yields_empty_result() {
        let mut connector = MockConnector::new();
        connector
            .expect_open()
            .times(1)
            .returning(|_, _| Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")));
        let poller = poller(connector);

        let results = poller.poll_statuses(&params(), &query(&["101"])).await;

        assert!(results.is_empty());
    }

    struct HangingConnector;

    #[async_trait]
    impl Connector for HangingConnector {
        async fn open(&self, _host: String, _port: u16) -> io::Result<Box<dyn AmiTransport>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_yields_empty_result() {
        let poller = StatusPoller::new(HangingConnector, SessionOptions::default());

        let started = tokio::time::Instant::now();
        let results = poller.poll_statuses(&params(), &query(&["101"])).await;

        assert!(results.is_empty());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_session_keeps_partial_results() {
        let counters = Arc::new(Counters::default());
        let script = Script::new()
            .reply("101", Reply::Status(0, None))
            .reply("102", Reply::Disconnect)
            .reply("103", Reply::Status(0, None));
        let poller = poller(scripted_connector(script, counters.clone()));

        let results = poller.poll_statuses(&params(), &query(&["101", "102", "103"])).await;

        assert_eq!(results.len(), 1);
        assert!(results.contains_key("101"));
        assert!(!counters.sent_actions().contains(&"ExtensionState 103".to_string()));
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_loop_closes_and_returns_partial() {
        let counters = Arc::new(Counters::default());
        let script = Script::new()
            .reply("101", Reply::Status(0, None))
            .reply("102", Reply::Hang);
        let poller = poller(scripted_connector(script, counters.clone()));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let results = poller
            .poll_statuses_with_cancel(&params(), &query(&["101", "102", "103"]), &cancel)
            .await;

        assert_eq!(results.len(), 1);
        assert!(results.contains_key("101"));
        assert!(!counters.sent_actions().contains(&"Logoff".to_string()));
        assert_eq!(counters.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_never_connects() {
        let mut connector = MockConnector::new();
        connector.expect_open().never();
        let poller = poller(connector);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = poller
            .poll_statuses_with_cancel(&params(), &query(&["101"]), &cancel)
            .await;

        assert!(results.is_empty());
    }
}
