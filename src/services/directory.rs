// src/services/directory.rs
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ami::{Connector, StatusPoller, TcpConnector};
use crate::config::ConnectionParams;
use crate::error::DirectoryError;
use crate::models::{attach_statuses, Extension, ExtensionWithStatus, SessionResult};

pub const MAX_EXTENSIONS_PER_REQUEST: usize = 500;

/// Live status lookups for the directory.
///
/// Holds the AMI credentials so no handler ever sees them. Every call runs
/// its own session; polls are abandoned when `shutdown` fires.
pub struct DirectoryService<C = TcpConnector> {
    poller: StatusPoller<C>,
    params: ConnectionParams,
    shutdown: CancellationToken,
}

impl<C: Connector> DirectoryService<C> {
    pub fn new(poller: StatusPoller<C>, params: ConnectionParams, shutdown: CancellationToken) -> Self {
        if params.is_complete() {
            info!("AMI status polling enabled: {}", params.server_id());
        } else {
            info!("⚠️  AMI not configured, extension statuses will be reported as unknown");
        }

        Self {
            poller,
            params,
            shutdown,
        }
    }

    pub fn ami_enabled(&self) -> bool {
        self.params.is_complete()
    }

    pub async fn fetch_statuses(&self, extensions: &[String]) -> Result<SessionResult, DirectoryError> {
        Self::validate(extensions.iter().map(String::as_str), extensions.len())?;

        if extensions.is_empty() {
            debug!("Empty status request, no AMI session needed");
            return Ok(SessionResult::new());
        }

        let cancel = self.shutdown.child_token();
        Ok(self
            .poller
            .poll_statuses_with_cancel(&self.params, extensions, &cancel)
            .await)
    }

    /// Attach live statuses to an already fetched listing.
    ///
    /// Never rejects the listing. Blank numbers are not polled, repeats are
    /// polled once and only the first `MAX_EXTENSIONS_PER_REQUEST` distinct
    /// numbers are polled; every other entry comes back as `unknown`.
    pub async fn fetch_directory(
        &self,
        extensions: Vec<Extension>,
    ) -> Result<Vec<ExtensionWithStatus>, DirectoryError> {
        let ids = Self::pollable_ids(&extensions);
        let statuses = self.fetch_statuses(&ids).await?;
        Ok(attach_statuses(extensions, &statuses))
    }

    fn pollable_ids(extensions: &[Extension]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        for id in extensions.iter().map(|e| e.extension.trim()) {
            if id.is_empty() || !seen.insert(id) {
                continue;
            }
            if ids.len() == MAX_EXTENSIONS_PER_REQUEST {
                warn!(
                    "Directory listing exceeds {} numbers, the rest stay unknown",
                    MAX_EXTENSIONS_PER_REQUEST
                );
                break;
            }
            ids.push(id.to_string());
        }

        ids
    }

    fn validate<'a>(mut ids: impl Iterator<Item = &'a str>, count: usize) -> Result<(), DirectoryError> {
        if count > MAX_EXTENSIONS_PER_REQUEST {
            return Err(DirectoryError::TooManyExtensions {
                count,
                max: MAX_EXTENSIONS_PER_REQUEST,
            });
        }
        if ids.any(|id| id.trim().is_empty()) {
            return Err(DirectoryError::InvalidRequest(
                "extension number must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
