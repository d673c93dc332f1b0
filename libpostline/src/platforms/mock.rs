//! Scripted mock adapter for tests
//!
//! Attempts consume a script of planned responses; once the script runs
//! out, the last planned response repeats. The mock records every request
//! so tests can assert on captions and attempt counts.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{PlatformError, Result};
use crate::platforms::{PlatformClient, PublishOutcome, PublishRequest};
use crate::types::{Account, Platform};

/// One scripted adapter response.
#[derive(Debug, Clone)]
pub enum PlannedResponse {
    /// Vendor accepted the post.
    Success(String),
    /// Vendor replied with a well-formed error body.
    VendorReject(String),
    /// Transport-level failure.
    Transport(String),
}

#[derive(Default)]
struct MockState {
    script: Vec<PlannedResponse>,
    attempts: usize,
    requests: Vec<PublishRequest>,
}

#[derive(Clone)]
pub struct MockClient {
    platform: Platform,
    state: Arc<Mutex<MockState>>,
}

impl MockClient {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Always succeed with the given external id.
    pub fn succeeding(platform: Platform, external_id: &str) -> Self {
        let mock = Self::new(platform);
        mock.plan(PlannedResponse::Success(external_id.to_string()));
        mock
    }

    /// Raise transport errors `failures` times, then succeed.
    pub fn failing_then_succeeding(platform: Platform, failures: usize, external_id: &str) -> Self {
        let mock = Self::new(platform);
        for i in 0..failures {
            mock.plan(PlannedResponse::Transport(format!("connection reset {}", i)));
        }
        mock.plan(PlannedResponse::Success(external_id.to_string()));
        mock
    }

    /// Always report a vendor rejection.
    pub fn rejecting(platform: Platform, message: &str) -> Self {
        let mock = Self::new(platform);
        mock.plan(PlannedResponse::VendorReject(message.to_string()));
        mock
    }

    /// Always raise a transport error.
    pub fn unreachable(platform: Platform) -> Self {
        let mock = Self::new(platform);
        mock.plan(PlannedResponse::Transport("connection refused".to_string()));
        mock
    }

    pub fn plan(&self, response: PlannedResponse) {
        self.state.lock().unwrap().script.push(response);
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn requests(&self) -> Vec<PublishRequest> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn publish(
        &self,
        _account: &Account,
        request: &PublishRequest,
    ) -> Result<PublishOutcome> {
        let planned = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(request.clone());
            let index = state.attempts.min(state.script.len().saturating_sub(1));
            state.attempts += 1;
            state
                .script
                .get(index)
                .cloned()
                .unwrap_or(PlannedResponse::Transport("empty script".to_string()))
        };

        match planned {
            PlannedResponse::Success(id) => Ok(PublishOutcome::success(id, None)),
            PlannedResponse::VendorReject(message) => Ok(PublishOutcome::failure(message)),
            PlannedResponse::Transport(message) => {
                Err(PlatformError::Network(message).into())
            }
        }
    }
}
