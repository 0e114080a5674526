use std::fs;
use std::sync::Mutex;

use rand::seq::SliceRandom;
use tracing::{debug, info};

use pastewatch_core::MonitorError;

/// A proxy is dropped from rotation once it has failed this many times.
/// One failure is usually transient; two means the endpoint is broken.
const MAX_PROXY_FAILURES: usize = 2;

fn read_lines(path: &str) -> Result<Vec<String>, MonitorError> {
    let text = fs::read_to_string(path).map_err(|e| {
        MonitorError::Config(format!("cannot read {}: {}", path, e))
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Immutable after load; random reads need no lock.
pub struct UserAgentPool {
    agents: Vec<String>,
}

impl UserAgentPool {
    pub fn load(path: &str) -> Result<Self, MonitorError> {
        let agents = read_lines(path)?;
        debug!(count = agents.len(), file = %path, "loaded user agents");
        Ok(Self { agents })
    }

    pub fn empty() -> Self {
        Self { agents: Vec::new() }
    }

    pub fn pick(&self) -> Option<&str> {
        self.agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }
}

struct ProxyState {
    active: Vec<String>,
    failure_log: Vec<String>,
}

/// Rotating proxy list with failure-driven eviction. One mutex covers
/// selection, the failure log, and list mutation.
pub struct ProxyPool {
    state: Mutex<ProxyState>,
}

impl ProxyPool {
    pub fn load(path: &str) -> Result<Self, MonitorError> {
        let active = read_lines(path)?;
        debug!(count = active.len(), file = %path, "loaded proxies");
        Ok(Self::from_endpoints(active))
    }

    pub fn from_endpoints(active: Vec<String>) -> Self {
        Self {
            state: Mutex::new(ProxyState {
                active,
                failure_log: Vec::new(),
            }),
        }
    }

    pub fn empty() -> Self {
        Self::from_endpoints(Vec::new())
    }

    pub fn pick(&self) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active.choose(&mut rand::thread_rng()).cloned()
    }

    /// Record a failure. The endpoint stays in the failure log either way;
    /// once it has accumulated enough entries it leaves the active list.
    pub fn fail(&self, endpoint: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.failure_log.push(endpoint.to_string());
        let failures = state
            .failure_log
            .iter()
            .filter(|logged| logged.as_str() == endpoint)
            .count();
        if failures >= MAX_PROXY_FAILURES && state.active.iter().any(|p| p == endpoint) {
            info!(proxy = %endpoint, failures, "removing proxy from rotation after repeated errors");
            state.active.retain(|p| p != endpoint);
        }
    }

    pub fn active_len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.active.len()
    }
}
