//! Shared wiring between the HTTP and stratum front-ends, grounded in
//! `ProxyServer` in `examples/original_source/server/proxy/proxy.go`.

use std::sync::Arc;
use std::time::Duration;

use stratum_pow::PowVerifier;
use stratum_rpc::UpstreamPool;
use stratum_storage::SharedBackend;

use crate::config::ProxyConfig;
use crate::health::SickFlag;
use crate::policy::Policy;
use crate::session::SessionRegistry;
use crate::share::{self, ClassifyOutcome, ClassifyParams, ShareSubmission};
use crate::template::TemplateCache;

pub struct ProxyState {
    pub config: ProxyConfig,
    pub pool: UpstreamPool,
    pub templates: TemplateCache,
    pub sessions: Arc<SessionRegistry>,
    pub backend: SharedBackend,
    pub policy: Arc<dyn Policy>,
    pub verifier: Arc<dyn PowVerifier>,
    pub sick: Arc<SickFlag>,
}

impl ProxyState {
    pub fn new(
        config: ProxyConfig,
        pool: UpstreamPool,
        backend: SharedBackend,
        policy: Arc<dyn Policy>,
        verifier: Arc<dyn PowVerifier>,
    ) -> Self {
        let sick = Arc::new(SickFlag::new(config.health_check_enabled, config.max_fails));
        Self {
            templates: TemplateCache::new(config.clone()),
            sessions: Arc::new(SessionRegistry::new()),
            config,
            pool,
            backend,
            policy,
            verifier,
            sick,
        }
    }

    pub fn is_sick(&self) -> bool {
        self.sick.is_sick()
    }

    /// `handleGetWorkRPC` (spec.md §4.6): returns the current job, or a
    /// "Work not ready" error when no template is installed, the header
    /// is empty, or the proxy is sick.
    pub fn get_work(&self) -> Result<[String; 3], &'static str> {
        let template = self.templates.current();
        match template {
            Some(t) if !t.header.is_empty() && !self.is_sick() => Ok(t.work()),
            _ => Err("work not ready"),
        }
    }

    /// `handleGetBlockByNumberRPC`: the cached pending-block snapshot.
    pub fn pending_block(&self) -> Option<(String, String)> {
        self.templates.current().map(|t| (t.pending_block.number_hex.clone(), t.pending_block.difficulty_hex.clone()))
    }

    /// Runs the classifier (`handleSubmitRPC`'s call into `processShare`)
    /// against the current template and the active upstream.
    pub async fn submit_share(
        &self,
        login: &str,
        worker: &str,
        submission: ShareSubmission,
    ) -> Result<Option<ClassifyOutcome>, crate::error::ClassifyError> {
        let Some(template) = self.templates.current() else {
            return Ok(None);
        };
        let upstream = self.pool.active();
        let params = ClassifyParams {
            login,
            worker,
            share_difficulty: self.config.share_difficulty,
            hashrate_expiration: self.config.stratum.hashrate_expiration,
        };
        let outcome = share::classify(
            params,
            template.as_ref(),
            &submission,
            self.verifier.as_ref(),
            self.backend.as_ref(),
            &upstream,
            &self.templates,
            Some(&self.sessions),
        )
        .await?;
        Ok(Some(outcome))
    }

    pub fn hashrate_expiration(&self) -> Duration {
        self.config.stratum.hashrate_expiration
    }
}

/// Encodes a classifier outcome into the reply shape of spec.md §4.6's
/// table, given whether the per-IP share-policy threshold was crossed.
/// `policy_ok = false` means the ban threshold was just crossed.
pub fn encode_submit_reply(outcome: ClassifyOutcome, policy_ok: bool) -> (bool, Option<crate::protocol::ErrorReply>) {
    use crate::protocol::{DUPLICATE_SHARE, HIGH_INVALID_RATE, INVALID_SHARE};

    if outcome.exists {
        return (false, Some(DUPLICATE_SHARE));
    }
    if !outcome.valid {
        return if policy_ok { (false, None) } else { (false, Some(INVALID_SHARE)) };
    }
    if policy_ok {
        (true, None)
    } else {
        (true, Some(HIGH_INVALID_RATE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_table_matches_spec() {
        let duplicate = ClassifyOutcome { exists: true, valid: false };
        assert_eq!(encode_submit_reply(duplicate, true).0, false);
        assert_eq!(encode_submit_reply(duplicate, true).1.unwrap().code, 22);

        let invalid = ClassifyOutcome { exists: false, valid: false };
        assert_eq!(encode_submit_reply(invalid, true), (false, None));
        assert_eq!(encode_submit_reply(invalid, false).1.unwrap().code, 23);

        let valid = ClassifyOutcome { exists: false, valid: true };
        assert_eq!(encode_submit_reply(valid, true), (true, None));
        assert_eq!(encode_submit_reply(valid, false).1.unwrap().code, -1);
    }
}
