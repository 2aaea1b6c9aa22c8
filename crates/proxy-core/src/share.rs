//! Share classifier (C4), grounded in
//! `examples/original_source/server/proxy/miner.go` (`processShare`).

use std::sync::Arc;
use std::time::Duration;

use stratum_pow::{PowCandidate, PowVerifier};
use stratum_rpc::{SharedUpstream, UpstreamClient};
use stratum_storage::{Backend, BlockRecord, ShareParams, ShareRecord};

use crate::error::ClassifyError;
use crate::session::SessionRegistry;
use crate::template::{Template, TemplateCache};

/// `(exists, valid)` from spec.md §4.4: `exists` means the backend already
/// held a row for this (header, nonce); `valid` means the share met share
/// difficulty and was neither stale nor duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyOutcome {
    pub exists: bool,
    pub valid: bool,
}

impl ClassifyOutcome {
    const STALE: Self = Self { exists: false, valid: false };
    const INVALID: Self = Self { exists: false, valid: false };
    const DUPLICATE: Self = Self { exists: true, valid: false };
    const SHARE_ACCEPTED: Self = Self { exists: false, valid: true };
}

pub struct ShareSubmission {
    pub nonce_hex: String,
    pub header_hex: String,
    pub mix_hex: String,
}

/// Per-submission context that does not vary within one classification.
pub struct ClassifyParams<'a> {
    pub login: &'a str,
    pub worker: &'a str,
    pub share_difficulty: u64,
    pub hashrate_expiration: Duration,
}

fn parse_nonce(nonce_hex: &str) -> Result<u64, ClassifyError> {
    u64::from_str_radix(nonce_hex.trim_start_matches("0x"), 16)
        .map_err(|_| ClassifyError::Malformed("nonce is not valid hex"))
}

fn parse_hash32(hash_hex: &str) -> Result<[u8; 32], ClassifyError> {
    let trimmed = hash_hex.trim_start_matches("0x");
    let mut out = [0u8; 32];
    hex_decode(trimmed, &mut out).ok_or(ClassifyError::Malformed("hash is not 32 bytes of hex"))?;
    Ok(out)
}

fn hex_decode(s: &str, out: &mut [u8; 32]) -> Option<()> {
    if s.len() != 64 {
        return None;
    }
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(())
}

/// Classifies a submitted (nonce, header, mix) against template `t`,
/// following the decision procedure of spec.md §4.4 exactly.
#[allow(clippy::too_many_arguments)]
pub async fn classify(
    params: ClassifyParams<'_>,
    template: &Template,
    submission: &ShareSubmission,
    verifier: &dyn PowVerifier,
    backend: &dyn Backend,
    upstream: &SharedUpstream,
    template_cache: &TemplateCache,
    sessions: Option<&Arc<SessionRegistry>>,
) -> Result<ClassifyOutcome, ClassifyError> {
    let Some(entry) = template.headers.get(&submission.header_hex) else {
        tracing::info!(login = params.login, "stale share");
        metrics::counter!("stratum_shares_stale_total").increment(1);
        return Ok(ClassifyOutcome::STALE);
    };

    let nonce = parse_nonce(&submission.nonce_hex)?;
    let hash_no_nonce = parse_hash32(&submission.header_hex)?;
    let mix_digest = parse_hash32(&submission.mix_hex)?;

    let share_candidate = PowCandidate {
        height: entry.height,
        hash_no_nonce,
        difficulty: params.share_difficulty,
        nonce,
        mix_digest,
    };
    let block_candidate = PowCandidate { difficulty: entry.block_difficulty, ..share_candidate.clone() };

    if !verifier.verify(&share_candidate) {
        metrics::counter!("stratum_shares_invalid_total").increment(1);
        return Ok(ClassifyOutcome::INVALID);
    }

    let share_params = ShareParams {
        nonce: submission.nonce_hex.clone(),
        header_hash: submission.header_hex.clone(),
        mix_digest: submission.mix_hex.clone(),
    };

    if verifier.verify(&block_candidate) {
        let submit_params = [submission.nonce_hex.clone(), submission.header_hex.clone(), submission.mix_hex.clone()];
        match upstream.submit_block(submit_params).await {
            Err(err) => {
                tracing::warn!(error = %err, height = entry.height, "block submission failure");
                Ok(ClassifyOutcome::SHARE_ACCEPTED)
            }
            Ok(false) => {
                tracing::error!(height = entry.height, "block rejected by upstream");
                metrics::counter!("stratum_shares_invalid_total").increment(1);
                Ok(ClassifyOutcome::INVALID)
            }
            Ok(true) => {
                template_cache.refresh(upstream, sessions).await;
                let exists = backend
                    .write_block(BlockRecord {
                        login: params.login.to_string(),
                        worker: params.worker.to_string(),
                        params: share_params,
                        share_difficulty: params.share_difficulty as i64,
                        block_difficulty: entry.block_difficulty as i64,
                        height: entry.height,
                        hashrate_expiration: params.hashrate_expiration,
                    })
                    .await?;
                if exists {
                    tracing::warn!(height = entry.height, "block already recorded for this header+nonce");
                    metrics::counter!("stratum_shares_duplicate_total").increment(1);
                    Ok(ClassifyOutcome::DUPLICATE)
                } else {
                    tracing::warn!(login = params.login, height = entry.height, "block found by miner");
                    metrics::counter!("stratum_blocks_found_total").increment(1);
                    Ok(ClassifyOutcome::SHARE_ACCEPTED)
                }
            }
        }
    } else {
        let exists = backend
            .write_share(ShareRecord {
                login: params.login.to_string(),
                worker: params.worker.to_string(),
                params: share_params,
                share_difficulty: params.share_difficulty as i64,
                height: entry.height,
                hashrate_expiration: params.hashrate_expiration,
            })
            .await?;
        if exists {
            metrics::counter!("stratum_shares_duplicate_total").increment(1);
            Ok(ClassifyOutcome::DUPLICATE)
        } else {
            metrics::counter!("stratum_shares_accepted_total").increment(1);
            Ok(ClassifyOutcome::SHARE_ACCEPTED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::template::HeaderEntry;
    use std::collections::HashMap;
    use std::sync::Arc as StdArc;
    use stratum_pow::test_support::FakeVerifier;
    use stratum_rpc::test_support::FakeUpstream;
    use stratum_storage::MemoryBackend;

    fn template_with(header: &str, height: u64, block_difficulty: u64) -> Template {
        let mut headers = HashMap::new();
        headers.insert(header.to_string(), HeaderEntry { height, block_difficulty });
        Template {
            header: header.to_string(),
            seed: "0xseed".into(),
            share_target: "0x1".into(),
            height,
            network_difficulty: block_difficulty as i64,
            pending_block: crate::template::PendingBlockSnapshot {
                number_hex: format!("0x{height:x}"),
                difficulty_hex: "0x1".into(),
            },
            headers,
        }
    }

    fn submission(header: &str) -> ShareSubmission {
        ShareSubmission {
            nonce_hex: "0x0123456789abcdef".into(),
            header_hex: header.into(),
            mix_hex: format!("0x{}", "a".repeat(64)),
        }
    }

    fn params() -> ClassifyParams<'static> {
        ClassifyParams { login: "0xabc", worker: "0", share_difficulty: 100, hashrate_expiration: Duration::from_secs(60) }
    }

    #[tokio::test]
    async fn stale_header_is_rejected_without_backend_write() {
        let template = template_with(&format!("0x{}", "1".repeat(64)), 10, 1000);
        let backend = MemoryBackend::new();
        let verifier = FakeVerifier::new(|_: &PowCandidate| true);
        let upstream: SharedUpstream = StdArc::new(FakeUpstream::new("u0"));
        let cache = TemplateCache::new(ProxyConfig::default());

        let missing_header = format!("0x{}", "2".repeat(64));
        let outcome = classify(
            params(),
            &template,
            &submission(&missing_header),
            &verifier,
            &backend,
            &upstream,
            &cache,
            None,
        )
        .await
        .unwrap();

        assert_eq!(outcome, ClassifyOutcome::STALE);
        assert_eq!(backend.shares_written(), 0);
    }

    #[tokio::test]
    async fn below_share_difficulty_is_invalid() {
        let header = format!("0x{}", "1".repeat(64));
        let template = template_with(&header, 10, 1000);
        let backend = MemoryBackend::new();
        let verifier = FakeVerifier::new(|_: &PowCandidate| false);
        let upstream: SharedUpstream = StdArc::new(FakeUpstream::new("u0"));
        let cache = TemplateCache::new(ProxyConfig::default());

        let outcome =
            classify(params(), &template, &submission(&header), &verifier, &backend, &upstream, &cache, None)
                .await
                .unwrap();

        assert_eq!(outcome, ClassifyOutcome::INVALID);
    }

    #[tokio::test]
    async fn share_quality_writes_once_and_reports_duplicate_on_retry() {
        let header = format!("0x{}", "1".repeat(64));
        let template = template_with(&header, 10, 1_000_000);
        let backend = MemoryBackend::new();
        // meets share difficulty (100) but not block difficulty (1_000_000)
        let verifier = FakeVerifier::new(|c: &PowCandidate| c.difficulty <= 100);
        let upstream: SharedUpstream = StdArc::new(FakeUpstream::new("u0"));
        let cache = TemplateCache::new(ProxyConfig::default());

        let first =
            classify(params(), &template, &submission(&header), &verifier, &backend, &upstream, &cache, None)
                .await
                .unwrap();
        assert_eq!(first, ClassifyOutcome::SHARE_ACCEPTED);

        let second =
            classify(params(), &template, &submission(&header), &verifier, &backend, &upstream, &cache, None)
                .await
                .unwrap();
        assert_eq!(second, ClassifyOutcome::DUPLICATE);
        assert_eq!(backend.shares_written(), 1);
    }

    #[tokio::test]
    async fn block_quality_submits_upstream_before_backend_write() {
        let header = format!("0x{}", "1".repeat(64));
        let template = template_with(&header, 10, 100);
        let backend = MemoryBackend::new();
        let verifier = FakeVerifier::new(|_: &PowCandidate| true);
        let fake_upstream = StdArc::new(FakeUpstream::new("u0"));
        fake_upstream.set_submit_block_result(Ok(true));
        let upstream: SharedUpstream = fake_upstream.clone();
        let cache = TemplateCache::new(ProxyConfig::default());

        let outcome =
            classify(params(), &template, &submission(&header), &verifier, &backend, &upstream, &cache, None)
                .await
                .unwrap();

        assert_eq!(outcome, ClassifyOutcome::SHARE_ACCEPTED);
        assert_eq!(fake_upstream.submit_block_calls.lock().unwrap().len(), 1);
        assert_eq!(backend.blocks_written(), 1);
    }

    #[tokio::test]
    async fn block_rejected_upstream_is_invalid_and_not_written() {
        let header = format!("0x{}", "1".repeat(64));
        let template = template_with(&header, 10, 100);
        let backend = MemoryBackend::new();
        let verifier = FakeVerifier::new(|_: &PowCandidate| true);
        let fake_upstream = StdArc::new(FakeUpstream::new("u0"));
        fake_upstream.set_submit_block_result(Ok(false));
        let upstream: SharedUpstream = fake_upstream;
        let cache = TemplateCache::new(ProxyConfig::default());

        let outcome =
            classify(params(), &template, &submission(&header), &verifier, &backend, &upstream, &cache, None)
                .await
                .unwrap();

        assert_eq!(outcome, ClassifyOutcome::INVALID);
        assert_eq!(backend.blocks_written(), 0);
    }

    #[tokio::test]
    async fn block_submission_transport_error_counts_as_valid_share_without_block_credit() {
        let header = format!("0x{}", "1".repeat(64));
        let template = template_with(&header, 10, 100);
        let backend = MemoryBackend::new();
        let verifier = FakeVerifier::new(|_: &PowCandidate| true);
        let fake_upstream = StdArc::new(FakeUpstream::new("u0"));
        fake_upstream.set_submit_block_result(Err("transport down".into()));
        let upstream: SharedUpstream = fake_upstream;
        let cache = TemplateCache::new(ProxyConfig::default());

        let outcome =
            classify(params(), &template, &submission(&header), &verifier, &backend, &upstream, &cache, None)
                .await
                .unwrap();

        assert_eq!(outcome, ClassifyOutcome::SHARE_ACCEPTED);
        assert_eq!(backend.blocks_written(), 0);
    }
}
