//! Consent Protocol
//!
//! Issues unforgeable, single-use challenges and redeems them into
//! [`UserConsent`] proofs.
//!
//! A challenge carries a random token and a private HMAC key. The token is
//! meant to reach a human over a channel the agent does not control; the human
//! types it back, and only then is a consent minted with
//! `signature = HMAC-SHA256(key, response)`. Consent is therefore not a flag
//! the caller sets but proof of having observed a value it could not guess.
//!
//! Runtime checks performed here:
//! - Constant-time token comparison on redemption
//! - Single use: a redeemed challenge leaves the pending set
//! - Challenge and consent lifetime, evaluated lazily against the clock

use crate::clock::Clock;
use crate::config::{GateConfig, SIGNING_KEY_BYTES};
use crate::types::ThreatTier;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 tag
pub const SIGNATURE_BYTES: usize = 32;

/// Per-challenge HMAC key. Never serialized, never printed.
#[derive(Clone)]
struct SigningSecret([u8; SIGNING_KEY_BYTES]);

impl SigningSecret {
    fn generate() -> Self {
        let mut key = [0u8; SIGNING_KEY_BYTES];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(&self.0).ok()
    }

    fn sign(&self, message: &[u8]) -> Option<[u8; SIGNATURE_BYTES]> {
        let mut mac = self.mac()?;
        mac.update(message);
        let mut tag = [0u8; SIGNATURE_BYTES];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Some(tag)
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self.mac() {
            Some(mut mac) => {
                mac.update(message);
                mac.verify_slice(signature).is_ok()
            }
            None => false,
        }
    }

    fn same_as(&self, other: &SigningSecret) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// A challenge presented to a human before a consent-requiring operation.
///
/// Only [`ConsentProtocol::request_consent`] creates these.
#[derive(Debug, Clone)]
pub struct ConsentChallenge {
    token: String,
    description: String,
    affected_resources: Vec<String>,
    threat_tier: ThreatTier,
    issued_at: DateTime<Utc>,
    signing_key: SigningSecret,
}

impl ConsentChallenge {
    /// The secret the human must type back. Transmit it only over a
    /// human-facing channel.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn affected_resources(&self) -> &[String] {
        &self.affected_resources
    }

    pub fn threat_tier(&self) -> ThreatTier {
        self.threat_tier
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

/// Proof that a human approved one specific operation.
///
/// Bound to the challenge it answers, so it cannot authorize a different
/// operation. Not `Clone`: executing with it consumes it.
#[derive(Debug)]
pub struct UserConsent {
    challenge: ConsentChallenge,
    response_token: String,
    signature: [u8; SIGNATURE_BYTES],
    granted_at: DateTime<Utc>,
}

impl UserConsent {
    pub fn challenge(&self) -> &ConsentChallenge {
        &self.challenge
    }

    /// Description of the operation this consent was granted for
    pub fn description(&self) -> &str {
        &self.challenge.description
    }

    pub fn threat_tier(&self) -> ThreatTier {
        self.challenge.threat_tier
    }

    pub fn response_token(&self) -> &str {
        &self.response_token
    }

    pub fn signature_hex(&self) -> String {
        hex::encode(self.signature)
    }

    pub fn granted_at(&self) -> DateTime<Utc> {
        self.granted_at
    }

    /// Recompute the HMAC over the response token and compare in constant time
    pub fn is_valid(&self) -> bool {
        self.challenge
            .signing_key
            .verify(self.response_token.as_bytes(), &self.signature)
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.granted_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age_at(now) > ttl
    }

    /// Consent whose signature was not produced by the challenge key
    #[cfg(test)]
    pub(crate) fn forged(challenge: ConsentChallenge, granted_at: DateTime<Utc>) -> Self {
        let response_token = challenge.token.clone();
        Self {
            challenge,
            response_token,
            signature: [0u8; SIGNATURE_BYTES],
            granted_at,
        }
    }
}

/// Issues and redeems challenges for one session.
///
/// The pending set is per session and never shared.
pub struct ConsentProtocol {
    pending: Mutex<HashMap<String, ConsentChallenge>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    token_bytes: usize,
}

impl ConsentProtocol {
    pub fn new(clock: Arc<dyn Clock>, config: &GateConfig) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            clock,
            ttl: config.consent_ttl(),
            token_bytes: config.token_bytes,
        }
    }

    /// Issue a fresh challenge with its own key and token
    pub fn request_consent(
        &self,
        description: impl Into<String>,
        affected_resources: Vec<String>,
        threat_tier: ThreatTier,
    ) -> ConsentChallenge {
        let now = self.clock.now();
        let mut pending = self.pending.lock();
        pending.retain(|_, c| now - c.issued_at <= self.ttl);

        let mut token = generate_token(self.token_bytes);
        while pending.contains_key(&token) {
            token = generate_token(self.token_bytes);
        }

        let challenge = ConsentChallenge {
            token,
            description: description.into(),
            affected_resources,
            threat_tier,
            issued_at: now,
            signing_key: SigningSecret::generate(),
        };
        pending.insert(challenge.token.clone(), challenge.clone());

        tracing::info!(
            threat_tier = %threat_tier,
            description = %challenge.description,
            "consent challenge issued"
        );
        challenge
    }

    /// Redeem a challenge with the response typed by a human.
    ///
    /// Returns `None` when the response does not match, the challenge was
    /// already redeemed, or it outlived the consent lifetime. No reason is
    /// given to the caller.
    pub fn grant_consent(
        &self,
        challenge: &ConsentChallenge,
        response: &str,
    ) -> Option<UserConsent> {
        let matches: bool = response.as_bytes().ct_eq(challenge.token.as_bytes()).into();
        if !matches {
            tracing::warn!(description = %challenge.description, "consent response rejected");
            return None;
        }

        let now = self.clock.now();
        let stored = {
            let mut pending = self.pending.lock();
            let Some(stored) = pending.remove(&challenge.token) else {
                tracing::warn!(description = %challenge.description, "consent challenge not pending");
                return None;
            };
            stored
        };

        if !stored.signing_key.same_as(&challenge.signing_key) {
            tracing::error!("presented challenge does not match the issued one");
            return None;
        }
        if now - stored.issued_at > self.ttl {
            tracing::warn!(description = %stored.description, "consent challenge expired before redemption");
            return None;
        }

        let signature = stored.signing_key.sign(response.as_bytes())?;
        tracing::info!(description = %stored.description, "consent granted");
        Some(UserConsent {
            challenge: stored,
            response_token: response.to_owned(),
            signature,
            granted_at: now,
        })
    }

    pub fn is_pending(&self, challenge: &ConsentChallenge) -> bool {
        self.pending.lock().contains_key(&challenge.token)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn generate_token(bytes: usize) -> String {
    let mut raw = vec![0u8; bytes];
    OsRng.fill_bytes(&mut raw);
    hex::encode(raw)
}
