// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Handshake session table.
//!
//! Lives inside the domain state and is only touched under the domain lock.
//! Methods return [`GateEffect`]s for the domain to turn into outbound
//! events; nothing here performs I/O or cryptography.

use super::handshake::{CryptoResult, CryptoTask, HandshakeSession};
use super::{
    Authenticator, CryptoHandle, CryptoJob, CryptoOutcome, HandshakeRole, HandshakeState,
    IdentityToken, SecurityError,
};
use crate::config::SecurityConfig;
use crate::guid::GUID;
use crate::matching::handshake_role;
use crate::messages::HandshakeBody;
use crate::scheduler::FibonacciBackoff;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Whether associations with a participant may proceed.
#[derive(Debug, Clone, PartialEq)]
pub enum GateStatus {
    Validated(CryptoHandle),
    Pending,
    /// Rejected; waits for a fresh announcement or a new identity token
    Blocked,
}

/// Work the domain must carry out after a gate call.
#[derive(Debug)]
pub(crate) enum GateEffect {
    Send { remote: GUID, body: HandshakeBody },
    Run(CryptoJob),
    Validated { remote: GUID, handle: CryptoHandle },
    Rejected { remote: GUID, error: SecurityError },
}

/// Why a participant is blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    /// Credential refused: retry only with a different token
    Failed { token: Option<IdentityToken> },
    /// Deadline passed: retry on an announcement newer than `sequence`
    TimedOut { sequence: u64 },
}

/// What the gate knows about a remote participant when asked to act.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Peer<'a> {
    pub(crate) guid: GUID,
    pub(crate) token: Option<&'a IdentityToken>,
    pub(crate) sequence: u64,
}

pub(crate) struct SecurityGate {
    local: GUID,
    local_token: IdentityToken,
    deadline: Duration,
    resend_initial: Duration,
    resend_ceiling: Duration,
    sessions: HashMap<GUID, HandshakeSession>,
    blocked: HashMap<GUID, Block>,
    next_attempt: u64,
    next_handle: u64,
}

impl SecurityGate {
    pub(crate) fn new(
        local: GUID,
        authenticator: &dyn Authenticator,
        config: &SecurityConfig,
    ) -> Self {
        Self {
            local,
            local_token: authenticator.identity_token(),
            deadline: Duration::from_millis(config.handshake_deadline_ms),
            resend_initial: Duration::from_millis(config.resend_initial_ms),
            resend_ceiling: Duration::from_millis(config.resend_ceiling_ms),
            sessions: HashMap::new(),
            blocked: HashMap::new(),
            next_attempt: 1,
            next_handle: 1,
        }
    }

    pub(crate) fn identity_token(&self) -> &IdentityToken {
        &self.local_token
    }

    /// Handshake state with `remote`, `Rejected` while blocked.
    pub(crate) fn state(&self, remote: GUID) -> Option<HandshakeState> {
        if self.blocked.contains_key(&remote) {
            return Some(HandshakeState::Rejected);
        }
        self.sessions.get(&remote).map(|session| session.state)
    }

    #[cfg(test)]
    pub(crate) fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Status for `remote`, starting a handshake when none exists.
    pub(crate) fn ensure_session(
        &mut self,
        peer: Peer<'_>,
        now: Instant,
        effects: &mut Vec<GateEffect>,
    ) -> GateStatus {
        if self.blocked.contains_key(&peer.guid) {
            return GateStatus::Blocked;
        }
        if let Some(session) = self.sessions.get(&peer.guid) {
            return match (&session.state, &session.handle) {
                (HandshakeState::Validated, Some(handle)) => GateStatus::Validated(handle.clone()),
                _ => GateStatus::Pending,
            };
        }
        self.start_session(peer, now, effects);
        if self.blocked.contains_key(&peer.guid) {
            GateStatus::Blocked
        } else {
            GateStatus::Pending
        }
    }

    fn start_session(&mut self, peer: Peer<'_>, now: Instant, effects: &mut Vec<GateEffect>) {
        let Some(role) = handshake_role(self.local, peer.guid) else {
            log::error!("[handshake] Refusing handshake with own GUID {}", peer.guid);
            return;
        };
        let Some(token) = peer.token else {
            self.block(
                peer.guid,
                SecurityError::InvalidIdentityToken("no identity token announced".to_string()),
                None,
                peer.sequence,
                effects,
            );
            return;
        };

        let attempt = self.next_attempt;
        self.next_attempt += 1;
        let session = HandshakeSession::new(
            role,
            attempt,
            Some(token.clone()),
            peer.sequence,
            now + self.deadline,
            FibonacciBackoff::new(self.resend_initial, self.resend_ceiling),
        );
        log::debug!(
            "[handshake] Begin with {} as {:?} (attempt {})",
            peer.guid,
            role,
            attempt
        );
        self.sessions.insert(peer.guid, session);

        if role == HandshakeRole::Initiator {
            if let Some(session) = self.sessions.get_mut(&peer.guid) {
                session.busy = true;
            }
            effects.push(GateEffect::Run(self.job(peer.guid, attempt, CryptoTask::BeginRequest)));
        }
    }

    fn job(&self, remote: GUID, attempt: u64, task: CryptoTask) -> CryptoJob {
        CryptoJob {
            local: self.local,
            remote,
            attempt,
            task,
        }
    }

    /// A newer announcement arrived. Returns `true` when it lifted a block.
    pub(crate) fn on_fresh_announcement(&mut self, peer: Peer<'_>) -> bool {
        if let Some(session) = self.sessions.get_mut(&peer.guid) {
            session.remote_sequence = session.remote_sequence.max(peer.sequence);
        }
        let lift = match self.blocked.get(&peer.guid) {
            Some(Block::TimedOut { sequence }) => peer.sequence > *sequence,
            Some(Block::Failed { token }) => token.as_ref() != peer.token,
            None => false,
        };
        if lift {
            self.blocked.remove(&peer.guid);
            log::info!("[handshake] {} may retry after fresh announcement", peer.guid);
        }
        lift
    }

    /// Handle an inbound handshake message from `peer`.
    pub(crate) fn on_message(
        &mut self,
        peer: Peer<'_>,
        body: HandshakeBody,
        now: Instant,
        effects: &mut Vec<GateEffect>,
    ) {
        crate::trace_fn!("SecurityGate::on_message");
        let expected_role = match &body {
            HandshakeBody::Request { .. } | HandshakeBody::Final { .. } => HandshakeRole::Replier,
            HandshakeBody::Reply { .. } => HandshakeRole::Initiator,
        };
        let role = match self.sessions.get(&peer.guid) {
            Some(session) => Some(session.role),
            None => handshake_role(self.local, peer.guid),
        };
        if role != Some(expected_role) {
            log::debug!(
                "[handshake] Dropping {} from {}: wrong role",
                body.name(),
                peer.guid
            );
            return;
        }

        match body {
            HandshakeBody::Request {
                challenge,
                identity_token,
            } => self.on_request(peer, challenge, identity_token, now, effects),
            HandshakeBody::Reply {
                challenge,
                echoed,
                identity_token,
                signature,
            } => self.on_reply(peer.guid, challenge, echoed, identity_token, signature, effects),
            HandshakeBody::Final { echoed, signature } => {
                self.on_final(peer.guid, echoed, signature, effects)
            }
        }
    }

    fn on_request(
        &mut self,
        peer: Peer<'_>,
        challenge: super::Challenge,
        identity_token: IdentityToken,
        now: Instant,
        effects: &mut Vec<GateEffect>,
    ) {
        // A request from the initiator is itself a fresh attempt
        let lift = match self.blocked.get(&peer.guid) {
            Some(Block::TimedOut { .. }) => Some(true),
            Some(Block::Failed { token }) => Some(token.as_ref() != Some(&identity_token)),
            None => None,
        };
        match lift {
            Some(false) => return,
            Some(true) => {
                self.blocked.remove(&peer.guid);
            }
            None => {}
        }

        let restart = match self.sessions.get(&peer.guid) {
            None => false,
            Some(session) => match session.state {
                HandshakeState::RequestSent if session.remote_challenge == Some(challenge) => {
                    // Our reply was lost
                    if let Some(body) = session.last_sent.clone() {
                        effects.push(GateEffect::Send {
                            remote: peer.guid,
                            body,
                        });
                    }
                    return;
                }
                HandshakeState::BeginRequest if !session.busy => false,
                HandshakeState::RequestSent => true,
                _ => return,
            },
        };
        if restart {
            log::debug!("[handshake] {} restarted its request", peer.guid);
            self.sessions.remove(&peer.guid);
        }

        if !self.sessions.contains_key(&peer.guid) {
            let token = peer.token.cloned().unwrap_or_else(|| identity_token.clone());
            let attempt = self.next_attempt;
            self.next_attempt += 1;
            self.sessions.insert(
                peer.guid,
                HandshakeSession::new(
                    HandshakeRole::Replier,
                    attempt,
                    Some(token),
                    peer.sequence,
                    now + self.deadline,
                    FibonacciBackoff::new(self.resend_initial, self.resend_ceiling),
                ),
            );
        }

        let Some(session) = self.sessions.get_mut(&peer.guid) else {
            return;
        };
        session.busy = true;
        session.remote_challenge = Some(challenge);
        session.remote_token = Some(identity_token.clone());
        let attempt = session.attempt;
        effects.push(GateEffect::Run(self.job(
            peer.guid,
            attempt,
            CryptoTask::AnswerRequest {
                remote_token: identity_token,
                challenge_a: challenge,
            },
        )));
    }

    fn on_reply(
        &mut self,
        remote: GUID,
        challenge: super::Challenge,
        echoed: super::Challenge,
        identity_token: IdentityToken,
        signature: Vec<u8>,
        effects: &mut Vec<GateEffect>,
    ) {
        let Some(session) = self.sessions.get_mut(&remote) else {
            log::debug!("[handshake] Reply from {} without session", remote);
            return;
        };
        if session.local_challenge != Some(echoed) {
            log::debug!("[handshake] Reply from {} echoes a stale challenge", remote);
            return;
        }
        match session.state {
            HandshakeState::RequestSent if !session.busy => {}
            HandshakeState::Validated if session.remote_challenge == Some(challenge) => {
                // Our final message was lost
                if let Some(body) = session.last_sent.clone() {
                    effects.push(GateEffect::Send { remote, body });
                }
                return;
            }
            _ => return,
        }

        session.state = HandshakeState::ReplyReceived;
        session.busy = true;
        session.remote_challenge = Some(challenge);
        session.remote_token = Some(identity_token.clone());
        let attempt = session.attempt;
        let task = CryptoTask::CheckReply {
            remote_token: identity_token,
            challenge_a: echoed,
            challenge_b: challenge,
            signature,
        };
        effects.push(GateEffect::Run(self.job(remote, attempt, task)));
    }

    fn on_final(
        &mut self,
        remote: GUID,
        echoed: super::Challenge,
        signature: Vec<u8>,
        effects: &mut Vec<GateEffect>,
    ) {
        let Some(session) = self.sessions.get_mut(&remote) else {
            log::debug!("[handshake] Final from {} without session", remote);
            return;
        };
        if session.state != HandshakeState::RequestSent
            || session.busy
            || session.local_challenge != Some(echoed)
        {
            return;
        }
        let (Some(remote_token), Some(challenge_a)) =
            (session.remote_token.clone(), session.remote_challenge)
        else {
            return;
        };

        session.state = HandshakeState::ReplyReceived;
        session.busy = true;
        let attempt = session.attempt;
        let task = CryptoTask::CheckFinal {
            remote_token,
            challenge_a,
            challenge_b: echoed,
            signature,
        };
        effects.push(GateEffect::Run(self.job(remote, attempt, task)));
    }

    /// Apply the result of a crypto job.
    pub(crate) fn apply(
        &mut self,
        outcome: CryptoOutcome,
        now: Instant,
        effects: &mut Vec<GateEffect>,
    ) {
        let remote = outcome.remote;
        let Some(session) = self.sessions.get_mut(&remote) else {
            log::debug!("[handshake] Discarding result for cancelled session {}", remote);
            return;
        };
        if session.attempt != outcome.attempt {
            log::debug!(
                "[handshake] Discarding stale result for {} (attempt {} != {})",
                remote,
                outcome.attempt,
                session.attempt
            );
            return;
        }
        session.busy = false;

        let result = match outcome.result {
            Ok(result) => result,
            Err(error) => {
                let token = session.remote_token.clone();
                let sequence = session.remote_sequence;
                self.block(remote, error, token, sequence, effects);
                return;
            }
        };

        match result {
            CryptoResult::RequestReady { challenge_a } => {
                session.local_challenge = Some(challenge_a);
                session.state = HandshakeState::RequestSent;
                let body = HandshakeBody::Request {
                    challenge: challenge_a,
                    identity_token: self.local_token.clone(),
                };
                session.sent(body.clone(), now);
                effects.push(GateEffect::Send { remote, body });
            }
            CryptoResult::ReplyReady {
                challenge_b,
                signature,
            } => {
                let Some(challenge_a) = session.remote_challenge else {
                    return;
                };
                session.local_challenge = Some(challenge_b);
                session.state = HandshakeState::RequestSent;
                let body = HandshakeBody::Reply {
                    challenge: challenge_b,
                    echoed: challenge_a,
                    identity_token: self.local_token.clone(),
                    signature,
                };
                session.sent(body.clone(), now);
                effects.push(GateEffect::Send { remote, body });
            }
            CryptoResult::InitiatorDone { signature, secret } => {
                let Some(challenge_b) = session.remote_challenge else {
                    return;
                };
                let body = HandshakeBody::Final {
                    echoed: challenge_b,
                    signature,
                };
                let handle = CryptoHandle::new(self.next_handle, remote, secret);
                self.next_handle += 1;
                session.state = HandshakeState::Validated;
                session.last_sent = Some(body.clone());
                session.next_resend = None;
                session.handle = Some(handle.clone());
                effects.push(GateEffect::Send { remote, body });
                effects.push(GateEffect::Validated { remote, handle });
            }
            CryptoResult::ReplierDone { secret } => {
                let handle = CryptoHandle::new(self.next_handle, remote, secret);
                self.next_handle += 1;
                session.state = HandshakeState::Validated;
                session.next_resend = None;
                session.handle = Some(handle.clone());
                effects.push(GateEffect::Validated { remote, handle });
            }
        }
    }

    fn block(
        &mut self,
        remote: GUID,
        error: SecurityError,
        token: Option<IdentityToken>,
        sequence: u64,
        effects: &mut Vec<GateEffect>,
    ) {
        self.sessions.remove(&remote);
        let block = if error.is_credential_failure() {
            Block::Failed { token }
        } else {
            Block::TimedOut { sequence }
        };
        log::warn!("[handshake] Rejected {}: {}", remote, error);
        self.blocked.insert(remote, block);
        effects.push(GateEffect::Rejected { remote, error });
    }

    /// Resends and deadline expiry.
    pub(crate) fn on_tick(&mut self, now: Instant, effects: &mut Vec<GateEffect>) {
        let mut expired = Vec::new();
        for (remote, session) in &mut self.sessions {
            if session.state == HandshakeState::Validated {
                continue;
            }
            if now >= session.deadline {
                expired.push((*remote, session.remote_token.clone(), session.remote_sequence));
                continue;
            }
            let due = session.next_resend.is_some_and(|at| now >= at);
            if due && !session.busy {
                if let Some(body) = session.last_sent.clone() {
                    log::debug!("[handshake] Resending {} to {}", body.name(), remote);
                    effects.push(GateEffect::Send {
                        remote: *remote,
                        body,
                    });
                }
                session.next_resend = Some(now + session.backoff.advance());
            }
        }
        for (remote, token, sequence) in expired {
            self.block(remote, SecurityError::Timeout, token, sequence, effects);
        }
    }

    /// Forget everything about `remote` (participant removed).
    pub(crate) fn cancel(&mut self, remote: GUID) {
        if self.sessions.remove(&remote).is_some() {
            log::debug!("[handshake] Cancelled session with {}", remote);
        }
        self.blocked.remove(&remote);
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Challenge, SharedSecret};
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;

    /// Deterministic authenticator: signature = token || transcript.
    struct PlainAuth {
        token: Vec<u8>,
        counter: AtomicU8,
    }

    impl PlainAuth {
        fn new(token: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                token: token.to_vec(),
                counter: AtomicU8::new(0),
            })
        }
    }

    impl Authenticator for PlainAuth {
        fn identity_token(&self) -> IdentityToken {
            IdentityToken(self.token.clone())
        }
        fn validate_identity(&self, _: GUID, token: &IdentityToken) -> Result<(), SecurityError> {
            if token.0 == b"evil" {
                return Err(SecurityError::AuthenticationFailed("untrusted".into()));
            }
            Ok(())
        }
        fn generate_challenge(&self) -> Result<Challenge, SecurityError> {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            Ok(Challenge([self.token[0].wrapping_add(n); 32]))
        }
        fn sign(&self, transcript: &[u8]) -> Result<Vec<u8>, SecurityError> {
            Ok([self.token.as_slice(), transcript].concat())
        }
        fn verify(&self, token: &IdentityToken, t: &[u8], sig: &[u8]) -> Result<(), SecurityError> {
            if sig == [token.0.as_slice(), t].concat().as_slice() {
                Ok(())
            } else {
                Err(SecurityError::SignatureMismatch("bad signature".into()))
            }
        }
        fn derive_shared_secret(
            &self,
            _: &IdentityToken,
            t: &[u8],
        ) -> Result<SharedSecret, SecurityError> {
            Ok(SharedSecret::new(t.to_vec()))
        }
    }

    fn config() -> SecurityConfig {
        SecurityConfig {
            enabled: true,
            require_authentication: true,
            handshake_deadline_ms: 1_000,
            resend_initial_ms: 100,
            resend_ceiling_ms: 400,
            domain_key: None,
        }
    }

    struct Side {
        guid: GUID,
        auth: Arc<PlainAuth>,
        gate: SecurityGate,
        token: IdentityToken,
    }

    fn side(prefix: u8, token: &[u8]) -> Side {
        let guid = GUID::participant([prefix; 12]);
        let auth = PlainAuth::new(token);
        Side {
            guid,
            gate: SecurityGate::new(guid, auth.as_ref(), &config()),
            auth,
            token: IdentityToken(token.to_vec()),
        }
    }

    fn peer(side: &Side) -> Peer<'_> {
        Peer {
            guid: side.guid,
            token: Some(&side.token),
            sequence: 1,
        }
    }

    /// Run crypto jobs and deliver messages until both sides are quiet.
    fn pump(a: &mut Side, b: &mut Side, mut pending: Vec<(bool, GateEffect)>, now: Instant) -> Vec<GateEffect> {
        let mut done = Vec::new();
        while let Some((from_a, effect)) = pending.pop() {
            let (me, other) = if from_a { (&mut *a, &mut *b) } else { (&mut *b, &mut *a) };
            let mut out = Vec::new();
            match effect {
                GateEffect::Run(job) => {
                    let outcome = job.run(me.auth.as_ref());
                    me.gate.apply(outcome, now, &mut out);
                    pending.extend(out.into_iter().map(|e| (from_a, e)));
                }
                GateEffect::Send { body, .. } => {
                    let from = Peer {
                        guid: me.guid,
                        token: Some(&me.token),
                        sequence: 1,
                    };
                    other.gate.on_message(from, body, now, &mut out);
                    pending.extend(out.into_iter().map(|e| (!from_a, e)));
                }
                rest => done.push(rest),
            }
        }
        done
    }

    #[test]
    fn test_full_handshake_validates_both_sides() {
        let mut high = side(9, b"high");
        let mut low = side(1, b"low");
        let now = Instant::now();

        let mut effects = Vec::new();
        let status = high.gate.ensure_session(peer(&low), now, &mut effects);
        assert_eq!(status, GateStatus::Pending);
        let mut low_effects = Vec::new();
        assert_eq!(
            low.gate.ensure_session(peer(&high), now, &mut low_effects),
            GateStatus::Pending
        );
        assert!(low_effects.is_empty(), "replier waits for the request");

        let pending = effects.into_iter().map(|e| (true, e)).collect();
        let done = pump(&mut high, &mut low, pending, now);

        let validated: Vec<GUID> = done
            .iter()
            .filter_map(|e| match e {
                GateEffect::Validated { remote, .. } => Some(*remote),
                _ => None,
            })
            .collect();
        assert_eq!(validated.len(), 2);
        assert_eq!(high.gate.state(low.guid), Some(HandshakeState::Validated));
        assert_eq!(low.gate.state(high.guid), Some(HandshakeState::Validated));

        let secrets: Vec<Vec<u8>> = done
            .iter()
            .filter_map(|e| match e {
                GateEffect::Validated { handle, .. } => Some(handle.secret().as_bytes().to_vec()),
                _ => None,
            })
            .collect();
        assert_eq!(secrets[0], secrets[1]);
    }

    #[test]
    fn test_untrusted_identity_is_blocked_until_token_changes() {
        let mut high = side(9, b"high");
        let mut evil = side(1, b"evil");
        let now = Instant::now();

        let mut effects = Vec::new();
        high.gate.ensure_session(peer(&evil), now, &mut effects);
        let pending = effects.into_iter().map(|e| (true, e)).collect();
        let done = pump(&mut high, &mut evil, pending, now);

        assert!(done
            .iter()
            .any(|e| matches!(e, GateEffect::Rejected { error, .. } if error.is_credential_failure())));
        assert_eq!(high.gate.state(evil.guid), Some(HandshakeState::Rejected));

        // Same token, newer sequence: still blocked
        let same = Peer {
            guid: evil.guid,
            token: Some(&evil.token),
            sequence: 5,
        };
        assert!(!high.gate.on_fresh_announcement(same));

        let renewed = IdentityToken(b"renewed".to_vec());
        let changed = Peer {
            guid: evil.guid,
            token: Some(&renewed),
            sequence: 6,
        };
        assert!(high.gate.on_fresh_announcement(changed));
        assert_eq!(high.gate.state(evil.guid), None);
    }

    #[test]
    fn test_deadline_rejects_and_fresh_announcement_unblocks() {
        let mut high = side(9, b"high");
        let low = side(1, b"low");
        let now = Instant::now();

        let mut effects = Vec::new();
        high.gate.ensure_session(peer(&low), now, &mut effects);
        let Some(GateEffect::Run(job)) = effects.pop() else {
            panic!("expected a crypto job");
        };
        let outcome = job.run(high.auth.as_ref());
        high.gate.apply(outcome, now, &mut effects);
        assert!(matches!(effects.pop(), Some(GateEffect::Send { .. })));

        // Resend after the initial backoff, not before
        let mut tick = Vec::new();
        high.gate.on_tick(now + Duration::from_millis(50), &mut tick);
        assert!(tick.is_empty());
        high.gate.on_tick(now + Duration::from_millis(100), &mut tick);
        assert!(matches!(tick.pop(), Some(GateEffect::Send { .. })));

        high.gate.on_tick(now + Duration::from_millis(1_000), &mut tick);
        assert!(matches!(
            tick.pop(),
            Some(GateEffect::Rejected {
                error: SecurityError::Timeout,
                ..
            })
        ));
        assert_eq!(high.gate.state(low.guid), Some(HandshakeState::Rejected));

        let stale = Peer { sequence: 1, ..peer(&low) };
        assert!(!high.gate.on_fresh_announcement(stale));
        let fresh = Peer { sequence: 2, ..peer(&low) };
        assert!(high.gate.on_fresh_announcement(fresh));

        let mut restart = Vec::new();
        let status = high.gate.ensure_session(fresh, now, &mut restart);
        assert_eq!(status, GateStatus::Pending);
        assert!(matches!(restart.pop(), Some(GateEffect::Run(_))));
    }

    #[test]
    fn test_stale_outcome_is_discarded() {
        let mut high = side(9, b"high");
        let low = side(1, b"low");
        let now = Instant::now();

        let mut effects = Vec::new();
        high.gate.ensure_session(peer(&low), now, &mut effects);
        let Some(GateEffect::Run(job)) = effects.pop() else {
            panic!("expected a crypto job");
        };
        high.gate.cancel(low.guid);
        let outcome = job.run(high.auth.as_ref());
        high.gate.apply(outcome, now, &mut effects);
        assert!(effects.is_empty());
        assert_eq!(high.gate.session_count(), 0);
    }

    #[test]
    fn test_wrong_role_message_dropped() {
        let mut low = side(1, b"low");
        let high = side(9, b"high");
        let now = Instant::now();
        let mut effects = Vec::new();
        // The lower GUID never accepts a reply: it is never the initiator
        low.gate.on_message(
            peer(&high),
            HandshakeBody::Reply {
                challenge: Challenge([1; 32]),
                echoed: Challenge([2; 32]),
                identity_token: high.token.clone(),
                signature: vec![],
            },
            now,
            &mut effects,
        );
        assert!(effects.is_empty());
        assert_eq!(low.gate.state(high.guid), None);
    }

    #[test]
    fn test_replier_session_ignores_reply() {
        let mut low = side(1, b"low");
        let high = side(9, b"high");
        let now = Instant::now();

        let mut effects = Vec::new();
        assert_eq!(
            low.gate.ensure_session(peer(&high), now, &mut effects),
            GateStatus::Pending
        );
        low.gate.on_message(
            peer(&high),
            HandshakeBody::Reply {
                challenge: Challenge([1; 32]),
                echoed: Challenge([2; 32]),
                identity_token: high.token.clone(),
                signature: vec![],
            },
            now,
            &mut effects,
        );
        assert!(effects.is_empty());
        assert_eq!(low.gate.state(high.guid), Some(HandshakeState::BeginRequest));
    }
}
