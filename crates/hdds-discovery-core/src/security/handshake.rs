// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-participant handshake session and its off-lock crypto steps.
//!
//! A session only records protocol state. Every step needing the
//! [`Authenticator`] is packaged as a [`CryptoJob`], executed by the outbound
//! event queue without the domain lock, and its [`CryptoOutcome`] applied
//! back under the lock. The `attempt` number ties an outcome to the session
//! generation that produced it; outcomes for a cancelled or restarted
//! session are discarded.

use super::{
    transcript, Authenticator, Challenge, CryptoHandle, HandshakeRole, IdentityToken,
    SecurityError, SharedSecret, TranscriptTag,
};
use crate::guid::GUID;
use crate::messages::HandshakeBody;
use crate::scheduler::FibonacciBackoff;
use std::fmt;
use std::time::Instant;

/// Handshake progress with one remote participant.
///
/// Initiator: `BeginRequest` (generating challenge) -> `RequestSent`
/// (request out) -> `ReplyReceived` (validating reply) -> `Validated`.
///
/// Replier: `BeginRequest` (awaiting request) -> `RequestSent` (reply out)
/// -> `ReplyReceived` (validating final) -> `Validated`.
///
/// Any failure or the deadline leads to `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    BeginRequest,
    RequestSent,
    ReplyReceived,
    Validated,
    Rejected,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BeginRequest => "BeginRequest",
            Self::RequestSent => "RequestSent",
            Self::ReplyReceived => "ReplyReceived",
            Self::Validated => "Validated",
            Self::Rejected => "Rejected",
        };
        f.write_str(name)
    }
}

pub(crate) struct HandshakeSession {
    pub(crate) role: HandshakeRole,
    pub(crate) state: HandshakeState,
    pub(crate) attempt: u64,
    /// A crypto job for this attempt is in flight
    pub(crate) busy: bool,
    pub(crate) local_challenge: Option<Challenge>,
    pub(crate) remote_challenge: Option<Challenge>,
    pub(crate) remote_token: Option<IdentityToken>,
    /// Latest announcement sequence seen from the remote
    pub(crate) remote_sequence: u64,
    pub(crate) deadline: Instant,
    pub(crate) backoff: FibonacciBackoff,
    pub(crate) next_resend: Option<Instant>,
    pub(crate) last_sent: Option<HandshakeBody>,
    pub(crate) handle: Option<CryptoHandle>,
}

impl HandshakeSession {
    pub(crate) fn new(
        role: HandshakeRole,
        attempt: u64,
        remote_token: Option<IdentityToken>,
        remote_sequence: u64,
        deadline: Instant,
        backoff: FibonacciBackoff,
    ) -> Self {
        Self {
            role,
            state: HandshakeState::BeginRequest,
            attempt,
            busy: false,
            local_challenge: None,
            remote_challenge: None,
            remote_token,
            remote_sequence,
            deadline,
            backoff,
            next_resend: None,
            last_sent: None,
            handle: None,
        }
    }

    /// Record a sent message and arm the resend timer.
    pub(crate) fn sent(&mut self, body: HandshakeBody, now: Instant) {
        self.last_sent = Some(body);
        self.backoff.reset();
        self.next_resend = Some(now + self.backoff.current());
    }
}

/// Crypto work for one handshake step.
#[derive(Debug)]
pub(crate) struct CryptoJob {
    pub(crate) local: GUID,
    pub(crate) remote: GUID,
    pub(crate) attempt: u64,
    pub(crate) task: CryptoTask,
}

#[derive(Debug)]
pub(crate) enum CryptoTask {
    /// Initiator: produce challenge_a
    BeginRequest,
    /// Replier: check the initiator, produce challenge_b and sign the reply
    AnswerRequest {
        remote_token: IdentityToken,
        challenge_a: Challenge,
    },
    /// Initiator: verify the reply, sign the final message, derive the secret
    CheckReply {
        remote_token: IdentityToken,
        challenge_a: Challenge,
        challenge_b: Challenge,
        signature: Vec<u8>,
    },
    /// Replier: verify the final message, derive the secret
    CheckFinal {
        remote_token: IdentityToken,
        challenge_a: Challenge,
        challenge_b: Challenge,
        signature: Vec<u8>,
    },
}

#[derive(Debug)]
pub(crate) struct CryptoOutcome {
    pub(crate) remote: GUID,
    pub(crate) attempt: u64,
    pub(crate) result: Result<CryptoResult, SecurityError>,
}

#[derive(Debug)]
pub(crate) enum CryptoResult {
    RequestReady {
        challenge_a: Challenge,
    },
    ReplyReady {
        challenge_b: Challenge,
        signature: Vec<u8>,
    },
    InitiatorDone {
        signature: Vec<u8>,
        secret: SharedSecret,
    },
    ReplierDone {
        secret: SharedSecret,
    },
}

impl CryptoJob {
    /// Execute the step. Must be called without the domain lock held.
    pub(crate) fn run(self, auth: &dyn Authenticator) -> CryptoOutcome {
        crate::trace_fn!("CryptoJob::run");
        let (local, remote) = (self.local, self.remote);
        let result = match self.task {
            CryptoTask::BeginRequest => auth
                .generate_challenge()
                .map(|challenge_a| CryptoResult::RequestReady { challenge_a }),
            CryptoTask::AnswerRequest {
                remote_token,
                challenge_a,
            } => auth
                .validate_identity(remote, &remote_token)
                .and_then(|()| auth.generate_challenge())
                .and_then(|challenge_b| {
                    let bytes =
                        transcript(remote, local, &challenge_a, &challenge_b, TranscriptTag::Reply);
                    auth.sign(&bytes).map(|signature| CryptoResult::ReplyReady {
                        challenge_b,
                        signature,
                    })
                }),
            CryptoTask::CheckReply {
                remote_token,
                challenge_a,
                challenge_b,
                signature,
            } => {
                let reply =
                    transcript(local, remote, &challenge_a, &challenge_b, TranscriptTag::Reply);
                let fin = transcript(local, remote, &challenge_a, &challenge_b, TranscriptTag::Final);
                let key = transcript(local, remote, &challenge_a, &challenge_b, TranscriptTag::Secret);
                auth.validate_identity(remote, &remote_token)
                    .and_then(|()| auth.verify(&remote_token, &reply, &signature))
                    .and_then(|()| auth.sign(&fin))
                    .and_then(|signature| {
                        auth.derive_shared_secret(&remote_token, &key)
                            .map(|secret| CryptoResult::InitiatorDone { signature, secret })
                    })
            }
            CryptoTask::CheckFinal {
                remote_token,
                challenge_a,
                challenge_b,
                signature,
            } => {
                let fin = transcript(remote, local, &challenge_a, &challenge_b, TranscriptTag::Final);
                let key = transcript(remote, local, &challenge_a, &challenge_b, TranscriptTag::Secret);
                auth.verify(&remote_token, &fin, &signature)
                    .and_then(|()| auth.derive_shared_secret(&remote_token, &key))
                    .map(|secret| CryptoResult::ReplierDone { secret })
            }
        };
        CryptoOutcome {
            remote,
            attempt: self.attempt,
            result,
        }
    }
}
