//! Trust prompt delivery.
//!
//! The trust evaluator suspends while a human decides whether to accept a
//! certificate. [`TrustPromptCenter`] bridges that suspension point to an
//! external consumer (typically a UI): prompts arrive on a channel, each
//! carrying the challenge and a one-shot responder. The fail-safe direction
//! is always Deny: no consumer attached, stream closed, or prompt dropped
//! without an answer all resolve to [`TrustDecision::Deny`].

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use transmission_proto::trust::{TrustChallenge, TrustDecision};

/// Async callback producing the user's verdict for a challenge.
pub type DecisionHandler = Arc<
    dyn Fn(TrustChallenge) -> Pin<Box<dyn Future<Output = TrustDecision> + Send>> + Send + Sync,
>;

/// Prompts queued ahead of a slow consumer before the evaluator suspends on
/// channel capacity.
const PROMPT_QUEUE_DEPTH: usize = 8;

/// One certificate question awaiting an answer.
///
/// Resolution consumes the prompt, so answering twice cannot be expressed.
/// Dropping an unresolved prompt denies it.
#[derive(Debug)]
pub struct TrustPrompt {
    challenge: TrustChallenge,
    responder: oneshot::Sender<TrustDecision>,
}

impl TrustPrompt {
    pub fn challenge(&self) -> &TrustChallenge {
        &self.challenge
    }

    /// Delivers the decision to the waiting evaluator.
    pub fn resolve(self, decision: TrustDecision) {
        // The evaluator may have been cancelled meanwhile; nothing to do.
        let _ = self.responder.send(decision);
    }
}

/// The part of the center the decision handlers hold on to.
struct PromptShared {
    sender: mpsc::Sender<TrustPrompt>,
    attached: AtomicBool,
}

impl PromptShared {
    /// Emits a prompt and suspends until it is resolved.
    async fn prompt(&self, challenge: TrustChallenge) -> TrustDecision {
        // Nobody listening: deny instead of hanging forever.
        if !self.attached.load(Ordering::Acquire) {
            return TrustDecision::Deny;
        }

        let (responder, decision) = oneshot::channel();
        let prompt = TrustPrompt {
            challenge,
            responder,
        };
        if self.sender.send(prompt).await.is_err() {
            // Consumer closed the stream.
            return TrustDecision::Deny;
        }
        decision.await.unwrap_or(TrustDecision::Deny)
    }
}

/// Fan-out point for trust prompts.
pub struct TrustPromptCenter {
    shared: Arc<PromptShared>,
    receiver: Mutex<Option<mpsc::Receiver<TrustPrompt>>>,
}

impl TrustPromptCenter {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel(PROMPT_QUEUE_DEPTH);
        Self {
            shared: Arc::new(PromptShared {
                sender,
                attached: AtomicBool::new(false),
            }),
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// Takes the prompt stream. Only the first caller receives it; there is
    /// one consumer per client.
    pub fn subscribe(&self) -> Option<mpsc::Receiver<TrustPrompt>> {
        let receiver = self.receiver.lock().unwrap().take();
        if receiver.is_some() {
            self.shared.attached.store(true, Ordering::Release);
        }
        receiver
    }

    /// Builds the decision handler the trust evaluator invokes.
    pub fn handler(&self) -> DecisionHandler {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |challenge| {
            let shared = Arc::clone(&shared);
            Box::pin(async move { shared.prompt(challenge).await })
        })
    }
}

impl Default for TrustPromptCenter {
    fn default() -> Self {
        Self::new()
    }
}
