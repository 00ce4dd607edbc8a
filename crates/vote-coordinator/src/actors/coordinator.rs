//! `CoordinatorActor` - the single consistency boundary for vote state.
//!
//! The actor exclusively owns the `ClientRegistry`, `VoteLedger` and
//! `VotingRound`. Every operation is a message on its mailbox, so votes,
//! registrations and round transitions are applied one at a time in arrival
//! order. Only immutable `TallySnapshot`s and cloned sink handles leave the
//! actor.
//!
//! # Broadcasts
//!
//! Each applied vote produces one `UPDATE` job addressed to the identities
//! that have voted; each applied round transition produces one announcement
//! addressed to every registered identity. Jobs go to the `Dispatcher`:
//!
//! - locked strategy: the actor replies first, then writes every sink itself,
//!   so one stalled sink stalls the mailbox
//! - decoupled strategy: the job is queued and the actor moves on
//!
//! # Round deadline
//!
//! Starting a round schedules a one-shot timer task that sends
//! `RoundDeadline` back through the mailbox. A vote that observes an elapsed
//! deadline is rejected with `RoundExpired` and also schedules
//! `RoundDeadline`, without re-entering the actor synchronously.

use super::dispatch::{BroadcastKind, DispatchJob, DispatchStrategy, Dispatcher};
use super::messages::{BroadcastStatus, CoordinatorMessage, RoundStatus, VoteReceipt};
use super::metrics::{CoordinatorMetrics, QueueKind, QueueMonitor};
use crate::errors::VcError;
use crate::observability::metrics as obs;
use crate::protocol;
use crate::sink::ClientSink;
use crate::voting::{
    ClientRegistry, RoundPhase, TallySnapshot, Transition, VoteLedger, VotingRound,
};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Default channel buffer size for the coordinator mailbox.
const COORDINATOR_CHANNEL_BUFFER: usize = 1000;

/// Drain deadline used when the actor stops without an explicit shutdown.
const DEFAULT_DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// Constructor options for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Valid options, in display order.
    pub options: Vec<String>,
    pub strategy: DispatchStrategy,
    /// Bytes of padding appended to `UPDATE` lines (0 = none).
    pub update_padding: usize,
}

impl CoordinatorSettings {
    #[must_use]
    pub fn new<I, S>(options: I, strategy: DispatchStrategy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: options.into_iter().map(Into::into).collect(),
            strategy,
            update_padding: 0,
        }
    }

    #[must_use]
    pub fn with_update_padding(mut self, bytes: usize) -> Self {
        self.update_padding = bytes;
        self
    }

    /// Options must be non-empty, non-blank and unique.
    ///
    /// # Errors
    ///
    /// `VcError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<(), VcError> {
        if self.options.is_empty() {
            return Err(VcError::Config("option set is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for option in &self.options {
            if option.trim().is_empty() || option.trim() != option {
                return Err(VcError::Config(format!("invalid option {option:?}")));
            }
            if !seen.insert(option.as_str()) {
                return Err(VcError::Config(format!("duplicate option {option:?}")));
            }
        }
        Ok(())
    }
}

/// Handle to the `CoordinatorActor`.
///
/// Cheap to clone. Every method is a request/response round trip through the
/// actor mailbox; once the actor has stopped they fail with `ShuttingDown`.
#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<CoordinatorMessage>,
    cancel_token: CancellationToken,
    metrics: Arc<CoordinatorMetrics>,
}

impl CoordinatorHandle {
    /// Spawn a coordinator and return a handle to it.
    ///
    /// # Errors
    ///
    /// `VcError::Config` if the settings are invalid.
    pub fn spawn(
        settings: CoordinatorSettings,
        metrics: Arc<CoordinatorMetrics>,
    ) -> Result<Self, VcError> {
        settings.validate()?;

        let (sender, receiver) = mpsc::channel(COORDINATOR_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = CoordinatorActor {
            receiver,
            self_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            strategy: settings.strategy.as_str(),
            ledger: VoteLedger::new(settings.options.clone()),
            options: settings.options,
            round: VotingRound::new(),
            registry: ClientRegistry::new(),
            dispatcher: Dispatcher::new(settings.strategy, Arc::clone(&metrics)),
            update_padding: settings.update_padding,
            next_seq: 0,
            deadline_task: None,
            stopped: false,
            metrics: Arc::clone(&metrics),
            mailbox: QueueMonitor::new(QueueKind::Coordinator, COORDINATOR_CHANNEL_BUFFER),
        };

        tokio::spawn(actor.run());

        Ok(Self {
            sender,
            cancel_token,
            metrics,
        })
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> CoordinatorMessage,
    ) -> Result<T, VcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| VcError::ShuttingDown)?;
        rx.await.map_err(|_| VcError::ShuttingDown)
    }

    /// Register a client session.
    ///
    /// Returns the round status at registration time.
    pub async fn register(&self, sink: ClientSink) -> Result<RoundStatus, VcError> {
        self.request(|respond_to| CoordinatorMessage::Register { sink, respond_to })
            .await?
    }

    /// Remove whatever session holds `client_id`. Idempotent.
    pub async fn unregister(&self, client_id: impl Into<String>) -> Result<bool, VcError> {
        let client_id = client_id.into();
        self.request(|respond_to| CoordinatorMessage::Unregister {
            client_id,
            session_id: None,
            respond_to,
        })
        .await
    }

    /// Remove exactly the session behind `sink`, leaving any newer session
    /// for the same identity in place.
    pub async fn release(&self, sink: &ClientSink) -> Result<bool, VcError> {
        let client_id = sink.identity().to_string();
        let session_id = Some(sink.session_id());
        self.request(|respond_to| CoordinatorMessage::Unregister {
            client_id,
            session_id,
            respond_to,
        })
        .await
    }

    /// Cast a vote for `client_id`.
    pub async fn submit_vote(
        &self,
        client_id: impl Into<String>,
        option: impl Into<String>,
    ) -> Result<VoteReceipt, VcError> {
        let client_id = client_id.into();
        let option = option.into();
        self.request(|respond_to| CoordinatorMessage::SubmitVote {
            client_id,
            option,
            respond_to,
        })
        .await?
    }

    /// Start the round. A no-op (reported as `Ignored`) unless `NotStarted`.
    pub async fn start_round(&self, duration: Duration) -> Result<Transition, VcError> {
        self.request(|respond_to| CoordinatorMessage::StartRound {
            duration,
            respond_to,
        })
        .await?
    }

    /// End the round early. A no-op (reported as `Ignored`) unless `Active`.
    pub async fn end_round(&self) -> Result<Transition, VcError> {
        self.request(|respond_to| CoordinatorMessage::EndRound { respond_to })
            .await
    }

    /// Get the current round status.
    pub async fn status(&self) -> Result<RoundStatus, VcError> {
        self.request(|respond_to| CoordinatorMessage::GetStatus { respond_to })
            .await
    }

    /// Drain queued broadcasts (up to `deadline`), stop workers and stop the
    /// actor.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), VcError> {
        self.request(|respond_to| CoordinatorMessage::Shutdown {
            deadline,
            respond_to,
        })
        .await?
    }

    /// Shared counters for this coordinator.
    #[must_use]
    pub fn metrics(&self) -> &Arc<CoordinatorMetrics> {
        &self.metrics
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Token cancelled when the actor stops.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// The coordinator actor.
pub struct CoordinatorActor {
    receiver: mpsc::Receiver<CoordinatorMessage>,
    /// Weak so the actor still stops once every handle is dropped.
    self_sender: mpsc::WeakSender<CoordinatorMessage>,
    cancel_token: CancellationToken,
    strategy: &'static str,
    options: Vec<String>,
    round: VotingRound,
    ledger: VoteLedger,
    registry: ClientRegistry,
    dispatcher: Dispatcher,
    update_padding: usize,
    next_seq: u64,
    deadline_task: Option<JoinHandle<()>>,
    stopped: bool,
    metrics: Arc<CoordinatorMetrics>,
    mailbox: QueueMonitor,
}

impl CoordinatorActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "vc.actor.coordinator", fields(strategy = self.strategy))]
    async fn run(mut self) {
        info!(
            target: "vc.actor.coordinator",
            strategy = self.strategy,
            options = ?self.options,
            "CoordinatorActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "vc.actor.coordinator",
                        "CoordinatorActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.observe(self.receiver.len());
                            let stop = self.handle_message(message).await;
                            self.mailbox.record_processed();
                            if stop {
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "vc.actor.coordinator",
                                "CoordinatorActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.stop(DEFAULT_DRAIN_DEADLINE).await;

        info!(
            target: "vc.actor.coordinator",
            registered = self.registry.len(),
            voters = self.ledger.voter_count(),
            phase = %self.round.phase(),
            messages_processed = self.mailbox.processed(),
            peak_mailbox_depth = self.mailbox.high_water(),
            "CoordinatorActor stopped"
        );
    }

    /// Handle a single message. Returns `true` when the actor should stop.
    async fn handle_message(&mut self, message: CoordinatorMessage) -> bool {
        match message {
            CoordinatorMessage::Register { sink, respond_to } => {
                let result = self.handle_register(sink);
                let _ = respond_to.send(result);
            }

            CoordinatorMessage::Unregister {
                client_id,
                session_id,
                respond_to,
            } => {
                let removed = self.handle_unregister(&client_id, session_id);
                let _ = respond_to.send(removed);
            }

            CoordinatorMessage::SubmitVote {
                client_id,
                option,
                respond_to,
            } => {
                self.handle_vote(client_id, option, respond_to).await;
            }

            CoordinatorMessage::StartRound {
                duration,
                respond_to,
            } => {
                self.handle_start_round(duration, respond_to).await;
            }

            CoordinatorMessage::EndRound { respond_to } => match self.close_round("explicit") {
                Some(job) => {
                    self.publish(job, respond_to, |_| Transition::Applied).await;
                }
                None => {
                    let _ = respond_to.send(Transition::Ignored(self.round.phase()));
                }
            },

            CoordinatorMessage::RoundDeadline => {
                if let Some(job) = self.close_round("deadline") {
                    self.dispatcher.dispatch(job).await;
                }
            }

            CoordinatorMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.status());
            }

            CoordinatorMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                self.stop(deadline).await;
                let _ = respond_to.send(Ok(()));
                return true;
            }
        }
        false
    }

    fn handle_register(&mut self, sink: ClientSink) -> Result<RoundStatus, VcError> {
        let client_id = sink.identity().to_string();

        if let Err(e) = self.registry.register(sink) {
            warn!(
                target: "vc.actor.coordinator",
                client_id = %client_id,
                "Registration rejected, identity in use"
            );
            return Err(e);
        }

        self.registered_changed();
        info!(
            target: "vc.actor.coordinator",
            client_id = %client_id,
            registered = self.registry.len(),
            "Client registered"
        );
        Ok(self.status())
    }

    fn handle_unregister(&mut self, client_id: &str, session_id: Option<Uuid>) -> bool {
        let removed = match session_id {
            Some(session_id) => self.registry.unregister_session(client_id, session_id),
            None => self.registry.unregister(client_id),
        };

        if removed.is_some() {
            self.registered_changed();
            info!(
                target: "vc.actor.coordinator",
                client_id = %client_id,
                registered = self.registry.len(),
                "Client unregistered"
            );
        }
        removed.is_some()
    }

    async fn handle_vote(
        &mut self,
        client_id: String,
        option: String,
        respond_to: oneshot::Sender<Result<VoteReceipt, VcError>>,
    ) {
        let started = Instant::now();

        let Some(voter) = self.registry.get(&client_id).cloned() else {
            let error = VcError::UnknownClient(client_id.clone());
            self.reject_vote(&client_id, error, respond_to);
            return;
        };

        let tally = match self
            .ledger
            .record_vote(&self.round, &client_id, &option, started)
        {
            Ok(tally) => tally,
            Err(error) => {
                if error == VcError::RoundExpired {
                    self.request_round_end();
                }
                self.reject_vote(&client_id, error, respond_to);
                return;
            }
        };

        self.metrics.record_vote_accepted();
        obs::record_vote("accepted");
        info!(
            target: "vc.actor.coordinator",
            client_id = %client_id,
            option = %option,
            total = tally.total(),
            "Vote accepted"
        );

        // Queued ahead of the update so the voter sees OK before UPDATE.
        let acknowledged = voter
            .try_send(Arc::from(protocol::vote_accepted_line(&option)))
            .is_ok();

        let job = self.update_job(&tally);
        let receipt = VoteReceipt {
            option,
            tally,
            broadcast: BroadcastStatus::Inline,
            acknowledged,
        };
        self.publish(job, respond_to, move |broadcast| {
            Ok(VoteReceipt {
                broadcast,
                ..receipt
            })
        })
        .await;

        obs::record_vote_latency(started.elapsed());
    }

    fn reject_vote(
        &self,
        client_id: &str,
        error: VcError,
        respond_to: oneshot::Sender<Result<VoteReceipt, VcError>>,
    ) {
        self.metrics.record_vote_rejected();
        obs::record_vote(error.reason());
        debug!(
            target: "vc.actor.coordinator",
            client_id = %client_id,
            reason = error.reason(),
            "Vote rejected"
        );
        let _ = respond_to.send(Err(error));
    }

    async fn handle_start_round(
        &mut self,
        duration: Duration,
        respond_to: oneshot::Sender<Result<Transition, VcError>>,
    ) {
        let transition = match self.round.start(duration, Instant::now()) {
            Ok(transition) => transition,
            Err(e) => {
                warn!(
                    target: "vc.actor.coordinator",
                    duration_secs = duration.as_secs(),
                    "Start rejected, duration out of range"
                );
                let _ = respond_to.send(Err(e));
                return;
            }
        };
        if let Transition::Ignored(phase) = transition {
            info!(
                target: "vc.actor.coordinator",
                phase = %phase,
                "Start ignored, round already started"
            );
            let _ = respond_to.send(Ok(transition));
            return;
        }

        self.schedule_deadline(duration);
        obs::record_round_transition(RoundPhase::Active.as_str());
        info!(
            target: "vc.actor.coordinator",
            duration_secs = duration.as_secs(),
            registered = self.registry.len(),
            "Round started"
        );

        let job = self.announcement(
            BroadcastKind::RoundStarted,
            protocol::round_started_line(duration, &self.options),
        );
        self.publish(job, respond_to, |_| Ok(Transition::Applied)).await;
    }

    /// Apply `Active -> Ended` and build the final announcement.
    fn close_round(&mut self, cause: &'static str) -> Option<DispatchJob> {
        if let Transition::Ignored(phase) = self.round.end() {
            debug!(
                target: "vc.actor.coordinator",
                cause,
                phase = %phase,
                "End ignored, round not active"
            );
            return None;
        }

        if let Some(task) = self.deadline_task.take() {
            task.abort();
        }

        let tally = self.ledger.snapshot();
        obs::record_round_transition(RoundPhase::Ended.as_str());
        info!(
            target: "vc.actor.coordinator",
            cause,
            final_tally = %tally,
            voters = self.ledger.voter_count(),
            "Round ended"
        );

        Some(self.announcement(BroadcastKind::RoundEnded, protocol::round_ended_line(&tally)))
    }

    fn schedule_deadline(&mut self, duration: Duration) {
        let sender = self.self_sender.clone();
        self.deadline_task = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Some(sender) = sender.upgrade() {
                let _ = sender.send(CoordinatorMessage::RoundDeadline).await;
            }
        }));
    }

    /// Ask for a round end through the mailbox, from outside the current
    /// message.
    fn request_round_end(&self) {
        if let Some(sender) = self.self_sender.upgrade() {
            tokio::spawn(async move {
                let _ = sender.send(CoordinatorMessage::RoundDeadline).await;
            });
        }
    }

    fn update_job(&mut self, tally: &TallySnapshot) -> DispatchJob {
        let ledger = &self.ledger;
        let recipients = self
            .registry
            .snapshot_where(|client_id| ledger.has_voted(client_id));
        let payload = protocol::update_line(tally, self.update_padding);
        DispatchJob::new(BroadcastKind::Update, self.bump_seq(), Arc::from(payload), recipients)
    }

    fn announcement(&mut self, kind: BroadcastKind, line: String) -> DispatchJob {
        let recipients = self.registry.snapshot();
        DispatchJob::new(kind, self.bump_seq(), Arc::from(line), recipients)
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Hand `job` to the dispatcher and answer the caller.
    ///
    /// Inline dispatch answers first and then writes, matching what a caller
    /// of the locked strategy observes. Queued dispatch answers once the job
    /// is queued (or dropped) so the reply carries the outcome.
    async fn publish<T>(
        &self,
        job: DispatchJob,
        respond_to: oneshot::Sender<T>,
        reply: impl FnOnce(BroadcastStatus) -> T,
    ) {
        if self.dispatcher.is_inline() {
            let _ = respond_to.send(reply(BroadcastStatus::Inline));
            self.dispatcher.dispatch(job).await;
        } else {
            let status = self.dispatcher.dispatch(job).await;
            let _ = respond_to.send(reply(status));
        }
    }

    fn status(&self) -> RoundStatus {
        RoundStatus {
            phase: self.round.phase(),
            remaining: self.round.remaining(Instant::now()),
            options: self.options.clone(),
            tally: self.ledger.snapshot(),
            registered: self.registry.len(),
            voted: self.ledger.voter_count(),
        }
    }

    fn registered_changed(&self) {
        self.metrics.set_registered_clients(self.registry.len());
        obs::set_clients_registered(self.registry.len());
    }

    /// Stop timers and drain the dispatcher. Idempotent.
    async fn stop(&mut self, deadline: Duration) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.receiver.close();

        if let Some(task) = self.deadline_task.take() {
            task.abort();
        }

        info!(
            target: "vc.actor.coordinator",
            drain_deadline_ms = deadline.as_millis(),
            "Stopping coordinator"
        );
        self.dispatcher.shutdown(deadline).await;
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::sink::Payload;

    fn spawn(strategy: DispatchStrategy) -> CoordinatorHandle {
        CoordinatorHandle::spawn(
            CoordinatorSettings::new(["A", "B", "C"], strategy),
            CoordinatorMetrics::new(),
        )
        .unwrap()
    }

    fn sink(id: &str) -> (ClientSink, mpsc::Receiver<Payload>) {
        ClientSink::channel(id, 64, CancellationToken::new())
    }

    #[test]
    fn test_settings_validation() {
        let ok = CoordinatorSettings::new(["A", "B"], DispatchStrategy::LockedSync);
        assert!(ok.validate().is_ok());

        let empty = CoordinatorSettings::new(Vec::<String>::new(), DispatchStrategy::LockedSync);
        assert!(matches!(empty.validate(), Err(VcError::Config(_))));

        let duplicate = CoordinatorSettings::new(["A", "A"], DispatchStrategy::LockedSync);
        assert!(matches!(duplicate.validate(), Err(VcError::Config(_))));

        let blank = CoordinatorSettings::new(["A", " "], DispatchStrategy::LockedSync);
        assert!(matches!(blank.validate(), Err(VcError::Config(_))));
    }

    #[tokio::test]
    async fn test_register_returns_status() {
        let handle = spawn(DispatchStrategy::decoupled());
        let (s, _rx) = sink("x1");

        let status = handle.register(s).await.unwrap();
        assert_eq!(status.phase, RoundPhase::NotStarted);
        assert_eq!(status.registered, 1);
        assert_eq!(status.options, vec!["A", "B", "C"]);
        assert_eq!(handle.metrics().registered_clients(), 1);
    }

    #[tokio::test]
    async fn test_vote_from_unknown_client_rejected() {
        let handle = spawn(DispatchStrategy::decoupled());
        handle.start_round(Duration::from_secs(60)).await.unwrap();

        let result = handle.submit_vote("ghost", "A").await;
        assert_eq!(result, Err(VcError::UnknownClient("ghost".to_string())));
    }

    #[tokio::test]
    async fn test_voter_sees_ok_before_update() {
        let handle = spawn(DispatchStrategy::LockedSync);
        let (s, mut rx) = sink("x1");
        handle.register(s).await.unwrap();
        handle.start_round(Duration::from_secs(60)).await.unwrap();

        let receipt = handle.submit_vote("x1", "B").await.unwrap();
        assert!(receipt.acknowledged);
        assert_eq!(receipt.broadcast, BroadcastStatus::Inline);

        assert_eq!(
            rx.recv().await.as_deref(),
            Some("VOTACAO_INICIADA: 60 segundos. Opcoes: [A, B, C]")
        );
        assert_eq!(rx.recv().await.as_deref(), Some("OK: Voto registrado -> B"));
        assert_eq!(rx.recv().await.as_deref(), Some("UPDATE: {A:0, B:1, C:0}"));
    }

    #[tokio::test]
    async fn test_release_only_removes_own_session() {
        let handle = spawn(DispatchStrategy::decoupled());
        let (old, _rx_old) = sink("x1");
        handle.register(old.clone()).await.unwrap();
        old.revoke();

        let (new, _rx_new) = sink("x1");
        handle.register(new.clone()).await.unwrap();

        assert!(!handle.release(&old).await.unwrap());
        assert_eq!(handle.status().await.unwrap().registered, 1);
        assert!(handle.release(&new).await.unwrap());
        assert_eq!(handle.status().await.unwrap().registered, 0);
    }

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let handle = spawn(DispatchStrategy::decoupled());
        handle.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(handle.status().await, Err(VcError::ShuttingDown));
        assert!(handle.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_ends_round() {
        let handle = spawn(DispatchStrategy::decoupled());
        let (s, mut rx) = sink("watcher");
        handle.register(s).await.unwrap();

        handle.start_round(Duration::from_secs(10)).await.unwrap();
        assert!(rx.recv().await.unwrap().starts_with("VOTACAO_INICIADA"));

        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(
            rx.recv().await.as_deref(),
            Some("VOTACAO_ENCERRADA: {A:0, B:0, C:0}")
        );
        assert_eq!(handle.status().await.unwrap().phase, RoundPhase::Ended);
    }
}
