//! Vote coordination
//!
//! Tracks consensus proposals, their expected voter sets, and received
//! responses on top of the delivery pipeline. Proposal payloads are free-form
//! keyed maps; the coordinator only interprets the `proposalId` and
//! `deadline` keys.

use crate::domain_types::{
    AgentId, Message, MessageMetadata, MessageTimestamp, MessageType, OutgoingMessage, Priority,
};
use crate::traits::MessageSink;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Required payload key carrying the proposal identifier.
pub const KEY_PROPOSAL_ID: &str = "proposalId";

/// Required payload key carrying the absolute deadline in milliseconds.
pub const KEY_DEADLINE: &str = "deadline";

/// Free-form keyed payload exchanged in vote traffic.
pub type VotePayload = Map<String, Value>;

/// Vote coordination errors
#[derive(Debug, Error)]
pub enum VoteError {
    /// A required payload key is absent.
    #[error("vote payload missing required key: {key}")]
    MissingField {
        /// The absent key.
        key: &'static str,
    },

    /// A required payload key carries the wrong type.
    #[error("vote payload key {key} has an invalid type")]
    InvalidField {
        /// The offending key.
        key: &'static str,
    },

    /// The expected voter set was empty.
    #[error("expected voter set must not be empty")]
    EmptyVoterSet,

    /// A live proposal with this id already exists.
    #[error("proposal already active: {proposal_id}")]
    DuplicateProposal {
        /// The contested proposal id.
        proposal_id: String,
    },

    /// The responding voter is not part of the proposal's expected set.
    #[error("voter {voter} is not expected for proposal {proposal_id}")]
    UnexpectedVoter {
        /// The uninvited voter.
        voter: AgentId,
        /// The proposal being answered.
        proposal_id: String,
    },

    /// The proposal payload could not be encoded for broadcast.
    #[error("failed to encode proposal payload: {source}")]
    PayloadEncoding {
        /// Underlying serialization failure.
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug)]
struct ProposalState {
    initiator: AgentId,
    expected_voters: HashSet<AgentId>,
    deadline: MessageTimestamp,
    responses: HashMap<AgentId, VotePayload>,
}

impl ProposalState {
    fn is_expired(&self, now: MessageTimestamp) -> bool {
        now >= self.deadline
    }
}

/// Immutable snapshot of one proposal's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteResult {
    /// The proposal id.
    pub proposal_id: String,
    /// The agent that opened the round.
    pub initiator: AgentId,
    /// Voters the round waits on.
    pub expected_voters: HashSet<AgentId>,
    /// Responses received so far, keyed by voter.
    pub responses: HashMap<AgentId, VotePayload>,
    /// Whether every expected voter has responded.
    pub complete: bool,
    /// Whether the deadline has passed.
    pub expired: bool,
}

/// Tracks vote proposals and broadcasts them through the delivery pipeline.
pub struct VoteCoordinator {
    proposals: DashMap<String, ProposalState>,
    sink: Arc<dyn MessageSink>,
}

impl VoteCoordinator {
    /// Creates a coordinator broadcasting through the given sink.
    #[must_use]
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            proposals: DashMap::new(),
            sink,
        }
    }

    /// Opens a vote round and broadcasts the proposal.
    ///
    /// The payload must carry a string `proposalId` and a numeric `deadline`
    /// (absolute milliseconds). State is registered before the broadcast is
    /// submitted. An existing proposal with the same id is replaced only if
    /// it has already expired.
    ///
    /// # Errors
    ///
    /// Returns `VoteError` for a missing/mistyped required key, an empty
    /// voter set, a still-live duplicate id, or an unencodable payload.
    pub async fn start_vote(
        &self,
        initiator: AgentId,
        payload: VotePayload,
        expected_voters: HashSet<AgentId>,
    ) -> Result<(), VoteError> {
        if expected_voters.is_empty() {
            return Err(VoteError::EmptyVoterSet);
        }
        let proposal_id = required_string(&payload, KEY_PROPOSAL_ID)?;
        let deadline = required_millis(&payload, KEY_DEADLINE)?;
        let now = MessageTimestamp::now();

        let state = ProposalState {
            initiator,
            expected_voters,
            deadline,
            responses: HashMap::new(),
        };

        // Check-and-insert must be atomic so two racing starts with the same
        // id cannot both register.
        match self.proposals.entry(proposal_id.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    debug!(%proposal_id, "replacing expired proposal");
                    occupied.insert(state);
                } else {
                    return Err(VoteError::DuplicateProposal { proposal_id });
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(state);
            }
        }

        let body = serde_json::to_vec(&payload)
            .map_err(|source| VoteError::PayloadEncoding { source })?;
        let message = Message::new(
            MessageType::VoteProposal,
            Bytes::from(body),
            MessageMetadata::with_priority(Priority::default())
                .with_ttl_ms(deadline.millis_since(now)),
        );
        let outgoing = OutgoingMessage::new(
            initiator,
            AgentId::broadcast(),
            message,
            crate::domain_types::MaxHops::default(),
        );
        if !self.sink.submit(outgoing).await {
            warn!(%proposal_id, "proposal broadcast was not accepted");
        }
        Ok(())
    }

    /// Records a voter's response; the last response per voter wins.
    ///
    /// Responses for unknown proposals are silently ignored. Responses
    /// arriving after the deadline but before cleanup are still stored.
    ///
    /// # Errors
    ///
    /// Returns `VoteError` when the payload lacks `proposalId` or the voter
    /// is not in the proposal's expected set.
    pub fn record_response(&self, voter: AgentId, payload: VotePayload) -> Result<(), VoteError> {
        let proposal_id = required_string(&payload, KEY_PROPOSAL_ID)?;
        let Some(mut state) = self.proposals.get_mut(&proposal_id) else {
            trace!(%proposal_id, %voter, "response for unknown proposal ignored");
            return Ok(());
        };
        if !state.expected_voters.contains(&voter) {
            return Err(VoteError::UnexpectedVoter { voter, proposal_id });
        }
        state.responses.insert(voter, payload);
        Ok(())
    }

    /// Self-consistent snapshot of a proposal, or `None` if unknown.
    #[must_use]
    pub fn get_vote_result(&self, proposal_id: &str) -> Option<VoteResult> {
        let now = MessageTimestamp::now();
        self.proposals.get(proposal_id).map(|state| VoteResult {
            proposal_id: proposal_id.to_string(),
            initiator: state.initiator,
            expected_voters: state.expected_voters.clone(),
            responses: state.responses.clone(),
            complete: state
                .expected_voters
                .iter()
                .all(|voter| state.responses.contains_key(voter)),
            expired: state.is_expired(now),
        })
    }

    /// Evicts every expired proposal, returning the removed count.
    ///
    /// Idempotent: a second immediate call removes nothing.
    pub fn cleanup_expired_votes(&self) -> usize {
        let now = MessageTimestamp::now();
        let before = self.proposals.len();
        self.proposals.retain(|_, state| !state.is_expired(now));
        before - self.proposals.len()
    }

    /// Ids of the proposals currently tracked, expired or not.
    #[must_use]
    pub fn active_proposals(&self) -> Vec<String> {
        self.proposals.iter().map(|entry| entry.key().clone()).collect()
    }
}

fn required_string(payload: &VotePayload, key: &'static str) -> Result<String, VoteError> {
    match payload.get(key) {
        None => Err(VoteError::MissingField { key }),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(VoteError::InvalidField { key }),
    }
}

fn required_millis(payload: &VotePayload, key: &'static str) -> Result<MessageTimestamp, VoteError> {
    match payload.get(key) {
        None => Err(VoteError::MissingField { key }),
        Some(Value::Number(value)) => value
            .as_u64()
            .map(MessageTimestamp::new)
            .ok_or(VoteError::InvalidField { key }),
        Some(_) => Err(VoteError::InvalidField { key }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::OutgoingMessage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Sink that records every submission.
    #[derive(Default)]
    struct RecordingSink {
        submissions: Mutex<Vec<OutgoingMessage>>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn submit(&self, message: OutgoingMessage) -> bool {
            self.submissions
                .lock()
                .expect("sink mutex poisoned")
                .push(message);
            true
        }
    }

    fn proposal_payload(id: &str, deadline: MessageTimestamp) -> VotePayload {
        let mut payload = VotePayload::new();
        payload.insert(KEY_PROPOSAL_ID.to_string(), Value::String(id.to_string()));
        payload.insert(
            KEY_DEADLINE.to_string(),
            Value::Number(deadline.as_millis().into()),
        );
        payload
    }

    fn response_payload(id: &str, choice: &str) -> VotePayload {
        let mut payload = VotePayload::new();
        payload.insert(KEY_PROPOSAL_ID.to_string(), Value::String(id.to_string()));
        payload.insert("choice".to_string(), Value::String(choice.to_string()));
        payload
    }

    fn voters(ids: &[i64]) -> HashSet<AgentId> {
        ids.iter().copied().map(AgentId::new).collect()
    }

    fn far_deadline() -> MessageTimestamp {
        MessageTimestamp::now().saturating_add_millis(10_000)
    }

    #[tokio::test]
    async fn start_vote_registers_state_and_broadcasts() {
        let sink = Arc::new(RecordingSink::default());
        let coordinator = VoteCoordinator::new(Arc::clone(&sink) as Arc<dyn MessageSink>);

        coordinator
            .start_vote(
                AgentId::new(1),
                proposal_payload("v1", far_deadline()),
                voters(&[2, 3]),
            )
            .await
            .unwrap();

        let submissions = sink.submissions.lock().unwrap();
        assert_eq!(submissions.len(), 1);
        assert!(submissions[0].receiver.is_broadcast());
        assert_eq!(submissions[0].sender, AgentId::new(1));
        assert_eq!(submissions[0].message.message_type, MessageType::VoteProposal);
        drop(submissions);

        let result = coordinator.get_vote_result("v1").unwrap();
        assert_eq!(result.initiator, AgentId::new(1));
        assert!(!result.complete);
        assert!(!result.expired);
    }

    #[tokio::test]
    async fn start_vote_validates_inputs() {
        let coordinator =
            VoteCoordinator::new(Arc::new(RecordingSink::default()) as Arc<dyn MessageSink>);

        let err = coordinator
            .start_vote(AgentId::new(1), proposal_payload("v", far_deadline()), voters(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, VoteError::EmptyVoterSet));

        let mut missing_deadline = VotePayload::new();
        missing_deadline.insert(
            KEY_PROPOSAL_ID.to_string(),
            Value::String("v".to_string()),
        );
        let err = coordinator
            .start_vote(AgentId::new(1), missing_deadline, voters(&[2]))
            .await
            .unwrap_err();
        assert!(matches!(err, VoteError::MissingField { key: KEY_DEADLINE }));

        let mut bad_id = proposal_payload("v", far_deadline());
        bad_id.insert(KEY_PROPOSAL_ID.to_string(), Value::Number(7.into()));
        let err = coordinator
            .start_vote(AgentId::new(1), bad_id, voters(&[2]))
            .await
            .unwrap_err();
        assert!(matches!(err, VoteError::InvalidField { key: KEY_PROPOSAL_ID }));
    }

    #[tokio::test]
    async fn duplicate_live_proposal_is_rejected_expired_is_replaced() {
        let coordinator =
            VoteCoordinator::new(Arc::new(RecordingSink::default()) as Arc<dyn MessageSink>);

        coordinator
            .start_vote(
                AgentId::new(1),
                proposal_payload("v1", far_deadline()),
                voters(&[2]),
            )
            .await
            .unwrap();

        let err = coordinator
            .start_vote(
                AgentId::new(9),
                proposal_payload("v1", far_deadline()),
                voters(&[2]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VoteError::DuplicateProposal { .. }));

        // A second round with an already-passed deadline can be replaced.
        coordinator
            .start_vote(
                AgentId::new(1),
                proposal_payload("v2", MessageTimestamp::now()),
                voters(&[2]),
            )
            .await
            .unwrap();
        coordinator
            .start_vote(
                AgentId::new(3),
                proposal_payload("v2", far_deadline()),
                voters(&[4]),
            )
            .await
            .unwrap();
        let replaced = coordinator.get_vote_result("v2").unwrap();
        assert_eq!(replaced.initiator, AgentId::new(3));
    }

    #[tokio::test]
    async fn responses_accumulate_with_last_write_winning() {
        let coordinator =
            VoteCoordinator::new(Arc::new(RecordingSink::default()) as Arc<dyn MessageSink>);
        coordinator
            .start_vote(
                AgentId::new(1),
                proposal_payload("v1", far_deadline()),
                voters(&[2, 3]),
            )
            .await
            .unwrap();

        coordinator
            .record_response(AgentId::new(2), response_payload("v1", "A"))
            .unwrap();
        coordinator
            .record_response(AgentId::new(2), response_payload("v1", "B"))
            .unwrap();

        let result = coordinator.get_vote_result("v1").unwrap();
        assert_eq!(result.responses.len(), 1);
        assert_eq!(
            result.responses[&AgentId::new(2)]["choice"],
            Value::String("B".to_string())
        );
        assert!(!result.complete);

        coordinator
            .record_response(AgentId::new(3), response_payload("v1", "A"))
            .unwrap();
        assert!(coordinator.get_vote_result("v1").unwrap().complete);
    }

    #[tokio::test]
    async fn unexpected_voters_error_unknown_proposals_are_ignored() {
        let coordinator =
            VoteCoordinator::new(Arc::new(RecordingSink::default()) as Arc<dyn MessageSink>);
        coordinator
            .start_vote(
                AgentId::new(1),
                proposal_payload("v1", far_deadline()),
                voters(&[2]),
            )
            .await
            .unwrap();

        let err = coordinator
            .record_response(AgentId::new(99), response_payload("v1", "A"))
            .unwrap_err();
        assert!(matches!(err, VoteError::UnexpectedVoter { .. }));

        // Unknown proposal: silently ignored.
        coordinator
            .record_response(AgentId::new(2), response_payload("ghost", "A"))
            .unwrap();
        assert!(coordinator.get_vote_result("ghost").is_none());
    }

    #[tokio::test]
    async fn cleanup_evicts_expired_proposals_idempotently() {
        let coordinator =
            VoteCoordinator::new(Arc::new(RecordingSink::default()) as Arc<dyn MessageSink>);
        coordinator
            .start_vote(
                AgentId::new(1),
                proposal_payload("stale", MessageTimestamp::now()),
                voters(&[2]),
            )
            .await
            .unwrap();
        coordinator
            .start_vote(
                AgentId::new(1),
                proposal_payload("live", far_deadline()),
                voters(&[2]),
            )
            .await
            .unwrap();

        assert_eq!(coordinator.cleanup_expired_votes(), 1);
        assert_eq!(coordinator.cleanup_expired_votes(), 0);
        assert_eq!(coordinator.active_proposals(), vec!["live".to_string()]);
        assert!(coordinator.get_vote_result("stale").is_none());
    }
}
