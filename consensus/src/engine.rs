// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Consensus Engine
//!
//! Drives rounds of BFT agreement over the transitions of a
//! [`ServiceManager`].
//!
//! ## Main Flow
//!
//! 1. Height 1 is the genesis transition, finalized locally without votes
//! 2. The proposer for `(height, round)` proposes a transition from its pool,
//!    executes it and broadcasts the block with its transaction list
//! 3. Validators replay the list on the same parent and prevote the block if
//!    their result matches, nil otherwise
//! 4. A prevote quorum for the block locks it and triggers a precommit
//! 5. A precommit quorum finalizes the transition; the precommits become the
//!    block's [`VoteList`] and the next height begins
//! 6. A round that does not decide in time moves to the next round and the
//!    next proposer

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tessera_service::{ChannelCallback, FinalizeFlags, ServiceManager, Transition};
use tessera_types::{
    Address, Block, BlockHeader, BlockId, FinalizedBlock, GenesisConfig, KeyPair, PartSetId,
    SignedMessage, TransactionList, ValidatorList,
};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument, Span};

use crate::broadcaster::ConsensusBroadcaster;
use crate::error::{EngineError, EngineResult};
use crate::liveness::{ProposerElection, RotatingProposer};
use crate::message::ConsensusMessage;
use crate::proposal::{ProposalContent, ProposalMessage};
use crate::vote::{sign_vote, VoteMessage, VoteType};
use crate::vote_list::{has_quorum, VoteList};
use crate::vote_set::{AddVoteResult, VoteSet, VoteTarget};

/// Messages for later rounds or heights kept until the engine gets there
const MAX_PENDING_MESSAGES: usize = 1024;

/// Round timeouts grow linearly with the round, up to this many times the base.
const MAX_TIMEOUT_FACTOR: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Propose,
    Prevote,
    Precommit,
}

/// A block this node has executed and would commit.
#[derive(Debug, Clone)]
struct Candidate {
    block: BlockHeader,
    part_set_id: PartSetId,
    transition: Transition,
}

impl Candidate {
    fn new(block: BlockHeader, transition: Transition) -> Self {
        let part_set_id = crate::proposal::part_set_id(&block, transition.transactions());
        Self {
            block,
            part_set_id,
            transition,
        }
    }

    fn target(&self) -> (BlockId, PartSetId) {
        (self.block.id(), self.part_set_id)
    }
}

/// Messages produced while handling one input.
#[derive(Debug, Default)]
struct Outgoing {
    /// Sent to peers, then handled locally
    broadcast: Vec<ConsensusMessage>,
    /// Held back earlier, handled locally only
    replay: Vec<ConsensusMessage>,
}

struct RoundState {
    height: i64,
    round: i32,
    step: Step,
    deadline: Instant,
    /// Finalized transition the current height builds on
    parent: Transition,
    parent_block: BlockHeader,
    /// Vote list certifying `parent_block`
    last_commit: Vec<u8>,
    validators: ValidatorList,
    election: RotatingProposer,
    /// Block proposed in each round of this height
    proposals: HashMap<i32, BlockId>,
    candidates: HashMap<BlockId, Candidate>,
    votes: HashMap<(i32, VoteType), VoteSet>,
    voted: HashSet<(i32, VoteType)>,
    locked: Option<(i32, BlockId)>,
    pending: Vec<ConsensusMessage>,
    outgoing: Outgoing,
}

impl RoundState {
    fn new(
        parent: Transition,
        parent_block: BlockHeader,
        last_commit: Vec<u8>,
        contiguous_rounds: u32,
    ) -> Self {
        let validators = parent
            .next_validators()
            .unwrap_or_else(|| parent_block.next_validators.clone());
        Self {
            height: parent.height() + 1,
            round: 0,
            step: Step::Propose,
            deadline: Instant::now(),
            election: RotatingProposer::with_contiguous_rounds(validators.clone(), contiguous_rounds),
            validators,
            parent,
            parent_block,
            last_commit,
            proposals: HashMap::new(),
            candidates: HashMap::new(),
            votes: HashMap::new(),
            voted: HashSet::new(),
            locked: None,
            pending: Vec::new(),
            outgoing: Outgoing::default(),
        }
    }

    /// Move on to the height after `candidate`.
    fn next_height(&mut self, candidate: Candidate, last_commit: Vec<u8>) {
        let pending = std::mem::take(&mut self.pending);
        let outgoing = std::mem::take(&mut self.outgoing);
        let contiguous_rounds = self.election.contiguous_rounds();
        *self = Self::new(
            candidate.transition,
            candidate.block,
            last_commit,
            contiguous_rounds,
        );
        self.pending = pending;
        self.outgoing = outgoing;
    }

    fn hold(&mut self, message: ConsensusMessage) {
        if self.pending.len() >= MAX_PENDING_MESSAGES {
            debug!(kind = message.kind(), height = message.height(), "Pending buffer full, dropping message");
            return;
        }
        self.pending.push(message);
    }

    /// Queue held messages that the current height and round can use and
    /// drop the ones that are now stale.
    fn release_pending(&mut self) {
        let (height, round) = (self.height, self.round);
        let (ready, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .filter(|m| m.height() >= height)
            .partition(|m| {
                m.height() == height
                    && (matches!(m, ConsensusMessage::Vote(_)) || m.round() <= round)
            });
        self.pending = rest;
        self.outgoing.replay.extend(ready);
    }

    fn quorum_target(&self, round: i32, vote_type: VoteType) -> Option<VoteTarget> {
        self.votes
            .get(&(round, vote_type))
            .and_then(|set| set.quorum_target(self.validators.len()))
    }

    /// A precommit quorum, in any round of this height, for a block this
    /// node has executed.
    fn decided(&self) -> Option<(i32, VoteTarget)> {
        let n = self.validators.len();
        self.votes
            .iter()
            .filter(|((_, vote_type), _)| *vote_type == VoteType::Precommit)
            .find_map(|((round, _), set)| {
                set.quorum_target(n)
                    .filter(|(block_id, _)| {
                        block_id.is_some_and(|id| self.candidates.contains_key(&id))
                    })
                    .map(|target| (*round, target))
            })
    }

    /// More than two thirds of the validators already voted in `round`.
    fn round_is_active(&self, round: i32) -> bool {
        let voters: HashSet<Address> = [VoteType::Prevote, VoteType::Precommit]
            .iter()
            .filter_map(|t| self.votes.get(&(round, *t)))
            .flat_map(|set| set.voters())
            .collect();
        has_quorum(voters.len(), self.validators.len())
    }
}

/// The main consensus engine
pub struct ConsensusEngine {
    key_pair: KeyPair,
    address: Address,
    service: Arc<ServiceManager>,
    genesis: GenesisConfig,
    broadcaster: Arc<dyn ConsensusBroadcaster>,
    span: Span,
    state: Mutex<Option<RoundState>>,
    committed: watch::Sender<i64>,
}

impl ConsensusEngine {
    /// Create an engine signing with `key_pair`. Events are recorded inside
    /// `span`.
    pub fn new(
        key_pair: KeyPair,
        service: Arc<ServiceManager>,
        genesis: GenesisConfig,
        broadcaster: Arc<dyn ConsensusBroadcaster>,
        span: Span,
    ) -> Self {
        let address = Address::from_public_key(key_pair.public_key());
        let (committed, _) = watch::channel(0);
        Self {
            key_pair,
            address,
            service,
            genesis,
            broadcaster,
            span,
            state: Mutex::new(None),
            committed,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn service(&self) -> &Arc<ServiceManager> {
        &self.service
    }

    /// Height of the last committed block.
    pub fn committed_height(&self) -> i64 {
        *self.committed.borrow()
    }

    /// Observe committed heights.
    pub fn subscribe_commits(&self) -> watch::Receiver<i64> {
        self.committed.subscribe()
    }

    /// Current height and round, `None` before [`start`](Self::start).
    pub async fn position(&self) -> Option<(i64, i32)> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|state| (state.height, state.round))
    }

    pub async fn step(&self) -> Option<Step> {
        self.state.lock().await.as_ref().map(|state| state.step)
    }

    /// Load or create the chain and enter round 0 of the next height.
    /// Calling it again has no effect.
    pub async fn start(&self) -> EngineResult<()> {
        async {
            let mut guard = self.state.lock().await;
            if guard.is_some() {
                return Ok(());
            }

            let (parent, parent_block, last_commit) = self.bootstrap().await?;
            self.committed.send_replace(parent.height());
            let mut state = RoundState::new(
                parent,
                parent_block,
                last_commit,
                self.service.config().proposer_contiguous_rounds,
            );
            info!(
                address = %self.address,
                height = state.height,
                validators = state.validators.len(),
                "Consensus engine started"
            );

            self.enter_round(&mut state, 0).await;
            let result = self.advance(&mut state, 0).await;
            let outgoing = std::mem::take(&mut state.outgoing);
            *guard = Some(state);
            drop(guard);

            self.flush(outgoing).await;
            result
        }
        .instrument(self.span.clone())
        .await
    }

    /// Handle an encoded message from a peer.
    pub async fn receive(&self, bytes: &[u8]) -> EngineResult<()> {
        async {
            let message = ConsensusMessage::decode(bytes)?;
            let (result, outgoing) = self.handle(message).await;
            self.flush(outgoing).await;
            result
        }
        .instrument(self.span.clone())
        .await
    }

    /// The deadline of `height`/`round` passed. Stale timeouts are ignored.
    pub async fn on_timeout(&self, height: i64, round: i32) -> EngineResult<()> {
        async {
            let outgoing = {
                let mut guard = self.state.lock().await;
                let state = guard.as_mut().ok_or(EngineError::NotStarted)?;
                if state.height != height || state.round != round {
                    return Ok(());
                }
                info!(height, round, step = ?state.step, "Round timed out");
                self.enter_round(state, round + 1).await;
                let result = self.advance(state, round + 1).await;
                if let Err(e) = result {
                    debug!(error = %e, "Round advance failed");
                }
                std::mem::take(&mut state.outgoing)
            };
            self.flush(outgoing).await;
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Start the engine and serve `inbound` and round timeouts until the
    /// inbound channel closes.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::UnboundedReceiver<Vec<u8>>) -> EngineResult<()> {
        self.start().await?;
        loop {
            let (deadline, height, round) = self.deadline().await?;
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(bytes) => {
                        if let Err(e) = self.receive(&bytes).await {
                            self.report(&e);
                        }
                    }
                    None => {
                        info!(parent: &self.span, "Inbound channel closed, stopping consensus engine");
                        return Ok(());
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    if let Err(e) = self.on_timeout(height, round).await {
                        self.report(&e);
                    }
                }
            }
        }
    }

    async fn deadline(&self) -> EngineResult<(Instant, i64, i32)> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|state| (state.deadline, state.height, state.round))
            .ok_or(EngineError::NotStarted)
    }

    fn report(&self, error: &EngineError) {
        let _enter = self.span.enter();
        match error {
            EngineError::ResultMismatch { .. }
            | EngineError::InvalidProposer { .. }
            | EngineError::InvalidProposal(_)
            | EngineError::InvalidCommit(_)
            | EngineError::BadSignature
            | EngineError::UnknownValidator(_) => {
                warn!(error = %error, "Rejected consensus message")
            }
            _ => debug!(error = %error, "Consensus message not applied"),
        }
    }

    /// Finalized parent for the first consensus height. A fresh chain
    /// finalizes genesis at height 1 without votes.
    async fn bootstrap(&self) -> EngineResult<(Transition, BlockHeader, Vec<u8>)> {
        let initial = self.service.create_initial_transition()?;
        if initial.height() > 0 {
            let block = self
                .service
                .store()
                .block_at(initial.height())?
                .ok_or(EngineError::MissingBlock(initial.height()))?;
            info!(height = initial.height(), block = %block.id(), "Resuming from committed block");
            return Ok((initial, block.header, block.votes));
        }

        let genesis = self
            .service
            .propose_genesis_transition(&initial, self.genesis.clone())?;
        execute(&genesis).await?;
        self.service
            .finalize(&genesis, FinalizeFlags::from_config(self.service.config()))?;

        let header = BlockHeader {
            height: genesis.height(),
            round: 0,
            parent_id: None,
            timestamp: 0,
            proposer: Address::default(),
            transactions_hash: TransactionList::default().hash(),
            result: genesis.result().unwrap_or_default(),
            next_validators: genesis.next_validators().unwrap_or_default(),
        };
        let votes = VoteList::default();
        votes.verify(&header)?;
        self.service.store().put_block(&FinalizedBlock {
            header: header.clone(),
            votes: votes.bytes(),
        })?;
        info!(block = %header.id(), validators = header.next_validators.len(), "Genesis committed");
        Ok((genesis, header, votes.bytes()))
    }

    async fn handle(&self, message: ConsensusMessage) -> (EngineResult<()>, Outgoing) {
        let mut guard = self.state.lock().await;
        let Some(state) = guard.as_mut() else {
            return (Err(EngineError::NotStarted), Outgoing::default());
        };
        let result = match message {
            ConsensusMessage::Proposal(proposal) => self.on_proposal(state, proposal).await,
            ConsensusMessage::Vote(vote) => self.on_vote(state, vote).await,
        };
        (result, std::mem::take(&mut state.outgoing))
    }

    /// Broadcast produced messages and handle them locally, until nothing
    /// new is produced.
    async fn flush(&self, mut outgoing: Outgoing) {
        let mut queue = VecDeque::new();
        loop {
            for message in outgoing.broadcast.drain(..) {
                self.send(&message).await;
                queue.push_back(message);
            }
            queue.extend(outgoing.replay.drain(..));

            let Some(message) = queue.pop_front() else {
                return;
            };
            let (result, next) = self.handle(message).await;
            if let Err(e) = result {
                self.report(&e);
            }
            outgoing = next;
        }
    }

    async fn send(&self, message: &ConsensusMessage) {
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "Failed to encode consensus message");
                return;
            }
        };
        if let Err(e) = self.broadcaster.broadcast(bytes).await {
            warn!(kind = message.kind(), height = message.height(), error = %e, "Failed to broadcast");
        }
    }

    async fn enter_round(&self, state: &mut RoundState, round: i32) {
        state.round = round;
        state.step = Step::Propose;
        state.deadline = Instant::now() + self.round_timeout(round);
        debug!(height = state.height, round, "Entering round");
        state.release_pending();

        if state
            .election
            .is_valid_proposer(&self.address, state.height, round)
        {
            if let Err(e) = self.propose(state).await {
                warn!(height = state.height, round, error = %e, "Failed to propose");
            }
        }
    }

    fn round_timeout(&self, round: i32) -> Duration {
        let factor = (round.max(0) as u32).min(MAX_TIMEOUT_FACTOR - 1) + 1;
        self.service.config().round_timeout() * factor
    }

    async fn propose(&self, state: &mut RoundState) -> EngineResult<()> {
        let locked = state
            .locked
            .and_then(|(_, id)| state.candidates.get(&id).cloned());
        let candidate = match locked {
            Some(candidate) => candidate,
            None => {
                let transition = self.service.propose_transition(&state.parent)?;
                execute(&transition).await?;
                let block = BlockHeader {
                    height: state.height,
                    round: state.round,
                    parent_id: Some(state.parent_block.id()),
                    timestamp: now_millis(),
                    proposer: self.address,
                    transactions_hash: transition.transactions().hash(),
                    result: transition.result().unwrap_or_default(),
                    next_validators: transition
                        .next_validators()
                        .unwrap_or_else(|| state.validators.clone()),
                };
                let candidate = Candidate::new(block, transition);
                state
                    .candidates
                    .insert(candidate.block.id(), candidate.clone());
                candidate
            }
        };

        let content = ProposalContent {
            height: state.height,
            round: state.round,
            block: candidate.block.clone(),
            transactions: candidate.transition.transactions().clone(),
            last_commit: state.last_commit.clone(),
        };
        let proposal = SignedMessage::sign(content, &self.key_pair)?;
        info!(
            height = state.height,
            round = state.round,
            block = %candidate.block.id(),
            txs = candidate.transition.transactions().len(),
            relocked = candidate.block.round != state.round,
            "Proposing block"
        );
        state
            .outgoing
            .broadcast
            .push(ConsensusMessage::Proposal(proposal));
        Ok(())
    }

    async fn on_proposal(&self, state: &mut RoundState, proposal: ProposalMessage) -> EngineResult<()> {
        let proposer = proposal.address().ok_or(EngineError::BadSignature)?;
        let content = proposal.content();
        let (height, round) = (content.height, content.round);

        if height < state.height {
            return Ok(());
        }
        if height > state.height || round > state.round {
            state.hold(ConsensusMessage::Proposal(proposal));
            return Ok(());
        }
        if !state.election.is_valid_proposer(&proposer, height, round) {
            return Err(EngineError::InvalidProposer {
                height,
                round,
                actual: proposer,
            });
        }
        if state.proposals.contains_key(&round) {
            return Ok(());
        }

        let block_id = content.block.id();
        let part_set_id = content.part_set_id();
        let verdict = if state.candidates.contains_key(&block_id) {
            Ok(())
        } else {
            match self.check_proposal(state, content).await {
                Ok(candidate) => {
                    state.candidates.insert(block_id, candidate);
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };
        state.proposals.insert(round, block_id);

        if round == state.round && state.step == Step::Propose {
            let target = match (&verdict, state.locked) {
                (Err(_), _) => None,
                (Ok(()), Some((_, locked))) if locked != block_id => None,
                (Ok(()), _) => Some((block_id, part_set_id)),
            };
            state.step = Step::Prevote;
            self.cast_vote(state, VoteType::Prevote, target)?;
        }

        verdict?;
        self.advance(state, round).await
    }

    /// Structural checks, then replay the transactions on our own parent and
    /// compare the outcome with what the proposer claims.
    async fn check_proposal(&self, state: &RoundState, content: &ProposalContent) -> EngineResult<Candidate> {
        let block = &content.block;
        if block.height != state.height {
            return Err(EngineError::InvalidProposal(format!(
                "block height {} in proposal for height {}",
                block.height, state.height
            )));
        }
        if block.parent_id != Some(state.parent_block.id()) {
            return Err(EngineError::InvalidProposal("unknown parent block".to_string()));
        }
        if block.transactions_hash != content.transactions.hash() {
            return Err(EngineError::InvalidProposal(
                "transaction list does not match block".to_string(),
            ));
        }
        if !state.validators.contains(&block.proposer) {
            return Err(EngineError::UnknownValidator(block.proposer));
        }
        let last_commit = VoteList::from_bytes(&content.last_commit)
            .ok_or_else(|| EngineError::InvalidProposal("malformed last commit".to_string()))?;
        last_commit.verify(&state.parent_block)?;

        let transition = self
            .service
            .create_transition(&state.parent, content.transactions.clone())?;
        execute(&transition).await?;

        let result_matches = transition.result().as_deref() == Some(block.result.as_slice());
        let validators_match = transition.next_validators().as_ref() == Some(&block.next_validators);
        if !result_matches || !validators_match {
            warn!(
                height = state.height,
                round = content.round,
                block = %block.id(),
                proposer = %block.proposer,
                result_matches,
                validators_match,
                "Replayed result differs from proposal"
            );
            return Err(EngineError::ResultMismatch {
                height: state.height,
                block_id: block.id(),
            });
        }

        debug!(height = state.height, block = %block.id(), txs = content.transactions.len(), "Proposal replayed");
        Ok(Candidate::new(block.clone(), transition))
    }

    async fn on_vote(&self, state: &mut RoundState, vote: VoteMessage) -> EngineResult<()> {
        let voter = vote.address().ok_or(EngineError::BadSignature)?;
        let (height, round, vote_type) = {
            let content = vote.content();
            (content.height, content.round, content.vote_type)
        };

        if height < state.height {
            return Ok(());
        }
        if height > state.height {
            state.hold(ConsensusMessage::Vote(vote));
            return Ok(());
        }
        if !state.validators.contains(&voter) {
            return Err(EngineError::UnknownValidator(voter));
        }

        let added = state
            .votes
            .entry((round, vote_type))
            .or_insert_with(|| VoteSet::new(height, round, vote_type))
            .add(voter, vote);
        if added != AddVoteResult::Added {
            return Ok(());
        }
        self.advance(state, round).await
    }

    fn cast_vote(
        &self,
        state: &mut RoundState,
        vote_type: VoteType,
        target: Option<(BlockId, PartSetId)>,
    ) -> EngineResult<()> {
        if !state.voted.insert((state.round, vote_type)) {
            return Ok(());
        }
        let vote = sign_vote(&self.key_pair, state.height, state.round, vote_type, target)?;
        debug!(
            height = state.height,
            round = state.round,
            vote_type = ?vote_type,
            block = ?target.map(|(id, _)| id),
            "Voting"
        );
        state.outgoing.broadcast.push(ConsensusMessage::Vote(vote));
        Ok(())
    }

    /// Act on the votes collected so far until nothing changes.
    async fn advance(&self, state: &mut RoundState, mut round: i32) -> EngineResult<()> {
        loop {
            let position = (state.height, state.round);
            self.advance_once(state, round).await?;
            if (state.height, state.round) == position {
                return Ok(());
            }
            round = state.round;
        }
    }

    async fn advance_once(&self, state: &mut RoundState, round: i32) -> EngineResult<()> {
        if let Some((decided_round, target)) = state.decided() {
            return self.commit(state, decided_round, target).await;
        }

        if round > state.round && state.round_is_active(round) {
            info!(height = state.height, from = state.round, to = round, "Catching up to active round");
            self.enter_round(state, round).await;
            return Ok(());
        }
        if round != state.round {
            return Ok(());
        }

        if let Some((None, _)) = state.quorum_target(round, VoteType::Precommit) {
            info!(height = state.height, round, "Nil precommit quorum, moving to next round");
            self.enter_round(state, round + 1).await;
            return Ok(());
        }

        if state.step < Step::Precommit {
            match state.quorum_target(round, VoteType::Prevote) {
                Some((Some(block_id), _)) => {
                    if let Some(candidate) = state.candidates.get(&block_id) {
                        let target = candidate.target();
                        state.locked = Some((round, block_id));
                        state.step = Step::Precommit;
                        self.cast_vote(state, VoteType::Precommit, Some(target))?;
                    }
                }
                Some((None, _)) => {
                    state.step = Step::Precommit;
                    self.cast_vote(state, VoteType::Precommit, None)?;
                }
                None => {}
            }
        }
        Ok(())
    }

    async fn commit(&self, state: &mut RoundState, round: i32, target: VoteTarget) -> EngineResult<()> {
        let Some(candidate) = target.0.and_then(|id| state.candidates.get(&id).cloned()) else {
            return Ok(());
        };
        let precommits = state
            .votes
            .get(&(round, VoteType::Precommit))
            .map(|set| set.votes_for(&target))
            .unwrap_or_default();
        let votes = VoteList::from_votes(&precommits);
        votes.verify(&candidate.block)?;

        self.service.finalize(
            &candidate.transition,
            FinalizeFlags::from_config(self.service.config()),
        )?;
        let stored = self.service.store().put_block(&FinalizedBlock {
            header: candidate.block.clone(),
            votes: votes.bytes(),
        });

        let height = state.height;
        info!(
            height,
            round,
            block = %candidate.block.id(),
            txs = candidate.transition.transactions().len(),
            votes = votes.len(),
            "Block committed"
        );
        self.committed.send_replace(height);

        state.next_height(candidate, votes.bytes());
        self.enter_round(state, 0).await;
        stored?;
        Ok(())
    }
}

async fn execute(transition: &Transition) -> EngineResult<()> {
    let (callback, waiter) = ChannelCallback::new();
    transition.execute(callback)?;
    waiter.wait().await?;
    Ok(())
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
