// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Liveness Module
//!
//! Leader election for the consensus rounds. The engine rebuilds its election
//! from the validator list of every new height.
//!
//! ```ignore
//! use consensus::liveness::{ProposerElection, RotatingProposer};
//!
//! let election = RotatingProposer::new(validators);
//! let proposer = election.get_valid_proposer(height, round);
//! ```

mod proposer_election;
mod rotating_proposer_election;

pub use proposer_election::{Height, ProposerElection, Round};
pub use rotating_proposer_election::RotatingProposer;
