// Copyright (c) Hetu Project
// SPDX-License-Identifier: Apache-2.0

//! Tessera Service - Transition life cycle
//!
//! The service manager is the contract consensus drives to turn blocks into
//! state:
//! - `create_initial_transition` / `propose_genesis_transition` bootstrap the chain
//! - `propose_transition` builds a candidate block from the transaction pool
//! - `create_transition` replays a proposer's transaction list on a validator
//! - `Transition::execute` validates and applies it on Tokio's blocking pool
//! - `finalize` commits the winner and discards its siblings

pub mod callback;
pub mod error;
pub mod executor;
pub mod manager;
pub mod pool;
pub mod transition;

pub use callback::{ChannelCallback, ExecutionWaiter, TransitionCallback};
pub use error::{LifecycleError, PoolError, TransitionError, TransitionResult};
pub use executor::{receipts_root, ExecutionOutput, Receipt, ReceiptStatus, TransferExecutor};
pub use manager::{FinalizeFlags, ServiceManager};
pub use pool::TransactionPool;
pub use transition::{Transition, TransitionId, TransitionOrigin, TransitionState};
