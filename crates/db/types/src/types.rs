//! Proof request rows and their lifecycle.

use std::{fmt, str::FromStr};

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::errors::{InvalidTransition, StoreError};

/// Primary key of a proof request row.
pub type ProofRequestId = i64;

/// What a proof request proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProofKind {
    /// A bounded run of consecutive L2 blocks.
    Range,
    /// A chain of completed range proofs folded into one.
    Agg,
}

impl ProofKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofKind::Range => "RANGE",
            ProofKind::Agg => "AGG",
        }
    }
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProofKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RANGE" => Ok(ProofKind::Range),
            "AGG" => Ok(ProofKind::Agg),
            other => Err(StoreError::Decode(format!("unknown proof kind {other:?}"))),
        }
    }
}

/// Lifecycle state of a proof request.
///
/// ```text
/// UNREQ --Dispatch--> WITNESSGEN --ProverAssigned--> PROVING --Fulfilled--> COMPLETE
///   |                     |                             |
///   +--------Fail---------+-------------Fail------------+--> FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofStatus {
    #[serde(rename = "UNREQ")]
    Unrequested,
    #[serde(rename = "WITNESSGEN")]
    WitnessGen,
    #[serde(rename = "PROVING")]
    Proving,
    #[serde(rename = "COMPLETE")]
    Complete,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ProofStatus {
    pub const ALL: [ProofStatus; 5] = [
        ProofStatus::Unrequested,
        ProofStatus::WitnessGen,
        ProofStatus::Proving,
        ProofStatus::Complete,
        ProofStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProofStatus::Unrequested => "UNREQ",
            ProofStatus::WitnessGen => "WITNESSGEN",
            ProofStatus::Proving => "PROVING",
            ProofStatus::Complete => "COMPLETE",
            ProofStatus::Failed => "FAILED",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProofStatus::Complete | ProofStatus::Failed)
    }

    /// Applies `event`, returning the next status or the rejected transition.
    pub fn apply(self, event: ProofEvent) -> Result<ProofStatus, InvalidTransition> {
        use ProofEvent::*;
        use ProofStatus::*;

        if self.is_terminal() {
            return Err(InvalidTransition { from: self, event });
        }

        match (self, event) {
            (Unrequested, Dispatch) => Ok(WitnessGen),
            (WitnessGen, ProverAssigned) => Ok(Proving),
            (Proving, Fulfilled) => Ok(Complete),
            (Unrequested | WitnessGen | Proving, Fail) => Ok(Failed),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProofStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProofStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StoreError::Decode(format!("unknown proof status {s:?}")))
    }
}

/// Something that happened to a proof request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProofEvent {
    /// Picked by the dispatcher, witness generation starts.
    Dispatch,
    /// The proving service accepted the request and returned an id.
    ProverAssigned,
    /// The proving service returned the proof.
    Fulfilled,
    /// Anything that ends the attempt without a proof.
    Fail,
}

impl ProofEvent {
    /// The event that moves a row into `target`, if any.
    pub fn toward(target: ProofStatus) -> Option<ProofEvent> {
        match target {
            ProofStatus::Unrequested => None,
            ProofStatus::WitnessGen => Some(ProofEvent::Dispatch),
            ProofStatus::Proving => Some(ProofEvent::ProverAssigned),
            ProofStatus::Complete => Some(ProofEvent::Fulfilled),
            ProofStatus::Failed => Some(ProofEvent::Fail),
        }
    }
}

/// Inclusive interval of L2 block numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    /// Returns `None` when `end < start`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (end >= start).then_some(Self { start, end })
    }

    /// Number of blocks covered.
    pub fn width(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn contains(&self, other: &BlockRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &BlockRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Splits into `[start, mid]` and `[mid + 1, end]`; `None` for single block ranges.
    pub fn split_half(&self) -> Option<(BlockRange, BlockRange)> {
        if self.width() < 2 {
            return None;
        }
        let mid = self.start + (self.end - self.start) / 2;
        Some((
            BlockRange {
                start: self.start,
                end: mid,
            },
            BlockRange {
                start: mid + 1,
                end: self.end,
            },
        ))
    }

    /// Cuts `[start, end]` into consecutive ranges of exactly `width` blocks.
    ///
    /// A tail shorter than `width` is left out.
    pub fn fixed_width_chunks(start: u64, end: u64, width: u64) -> Vec<BlockRange> {
        let mut chunks = Vec::new();
        if width == 0 {
            return chunks;
        }

        let mut next = start;
        while let Some(chunk_end) = next.checked_add(width - 1) {
            if chunk_end > end {
                break;
            }
            chunks.push(BlockRange {
                start: next,
                end: chunk_end,
            });
            next = chunk_end + 1;
        }
        chunks
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// An L1 block pinned on the settlement contract for an aggregation proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L1Checkpoint {
    pub number: u64,
    pub hash: B256,
}

/// A row of the `proof_request` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofRequest {
    pub id: ProofRequestId,
    pub kind: ProofKind,
    pub start_block: u64,
    pub end_block: u64,
    pub status: ProofStatus,
    pub request_added_time: u64,
    pub proof_request_time: Option<u64>,
    pub last_updated_time: u64,
    pub prover_request_id: Option<String>,
    pub l1_block_number: Option<u64>,
    pub l1_block_hash: Option<B256>,
    pub proof: Option<Vec<u8>>,
    /// Row this one was created to retry.
    pub retry_of: Option<ProofRequestId>,
}

impl ProofRequest {
    pub fn range(&self) -> BlockRange {
        BlockRange {
            start: self.start_block,
            end: self.end_block,
        }
    }

    pub fn l1_checkpoint(&self) -> Option<L1Checkpoint> {
        Some(L1Checkpoint {
            number: self.l1_block_number?,
            hash: self.l1_block_hash?,
        })
    }

    /// Whether the proving service ever accepted this request.
    pub fn is_dispatched(&self) -> bool {
        self.prover_request_id.is_some()
    }
}

/// Result of [`crate::ProofStore::try_create_agg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggCreation {
    /// A new AGG row spanning `[start, end]` was queued.
    Created { id: ProofRequestId, end: u64 },
    /// A non-failed AGG row with the same start already exists.
    AlreadyExists { id: ProofRequestId },
    /// Completed range proofs only reach `max_end`, short of the requested minimum.
    InsufficientCoverage { max_end: u64 },
}

impl AggCreation {
    pub fn created(&self) -> bool {
        matches!(self, AggCreation::Created { .. })
    }
}
