//! Random operation histories checked against the queue's universal invariants.

use std::collections::HashMap;

use alloy_primitives::B256;
use proptest::{prelude::*, test_runner::TestCaseError};
use proposer_common::ManualClock;
use proposer_db_types::{
    AggCreation, BlockRange, ProofKind, ProofRequest, ProofRequestId, ProofStatus, ProofStore,
    StoreError,
};

/// First block every history works from.
pub const BASE: u64 = 1001;
/// Width of every range row, so completed ranges line up on slot boundaries.
pub const SLOT_WIDTH: u64 = 10;
pub const SLOTS: u64 = 6;

#[derive(Debug, Clone)]
pub enum Op {
    CreateRange(u64),
    Dispatch(usize),
    AssignProver(usize),
    Fulfill(usize),
    Fail(usize),
    Retry(usize),
    Checkpoint(usize),
    TryAgg(u64),
    Tick(u64),
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..SLOTS).prop_map(Op::CreateRange),
        3 => any::<usize>().prop_map(Op::Dispatch),
        3 => any::<usize>().prop_map(Op::AssignProver),
        3 => any::<usize>().prop_map(Op::Fulfill),
        1 => any::<usize>().prop_map(Op::Fail),
        2 => any::<usize>().prop_map(Op::Retry),
        1 => any::<usize>().prop_map(Op::Checkpoint),
        2 => (0..SLOTS * SLOT_WIDTH).prop_map(Op::TryAgg),
        1 => (0..120u64).prop_map(Op::Tick),
    ]
}

pub fn history_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 1..60)
}

fn slot_range(slot: u64) -> BlockRange {
    let start = BASE + slot * SLOT_WIDTH;
    BlockRange {
        start,
        end: start + SLOT_WIDTH - 1,
    }
}

async fn all_rows(db: &impl ProofStore) -> Result<Vec<ProofRequest>, TestCaseError> {
    let mut rows = Vec::new();
    for status in ProofStatus::ALL {
        let mut batch = db
            .rows_with_status(status)
            .await
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        rows.append(&mut batch);
    }
    rows.sort_by_key(|r| r.id);
    Ok(rows)
}

async fn apply(
    db: &impl ProofStore,
    clock: &ManualClock,
    ids: &mut Vec<ProofRequestId>,
    op: &Op,
) {
    // Individual operations are allowed to fail; only the resulting state is checked.
    match *op {
        Op::CreateRange(slot) => {
            let range = slot_range(slot);
            if let Ok(id) = db.create(ProofKind::Range, range.start, range.end).await {
                ids.push(id);
            }
        }
        Op::Dispatch(i) => {
            if let Some(id) = pick(ids, i) {
                let _ = db.update_status(id, ProofStatus::WitnessGen).await;
            }
        }
        Op::AssignProver(i) => {
            if let Some(id) = pick(ids, i) {
                let _ = db.assign_prover(id, &format!("p-{id}")).await;
            }
        }
        Op::Fulfill(i) => {
            if let Some(id) = pick(ids, i) {
                let _ = db.add_fulfilled_proof(id, &proof_bytes(id)).await;
            }
        }
        Op::Fail(i) => {
            if let Some(id) = pick(ids, i) {
                let _ = db.update_status(id, ProofStatus::Failed).await;
            }
        }
        Op::Retry(i) => {
            if let Some(id) = pick(ids, i) {
                if let Ok(Some(row)) = db.get(id).await {
                    if let Ok(children) = db.create_retry(id, &[row.range()]).await {
                        ids.extend(children);
                    }
                }
            }
        }
        Op::Checkpoint(i) => {
            if let Some(id) = pick(ids, i) {
                if let Ok(Some(row)) = db.get(id).await {
                    let _ = db
                        .attach_l1_checkpoint(
                            row.start_block,
                            row.end_block,
                            100,
                            B256::repeat_byte(0xbe),
                        )
                        .await;
                }
            }
        }
        Op::TryAgg(offset) => {
            if let Ok(AggCreation::Created { id, .. }) =
                db.try_create_agg(BASE, BASE + offset).await
            {
                ids.push(id);
            }
        }
        Op::Tick(secs) => clock.advance(secs),
    }
}

fn pick(ids: &[ProofRequestId], i: usize) -> Option<ProofRequestId> {
    (!ids.is_empty()).then(|| ids[i % ids.len()])
}

fn proof_bytes(id: ProofRequestId) -> Vec<u8> {
    let mut bytes = vec![0xa0];
    bytes.extend_from_slice(&id.to_be_bytes());
    bytes
}

/// Runs `history` against `db`, checking the invariants after every step.
pub async fn check_history(
    db: &impl ProofStore,
    clock: &ManualClock,
    history: &[Op],
) -> Result<(), TestCaseError> {
    let mut ids = Vec::new();
    let mut chain_end = db
        .max_contiguous_range_end(BASE)
        .await
        .map_err(|e| TestCaseError::fail(e.to_string()))?;

    for op in history {
        apply(db, clock, &mut ids, op).await;

        let rows = all_rows(db).await?;

        for row in &rows {
            if row.status == ProofStatus::Complete {
                prop_assert!(
                    row.proof.as_ref().is_some_and(|p| !p.is_empty()),
                    "complete row {} has no proof",
                    row.id
                );
            }
            if row.kind == ProofKind::Agg && row.status != ProofStatus::Unrequested {
                prop_assert!(row.l1_checkpoint().is_some());
            }
        }

        let mut live_aggs: HashMap<u64, usize> = HashMap::new();
        for row in rows
            .iter()
            .filter(|r| r.kind == ProofKind::Agg && r.status != ProofStatus::Failed)
        {
            *live_aggs.entry(row.start_block).or_default() += 1;
        }
        prop_assert!(live_aggs.values().all(|n| *n <= 1), "{live_aggs:?}");

        let mut complete: Vec<BlockRange> = rows
            .iter()
            .filter(|r| r.kind == ProofKind::Range && r.status == ProofStatus::Complete)
            .map(|r| r.range())
            .collect();
        complete.sort_by_key(|r| r.start);
        for pair in complete.windows(2) {
            prop_assert!(!pair[0].overlaps(&pair[1]), "{pair:?}");
        }

        let new_end = db
            .max_contiguous_range_end(BASE)
            .await
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(new_end >= chain_end, "chain shrank {chain_end} -> {new_end}");
        chain_end = new_end;

        let mut children: HashMap<ProofRequestId, usize> = HashMap::new();
        for parent in rows.iter().filter_map(|r| r.retry_of) {
            *children.entry(parent).or_default() += 1;
        }
        for row in rows.iter().filter(|r| children.contains_key(&r.id)) {
            prop_assert_eq!(row.status, ProofStatus::Failed);
        }
    }

    check_tiling(db).await
}

/// `consecutive_range_proofs` succeeds exactly when completed slots tile the requested span.
async fn check_tiling(db: &impl ProofStore) -> Result<(), TestCaseError> {
    let rows = all_rows(db).await?;
    let proof_by_slot: HashMap<u64, Vec<u8>> = rows
        .iter()
        .filter(|r| r.kind == ProofKind::Range && r.status == ProofStatus::Complete)
        .filter_map(|r| Some(((r.start_block - BASE) / SLOT_WIDTH, r.proof.clone()?)))
        .collect();

    for last in 0..SLOTS {
        let end = slot_range(last).end;
        let expected: Option<Vec<Vec<u8>>> =
            (0..=last).map(|s| proof_by_slot.get(&s).cloned()).collect();

        match (db.consecutive_range_proofs(BASE, end).await, expected) {
            (Ok(proofs), Some(expected)) => prop_assert_eq!(proofs, expected),
            (Err(StoreError::Gap { .. } | StoreError::Incomplete { .. }), None) => {}
            (got, expected) => {
                return Err(TestCaseError::fail(format!(
                    "[{BASE}, {end}]: got {got:?}, expected {expected:?}"
                )))
            }
        }
    }
    Ok(())
}

#[macro_export]
macro_rules! proof_store_invariant_tests {
    ($setup_expr:expr) => {
        #[test]
        fn test_random_histories_keep_invariants() {
            use proptest::test_runner::{Config, TestRunner};

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let mut runner = TestRunner::new(Config::with_cases(48));
            runner
                .run(&$crate::invariant_tests::history_strategy(), |history| {
                    rt.block_on(async {
                        let (db, clock) = $setup_expr;
                        $crate::invariant_tests::check_history(&db, &clock, &history).await
                    })
                })
                .unwrap();
        }
    };
}
