use alloy_primitives::B256;
use proposer_common::{Clock, ManualClock};
use proposer_db_types::{
    AggCreation, BlockRange, ProofKind, ProofRequestId, ProofStatus, ProofStore, StoreError,
};

/// Drives a new range row all the way to COMPLETE with `proof`.
pub async fn complete_range(
    db: &impl ProofStore,
    start: u64,
    end: u64,
    proof: &[u8],
) -> ProofRequestId {
    let id = db.create(ProofKind::Range, start, end).await.unwrap();
    db.update_status(id, ProofStatus::WitnessGen).await.unwrap();
    db.assign_prover(id, &format!("range-{id}")).await.unwrap();
    db.add_fulfilled_proof(id, proof).await.unwrap();
    id
}

/// Moves a row to FAILED without it ever reaching the proving service.
pub async fn fail_before_dispatch(db: &impl ProofStore, id: ProofRequestId) {
    db.update_status(id, ProofStatus::WitnessGen).await.unwrap();
    db.update_status(id, ProofStatus::Failed).await.unwrap();
}

pub async fn test_create_and_get(db: &impl ProofStore, clock: &ManualClock) {
    let id = db.create(ProofKind::Range, 1001, 1500).await.unwrap();

    let req = db.get(id).await.unwrap().expect("row exists");
    assert_eq!(req.kind, ProofKind::Range);
    assert_eq!(req.range(), BlockRange::new(1001, 1500).unwrap());
    assert_eq!(req.status, ProofStatus::Unrequested);
    assert_eq!(req.request_added_time, clock.now_secs());
    assert_eq!(req.last_updated_time, clock.now_secs());
    assert_eq!(req.proof_request_time, None);
    assert_eq!(req.prover_request_id, None);
    assert_eq!(req.l1_checkpoint(), None);
    assert_eq!(req.proof, None);
    assert_eq!(req.retry_of, None);

    assert_eq!(db.get(id + 100).await.unwrap(), None);
}

pub async fn test_create_rejects_inverted_range(db: &impl ProofStore) {
    let res = db.create(ProofKind::Range, 20, 10).await;
    assert_eq!(res, Err(StoreError::InvalidRange { start: 20, end: 10 }));
}

pub async fn test_one_live_agg_per_start(db: &impl ProofStore) {
    let first = db.create(ProofKind::Agg, 1001, 2000).await.unwrap();

    let res = db.create(ProofKind::Agg, 1001, 2500).await;
    assert_eq!(
        res,
        Err(StoreError::DuplicateAgg {
            start: 1001,
            existing: first
        })
    );

    db.update_status(first, ProofStatus::Failed)
        .await
        .expect_err("agg without checkpoint cannot leave UNREQ");
    db.attach_l1_checkpoint(1001, 2000, 100, B256::repeat_byte(0xbe))
        .await
        .unwrap();
    db.update_status(first, ProofStatus::Failed).await.unwrap();

    // A failed aggregation no longer blocks its start.
    db.create(ProofKind::Agg, 1001, 2500).await.unwrap();
}

pub async fn test_full_lifecycle(db: &impl ProofStore, clock: &ManualClock) {
    let id = db.create(ProofKind::Range, 1001, 1500).await.unwrap();

    clock.advance(5);
    db.update_status(id, ProofStatus::WitnessGen).await.unwrap();
    let req = db.get(id).await.unwrap().unwrap();
    assert_eq!(req.status, ProofStatus::WitnessGen);
    assert_eq!(req.last_updated_time, clock.now_secs());

    clock.advance(5);
    db.assign_prover(id, "proof-1").await.unwrap();
    let req = db.get(id).await.unwrap().unwrap();
    assert_eq!(req.status, ProofStatus::Proving);
    assert_eq!(req.prover_request_id.as_deref(), Some("proof-1"));
    assert_eq!(req.proof_request_time, Some(clock.now_secs()));

    db.add_fulfilled_proof(id, &[0xa1]).await.unwrap();
    let req = db.get(id).await.unwrap().unwrap();
    assert_eq!(req.status, ProofStatus::Complete);
    assert_eq!(req.proof, Some(vec![0xa1]));
}

pub async fn test_update_status_follows_state_machine(db: &impl ProofStore) {
    let id = db.create(ProofKind::Range, 1, 10).await.unwrap();

    assert!(matches!(
        db.update_status(id, ProofStatus::Proving).await,
        Err(StoreError::InvalidTransition(_, _))
    ));
    assert_eq!(
        db.update_status(id, ProofStatus::Complete).await,
        Err(StoreError::UnsupportedTarget(id, ProofStatus::Complete))
    );
    assert_eq!(
        db.update_status(id, ProofStatus::Unrequested).await,
        Err(StoreError::UnsupportedTarget(id, ProofStatus::Unrequested))
    );

    db.update_status(id, ProofStatus::WitnessGen).await.unwrap();
    db.update_status(id, ProofStatus::Proving).await.unwrap();
    db.update_status(id, ProofStatus::Failed).await.unwrap();
    assert!(matches!(
        db.update_status(id, ProofStatus::Failed).await,
        Err(StoreError::InvalidTransition(_, _))
    ));

    assert_eq!(
        db.update_status(9999, ProofStatus::Failed).await,
        Err(StoreError::NotFound(9999))
    );
}

pub async fn test_agg_needs_checkpoint_to_dispatch(db: &impl ProofStore) {
    let id = db.create(ProofKind::Agg, 1001, 2000).await.unwrap();
    assert_eq!(
        db.update_status(id, ProofStatus::WitnessGen).await,
        Err(StoreError::MissingL1Checkpoint(id))
    );

    let hash = B256::repeat_byte(0xbe);
    db.attach_l1_checkpoint(1001, 2000, 100, hash)
        .await
        .unwrap();
    let req = db.get(id).await.unwrap().unwrap();
    assert_eq!(req.l1_block_number, Some(100));
    assert_eq!(req.l1_block_hash, Some(hash));

    db.update_status(id, ProofStatus::WitnessGen).await.unwrap();

    // Only UNREQ aggregation rows take a checkpoint.
    assert_eq!(
        db.attach_l1_checkpoint(1001, 2000, 101, hash).await,
        Err(StoreError::NoPendingAgg {
            start: 1001,
            end: 2000
        })
    );
}

pub async fn test_attach_checkpoint_ignores_range_rows(db: &impl ProofStore) {
    db.create(ProofKind::Range, 1001, 2000).await.unwrap();
    let res = db
        .attach_l1_checkpoint(1001, 2000, 100, B256::repeat_byte(1))
        .await;
    assert!(matches!(res, Err(StoreError::NoPendingAgg { .. })));
}

pub async fn test_add_fulfilled_proof_guards(db: &impl ProofStore) {
    let id = db.create(ProofKind::Range, 1, 10).await.unwrap();

    // Not PROVING yet.
    assert!(matches!(
        db.add_fulfilled_proof(id, &[1]).await,
        Err(StoreError::InvalidTransition(_, _))
    ));

    db.update_status(id, ProofStatus::WitnessGen).await.unwrap();
    db.assign_prover(id, "p").await.unwrap();
    assert_eq!(
        db.add_fulfilled_proof(id, &[]).await,
        Err(StoreError::EmptyProof(id))
    );

    db.add_fulfilled_proof(id, &[1]).await.unwrap();
    assert_eq!(
        db.add_fulfilled_proof(id, &[2]).await,
        Err(StoreError::ProofAlreadyStored(id))
    );
    assert_eq!(db.get(id).await.unwrap().unwrap().proof, Some(vec![1]));
}

pub async fn test_completed_ranges_never_overlap(db: &impl ProofStore) {
    let first = complete_range(db, 1001, 1500, &[0xa1]).await;

    let second = db.create(ProofKind::Range, 1001, 1500).await.unwrap();
    db.update_status(second, ProofStatus::WitnessGen)
        .await
        .unwrap();
    db.assign_prover(second, "dup").await.unwrap();

    assert_eq!(
        db.add_fulfilled_proof(second, &[0xa2]).await,
        Err(StoreError::OverlappingRange {
            id: second,
            existing: first
        })
    );
    assert_eq!(
        db.get(second).await.unwrap().unwrap().status,
        ProofStatus::Proving
    );
}

pub async fn test_next_unrequested_prefers_agg_then_oldest(
    db: &impl ProofStore,
    clock: &ManualClock,
) {
    assert_eq!(db.next_unrequested().await.unwrap(), None);

    let older = db.create(ProofKind::Range, 1501, 2000).await.unwrap();
    clock.advance(1);
    let newer = db.create(ProofKind::Range, 1001, 1500).await.unwrap();
    assert_eq!(db.next_unrequested().await.unwrap().unwrap().id, older);

    clock.advance(1);
    let agg = db.create(ProofKind::Agg, 1, 1000).await.unwrap();
    assert_eq!(db.next_unrequested().await.unwrap().unwrap().id, agg);

    db.attach_l1_checkpoint(1, 1000, 5, B256::repeat_byte(5))
        .await
        .unwrap();
    db.update_status(agg, ProofStatus::WitnessGen).await.unwrap();
    db.update_status(older, ProofStatus::WitnessGen)
        .await
        .unwrap();
    assert_eq!(db.next_unrequested().await.unwrap().unwrap().id, newer);
}

pub async fn test_pending_proofs_need_prover_id(db: &impl ProofStore) {
    let assigned = db.create(ProofKind::Range, 1, 10).await.unwrap();
    db.update_status(assigned, ProofStatus::WitnessGen)
        .await
        .unwrap();
    db.assign_prover(assigned, "p-1").await.unwrap();

    let bare = db.create(ProofKind::Range, 11, 20).await.unwrap();
    db.update_status(bare, ProofStatus::WitnessGen).await.unwrap();
    db.update_status(bare, ProofStatus::Proving).await.unwrap();

    let pending = db.pending_proofs().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, assigned);
}

/// Relies on the default 20 minute witness generation threshold.
pub async fn test_witnessgen_timed_out(db: &impl ProofStore, clock: &ManualClock) {
    let stalled = db.create(ProofKind::Range, 1, 10).await.unwrap();
    db.update_status(stalled, ProofStatus::WitnessGen)
        .await
        .unwrap();

    clock.advance(600);
    let recent = db.create(ProofKind::Range, 11, 20).await.unwrap();
    db.update_status(recent, ProofStatus::WitnessGen)
        .await
        .unwrap();
    assert!(db.witnessgen_timed_out().await.unwrap().is_empty());

    clock.advance(700);
    let timed_out = db.witnessgen_timed_out().await.unwrap();
    assert_eq!(timed_out.len(), 1);
    assert_eq!(timed_out[0].id, stalled);

    // Rows that already have a prover id are not stragglers.
    db.set_prover_id(stalled, "late").await.unwrap();
    assert!(db.witnessgen_timed_out().await.unwrap().is_empty());
}

pub async fn test_set_prover_id(db: &impl ProofStore, clock: &ManualClock) {
    let id = db.create(ProofKind::Range, 1, 10).await.unwrap();
    clock.advance(42);
    db.set_prover_id(id, "abc").await.unwrap();

    let req = db.get(id).await.unwrap().unwrap();
    assert_eq!(req.prover_request_id.as_deref(), Some("abc"));
    assert_eq!(req.proof_request_time, Some(clock.now_secs()));
    assert_eq!(req.status, ProofStatus::Unrequested);

    assert_eq!(
        db.set_prover_id(id + 1, "abc").await,
        Err(StoreError::NotFound(id + 1))
    );
}

pub async fn test_retry_is_created_once(db: &impl ProofStore) {
    let id = db.create(ProofKind::Range, 1001, 1500).await.unwrap();
    fail_before_dispatch(db, id).await;

    let failed = db.failed_without_dispatch().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, id);

    let range = failed[0].range();
    let children = db.create_retry(id, &[range]).await.unwrap();
    assert_eq!(children.len(), 1);
    assert!(db.create_retry(id, &[range]).await.unwrap().is_empty());
    assert!(db.failed_without_dispatch().await.unwrap().is_empty());

    let child = db.get(children[0]).await.unwrap().unwrap();
    assert_eq!(child.status, ProofStatus::Unrequested);
    assert_eq!(child.range(), range);
    assert_eq!(child.retry_of, Some(id));
    assert_eq!(
        db.get(id).await.unwrap().unwrap().status,
        ProofStatus::Failed
    );
}

pub async fn test_retry_rules(db: &impl ProofStore) {
    let id = db.create(ProofKind::Range, 1001, 1500).await.unwrap();
    let range = BlockRange::new(1001, 1500).unwrap();
    assert_eq!(
        db.create_retry(id, &[range]).await,
        Err(StoreError::RetryOfNonFailed(id))
    );

    fail_before_dispatch(db, id).await;
    let outside = BlockRange::new(1001, 1501).unwrap();
    assert_eq!(
        db.create_retry(id, &[outside]).await,
        Err(StoreError::RetryOutOfBounds {
            parent: id,
            start: 1001,
            end: 1501
        })
    );

    let halves = range.split_half().unwrap();
    let children = db.create_retry(id, &[halves.0, halves.1]).await.unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(db.get(children[1]).await.unwrap().unwrap().start_block, 1251);
}

pub async fn test_agg_retry_drops_checkpoint(db: &impl ProofStore) {
    let id = db.create(ProofKind::Agg, 1001, 2000).await.unwrap();
    db.attach_l1_checkpoint(1001, 2000, 100, B256::repeat_byte(0xbe))
        .await
        .unwrap();
    db.update_status(id, ProofStatus::WitnessGen).await.unwrap();
    db.update_status(id, ProofStatus::Failed).await.unwrap();

    let range = BlockRange::new(1001, 2000).unwrap();
    let children = db.create_retry(id, &[range]).await.unwrap();
    let child = db.get(children[0]).await.unwrap().unwrap();
    assert_eq!(child.kind, ProofKind::Agg);
    assert_eq!(child.l1_checkpoint(), None);
}

pub async fn test_latest_end_block(db: &impl ProofStore) {
    assert_eq!(db.latest_end_block().await.unwrap(), None);

    db.create(ProofKind::Range, 1001, 1500).await.unwrap();
    let failed = db.create(ProofKind::Range, 1501, 2000).await.unwrap();
    fail_before_dispatch(db, failed).await;

    // Every row counts, whatever its status.
    assert_eq!(db.latest_end_block().await.unwrap(), Some(2000));
}

pub async fn test_count_with_status(db: &impl ProofStore) {
    let a = db.create(ProofKind::Range, 1, 10).await.unwrap();
    let b = db.create(ProofKind::Range, 11, 20).await.unwrap();
    db.create(ProofKind::Range, 21, 30).await.unwrap();
    db.update_status(a, ProofStatus::WitnessGen).await.unwrap();
    db.update_status(b, ProofStatus::WitnessGen).await.unwrap();
    db.assign_prover(b, "p").await.unwrap();

    let wg = db.count_with_status(&[ProofStatus::WitnessGen]).await;
    assert_eq!(wg.unwrap(), 1);
    let pv = db.count_with_status(&[ProofStatus::Proving]).await;
    assert_eq!(pv.unwrap(), 1);
    let in_flight = db
        .count_with_status(&[ProofStatus::WitnessGen, ProofStatus::Proving])
        .await;
    assert_eq!(in_flight.unwrap(), 2);
    let queued = db.count_with_status(&[ProofStatus::Unrequested]).await;
    assert_eq!(queued.unwrap(), 1);
    assert_eq!(db.count_with_status(&[]).await.unwrap(), 0);

    let witnessgen = db.rows_with_status(ProofStatus::WitnessGen).await.unwrap();
    assert_eq!(witnessgen.len(), 1);
    assert_eq!(witnessgen[0].id, a);
}

pub async fn test_contiguous_chain_and_agg_creation(db: &impl ProofStore) {
    assert_eq!(db.max_contiguous_range_end(1001).await.unwrap(), 1000);

    complete_range(db, 1001, 1500, &[0xa1]).await;
    assert_eq!(db.max_contiguous_range_end(1001).await.unwrap(), 1500);
    complete_range(db, 1501, 2000, &[0xa2]).await;
    assert_eq!(db.max_contiguous_range_end(1001).await.unwrap(), 2000);

    let created = db.try_create_agg(1001, 1010).await.unwrap();
    let AggCreation::Created { id, end } = created else {
        panic!("expected an aggregation to be queued, got {created:?}");
    };
    assert_eq!(end, 2000);

    let agg = db.get(id).await.unwrap().unwrap();
    assert_eq!(agg.kind, ProofKind::Agg);
    assert_eq!(agg.range(), BlockRange::new(1001, 2000).unwrap());
    assert_eq!(agg.status, ProofStatus::Unrequested);

    assert_eq!(
        db.try_create_agg(1001, 1010).await.unwrap(),
        AggCreation::AlreadyExists { id }
    );
}

pub async fn test_gap_blocks_aggregation(db: &impl ProofStore) {
    complete_range(db, 1001, 1500, &[0xa1]).await;
    complete_range(db, 1601, 2000, &[0xa3]).await;

    assert_eq!(db.max_contiguous_range_end(1001).await.unwrap(), 1500);
    assert_eq!(
        db.try_create_agg(1001, 1600).await.unwrap(),
        AggCreation::InsufficientCoverage { max_end: 1500 }
    );
    assert!(db.next_unrequested().await.unwrap().is_none());
}

pub async fn test_consecutive_range_proofs(db: &impl ProofStore) {
    complete_range(db, 1001, 1500, &[0xa1]).await;
    complete_range(db, 1501, 2000, &[0xa2]).await;
    complete_range(db, 2101, 2500, &[0xa4]).await;

    // In-flight rows are not part of any chain.
    let pending = db.create(ProofKind::Range, 2001, 2100).await.unwrap();
    db.update_status(pending, ProofStatus::WitnessGen)
        .await
        .unwrap();

    assert_eq!(
        db.consecutive_range_proofs(1001, 2000).await.unwrap(),
        vec![vec![0xa1], vec![0xa2]]
    );
    assert_eq!(
        db.consecutive_range_proofs(1501, 2000).await.unwrap(),
        vec![vec![0xa2]]
    );
    assert_eq!(
        db.consecutive_range_proofs(1001, 2500).await,
        Err(StoreError::Gap {
            expected: 2001,
            found: 2101
        })
    );
    assert_eq!(
        db.consecutive_range_proofs(2101, 3000).await,
        Err(StoreError::Incomplete {
            covered_to: 2500,
            end: 3000
        })
    );
    assert_eq!(
        db.consecutive_range_proofs(1001, 1700).await,
        Err(StoreError::Incomplete {
            covered_to: 1500,
            end: 1700
        })
    );
    assert_eq!(
        db.consecutive_range_proofs(2000, 1001).await,
        Err(StoreError::InvalidRange {
            start: 2000,
            end: 1001
        })
    );
}

pub async fn test_completed_aggs_from(db: &impl ProofStore) {
    complete_range(db, 1001, 2000, &[0xa1]).await;
    let AggCreation::Created { id, .. } = db.try_create_agg(1001, 1010).await.unwrap() else {
        panic!("aggregation not queued");
    };
    assert!(db.completed_aggs_from(1001).await.unwrap().is_empty());

    db.attach_l1_checkpoint(1001, 2000, 100, B256::repeat_byte(0xbe))
        .await
        .unwrap();
    db.update_status(id, ProofStatus::WitnessGen).await.unwrap();
    db.assign_prover(id, "agg").await.unwrap();
    db.add_fulfilled_proof(id, &[0xaa]).await.unwrap();

    let aggs = db.completed_aggs_from(1001).await.unwrap();
    assert_eq!(aggs.len(), 1);
    assert_eq!(aggs[0].id, id);
    assert_eq!(aggs[0].proof, Some(vec![0xaa]));
    assert!(db.completed_aggs_from(1000).await.unwrap().is_empty());
}

#[macro_export]
macro_rules! proof_store_tests {
    ($setup_expr:expr) => {
        #[tokio::test]
        async fn test_create_and_get() {
            let (db, clock) = $setup_expr;
            $crate::proof_store_tests::test_create_and_get(&db, &clock).await;
        }

        #[tokio::test]
        async fn test_create_rejects_inverted_range() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_create_rejects_inverted_range(&db).await;
        }

        #[tokio::test]
        async fn test_one_live_agg_per_start() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_one_live_agg_per_start(&db).await;
        }

        #[tokio::test]
        async fn test_full_lifecycle() {
            let (db, clock) = $setup_expr;
            $crate::proof_store_tests::test_full_lifecycle(&db, &clock).await;
        }

        #[tokio::test]
        async fn test_update_status_follows_state_machine() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_update_status_follows_state_machine(&db).await;
        }

        #[tokio::test]
        async fn test_agg_needs_checkpoint_to_dispatch() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_agg_needs_checkpoint_to_dispatch(&db).await;
        }

        #[tokio::test]
        async fn test_attach_checkpoint_ignores_range_rows() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_attach_checkpoint_ignores_range_rows(&db).await;
        }

        #[tokio::test]
        async fn test_add_fulfilled_proof_guards() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_add_fulfilled_proof_guards(&db).await;
        }

        #[tokio::test]
        async fn test_completed_ranges_never_overlap() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_completed_ranges_never_overlap(&db).await;
        }

        #[tokio::test]
        async fn test_next_unrequested_prefers_agg_then_oldest() {
            let (db, clock) = $setup_expr;
            $crate::proof_store_tests::test_next_unrequested_prefers_agg_then_oldest(&db, &clock)
                .await;
        }

        #[tokio::test]
        async fn test_pending_proofs_need_prover_id() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_pending_proofs_need_prover_id(&db).await;
        }

        #[tokio::test]
        async fn test_witnessgen_timed_out() {
            let (db, clock) = $setup_expr;
            $crate::proof_store_tests::test_witnessgen_timed_out(&db, &clock).await;
        }

        #[tokio::test]
        async fn test_set_prover_id() {
            let (db, clock) = $setup_expr;
            $crate::proof_store_tests::test_set_prover_id(&db, &clock).await;
        }

        #[tokio::test]
        async fn test_retry_is_created_once() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_retry_is_created_once(&db).await;
        }

        #[tokio::test]
        async fn test_retry_rules() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_retry_rules(&db).await;
        }

        #[tokio::test]
        async fn test_agg_retry_drops_checkpoint() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_agg_retry_drops_checkpoint(&db).await;
        }

        #[tokio::test]
        async fn test_latest_end_block() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_latest_end_block(&db).await;
        }

        #[tokio::test]
        async fn test_count_with_status() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_count_with_status(&db).await;
        }

        #[tokio::test]
        async fn test_contiguous_chain_and_agg_creation() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_contiguous_chain_and_agg_creation(&db).await;
        }

        #[tokio::test]
        async fn test_gap_blocks_aggregation() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_gap_blocks_aggregation(&db).await;
        }

        #[tokio::test]
        async fn test_consecutive_range_proofs() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_consecutive_range_proofs(&db).await;
        }

        #[tokio::test]
        async fn test_completed_aggs_from() {
            let (db, _clock) = $setup_expr;
            $crate::proof_store_tests::test_completed_aggs_from(&db).await;
        }
    };
}
