use std::collections::HashSet;
use std::str::FromStr;

use accelerator::bitcoin::{OutPoint, ScriptBuf, Sequence, Transaction, Txid};
use accelerator::blockchain::api::Tx;
use accelerator::blockchain::{Blockchain, IndexedOutput, UtxoIndex};
use accelerator::testutils::{
    p2pkh, p2sh_p2wpkh, p2tr, p2wpkh, script_of, signing_keys, test_pubkey, test_xonly,
    MemoryBlockchain, TEST_NETWORK,
};
use accelerator::{
    classify, Accelerator, CpfpParams, Error, ErrorKind, FeePolicy, FeeRate, Outcome,
    PlanResponse, SigningKeys, Strategy, TxState, UtxoCandidate,
};
use assert_matches::assert_matches;

mod common;
use common::*;

const RBF: Sequence = Sequence::ENABLE_RBF_NO_LOCKTIME;

fn rate(sat_per_vb: f64) -> FeeRate {
    FeeRate::from_sat_per_vb(sat_per_vb)
}

#[test]
fn scenario_a_rbf_shrinks_change() {
    let mut chain = MemoryBlockchain::new();
    let me = p2wpkh(1);
    let txid = get_stuck_tx(
        &mut chain,
        &[(25_500, &me), (25_500, &me)],
        &[(50_000, &me)],
        RBF,
        200,
    );
    let accelerator = get_accelerator(&chain);

    let plan = accelerator
        .build_rbf(&txid.to_string(), rate(10.0), &wallet(&[&me]), &signing_keys(1))
        .unwrap();

    assert_eq!(plan.output_values(), vec![49_000]);
    assert_eq!(plan.implied_fee(), 2_000);
    assert_balanced(&plan);
    assert_no_dust(&plan, &[]);

    let tx = plan.unsigned_tx();
    assert_eq!(tx.input.len(), 2);
    assert!(tx.input.iter().all(|input| input.sequence.0 == 0xFFFF_FFFD));
    assert_eq!(tx.output[0].script_pubkey, script_of(&me));

    let summary = plan.summary();
    assert_eq!(summary.inputs.count, 2);
    assert_eq!(summary.inputs.value, 51_000);
    assert_eq!(summary.outputs.value, 49_000);
    assert_eq!(summary.fee, 2_000);

    // every input is tagged for the wallet's key
    for input in &plan.psbt().inputs {
        assert!(input.bip32_derivation.contains_key(&test_pubkey(1).0));
        assert!(input.non_witness_utxo.is_none());
    }
}

#[test]
fn scenario_b_rbf_without_spare_change() {
    let mut chain = MemoryBlockchain::new();
    let me = p2wpkh(1);
    let txid = get_stuck_tx(&mut chain, &[(773, &me), (773, &me)], &[(546, &me)], RBF, 200);
    let accelerator = get_accelerator(&chain);

    let err = accelerator
        .build_rbf(&txid.to_string(), rate(10.0), &wallet(&[&me]), &signing_keys(1))
        .unwrap_err();

    assert_matches!(
        err,
        Error::InsufficientChange {
            needed: 1_000,
            available: 0
        }
    );
    assert_eq!(err.kind(), ErrorKind::Shortfall);
    assert_eq!(err.shortfall(), Some(1_000));
    assert!(err.to_string().contains("consider CPFP"));
}

#[test]
fn scenario_c_simple_cpfp_folds_dust_change() {
    let mut chain = MemoryBlockchain::new();
    let (inscriptions, me, other) = (p2tr(1), p2wpkh(1), p2wpkh(9));
    let parent = get_stuck_tx(
        &mut chain,
        &[(10_000, &other)],
        &[(1_000, &inscriptions), (8_000, &other)],
        RBF,
        200,
    );
    let accelerator = get_accelerator(&chain);

    let params = CpfpParams {
        parent_txid: parent.to_string(),
        output_index: 0,
        output_value: 1_000,
        output_address: inscriptions.clone(),
        user_address: me.clone(),
        child_fee: 400,
        additional_utxos: vec![],
        preserve_anchor_value: false,
    };
    let plan = accelerator.build_cpfp(&params, &signing_keys(1)).unwrap();

    assert_eq!(plan.output_values(), vec![600]);
    assert_eq!(plan.implied_fee(), 400);
    assert_balanced(&plan);
    assert_no_dust(&plan, &[]);

    let tx = plan.unsigned_tx();
    assert_eq!(tx.input[0].previous_output, OutPoint::new(parent, 0));
    assert_eq!(tx.input[0].sequence.0, 0xFFFF_FFFD);
    assert_eq!(tx.output[0].script_pubkey, script_of(&inscriptions));
    assert_eq!(plan.psbt().inputs[0].tap_internal_key, Some(test_xonly(1)));
}

#[test]
fn scenario_d_hybrid_cpfp_preserves_anchor() {
    let mut chain = MemoryBlockchain::new();
    let (inscriptions, me, other) = (p2tr(1), p2wpkh(1), p2wpkh(9));
    let parent = get_stuck_tx(
        &mut chain,
        &[(10_000, &other)],
        &[(330, &inscriptions), (8_670, &other)],
        RBF,
        200,
    );
    let extra = fund(&mut chain, &[(2_000, &me)])[0];
    let accelerator = get_accelerator(&chain);

    let params = CpfpParams {
        parent_txid: parent.to_string(),
        output_index: 0,
        output_value: 330,
        output_address: inscriptions.clone(),
        user_address: me.clone(),
        child_fee: 500,
        additional_utxos: vec![UtxoCandidate::from((extra, 2_000))],
        preserve_anchor_value: true,
    };
    let plan = accelerator.build_cpfp(&params, &signing_keys(1)).unwrap();

    assert_eq!(plan.output_values(), vec![330, 1_500]);
    assert_eq!(plan.implied_fee(), 500);
    assert_balanced(&plan);
    assert_no_dust(&plan, &[0]);

    let tx = plan.unsigned_tx();
    assert_eq!(tx.input[1].previous_output, extra);
    assert_eq!(tx.output[1].script_pubkey, script_of(&me));

    // each input is described with the address that controls it
    let psbt = plan.psbt();
    assert_eq!(psbt.inputs[0].tap_internal_key, Some(test_xonly(1)));
    assert!(psbt.inputs[0].bip32_derivation.is_empty());
    assert_eq!(psbt.inputs[1].tap_internal_key, None);
    assert!(psbt.inputs[1].bip32_derivation.contains_key(&test_pubkey(1).0));
}

#[test]
fn scenario_e_cancellation() {
    let mut chain = MemoryBlockchain::new();
    let (me, other) = (p2wpkh(1), p2wpkh(9));
    let txid = get_stuck_tx(
        &mut chain,
        &[(100_000, &me)],
        &[(60_000, &other), (39_000, &me)],
        RBF,
        150,
    );
    let accelerator = get_accelerator(&chain);

    let plan = accelerator
        .build_cancel(
            &txid.to_string(),
            rate(20.0),
            &wallet(&[&me]),
            &me,
            &signing_keys(1),
        )
        .unwrap();

    assert_eq!(plan.output_values(), vec![97_000]);
    assert_eq!(plan.implied_fee(), 3_000);
    assert_eq!(plan.unsigned_tx().output[0].script_pubkey, script_of(&me));
    assert_balanced(&plan);
}

#[test]
fn scenario_f_unknown_transaction() {
    let chain = MemoryBlockchain::new();
    let accelerator = get_accelerator(&chain);
    let txid = "f".repeat(64);

    let report = accelerator.analyze(&txid, &wallet(&[&p2wpkh(1)])).unwrap();

    assert_eq!(report.snapshot.status, TxState::NotFound);
    assert!(!report.analysis.can_rbf);
    assert!(!report.analysis.can_simple_cpfp);
    assert!(!report.analysis.can_hybrid_cpfp);
    assert!(!report.analysis.wallet_controls_all_inputs);
    assert_eq!(report.analysis.recommended_strategy, Strategy::None);
    assert!(report.fee_estimate.is_none());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["snapshot"]["status"], "not_found");
    assert_eq!(json["analysis"]["recommendedStrategy"], "none");
}

#[test]
fn test_analyze_recommends_rbf() {
    let mut chain = MemoryBlockchain::new();
    let me = p2wpkh(1);
    let txid = get_stuck_tx(
        &mut chain,
        &[(25_500, &me), (25_500, &me)],
        &[(50_000, &me)],
        RBF,
        200,
    );
    let accelerator = get_accelerator(&chain);

    let report = accelerator.analyze(&txid.to_string(), &wallet(&[&me])).unwrap();

    assert_eq!(report.snapshot.status, TxState::Unconfirmed);
    assert_eq!(report.snapshot.fee, 1_000);
    assert_eq!(report.snapshot.fee_rate, rate(5.0));
    assert!(report.snapshot.opt_in_rbf);
    assert!(report.analysis.wallet_controls_all_inputs);
    assert_eq!(report.analysis.required_rbf_fee, 500);
    assert_eq!(report.analysis.available_rbf_liquidity, 49_454);
    assert!(report.analysis.can_rbf);
    assert_eq!(report.analysis.recommended_strategy, Strategy::Rbf);
    assert_eq!(
        report.fee_estimate.unwrap().recommended_child_fee,
        1_550
    );
}

#[test]
fn test_analyze_partially_owned_and_confirmed() {
    let mut chain = MemoryBlockchain::new();
    let (me, other) = (p2wpkh(1), p2wpkh(9));
    let txid = get_stuck_tx(
        &mut chain,
        &[(30_000, &me), (30_000, &other)],
        &[(20_000, &other), (39_000, &me)],
        RBF,
        200,
    );

    {
        let accelerator = get_accelerator(&chain);
        let report = accelerator.analyze(&txid.to_string(), &wallet(&[&me])).unwrap();

        assert!(!report.analysis.wallet_controls_all_inputs);
        assert!(!report.analysis.can_rbf);
        assert!(report.analysis.can_simple_cpfp);
        assert_eq!(report.analysis.user_output, Some(1));
        assert_eq!(report.analysis.recommended_strategy, Strategy::Cpfp);
        assert!(report.snapshot.inputs[0].belongs_to_wallet);
        assert!(!report.snapshot.inputs[1].belongs_to_wallet);
    }

    chain.confirm(&txid);
    let accelerator = get_accelerator(&chain);
    let report = accelerator.analyze(&txid.to_string(), &wallet(&[&me])).unwrap();

    assert_eq!(report.snapshot.status, TxState::Confirmed);
    assert!(!report.analysis.can_simple_cpfp);
    assert!(!report.analysis.can_hybrid_cpfp);
    assert_eq!(report.analysis.recommended_strategy, Strategy::None);
}

#[test]
fn test_rbf_preconditions() {
    let mut chain = MemoryBlockchain::new();
    let (me, other) = (p2wpkh(1), p2wpkh(9));
    let foreign = get_stuck_tx(
        &mut chain,
        &[(30_000, &me), (30_000, &other)],
        &[(59_000, &me)],
        RBF,
        200,
    );
    let final_tx = get_stuck_tx(
        &mut chain,
        &[(30_000, &me)],
        &[(29_000, &me)],
        Sequence::MAX,
        200,
    );
    let cheap = get_stuck_tx(&mut chain, &[(30_000, &me)], &[(29_000, &me)], RBF, 200);
    let confirmed = get_stuck_tx(&mut chain, &[(30_000, &me)], &[(28_999, &me)], RBF, 200);
    chain.confirm(&confirmed);
    let accelerator = get_accelerator(&chain);
    let build = |txid: Txid, target: f64| {
        accelerator.build_rbf(
            &txid.to_string(),
            rate(target),
            &wallet(&[&me]),
            &signing_keys(1),
        )
    };

    assert_matches!(build(foreign, 10.0), Err(Error::ForeignInput { index: 1, .. }));
    assert_matches!(
        build(final_tx, 10.0),
        Err(Error::IrreplaceableTransaction(_))
    );
    assert_matches!(
        build(cheap, 5.0),
        Err(Error::FeeRateAlreadyMet {
            current: 1_000,
            required: 1_000
        })
    );
    assert_matches!(build(confirmed, 10.0), Err(Error::TransactionConfirmed(_)));

    let err = build(foreign, 10.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(!err.is_retryable());

    let missing = Txid::from_str(&"e".repeat(64)).unwrap();
    assert_matches!(build(missing, 10.0), Err(Error::TransactionNotFound(_)));
}

#[test]
fn test_locktime_only_sequence_is_not_replaceable() {
    let mut chain = MemoryBlockchain::new();
    let me = p2wpkh(1);
    let txid = get_stuck_tx(
        &mut chain,
        &[(25_500, &me), (25_500, &me)],
        &[(50_000, &me)],
        Sequence::ENABLE_LOCKTIME_NO_RBF,
        200,
    );
    let accelerator = get_accelerator(&chain);

    let report = accelerator.analyze(&txid.to_string(), &wallet(&[&me])).unwrap();
    assert!(!report.snapshot.opt_in_rbf);
    assert!(!report.analysis.can_rbf);

    assert_matches!(
        accelerator.build_rbf(&txid.to_string(), rate(10.0), &wallet(&[&me]), &signing_keys(1)),
        Err(Error::IrreplaceableTransaction(_))
    );
}

#[test]
fn test_wallet_addresses_ignore_bech32_case() {
    let mut chain = MemoryBlockchain::new();
    let me = p2wpkh(1);
    let txid = get_stuck_tx(
        &mut chain,
        &[(25_500, &me), (25_500, &me)],
        &[(50_000, &me)],
        RBF,
        200,
    );
    let accelerator = get_accelerator(&chain);
    let shouting = me.to_uppercase();

    let report = accelerator
        .analyze(&txid.to_string(), &wallet(&[&shouting]))
        .unwrap();
    assert!(report.analysis.wallet_controls_all_inputs);

    let plan = accelerator
        .build_rbf(&txid.to_string(), rate(10.0), &wallet(&[&shouting]), &signing_keys(1))
        .unwrap();
    assert_eq!(plan.output_values(), vec![49_000]);
    assert_balanced(&plan);
}

#[test]
fn test_rbf_legacy_and_nested_inputs() {
    let mut chain = MemoryBlockchain::new();
    let (nested, legacy, change, other) = (p2sh_p2wpkh(1), p2pkh(1), p2wpkh(1), p2wpkh(9));
    let txid = get_stuck_tx(
        &mut chain,
        &[(30_000, &nested), (20_000, &legacy)],
        &[(45_000, &other), (4_000, &change)],
        RBF,
        250,
    );
    let accelerator = get_accelerator(&chain);

    let plan = accelerator
        .build_rbf(
            &txid.to_string(),
            rate(8.0),
            &wallet(&[&nested, &legacy, &change]),
            &signing_keys(1),
        )
        .unwrap();

    assert_eq!(plan.output_values(), vec![45_000, 3_000]);
    assert_balanced(&plan);

    let psbt = plan.psbt();
    assert_eq!(
        psbt.inputs[0].redeem_script,
        Some(ScriptBuf::new_p2wpkh(&test_pubkey(1).wpubkey_hash()))
    );
    assert!(psbt.inputs[0].non_witness_utxo.is_none());

    let prev_tx: &Transaction = psbt.inputs[1].non_witness_utxo.as_ref().unwrap();
    assert_eq!(
        prev_tx.compute_txid(),
        plan.unsigned_tx().input[1].previous_output.txid
    );
    assert!(psbt.inputs[1].bip32_derivation.contains_key(&test_pubkey(1).0));
}

#[test]
fn test_cancel_into_dust_is_refused() {
    let mut chain = MemoryBlockchain::new();
    let me = p2wpkh(1);
    let txid = get_stuck_tx(&mut chain, &[(2_000, &me)], &[(1_800, &me)], RBF, 150);
    let accelerator = get_accelerator(&chain);

    // 20 sat/vB over 150 vB leaves 2_000 - 3_000 for the single output
    let err = accelerator
        .build_cancel(&txid.to_string(), rate(20.0), &wallet(&[&me]), &me, &SigningKeys::default())
        .unwrap_err();

    assert_matches!(
        err,
        Error::InsufficientFunds {
            needed: 3_546,
            available: 2_000
        }
    );
    assert_eq!(err.shortfall(), Some(1_546));
}

#[test]
fn test_accelerate_cpfp_simple() {
    let mut chain = MemoryBlockchain::new();
    let (me, other) = (p2wpkh(1), p2wpkh(9));
    let parent = get_stuck_tx(
        &mut chain,
        &[(60_000, &other)],
        &[(9_000, &other), (50_000, &me)],
        RBF,
        200,
    );
    let accelerator = get_accelerator(&chain);

    let cpfp = accelerator
        .accelerate_cpfp(
            &parent.to_string(),
            &wallet(&[&me]),
            &me,
            None,
            &HashSet::new(),
            &signing_keys(1),
        )
        .unwrap();

    assert_eq!(cpfp.strategy, Strategy::Cpfp);
    assert!(cpfp.additional_utxos.is_empty());
    assert_eq!(cpfp.fee_estimate.recommended_child_fee, 1_550);
    assert_eq!(cpfp.plan.output_values(), vec![48_450]);
    assert_eq!(
        cpfp.plan.unsigned_tx().input[0].previous_output,
        OutPoint::new(parent, 1)
    );
    assert_balanced(&cpfp.plan);
}

#[test]
fn test_accelerate_cpfp_hybrid() {
    let mut chain = MemoryBlockchain::new();
    let (inscriptions, me, other) = (p2tr(1), p2wpkh(1), p2wpkh(9));
    let parent = get_stuck_tx(
        &mut chain,
        &[(10_000, &other)],
        &[(330, &inscriptions), (8_670, &other)],
        RBF,
        200,
    );
    let utxos = fund(&mut chain, &[(700, &me), (5_000, &me), (20_000, &me)]);

    {
        let accelerator = get_accelerator(&chain);
        let cpfp = accelerator
            .accelerate_cpfp(
                &parent.to_string(),
                &wallet(&[&inscriptions, &me]),
                &me,
                None,
                &HashSet::new(),
                &signing_keys(1),
            )
            .unwrap();

        assert_eq!(cpfp.strategy, Strategy::HybridCpfp);
        assert_eq!(
            cpfp.additional_utxos,
            vec![UtxoCandidate::from((utxos[2], 20_000))]
        );
        assert_eq!(cpfp.plan.output_values(), vec![330, 18_450]);
        assert_eq!(cpfp.plan.implied_fee(), 1_550);
        assert_balanced(&cpfp.plan);
        assert_no_dust(&cpfp.plan, &[0]);

        // the biggest UTXO is reserved elsewhere
        let excluded = vec![utxos[2]].into_iter().collect::<HashSet<_>>();
        let cpfp = accelerator
            .accelerate_cpfp(
                &parent.to_string(),
                &wallet(&[&inscriptions, &me]),
                &me,
                None,
                &excluded,
                &signing_keys(1),
            )
            .unwrap();
        assert_eq!(cpfp.plan.output_values(), vec![330, 3_450]);

        let response = PlanResponse::from(&cpfp.plan);
        assert_eq!(response.summary.inputs.count, 2);
        assert_eq!(response.psbt, cpfp.plan.to_base64());
    }

    chain.set_indexer_down(true);
    let accelerator = get_accelerator(&chain);
    let err = accelerator
        .accelerate_cpfp(
            &parent.to_string(),
            &wallet(&[&inscriptions, &me]),
            &me,
            None,
            &HashSet::new(),
            &signing_keys(1),
        )
        .unwrap_err();
    assert!(err.is_retryable());

    let outcome = Outcome::<PlanResponse>::from(Err(err));
    assert!(!outcome.success);
    assert_eq!(outcome.error.unwrap().kind, ErrorKind::Upstream);
}

#[test]
fn test_hybrid_cpfp_without_funds() {
    let mut chain = MemoryBlockchain::new();
    let (inscriptions, me, other) = (p2tr(1), p2wpkh(1), p2wpkh(9));
    let parent = get_stuck_tx(
        &mut chain,
        &[(10_000, &other)],
        &[(330, &inscriptions), (8_670, &other)],
        RBF,
        200,
    );
    fund(&mut chain, &[(700, &me)]);
    let accelerator = get_accelerator(&chain);

    let err = accelerator
        .accelerate_cpfp(
            &parent.to_string(),
            &wallet(&[&inscriptions, &me]),
            &me,
            None,
            &HashSet::new(),
            &signing_keys(1),
        )
        .unwrap_err();

    assert_matches!(
        err,
        Error::InsufficientFunds {
            needed: 1_550,
            available: 0
        }
    );
}

#[test]
fn test_cpfp_checks_the_spent_outputs() {
    let mut chain = MemoryBlockchain::new();
    let (inscriptions, me, other) = (p2tr(1), p2wpkh(1), p2wpkh(9));
    let parent = get_stuck_tx(
        &mut chain,
        &[(10_000, &other)],
        &[(1_000, &inscriptions), (8_000, &other)],
        RBF,
        200,
    );
    let foreign_utxo = fund(&mut chain, &[(5_000, &other)])[0];
    let params = CpfpParams {
        parent_txid: parent.to_string(),
        output_index: 0,
        output_value: 1_000,
        output_address: inscriptions.clone(),
        user_address: me.clone(),
        child_fee: 400,
        additional_utxos: vec![],
        preserve_anchor_value: false,
    };

    {
        let accelerator = get_accelerator(&chain);
        let keys = signing_keys(1);

        let wrong_value = CpfpParams {
            output_value: 2_000,
            ..params.clone()
        };
        assert_matches!(
            accelerator.build_cpfp(&wrong_value, &keys),
            Err(Error::PrevoutMismatch { .. })
        );

        let wrong_address = CpfpParams {
            output_address: p2tr(2),
            ..params.clone()
        };
        assert_matches!(
            accelerator.build_cpfp(&wrong_address, &keys),
            Err(Error::PrevoutMismatch { .. })
        );

        let no_such_output = CpfpParams {
            output_index: 5,
            ..params.clone()
        };
        assert_matches!(
            accelerator.build_cpfp(&no_such_output, &keys),
            Err(Error::InvalidOutpoint(_))
        );

        let not_mine = CpfpParams {
            additional_utxos: vec![UtxoCandidate::from((foreign_utxo, 5_000))],
            ..params.clone()
        };
        assert_matches!(
            accelerator.build_cpfp(&not_mine, &keys),
            Err(Error::PrevoutMismatch { .. })
        );

        let twice = CpfpParams {
            additional_utxos: vec![UtxoCandidate::from((OutPoint::new(parent, 0), 1_000))],
            ..params.clone()
        };
        assert_matches!(
            accelerator.build_cpfp(&twice, &keys),
            Err(Error::InvalidOutpoint(_))
        );
    }

    chain.mark_spent(OutPoint::new(parent, 0));
    let accelerator = get_accelerator(&chain);
    assert_matches!(
        accelerator.build_cpfp(&params, &signing_keys(1)),
        Err(Error::OutputSpent(_))
    );
}

#[test]
fn test_fetch_spendable() {
    let mut chain = MemoryBlockchain::new();
    let me = p2wpkh(1);
    let utxos = fund(
        &mut chain,
        &[(800, &me), (801, &me), (50_000, &me), (3_000, &me), (9_000, &p2wpkh(2))],
    );
    let accelerator = get_accelerator(&chain);

    let excluded = vec![utxos[3]].into_iter().collect::<HashSet<_>>();
    let candidates = accelerator.fetch_spendable(&me, &excluded).unwrap();

    assert_eq!(
        candidates,
        vec![
            UtxoCandidate::from((utxos[2], 50_000)),
            UtxoCandidate::from((utxos[1], 801)),
        ]
    );
}

/// Providers that fail the test if they're ever called
struct Offline;

impl Blockchain for Offline {
    fn get_tx(&self, _txid: &Txid) -> Result<Option<Tx>, Error> {
        panic!("unexpected network call")
    }

    fn get_raw_tx(&self, _txid: &Txid) -> Result<Option<Transaction>, Error> {
        panic!("unexpected network call")
    }
}

impl UtxoIndex for Offline {
    fn list_outputs(&self, _address: &str) -> Result<Vec<IndexedOutput>, Error> {
        panic!("unexpected network call")
    }
}

#[test]
fn test_validation_happens_before_any_call() {
    init_logger();
    let accelerator = Accelerator::new(Offline, Offline, TEST_NETWORK, FeePolicy::default());
    let txid = "a".repeat(64);
    let me = wallet(&[&p2wpkh(1)]);
    let keys = SigningKeys::default();

    assert_matches!(
        accelerator.analyze("not-a-txid", &me),
        Err(Error::InvalidTxid(_))
    );
    assert_matches!(
        accelerator.analyze(&txid, &[]),
        Err(Error::NoWalletAddresses)
    );
    // mainnet address on a regtest engine
    assert_matches!(
        accelerator.analyze(&txid, &wallet(&["bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"])),
        Err(Error::InvalidAddress(_))
    );
    assert_matches!(
        accelerator.build_rbf(&txid, rate(0.0), &me, &keys),
        Err(Error::InvalidFeeRate(_))
    );
    assert_matches!(
        accelerator.build_cancel(&txid, rate(-2.0), &me, &p2wpkh(1), &keys),
        Err(Error::InvalidFeeRate(_))
    );
    assert_matches!(
        accelerator.build_cancel(&txid, rate(5.0), &me, "nope", &keys),
        Err(Error::InvalidAddress(_))
    );
    assert_matches!(
        accelerator.fetch_spendable("nope", &HashSet::new()),
        Err(Error::InvalidAddress(_))
    );

    let params = CpfpParams {
        parent_txid: txid.clone(),
        output_index: 0,
        output_value: 1_000,
        output_address: p2tr(1),
        user_address: p2wpkh(1),
        child_fee: 0,
        additional_utxos: vec![],
        preserve_anchor_value: false,
    };
    let err = accelerator.build_cpfp(&params, &keys).unwrap_err();
    assert_matches!(err, Error::InvalidAmount(_));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_ownership_invariant() {
    let mut chain = MemoryBlockchain::new();
    let (me, change) = (p2tr(1), p2wpkh(1));
    let txid = get_stuck_tx(
        &mut chain,
        &[(40_000, &me), (40_000, &change)],
        &[(30_000, &p2wpkh(9)), (49_000, &change)],
        RBF,
        300,
    );
    let accelerator = get_accelerator(&chain);
    let wallet = wallet(&[&me, &change]);
    let scripts = wallet.iter().map(|a| script_of(a)).collect::<Vec<_>>();

    let plans = vec![
        accelerator
            .build_rbf(&txid.to_string(), rate(12.0), &wallet, &signing_keys(1))
            .unwrap(),
        accelerator
            .build_cancel(&txid.to_string(), rate(12.0), &wallet, &change, &signing_keys(1))
            .unwrap(),
    ];

    for plan in &plans {
        // 12 sat/vB over 300 vB
        assert_eq!(plan.implied_fee(), 3_600);
        assert!(plan.implied_fee() > 1_000);
        assert_balanced(plan);
        assert_no_dust(plan, &[]);
        for input in &plan.psbt().inputs {
            let script = &input.witness_utxo.as_ref().unwrap().script_pubkey;
            assert!(scripts.contains(script));
        }
    }
    assert_eq!(plans[0].output_values(), vec![30_000, 46_400]);
    assert_eq!(plans[1].output_values(), vec![76_400]);
}

#[test]
fn test_classification_is_stable() {
    for address in &[p2tr(3), p2wpkh(3), p2sh_p2wpkh(3), p2pkh(3), "junk".to_string()] {
        assert_eq!(classify(address), classify(address));
    }
}
