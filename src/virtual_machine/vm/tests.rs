use super::*;
use crate::crypto::key_pair::tests::{schnorr_key, sm2_key};
use crate::types::hash::Hash;
use crate::virtual_machine::assembler::assemble;
use context::OutputQuery;
use numeric::u64_to_bytes;

const TEST_GAS: u64 = 100_000;

const U256_MAX: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

const SIG_HASH: Hash = Hash([7u8; 32]);

fn run_with(source: &str, ctx: &Context) -> Result<Vec<Vec<u8>>, VMError> {
    let program = assemble(source).expect("assembly failed");
    let mut vm = VM::new(program, ctx, TEST_GAS);
    vm.run()?;
    Ok(vm.data_stack().to_vec())
}

fn run_vm(source: &str) -> Vec<Vec<u8>> {
    run_with(source, &Context::default()).expect("vm run failed")
}

fn run_expect_err(source: &str) -> VMError {
    run_with(source, &Context::default()).expect_err("expected error")
}

fn run_and_get_int(source: &str) -> U256 {
    let stack = run_vm(source);
    bytes_to_u256(stack.last().expect("empty stack")).expect("not a number")
}

fn run_and_get_bool(source: &str) -> bool {
    as_bool(run_vm(source).last().expect("empty stack"))
}

fn n(v: u64) -> Vec<u8> {
    u64_to_bytes(v)
}

/// A stack holding a single `false`.
fn falsy() -> Vec<Vec<u8>> {
    vec![Vec::new()]
}

fn sig_context() -> Context {
    Context {
        tx_sig_hash: Some(Box::new(|| SIG_HASH)),
        ..Context::default()
    }
}

// ==================== Pushes ====================

#[test]
fn push_small_ints() {
    assert_eq!(run_vm("0 1 16"), vec![vec![], n(1), n(16)]);
}

#[test]
fn push_data_variants() {
    assert_eq!(run_vm("0xabcd"), vec![vec![0xab, 0xcd]]);
    let long = "0x".to_string() + &"11".repeat(300);
    assert_eq!(run_vm(&long), vec![vec![0x11; 300]]);
}

#[test]
fn push_text_literal() {
    assert_eq!(run_vm("'equity'"), vec![b"equity".to_vec()]);
}

// ==================== Stack ====================

#[test]
fn dup_drop_swap() {
    assert_eq!(run_vm("1 DUP"), vec![n(1), n(1)]);
    assert_eq!(run_vm("1 2 DROP"), vec![n(1)]);
    assert_eq!(run_vm("1 2 SWAP"), vec![n(2), n(1)]);
}

#[test]
fn over_nip_tuck() {
    assert_eq!(run_vm("1 2 OVER"), vec![n(1), n(2), n(1)]);
    assert_eq!(run_vm("1 2 NIP"), vec![n(2)]);
    assert_eq!(run_vm("1 2 TUCK"), vec![n(2), n(1), n(2)]);
}

#[test]
fn rot_pick_roll() {
    assert_eq!(run_vm("1 2 3 ROT"), vec![n(2), n(3), n(1)]);
    assert_eq!(run_vm("1 2 3 2 PICK"), vec![n(1), n(2), n(3), n(1)]);
    assert_eq!(run_vm("1 2 3 2 ROLL"), vec![n(2), n(3), n(1)]);
    assert_eq!(run_vm("1 2 3 0 ROLL"), vec![n(1), n(2), n(3)]);
}

#[test]
fn pair_operations() {
    assert_eq!(run_vm("1 2 2DUP"), vec![n(1), n(2), n(1), n(2)]);
    assert_eq!(run_vm("1 2 3 3DUP").len(), 6);
    assert_eq!(run_vm("1 2 3 4 2OVER"), vec![n(1), n(2), n(3), n(4), n(1), n(2)]);
    assert_eq!(run_vm("1 2 3 4 2SWAP"), vec![n(3), n(4), n(1), n(2)]);
    assert_eq!(
        run_vm("1 2 3 4 5 6 2ROT"),
        vec![n(3), n(4), n(5), n(6), n(1), n(2)]
    );
    assert_eq!(run_vm("1 2 3 2DROP"), vec![n(1)]);
}

#[test]
fn ifdup_and_depth() {
    assert_eq!(run_vm("1 IFDUP"), vec![n(1), n(1)]);
    assert_eq!(run_vm("0 IFDUP"), falsy());
    assert_eq!(run_vm("7 7 DEPTH"), vec![n(7), n(7), n(2)]);
}

#[test]
fn alt_stack_moves() {
    assert_eq!(run_vm("1 TOALTSTACK 2 FROMALTSTACK"), vec![n(2), n(1)]);
}

#[test]
fn stack_underflows() {
    assert!(matches!(run_expect_err("DROP"), VMError::DataStackUnderflow));
    assert!(matches!(run_expect_err("1 SWAP"), VMError::DataStackUnderflow));
    assert!(matches!(run_expect_err("1 5 PICK"), VMError::DataStackUnderflow));
    assert!(matches!(
        run_expect_err("FROMALTSTACK"),
        VMError::AltStackUnderflow
    ));
}

#[test]
fn max_depth_pick_and_roll_underflow() {
    assert!(matches!(
        run_expect_err("1 0xffffffffffffffff PICK"),
        VMError::DataStackUnderflow
    ));
    assert!(matches!(
        run_expect_err("1 0xffffffffffffffff ROLL"),
        VMError::DataStackUnderflow
    ));
}

// ==================== Splice ====================

#[test]
fn cat_and_catpushdata() {
    assert_eq!(run_vm("'ab' 'cd' CAT"), vec![b"abcd".to_vec()]);
    assert_eq!(run_vm("'ab' 'cd' CATPUSHDATA"), vec![b"ab\x02cd".to_vec()]);
    assert_eq!(run_vm("'ab' 0 CATPUSHDATA"), vec![b"ab\x00".to_vec()]);
}

#[test]
fn substr_left_right() {
    assert_eq!(run_vm("'hello' 1 3 SUBSTR"), vec![b"ell".to_vec()]);
    assert_eq!(run_vm("'hello' 2 LEFT"), vec![b"he".to_vec()]);
    assert_eq!(run_vm("'hello' 2 RIGHT"), vec![b"lo".to_vec()]);
    assert!(matches!(
        run_expect_err("'hello' 4 2 SUBSTR"),
        VMError::BadValue { .. }
    ));
    assert!(matches!(
        run_expect_err("'hi' 3 LEFT"),
        VMError::BadValue { .. }
    ));
}

#[test]
fn size_keeps_operand() {
    assert_eq!(run_vm("'abc' SIZE"), vec![b"abc".to_vec(), n(3)]);
}

// ==================== Bitwise ====================

#[test]
fn bitwise_lengths() {
    assert_eq!(run_vm("0x0f0f 0xff AND"), vec![vec![0x0f]]);
    assert_eq!(run_vm("0x0f0f 0xff OR"), vec![vec![0xff, 0x0f]]);
    assert_eq!(run_vm("0x0f0f 0xff XOR"), vec![vec![0xf0, 0x0f]]);
    assert_eq!(run_vm("0x00ff INVERT"), vec![vec![0xff, 0x00]]);
}

#[test]
fn equal_and_equalverify() {
    assert!(run_and_get_bool("'a' 'a' EQUAL"));
    assert!(!run_and_get_bool("'a' 'b' EQUAL"));
    assert!(run_vm("'a' 'a' EQUALVERIFY").is_empty());
    assert!(matches!(
        run_expect_err("'a' 'b' EQUALVERIFY"),
        VMError::VerifyFailed
    ));
}

// ==================== Arithmetic ====================

#[test]
fn basic_arithmetic() {
    assert_eq!(run_and_get_int("2 3 ADD"), U256::from(5));
    assert_eq!(run_and_get_int("5 3 SUB"), U256::from(2));
    assert_eq!(run_and_get_int("6 7 MUL"), U256::from(42));
    assert_eq!(run_and_get_int("7 2 DIV"), U256::from(3));
    assert_eq!(run_and_get_int("7 2 MOD"), U256::from(1));
    assert_eq!(run_and_get_int("9 1ADD"), U256::from(10));
    assert_eq!(run_and_get_int("9 1SUB"), U256::from(8));
    assert_eq!(run_and_get_int("9 2MUL"), U256::from(18));
    assert_eq!(run_and_get_int("9 2DIV"), U256::from(4));
    assert_eq!(run_and_get_int("9 ABS"), U256::from(9));
    assert_eq!(run_and_get_int("0 NEGATE"), U256::zero());
}

#[test]
fn shifts() {
    assert_eq!(run_and_get_int("1 8 LSHIFT"), U256::from(256));
    assert_eq!(run_and_get_int("256 8 RSHIFT"), U256::one());
    assert_eq!(run_and_get_int("1 255 LSHIFT"), U256::one() << 255);
    assert_eq!(run_and_get_int("8 300 RSHIFT"), U256::zero());
    assert_eq!(run_and_get_int("0 300 LSHIFT"), U256::zero());
}

#[test]
fn comparisons() {
    assert!(run_and_get_bool("2 3 LESSTHAN"));
    assert!(!run_and_get_bool("3 3 LESSTHAN"));
    assert!(run_and_get_bool("3 3 LESSTHANOREQUAL"));
    assert!(run_and_get_bool("4 3 GREATERTHAN"));
    assert!(run_and_get_bool("3 3 GREATERTHANOREQUAL"));
    assert!(run_and_get_bool("3 3 NUMEQUAL"));
    assert!(run_and_get_bool("3 4 NUMNOTEQUAL"));
    assert!(run_and_get_bool("3 1 5 WITHIN"));
    assert!(!run_and_get_bool("5 1 5 WITHIN"));
    assert_eq!(run_and_get_int("3 9 MIN"), U256::from(3));
    assert_eq!(run_and_get_int("3 9 MAX"), U256::from(9));
}

#[test]
fn boolean_logic() {
    assert!(run_and_get_bool("1 1 BOOLAND"));
    assert!(!run_and_get_bool("1 0 BOOLAND"));
    assert!(run_and_get_bool("0 1 BOOLOR"));
    assert!(run_and_get_bool("0 NOT"));
    assert!(!run_and_get_bool("5 NOT"));
    assert!(run_and_get_bool("5 0NOTEQUAL"));
}

#[test]
fn numequalverify() {
    assert!(run_vm("4 4 NUMEQUALVERIFY").is_empty());
    assert!(matches!(
        run_expect_err("4 5 NUMEQUALVERIFY"),
        VMError::VerifyFailed
    ));
}

#[test]
fn max_plus_one_is_range_error() {
    let ctx = Context::default();
    let program = assemble(&format!("{U256_MAX} 1 ADD")).unwrap();
    let mut vm = VM::new(program, &ctx, TEST_GAS);
    assert!(matches!(vm.run(), Err(VMError::RangeError { op: "ADD" })));
    assert!(vm.is_faulted());
    assert!(matches!(vm.run(), Err(VMError::Faulted)));
    assert!(matches!(vm.step(), Err(VMError::Faulted)));
}

#[test]
fn overflow_never_wraps() {
    let cases = [
        format!("{U256_MAX} 1ADD"),
        format!("{U256_MAX} 2MUL"),
        format!("{U256_MAX} 2 MUL"),
        "0 1SUB".to_string(),
        "3 5 SUB".to_string(),
        "5 NEGATE".to_string(),
        "2 255 LSHIFT".to_string(),
        "1 256 LSHIFT".to_string(),
    ];
    for source in cases {
        assert!(
            matches!(run_expect_err(&source), VMError::RangeError { .. }),
            "{source} did not fail with a range error"
        );
    }
}

#[test]
fn division_by_zero() {
    assert!(matches!(run_expect_err("7 0 DIV"), VMError::DivisionByZero));
    assert!(matches!(run_expect_err("7 0 MOD"), VMError::ModuloByZero));
}

#[test]
fn oversized_number_is_bad_value() {
    let source = format!("0x{} 1 ADD", "01".repeat(33));
    assert!(matches!(run_expect_err(&source), VMError::BadValue { .. }));
}

// ==================== Control flow ====================

#[test]
fn jumps() {
    assert_eq!(run_vm("JUMP:$end FAIL $end 1"), vec![n(1)]);
    assert_eq!(run_vm("0 JUMPIF:$skip 7 $skip"), vec![n(7)]);
    assert_eq!(run_vm("1 JUMPIF:$skip 7 $skip"), Vec::<Vec<u8>>::new());
}

#[test]
fn jump_out_of_program() {
    assert!(matches!(
        run_expect_err("JUMP:99"),
        VMError::InvalidJumpTarget { target: 99 }
    ));
}

#[test]
fn verify_and_fail() {
    assert!(run_vm("1 VERIFY").is_empty());
    assert!(matches!(run_expect_err("0 VERIFY"), VMError::VerifyFailed));
    assert!(matches!(run_expect_err("FAIL"), VMError::Fail));
}

#[test]
fn expansion_opcodes() {
    assert_eq!(run_vm("NOPx50 1"), vec![n(1)]);
    let ctx = Context {
        tx_version: Some(1),
        ..Context::default()
    };
    assert!(matches!(
        run_with("NOPx50 1", &ctx),
        Err(VMError::DisallowedOpcode { ref mnemonic }) if mnemonic == "NOPx50"
    ));
}

#[test]
fn truncated_program() {
    let ctx = Context::default();
    let mut vm = VM::new(vec![0x4c], &ctx, TEST_GAS);
    assert!(matches!(
        vm.run(),
        Err(VMError::UnexpectedEndOfBytecode { .. })
    ));
}

// ==================== Predicates ====================

#[test]
fn check_predicate_success() {
    // child program: ADD 3 NUMEQUAL
    assert_eq!(run_vm("1 2 2 0x93539c 0 CHECKPREDICATE"), vec![n(1)]);
}

#[test]
fn check_predicate_forwards_only_n_items() {
    assert_eq!(
        run_vm("9 1 2 2 0x93539c 0 CHECKPREDICATE"),
        vec![n(9), n(1)]
    );
}

#[test]
fn check_predicate_failure_is_false() {
    assert_eq!(run_vm("0 0x6a 0 CHECKPREDICATE"), falsy());
    assert_eq!(run_vm("0 0x00 0 CHECKPREDICATE"), falsy());
}

#[test]
fn check_predicate_child_budget() {
    // child needs more than the 5 units it is given
    assert_eq!(run_vm("0 0x515151 5 CHECKPREDICATE"), falsy());
    assert!(matches!(
        run_expect_err(&format!("0 0x51 {} CHECKPREDICATE", TEST_GAS * 2)),
        VMError::RunLimitExceeded { .. }
    ));
}

#[test]
fn check_predicate_underflow() {
    assert!(matches!(
        run_expect_err("3 0x51 0 CHECKPREDICATE"),
        VMError::DataStackUnderflow
    ));
}

#[test]
fn check_predicate_nesting_is_bounded() {
    // DUP 1 SWAP 0 CHECKPREDICATE, which calls itself with itself
    let quine = "0x76517c00c0";
    let source = format!("{quine} DUP 1 SWAP 0 CHECKPREDICATE");
    let stack = run_vm(&source);
    assert_eq!(stack, vec![vec![0x76, 0x51, 0x7c, 0x00, 0xc0], Vec::new()]);
}

#[test]
fn check_predicate_charges_child_gas() {
    let ctx = Context::default();
    let program = assemble("0 0x515151 0 CHECKPREDICATE").unwrap();
    let mut vm = VM::new(program, &ctx, TEST_GAS);
    vm.run().unwrap();
    // three pushes of "1", each 1 base + 9 stack data
    assert_eq!(vm.gas_profile().get(GasCategory::Predicate), 30);
}

// ==================== Gas ====================

#[test]
fn push_and_drop_gas() {
    let ctx = Context::default();
    let program = assemble("1 DROP").unwrap();
    let mut vm = VM::new(program, &ctx, TEST_GAS);
    vm.run().unwrap();
    assert_eq!(vm.gas_used(), 11);
    assert_eq!(vm.gas_profile().total(), vm.gas_used());
}

#[test]
fn hash_gas_has_floor() {
    let ctx = Context::default();
    let program = assemble("0 SHA3").unwrap();
    let mut vm = VM::new(program, &ctx, TEST_GAS);
    vm.run().unwrap();
    assert_eq!(vm.gas_profile().get(GasCategory::Hashing), 64);
    assert_eq!(vm.gas_used(), 9 + 1 + 64 + 32);
}

#[test]
fn gas_is_monotone() {
    let ctx = Context::default();
    let program = assemble("'abcdef' DUP CAT SIZE 2DROP 1 2 ADD DROP 0 SHA256 DROP 5").unwrap();
    let mut vm = VM::new(program, &ctx, TEST_GAS);
    let mut last_used = 0;
    while !vm.is_done() {
        vm.step().unwrap();
        assert!(vm.gas_used() >= last_used);
        assert_eq!(vm.gas_used() + vm.gas_left(), TEST_GAS);
        last_used = vm.gas_used();
    }
    assert_eq!(vm.gas_profile().total(), vm.gas_used());
}

#[test]
fn run_limit_exceeded() {
    let ctx = Context::default();
    let program = assemble("1 1").unwrap();
    let mut vm = VM::new(program, &ctx, 5);
    assert!(matches!(
        vm.run(),
        Err(VMError::RunLimitExceeded { needed: 9, available: 4 })
    ));
    assert!(vm.is_faulted());
}

// ==================== Signatures ====================

#[test]
fn checksig_schnorr() {
    let key = schnorr_key(11);
    let sig = key.sign(SIG_HASH.as_slice());
    let pubkey = key.public_key().to_bytes();
    let source = format!(
        "0x{} TXSIGHASH 0x{} CHECKSIG",
        hex::encode(sig),
        hex::encode(pubkey)
    );
    let stack = run_with(&source, &sig_context()).unwrap();
    assert_eq!(stack, vec![n(1)]);

    let other = schnorr_key(12).public_key().to_bytes();
    let source = format!(
        "0x{} TXSIGHASH 0x{} CHECKSIG",
        hex::encode(sig),
        hex::encode(other)
    );
    assert_eq!(run_with(&source, &sig_context()).unwrap(), falsy());
}

#[test]
fn checksig_bad_pubkey_length_is_false() {
    let source = format!("0x{} TXSIGHASH 0x0102 CHECKSIG", "00".repeat(64));
    assert_eq!(run_with(&source, &sig_context()).unwrap(), falsy());
}

#[test]
fn checksig_short_signature_is_false() {
    let pubkey = schnorr_key(11).public_key().to_bytes();
    let source = format!("0x0102030405 TXSIGHASH 0x{} CHECKSIG", hex::encode(pubkey));
    assert_eq!(run_with(&source, &sig_context()).unwrap(), falsy());

    let pubkey = sm2_key(21).public_key().to_bytes();
    let source = format!("0x01 TXSIGHASH 0x{} CHECKSIGSM2", hex::encode(&pubkey));
    assert_eq!(run_with(&source, &sig_context()).unwrap(), falsy());
}

#[test]
fn checksig_bad_message_length_errors() {
    let source = format!("0x{} 0x0102 0x{} CHECKSIG", "00".repeat(64), "00".repeat(32));
    assert!(matches!(
        run_with(&source, &sig_context()),
        Err(VMError::BadValue { .. })
    ));
}

#[test]
fn checksig_sm2() {
    let key = sm2_key(21);
    let sig = key.sign(SIG_HASH.as_slice());
    let pubkey = key.public_key().to_bytes();
    let source = format!(
        "0x{} TXSIGHASH 0x{} CHECKSIGSM2",
        hex::encode(sig),
        hex::encode(&pubkey)
    );
    assert_eq!(run_with(&source, &sig_context()).unwrap(), vec![n(1)]);
}

fn multisig_source(sigs: &[[u8; 64]], pubkeys: &[[u8; 32]]) -> String {
    let mut parts = Vec::new();
    for sig in sigs.iter().rev() {
        parts.push(format!("0x{}", hex::encode(sig)));
    }
    parts.push("TXSIGHASH".to_string());
    for key in pubkeys.iter().rev() {
        parts.push(format!("0x{}", hex::encode(key)));
    }
    parts.push(sigs.len().to_string());
    parts.push(pubkeys.len().to_string());
    parts.push("CHECKMULTISIG".to_string());
    parts.join(" ")
}

#[test]
fn checkmultisig_in_order() {
    let keys = [schnorr_key(1), schnorr_key(2), schnorr_key(3)];
    let pubkeys: Vec<[u8; 32]> = keys.iter().map(|k| k.public_key().to_bytes()).collect();
    let msg = SIG_HASH.as_slice();

    let good = multisig_source(&[keys[0].sign(msg), keys[2].sign(msg)], &pubkeys);
    assert_eq!(run_with(&good, &sig_context()).unwrap(), vec![n(1)]);

    let out_of_order = multisig_source(&[keys[2].sign(msg), keys[0].sign(msg)], &pubkeys);
    assert_eq!(run_with(&out_of_order, &sig_context()).unwrap(), falsy());
}

#[test]
fn checkmultisig_short_signature_is_false() {
    let pubkey = schnorr_key(1).public_key().to_bytes();
    let source = format!("0x01 TXSIGHASH 0x{} 1 1 CHECKMULTISIG", hex::encode(pubkey));
    assert_eq!(run_with(&source, &sig_context()).unwrap(), falsy());
}

#[test]
fn checkmultisig_rejects_bad_counts() {
    let source = format!("TXSIGHASH 0x{} 0 1 CHECKMULTISIG", "00".repeat(32));
    assert!(matches!(
        run_with(&source, &sig_context()),
        Err(VMError::BadValue { .. })
    ));
}

#[test]
fn checkmultisig_charges_per_key() {
    let keys = [schnorr_key(1), schnorr_key(2)];
    let pubkeys: Vec<[u8; 32]> = keys.iter().map(|k| k.public_key().to_bytes()).collect();
    let source = multisig_source(&[keys[1].sign(SIG_HASH.as_slice())], &pubkeys);
    let ctx = sig_context();
    let mut vm = VM::new(assemble(&source).unwrap(), &ctx, TEST_GAS);
    vm.run().unwrap();
    assert_eq!(vm.gas_profile().get(GasCategory::Signature), 2048);
}

// ==================== Introspection ====================

#[test]
fn introspection_fields() {
    let ctx = Context {
        code: vec![0x51],
        entry_id: Hash([2u8; 32]),
        block_height: Some(500),
        asset_id: Some(vec![3u8; 32]),
        amount: Some(1000),
        dest_pos: Some(4),
        spent_output_id: Some(Hash([5u8; 32])),
        ..Context::default()
    };
    let stack = run_with(
        "AMOUNT ASSET PROGRAM INDEX ENTRYID OUTPUTID BLOCKHEIGHT",
        &ctx,
    )
    .unwrap();
    assert_eq!(
        stack,
        vec![
            n(1000),
            vec![3u8; 32],
            vec![0x51],
            n(4),
            vec![2u8; 32],
            vec![5u8; 32],
            n(500),
        ]
    );
}

#[test]
fn missing_context_fields() {
    for (source, field) in [
        ("AMOUNT", "amount"),
        ("ASSET", "asset_id"),
        ("INDEX", "dest_pos"),
        ("OUTPUTID", "spent_output_id"),
        ("BLOCKHEIGHT", "block_height"),
        ("TXSIGHASH", "tx_sig_hash"),
    ] {
        assert!(
            matches!(run_expect_err(source), VMError::ContextMissing { field: f } if f == field),
            "{source}"
        );
    }
}

#[test]
fn check_output_passes_query() {
    let ctx = Context {
        tx_version: Some(1),
        check_output: Some(Box::new(|q: OutputQuery<'_>| {
            Ok(q.index == 0
                && q.amount == 5
                && q.asset_id == [1u8; 32]
                && q.vm_version == 1
                && q.code == [0x51]
                && q.expansion)
        })),
        ..Context::default()
    };
    let source = format!("0 5 0x{} 1 0x51 CHECKOUTPUT", "01".repeat(32));
    assert_eq!(run_with(&source, &ctx).unwrap(), vec![n(1)]);
    let source = format!("1 5 0x{} 1 0x51 CHECKOUTPUT", "01".repeat(32));
    assert_eq!(run_with(&source, &ctx).unwrap(), falsy());
}

#[test]
fn check_output_callback_error_propagates() {
    let ctx = Context {
        check_output: Some(Box::new(|_: OutputQuery<'_>| {
            Err(VMError::Callback {
                reason: "no such output".to_string(),
            })
        })),
        ..Context::default()
    };
    assert!(matches!(
        run_with("0 0 0 1 0 CHECKOUTPUT", &ctx),
        Err(VMError::Callback { .. })
    ));
}

// ==================== Verify ====================

#[test]
fn verify_trivial_program() {
    let ctx = Context::new(vec![0x51]);
    let left = verify(&ctx, TEST_GAS).unwrap();
    assert_eq!(left, TEST_GAS - 10);
}

#[test]
fn verify_pushes_state_then_arguments() {
    // state, arg1, arg2 -> arg2 - arg1 == state
    let mut ctx = Context::new(assemble("SWAP SUB NUMEQUAL").unwrap());
    ctx.state_data = vec![n(2)];
    ctx.arguments = vec![n(3), n(5)];
    assert!(verify(&ctx, TEST_GAS).is_ok());
}

#[test]
fn verify_false_result_is_wrapped() {
    let ctx = Context {
        arguments: vec![vec![0xaa]],
        ..Context::new(vec![0x00])
    };
    let err = verify(&ctx, TEST_GAS).unwrap_err();
    assert!(matches!(err.root(), VMError::FalseResult));
    let msg = err.to_string();
    assert!(msg.contains("program: [0]"), "{msg}");
    assert!(msg.contains("args: [aa]"), "{msg}");
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn verify_empty_stack_is_false() {
    let ctx = Context::new(vec![]);
    let err = verify(&ctx, TEST_GAS).unwrap_err();
    assert!(matches!(err.root(), VMError::FalseResult));
}

#[test]
fn verify_runtime_error_is_wrapped() {
    let ctx = Context::new(assemble("FAIL").unwrap());
    let err = verify(&ctx, TEST_GAS).unwrap_err();
    assert!(matches!(err, VMError::Execution { .. }));
    assert!(matches!(err.root(), VMError::Fail));
}

#[test]
fn verify_rejects_unknown_vm_version() {
    let ctx = Context {
        vm_version: 2,
        ..Context::new(vec![0x51])
    };
    assert!(matches!(
        verify(&ctx, TEST_GAS),
        Err(VMError::UnsupportedVM { version: 2 })
    ));
}

#[test]
fn verify_with_gas_state() {
    let mut gas = gas::GasState::default();
    gas.set_gas(0, 100).unwrap();
    let ctx = Context::new(vec![0x51]);
    let left = verify(&ctx, gas.run_limit()).unwrap();
    gas.update_usage(left).unwrap();
    gas.set_gas_valid().unwrap();
    assert_eq!(gas.gas_used, 10 + 100);
}
