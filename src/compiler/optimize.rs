//! Peephole rewrites over emitted ops.
//!
//! Rules are tried in order at each position, left to right, and the whole
//! list is rescanned until nothing changes. No rule matches a label, so code
//! is never moved across a jump target.

use super::builder::Op;
use crate::virtual_machine::assembler::push_data;
use crate::virtual_machine::isa::Instruction::{self, *};
use crate::virtual_machine::vm::numeric::as_bool;

/// Operators whose operands may be given in either order.
const COMMUTATIVE: &[Instruction] = &[
    Equal, Add, Mul, BoolAnd, BoolOr, NumEqual, And, Or, Xor, Min, Max,
];

pub fn optimize(mut ops: Vec<Op>) -> Vec<Op> {
    loop {
        let (next, changed) = pass(&ops);
        ops = next;
        if !changed {
            return ops;
        }
    }
}

fn pass(ops: &[Op]) -> (Vec<Op>, bool) {
    let mut out = Vec::with_capacity(ops.len());
    let mut changed = false;
    let mut i = 0;
    while i < ops.len() {
        match rewrite(&ops[i..]) {
            Some((consumed, replacement)) => {
                out.extend(replacement);
                i += consumed;
                changed = true;
            }
            None => {
                out.push(ops[i].clone());
                i += 1;
            }
        }
    }
    (out, changed)
}

fn cat(a: &[u8], b: &[u8]) -> Vec<u8> {
    [a, b].concat()
}

/// Rewrite at the head of `window`: ops consumed and their replacement.
fn rewrite(window: &[Op]) -> Option<(usize, Vec<Op>)> {
    use Op::{Code, Int};

    let rule = match window {
        [Code(Swap), Code(Swap), ..] => (2, vec![]),
        [Int(0), Code(Roll), ..] => (2, vec![]),
        [push, Code(Verify), ..] if push.push_value().is_some_and(|v| as_bool(&v)) => {
            (2, vec![])
        }
        [Int(5), Code(Roll), Int(5), Code(Roll), ..] => (4, vec![Code(TwoRot)]),
        [Int(2), Code(Roll), ..] => (2, vec![Code(Rot)]),
        [Int(1), Code(Roll), ..] => (2, vec![Code(Swap)]),
        [Int(0), Code(Pick), ..] => (2, vec![Code(Dup)]),
        [Int(1), Code(Pick), Int(1), Code(Pick), ..] => (4, vec![Code(TwoDup)]),
        [Int(1), Code(Pick), ..] => (2, vec![Code(Over)]),
        [Code(Swap), Code(op), ..] if COMMUTATIVE.contains(op) => (2, vec![Code(*op)]),
        [Code(Equal), Code(Verify), ..] => (2, vec![Code(EqualVerify)]),
        [Code(NumEqual), Code(Verify), ..] => (2, vec![Code(NumEqualVerify)]),
        [Code(Dup), Code(Swap), ..] => (2, vec![Code(Dup)]),
        [Code(Over), Code(Over), ..] => (2, vec![Code(TwoDup)]),
        [Code(Drop), Code(Drop), ..] => (2, vec![Code(TwoDrop)]),
        [a, b, Code(Cat), ..] => {
            let (a, b) = (a.push_value()?, b.push_value()?);
            (3, vec![Op::Data(cat(&a, &b))])
        }
        [a, b, Code(CatPushData), ..] => {
            let (a, b) = (a.push_value()?, b.push_value()?);
            (3, vec![Op::Data(cat(&a, &push_data(&b)))])
        }
        [a, Code(Cat), b, Code(Cat), ..] => {
            let (a, b) = (a.push_value()?, b.push_value()?);
            (4, vec![Op::Data(cat(&a, &b)), Code(Cat)])
        }
        [a, Code(Cat), b, Code(CatPushData), ..] => {
            let (a, b) = (a.push_value()?, b.push_value()?);
            (4, vec![Op::Data(cat(&a, &push_data(&b))), Code(Cat)])
        }
        _ => return None,
    };
    Some(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Op::{Code, Data, Int};

    #[test]
    fn roll_and_pick_shortcuts() {
        assert_eq!(
            optimize(vec![Int(2), Code(Roll), Int(1), Code(Roll), Int(0), Code(Pick)]),
            vec![Code(Rot), Code(Swap), Code(Dup)]
        );
        assert_eq!(
            optimize(vec![Int(5), Code(Roll), Int(5), Code(Roll), Int(5), Code(Roll)]),
            vec![Code(TwoRot), Int(5), Code(Roll)]
        );
        assert_eq!(
            optimize(vec![Int(1), Code(Pick), Int(1), Code(Pick)]),
            vec![Code(TwoDup)]
        );
    }

    #[test]
    fn swaps_cancel_and_commute() {
        assert_eq!(
            optimize(vec![Int(1), Code(Roll), Int(1), Code(Roll), Code(TxSigHash)]),
            vec![Code(TxSigHash)]
        );
        assert_eq!(
            optimize(vec![Code(Swap), Code(Add), Code(Swap), Code(Sub)]),
            vec![Code(Add), Code(Swap), Code(Sub)]
        );
    }

    #[test]
    fn verify_folding() {
        assert_eq!(
            optimize(vec![Code(Sha3), Code(Equal), Code(Verify)]),
            vec![Code(Sha3), Code(EqualVerify)]
        );
        assert_eq!(optimize(vec![Int(1), Code(Verify)]), vec![]);
        assert_eq!(
            optimize(vec![Int(0), Code(Verify)]),
            vec![Int(0), Code(Verify)]
        );
    }

    #[test]
    fn pushes_merge_through_cat() {
        assert_eq!(
            optimize(vec![Data(vec![]), Data(vec![0xaa]), Code(CatPushData)]),
            vec![Data(vec![0x01, 0xaa])]
        );
        assert_eq!(
            optimize(vec![
                Code(Dup),
                Data(vec![0x74]),
                Code(Cat),
                Data(vec![0x00, 0xc0]),
                Code(Cat)
            ]),
            vec![Code(Dup), Data(vec![0x74, 0x00, 0xc0]), Code(Cat)]
        );
    }

    #[test]
    fn labels_block_rewrites() {
        let ops = vec![
            Code(Swap),
            Op::Label("x".into()),
            Code(Swap),
            Code(Drop),
            Op::Label("y".into()),
            Code(Drop),
        ];
        assert_eq!(optimize(ops.clone()), ops);
    }
}
