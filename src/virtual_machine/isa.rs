//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the stack VM's instruction set. The [`for_each_instruction!`](crate::for_each_instruction)
//! macro holds the canonical instruction definitions and invokes a callback macro
//! for code generation. This enables multiple modules to generate instruction-related
//! code without duplicating definitions.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<u8>` and [`Instruction::from_byte`] for decoding opcodes
//! - Mnemonics, base gas costs and fixed operand sizes
//!
//! See [`assembler`](super::assembler) for the text assembler and disassembler.
//!
//! # Bytecode Format
//!
//! Instructions are one opcode byte, optionally followed by inline operands:
//! - `0x01..=0x4b` (`DATA_1`..`DATA_75`): the opcode value is the number of
//!   inline data bytes that follow
//! - `PUSHDATA1/2/4`: a 1, 2 or 4 byte little-endian length, then the data
//! - `JUMP`, `JUMPIF`: a 4 byte little-endian absolute target offset
//!
//! Every byte value that is neither a data push nor listed in the table is an
//! expansion opcode (`NOPx<hh>`), reserved for future use.

use crate::virtual_machine::errors::VMError;

/// First opcode of the fixed-length data pushes (`DATA_1`).
pub const OP_DATA_1: u8 = 0x01;

/// Last opcode of the fixed-length data pushes (`DATA_75`).
pub const OP_DATA_75: u8 = 0x4b;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry reads `Name = opcode, "MNEMONIC" => [operands], base_gas`.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Pushes
            // =========================
            /// 0 ; pushes the empty string (numeric zero, boolean false)
            False = 0x00, "0" => [], 1,
            /// PUSHDATA1 len(1) data ; pushes up to 255 bytes
            PushData1 = 0x4c, "PUSHDATA1" => [len: Len1], 1,
            /// PUSHDATA2 len(2) data ; pushes up to 65535 bytes
            PushData2 = 0x4d, "PUSHDATA2" => [len: Len2], 1,
            /// PUSHDATA4 len(4) data ; pushes up to 2^32-1 bytes
            PushData4 = 0x4e, "PUSHDATA4" => [len: Len4], 1,
            /// 1 ; pushes the integer 1 (boolean true)
            True = 0x51, "1" => [], 1,
            Num2 = 0x52, "2" => [], 1,
            Num3 = 0x53, "3" => [], 1,
            Num4 = 0x54, "4" => [], 1,
            Num5 = 0x55, "5" => [], 1,
            Num6 = 0x56, "6" => [], 1,
            Num7 = 0x57, "7" => [], 1,
            Num8 = 0x58, "8" => [], 1,
            Num9 = 0x59, "9" => [], 1,
            Num10 = 0x5a, "10" => [], 1,
            Num11 = 0x5b, "11" => [], 1,
            Num12 = 0x5c, "12" => [], 1,
            Num13 = 0x5d, "13" => [], 1,
            Num14 = 0x5e, "14" => [], 1,
            Num15 = 0x5f, "15" => [], 1,
            Num16 = 0x60, "16" => [], 1,
            // =========================
            // Control flow
            // =========================
            /// NOP ; does nothing
            Nop = 0x61, "NOP" => [], 1,
            /// JUMP target ; pc = target
            Jump = 0x63, "JUMP" => [target: Target], 1,
            /// JUMPIF target ; pops a boolean, pc = target when true
            JumpIf = 0x64, "JUMPIF" => [target: Target], 1,
            /// VERIFY ; pops a boolean, fails when false
            Verify = 0x69, "VERIFY" => [], 1,
            /// FAIL ; fails unconditionally
            Fail = 0x6a, "FAIL" => [], 1,
            /// CHECKPREDICATE ; pops limit, predicate, n and runs the predicate in a child VM
            CheckPredicate = 0xc0, "CHECKPREDICATE" => [], 64,
            // =========================
            // Stack
            // =========================
            ToAltStack = 0x6b, "TOALTSTACK" => [], 2,
            FromAltStack = 0x6c, "FROMALTSTACK" => [], 2,
            TwoDrop = 0x6d, "2DROP" => [], 2,
            TwoDup = 0x6e, "2DUP" => [], 2,
            ThreeDup = 0x6f, "3DUP" => [], 3,
            TwoOver = 0x70, "2OVER" => [], 2,
            TwoRot = 0x71, "2ROT" => [], 2,
            TwoSwap = 0x72, "2SWAP" => [], 2,
            IfDup = 0x73, "IFDUP" => [], 1,
            Depth = 0x74, "DEPTH" => [], 1,
            Drop = 0x75, "DROP" => [], 1,
            Dup = 0x76, "DUP" => [], 1,
            Nip = 0x77, "NIP" => [], 1,
            Over = 0x78, "OVER" => [], 1,
            Pick = 0x79, "PICK" => [], 2,
            Roll = 0x7a, "ROLL" => [], 2,
            Rot = 0x7b, "ROT" => [], 2,
            Swap = 0x7c, "SWAP" => [], 1,
            Tuck = 0x7d, "TUCK" => [], 1,
            // =========================
            // Splice
            // =========================
            /// CAT ; a b -> a||b
            Cat = 0x7e, "CAT" => [], 4,
            /// SUBSTR ; str offset size -> str[offset..offset+size]
            Substr = 0x7f, "SUBSTR" => [], 4,
            /// LEFT ; str size -> str[..size]
            Left = 0x80, "LEFT" => [], 4,
            /// RIGHT ; str size -> str[len-size..]
            Right = 0x81, "RIGHT" => [], 4,
            /// SIZE ; str -> str len(str)
            Size = 0x82, "SIZE" => [], 1,
            /// CATPUSHDATA ; a b -> a||push(b)
            CatPushData = 0x89, "CATPUSHDATA" => [], 4,
            // =========================
            // Bitwise
            // =========================
            Invert = 0x83, "INVERT" => [], 1,
            And = 0x84, "AND" => [], 1,
            Or = 0x85, "OR" => [], 1,
            Xor = 0x86, "XOR" => [], 1,
            Equal = 0x87, "EQUAL" => [], 1,
            EqualVerify = 0x88, "EQUALVERIFY" => [], 1,
            // =========================
            // Numeric (unsigned 256-bit)
            // =========================
            OneAdd = 0x8b, "1ADD" => [], 2,
            OneSub = 0x8c, "1SUB" => [], 2,
            TwoMul = 0x8d, "2MUL" => [], 2,
            TwoDiv = 0x8e, "2DIV" => [], 2,
            Negate = 0x8f, "NEGATE" => [], 2,
            Abs = 0x90, "ABS" => [], 2,
            Not = 0x91, "NOT" => [], 2,
            ZeroNotEqual = 0x92, "0NOTEQUAL" => [], 2,
            Add = 0x93, "ADD" => [], 2,
            Sub = 0x94, "SUB" => [], 2,
            Mul = 0x95, "MUL" => [], 8,
            Div = 0x96, "DIV" => [], 8,
            Mod = 0x97, "MOD" => [], 8,
            LShift = 0x98, "LSHIFT" => [], 8,
            RShift = 0x99, "RSHIFT" => [], 8,
            BoolAnd = 0x9a, "BOOLAND" => [], 2,
            BoolOr = 0x9b, "BOOLOR" => [], 2,
            NumEqual = 0x9c, "NUMEQUAL" => [], 2,
            NumEqualVerify = 0x9d, "NUMEQUALVERIFY" => [], 2,
            NumNotEqual = 0x9e, "NUMNOTEQUAL" => [], 2,
            LessThan = 0x9f, "LESSTHAN" => [], 2,
            GreaterThan = 0xa0, "GREATERTHAN" => [], 2,
            LessThanOrEqual = 0xa1, "LESSTHANOREQUAL" => [], 2,
            GreaterThanOrEqual = 0xa2, "GREATERTHANOREQUAL" => [], 2,
            Min = 0xa3, "MIN" => [], 2,
            Max = 0xa4, "MAX" => [], 2,
            /// WITHIN ; x min max -> min <= x < max
            Within = 0xa5, "WITHIN" => [], 4,
            // =========================
            // Crypto
            // =========================
            Ripemd160 = 0xa6, "RIPEMD160" => [], 1,
            Sha256 = 0xa8, "SHA256" => [], 1,
            Sm3 = 0xa9, "SM3" => [], 1,
            Sha3 = 0xaa, "SHA3" => [], 1,
            Hash160 = 0xab, "HASH160" => [], 1,
            /// CHECKSIG ; sig msg pubkey -> bool (Schnorr)
            CheckSig = 0xac, "CHECKSIG" => [], 1024,
            /// CHECKMULTISIG ; sigs.. msg pubkeys.. nsigs npubkeys -> bool (Schnorr)
            CheckMultiSig = 0xad, "CHECKMULTISIG" => [], 1,
            /// TXSIGHASH ; pushes the transaction signature hash
            TxSigHash = 0xae, "TXSIGHASH" => [], 256,
            /// CHECKSIGSM2 ; sig msg pubkey -> bool (SM2)
            CheckSigSm2 = 0xaf, "CHECKSIGSM2" => [], 1024,
            /// CHECKMULTISIGSM2 ; same layout as CHECKMULTISIG (SM2)
            CheckMultiSigSm2 = 0xb0, "CHECKMULTISIGSM2" => [], 1,
            // =========================
            // Introspection
            // =========================
            /// CHECKOUTPUT ; index amount asset version code -> bool
            CheckOutput = 0xc1, "CHECKOUTPUT" => [], 16,
            Asset = 0xc2, "ASSET" => [], 1,
            Amount = 0xc3, "AMOUNT" => [], 1,
            Program = 0xc4, "PROGRAM" => [], 1,
            Index = 0xc9, "INDEX" => [], 1,
            EntryId = 0xca, "ENTRYID" => [], 1,
            OutputId = 0xcb, "OUTPUTID" => [], 1,
            BlockHeight = 0xcd, "BLOCKHEIGHT" => [], 1,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $gas:expr
        ),* $(,)?
    ) => {
        // =========================
        // VM instruction enum
        // =========================
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                Instruction::from_byte(value).ok_or(VMError::InvalidInstruction {
                    opcode: value,
                    offset: 0,
                })
            }
        }

        impl Instruction {
            /// Decodes a table opcode. Data pushes and expansion opcodes return `None`.
            pub const fn from_byte(value: u8) -> Option<Instruction> {
                match value {
                    $( $opcode => Some(Instruction::$name), )*
                    _ => None,
                }
            }

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Returns the base gas cost for this instruction.
            pub const fn base_gas(&self) -> u64 {
                match self {
                    $( Instruction::$name => $gas, )*
                }
            }

            /// Returns the number of fixed operand bytes following the opcode.
            pub const fn operand_len(&self) -> usize {
                match self {
                    $( Instruction::$name => 0usize $( + define_instructions!(@size $kind) )*, )*
                }
            }

            /// Every instruction in table order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name, )* ];
        }
    };

    // ---------- operand sizes ----------
    (@size Target) => { 4usize };
    (@size Len1)   => { 1usize };
    (@size Len2)   => { 2usize };
    (@size Len4)   => { 4usize };
}

for_each_instruction!(define_instructions);

impl Instruction {
    /// Returns the opcode byte.
    pub const fn opcode(&self) -> u8 {
        *self as u8
    }

    /// Returns the small-integer opcode for `n` in `0..=16`.
    pub const fn small_int(n: u8) -> Option<Instruction> {
        match n {
            0 => Some(Instruction::False),
            1..=16 => Instruction::from_byte(0x50 + n),
            _ => None,
        }
    }

    /// Returns the value pushed by a small-integer opcode.
    pub const fn small_int_value(&self) -> Option<u8> {
        match self {
            Instruction::False => Some(0),
            _ => {
                let op = self.opcode();
                if op >= 0x51 && op <= 0x60 {
                    Some(op - 0x50)
                } else {
                    None
                }
            }
        }
    }

    /// Whether the instruction carries inline push data.
    pub const fn is_push_data(&self) -> bool {
        matches!(
            self,
            Instruction::PushData1 | Instruction::PushData2 | Instruction::PushData4
        )
    }
}

/// Whether `op` is a fixed-length data push (`DATA_1`..`DATA_75`).
pub const fn is_data_push(op: u8) -> bool {
    op >= OP_DATA_1 && op <= OP_DATA_75
}

/// Whether `op` is reserved for future expansion.
///
/// Derived from the instruction table: anything that is neither a data push nor
/// a table opcode is an expansion opcode.
pub const fn is_expansion(op: u8) -> bool {
    !is_data_push(op) && Instruction::from_byte(op).is_none()
}

/// Returns the text form of an expansion opcode.
pub fn expansion_mnemonic(op: u8) -> String {
    format!("NOPx{op:02x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_try_from_expansion() {
        assert!(matches!(
            Instruction::try_from(0xFF),
            Err(VMError::InvalidInstruction { opcode: 0xFF, .. })
        ));
        assert!(is_expansion(0xFF));
        assert!(is_expansion(0x50));
        assert!(!is_expansion(0x4b));
        assert!(!is_expansion(0xac));
    }

    #[test]
    fn classic_opcode_values() {
        assert_eq!(Instruction::True.opcode(), 0x51);
        assert_eq!(Instruction::TxSigHash.opcode(), 0xae);
        assert_eq!(Instruction::CheckOutput.opcode(), 0xc1);
        assert_eq!(Instruction::CatPushData.opcode(), 0x89);
        assert_eq!(Instruction::BlockHeight.opcode(), 0xcd);
    }

    #[test]
    fn small_ints_round_trip() {
        for n in 0..=16u8 {
            let instr = Instruction::small_int(n).expect("small int");
            assert_eq!(instr.small_int_value(), Some(n));
        }
        assert_eq!(Instruction::small_int(17), None);
        assert_eq!(Instruction::Dup.small_int_value(), None);
    }

    #[test]
    fn operand_sizes() {
        assert_eq!(Instruction::Jump.operand_len(), 4);
        assert_eq!(Instruction::PushData1.operand_len(), 1);
        assert_eq!(Instruction::PushData2.operand_len(), 2);
        assert_eq!(Instruction::Add.operand_len(), 0);
    }

    #[test]
    fn mnemonics_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for instr in Instruction::ALL {
            assert!(seen.insert(instr.mnemonic()), "duplicate {}", instr.mnemonic());
        }
    }
}
