//! Assembly text parser, bytecode encoder and disassembler.
//!
//! Converts human-readable assembly into executable bytecode and back.
//! Uses [`for_each_instruction!`](for_each_instruction) to generate the
//! mnemonic lookup used while parsing.
//!
//! # Syntax
//!
//! ```text
//! $label 4 ROLL JUMPIF:$label 0x0102 'text' DUP   # optional comment
//! ```
//!
//! - Mnemonics are uppercase, with or without an `OP_` prefix (`DUP`, `OP_DUP`)
//! - Decimal numbers push the minimal encoding of an unsigned integer
//! - `TRUE` / `FALSE` push 1 / the empty string
//! - `0x...` pushes raw bytes, `'...'` pushes the quoted text
//! - `$name` defines a jump target at the current offset
//! - `JUMP:$name`, `JUMPIF:$name` jump to a target; `JUMP:26` to an address
//! - `NOPxhh` emits the raw expansion opcode `hh`
//! - Comments start with `#`

use crate::for_each_instruction;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{
    OP_DATA_1, OP_DATA_75, Instruction, expansion_mnemonic, is_data_push,
};
use crate::virtual_machine::vm::numeric::u256_to_bytes;
use primitive_types::U256;
use std::collections::HashMap;

const COMMENT_CHAR: char = '#';
const LABEL_PREFIX: char = '$';
const JUMP_SEPARATOR: char = ':';
const JUMP_LEN: usize = 5;

// ==================== Encoding helpers ====================

/// Encodes the minimal push of `data`.
///
/// Empty data is `0`; up to 75 bytes use `DATA_n`; larger payloads use the
/// smallest `PUSHDATA` variant that fits the length.
pub fn push_data(data: &[u8]) -> Vec<u8> {
    let len = data.len();
    let mut out = Vec::with_capacity(len + 5);
    if len == 0 {
        out.push(Instruction::False.opcode());
        return out;
    }
    if len <= OP_DATA_75 as usize {
        out.push(OP_DATA_1 + (len as u8) - 1);
    } else if len <= u8::MAX as usize {
        out.push(Instruction::PushData1.opcode());
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(Instruction::PushData2.opcode());
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(Instruction::PushData4.opcode());
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
    out
}

/// Encodes the minimal push of an unsigned integer, using `0`..`16` where possible.
pub fn push_int(n: U256) -> Vec<u8> {
    if n <= U256::from(16u8) {
        let small = n.low_u64() as u8;
        if let Some(instr) = Instruction::small_int(small) {
            return vec![instr.opcode()];
        }
    }
    push_data(&u256_to_bytes(n))
}

/// Encodes the minimal push of a `u64`.
pub fn push_u64(n: u64) -> Vec<u8> {
    push_int(U256::from(n))
}

// ==================== Decoding ====================

/// A single decoded instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedOp {
    /// Offset of the opcode byte in the program.
    pub offset: usize,
    /// Raw opcode byte.
    pub opcode: u8,
    /// Table instruction, `None` for data pushes and expansion opcodes.
    pub instruction: Option<Instruction>,
    /// Inline data for pushes, little-endian target for jumps.
    pub data: Vec<u8>,
    /// Encoded length in bytes, opcode included.
    pub len: usize,
}

impl DecodedOp {
    /// Returns the item this instruction pushes, if it is a push.
    pub fn push_value(&self) -> Option<Vec<u8>> {
        if is_data_push(self.opcode) {
            return Some(self.data.clone());
        }
        let instr = self.instruction?;
        if instr.is_push_data() {
            return Some(self.data.clone());
        }
        instr.small_int_value().map(|n| u256_to_bytes(U256::from(n)))
    }

    /// Returns the jump target for `JUMP`/`JUMPIF`.
    pub fn jump_target(&self) -> Option<u32> {
        match self.instruction {
            Some(Instruction::Jump | Instruction::JumpIf) => {
                let bytes: [u8; 4] = self.data.as_slice().try_into().ok()?;
                Some(u32::from_le_bytes(bytes))
            }
            _ => None,
        }
    }

    /// Text form accepted back by [`assemble`].
    pub fn to_asm(&self) -> String {
        if let Some(target) = self.jump_target() {
            let name = self.instruction.map_or("", |i| i.mnemonic());
            return format!("{name}{JUMP_SEPARATOR}{target}");
        }
        match self.instruction {
            Some(instr) if instr.small_int_value().is_some() => instr.mnemonic().to_string(),
            Some(instr) if instr.is_push_data() => format!("0x{}", hex::encode(&self.data)),
            Some(instr) => instr.mnemonic().to_string(),
            None if is_data_push(self.opcode) => format!("0x{}", hex::encode(&self.data)),
            None => expansion_mnemonic(self.opcode),
        }
    }
}

/// Reads exactly `count` bytes at `start`.
fn read_exact(program: &[u8], start: usize, count: usize) -> Result<&[u8], VMError> {
    let available = program.len().saturating_sub(start);
    start
        .checked_add(count)
        .and_then(|end| program.get(start..end))
        .ok_or(VMError::UnexpectedEndOfBytecode {
            ip: start,
            requested: count,
            available,
        })
}

/// Decodes the instruction starting at `pc`.
pub fn decode_op(program: &[u8], pc: usize) -> Result<DecodedOp, VMError> {
    let opcode = *read_exact(program, pc, 1)?.first().ok_or(VMError::UnexpectedEndOfBytecode {
        ip: pc,
        requested: 1,
        available: 0,
    })?;

    if is_data_push(opcode) {
        let count = opcode as usize;
        let data = read_exact(program, pc + 1, count)?.to_vec();
        return Ok(DecodedOp {
            offset: pc,
            opcode,
            instruction: None,
            data,
            len: 1 + count,
        });
    }

    let Some(instruction) = Instruction::from_byte(opcode) else {
        return Ok(DecodedOp {
            offset: pc,
            opcode,
            instruction: None,
            data: Vec::new(),
            len: 1,
        });
    };

    let prefix = instruction.operand_len();
    let operand = read_exact(program, pc + 1, prefix)?;
    if !instruction.is_push_data() {
        return Ok(DecodedOp {
            offset: pc,
            opcode,
            instruction: Some(instruction),
            data: operand.to_vec(),
            len: 1 + prefix,
        });
    }

    let mut len_bytes = [0u8; 4];
    len_bytes[..prefix].copy_from_slice(operand);
    let count = u32::from_le_bytes(len_bytes) as usize;
    let data = read_exact(program, pc + 1 + prefix, count)?.to_vec();
    Ok(DecodedOp {
        offset: pc,
        opcode,
        instruction: Some(instruction),
        data,
        len: 1 + prefix + count,
    })
}

/// Decodes a whole program.
pub fn parse_program(program: &[u8]) -> Result<Vec<DecodedOp>, VMError> {
    let mut ops = Vec::new();
    let mut pc = 0;
    while pc < program.len() {
        let op = decode_op(program, pc)?;
        pc += op.len;
        ops.push(op);
    }
    Ok(ops)
}

/// Renders a program as assembly text.
pub fn disassemble(program: &[u8]) -> Result<String, VMError> {
    Ok(parse_program(program)?
        .iter()
        .map(DecodedOp::to_asm)
        .collect::<Vec<_>>()
        .join(" "))
}

// ==================== Assembly ====================

/// Assembly context for label tracking during compilation.
pub struct AsmContext {
    /// Label definitions mapping names to bytecode offsets.
    pub(crate) labels: HashMap<String, usize>,
}

impl AsmContext {
    /// Creates an empty assembly context.
    pub fn new() -> Self {
        Self {
            labels: HashMap::new(),
        }
    }

    /// Registers a label at the given bytecode offset.
    pub(crate) fn define_label(&mut self, name: String, offset: usize) -> Result<(), VMError> {
        if self.labels.contains_key(&name) {
            return Err(VMError::DuplicateLabel { label: name });
        }
        self.labels.insert(name, offset);
        Ok(())
    }

    /// Resolves a label to its bytecode offset.
    pub(crate) fn resolve_label(&self, name: &str) -> Result<usize, VMError> {
        self.labels
            .get(name)
            .copied()
            .ok_or(VMError::UndefinedLabel {
                label: name.to_string(),
            })
    }
}

impl Default for AsmContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
struct Token<'a> {
    text: &'a str,
    line: usize,
    offset: usize,
}

/// Splits one line into tokens, keeping quoted strings whole.
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, VMError> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == COMMENT_CHAR {
            break;
        }
        if c == '\'' {
            chars.next();
            let mut end = None;
            for (i, ch) in chars.by_ref() {
                if ch == '\'' {
                    end = Some(i);
                    break;
                }
            }
            let Some(end) = end else {
                return Err(VMError::ParseError {
                    line: line_no,
                    offset: start + 1,
                    message: "unterminated string literal".to_string(),
                });
            };
            tokens.push(Token {
                text: &line[start..=end],
                line: line_no,
                offset: start + 1,
            });
            continue;
        }
        let mut end = line.len();
        while let Some(&(i, ch)) = chars.peek() {
            if ch.is_whitespace() || ch == COMMENT_CHAR {
                end = i;
                break;
            }
            chars.next();
        }
        tokens.push(Token {
            text: &line[start..end],
            line: line_no,
            offset: start + 1,
        });
    }

    Ok(tokens)
}

/// Generates the mnemonic lookup from the instruction table.
#[macro_export]
macro_rules! define_asm_lookup {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $gas:expr
        ),* $(,)?
    ) => {
        fn instruction_from_str(name: &str) -> Result<Instruction, VMError> {
            let name = name.strip_prefix("OP_").unwrap_or(name);
            match name {
                $( $mnemonic => Ok(Instruction::$name), )*
                "FALSE" => Ok(Instruction::False),
                "TRUE" => Ok(Instruction::True),
                _ => Err(VMError::InvalidInstructionName {
                    name: name.to_string(),
                }),
            }
        }
    };
}

for_each_instruction!(define_asm_lookup);

/// Destination of a jump in assembly text.
#[derive(Clone, Debug)]
enum JumpRef {
    Label(String),
    Address(u32),
}

/// One parsed assembly token.
#[derive(Clone, Debug)]
enum AsmItem {
    Bytes(Vec<u8>),
    Jump(Instruction, JumpRef),
    Label(String),
}

impl AsmItem {
    fn size(&self) -> usize {
        match self {
            AsmItem::Bytes(bytes) => bytes.len(),
            AsmItem::Jump(..) => JUMP_LEN,
            AsmItem::Label(_) => 0,
        }
    }
}

fn parse_error(token: &Token, message: impl Into<String>) -> VMError {
    VMError::ParseError {
        line: token.line,
        offset: token.offset,
        message: message.into(),
    }
}

fn parse_token(token: &Token) -> Result<AsmItem, VMError> {
    let text = token.text;

    if let Some(label) = text.strip_prefix(LABEL_PREFIX) {
        if label.is_empty() {
            return Err(parse_error(token, "empty label name"));
        }
        return Ok(AsmItem::Label(label.to_string()));
    }

    if let Some(quoted) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Ok(AsmItem::Bytes(push_data(quoted.as_bytes())));
    }

    if let Some(hex_text) = text.strip_prefix("0x") {
        let data = hex::decode(hex_text)
            .map_err(|e| parse_error(token, format!("invalid hex literal {text}: {e}")))?;
        return Ok(AsmItem::Bytes(push_data(&data)));
    }

    if text.chars().all(|c| c.is_ascii_digit()) {
        let n = U256::from_dec_str(text)
            .map_err(|_| parse_error(token, format!("number {text} does not fit 256 bits")))?;
        return Ok(AsmItem::Bytes(push_int(n)));
    }

    if let Some((name, target)) = text.split_once(JUMP_SEPARATOR) {
        let instr = instruction_from_str(name).map_err(|e| parse_error(token, e.to_string()))?;
        if !matches!(instr, Instruction::Jump | Instruction::JumpIf) {
            return Err(parse_error(token, format!("{name} does not take a jump target")));
        }
        let target = match target.strip_prefix(LABEL_PREFIX) {
            Some(label) => JumpRef::Label(label.to_string()),
            None => JumpRef::Address(
                target
                    .parse::<u32>()
                    .map_err(|_| parse_error(token, format!("invalid jump target {target}")))?,
            ),
        };
        return Ok(AsmItem::Jump(instr, target));
    }

    if let Some(raw) = text.strip_prefix("NOPx") {
        let op = u8::from_str_radix(raw, 16)
            .map_err(|_| parse_error(token, format!("invalid expansion opcode {text}")))?;
        return Ok(AsmItem::Bytes(vec![op]));
    }

    let instr = instruction_from_str(text).map_err(|e| VMError::AssemblyError {
        line: token.line,
        offset: token.offset,
        source: e.to_string(),
    })?;
    if instr.operand_len() > 0 {
        return Err(parse_error(
            token,
            format!("{} needs inline operands; write data as 0x... or a jump as {}:$label", instr.mnemonic(), instr.mnemonic()),
        ));
    }
    Ok(AsmItem::Bytes(vec![instr.opcode()]))
}

/// Assembles program text into bytecode.
///
/// First pass parses tokens and records label offsets; second pass emits bytes
/// with every jump target resolved.
pub fn assemble(source: &str) -> Result<Vec<u8>, VMError> {
    let mut ctx = AsmContext::new();
    let mut items = Vec::new();
    let mut offset = 0usize;

    for (line_no, line) in source.lines().enumerate() {
        for token in tokenize(line_no + 1, line)? {
            let item = parse_token(&token)?;
            if let AsmItem::Label(name) = &item {
                ctx.define_label(name.clone(), offset)
                    .map_err(|e| VMError::AssemblyError {
                        line: token.line,
                        offset: token.offset,
                        source: e.to_string(),
                    })?;
            }
            offset += item.size();
            items.push((token.line, token.offset, item));
        }
    }

    let mut out = Vec::with_capacity(offset);
    for (line, column, item) in items {
        match item {
            AsmItem::Bytes(bytes) => out.extend_from_slice(&bytes),
            AsmItem::Label(_) => {}
            AsmItem::Jump(instr, target) => {
                let address = match target {
                    JumpRef::Address(address) => address,
                    JumpRef::Label(label) => {
                        let resolved = ctx.resolve_label(&label).map_err(|e| {
                            VMError::AssemblyError {
                                line,
                                offset: column,
                                source: e.to_string(),
                            }
                        })?;
                        u32::try_from(resolved).map_err(|_| VMError::AssemblyError {
                            line,
                            offset: column,
                            source: format!("label {label} beyond 32-bit offsets"),
                        })?
                    }
                };
                out.push(instr.opcode());
                out.extend_from_slice(&address.to_le_bytes());
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asm(source: &str) -> String {
        hex::encode(assemble(source).expect("assembly failed"))
    }

    #[test]
    fn assemble_empty_source() {
        assert!(assemble("").unwrap().is_empty());
        assert!(assemble("   # only a comment\n\n").unwrap().is_empty());
    }

    #[test]
    fn assemble_mnemonics_and_prefix() {
        assert_eq!(asm("TXSIGHASH SWAP CHECKSIG"), "ae7cac");
        assert_eq!(asm("OP_TXSIGHASH OP_SWAP OP_CHECKSIG"), "ae7cac");
    }

    #[test]
    fn assemble_inline_comment() {
        assert_eq!(asm("DUP # trailing\nDROP"), "7675");
    }

    #[test]
    fn assemble_small_ints_and_booleans() {
        assert_eq!(asm("0 1 16 TRUE FALSE"), "0051605100");
        assert_eq!(asm("17"), "0111");
        assert_eq!(asm("256"), "020001");
    }

    #[test]
    fn assemble_hex_and_string_pushes() {
        assert_eq!(asm("0x"), "00");
        assert_eq!(asm("0xabcd"), "02abcd");
        assert_eq!(asm("'hi there'"), "086869207468657265");
    }

    #[test]
    fn assemble_labels() {
        assert_eq!(asm("JUMP:$end DUP $end"), "630600000076");
        assert_eq!(asm("$top NOP JUMPIF:$top"), "616400000000");
        assert_eq!(asm("JUMP:7"), "6307000000");
    }

    #[test]
    fn duplicate_label_error() {
        let err = assemble("$a $a").unwrap_err();
        assert!(matches!(err, VMError::AssemblyError { .. }));
        assert!(err.to_string().contains("duplicate label: a"));
    }

    #[test]
    fn undefined_label_error() {
        let err = assemble("JUMP:$nowhere").unwrap_err();
        assert!(err.to_string().contains("undefined label: nowhere"));
    }

    #[test]
    fn invalid_instruction_reports_position() {
        match assemble("DUP\n  FROB").unwrap_err() {
            VMError::AssemblyError {
                line,
                offset,
                source,
            } => assert_eq!((line, offset, source.as_str()), (2, 3, "invalid instruction name: FROB")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unterminated_string_literal() {
        assert!(matches!(
            assemble("'abc"),
            Err(VMError::ParseError { line: 1, offset: 1, .. })
        ));
    }

    #[test]
    fn jump_requires_target() {
        assert!(assemble("JUMP").is_err());
        assert!(assemble("DUP:$x").is_err());
    }

    #[test]
    fn push_data_variants() {
        assert_eq!(push_data(&[]), vec![0x00]);
        assert_eq!(push_data(&[7]), vec![0x01, 7]);
        assert_eq!(push_data(&[1u8; 75])[0], 0x4b);
        assert_eq!(&push_data(&[1u8; 76])[..2], &[0x4c, 76]);
        assert_eq!(&push_data(&[1u8; 256])[..3], &[0x4d, 0x00, 0x01]);
        assert_eq!(&push_data(&vec![1u8; 65536])[..5], &[0x4e, 0x00, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn push_int_prefers_small_opcodes() {
        assert_eq!(push_u64(0), vec![0x00]);
        assert_eq!(push_u64(1), vec![0x51]);
        assert_eq!(push_u64(16), vec![0x60]);
        assert_eq!(push_u64(17), vec![0x01, 0x11]);
    }

    #[test]
    fn decode_truncated_program() {
        assert!(matches!(
            decode_op(&[0x4c], 0),
            Err(VMError::UnexpectedEndOfBytecode { .. })
        ));
        assert!(matches!(
            decode_op(&[0x63, 0x01], 0),
            Err(VMError::UnexpectedEndOfBytecode { .. })
        ));
    }

    #[test]
    fn disassemble_round_trip() {
        let text = "4 ROLL JUMPIF:19 0 ROT ROT 1 4 ROLL CHECKOUTPUT JUMP:26 4 ROLL 4 ROLL TXSIGHASH SWAP CHECKSIG";
        let program = assemble(text).unwrap();
        assert_eq!(disassemble(&program).unwrap(), text);
        assert_eq!(assemble(&disassemble(&program).unwrap()).unwrap(), program);
    }

    #[test]
    fn disassemble_data_and_expansion() {
        assert_eq!(disassemble(&[0x02, 0xab, 0xcd, 0x50, 0xff]).unwrap(), "0xabcd NOPx50 NOPxff");
        assert_eq!(assemble("NOPx50 NOPxff").unwrap(), vec![0x50, 0xff]);
    }

    #[test]
    fn decoded_push_values() {
        let ops = parse_program(&assemble("0 5 0x0102 JUMP:0").unwrap()).unwrap();
        assert_eq!(ops[0].push_value(), Some(vec![]));
        assert_eq!(ops[1].push_value(), Some(vec![5]));
        assert_eq!(ops[2].push_value(), Some(vec![1, 2]));
        assert_eq!(ops[3].push_value(), None);
        assert_eq!(ops[3].jump_target(), Some(0));
    }
}
