//! Contract instantiation and its inverse.
//!
//! An instantiated program pushes the arguments, last first, then hands the
//! stack to the body through `CHECKPREDICATE`:
//!
//! ```text
//! <argN> .. <arg1> DEPTH <body> 0 CHECKPREDICATE          plain
//! <argN> .. <arg1> <body> DEPTH OVER 0 CHECKPREDICATE     recursive
//! ```

use super::artifact::ParamInfo;
use super::errors::CompileError;
use super::types::Type;
use crate::virtual_machine::assembler::{DecodedOp, parse_program, push_data};
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::vm::numeric::{as_bool, bool_to_bytes, bytes_to_u64, u64_to_bytes};
use std::fmt;

/// Concrete value for a contract parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ContractArg {
    Boolean(bool),
    /// `Integer` and `Amount` parameters.
    Integer(u64),
    /// Every byte-string parameter type.
    String(Vec<u8>),
}

impl ContractArg {
    fn kind(&self) -> &'static str {
        match self {
            ContractArg::Boolean(_) => "Boolean",
            ContractArg::Integer(_) => "Integer",
            ContractArg::String(_) => "String",
        }
    }

    fn fits(&self, ty: &Type) -> bool {
        match self {
            ContractArg::Boolean(_) => *ty == Type::Boolean,
            ContractArg::Integer(_) => ty.is_numeric(),
            ContractArg::String(_) => ty.is_bytes(),
        }
    }

    /// Parses command-line text for a parameter of type `ty`.
    ///
    /// Booleans are `true`/`false` and numbers decimal. `String` takes text or
    /// `0x` hex; the other byte types take hex with an optional `0x`.
    pub fn parse(text: &str, ty: &Type) -> Result<ContractArg, CompileError> {
        let bad = |reason: &str| CompileError::ArgType {
            name: text.to_string(),
            expected: ty.to_string(),
            got: reason.to_string(),
        };
        match ty {
            Type::Boolean => match text {
                "true" => Ok(ContractArg::Boolean(true)),
                "false" => Ok(ContractArg::Boolean(false)),
                _ => Err(bad("neither true nor false")),
            },
            Type::Integer | Type::Amount => text
                .parse()
                .map(ContractArg::Integer)
                .map_err(|_| bad("not a decimal u64")),
            Type::String => match text.strip_prefix("0x") {
                Some(digits) => hex::decode(digits)
                    .map(ContractArg::String)
                    .map_err(|_| bad("bad hex")),
                None => Ok(ContractArg::String(text.as_bytes().to_vec())),
            },
            _ => hex::decode(text.strip_prefix("0x").unwrap_or(text))
                .map(ContractArg::String)
                .map_err(|_| bad("bad hex")),
        }
    }

    /// Push-data encoding of the value, as `CATPUSHDATA` builds it, so that a
    /// contract relocking itself reproduces its own program byte for byte.
    fn push(&self) -> Vec<u8> {
        match self {
            ContractArg::Boolean(b) => push_data(&bool_to_bytes(*b)),
            ContractArg::Integer(n) => push_data(&u64_to_bytes(*n)),
            ContractArg::String(bytes) => push_data(bytes),
        }
    }
}

impl fmt::Display for ContractArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractArg::Boolean(b) => write!(f, "{b}"),
            ContractArg::Integer(n) => write!(f, "{n}"),
            ContractArg::String(bytes) => write!(f, "0x{}", hex::encode(bytes)),
        }
    }
}

/// Builds the program locking value into `body` with `args`.
pub fn instantiate(
    body: &[u8],
    params: &[ParamInfo],
    recursive: bool,
    args: &[ContractArg],
) -> Result<Vec<u8>, CompileError> {
    if params.len() != args.len() {
        return Err(CompileError::ArgCount {
            expected: params.len(),
            got: args.len(),
        });
    }
    for (param, arg) in params.iter().zip(args) {
        if !arg.fits(&param.declared_type) {
            return Err(CompileError::ArgType {
                name: param.name.clone(),
                expected: param.declared_type.to_string(),
                got: arg.kind().to_string(),
            });
        }
    }

    let mut program: Vec<u8> = args.iter().rev().flat_map(ContractArg::push).collect();
    if recursive {
        program.extend(push_data(body));
        program.push(Instruction::Depth.opcode());
        program.push(Instruction::Over.opcode());
    } else {
        program.push(Instruction::Depth.opcode());
        program.extend(push_data(body));
    }
    program.push(Instruction::False.opcode());
    program.push(Instruction::CheckPredicate.opcode());
    Ok(program)
}

/// Arguments and body recovered from an instantiated program.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instantiation {
    pub args: Vec<ContractArg>,
    pub body: Vec<u8>,
    pub recursive: bool,
}

fn envelope_error(reason: impl Into<String>) -> CompileError {
    CompileError::Envelope {
        reason: reason.into(),
    }
}

/// Reverses [`instantiate`] for a contract with `params`.
pub fn parse_instantiation(
    program: &[u8],
    params: &[ParamInfo],
) -> Result<Instantiation, CompileError> {
    let ops = parse_program(program).map_err(|e| envelope_error(e.to_string()))?;
    if ops.len() < params.len() {
        return Err(envelope_error(format!(
            "{} instructions cannot hold {} arguments",
            ops.len(),
            params.len()
        )));
    }
    let (arg_ops, envelope) = ops.split_at(params.len());

    let mut args = Vec::with_capacity(params.len());
    for (op, param) in arg_ops.iter().rev().zip(params) {
        let value = op.push_value().ok_or_else(|| {
            envelope_error(format!(
                "expected a push for \"{}\" at offset {}",
                param.name, op.offset
            ))
        })?;
        let arg = match &param.declared_type {
            Type::Boolean => ContractArg::Boolean(as_bool(&value)),
            ty if ty.is_numeric() => ContractArg::Integer(
                bytes_to_u64(&value, "instantiation").map_err(|e| envelope_error(e.to_string()))?,
            ),
            _ => ContractArg::String(value),
        };
        args.push(arg);
    }

    let is = |op: &DecodedOp, instr: Instruction| op.instruction == Some(instr);
    let is_zero = |op: &DecodedOp| op.push_value().is_some_and(|v| v.is_empty());
    let (body, recursive) = match envelope {
        [body, depth, over, zero, check]
            if is(depth, Instruction::Depth)
                && is(over, Instruction::Over)
                && is_zero(zero)
                && is(check, Instruction::CheckPredicate) =>
        {
            (body, true)
        }
        [depth, body, zero, check]
            if is(depth, Instruction::Depth)
                && is_zero(zero)
                && is(check, Instruction::CheckPredicate) =>
        {
            (body, false)
        }
        _ => return Err(envelope_error("no CHECKPREDICATE envelope after the arguments")),
    };
    let body = body
        .push_value()
        .ok_or_else(|| envelope_error("contract body is not a push"))?;
    Ok(Instantiation {
        args,
        body,
        recursive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, ty: Type) -> ParamInfo {
        ParamInfo {
            name: name.into(),
            declared_type: ty,
            inferred_type: None,
        }
    }

    fn trade_params() -> Vec<ParamInfo> {
        vec![
            param("requestedAsset", Type::Asset),
            param("requestedAmount", Type::Amount),
            param("sellerProgram", Type::Program),
            param("sellerKey", Type::PublicKey),
            param("allowPartial", Type::Boolean),
        ]
    }

    fn trade_args() -> Vec<ContractArg> {
        vec![
            ContractArg::String(vec![0xaa; 32]),
            ContractArg::Integer(1_000_000),
            ContractArg::String(vec![0x51]),
            ContractArg::String(vec![0xbb; 32]),
            ContractArg::Boolean(false),
        ]
    }

    #[test]
    fn plain_envelope_layout() {
        let program = instantiate(
            &[0x51],
            &[param("n", Type::Integer)],
            false,
            &[ContractArg::Integer(3)],
        )
        .unwrap();
        assert_eq!(program, vec![0x01, 0x03, 0x74, 0x01, 0x51, 0x00, 0xc0]);

        let recursive = instantiate(&[0x51], &[], true, &[]).unwrap();
        assert_eq!(recursive, vec![0x01, 0x51, 0x74, 0x78, 0x00, 0xc0]);
    }

    #[test]
    fn scalar_arguments_use_push_data() {
        let params = [param("n", Type::Integer), param("on", Type::Boolean)];
        let program = |n, on| {
            instantiate(
                &[0x51],
                &params,
                false,
                &[ContractArg::Integer(n), ContractArg::Boolean(on)],
            )
            .unwrap()
        };
        assert_eq!(program(5, true)[..4], [0x01, 0x01, 0x01, 0x05]);
        assert_eq!(program(0, false)[..2], [0x00, 0x00]);
        assert_eq!(program(1000, false)[..4], [0x00, 0x02, 0xe8, 0x03]);
    }

    #[test]
    fn parse_reverses_instantiate() {
        let body = hex::decode("547a6413000000007b7b51547ac1631a000000547a547aae7cac").unwrap();
        for recursive in [false, true] {
            let program = instantiate(&body, &trade_params(), recursive, &trade_args()).unwrap();
            let parsed = parse_instantiation(&program, &trade_params()).unwrap();
            assert_eq!(
                parsed,
                Instantiation {
                    args: trade_args(),
                    body: body.clone(),
                    recursive,
                }
            );
        }
    }

    #[test]
    fn argument_checks() {
        let params = [param("key", Type::PublicKey)];
        assert!(matches!(
            instantiate(&[0x51], &params, false, &[]),
            Err(CompileError::ArgCount {
                expected: 1,
                got: 0
            })
        ));
        let err = instantiate(&[0x51], &params, false, &[ContractArg::Integer(1)]).unwrap_err();
        assert_eq!(err.to_string(), "argument \"key\" must be PublicKey, got Integer");
    }

    #[test]
    fn malformed_envelopes() {
        let params = [param("n", Type::Integer)];
        assert!(matches!(
            parse_instantiation(&[0x53, 0x74, 0x01, 0x51, 0x00], &params),
            Err(CompileError::Envelope { .. })
        ));
        assert!(matches!(
            parse_instantiation(&[0x76, 0x74, 0x01, 0x51, 0x00, 0xc0], &params),
            Err(CompileError::Envelope { .. })
        ));
        assert!(parse_instantiation(&[], &params).is_err());
    }

    #[test]
    fn parses_cli_text() {
        assert_eq!(
            ContractArg::parse("true", &Type::Boolean).unwrap(),
            ContractArg::Boolean(true)
        );
        assert_eq!(
            ContractArg::parse("42", &Type::Amount).unwrap(),
            ContractArg::Integer(42)
        );
        assert_eq!(
            ContractArg::parse("hi", &Type::String).unwrap(),
            ContractArg::String(b"hi".to_vec())
        );
        assert_eq!(
            ContractArg::parse("0xab", &Type::PublicKey).unwrap(),
            ContractArg::String(vec![0xab])
        );
        assert!(ContractArg::parse("zz", &Type::Hash).is_err());
        assert!(ContractArg::parse("-1", &Type::Integer).is_err());
    }
}
