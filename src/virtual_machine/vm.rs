//! Stack virtual machine.
//!
//! Executes bytecode over two stacks of byte strings: the data stack and the
//! alt stack. Numbers are unsigned 256-bit little-endian values (see
//! [`numeric`]); any item with a non-zero byte is true.
//!
//! Every instruction is charged its base gas from the instruction table
//! before it runs. Items pushed or popped add or remove `8 + len` units of
//! deferred cost, settled once the instruction completes. A net refund is
//! never applied, so gas used only grows.
//!
//! The first runtime error stops the instance: later calls to [`VM::run`]
//! or [`VM::step`] return [`VMError::Faulted`].

mod arith;
pub mod context;
mod control;
mod crypto;
pub mod gas;
mod introspection;
pub mod numeric;
mod splice;
mod stack;
#[cfg(test)]
mod tests;

use crate::info;
use crate::virtual_machine::assembler::{DecodedOp, decode_op, disassemble};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, is_data_push};
use context::Context;
use gas::{GasCategory, GasProfile, STACK_ITEM_COST};
use numeric::{as_bool, bool_to_bytes, bytes_to_u64, bytes_to_u256, u256_to_bytes};
use primitive_types::U256;

/// Only VM version understood by [`verify`].
pub const SUPPORTED_VM_VERSION: u64 = 1;

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        op = $op:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    let instr_name = $instr.mnemonic();
                    exec_vm!(@call $vm, $op, instr_name, $handler, $args)
                }
            ),*
        }
    }};

    // Handler without operands
    (@call $vm:ident, $op:ident, $instr_name:expr, $handler:ident, ()) => {{
        $vm.$handler($instr_name)
    }};

    // Handler taking the inline push data
    (@call $vm:ident, $op:ident, $instr_name:expr, $handler:ident, (data)) => {{
        $vm.$handler($instr_name, $op.data)
    }};

    // Handler taking a decoded jump target
    (@call $vm:ident, $op:ident, $instr_name:expr, $handler:ident, (target)) => {{
        let target = exec_vm!(@read $op, Target)?;
        $vm.$handler($instr_name, target)
    }};

    // Small integer push
    (@call $vm:ident, $op:ident, $instr_name:expr, $handler:ident, [$n:literal]) => {{
        $vm.$handler($instr_name, $n)
    }};

    // Decode a u32 jump target (little-endian, 4 bytes)
    (@read $op:ident, Target) => {{
        $op.jump_target().ok_or(VMError::UnexpectedEndOfBytecode {
            ip: $op.offset,
            requested: 4,
            available: $op.data.len(),
        })
    }};
}

/// Stack-based bytecode virtual machine.
pub struct VM<'a> {
    /// Bytecode to execute.
    program: Vec<u8>,
    /// Offset of the next instruction.
    pc: usize,
    /// Offset following the instruction being executed; jumps overwrite it.
    next_pc: usize,
    data_stack: Vec<Vec<u8>>,
    alt_stack: Vec<Vec<u8>>,
    /// Gas left.
    run_limit: u64,
    /// Budget the instance started with.
    initial_limit: u64,
    /// Stack-size cost accumulated by the current instruction.
    deferred_cost: i64,
    /// Predicate nesting depth, 0 for the outermost program.
    depth: usize,
    context: &'a Context,
    expansion_reserved: bool,
    faulted: bool,
    gas_profile: GasProfile,
    trace: bool,
}

impl<'a> VM<'a> {
    /// Creates a VM over `program` with `run_limit` units of gas.
    pub fn new(program: Vec<u8>, context: &'a Context, run_limit: u64) -> Self {
        Self {
            program,
            pc: 0,
            next_pc: 0,
            data_stack: Vec::new(),
            alt_stack: Vec::new(),
            run_limit,
            initial_limit: run_limit,
            deferred_cost: 0,
            depth: 0,
            context,
            expansion_reserved: context.expansion_reserved(),
            faulted: false,
            gas_profile: GasProfile::new(),
            trace: false,
        }
    }

    /// Logs every executed instruction when enabled.
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Gas still available.
    pub fn gas_left(&self) -> u64 {
        self.run_limit
    }

    /// Gas consumed since the instance was created.
    pub fn gas_used(&self) -> u64 {
        self.initial_limit - self.run_limit
    }

    /// Per-category breakdown of [`VM::gas_used`].
    pub fn gas_profile(&self) -> &GasProfile {
        &self.gas_profile
    }

    /// Data stack, bottom first.
    pub fn data_stack(&self) -> &[Vec<u8>] {
        &self.data_stack
    }

    /// Alt stack, bottom first.
    pub fn alt_stack(&self) -> &[Vec<u8>] {
        &self.alt_stack
    }

    /// Offset of the next instruction.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Whether the program counter ran past the last instruction.
    pub fn is_done(&self) -> bool {
        self.pc >= self.program.len()
    }

    /// Whether an earlier error stopped this instance.
    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Whether a completed run left an empty stack or a false top item.
    pub fn false_result(&self) -> bool {
        self.data_stack.last().is_none_or(|top| !as_bool(top))
    }

    /// Pushes an item before execution, charging its cost immediately.
    pub fn push_initial(&mut self, item: Vec<u8>) -> Result<(), VMError> {
        self.apply_cost(STACK_ITEM_COST + item.len() as u64, GasCategory::Arguments)?;
        self.data_stack.push(item);
        Ok(())
    }

    /// Runs until the program counter leaves the program or an error occurs.
    pub fn run(&mut self) -> Result<(), VMError> {
        if self.faulted {
            return Err(VMError::Faulted);
        }
        while !self.is_done() {
            self.step()?;
        }
        Ok(())
    }

    /// Executes a single instruction.
    pub fn step(&mut self) -> Result<(), VMError> {
        if self.faulted {
            return Err(VMError::Faulted);
        }
        let result = self.step_inner();
        if result.is_err() {
            self.faulted = true;
        }
        result
    }

    fn step_inner(&mut self) -> Result<(), VMError> {
        let op = decode_op(&self.program, self.pc)?;
        self.next_pc = self.pc + op.len;

        if self.trace {
            info!(
                "[depth {}] {:>5}: {:<24} gas_left={} stack={}",
                self.depth,
                self.pc,
                op.to_asm(),
                self.run_limit,
                self.data_stack.len()
            );
        }

        match op.instruction {
            Some(instruction) => {
                self.apply_cost(instruction.base_gas(), GasCategory::OpcodeBase)?;
                self.exec(instruction, op)?;
            }
            None if is_data_push(op.opcode) => {
                self.apply_cost(1, GasCategory::OpcodeBase)?;
                self.op_push_data("DATA", op.data)?;
            }
            None => self.op_expansion(op.opcode)?,
        }

        self.settle_deferred()?;
        self.pc = self.next_pc;
        Ok(())
    }

    /// Executes a table instruction.
    fn exec(&mut self, instruction: Instruction, op: DecodedOp) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            op = op,
            instr = instruction,
            {
                // Pushes
                False => op_push_small[0],
                PushData1 => op_push_data(data),
                PushData2 => op_push_data(data),
                PushData4 => op_push_data(data),
                True => op_push_small[1],
                Num2 => op_push_small[2],
                Num3 => op_push_small[3],
                Num4 => op_push_small[4],
                Num5 => op_push_small[5],
                Num6 => op_push_small[6],
                Num7 => op_push_small[7],
                Num8 => op_push_small[8],
                Num9 => op_push_small[9],
                Num10 => op_push_small[10],
                Num11 => op_push_small[11],
                Num12 => op_push_small[12],
                Num13 => op_push_small[13],
                Num14 => op_push_small[14],
                Num15 => op_push_small[15],
                Num16 => op_push_small[16],
                // Control flow
                Nop => op_nop(),
                Jump => op_jump(target),
                JumpIf => op_jumpif(target),
                Verify => op_verify(),
                Fail => op_fail(),
                CheckPredicate => op_check_predicate(),
                // Stack
                ToAltStack => op_to_alt_stack(),
                FromAltStack => op_from_alt_stack(),
                TwoDrop => op_2drop(),
                TwoDup => op_2dup(),
                ThreeDup => op_3dup(),
                TwoOver => op_2over(),
                TwoRot => op_2rot(),
                TwoSwap => op_2swap(),
                IfDup => op_ifdup(),
                Depth => op_depth(),
                Drop => op_drop(),
                Dup => op_dup(),
                Nip => op_nip(),
                Over => op_over(),
                Pick => op_pick(),
                Roll => op_roll(),
                Rot => op_rot(),
                Swap => op_swap(),
                Tuck => op_tuck(),
                // Splice
                Cat => op_cat(),
                Substr => op_substr(),
                Left => op_left(),
                Right => op_right(),
                Size => op_size(),
                CatPushData => op_cat_push_data(),
                // Bitwise
                Invert => op_invert(),
                And => op_and(),
                Or => op_or(),
                Xor => op_xor(),
                Equal => op_equal(),
                EqualVerify => op_equal_verify(),
                // Numeric
                OneAdd => op_1add(),
                OneSub => op_1sub(),
                TwoMul => op_2mul(),
                TwoDiv => op_2div(),
                Negate => op_negate(),
                Abs => op_abs(),
                Not => op_not(),
                ZeroNotEqual => op_0notequal(),
                Add => op_add(),
                Sub => op_sub(),
                Mul => op_mul(),
                Div => op_div(),
                Mod => op_mod(),
                LShift => op_lshift(),
                RShift => op_rshift(),
                BoolAnd => op_booland(),
                BoolOr => op_boolor(),
                NumEqual => op_numequal(),
                NumEqualVerify => op_numequal_verify(),
                NumNotEqual => op_numnotequal(),
                LessThan => op_lessthan(),
                GreaterThan => op_greaterthan(),
                LessThanOrEqual => op_lessthanorequal(),
                GreaterThanOrEqual => op_greaterthanorequal(),
                Min => op_min(),
                Max => op_max(),
                Within => op_within(),
                // Crypto
                Ripemd160 => op_ripemd160(),
                Sha256 => op_sha256(),
                Sm3 => op_sm3(),
                Sha3 => op_sha3(),
                Hash160 => op_hash160(),
                CheckSig => op_checksig(),
                CheckMultiSig => op_checkmultisig(),
                TxSigHash => op_txsighash(),
                CheckSigSm2 => op_checksig_sm2(),
                CheckMultiSigSm2 => op_checkmultisig_sm2(),
                // Introspection
                CheckOutput => op_check_output(),
                Asset => op_asset(),
                Amount => op_amount(),
                Program => op_program(),
                Index => op_index(),
                EntryId => op_entry_id(),
                OutputId => op_output_id(),
                BlockHeight => op_block_height(),
            }
        }
    }

    // ==================== Gas ====================

    /// Charges `amount` gas, failing when the budget is smaller.
    fn apply_cost(&mut self, amount: u64, category: GasCategory) -> Result<(), VMError> {
        if amount > self.run_limit {
            return Err(VMError::RunLimitExceeded {
                needed: amount,
                available: self.run_limit,
            });
        }
        self.run_limit -= amount;
        self.gas_profile.add(category, amount);
        Ok(())
    }

    fn defer_cost(&mut self, amount: i64) {
        self.deferred_cost = self.deferred_cost.saturating_add(amount);
    }

    /// Settles the stack-size cost of the instruction that just ran.
    fn settle_deferred(&mut self) -> Result<(), VMError> {
        let deferred = std::mem::take(&mut self.deferred_cost);
        if deferred > 0 {
            self.apply_cost(deferred as u64, GasCategory::StackData)?;
        }
        Ok(())
    }

    // ==================== Stack helpers ====================

    fn item_cost(item: &[u8]) -> i64 {
        (STACK_ITEM_COST + item.len() as u64) as i64
    }

    fn push(&mut self, item: Vec<u8>) -> Result<(), VMError> {
        self.defer_cost(Self::item_cost(&item));
        self.data_stack.push(item);
        Ok(())
    }

    fn push_bool(&mut self, b: bool) -> Result<(), VMError> {
        self.push(bool_to_bytes(b))
    }

    fn push_u256(&mut self, n: U256) -> Result<(), VMError> {
        self.push(u256_to_bytes(n))
    }

    fn push_u64(&mut self, n: u64) -> Result<(), VMError> {
        self.push_u256(U256::from(n))
    }

    fn pop(&mut self) -> Result<Vec<u8>, VMError> {
        let item = self.data_stack.pop().ok_or(VMError::DataStackUnderflow)?;
        self.defer_cost(-Self::item_cost(&item));
        Ok(item)
    }

    fn pop_bool(&mut self) -> Result<bool, VMError> {
        Ok(as_bool(&self.pop()?))
    }

    fn pop_u256(&mut self) -> Result<U256, VMError> {
        bytes_to_u256(&self.pop()?)
    }

    fn pop_u64(&mut self, instr: &'static str) -> Result<u64, VMError> {
        bytes_to_u64(&self.pop()?, instr)
    }

    /// Pops a count that must fit in memory.
    fn pop_count(&mut self, instr: &'static str) -> Result<usize, VMError> {
        let n = self.pop_u64(instr)?;
        usize::try_from(n).map_err(|_| VMError::RangeError { op: instr })
    }

    /// Index into the data stack of the item `depth` below the top.
    fn stack_index(&self, depth: usize) -> Result<usize, VMError> {
        depth
            .checked_add(1)
            .and_then(|d| self.data_stack.len().checked_sub(d))
            .ok_or(VMError::DataStackUnderflow)
    }

    /// Requires at least `n` items on the data stack.
    fn require_items(&self, n: usize) -> Result<(), VMError> {
        if self.data_stack.len() < n {
            return Err(VMError::DataStackUnderflow);
        }
        Ok(())
    }

    /// Copy of the item `depth` below the top.
    fn peek(&self, depth: usize) -> Result<Vec<u8>, VMError> {
        let idx = self.stack_index(depth)?;
        Ok(self.data_stack[idx].clone())
    }

    /// Moves the item `depth` below the top to the top, free of charge.
    fn move_to_top(&mut self, depth: usize) -> Result<(), VMError> {
        let idx = self.stack_index(depth)?;
        let item = self.data_stack.remove(idx);
        self.data_stack.push(item);
        Ok(())
    }

    fn jump_to(&mut self, target: u32) -> Result<(), VMError> {
        let target_pc = target as usize;
        if target_pc > self.program.len() {
            return Err(VMError::InvalidJumpTarget { target });
        }
        self.next_pc = target_pc;
        Ok(())
    }
}

/// Runs the program of `context` over its state data and arguments.
///
/// Returns the gas left on success. A run that ends with a false result is
/// reported as [`VMError::FalseResult`]; every runtime error is wrapped in
/// [`VMError::Execution`] with the program disassembly and the hex-encoded
/// arguments.
pub fn verify(context: &Context, gas_limit: u64) -> Result<u64, VMError> {
    if context.vm_version != SUPPORTED_VM_VERSION {
        return Err(VMError::UnsupportedVM {
            version: context.vm_version,
        });
    }

    let mut vm = VM::new(context.code.clone(), context, gas_limit);
    let result = run_verification(&mut vm, context);
    match result {
        Ok(()) => Ok(vm.gas_left()),
        Err(err) => Err(wrap_error(err, context)),
    }
}

fn run_verification(vm: &mut VM<'_>, context: &Context) -> Result<(), VMError> {
    for item in context.state_data.iter().chain(&context.arguments) {
        vm.push_initial(item.clone())?;
    }
    vm.run()?;
    if vm.false_result() {
        return Err(VMError::FalseResult);
    }
    Ok(())
}

fn wrap_error(err: VMError, context: &Context) -> VMError {
    let disassembly = disassemble(&context.code).unwrap_or_else(|_| hex::encode(&context.code));
    let args = context
        .arguments
        .iter()
        .map(hex::encode)
        .collect::<Vec<_>>()
        .join(" ");
    VMError::Execution {
        source: Box::new(err),
        disassembly,
        args,
    }
}
