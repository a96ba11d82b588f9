use crate::types::hash::Hash;
use crate::virtual_machine::errors::VMError;

/// Arguments of one `CHECKOUTPUT` query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OutputQuery<'a> {
    /// Output position in the transaction.
    pub index: u64,
    pub amount: u64,
    pub asset_id: &'a [u8],
    pub vm_version: u64,
    /// Control program the output must carry.
    pub code: &'a [u8],
    /// Whether expansion opcodes are reserved for the running transaction.
    pub expansion: bool,
}

/// Transaction signature hash supplier.
pub type TxSigHashFn = Box<dyn Fn() -> Hash>;

/// Output inspection predicate.
pub type CheckOutputFn = Box<dyn Fn(OutputQuery<'_>) -> Result<bool, VMError>>;

/// Execution context supplied by the transaction validator.
///
/// Read-only for the VM. Optional fields are absent when the entry being
/// validated has no such property; the matching introspection opcode then
/// fails with [`VMError::ContextMissing`].
#[derive(Default)]
pub struct Context {
    pub vm_version: u64,
    /// Program being verified.
    pub code: Vec<u8>,
    /// Witness arguments, pushed bottom first.
    pub arguments: Vec<Vec<u8>>,
    /// State items pushed below the arguments.
    pub state_data: Vec<Vec<u8>>,
    pub entry_id: Hash,
    pub tx_version: Option<u64>,
    pub block_height: Option<u64>,
    pub asset_id: Option<Vec<u8>>,
    pub amount: Option<u64>,
    pub dest_pos: Option<u64>,
    pub spent_output_id: Option<Hash>,
    pub tx_sig_hash: Option<TxSigHashFn>,
    pub check_output: Option<CheckOutputFn>,
}

impl Context {
    /// Creates a version 1 context for `code`.
    pub fn new(code: Vec<u8>) -> Self {
        Self {
            vm_version: 1,
            code,
            ..Self::default()
        }
    }

    /// Whether expansion opcodes are hard failures for this transaction.
    pub fn expansion_reserved(&self) -> bool {
        self.tx_version == Some(1)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("vm_version", &self.vm_version)
            .field("code", &hex::encode(&self.code))
            .field("arguments", &self.arguments.len())
            .field("entry_id", &self.entry_id)
            .field("tx_version", &self.tx_version)
            .field("block_height", &self.block_height)
            .field("amount", &self.amount)
            .field("dest_pos", &self.dest_pos)
            .finish_non_exhaustive()
    }
}
