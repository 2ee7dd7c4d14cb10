//! Covenant clause compiler.
//!
//! Both clauses of a swap use the same three-part template, evaluated against
//! the output at `output_index` of the spending transaction:
//!
//! ```text
//! <index> OP_INSPECTOUTPUTSCRIPTPUBKEY <version> OP_EQUALVERIFY <program> OP_EQUALVERIFY
//! <index> OP_INSPECTOUTPUTASSET OP_DROP <asset> OP_EQUALVERIFY
//! <index> OP_INSPECTOUTPUTVALUE OP_DROP <amount_le64> OP_EQUAL
//! ```
//!
//! The fulfill clause pins the asset the trader buys; the refund clause pins
//! the asset the trader sold. The clauses differ only in their arguments.

use lwk_wollet::elements::{AssetId, Script};
use lwk_wollet::elements::opcodes::{self, all::OP_DROP, all::OP_EQUAL, all::OP_EQUALVERIFY};
use lwk_wollet::elements::script::Builder;

use crate::asset::asset_push_bytes;
use crate::error::{Error, Result};

// Elements introspection opcodes.
pub const OP_INSPECTOUTPUTASSET: u8 = 0xce;
pub const OP_INSPECTOUTPUTVALUE: u8 = 0xcf;
pub const OP_INSPECTOUTPUTSCRIPTPUBKEY: u8 = 0xd1;

/// The output every covenant clause inspects.
pub const SETTLEMENT_OUTPUT_INDEX: u32 = 0;

const MIN_PROGRAM_LEN: usize = 2;
const MAX_PROGRAM_LEN: usize = 40;

/// Witness version of a recipient script, as seen through its leading byte.
///
/// Only the three versions pushed by `OP_INSPECTOUTPUTSCRIPTPUBKEY` for
/// outputs the engine settles to are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WitnessVersion {
    /// Leading byte `0x00`.
    V0,
    /// Leading byte `0x51` (Taproot).
    V1,
    /// Leading byte `0x4f`. Non-segwit scripts introspect as version -1.
    Legacy,
}

impl WitnessVersion {
    pub fn from_leading_byte(byte: u8) -> Result<Self> {
        match byte {
            0x00 => Ok(WitnessVersion::V0),
            0x51 => Ok(WitnessVersion::V1),
            0x4f => Ok(WitnessVersion::Legacy),
            other => Err(Error::ScriptCompile(format!(
                "unsupported witness version byte 0x{other:02x}"
            ))),
        }
    }

    /// The script number pushed for this version.
    pub fn number(self) -> i64 {
        match self {
            WitnessVersion::V0 => 0,
            WitnessVersion::V1 => 1,
            WitnessVersion::Legacy => -1,
        }
    }

    pub fn leading_byte(self) -> u8 {
        match self {
            WitnessVersion::V0 => 0x00,
            WitnessVersion::V1 => 0x51,
            WitnessVersion::Legacy => 0x4f,
        }
    }
}

/// Split `<version byte> <push length> <program>` into its parts.
pub fn split_recipient_script(script: &[u8]) -> Result<(WitnessVersion, &[u8])> {
    let (&version_byte, rest) = script
        .split_first()
        .ok_or_else(|| Error::ScriptCompile("recipient script is empty".into()))?;
    let version = WitnessVersion::from_leading_byte(version_byte)?;

    let (&push_len, program) = rest.split_first().ok_or_else(|| {
        Error::ScriptCompile("recipient script has no witness program".into())
    })?;
    if usize::from(push_len) != program.len() {
        return Err(Error::ScriptCompile(format!(
            "witness program push of {push_len} bytes does not match the {} bytes that follow",
            program.len()
        )));
    }
    if !(MIN_PROGRAM_LEN..=MAX_PROGRAM_LEN).contains(&program.len()) {
        return Err(Error::ScriptCompile(format!(
            "witness program must be {MIN_PROGRAM_LEN} to {MAX_PROGRAM_LEN} bytes, got {}",
            program.len()
        )));
    }
    Ok((version, program))
}

/// Compile the clause that releases the funding output to the trader.
pub fn compile_fulfill_clause(
    output_index: u32,
    version: WitnessVersion,
    program: &[u8],
    amount: u64,
    asset: &AssetId,
) -> Script {
    compile_clause(output_index, version, program, amount, asset)
}

/// Compile the clause that returns the funded asset to the trader.
pub fn compile_refund_clause(
    output_index: u32,
    version: WitnessVersion,
    program: &[u8],
    amount: u64,
    asset: &AssetId,
) -> Script {
    compile_clause(output_index, version, program, amount, asset)
}

/// Fulfill clause for a full recipient script, checked at output 0.
pub fn fulfill_script(recipient: &Script, amount: u64, asset: &AssetId) -> Result<Script> {
    let (version, program) = split_recipient_script(recipient.as_bytes())?;
    Ok(compile_fulfill_clause(
        SETTLEMENT_OUTPUT_INDEX,
        version,
        program,
        amount,
        asset,
    ))
}

/// Refund clause for a full recipient script, checked at output 0.
pub fn refund_script(recipient: &Script, amount: u64, asset: &AssetId) -> Result<Script> {
    let (version, program) = split_recipient_script(recipient.as_bytes())?;
    Ok(compile_refund_clause(
        SETTLEMENT_OUTPUT_INDEX,
        version,
        program,
        amount,
        asset,
    ))
}

fn compile_clause(
    output_index: u32,
    version: WitnessVersion,
    program: &[u8],
    amount: u64,
    asset: &AssetId,
) -> Script {
    let index = i64::from(output_index);
    Builder::new()
        .push_int(index)
        .push_opcode(opcodes::All::from(OP_INSPECTOUTPUTSCRIPTPUBKEY))
        .push_int(version.number())
        .push_opcode(OP_EQUALVERIFY)
        .push_slice(program)
        .push_opcode(OP_EQUALVERIFY)
        .push_int(index)
        .push_opcode(opcodes::All::from(OP_INSPECTOUTPUTASSET))
        .push_opcode(OP_DROP)
        .push_slice(&asset_push_bytes(asset))
        .push_opcode(OP_EQUALVERIFY)
        .push_int(index)
        .push_opcode(opcodes::All::from(OP_INSPECTOUTPUTVALUE))
        .push_opcode(OP_DROP)
        .push_slice(&amount.to_le_bytes())
        .push_opcode(OP_EQUAL)
        .into_script()
}
