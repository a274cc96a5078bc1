// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Interactive transaction construction (BOLT 2 `tx_add_*`, `tx_remove_*` and `tx_complete`).
//!
//! The `validate_*` functions check one message received from the counterparty against the
//! current state of the negotiation, which they see through [`NegotiationContext`]. They do not
//! change anything. [`InteractiveTxNegotiation`] keeps that state, applies the messages which
//! pass, and tracks the `tx_complete` exchange until both sides agree on the transaction.
//!
//! Every failure here is scoped to the negotiation: the caller sends the peer a `tx_abort` (see
//! [`AbortReason::into_tx_abort_msg`]) and the connection stays up.

use core::fmt;
use core::ops::Deref;

use bitcoin::absolute::LockTime;
use bitcoin::blockdata::constants::WITNESS_SCALE_FACTOR;
use bitcoin::script::{Script, ScriptBuf};
use bitcoin::transaction::Version;
use bitcoin::{OutPoint, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::ln::msgs;
use crate::ln::types::ChannelId;
use crate::prelude::*;
use crate::util::config::InteractiveTxConfig;
use crate::util::errors::{ErrorAction, LightningError};
use crate::util::logger::{Logger, WithContext};

/// The dust limit applied to contributed outputs unless configured otherwise.
pub const DEFAULT_DUST_LIMIT_SATOSHIS: u64 = 546;

/// The number of inputs or outputs that the state machine can have, before it MUST fail the
/// negotiation.
pub const MAX_INPUTS_OUTPUTS_COUNT: usize = 252;

/// The total amount of bitcoin which can ever exist, in satoshis.
pub const MAX_MONEY_SATOSHIS: u64 = 21_000_000 * 100_000_000;

/// Transactions heavier than this are not relayed.
pub const MAX_STANDARD_TX_WEIGHT: u64 = 400_000;

/// The number of received `tx_add_input` messages during a negotiation at which point the
/// negotiation MUST be failed.
const MAX_RECEIVED_TX_ADD_INPUT_COUNT: u16 = 4096;

/// The number of received `tx_add_output` messages during a negotiation at which point the
/// negotiation MUST be failed.
const MAX_RECEIVED_TX_ADD_OUTPUT_COUNT: u16 = 4096;

/// The weight of the fields every transaction has, paid for by the initiator.
pub const TX_COMMON_FIELDS_WEIGHT: u64 = (4 /* version */ + 4 /* locktime */ + 1 /* input count */ +
	1 /* output count */) * WITNESS_SCALE_FACTOR as u64 + 2 /* segwit marker + flag */;

const BASE_INPUT_WEIGHT: u64 = (32 /* txid */ + 4 /* vout */ + 4 /* sequence */ +
	1 /* empty script_sig */) * WITNESS_SCALE_FACTOR as u64;

const P2WPKH_WITNESS_WEIGHT: u64 = 1 /* num stack items */ + 1 /* sig length */ +
	73 /* sig including sighash flag */ + 1 /* pubkey length */ + 33 /* pubkey */;

const P2TR_KEY_PATH_WITNESS_WEIGHT: u64 = 1 /* num stack items */ + 1 /* sig length */ +
	64 /* sig with default sighash */;

/// Identifies an input or output within one negotiation. Even ids were added by the initiator,
/// odd ones by the non-initiator.
pub type SerialId = u64;

trait SerialIdExt {
	fn is_for_initiator(&self) -> bool;
	fn is_for_non_initiator(&self) -> bool;
}

impl SerialIdExt for SerialId {
	fn is_for_initiator(&self) -> bool {
		self % 2 == 0
	}

	fn is_for_non_initiator(&self) -> bool {
		!self.is_for_initiator()
	}
}

/// The weight an input spending `prev_output` is expected to add once signed.
///
/// Witnesses we cannot predict are assumed to be as small as a P2WPKH one, which makes this a
/// lower bound for P2WSH spends.
pub fn estimate_input_weight(prev_output: &TxOut) -> u64 {
	let witness_weight = if prev_output.script_pubkey.is_p2tr() {
		P2TR_KEY_PATH_WITNESS_WEIGHT
	} else {
		P2WPKH_WITNESS_WEIGHT
	};
	BASE_INPUT_WEIGHT + witness_weight
}

/// The weight of an output paying to `script_pubkey`.
pub fn get_output_weight(script_pubkey: &Script) -> u64 {
	let script_len = script_pubkey.len() as u64;
	let script_len_prefix = match script_len {
		0..=0xfc => 1,
		0xfd..=0xffff => 3,
		_ => 5,
	};
	(8 /* value */ + script_len_prefix + script_len) * WITNESS_SCALE_FACTOR as u64
}

/// Whether we accept an output paying to `script_pubkey`: P2WPKH, P2WSH and P2TR.
pub fn is_standard_output_script(script_pubkey: &Script) -> bool {
	script_pubkey.is_p2wpkh() || script_pubkey.is_p2wsh() || script_pubkey.is_p2tr()
}

/// Why an interactive transaction negotiation was aborted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
	/// The counterparty sent `tx_abort`.
	CounterpartyAborted,
	/// An unconfirmed input was added although confirmed inputs were required.
	InputsNotConfirmed,
	/// The counterparty sent more than 4096 `tx_add_input` messages.
	ReceivedTooManyTxAddInputs,
	/// The counterparty sent more than 4096 `tx_add_output` messages.
	ReceivedTooManyTxAddOutputs,
	/// An input's sequence does not signal RBF.
	IncorrectInputSequenceValue,
	/// A serial id has the parity of the other side.
	IncorrectSerialIdParity,
	/// A removal referenced a serial id which is not in the transaction.
	SerialIdUnknown,
	/// A serial id is already in the transaction.
	DuplicateSerialId,
	/// The output an input spends does not exist or is not a witness program.
	PrevTxOutInvalid,
	/// The output an input spends is already spent by another input.
	DuplicatePrevTxOut,
	/// The output an input spends is larger than all the bitcoin there can ever be.
	PrevTxOutValueTooLarge,
	/// An output is larger than all the bitcoin there can ever be.
	ExceededMaximumSatsAllowed,
	/// The transaction would have more than 252 inputs or outputs.
	ExceededNumberOfInputsOrOutputs,
	/// A message arrived after the negotiation completed or was aborted.
	InvalidTransactionState,
	/// The transaction would be heavier than standardness allows.
	TransactionTooLarge,
	/// An output is below the dust limit.
	BelowDustLimit,
	/// An output's script is non-standard.
	InvalidOutputScript,
	/// The counterparty's contribution does not pay the agreed feerate.
	InsufficientFees,
	/// The counterparty's outputs and funding contribution exceed their inputs.
	OutputsExceedInputs,
}

impl fmt::Display for AbortReason {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(match self {
			AbortReason::CounterpartyAborted => "Counterparty sent tx_abort",
			AbortReason::InputsNotConfirmed => "Received unconfirmed input while confirmed inputs are required",
			AbortReason::ReceivedTooManyTxAddInputs => "Too many tx_add_input messages",
			AbortReason::ReceivedTooManyTxAddOutputs => "Too many tx_add_output messages",
			AbortReason::IncorrectInputSequenceValue => "Input sequence must be below 0xfffffffe",
			AbortReason::IncorrectSerialIdParity => "Serial id has the wrong parity",
			AbortReason::SerialIdUnknown => "No input or output with that serial id",
			AbortReason::DuplicateSerialId => "Serial id already in use",
			AbortReason::PrevTxOutInvalid => "Spent output does not exist or is not a witness program",
			AbortReason::DuplicatePrevTxOut => "Spent output is already spent by another input",
			AbortReason::PrevTxOutValueTooLarge => "Spent output amount exceeds the total bitcoin supply",
			AbortReason::ExceededMaximumSatsAllowed => "Output amount exceeds the total bitcoin supply",
			AbortReason::ExceededNumberOfInputsOrOutputs => "Too many inputs or outputs",
			AbortReason::InvalidTransactionState => "Negotiation is no longer accepting messages",
			AbortReason::TransactionTooLarge => "Transaction weight exceeds the standard maximum",
			AbortReason::BelowDustLimit => "Output amount is below the dust limit",
			AbortReason::InvalidOutputScript => "Output script is non-standard",
			AbortReason::InsufficientFees => "Contribution does not pay the agreed feerate",
			AbortReason::OutputsExceedInputs => "Outputs and funding contribution exceed inputs",
		})
	}
}

impl std::error::Error for AbortReason {}

impl AbortReason {
	/// The `tx_abort` telling the counterparty why we gave up on the negotiation.
	pub fn into_tx_abort_msg(self, channel_id: ChannelId) -> msgs::TxAbort {
		msgs::TxAbort { channel_id, data: self.to_string().into_bytes() }
	}

	/// The error to hand to the connection owner: abort the negotiation, keep the peer.
	pub fn into_lightning_error(self, channel_id: ChannelId) -> LightningError {
		LightningError {
			err: self.to_string(),
			action: ErrorAction::AbortNegotiation { msg: self.into_tx_abort_msg(channel_id) },
		}
	}
}

/// The view of an ongoing negotiation the validators need.
pub trait NegotiationContext {
	/// Whether we initiated the negotiation, which makes the counterparty's serial ids odd.
	fn holder_is_initiator(&self) -> bool;
	/// Outputs below this many satoshis are rejected.
	fn dust_limit_satoshis(&self) -> u64;
	/// The number of inputs currently in the transaction, from both sides.
	fn input_count(&self) -> usize;
	/// The number of outputs currently in the transaction, from both sides.
	fn output_count(&self) -> usize;
	/// Whether an input with `serial_id` is currently in the transaction.
	fn has_input(&self, serial_id: SerialId) -> bool;
	/// Whether an output with `serial_id` is currently in the transaction.
	fn has_output(&self, serial_id: SerialId) -> bool;
	/// Whether an input currently in the transaction already spends `outpoint`.
	fn spends_outpoint(&self, outpoint: &OutPoint) -> bool;
}

fn is_valid_counterparty_serial_id<C: NegotiationContext + ?Sized>(context: &C, serial_id: SerialId) -> bool {
	// A received `SerialId`'s parity must match the role of the counterparty.
	context.holder_is_initiator() == serial_id.is_for_non_initiator()
}

/// An input which passed [`validate_tx_add_input`], with the output it spends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedInput {
	/// The input's serial id.
	pub serial_id: SerialId,
	/// The input, without a witness.
	pub input: TxIn,
	/// The output being spent.
	pub prev_output: TxOut,
}

/// Checks a received `tx_add_input`.
///
/// The serial id must have the counterparty's parity and be new. The spent output must exist,
/// be a witness program worth at most [`MAX_MONEY_SATOSHIS`] and not be spent by another input.
/// The transaction must have room for one more input.
pub fn validate_tx_add_input<C: NegotiationContext + ?Sized>(
	context: &C, msg: &msgs::TxAddInput,
) -> Result<ValidatedInput, AbortReason> {
	if !is_valid_counterparty_serial_id(context, msg.serial_id) {
		return Err(AbortReason::IncorrectSerialIdParity);
	}
	if context.has_input(msg.serial_id) {
		return Err(AbortReason::DuplicateSerialId);
	}
	if msg.sequence >= 0xFFFFFFFE {
		return Err(AbortReason::IncorrectInputSequenceValue);
	}

	let prevtx = msg.prevtx.as_transaction();
	let prev_output = match prevtx.output.get(msg.prevtx_out as usize) {
		Some(tx_out) if tx_out.script_pubkey.is_witness_program() => tx_out.clone(),
		_ => return Err(AbortReason::PrevTxOutInvalid),
	};
	if prev_output.value.to_sat() > MAX_MONEY_SATOSHIS {
		return Err(AbortReason::PrevTxOutValueTooLarge);
	}
	let previous_output = OutPoint { txid: prevtx.compute_txid(), vout: msg.prevtx_out };
	if context.spends_outpoint(&previous_output) {
		return Err(AbortReason::DuplicatePrevTxOut);
	}

	if context.input_count() >= MAX_INPUTS_OUTPUTS_COUNT {
		return Err(AbortReason::ExceededNumberOfInputsOrOutputs);
	}

	Ok(ValidatedInput {
		serial_id: msg.serial_id,
		input: TxIn {
			previous_output,
			script_sig: ScriptBuf::new(),
			sequence: Sequence(msg.sequence),
			witness: Witness::new(),
		},
		prev_output,
	})
}

/// Checks a received `tx_add_output`.
///
/// The serial id must have the counterparty's parity and be new, the transaction must have room
/// for one more output, the amount must lie between the dust limit and [`MAX_MONEY_SATOSHIS`]
/// and `is_standard` must accept the script.
pub fn validate_tx_add_output<C: NegotiationContext + ?Sized, F: Fn(&Script) -> bool>(
	context: &C, msg: &msgs::TxAddOutput, is_standard: F,
) -> Result<TxOut, AbortReason> {
	if !is_valid_counterparty_serial_id(context, msg.serial_id) {
		return Err(AbortReason::IncorrectSerialIdParity);
	}
	if context.has_output(msg.serial_id) {
		return Err(AbortReason::DuplicateSerialId);
	}
	if context.output_count() >= MAX_INPUTS_OUTPUTS_COUNT {
		return Err(AbortReason::ExceededNumberOfInputsOrOutputs);
	}
	if msg.sats < context.dust_limit_satoshis() {
		return Err(AbortReason::BelowDustLimit);
	}
	if msg.sats > MAX_MONEY_SATOSHIS {
		return Err(AbortReason::ExceededMaximumSatsAllowed);
	}
	if !is_standard(&msg.script) {
		return Err(AbortReason::InvalidOutputScript);
	}
	Ok(TxOut { value: bitcoin::Amount::from_sat(msg.sats), script_pubkey: msg.script.clone() })
}

/// Checks a received `tx_remove_input`: the serial id must be the counterparty's and in use.
pub fn validate_tx_remove_input<C: NegotiationContext + ?Sized>(
	context: &C, msg: &msgs::TxRemoveInput,
) -> Result<(), AbortReason> {
	if !is_valid_counterparty_serial_id(context, msg.serial_id) {
		return Err(AbortReason::IncorrectSerialIdParity);
	}
	if !context.has_input(msg.serial_id) {
		return Err(AbortReason::SerialIdUnknown);
	}
	Ok(())
}

/// Checks a received `tx_remove_output`: the serial id must be the counterparty's and in use.
pub fn validate_tx_remove_output<C: NegotiationContext + ?Sized>(
	context: &C, msg: &msgs::TxRemoveOutput,
) -> Result<(), AbortReason> {
	if !is_valid_counterparty_serial_id(context, msg.serial_id) {
		return Err(AbortReason::IncorrectSerialIdParity);
	}
	if !context.has_output(msg.serial_id) {
		return Err(AbortReason::SerialIdUnknown);
	}
	Ok(())
}

/// What the counterparty put into the transaction, as checked by [`validate_tx_complete`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContributionSummary {
	/// The value of the outputs spent by their inputs.
	pub inputs_sat: u64,
	/// The value of their outputs.
	pub outputs_sat: u64,
	/// What they pay into a shared output they did not add themselves.
	pub funding_contribution_sat: u64,
	/// The expected weight of their inputs and outputs, plus the common fields if they initiated.
	pub weight: u64,
	/// The number of inputs in the whole transaction.
	pub total_input_count: usize,
	/// The number of outputs in the whole transaction.
	pub total_output_count: usize,
	/// The expected weight of the whole transaction once signed.
	pub total_weight: u64,
}

/// Checks the transaction as a whole once the counterparty sent `tx_complete`.
///
/// Their inputs must cover their outputs and funding contribution, with enough left over to pay
/// `feerate_sat_per_kw` on the weight they added. The transaction must also stay within the
/// input, output and weight maxima.
pub fn validate_tx_complete(
	contribution: &ContributionSummary, feerate_sat_per_kw: u32,
) -> Result<(), AbortReason> {
	let spent_sat = contribution.outputs_sat.saturating_add(contribution.funding_contribution_sat);
	if contribution.inputs_sat < spent_sat {
		return Err(AbortReason::OutputsExceedInputs);
	}

	let fee_paid_sat = contribution.inputs_sat - spent_sat;
	let required_fee_sat = (feerate_sat_per_kw as u64).saturating_mul(contribution.weight) / 1000;
	if fee_paid_sat < required_fee_sat {
		return Err(AbortReason::InsufficientFees);
	}

	if contribution.total_input_count > MAX_INPUTS_OUTPUTS_COUNT
		|| contribution.total_output_count > MAX_INPUTS_OUTPUTS_COUNT
	{
		return Err(AbortReason::ExceededNumberOfInputsOrOutputs);
	}

	if contribution.total_weight > MAX_STANDARD_TX_WEIGHT {
		return Err(AbortReason::TransactionTooLarge);
	}
	Ok(())
}

//                   Interactive Transaction Construction negotiation
//                           from the perspective of a holder
//
//        (sent/received) tx_add_*/tx_remove_* from any state but the last two
//        returns to Negotiating.
//
//                       sent tx_complete     ┌───────────────┐   received tx_complete
//                  ┌────────────────────────►│ OurTxComplete ├───────────────────────┐
//                  │                         └───────────────┘                       ▼
//           ┌──────┴──────┐                                               ┌─────────────────────┐
//           │ Negotiating │                                               │ NegotiationComplete │
//           └──────┬──────┘                                               └─────────────────────┘
//                  │                        ┌─────────────────┐                      ▲
//                  └───────────────────────►│ TheirTxComplete ├──────────────────────┘
//                   received tx_complete    └─────────────────┘    sent tx_complete
//
//        Any validation failure, or a tx_abort either way, ends in NegotiationAborted.

/// Where an [`InteractiveTxNegotiation`] stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationState {
	/// Inputs and outputs are being added and removed.
	Negotiating,
	/// We sent `tx_complete` and are awaiting the counterparty's.
	OurTxComplete,
	/// The counterparty sent `tx_complete` and is awaiting ours.
	TheirTxComplete,
	/// Both sides sent consecutive `tx_complete` messages. The transaction is final.
	NegotiationComplete,
	/// The negotiation failed and cannot be continued.
	NegotiationAborted(AbortReason),
}

#[derive(Clone, Debug)]
struct TxInputWithPrevOutput {
	input: TxIn,
	prev_output: TxOut,
}

/// The state of one interactive transaction negotiation with a counterparty.
///
/// Messages we send go through the `send_*` methods, which trust their input. Messages we receive
/// go through the `receive_*` methods, which validate them first. Any failure moves the
/// negotiation to [`NegotiationState::NegotiationAborted`] and every later message is refused.
pub struct InteractiveTxNegotiation<L: Deref>
where
	L::Target: Logger,
{
	channel_id: ChannelId,
	holder_is_initiator: bool,
	require_confirmed_inputs: bool,
	dust_limit_satoshis: u64,
	feerate_sat_per_kw: u32,
	counterparty_funding_contribution_sat: u64,
	lock_time: LockTime,
	received_tx_add_input_count: u16,
	received_tx_add_output_count: u16,
	inputs: HashMap<SerialId, TxInputWithPrevOutput>,
	prevtx_outpoints: HashSet<OutPoint>,
	outputs: HashMap<SerialId, TxOut>,
	state: NegotiationState,
	logger: L,
}

impl<L: Deref> NegotiationContext for InteractiveTxNegotiation<L>
where
	L::Target: Logger,
{
	fn holder_is_initiator(&self) -> bool {
		self.holder_is_initiator
	}

	fn dust_limit_satoshis(&self) -> u64 {
		self.dust_limit_satoshis
	}

	fn input_count(&self) -> usize {
		self.inputs.len()
	}

	fn output_count(&self) -> usize {
		self.outputs.len()
	}

	fn has_input(&self, serial_id: SerialId) -> bool {
		self.inputs.contains_key(&serial_id)
	}

	fn has_output(&self, serial_id: SerialId) -> bool {
		self.outputs.contains_key(&serial_id)
	}

	fn spends_outpoint(&self, outpoint: &OutPoint) -> bool {
		self.prevtx_outpoints.contains(outpoint)
	}
}

impl<L: Deref> InteractiveTxNegotiation<L>
where
	L::Target: Logger,
{
	/// Starts a negotiation for `channel_id`.
	///
	/// `counterparty_funding_contribution_sat` is what the counterparty agreed to pay into an
	/// output we add, which their inputs must cover on top of their own outputs.
	pub fn new(
		channel_id: ChannelId, holder_is_initiator: bool, feerate_sat_per_kw: u32,
		counterparty_funding_contribution_sat: u64, lock_time: LockTime,
		config: &InteractiveTxConfig, logger: L,
	) -> Self {
		Self {
			channel_id,
			holder_is_initiator,
			require_confirmed_inputs: config.require_confirmed_inputs,
			dust_limit_satoshis: config.dust_limit_satoshis,
			feerate_sat_per_kw,
			counterparty_funding_contribution_sat,
			lock_time,
			received_tx_add_input_count: 0,
			received_tx_add_output_count: 0,
			inputs: new_hash_map(),
			prevtx_outpoints: new_hash_set(),
			outputs: new_hash_map(),
			state: NegotiationState::Negotiating,
			logger,
		}
	}

	/// The channel being negotiated for.
	pub fn channel_id(&self) -> ChannelId {
		self.channel_id
	}

	/// Where the negotiation stands.
	pub fn state(&self) -> NegotiationState {
		self.state
	}

	/// Whether both sides sent `tx_complete`.
	pub fn is_complete(&self) -> bool {
		self.state == NegotiationState::NegotiationComplete
	}

	fn abort(&mut self, reason: AbortReason) -> AbortReason {
		let logger = WithContext::from(&self.logger, None, Some(self.channel_id));
		log_debug!(logger, "Aborting interactive transaction negotiation: {}", reason);
		self.state = NegotiationState::NegotiationAborted(reason);
		reason
	}

	fn check_accepting_changes(&mut self) -> Result<(), AbortReason> {
		match self.state {
			NegotiationState::NegotiationAborted(_) => Err(AbortReason::InvalidTransactionState),
			NegotiationState::NegotiationComplete => Err(self.abort(AbortReason::InvalidTransactionState)),
			_ => Ok(()),
		}
	}

	/// Applies a `tx_add_input` from the counterparty. `prevtx_confirmed` tells whether the spent
	/// transaction is confirmed, which matters when confirmed inputs are required.
	pub fn receive_tx_add_input(
		&mut self, msg: &msgs::TxAddInput, prevtx_confirmed: bool,
	) -> Result<(), AbortReason> {
		self.check_accepting_changes()?;
		self.received_tx_add_input_count += 1;
		if self.received_tx_add_input_count > MAX_RECEIVED_TX_ADD_INPUT_COUNT {
			return Err(self.abort(AbortReason::ReceivedTooManyTxAddInputs));
		}
		if self.require_confirmed_inputs && !prevtx_confirmed {
			return Err(self.abort(AbortReason::InputsNotConfirmed));
		}
		let validated = validate_tx_add_input(&*self, msg).map_err(|reason| self.abort(reason))?;
		self.prevtx_outpoints.insert(validated.input.previous_output);
		self.inputs.insert(
			validated.serial_id,
			TxInputWithPrevOutput { input: validated.input, prev_output: validated.prev_output },
		);
		self.state = NegotiationState::Negotiating;
		Ok(())
	}

	/// Applies a `tx_add_output` from the counterparty.
	pub fn receive_tx_add_output(&mut self, msg: &msgs::TxAddOutput) -> Result<(), AbortReason> {
		self.check_accepting_changes()?;
		self.received_tx_add_output_count += 1;
		if self.received_tx_add_output_count > MAX_RECEIVED_TX_ADD_OUTPUT_COUNT {
			return Err(self.abort(AbortReason::ReceivedTooManyTxAddOutputs));
		}
		let output = validate_tx_add_output(&*self, msg, is_standard_output_script)
			.map_err(|reason| self.abort(reason))?;
		self.outputs.insert(msg.serial_id, output);
		self.state = NegotiationState::Negotiating;
		Ok(())
	}

	/// Applies a `tx_remove_input` from the counterparty.
	pub fn receive_tx_remove_input(&mut self, msg: &msgs::TxRemoveInput) -> Result<(), AbortReason> {
		self.check_accepting_changes()?;
		validate_tx_remove_input(&*self, msg).map_err(|reason| self.abort(reason))?;
		if let Some(input) = self.inputs.remove(&msg.serial_id) {
			self.prevtx_outpoints.remove(&input.input.previous_output);
		}
		self.state = NegotiationState::Negotiating;
		Ok(())
	}

	/// Applies a `tx_remove_output` from the counterparty.
	pub fn receive_tx_remove_output(&mut self, msg: &msgs::TxRemoveOutput) -> Result<(), AbortReason> {
		self.check_accepting_changes()?;
		validate_tx_remove_output(&*self, msg).map_err(|reason| self.abort(reason))?;
		self.outputs.remove(&msg.serial_id);
		self.state = NegotiationState::Negotiating;
		Ok(())
	}

	/// Records an input we are about to send in a `tx_add_input`.
	pub fn send_tx_add_input(
		&mut self, serial_id: SerialId, input: TxIn, prev_output: TxOut,
	) -> Result<(), AbortReason> {
		self.check_accepting_changes()?;
		debug_assert_eq!(serial_id.is_for_initiator(), self.holder_is_initiator);
		self.prevtx_outpoints.insert(input.previous_output);
		self.inputs.insert(serial_id, TxInputWithPrevOutput { input, prev_output });
		self.state = NegotiationState::Negotiating;
		Ok(())
	}

	/// Records an output we are about to send in a `tx_add_output`.
	pub fn send_tx_add_output(&mut self, serial_id: SerialId, output: TxOut) -> Result<(), AbortReason> {
		self.check_accepting_changes()?;
		debug_assert_eq!(serial_id.is_for_initiator(), self.holder_is_initiator);
		self.outputs.insert(serial_id, output);
		self.state = NegotiationState::Negotiating;
		Ok(())
	}

	/// Records an input we are about to remove with a `tx_remove_input`.
	pub fn send_tx_remove_input(&mut self, serial_id: SerialId) -> Result<(), AbortReason> {
		self.check_accepting_changes()?;
		if let Some(input) = self.inputs.remove(&serial_id) {
			self.prevtx_outpoints.remove(&input.input.previous_output);
		}
		self.state = NegotiationState::Negotiating;
		Ok(())
	}

	/// Records an output we are about to remove with a `tx_remove_output`.
	pub fn send_tx_remove_output(&mut self, serial_id: SerialId) -> Result<(), AbortReason> {
		self.check_accepting_changes()?;
		self.outputs.remove(&serial_id);
		self.state = NegotiationState::Negotiating;
		Ok(())
	}

	fn counterparty_contribution(&self) -> Result<ContributionSummary, AbortReason> {
		let counterparty_is_initiator = !self.holder_is_initiator;
		let mut contribution = ContributionSummary {
			funding_contribution_sat: self.counterparty_funding_contribution_sat,
			total_input_count: self.inputs.len(),
			total_output_count: self.outputs.len(),
			total_weight: TX_COMMON_FIELDS_WEIGHT,
			..Default::default()
		};
		if counterparty_is_initiator {
			contribution.weight += TX_COMMON_FIELDS_WEIGHT;
		}
		for (serial_id, input) in self.inputs.iter() {
			let weight = estimate_input_weight(&input.prev_output);
			contribution.total_weight += weight;
			if serial_id.is_for_initiator() == counterparty_is_initiator {
				contribution.inputs_sat = contribution.inputs_sat
					.checked_add(input.prev_output.value.to_sat())
					.ok_or(AbortReason::ExceededMaximumSatsAllowed)?;
				contribution.weight += weight;
			}
		}
		for (serial_id, output) in self.outputs.iter() {
			let weight = get_output_weight(&output.script_pubkey);
			contribution.total_weight += weight;
			if serial_id.is_for_initiator() == counterparty_is_initiator {
				contribution.outputs_sat = contribution.outputs_sat
					.checked_add(output.value.to_sat())
					.ok_or(AbortReason::ExceededMaximumSatsAllowed)?;
				contribution.weight += weight;
			}
		}
		if contribution.inputs_sat > MAX_MONEY_SATOSHIS || contribution.outputs_sat > MAX_MONEY_SATOSHIS {
			return Err(AbortReason::ExceededMaximumSatsAllowed);
		}
		Ok(contribution)
	}

	fn check_transaction(&mut self) -> Result<(), AbortReason> {
		let res = self.counterparty_contribution()
			.and_then(|contribution| validate_tx_complete(&contribution, self.feerate_sat_per_kw));
		res.map_err(|reason| self.abort(reason))
	}

	/// Applies a `tx_complete` from the counterparty. Returns whether the negotiation is now
	/// complete, which is the case if we sent ours last.
	pub fn receive_tx_complete(&mut self) -> Result<bool, AbortReason> {
		match self.state {
			NegotiationState::Negotiating => {
				self.check_transaction()?;
				self.state = NegotiationState::TheirTxComplete;
			},
			NegotiationState::OurTxComplete => {
				self.check_transaction()?;
				self.state = NegotiationState::NegotiationComplete;
			},
			NegotiationState::TheirTxComplete => {},
			NegotiationState::NegotiationComplete | NegotiationState::NegotiationAborted(_) => {
				self.check_accepting_changes()?;
			},
		}
		Ok(self.is_complete())
	}

	/// Records our `tx_complete`. Returns whether the negotiation is now complete, which is the
	/// case if the counterparty sent theirs last.
	pub fn send_tx_complete(&mut self) -> Result<bool, AbortReason> {
		match self.state {
			NegotiationState::Negotiating => self.state = NegotiationState::OurTxComplete,
			NegotiationState::TheirTxComplete => {
				self.check_transaction()?;
				self.state = NegotiationState::NegotiationComplete;
			},
			NegotiationState::OurTxComplete => {},
			NegotiationState::NegotiationComplete | NegotiationState::NegotiationAborted(_) => {
				self.check_accepting_changes()?;
			},
		}
		Ok(self.is_complete())
	}

	/// Handles a `tx_abort` from the counterparty.
	pub fn receive_tx_abort(&mut self, msg: &msgs::TxAbort) {
		let logger = WithContext::from(&self.logger, None, Some(self.channel_id));
		log_info!(logger, "Counterparty aborted interactive transaction negotiation: {}",
			String::from_utf8_lossy(&msg.data));
		self.state = NegotiationState::NegotiationAborted(AbortReason::CounterpartyAborted);
	}

	/// Gives up on the negotiation ourselves, returning the `tx_abort` to send.
	pub fn abort_negotiation(&mut self, reason: AbortReason) -> msgs::TxAbort {
		self.abort(reason).into_tx_abort_msg(self.channel_id)
	}

	/// The negotiated transaction, with inputs and outputs ordered by serial id, once both sides
	/// sent `tx_complete`. Witnesses are left empty.
	pub fn build_transaction(&self) -> Result<Transaction, AbortReason> {
		if !self.is_complete() {
			return Err(AbortReason::InvalidTransactionState);
		}
		let mut inputs: Vec<_> = self.inputs.iter().collect();
		inputs.sort_unstable_by_key(|(serial_id, _)| **serial_id);
		let mut outputs: Vec<_> = self.outputs.iter().collect();
		outputs.sort_unstable_by_key(|(serial_id, _)| **serial_id);
		let tx = Transaction {
			version: Version::TWO,
			lock_time: self.lock_time,
			input: inputs.into_iter().map(|(_, input)| input.input.clone()).collect(),
			output: outputs.into_iter().map(|(_, output)| output.clone()).collect(),
		};
		let logger = WithContext::from(&self.logger, None, Some(self.channel_id));
		log_debug!(logger, "Constructed {}", log_tx!(tx));
		Ok(tx)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ln::types::ChannelId;
	use crate::util::ser::TransactionU16LenLimited;
	use crate::util::test_utils::{pubkey, TestLogger};

	use bitcoin::hashes::Hash;
	use bitcoin::{Amount, WPubkeyHash, WScriptHash, Txid};

	const CHANNEL_ID: ChannelId = ChannelId([7; 32]);

	/// Stands in for a negotiation which already holds `inputs` inputs and `outputs` outputs.
	struct FixedContext {
		holder_is_initiator: bool,
		inputs: usize,
		outputs: usize,
	}

	impl NegotiationContext for FixedContext {
		fn holder_is_initiator(&self) -> bool { self.holder_is_initiator }
		fn dust_limit_satoshis(&self) -> u64 { DEFAULT_DUST_LIMIT_SATOSHIS }
		fn input_count(&self) -> usize { self.inputs }
		fn output_count(&self) -> usize { self.outputs }
		fn has_input(&self, _serial_id: SerialId) -> bool { false }
		fn has_output(&self, _serial_id: SerialId) -> bool { false }
		fn spends_outpoint(&self, _outpoint: &OutPoint) -> bool { false }
	}

	fn p2wpkh_script(i: u8) -> ScriptBuf {
		ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&pubkey(i).serialize()))
	}

	fn prevtx(values: &[u64]) -> Transaction {
		Transaction {
			version: Version::TWO,
			lock_time: LockTime::ZERO,
			input: vec![TxIn {
				previous_output: OutPoint { txid: Txid::from_byte_array([42; 32]), vout: 0 },
				script_sig: ScriptBuf::new(),
				sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
				witness: Witness::new(),
			}],
			output: values.iter().enumerate()
				.map(|(i, value)| TxOut { value: Amount::from_sat(*value), script_pubkey: p2wpkh_script(i as u8 + 1) })
				.collect(),
		}
	}

	fn tx_add_input(serial_id: SerialId, prevtx: Transaction, prevtx_out: u32) -> msgs::TxAddInput {
		msgs::TxAddInput {
			channel_id: CHANNEL_ID,
			serial_id,
			prevtx: TransactionU16LenLimited::new(prevtx).unwrap(),
			prevtx_out,
			sequence: 0xfffffffd,
		}
	}

	fn tx_add_output(serial_id: SerialId, sats: u64) -> msgs::TxAddOutput {
		msgs::TxAddOutput { channel_id: CHANNEL_ID, serial_id, sats, script: p2wpkh_script(9) }
	}

	fn negotiation(logger: &TestLogger, holder_is_initiator: bool, feerate: u32) -> InteractiveTxNegotiation<&TestLogger> {
		InteractiveTxNegotiation::new(CHANNEL_ID, holder_is_initiator, feerate, 0, LockTime::ZERO,
			&InteractiveTxConfig::default(), logger)
	}

	#[test]
	fn serial_id_parity_is_checked() {
		let initiator_view = FixedContext { holder_is_initiator: true, inputs: 0, outputs: 0 };
		let non_initiator_view = FixedContext { holder_is_initiator: false, inputs: 0, outputs: 0 };

		// As initiator we expect odd ids from the counterparty, and even ones otherwise.
		assert_eq!(validate_tx_add_input(&initiator_view, &tx_add_input(2, prevtx(&[100_000]), 0)),
			Err(AbortReason::IncorrectSerialIdParity));
		assert!(validate_tx_add_input(&initiator_view, &tx_add_input(3, prevtx(&[100_000]), 0)).is_ok());
		assert_eq!(validate_tx_add_output(&non_initiator_view, &tx_add_output(5, 10_000), is_standard_output_script),
			Err(AbortReason::IncorrectSerialIdParity));
		assert!(validate_tx_add_output(&non_initiator_view, &tx_add_output(4, 10_000), is_standard_output_script).is_ok());

		// Parity is checked before anything else, even when the message is otherwise invalid.
		assert_eq!(validate_tx_add_output(&initiator_view, &tx_add_output(0, 1), |_| false),
			Err(AbortReason::IncorrectSerialIdParity));
		let remove_input = msgs::TxRemoveInput { channel_id: CHANNEL_ID, serial_id: 8 };
		assert_eq!(validate_tx_remove_input(&initiator_view, &remove_input), Err(AbortReason::IncorrectSerialIdParity));
		let remove_output = msgs::TxRemoveOutput { channel_id: CHANNEL_ID, serial_id: 9 };
		assert_eq!(validate_tx_remove_output(&non_initiator_view, &remove_output), Err(AbortReason::IncorrectSerialIdParity));
	}

	#[test]
	fn input_and_output_count_limits() {
		let msg = tx_add_input(1, prevtx(&[100_000]), 0);
		let below = FixedContext { holder_is_initiator: true, inputs: 251, outputs: 251 };
		let at = FixedContext { holder_is_initiator: true, inputs: 252, outputs: 252 };

		assert!(validate_tx_add_input(&below, &msg).is_ok());
		assert_eq!(validate_tx_add_input(&at, &msg), Err(AbortReason::ExceededNumberOfInputsOrOutputs));
		assert!(validate_tx_add_output(&below, &tx_add_output(1, 10_000), is_standard_output_script).is_ok());
		assert_eq!(validate_tx_add_output(&at, &tx_add_output(1, 10_000), is_standard_output_script),
			Err(AbortReason::ExceededNumberOfInputsOrOutputs));
	}

	#[test]
	fn output_amount_bounds() {
		let context = FixedContext { holder_is_initiator: true, inputs: 0, outputs: 0 };
		assert!(validate_tx_add_output(&context, &tx_add_output(1, 546), is_standard_output_script).is_ok());
		assert_eq!(validate_tx_add_output(&context, &tx_add_output(1, 545), is_standard_output_script),
			Err(AbortReason::BelowDustLimit));
		assert!(validate_tx_add_output(&context, &tx_add_output(1, MAX_MONEY_SATOSHIS), is_standard_output_script).is_ok());
		assert_eq!(validate_tx_add_output(&context, &tx_add_output(1, MAX_MONEY_SATOSHIS + 1), is_standard_output_script),
			Err(AbortReason::ExceededMaximumSatsAllowed));
	}

	#[test]
	fn output_script_standardness() {
		let context = FixedContext { holder_is_initiator: false, inputs: 0, outputs: 0 };
		let mut msg = tx_add_output(2, 10_000);
		msg.script = ScriptBuf::new_p2wsh(&WScriptHash::hash(&[1, 2, 3]));
		assert!(validate_tx_add_output(&context, &msg, is_standard_output_script).is_ok());
		msg.script = ScriptBuf::new_p2pkh(&bitcoin::PubkeyHash::hash(&pubkey(1).serialize()));
		assert_eq!(validate_tx_add_output(&context, &msg, is_standard_output_script),
			Err(AbortReason::InvalidOutputScript));
		// The caller decides what is standard.
		assert!(validate_tx_add_output(&context, &msg, |_| true).is_ok());
	}

	#[test]
	fn prevtx_output_must_exist_and_be_segwit() {
		let context = FixedContext { holder_is_initiator: true, inputs: 0, outputs: 0 };
		assert_eq!(validate_tx_add_input(&context, &tx_add_input(1, prevtx(&[100_000]), 1)),
			Err(AbortReason::PrevTxOutInvalid));

		let mut legacy = prevtx(&[100_000]);
		legacy.output[0].script_pubkey = ScriptBuf::new_p2pkh(&bitcoin::PubkeyHash::hash(&pubkey(1).serialize()));
		assert_eq!(validate_tx_add_input(&context, &tx_add_input(1, legacy, 0)), Err(AbortReason::PrevTxOutInvalid));

		let mut final_sequence = tx_add_input(1, prevtx(&[100_000]), 0);
		final_sequence.sequence = 0xfffffffe;
		assert_eq!(validate_tx_add_input(&context, &final_sequence), Err(AbortReason::IncorrectInputSequenceValue));

		let validated = validate_tx_add_input(&context, &tx_add_input(1, prevtx(&[100_000, 200_000]), 1)).unwrap();
		assert_eq!(validated.prev_output.value, Amount::from_sat(200_000));
		assert_eq!(validated.input.previous_output.vout, 1);
		assert_eq!(validated.input.sequence, Sequence(0xfffffffd));
	}

	#[test]
	fn prevtx_output_value_is_bounded() {
		let context = FixedContext { holder_is_initiator: true, inputs: 0, outputs: 0 };
		assert!(validate_tx_add_input(&context, &tx_add_input(1, prevtx(&[MAX_MONEY_SATOSHIS]), 0)).is_ok());
		assert_eq!(validate_tx_add_input(&context, &tx_add_input(1, prevtx(&[MAX_MONEY_SATOSHIS + 1]), 0)),
			Err(AbortReason::PrevTxOutValueTooLarge));
		assert_eq!(validate_tx_add_input(&context, &tx_add_input(3, prevtx(&[1, u64::MAX]), 1)),
			Err(AbortReason::PrevTxOutValueTooLarge));

		let logger = TestLogger::new();
		let mut negotiation = negotiation(&logger, true, 253);
		assert_eq!(negotiation.receive_tx_add_input(&tx_add_input(1, prevtx(&[u64::MAX]), 0), true),
			Err(AbortReason::PrevTxOutValueTooLarge));
		assert_eq!(negotiation.state(), NegotiationState::NegotiationAborted(AbortReason::PrevTxOutValueTooLarge));
	}

	#[test]
	fn contribution_totals_are_bounded() {
		let logger = TestLogger::new();
		let mut negotiation = negotiation(&logger, true, 253);
		// Each input is worth all the bitcoin there is, so together they are worth too much.
		negotiation.receive_tx_add_input(&tx_add_input(1, prevtx(&[MAX_MONEY_SATOSHIS]), 0), true).unwrap();
		negotiation.receive_tx_add_input(&tx_add_input(3, prevtx(&[1, MAX_MONEY_SATOSHIS]), 1), true).unwrap();
		assert_eq!(negotiation.receive_tx_complete(), Err(AbortReason::ExceededMaximumSatsAllowed));
		assert_eq!(negotiation.state(), NegotiationState::NegotiationAborted(AbortReason::ExceededMaximumSatsAllowed));
	}

	#[test]
	fn duplicate_serial_ids_and_outpoints() {
		let logger = TestLogger::new();
		let mut negotiation = negotiation(&logger, true, 253);
		let tx = prevtx(&[100_000, 200_000]);
		negotiation.receive_tx_add_input(&tx_add_input(1, tx.clone(), 0), true).unwrap();
		assert_eq!(negotiation.receive_tx_add_input(&tx_add_input(3, tx, 0), true),
			Err(AbortReason::DuplicatePrevTxOut));
		assert_eq!(negotiation.state(), NegotiationState::NegotiationAborted(AbortReason::DuplicatePrevTxOut));
		logger.assert_log_contains("lightning_node::ln::interactivetxs", "Aborting interactive transaction negotiation", 1);

		let mut negotiation = negotiation_with_input(&logger);
		assert_eq!(negotiation.receive_tx_add_input(&tx_add_input(1, prevtx(&[5_000]), 0), true),
			Err(AbortReason::DuplicateSerialId));
		// Nothing is accepted after an abort.
		assert_eq!(negotiation.receive_tx_add_output(&tx_add_output(5, 10_000)),
			Err(AbortReason::InvalidTransactionState));
	}

	fn negotiation_with_input(logger: &TestLogger) -> InteractiveTxNegotiation<&TestLogger> {
		let mut negotiation = negotiation(logger, true, 253);
		negotiation.receive_tx_add_input(&tx_add_input(1, prevtx(&[100_000]), 0), true).unwrap();
		negotiation
	}

	#[test]
	fn removals_need_a_known_serial_id() {
		let logger = TestLogger::new();
		let mut negotiation = negotiation_with_input(&logger);
		negotiation.receive_tx_remove_input(&msgs::TxRemoveInput { channel_id: CHANNEL_ID, serial_id: 1 }).unwrap();
		assert_eq!(negotiation.input_count(), 0);
		// The outpoint can be spent again once its input is gone.
		negotiation.receive_tx_add_input(&tx_add_input(3, prevtx(&[100_000]), 0), true).unwrap();

		assert_eq!(negotiation.receive_tx_remove_output(&msgs::TxRemoveOutput { channel_id: CHANNEL_ID, serial_id: 5 }),
			Err(AbortReason::SerialIdUnknown));
	}

	#[test]
	fn confirmed_inputs_can_be_required() {
		let logger = TestLogger::new();
		let config = InteractiveTxConfig { require_confirmed_inputs: true, ..Default::default() };
		let mut negotiation = InteractiveTxNegotiation::new(CHANNEL_ID, false, 253, 0, LockTime::ZERO, &config, &logger);
		assert_eq!(negotiation.receive_tx_add_input(&tx_add_input(0, prevtx(&[100_000]), 0), false),
			Err(AbortReason::InputsNotConfirmed));
	}

	#[test]
	fn tx_complete_checks() {
		let contribution = ContributionSummary {
			inputs_sat: 100_000,
			outputs_sat: 50_000,
			funding_contribution_sat: 40_000,
			weight: 1000,
			total_input_count: 2,
			total_output_count: 3,
			total_weight: 2000,
		};
		// 10_000 sat of fees on 1000 weight units pays up to 10_000 sat/kw.
		assert!(validate_tx_complete(&contribution, 10_000).is_ok());
		assert_eq!(validate_tx_complete(&contribution, 10_001), Err(AbortReason::InsufficientFees));

		let overspent = ContributionSummary { funding_contribution_sat: 50_001, ..contribution.clone() };
		assert_eq!(validate_tx_complete(&overspent, 0), Err(AbortReason::OutputsExceedInputs));

		let too_many = ContributionSummary { total_output_count: 253, ..contribution.clone() };
		assert_eq!(validate_tx_complete(&too_many, 0), Err(AbortReason::ExceededNumberOfInputsOrOutputs));
		let at_max = ContributionSummary { total_input_count: 252, total_output_count: 252, ..contribution.clone() };
		assert!(validate_tx_complete(&at_max, 0).is_ok());

		let too_heavy = ContributionSummary { total_weight: MAX_STANDARD_TX_WEIGHT + 1, ..contribution };
		assert_eq!(validate_tx_complete(&too_heavy, 0), Err(AbortReason::TransactionTooLarge));
	}

	#[test]
	fn negotiation_completes_after_both_tx_complete() {
		let logger = TestLogger::new();
		let mut negotiation = negotiation_with_input(&logger);
		negotiation.receive_tx_add_output(&tx_add_output(3, 90_000)).unwrap();
		negotiation.send_tx_add_output(0, TxOut { value: Amount::from_sat(50_000), script_pubkey: p2wpkh_script(3) }).unwrap();
		negotiation.send_tx_add_input(2, TxIn {
			previous_output: OutPoint { txid: Txid::from_byte_array([1; 32]), vout: 0 },
			script_sig: ScriptBuf::new(),
			sequence: Sequence(0xfffffffd),
			witness: Witness::new(),
		}, TxOut { value: Amount::from_sat(60_000), script_pubkey: p2wpkh_script(4) }).unwrap();

		assert_eq!(negotiation.send_tx_complete(), Ok(false));
		assert_eq!(negotiation.state(), NegotiationState::OurTxComplete);
		// Their 10_000 sat of fees covers 253 sat/kw on their input and output.
		assert_eq!(negotiation.receive_tx_complete(), Ok(true));
		assert!(negotiation.is_complete());

		let tx = negotiation.build_transaction().unwrap();
		// Serial id 1 is theirs, 2 is ours.
		assert_eq!(tx.input.len(), 2);
		assert_eq!(tx.input[0].previous_output.txid, prevtx(&[100_000]).compute_txid());
		assert_eq!(tx.input[1].previous_output.txid, Txid::from_byte_array([1; 32]));
		assert_eq!(tx.output[0].value, Amount::from_sat(50_000));
		assert_eq!(tx.output[1].value, Amount::from_sat(90_000));
		logger.assert_log_contains("lightning_node::ln::interactivetxs", "Constructed unsigned tx", 1);

		assert_eq!(negotiation.receive_tx_complete(), Err(AbortReason::InvalidTransactionState));
	}

	#[test]
	fn changes_after_tx_complete_restart_negotiation() {
		let logger = TestLogger::new();
		let mut negotiation = negotiation_with_input(&logger);
		assert_eq!(negotiation.receive_tx_complete(), Ok(false));
		assert_eq!(negotiation.state(), NegotiationState::TheirTxComplete);
		negotiation.send_tx_add_output(0, TxOut { value: Amount::from_sat(1_000), script_pubkey: p2wpkh_script(3) }).unwrap();
		assert_eq!(negotiation.state(), NegotiationState::Negotiating);
		assert!(negotiation.build_transaction().is_err());
	}

	#[test]
	fn underpaying_counterparty_is_rejected() {
		let logger = TestLogger::new();
		let mut negotiation = negotiation_with_input(&logger);
		negotiation.receive_tx_add_output(&tx_add_output(3, 99_950)).unwrap();
		assert_eq!(negotiation.receive_tx_complete(), Err(AbortReason::InsufficientFees));
	}

	#[test]
	fn abort_messages() {
		let logger = TestLogger::new();
		let mut negotiation = negotiation(&logger, false, 253);
		let tx_abort = negotiation.abort_negotiation(AbortReason::InsufficientFees);
		assert_eq!(tx_abort.channel_id, CHANNEL_ID);
		assert_eq!(tx_abort.data, b"Contribution does not pay the agreed feerate".to_vec());

		let err = AbortReason::BelowDustLimit.into_lightning_error(CHANNEL_ID);
		assert_eq!(err.err, "Output amount is below the dust limit");
		assert!(matches!(err.action, ErrorAction::AbortNegotiation { .. }));

		let mut negotiation = negotiation_with_input(&logger);
		negotiation.receive_tx_abort(&msgs::TxAbort { channel_id: CHANNEL_ID, data: b"bye".to_vec() });
		assert_eq!(negotiation.state(), NegotiationState::NegotiationAborted(AbortReason::CounterpartyAborted));
		logger.assert_log_contains("lightning_node::ln::interactivetxs", "Counterparty aborted interactive transaction negotiation: bye", 1);
	}

	#[test]
	fn weight_estimates() {
		assert_eq!(TX_COMMON_FIELDS_WEIGHT, 42);
		assert_eq!(get_output_weight(&p2wpkh_script(1)), (8 + 1 + 22) * 4);
		assert_eq!(estimate_input_weight(&TxOut { value: Amount::ZERO, script_pubkey: p2wpkh_script(1) }), 164 + 109);
	}
}
