// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! BOLT 3 commitment transactions.
//!
//! A [`CommitmentTransactionModel`] describes every output of one commitment transaction, already
//! fee- and dust-adjusted. [`CommitmentTransactionModel::from_channel_state`] applies BOLT 3's
//! trimming and fee rules to a channel's balances and HTLCs; [`CommitmentTransactionModel::build`]
//! only renders scripts, orders the outputs and returns the unsigned transaction. Signing is left
//! to a [`LightningSigner`].
//!
//! [`LightningSigner`]: crate::sign::LightningSigner

use core::cmp;
use core::fmt;
use core::ops::Deref;

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::PublicKey;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use crate::ln::chan_utils::{
	commit_tx_fee_sat, get_anchor_redeemscript, get_commitment_transaction_number_obscure_factor,
	get_htlc_redeemscript_with_explicit_keys, get_revokeable_redeemscript,
	get_to_countersignatory_p2wpkh, get_to_countersignatory_with_anchors_redeemscript,
	htlc_success_tx_weight, htlc_timeout_tx_weight, make_funding_redeemscript, TxCreationKeys,
	ANCHOR_OUTPUT_VALUE_SATOSHI, MAX_HTLCS,
};
use crate::ln::types::PaymentHash;
use crate::prelude::*;
use crate::util::config::CommitmentConfig;
use crate::util::logger::Logger;
use crate::util::transaction_utils::sort_outputs;

/// Commitment numbers are 48 bits wide.
pub const MAX_COMMITMENT_NUMBER: u64 = (1 << 48) - 1;

/// Witness scripts above this size are non-standard and would make an output unspendable.
const MAX_STANDARD_P2WSH_SCRIPT_SIZE: usize = 3600;

/// The number of a commitment transaction along with the factor which hides it on chain.
///
/// The obscuring factor is fixed for the lifetime of a channel while the number goes up by one
/// with every new commitment transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitmentNumber {
	value: u64,
	obscuring_factor: u64,
}

impl CommitmentNumber {
	/// Builds commitment number `value` for a channel, deriving the obscuring factor from both
	/// sides' payment basepoints. The channel opener's basepoint goes first.
	pub fn new(
		value: u64, opener_payment_basepoint: &PublicKey, accepter_payment_basepoint: &PublicKey,
	) -> Self {
		let obscuring_factor = get_commitment_transaction_number_obscure_factor(
			opener_payment_basepoint,
			accepter_payment_basepoint,
		);
		Self::with_obscuring_factor(value, obscuring_factor)
	}

	/// Builds commitment number `value` with a previously derived obscuring factor.
	pub fn with_obscuring_factor(value: u64, obscuring_factor: u64) -> Self {
		CommitmentNumber {
			value: value & MAX_COMMITMENT_NUMBER,
			obscuring_factor: obscuring_factor & MAX_COMMITMENT_NUMBER,
		}
	}

	/// The commitment number itself.
	pub fn value(&self) -> u64 {
		self.value
	}

	/// The 48 bit factor the number is XOR'd with on chain.
	pub fn obscuring_factor(&self) -> u64 {
		self.obscuring_factor
	}

	/// The number as it appears, split in two, in the locktime and sequence.
	pub fn obscured(&self) -> u64 {
		self.value ^ self.obscuring_factor
	}

	/// The commitment transaction's locktime: `0x20` followed by the low 24 bits of the obscured
	/// number.
	pub fn lock_time(&self) -> LockTime {
		LockTime::from_consensus((0x20 << 8 * 3) | (self.obscured() & 0xffffff) as u32)
	}

	/// The funding input's sequence: `0x80` followed by the high 24 bits of the obscured number.
	pub fn sequence(&self) -> Sequence {
		Sequence((0x80 << 8 * 3) | ((self.obscured() >> 3 * 8) & 0xffffff) as u32)
	}

	/// The number of the commitment transaction after this one, if there is one.
	pub fn next(&self) -> Option<Self> {
		if self.value == MAX_COMMITMENT_NUMBER {
			return None;
		}
		Some(CommitmentNumber { value: self.value + 1, obscuring_factor: self.obscuring_factor })
	}
}

/// What an output of a commitment transaction is for.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum OutputType {
	/// The channel's 2-of-2 funding output, which the commitment transaction spends.
	Funding,
	/// The broadcaster's balance, revocable and delayed.
	ToLocal,
	/// The countersignatory's balance.
	ToRemote,
	/// The broadcaster's anchor.
	LocalAnchor,
	/// The countersignatory's anchor.
	RemoteAnchor,
	/// An HTLC the broadcaster offered.
	OfferedHtlc,
	/// An HTLC the broadcaster received.
	ReceivedHtlc,
}

impl fmt::Display for OutputType {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let name = match self {
			OutputType::Funding => "funding",
			OutputType::ToLocal => "to_local",
			OutputType::ToRemote => "to_remote",
			OutputType::LocalAnchor => "local anchor",
			OutputType::RemoteAnchor => "remote anchor",
			OutputType::OfferedHtlc => "offered HTLC",
			OutputType::ReceivedHtlc => "received HTLC",
		};
		f.write_str(name)
	}
}

/// An error building a commitment transaction. Nothing built from a model which failed may be
/// signed or broadcast.
#[derive(Clone, PartialEq, Eq)]
pub enum CommitmentError {
	/// The funding outpoint does not reference a transaction.
	UnresolvedFundingOutpoint,
	/// The outputs would spend more than the funding output holds.
	OutputsExceedFunding {
		/// The sum of all outputs, in satoshis.
		outputs_sat: u64,
		/// The value of the funding output, in satoshis.
		funding_sat: u64,
	},
	/// More HTLCs than BOLT 2 allows in one direction.
	TooManyHtlcs(usize),
	/// A rendered script would make its output unspendable.
	InvalidScript(OutputType),
}

impl fmt::Debug for CommitmentError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			CommitmentError::UnresolvedFundingOutpoint => f.write_str("Funding outpoint references no transaction"),
			CommitmentError::OutputsExceedFunding { outputs_sat, funding_sat } => {
				write!(f, "Outputs total {} sat but the funding output only holds {} sat", outputs_sat, funding_sat)
			},
			CommitmentError::TooManyHtlcs(count) => write!(f, "{} HTLCs exceeds the maximum of {}", count, MAX_HTLCS),
			CommitmentError::InvalidScript(output_type) => write!(f, "Invalid script for {} output", output_type),
		}
	}
}

impl fmt::Display for CommitmentError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl std::error::Error for CommitmentError {}

/// Rejects scripts which no witness could ever satisfy.
fn check_script(script: &ScriptBuf, output_type: OutputType) -> Result<(), CommitmentError> {
	if script.is_empty()
		|| script.len() > MAX_STANDARD_P2WSH_SCRIPT_SIZE
		|| script.is_op_return()
		|| script.instructions().any(|instruction| instruction.is_err())
	{
		return Err(CommitmentError::InvalidScript(output_type));
	}
	Ok(())
}

/// The funding output the commitment transaction spends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FundingOutputInfo {
	/// The outpoint of the funding output.
	pub outpoint: OutPoint,
	/// The channel's capacity.
	pub amount_sat: u64,
	/// The broadcaster's funding key.
	pub local_funding_pubkey: PublicKey,
	/// The countersignatory's funding key.
	pub remote_funding_pubkey: PublicKey,
}

impl FundingOutputInfo {
	/// The 2-of-2 witness script of the funding output.
	pub fn redeem_script(&self) -> ScriptBuf {
		make_funding_redeemscript(&self.local_funding_pubkey, &self.remote_funding_pubkey)
	}

	/// The P2WSH `scriptPubKey` of the funding output.
	pub fn script_pubkey(&self) -> ScriptBuf {
		self.redeem_script().to_p2wsh()
	}

	/// Always [`OutputType::Funding`].
	pub fn output_type(&self) -> OutputType {
		OutputType::Funding
	}
}

/// The broadcaster's balance, spendable by them after `to_self_delay` or immediately by the
/// countersignatory with the revocation key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToLocalOutputInfo {
	/// The output's value.
	pub amount_sat: u64,
	/// The per-commitment revocation key.
	pub revocation_pubkey: PublicKey,
	/// The broadcaster's per-commitment delayed payment key.
	pub local_delayed_pubkey: PublicKey,
	/// The relative delay, in blocks, before the broadcaster may spend.
	pub to_self_delay: u16,
}

impl ToLocalOutputInfo {
	/// The revocable, delayed witness script.
	pub fn redeem_script(&self) -> ScriptBuf {
		get_revokeable_redeemscript(&self.revocation_pubkey, self.to_self_delay, &self.local_delayed_pubkey)
	}
}

/// The countersignatory's balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToRemoteOutputInfo {
	/// The output's value.
	pub amount_sat: u64,
	/// The countersignatory's payment key.
	pub remote_payment_pubkey: PublicKey,
	/// Whether the output is wrapped in a one block CSV, as `option_anchors` requires.
	pub use_anchors: bool,
}

impl ToRemoteOutputInfo {
	/// The witness script, if the output is P2WSH.
	pub fn redeem_script(&self) -> Option<ScriptBuf> {
		if self.use_anchors {
			Some(get_to_countersignatory_with_anchors_redeemscript(&self.remote_payment_pubkey))
		} else {
			None
		}
	}

	/// The output's `scriptPubKey`.
	pub fn script_pubkey(&self) -> ScriptBuf {
		match self.redeem_script() {
			Some(script) => script.to_p2wsh(),
			None => get_to_countersignatory_p2wpkh(&self.remote_payment_pubkey),
		}
	}
}

/// An anchor output, which lets its owner bump the commitment transaction's fee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnchorOutputInfo {
	/// The funding key of the side the anchor belongs to.
	pub funding_pubkey: PublicKey,
}

impl AnchorOutputInfo {
	/// The witness script of the anchor.
	pub fn redeem_script(&self) -> ScriptBuf {
		get_anchor_redeemscript(&self.funding_pubkey)
	}
}

/// An HTLC as the channel tracks it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Htlc {
	/// The hash of the preimage which unlocks this HTLC.
	pub payment_hash: PaymentHash,
	/// The value of the HTLC. The value of its output is this divided by 1000.
	pub amount_msat: u64,
	/// The CLTV lock-time at which this HTLC expires.
	pub cltv_expiry: u32,
}

/// An HTLC output on a commitment transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HtlcOutputInfo {
	/// The HTLC itself.
	pub htlc: Htlc,
	/// Whether the broadcaster offered the HTLC, rather than received it.
	pub offered: bool,
	/// The broadcaster's per-commitment HTLC key.
	pub local_htlc_pubkey: PublicKey,
	/// The countersignatory's per-commitment HTLC key.
	pub remote_htlc_pubkey: PublicKey,
	/// The per-commitment revocation key.
	pub revocation_pubkey: PublicKey,
}

impl HtlcOutputInfo {
	/// An HTLC output with the keys of the given commitment transaction.
	pub fn new(htlc: Htlc, offered: bool, keys: &TxCreationKeys) -> Self {
		HtlcOutputInfo {
			htlc,
			offered,
			local_htlc_pubkey: keys.broadcaster_htlc_key,
			remote_htlc_pubkey: keys.countersignatory_htlc_key,
			revocation_pubkey: keys.revocation_key,
		}
	}

	/// [`OutputType::OfferedHtlc`] or [`OutputType::ReceivedHtlc`].
	pub fn output_type(&self) -> OutputType {
		if self.offered { OutputType::OfferedHtlc } else { OutputType::ReceivedHtlc }
	}

	/// The value of the output.
	pub fn amount_sat(&self) -> u64 {
		self.htlc.amount_msat / 1000
	}

	/// Whether the HTLC is too small to be worth an output once the second-stage transaction
	/// claiming it has paid its fee. `option_anchors` second-stage transactions carry no fee.
	pub fn is_dust(&self, dust_limit_satoshis: u64, feerate_per_kw: u32, opt_anchors: bool) -> bool {
		let htlc_tx_fee_sat = if opt_anchors {
			0
		} else if self.offered {
			feerate_per_kw as u64 * htlc_timeout_tx_weight(false) / 1000
		} else {
			feerate_per_kw as u64 * htlc_success_tx_weight(false) / 1000
		};
		self.amount_sat() < dust_limit_satoshis + htlc_tx_fee_sat
	}

	/// The HTLC's witness script.
	pub fn redeem_script(&self, opt_anchors: bool) -> ScriptBuf {
		get_htlc_redeemscript_with_explicit_keys(
			self.offered,
			&self.htlc.payment_hash,
			self.htlc.cltv_expiry,
			opt_anchors,
			&self.local_htlc_pubkey,
			&self.remote_htlc_pubkey,
			&self.revocation_pubkey,
		)
	}
}

/// A channel's state as seen from the broadcaster of one commitment transaction, before BOLT 3's
/// fee and dust rules are applied.
#[derive(Clone, Debug)]
pub struct ChannelCommitmentState {
	/// The funding output being spent.
	pub funding_output: FundingOutputInfo,
	/// The number of this commitment transaction.
	pub commitment_number: CommitmentNumber,
	/// The per-commitment keys of this commitment transaction.
	pub keys: TxCreationKeys,
	/// The countersignatory's static payment point, which their balance is paid to.
	pub countersignatory_payment_point: PublicKey,
	/// The commitment feerate, in satoshis per 1000 weight units.
	pub feerate_per_kw: u32,
	/// The broadcaster's balance.
	pub to_local_msat: u64,
	/// The countersignatory's balance.
	pub to_remote_msat: u64,
	/// HTLCs the broadcaster offered.
	pub offered_htlcs: Vec<Htlc>,
	/// HTLCs the broadcaster received.
	pub received_htlcs: Vec<Htlc>,
	/// Whether the broadcaster opened the channel and so pays the commitment fee.
	pub local_is_funder: bool,
}

/// The unsigned commitment transaction a [`CommitmentTransactionModel`] renders to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuiltCommitmentTransaction {
	/// The commitment transaction
	pub transaction: Transaction,
	/// The txid for the commitment transaction.
	///
	/// This is provided as a performance optimization, instead of calling transaction.compute_txid()
	/// multiple times.
	pub txid: Txid,
	/// What each output of the transaction is, in output order.
	pub output_types: Vec<OutputType>,
}

impl BuiltCommitmentTransaction {
	/// The index of the output for the HTLC with `payment_hash`, if it was not trimmed.
	pub fn htlc_output_index(&self, payment_hash: &PaymentHash, model: &CommitmentTransactionModel) -> Option<u32> {
		let htlc_script = model
			.offered_htlcs
			.iter()
			.chain(model.received_htlcs.iter())
			.find(|htlc| htlc.htlc.payment_hash == *payment_hash)?
			.redeem_script(model.use_anchors)
			.to_p2wsh();
		self.transaction
			.output
			.iter()
			.position(|output| output.script_pubkey == htlc_script)
			.map(|idx| idx as u32)
	}
}

/// Every output of one commitment transaction, already fee- and dust-adjusted.
///
/// Models are immutable once built. A new one is derived for every commitment number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitmentTransactionModel {
	funding_output: FundingOutputInfo,
	commitment_number: CommitmentNumber,
	fee_sat: u64,
	use_anchors: bool,
	to_local: Option<ToLocalOutputInfo>,
	to_remote: Option<ToRemoteOutputInfo>,
	local_anchor: Option<AnchorOutputInfo>,
	remote_anchor: Option<AnchorOutputInfo>,
	offered_htlcs: Vec<HtlcOutputInfo>,
	received_htlcs: Vec<HtlcOutputInfo>,
}

impl CommitmentTransactionModel {
	/// Starts a model spending `funding_output` with no outputs. Fails if the funding outpoint does
	/// not reference a transaction.
	pub fn new(
		funding_output: FundingOutputInfo, commitment_number: CommitmentNumber, fee_sat: u64,
		use_anchors: bool,
	) -> Result<Self, CommitmentError> {
		if funding_output.outpoint.txid == Txid::all_zeros() {
			return Err(CommitmentError::UnresolvedFundingOutpoint);
		}
		Ok(CommitmentTransactionModel {
			funding_output,
			commitment_number,
			fee_sat,
			use_anchors,
			to_local: None,
			to_remote: None,
			local_anchor: None,
			remote_anchor: None,
			offered_htlcs: Vec::new(),
			received_htlcs: Vec::new(),
		})
	}

	/// Adds the broadcaster's balance.
	pub fn with_to_local(mut self, to_local: ToLocalOutputInfo) -> Self {
		self.to_local = Some(to_local);
		self
	}

	/// Adds the countersignatory's balance.
	pub fn with_to_remote(mut self, to_remote: ToRemoteOutputInfo) -> Self {
		self.to_remote = Some(to_remote);
		self
	}

	/// Adds the broadcaster's anchor.
	pub fn with_local_anchor(mut self, anchor: AnchorOutputInfo) -> Self {
		self.local_anchor = Some(anchor);
		self
	}

	/// Adds the countersignatory's anchor.
	pub fn with_remote_anchor(mut self, anchor: AnchorOutputInfo) -> Self {
		self.remote_anchor = Some(anchor);
		self
	}

	/// Adds an HTLC output.
	pub fn with_htlc(mut self, htlc: HtlcOutputInfo) -> Self {
		if htlc.offered {
			self.offered_htlcs.push(htlc);
		} else {
			self.received_htlcs.push(htlc);
		}
		self
	}

	/// Derives the model for one commitment transaction from the channel's balances and HTLCs.
	///
	/// HTLCs which are dust once their second-stage fee is paid are trimmed and their value goes
	/// to fees. The commitment fee, and with `option_anchors` the two anchors, is taken from the
	/// funder's balance. Balances below the dust limit are trimmed too.
	pub fn from_channel_state<L: Deref>(
		state: &ChannelCommitmentState, config: &CommitmentConfig, logger: &L,
	) -> Result<Self, CommitmentError>
	where
		L::Target: Logger,
	{
		let use_anchors = config.use_anchors;
		let dust_limit = config.dust_limit_satoshis;
		let feerate = state.feerate_per_kw;

		let mut htlcs = Vec::with_capacity(state.offered_htlcs.len() + state.received_htlcs.len());
		let offered = state.offered_htlcs.iter().map(|htlc| (htlc, true));
		let received = state.received_htlcs.iter().map(|htlc| (htlc, false));
		for (htlc, offered) in offered.chain(received) {
			let output = HtlcOutputInfo::new(htlc.clone(), offered, &state.keys);
			if output.is_dust(dust_limit, feerate, use_anchors) {
				log_trace!(logger, "Trimming {} of {} msat with payment hash {}",
					output.output_type(), htlc.amount_msat, htlc.payment_hash);
			} else {
				htlcs.push(output);
			}
		}

		let fee_sat = commit_tx_fee_sat(feerate, htlcs.len(), use_anchors);
		let anchors_sat = if use_anchors { ANCHOR_OUTPUT_VALUE_SATOSHI * 2 } else { 0 };
		let mut to_local_sat = state.to_local_msat / 1000;
		let mut to_remote_sat = state.to_remote_msat / 1000;
		{
			let funder_sat = if state.local_is_funder { &mut to_local_sat } else { &mut to_remote_sat };
			*funder_sat = funder_sat.saturating_sub(fee_sat + anchors_sat);
		}

		let mut model = CommitmentTransactionModel::new(
			state.funding_output.clone(),
			state.commitment_number,
			fee_sat,
			use_anchors,
		)?;
		let has_htlcs = !htlcs.is_empty();
		for htlc in htlcs {
			model = model.with_htlc(htlc);
		}

		if to_local_sat >= dust_limit {
			model = model.with_to_local(ToLocalOutputInfo {
				amount_sat: to_local_sat,
				revocation_pubkey: state.keys.revocation_key,
				local_delayed_pubkey: state.keys.broadcaster_delayed_payment_key,
				to_self_delay: config.to_self_delay,
			});
		} else if to_local_sat > 0 {
			log_trace!(logger, "Trimming to_local output of {} sat below the dust limit", to_local_sat);
		}
		if to_remote_sat >= dust_limit {
			model = model.with_to_remote(ToRemoteOutputInfo {
				amount_sat: to_remote_sat,
				remote_payment_pubkey: state.countersignatory_payment_point,
				use_anchors,
			});
		} else if to_remote_sat > 0 {
			log_trace!(logger, "Trimming to_remote output of {} sat below the dust limit", to_remote_sat);
		}

		if use_anchors {
			if model.to_local.is_some() || has_htlcs {
				model = model.with_local_anchor(AnchorOutputInfo {
					funding_pubkey: state.funding_output.local_funding_pubkey,
				});
			}
			if model.to_remote.is_some() || has_htlcs {
				model = model.with_remote_anchor(AnchorOutputInfo {
					funding_pubkey: state.funding_output.remote_funding_pubkey,
				});
			}
		}
		Ok(model)
	}

	/// The funding output spent.
	pub fn funding_output(&self) -> &FundingOutputInfo {
		&self.funding_output
	}

	/// The number of this commitment transaction.
	pub fn commitment_number(&self) -> CommitmentNumber {
		self.commitment_number
	}

	/// The fee the model was built for. Trimmed outputs add to what the transaction actually
	/// pays.
	pub fn fee_sat(&self) -> u64 {
		self.fee_sat
	}

	/// Whether this is an `option_anchors` commitment transaction.
	pub fn use_anchors(&self) -> bool {
		self.use_anchors
	}

	/// The broadcaster's balance, unless trimmed.
	pub fn to_local(&self) -> Option<&ToLocalOutputInfo> {
		self.to_local.as_ref()
	}

	/// The countersignatory's balance, unless trimmed.
	pub fn to_remote(&self) -> Option<&ToRemoteOutputInfo> {
		self.to_remote.as_ref()
	}

	/// The broadcaster's anchor, if any.
	pub fn local_anchor(&self) -> Option<&AnchorOutputInfo> {
		self.local_anchor.as_ref()
	}

	/// The countersignatory's anchor, if any.
	pub fn remote_anchor(&self) -> Option<&AnchorOutputInfo> {
		self.remote_anchor.as_ref()
	}

	/// The untrimmed HTLCs the broadcaster offered.
	pub fn offered_htlcs(&self) -> &[HtlcOutputInfo] {
		&self.offered_htlcs
	}

	/// The untrimmed HTLCs the broadcaster received.
	pub fn received_htlcs(&self) -> &[HtlcOutputInfo] {
		&self.received_htlcs
	}

	/// Renders the unsigned commitment transaction.
	///
	/// Outputs are sorted by value, then `scriptPubKey`, then CLTV expiry, so that both sides
	/// derive the same txid. Building the same model always yields the same transaction.
	pub fn build(&self) -> Result<BuiltCommitmentTransaction, CommitmentError> {
		for htlcs in [&self.offered_htlcs, &self.received_htlcs] {
			if htlcs.len() > MAX_HTLCS as usize {
				return Err(CommitmentError::TooManyHtlcs(htlcs.len()));
			}
		}

		let mut txouts: Vec<(TxOut, (OutputType, Option<&Htlc>))> = Vec::new();
		fn push_p2wsh<'a>(
			txouts: &mut Vec<(TxOut, (OutputType, Option<&'a Htlc>))>, script: ScriptBuf, value: u64,
			output_type: OutputType, htlc: Option<&'a Htlc>,
		) -> Result<(), CommitmentError> {
			check_script(&script, output_type)?;
			let txout = TxOut { script_pubkey: script.to_p2wsh(), value: Amount::from_sat(value) };
			txouts.push((txout, (output_type, htlc)));
			Ok(())
		}

		if let Some(to_local) = &self.to_local {
			push_p2wsh(&mut txouts, to_local.redeem_script(), to_local.amount_sat, OutputType::ToLocal, None)?;
		}
		if let Some(to_remote) = &self.to_remote {
			match to_remote.redeem_script() {
				Some(script) => push_p2wsh(&mut txouts, script, to_remote.amount_sat, OutputType::ToRemote, None)?,
				None => {
					let txout = TxOut {
						script_pubkey: to_remote.script_pubkey(),
						value: Amount::from_sat(to_remote.amount_sat),
					};
					txouts.push((txout, (OutputType::ToRemote, None)));
				},
			}
		}
		if let Some(anchor) = &self.local_anchor {
			push_p2wsh(&mut txouts, anchor.redeem_script(), ANCHOR_OUTPUT_VALUE_SATOSHI, OutputType::LocalAnchor, None)?;
		}
		if let Some(anchor) = &self.remote_anchor {
			push_p2wsh(&mut txouts, anchor.redeem_script(), ANCHOR_OUTPUT_VALUE_SATOSHI, OutputType::RemoteAnchor, None)?;
		}
		for htlc in self.offered_htlcs.iter().chain(self.received_htlcs.iter()) {
			let script = htlc.redeem_script(self.use_anchors);
			push_p2wsh(&mut txouts, script, htlc.amount_sat(), htlc.output_type(), Some(&htlc.htlc))?;
		}

		// A sum which overflows is reported as u64::MAX.
		let outputs_sat = txouts.iter()
			.try_fold(0u64, |total, (txout, _)| total.checked_add(txout.value.to_sat()))
			.unwrap_or(u64::MAX);
		if outputs_sat > self.funding_output.amount_sat {
			return Err(CommitmentError::OutputsExceedFunding {
				outputs_sat,
				funding_sat: self.funding_output.amount_sat,
			});
		}

		// Sort output in BIP-69 order (amount, scriptPubkey). Tie-breaks based on HTLC
		// CLTV expiration height.
		sort_outputs(&mut txouts, |(_, a), (_, b)| match (a, b) {
			(Some(a_htlc), Some(b_htlc)) => a_htlc
				.cltv_expiry
				.cmp(&b_htlc.cltv_expiry)
				.then(a_htlc.payment_hash.0.cmp(&b_htlc.payment_hash.0)),
			_ => cmp::Ordering::Equal,
		});

		let output_types = txouts.iter().map(|(_, (output_type, _))| *output_type).collect();
		let transaction = Transaction {
			version: Version::TWO,
			lock_time: self.commitment_number.lock_time(),
			input: vec![TxIn {
				previous_output: self.funding_output.outpoint,
				script_sig: ScriptBuf::new(),
				sequence: self.commitment_number.sequence(),
				witness: Witness::new(),
			}],
			output: txouts.into_iter().map(|(txout, _)| txout).collect(),
		};
		let txid = transaction.compute_txid();
		Ok(BuiltCommitmentTransaction { transaction, txid, output_types })
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::util::test_utils::TestLogger;

	use bitcoin::consensus::encode::serialize_hex;
	use bitcoin::hashes::sha256::Hash as Sha256;
	use bitcoin::hex::FromHex;
	use bitcoin::script::Builder;
	use bitcoin::opcodes;

	use core::str::FromStr;

	pub(crate) fn pubkey_from_hex(hex: &str) -> PublicKey {
		PublicKey::from_slice(&<Vec<u8>>::from_hex(hex).unwrap()).unwrap()
	}

	pub(crate) fn sig_from_hex(hex: &str) -> Vec<u8> {
		let mut sig = <Vec<u8>>::from_hex(hex).unwrap();
		sig.push(1); // SIGHASH_ALL
		sig
	}

	/// The channel of BOLT 3 Appendix C, from the opener's side.
	pub(crate) fn bolt3_state() -> ChannelCommitmentState {
		let local_payment_basepoint = pubkey_from_hex("034f355bdcb7cc0af728ef3cceb9615d90684bb5b2ca5f859ab0f0b704075871aa");
		let remote_payment_basepoint = pubkey_from_hex("032c0b7cf95324a07d05398b240174dc0c2be444d96b159aa6c7f7b1e668680991");
		ChannelCommitmentState {
			funding_output: FundingOutputInfo {
				outpoint: OutPoint {
					txid: Txid::from_str("8984484a580b825b9972d7adb15050b3ab624ccd731946b3eeddb92f4e7ef6be").unwrap(),
					vout: 0,
				},
				amount_sat: 10_000_000,
				local_funding_pubkey: pubkey_from_hex("023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb"),
				remote_funding_pubkey: pubkey_from_hex("030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa711c1"),
			},
			commitment_number: CommitmentNumber::new(42, &local_payment_basepoint, &remote_payment_basepoint),
			keys: TxCreationKeys {
				per_commitment_point: pubkey_from_hex("025f7117a78150fe2ef97db7cfc83bd57b2e2c0d0dd25eaf467a4a1c2a45ce1486"),
				revocation_key: pubkey_from_hex("0212a140cd0c6539d07cd08dfe09984dec3251ea808b892efeac3ede9402bf2b19"),
				broadcaster_htlc_key: pubkey_from_hex("030d417a46946384f88d5f3337267c5e579765875dc4daca813e21734b140639e7"),
				countersignatory_htlc_key: pubkey_from_hex("0394854aa6eab5b2a8122cc726e9dded053a2184d88256816826d6231c068d4a5b"),
				broadcaster_delayed_payment_key: pubkey_from_hex("03fd5960528dc152014952efdb702a88f71e3c1653b2314431701ec77e57fde83c"),
			},
			countersignatory_payment_point: pubkey_from_hex("0394854aa6eab5b2a8122cc726e9dded053a2184d88256816826d6231c068d4a5b"),
			feerate_per_kw: 15000,
			to_local_msat: 7_000_000_000,
			to_remote_msat: 3_000_000_000,
			offered_htlcs: Vec::new(),
			received_htlcs: Vec::new(),
			local_is_funder: true,
		}
	}

	fn bolt3_htlcs(state: &mut ChannelCommitmentState) {
		let htlc = |preimage: u8, amount_msat: u64, cltv_expiry: u32| Htlc {
			payment_hash: PaymentHash(Sha256::hash(&[preimage; 32]).to_byte_array()),
			amount_msat,
			cltv_expiry,
		};
		state.received_htlcs = vec![htlc(0, 1_000_000, 500), htlc(1, 2_000_000, 501), htlc(4, 4_000_000, 504)];
		state.offered_htlcs = vec![htlc(2, 2_000_000, 502), htlc(3, 3_000_000, 503)];
		state.to_local_msat = 6_988_000_000;
	}

	/// Attaches the funding witness BOLT 3 lists, the broadcaster's signature first since its
	/// funding key sorts first.
	pub(crate) fn with_bolt3_witness(mut tx: Transaction, local_sig: &str, remote_sig: &str) -> Transaction {
		let funding_script = bolt3_state().funding_output.redeem_script();
		tx.input[0].witness = Witness::from_slice(&[
			&[][..],
			&sig_from_hex(local_sig)[..],
			&sig_from_hex(remote_sig)[..],
			funding_script.as_bytes(),
		]);
		tx
	}

	#[test]
	fn commitment_number_obscuring() {
		let state = bolt3_state();
		let number = state.commitment_number;
		assert_eq!(number.obscuring_factor(), 0x2bb038521914);
		assert_eq!(number.obscured(), 0x2bb038521914 ^ 42);
		assert_eq!(number.lock_time().to_consensus_u32(), 0x2052193e);
		assert_eq!(number.sequence().0, 0x802bb038);

		let next = number.next().unwrap();
		assert_eq!(next.value(), 43);
		assert_eq!(next.obscuring_factor(), number.obscuring_factor());
		assert!(CommitmentNumber::with_obscuring_factor(MAX_COMMITMENT_NUMBER, 0).next().is_none());
	}

	#[test]
	fn simple_commitment_tx_with_no_htlcs() {
		let logger = TestLogger::new();
		let model = CommitmentTransactionModel::from_channel_state(
			&bolt3_state(), &CommitmentConfig::default(), &&logger).unwrap();
		assert_eq!(model.fee_sat(), 10860);
		assert_eq!(model.to_local().unwrap().amount_sat, 6_989_140);
		assert!(model.local_anchor().is_none() && model.remote_anchor().is_none());

		let built = model.build().unwrap();
		assert_eq!(built.output_types, vec![OutputType::ToRemote, OutputType::ToLocal]);
		let tx = with_bolt3_witness(built.transaction,
			"30440220616210b2cc4d3afb601013c373bbd8aac54febd9f15400379a8cb65ce7deca60022034236c010991beb7ff770510561ae8dc885b8d38d1947248c38f2ae055647142",
			"3045022100c3127b33dcc741dd6b05b1e63cbd1a9a7d816f37af9b6756fa2376b056f032370220408b96279808fe57eb7e463710804cdf4f108388bc5cf722d8c848d2c7f9f3b0");
		assert_eq!(serialize_hex(&tx),
			"02000000000101bef67e4e2fb9ddeeb3461973cd4c62abb35050b1add772995b820b584a488489000000000038b02b8002c0c62d0000000000160014cc1b07838e387deacd0e5232e1e8b49f4c29e48454a56a00000000002200204adb4e2f00643db396dd120d4e7dc17625f5f2c11a40d857accc862d6b7dd80e04004730440220616210b2cc4d3afb601013c373bbd8aac54febd9f15400379a8cb65ce7deca60022034236c010991beb7ff770510561ae8dc885b8d38d1947248c38f2ae05564714201483045022100c3127b33dcc741dd6b05b1e63cbd1a9a7d816f37af9b6756fa2376b056f032370220408b96279808fe57eb7e463710804cdf4f108388bc5cf722d8c848d2c7f9f3b001475221023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb21030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa711c152ae3e195220");
	}

	#[test]
	fn commitment_tx_with_all_five_htlcs_untrimmed() {
		let logger = TestLogger::new();
		let mut state = bolt3_state();
		bolt3_htlcs(&mut state);
		state.feerate_per_kw = 0;

		let model = CommitmentTransactionModel::from_channel_state(
			&state, &CommitmentConfig::default(), &&logger).unwrap();
		assert_eq!(model.offered_htlcs().len(), 2);
		assert_eq!(model.received_htlcs().len(), 3);

		let built = model.build().unwrap();
		let values: Vec<u64> = built.transaction.output.iter().map(|o| o.value.to_sat()).collect();
		assert_eq!(values, vec![1000, 2000, 2000, 3000, 4000, 3_000_000, 6_988_000]);
		assert_eq!(built.output_types, vec![
			OutputType::ReceivedHtlc, OutputType::OfferedHtlc, OutputType::ReceivedHtlc,
			OutputType::OfferedHtlc, OutputType::ReceivedHtlc, OutputType::ToRemote, OutputType::ToLocal,
		]);
		let hash_two = PaymentHash(Sha256::hash(&[2; 32]).to_byte_array());
		assert_eq!(built.htlc_output_index(&hash_two, &model), Some(1));

		let tx = with_bolt3_witness(built.transaction,
			"304402206fc2d1f10ea59951eefac0b4b7c396a3c3d87b71ff0b019796ef4535beaf36f902201765b0181e514d04f4c8ad75659d7037be26cdb3f8bb6f78fe61decef484c3ea",
			"3044022009b048187705a8cbc9ad73adbe5af148c3d012e1f067961486c822c7af08158c022006d66f3704cfab3eb2dc49dae24e4aa22a6910fc9b424007583204e3621af2e5");
		assert_eq!(serialize_hex(&tx),
			"02000000000101bef67e4e2fb9ddeeb3461973cd4c62abb35050b1add772995b820b584a488489000000000038b02b8007e80300000000000022002052bfef0479d7b293c27e0f1eb294bea154c63a3294ef092c19af51409bce0e2ad007000000000000220020403d394747cae42e98ff01734ad5c08f82ba123d3d9a620abda88989651e2ab5d007000000000000220020748eba944fedc8827f6b06bc44678f93c0f9e6078b35c6331ed31e75f8ce0c2db80b000000000000220020c20b5d1f8584fd90443e7b7b720136174fa4b9333c261d04dbbd012635c0f419a00f0000000000002200208c48d15160397c9731df9bc3b236656efb6665fbfe92b4a6878e88a499f741c4c0c62d0000000000160014cc1b07838e387deacd0e5232e1e8b49f4c29e484e0a06a00000000002200204adb4e2f00643db396dd120d4e7dc17625f5f2c11a40d857accc862d6b7dd80e040047304402206fc2d1f10ea59951eefac0b4b7c396a3c3d87b71ff0b019796ef4535beaf36f902201765b0181e514d04f4c8ad75659d7037be26cdb3f8bb6f78fe61decef484c3ea01473044022009b048187705a8cbc9ad73adbe5af148c3d012e1f067961486c822c7af08158c022006d66f3704cfab3eb2dc49dae24e4aa22a6910fc9b424007583204e3621af2e501475221023da092f6980e58d2c037173180e9a465476026ee50f96695963e8efe436f54eb21030e9f7b623d2ccc7c9bd44d66d5ce21ce504c0acf6385a132cec6d3c39fa711c152ae3e195220");
	}

	#[test]
	fn building_is_deterministic() {
		let logger = TestLogger::new();
		let mut state = bolt3_state();
		bolt3_htlcs(&mut state);
		let model = CommitmentTransactionModel::from_channel_state(
			&state, &CommitmentConfig::default(), &&logger).unwrap();
		assert_eq!(model.build().unwrap(), model.build().unwrap());

		// The order HTLCs are added in does not matter.
		state.received_htlcs.reverse();
		state.offered_htlcs.reverse();
		let reordered = CommitmentTransactionModel::from_channel_state(
			&state, &CommitmentConfig::default(), &&logger).unwrap();
		assert_eq!(model.build().unwrap().txid, reordered.build().unwrap().txid);
	}

	#[test]
	fn dust_htlcs_are_trimmed() {
		let logger = TestLogger::new();
		let mut state = bolt3_state();
		bolt3_htlcs(&mut state);
		// At 2000 sat/kw the HTLC-success fee is 1406 sat and the HTLC-timeout fee 1326 sat, so with
		// a 546 sat dust limit only HTLCs of at least 1952 and 1872 sat respectively survive.
		state.feerate_per_kw = 2000;
		let model = CommitmentTransactionModel::from_channel_state(
			&state, &CommitmentConfig::default(), &&logger).unwrap();
		assert_eq!(model.received_htlcs().len(), 2);
		assert_eq!(model.offered_htlcs().len(), 2);
		assert_eq!(model.fee_sat(), 2000 * (724 + 4 * 172) / 1000);
		logger.assert_log_contains("lightning_node::ln::commitment", "Trimming received HTLC of 1000000 msat", 1);

		let htlc = &model.received_htlcs()[0];
		assert!(!htlc.is_dust(546, 2000, false));
		assert!(htlc.is_dust(htlc.amount_sat() + 1, 0, true));
	}

	#[test]
	fn funder_pays_fee_and_anchors() {
		let logger = TestLogger::new();
		let mut state = bolt3_state();
		state.local_is_funder = false;
		let config = CommitmentConfig { use_anchors: true, ..Default::default() };
		let model = CommitmentTransactionModel::from_channel_state(&state, &config, &&logger).unwrap();

		let fee = commit_tx_fee_sat(15000, 0, true);
		assert_eq!(model.fee_sat(), fee);
		assert_eq!(model.to_local().unwrap().amount_sat, 7_000_000);
		assert_eq!(model.to_remote().unwrap().amount_sat, 3_000_000 - fee - 660);
		assert!(model.local_anchor().is_some() && model.remote_anchor().is_some());

		let built = model.build().unwrap();
		assert_eq!(built.transaction.output.len(), 4);
		assert!(built.output_types[..2].contains(&OutputType::LocalAnchor));
		assert!(built.output_types[..2].contains(&OutputType::RemoteAnchor));
		assert_eq!(built.transaction.output[0].value.to_sat(), 330);
		assert_eq!(built.transaction.output[1].value.to_sat(), 330);
		let to_remote = model.to_remote().unwrap();
		assert!(built.transaction.output.iter().any(|o| o.script_pubkey == to_remote.script_pubkey()));
		assert!(to_remote.script_pubkey().is_p2wsh());
	}

	#[test]
	fn dust_balances_are_trimmed_with_their_anchor() {
		let logger = TestLogger::new();
		let mut state = bolt3_state();
		state.to_remote_msat = 500_000;
		state.to_local_msat = 9_999_500_000;
		let config = CommitmentConfig { use_anchors: true, ..Default::default() };
		let model = CommitmentTransactionModel::from_channel_state(&state, &config, &&logger).unwrap();
		assert!(model.to_remote().is_none());
		assert!(model.remote_anchor().is_none());
		assert!(model.local_anchor().is_some());
		logger.assert_log_contains("lightning_node::ln::commitment", "Trimming to_remote output of 500 sat", 1);
	}

	#[test]
	fn zero_funding_txid_rejected() {
		let mut funding_output = bolt3_state().funding_output;
		funding_output.outpoint.txid = Txid::all_zeros();
		let number = CommitmentNumber::with_obscuring_factor(0, 0);
		assert_eq!(CommitmentTransactionModel::new(funding_output, number, 0, false),
			Err(CommitmentError::UnresolvedFundingOutpoint));
	}

	#[test]
	fn outputs_cannot_exceed_funding() {
		let state = bolt3_state();
		let model = CommitmentTransactionModel::new(state.funding_output.clone(), state.commitment_number, 0, false)
			.unwrap()
			.with_to_local(ToLocalOutputInfo {
				amount_sat: 10_000_001,
				revocation_pubkey: state.keys.revocation_key,
				local_delayed_pubkey: state.keys.broadcaster_delayed_payment_key,
				to_self_delay: 144,
			});
		assert_eq!(model.build(), Err(CommitmentError::OutputsExceedFunding {
			outputs_sat: 10_000_001, funding_sat: 10_000_000 }));

		// Amounts whose sum does not fit in a u64 are refused rather than wrapping around.
		let model = CommitmentTransactionModel::new(state.funding_output.clone(), state.commitment_number, 0, false)
			.unwrap()
			.with_to_local(ToLocalOutputInfo {
				amount_sat: u64::MAX,
				revocation_pubkey: state.keys.revocation_key,
				local_delayed_pubkey: state.keys.broadcaster_delayed_payment_key,
				to_self_delay: 144,
			})
			.with_to_remote(ToRemoteOutputInfo {
				amount_sat: 2,
				remote_payment_pubkey: state.countersignatory_payment_point,
				use_anchors: false,
			});
		assert_eq!(model.build(), Err(CommitmentError::OutputsExceedFunding {
			outputs_sat: u64::MAX, funding_sat: 10_000_000 }));
	}

	#[test]
	fn too_many_htlcs() {
		let state = bolt3_state();
		let mut model = CommitmentTransactionModel::new(state.funding_output.clone(), state.commitment_number, 0, false).unwrap();
		for i in 0..=MAX_HTLCS as u32 {
			let htlc = Htlc { payment_hash: PaymentHash([0; 32]), amount_msat: 0, cltv_expiry: i };
			model = model.with_htlc(HtlcOutputInfo::new(htlc, true, &state.keys));
		}
		assert_eq!(model.build(), Err(CommitmentError::TooManyHtlcs(MAX_HTLCS as usize + 1)));
	}

	#[test]
	fn malformed_scripts_rejected() {
		let op_return = Builder::new().push_opcode(opcodes::all::OP_RETURN).into_script();
		assert_eq!(check_script(&op_return, OutputType::ToLocal), Err(CommitmentError::InvalidScript(OutputType::ToLocal)));
		// A push running past the end of the script.
		let truncated = ScriptBuf::from(vec![0x21, 0x02]);
		assert_eq!(check_script(&truncated, OutputType::OfferedHtlc),
			Err(CommitmentError::InvalidScript(OutputType::OfferedHtlc)));
		assert_eq!(check_script(&ScriptBuf::new(), OutputType::LocalAnchor),
			Err(CommitmentError::InvalidScript(OutputType::LocalAnchor)));
		assert!(check_script(&bolt3_state().funding_output.redeem_script(), OutputType::Funding).is_ok());
		assert_eq!(CommitmentError::InvalidScript(OutputType::ReceivedHtlc).to_string(),
			"Invalid script for received HTLC output");
	}
}
