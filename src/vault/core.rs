// 14.2: vault state and entry points. the vault trades as a single account
// (`id`) in every member market; its idle assets sit in custody under the same id.

use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::checkpoint::{assets_for, shares_for, Checkpoint};
use super::VaultError;
use crate::config::VaultParameter;
use crate::custody::Custody;
use crate::engine::{Engine, EngineError};
use crate::events::{CheckpointEvent, EventPayload, VaultRequestEvent};
use crate::guard::LifecycleError;
use crate::oracle::OracleProvider;
use crate::types::{AccountId, MarketId, Quote, Version};

/// One depositor's position in the vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub shares: Decimal,
    pub claimable: Quote,
    // epoch the pending request below belongs to
    pub epoch: u64,
    pub deposit: Quote,
    pub redemption: Decimal,
}

impl Holder {
    pub fn has_pending(&self) -> bool {
        !self.deposit.is_zero() || !self.redemption.is_zero()
    }
}

#[derive(Debug, Clone)]
pub struct Vault {
    pub(super) id: AccountId,
    pub(super) parameter: VaultParameter,
    // completed epochs, oldest first. the open one is `pending`
    pub(super) checkpoints: Vec<Checkpoint>,
    pub(super) pending: Checkpoint,
    pub(super) total_shares: Decimal,
    pub(super) total_unclaimed: Quote,
    pub(super) holders: HashMap<AccountId, Holder>,
    in_flight: bool,
}

impl Vault {
    pub fn new<O, C>(id: AccountId, parameter: VaultParameter, engine: &Engine<O, C>) -> Result<Self, EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        parameter.validate()?;
        let mut versions = BTreeMap::new();
        for member in &parameter.markets {
            versions.insert(member.market, engine.current_version(member.market)?);
        }
        info!("vault {:?} opened over {} markets", id, parameter.markets.len());
        Ok(Self {
            id,
            parameter,
            checkpoints: Vec::new(),
            pending: Checkpoint::open(versions),
            total_shares: Decimal::ZERO,
            total_unclaimed: Quote::zero(),
            holders: HashMap::new(),
            in_flight: false,
        })
    }

    /// Queue `assets` from `account`'s wallet. Shares are minted once the
    /// current epoch completes and show up on the account's next interaction.
    pub fn deposit<O, C>(&mut self, engine: &mut Engine<O, C>, account: AccountId, assets: Quote) -> Result<(), EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        if !assets.is_positive() {
            return Err(VaultError::InvalidAmount.into());
        }
        self.atomic(engine, |vault, engine| {
            vault.settle_inner(engine, account)?;
            if !vault.is_healthy(engine)? {
                return Err(LifecycleError::VaultUnhealthy.into());
            }
            let limit = vault.max_deposit(engine)?;
            if assets > limit {
                return Err(VaultError::DepositLimitExceeded {
                    requested: assets,
                    available: limit,
                }
                .into());
            }

            engine.custody_mut().pull(account, assets)?;
            engine.custody_mut().push(vault.id, assets)?;

            let epoch = vault.epoch();
            vault.pending.deposit = vault.pending.deposit.add(assets);
            let holder = vault.holders.entry(account).or_default();
            holder.epoch = epoch;
            holder.deposit = holder.deposit.add(assets);

            engine.emit_event(EventPayload::VaultDeposit(VaultRequestEvent {
                vault: vault.id,
                account_id: account,
                epoch,
                assets,
                shares: Decimal::ZERO,
            }));
            vault.rebalance(engine)
        })
    }

    /// Burn `shares` now; the assets they are worth at the epoch's close become
    /// claimable once the epoch completes.
    pub fn redeem<O, C>(&mut self, engine: &mut Engine<O, C>, account: AccountId, shares: Decimal) -> Result<(), EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        if shares <= Decimal::ZERO {
            return Err(VaultError::InvalidAmount.into());
        }
        self.atomic(engine, |vault, engine| {
            vault.settle_inner(engine, account)?;
            if !vault.is_healthy(engine)? {
                return Err(LifecycleError::VaultUnhealthy.into());
            }
            let available = vault.balance_of(account);
            if shares > available {
                return Err(VaultError::InsufficientShares {
                    requested: shares,
                    available,
                }
                .into());
            }

            let epoch = vault.epoch();
            vault.total_shares -= shares;
            vault.pending.redemption += shares;
            let holder = vault.holders.entry(account).or_default();
            holder.shares -= shares;
            holder.epoch = epoch;
            holder.redemption += shares;

            engine.emit_event(EventPayload::VaultRedeem(VaultRequestEvent {
                vault: vault.id,
                account_id: account,
                epoch,
                assets: Quote::zero(),
                shares,
            }));
            vault.rebalance(engine)
        })
    }

    /// Pay out everything `account` has waiting from completed redemptions.
    pub fn claim<O, C>(&mut self, engine: &mut Engine<O, C>, account: AccountId) -> Result<Quote, EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        self.atomic(engine, |vault, engine| {
            vault.settle_inner(engine, account)?;
            vault.rebalance(engine)?;

            let amount = vault
                .holders
                .get_mut(&account)
                .map(|h| std::mem::take(&mut h.claimable))
                .unwrap_or_default();
            if !amount.is_zero() {
                vault.total_unclaimed = vault.total_unclaimed.sub(amount).max(Quote::zero());
                engine.custody_mut().pull(vault.id, amount)?;
                engine.custody_mut().push(account, amount)?;
            }

            engine.emit_event(EventPayload::VaultClaim(VaultRequestEvent {
                vault: vault.id,
                account_id: account,
                epoch: vault.epoch(),
                assets: amount,
                shares: Decimal::ZERO,
            }));
            Ok(amount)
        })
    }

    /// Settle the vault everywhere, advance the epoch if it can, convert
    /// `account`'s pending request and rebalance.
    pub fn settle<O, C>(&mut self, engine: &mut Engine<O, C>, account: AccountId) -> Result<(), EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        self.atomic(engine, |vault, engine| {
            vault.settle_inner(engine, account)?;
            vault.rebalance(engine)
        })
    }

    // snapshots the whole engine; each rebalance leg clones it again inside
    // `Engine::update`, so a call costs O(history) per member market.
    fn atomic<O, C, T, F>(&mut self, engine: &mut Engine<O, C>, op: F) -> Result<T, EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
        F: FnOnce(&mut Self, &mut Engine<O, C>) -> Result<T, EngineError>,
    {
        if self.in_flight {
            return Err(LifecycleError::Reentrant.into());
        }
        let vault = self.clone();
        let snapshot = engine.clone();
        self.in_flight = true;
        let result = op(self, engine);
        self.in_flight = false;
        if result.is_err() {
            *self = vault;
            *engine = snapshot;
        }
        result
    }

    fn settle_inner<O, C>(&mut self, engine: &mut Engine<O, C>, account: AccountId) -> Result<(), EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        for market in self.markets() {
            engine.settle(market, self.id)?;
        }
        self.advance_epoch(engine)?;
        self.convert(account);
        Ok(())
    }

    // an empty epoch just follows the oracle; one with requests waits for its targets
    fn advance_epoch<O, C>(&mut self, engine: &mut Engine<O, C>) -> Result<(), EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        let current = self.versions(engine, |e, m| e.current_version(m))?;
        if self.pending.is_empty() {
            self.pending.versions = current;
            return Ok(());
        }
        let latest = self.versions(engine, |e, m| e.latest_version(m))?;
        if !self.pending.is_ready(&latest) {
            return Ok(());
        }

        let epoch = self.epoch();
        let assets = self.total_assets(engine)?;
        self.pending.complete(self.total_shares, assets);
        let minted = self.pending.minted();
        let claimable = self.pending.claimable();
        self.total_shares += minted;
        self.total_unclaimed = self.total_unclaimed.add(claimable);

        info!(
            "vault {:?} epoch {} complete: {} shares over {}, minted {}, claimable {}",
            self.id, epoch, self.pending.shares, self.pending.assets, minted, claimable
        );
        engine.emit_event(EventPayload::CheckpointCompleted(CheckpointEvent {
            vault: self.id,
            epoch,
            shares: self.pending.shares,
            assets: self.pending.assets,
            minted,
            claimable,
        }));

        let done = std::mem::replace(&mut self.pending, Checkpoint::open(current));
        self.checkpoints.push(done);
        Ok(())
    }

    // turn a request from a completed epoch into shares or claimable assets
    fn convert(&mut self, account: AccountId) {
        let epoch = self.epoch();
        let Some(holder) = self.holders.get_mut(&account) else {
            return;
        };
        if !holder.has_pending() || holder.epoch >= epoch {
            return;
        }
        let Some(checkpoint) = self.checkpoints.get(holder.epoch as usize) else {
            return;
        };
        holder.shares += checkpoint.to_shares(holder.deposit);
        holder.claimable = holder.claimable.add(checkpoint.to_assets(holder.redemption));
        holder.deposit = Quote::zero();
        holder.redemption = Decimal::ZERO;
    }

    fn versions<O, C, F>(&self, engine: &Engine<O, C>, read: F) -> Result<BTreeMap<MarketId, Version>, EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
        F: Fn(&Engine<O, C>, MarketId) -> Result<Version, EngineError>,
    {
        let mut versions = BTreeMap::new();
        for market in self.markets() {
            versions.insert(market, read(engine, market)?);
        }
        Ok(versions)
    }

    pub(super) fn markets(&self) -> Vec<MarketId> {
        self.parameter.markets.iter().map(|m| m.market).collect()
    }

    // 14.2.1: accessors

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn parameter(&self) -> &VaultParameter {
        &self.parameter
    }

    /// Index of the open epoch.
    pub fn epoch(&self) -> u64 {
        self.checkpoints.len() as u64
    }

    pub fn checkpoint(&self, epoch: u64) -> Option<&Checkpoint> {
        if epoch == self.epoch() {
            return Some(&self.pending);
        }
        self.checkpoints.get(epoch as usize)
    }

    pub fn holder(&self, account: AccountId) -> Option<&Holder> {
        self.holders.get(&account)
    }

    /// Shares credited to `account`. Deposits from a completed epoch are only
    /// credited on the account's next interaction.
    pub fn balance_of(&self, account: AccountId) -> Decimal {
        self.holders.get(&account).map(|h| h.shares).unwrap_or_default()
    }

    pub fn total_supply(&self) -> Decimal {
        self.total_shares
    }

    pub fn unclaimed(&self, account: AccountId) -> Quote {
        self.holders.get(&account).map(|h| h.claimable).unwrap_or_default()
    }

    pub fn total_unclaimed(&self) -> Quote {
        self.total_unclaimed
    }

    /// Collateral in every market plus idle assets, less what is owed to redeemers.
    pub fn total_assets<O, C>(&self, engine: &Engine<O, C>) -> Result<Quote, EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        let mut collateral = Quote::zero();
        for market in self.markets() {
            collateral = collateral.add(engine.collateral(market, self.id)?);
        }
        Ok(collateral
            .add(engine.custody().balance_of(self.id))
            .sub(self.total_unclaimed))
    }

    // shares and assets as the open epoch would see them right now
    pub(super) fn share_price<O, C>(&self, engine: &Engine<O, C>) -> Result<(Decimal, Quote), EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        let shares = self.total_shares + self.pending.redemption;
        let assets = self.total_assets(engine)?.sub(self.pending.deposit);
        Ok((shares, assets))
    }

    pub fn convert_to_shares<O, C>(&self, engine: &Engine<O, C>, assets: Quote) -> Result<Decimal, EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        let (shares_total, assets_total) = self.share_price(engine)?;
        Ok(shares_for(assets, shares_total, assets_total))
    }

    pub fn convert_to_assets<O, C>(&self, engine: &Engine<O, C>, shares: Decimal) -> Result<Quote, EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        let (shares_total, assets_total) = self.share_price(engine)?;
        Ok(assets_for(shares, shares_total, assets_total))
    }

    /// False once the last completed epoch closed under water, or while the
    /// vault is being liquidated in any member market.
    pub fn is_healthy<O, C>(&self, engine: &Engine<O, C>) -> Result<bool, EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        if self.checkpoints.last().is_some_and(Checkpoint::is_insolvent) {
            return Ok(false);
        }
        for market in self.markets() {
            if engine.is_liquidating(market, self.id)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn max_deposit<O, C>(&self, engine: &Engine<O, C>) -> Result<Quote, EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        if !self.is_healthy(engine)? {
            return Ok(Quote::zero());
        }
        match self.parameter.max_collateral {
            None => Ok(Quote::new(Decimal::MAX)),
            Some(cap) => Ok(cap.sub(self.total_assets(engine)?).max(Quote::zero())),
        }
    }

    pub fn max_redeem<O, C>(&self, engine: &Engine<O, C>, account: AccountId) -> Result<Decimal, EngineError>
    where
        O: OracleProvider + Clone,
        C: Custody + Clone,
    {
        if !self.is_healthy(engine)? {
            return Ok(Decimal::ZERO);
        }
        Ok(self.balance_of(account))
    }
}
