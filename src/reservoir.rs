//! Reservoir: Single-file Solana program with embedded pooled-vault engine.

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

#[cfg(not(feature = "no-entrypoint"))]
solana_security_txt::security_txt! {
    name: "Reservoir",
    project_url: "https://reservoir.example",
    contacts: "email:security@reservoir.example",
    policy: "https://reservoir.example/security"
}

// 1. mod constants
pub mod constants {
    use core::mem::{align_of, size_of};
    use crate::engine::PoolEngine;
    use crate::state::PoolConfig;

    pub const MAGIC: u64 = 0x52455345_52564F49; // "RESERVOI"
    pub const VERSION: u32 = 1;

    pub const HEADER_LEN: usize = 64;
    pub const CONFIG_LEN: usize = size_of::<PoolConfig>();
    pub const ENGINE_ALIGN: usize = align_of::<PoolEngine>();

    pub const fn align_up(x: usize, a: usize) -> usize {
        (x + (a - 1)) & !(a - 1)
    }

    pub const ENGINE_OFF: usize = align_up(HEADER_LEN + CONFIG_LEN, ENGINE_ALIGN);
    pub const ENGINE_LEN: usize = size_of::<PoolEngine>();
    pub const SLAB_LEN: usize = ENGINE_OFF + ENGINE_LEN;
}

// 2. mod engine (pure accounting core, no account plumbing)
pub mod engine {
    use bytemuck::{Pod, Zeroable};

    pub const BPS_DENOM: u64 = 10_000;
    pub const SECONDS_PER_YEAR: u64 = 31_536_000;

    #[cfg(not(feature = "large"))]
    pub const MAX_ACCOUNTS: usize = 64;
    #[cfg(feature = "large")]
    pub const MAX_ACCOUNTS: usize = 1024;

    pub const MAX_STRATEGIES: usize = 8;
    pub const MAX_TIERS: usize = 4;
    pub const MAX_PENDING: usize = MAX_ACCOUNTS;

    /// Ledger key holding in-flight batch shares. Not a real signer key.
    pub const ROUTER_HOLDER: [u8; 32] = [0xFF; 32];
    pub const NO_OWNER: [u8; 32] = [0u8; 32];

    /// Residual a venue may strand on removal before we refuse to retire it.
    pub const DUST_TOLERANCE: u128 = 1;

    pub const VENUE_SIMPLE: u8 = 0;
    pub const VENUE_COMPOUNDING: u8 = 1;
    pub const VENUE_FIXED_TERM: u8 = 2;

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum VaultError {
        InsufficientLiquidity,
        BatchNotReady,
        InvalidAmount,
        DuplicateStrategy,
        UnknownStrategy,
        UnknownTier,
        Unauthorized,
        CapacityExceeded,
        AccountNotFound,
        Overflow,
    }

    /// 128-bit value stored as two u64 words so the containing structs stay
    /// 8-aligned inside a byte slab.
    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct U128 {
        pub lo: u64,
        pub hi: u64,
    }

    impl U128 {
        pub const ZERO: U128 = U128 { lo: 0, hi: 0 };

        #[inline]
        pub fn new(v: u128) -> Self {
            U128 { lo: v as u64, hi: (v >> 64) as u64 }
        }

        #[inline]
        pub fn get(&self) -> u128 {
            ((self.hi as u128) << 64) | (self.lo as u128)
        }

        #[inline]
        pub fn set(&mut self, v: u128) {
            self.lo = v as u64;
            self.hi = (v >> 64) as u64;
        }

        #[inline]
        pub fn try_add(&mut self, v: u128) -> Result<(), VaultError> {
            let s = self.get().checked_add(v).ok_or(VaultError::Overflow)?;
            self.set(s);
            Ok(())
        }

        #[inline]
        pub fn try_sub(&mut self, v: u128) -> Result<(), VaultError> {
            let s = self.get().checked_sub(v).ok_or(VaultError::Overflow)?;
            self.set(s);
            Ok(())
        }
    }

    /// `a * b / den` with overflow checking. `den == 0` is reported as overflow.
    pub fn mul_div(a: u128, b: u128, den: u128) -> Result<u128, VaultError> {
        if den == 0 {
            return Err(VaultError::Overflow);
        }
        Ok(a.checked_mul(b).ok_or(VaultError::Overflow)? / den)
    }

    /// Mock interest-bearing venue. Accrual is lazy: interest earned since
    /// `last_update_ts` exists only implicitly until a checkpoint folds it
    /// into `accrued`.
    #[repr(C)]
    #[derive(Clone, Copy, Zeroable)]
    pub struct VenueState {
        pub kind: u8,
        pub _pad: [u8; 7],
        pub apy_bps: u64,
        pub maturity_ts: u64,
        pub last_update_ts: u64,
        pub principal: U128,
        pub accrued: U128,
        pub lifetime_accrued: U128,
    }

    impl VenueState {
        /// Interest earned since the last checkpoint, not yet recorded.
        fn pending(&self, now: u64) -> Result<u128, VaultError> {
            let elapsed = now.saturating_sub(self.last_update_ts) as u128;
            if elapsed == 0 || self.apy_bps == 0 {
                return Ok(0);
            }
            let base = match self.kind {
                VENUE_COMPOUNDING => self
                    .principal
                    .get()
                    .checked_add(self.accrued.get())
                    .ok_or(VaultError::Overflow)?,
                _ => self.principal.get(),
            };
            mul_div(
                base,
                (self.apy_bps as u128)
                    .checked_mul(elapsed)
                    .ok_or(VaultError::Overflow)?,
                (BPS_DENOM as u128) * (SECONDS_PER_YEAR as u128),
            )
        }

        /// Folds pending interest into `accrued`. Every state transition goes
        /// through here first, so a rate change is never retroactive.
        pub fn checkpoint(&mut self, now: u64) -> Result<(), VaultError> {
            let delta = self.pending(now)?;
            if delta > 0 {
                self.accrued.try_add(delta)?;
                self.lifetime_accrued.try_add(delta)?;
            }
            if now > self.last_update_ts {
                self.last_update_ts = now;
            }
            Ok(())
        }

        pub fn balance(&self, now: u64) -> Result<u128, VaultError> {
            self.principal
                .get()
                .checked_add(self.accrued.get())
                .and_then(|b| b.checked_add(self.pending(now).ok()?))
                .ok_or(VaultError::Overflow)
        }

        fn locked(&self, now: u64) -> bool {
            self.kind == VENUE_FIXED_TERM && now < self.maturity_ts
        }

        pub fn max_withdrawable(&self, now: u64) -> Result<u128, VaultError> {
            if self.locked(now) {
                Ok(0)
            } else {
                self.balance(now)
            }
        }
    }

    /// Per-strategy adapter owned by exactly one vault. Every mutating call
    /// carries the caller's vault id and is refused on mismatch, so a bridge
    /// can never be driven by a vault it was not issued to.
    #[repr(C)]
    #[derive(Clone, Copy, Zeroable)]
    pub struct Bridge {
        pub owner: u64,
        pub venue_key: [u8; 32],
        pub venue: VenueState,
    }

    impl Bridge {
        fn authorize(&self, caller: u64) -> Result<(), VaultError> {
            if caller != self.owner {
                return Err(VaultError::Unauthorized);
            }
            Ok(())
        }

        pub fn deposit(&mut self, caller: u64, amount: u128, now: u64) -> Result<(), VaultError> {
            self.authorize(caller)?;
            self.venue.checkpoint(now)?;
            self.venue.principal.try_add(amount)
        }

        pub fn withdraw(&mut self, caller: u64, amount: u128, now: u64) -> Result<(), VaultError> {
            self.authorize(caller)?;
            self.venue.checkpoint(now)?;
            if self.venue.locked(now) {
                return Err(VaultError::InsufficientLiquidity);
            }
            let accrued = self.venue.accrued.get();
            if amount <= accrued {
                self.venue.accrued.try_sub(amount)
            } else {
                let from_principal = amount - accrued;
                if from_principal > self.venue.principal.get() {
                    return Err(VaultError::InsufficientLiquidity);
                }
                self.venue.accrued.set(0);
                self.venue.principal.try_sub(from_principal)
            }
        }

        /// Realizes accrued interest into principal and reports it.
        pub fn harvest(&mut self, caller: u64, now: u64) -> Result<u128, VaultError> {
            self.authorize(caller)?;
            self.venue.checkpoint(now)?;
            let realized = self.venue.accrued.get();
            self.venue.accrued.set(0);
            self.venue.principal.try_add(realized)?;
            Ok(realized)
        }

        pub fn set_apy(&mut self, caller: u64, apy_bps: u64, now: u64) -> Result<(), VaultError> {
            self.authorize(caller)?;
            self.venue.checkpoint(now)?;
            self.venue.apy_bps = apy_bps;
            Ok(())
        }

        pub fn balance_of(&self, now: u64) -> Result<u128, VaultError> {
            self.venue.balance(now)
        }

        pub fn max_withdrawable(&self, now: u64) -> Result<u128, VaultError> {
            self.venue.max_withdrawable(now)
        }

        pub fn apy_bps(&self) -> u64 {
            self.venue.apy_bps
        }
    }

    #[repr(C)]
    #[derive(Clone, Copy, Zeroable)]
    pub struct ShareAccount {
        pub owner: [u8; 32],
        pub shares: U128,
    }

    /// One risk tier: a share ledger over idle assets plus up to
    /// MAX_STRATEGIES allocation bridges.
    #[repr(C)]
    #[derive(Clone, Copy, Zeroable)]
    pub struct Vault {
        pub id: u64,
        pub strategy_count: u64,
        pub min_rebalance_gap_bps: u64,
        pub performance_fee_bps: u64,
        pub last_report_ts: u64,
        pub _pad: u64,
        pub total_shares: U128,
        pub idle: U128,
        pub last_report_assets: U128,
        pub lifetime_deposited: U128,
        pub lifetime_withdrawn: U128,
        pub retired_accrued: U128,
        pub dust_written_off: U128,
        pub fee_recipient: [u8; 32],
        pub strategies: [Bridge; MAX_STRATEGIES],
        pub accounts: [ShareAccount; MAX_ACCOUNTS],
    }

    impl Vault {
        pub fn find_account(&self, owner: &[u8; 32]) -> Option<usize> {
            self.accounts.iter().position(|a| a.owner == *owner)
        }

        fn find_or_create_account(&mut self, owner: &[u8; 32]) -> Result<usize, VaultError> {
            if let Some(i) = self.find_account(owner) {
                return Ok(i);
            }
            let i = self
                .accounts
                .iter()
                .position(|a| a.owner == NO_OWNER)
                .ok_or(VaultError::CapacityExceeded)?;
            self.accounts[i].owner = *owner;
            self.accounts[i].shares = U128::ZERO;
            Ok(i)
        }

        pub fn can_credit(&self, owner: &[u8; 32]) -> bool {
            self.find_account(owner).is_some()
                || self.accounts.iter().any(|a| a.owner == NO_OWNER)
        }

        pub fn shares_of(&self, owner: &[u8; 32]) -> u128 {
            self.find_account(owner)
                .map(|i| self.accounts[i].shares.get())
                .unwrap_or(0)
        }

        fn credit_shares(&mut self, owner: &[u8; 32], amount: u128) -> Result<(), VaultError> {
            let i = self.find_or_create_account(owner)?;
            self.accounts[i].shares.try_add(amount)
        }

        fn debit_shares(&mut self, owner: &[u8; 32], amount: u128) -> Result<(), VaultError> {
            let i = self.find_account(owner).ok_or(VaultError::AccountNotFound)?;
            let held = self.accounts[i].shares.get();
            if amount > held {
                return Err(VaultError::InvalidAmount);
            }
            self.accounts[i].shares.set(held - amount);
            if held == amount {
                self.accounts[i].owner = NO_OWNER;
            }
            Ok(())
        }

        /// Moves shares between ledger keys without touching total supply.
        pub fn transfer_shares(
            &mut self,
            from: &[u8; 32],
            to: &[u8; 32],
            amount: u128,
        ) -> Result<(), VaultError> {
            if self.shares_of(from) < amount {
                return Err(VaultError::InvalidAmount);
            }
            // Reserve the destination slot first so the debit cannot strand.
            self.find_or_create_account(to)?;
            self.debit_shares(from, amount)?;
            self.credit_shares(to, amount)
        }

        pub fn total_assets(&self, now: u64) -> Result<u128, VaultError> {
            let mut total = self.idle.get();
            for i in 0..self.strategy_count as usize {
                total = total
                    .checked_add(self.strategies[i].balance_of(now)?)
                    .ok_or(VaultError::Overflow)?;
            }
            Ok(total)
        }

        /// Share price scaled by 1e6. An empty vault quotes par.
        pub fn share_price_e6(&self, now: u64) -> Result<u128, VaultError> {
            let supply = self.total_shares.get();
            if supply == 0 {
                return Ok(1_000_000);
            }
            mul_div(self.total_assets(now)?, 1_000_000, supply)
        }

        pub fn deposit(
            &mut self,
            owner: &[u8; 32],
            assets: u128,
            now: u64,
        ) -> Result<u128, VaultError> {
            if assets == 0 {
                return Err(VaultError::InvalidAmount);
            }
            let supply = self.total_shares.get();
            let shares = if supply == 0 {
                assets
            } else {
                mul_div(assets, supply, self.total_assets(now)?)?
            };
            if shares == 0 {
                return Err(VaultError::InvalidAmount);
            }
            self.credit_shares(owner, shares)?;
            self.total_shares.try_add(shares)?;
            self.idle.try_add(assets)?;
            self.lifetime_deposited.try_add(assets)?;
            Ok(shares)
        }

        pub fn redeem(
            &mut self,
            owner: &[u8; 32],
            shares: u128,
            now: u64,
        ) -> Result<u128, VaultError> {
            if shares == 0 {
                return Err(VaultError::InvalidAmount);
            }
            let held = self.shares_of(owner);
            if self.find_account(owner).is_none() {
                return Err(VaultError::AccountNotFound);
            }
            if shares > held {
                return Err(VaultError::InvalidAmount);
            }
            let supply = self.total_shares.get();
            let assets = mul_div(shares, self.total_assets(now)?, supply)?;

            // Liquidity precheck before any mutation: the redemption either
            // settles in full or leaves the vault untouched.
            let mut available = self.idle.get();
            for i in 0..self.strategy_count as usize {
                available = available
                    .checked_add(self.strategies[i].max_withdrawable(now)?)
                    .ok_or(VaultError::Overflow)?;
                if available >= assets {
                    break;
                }
            }
            if available < assets {
                return Err(VaultError::InsufficientLiquidity);
            }

            self.debit_shares(owner, shares)?;
            self.total_shares.try_sub(shares)?;

            let from_idle = self.idle.get().min(assets);
            self.idle.try_sub(from_idle)?;
            let mut need = assets - from_idle;
            let id = self.id;
            for i in 0..self.strategy_count as usize {
                if need == 0 {
                    break;
                }
                let take = need.min(self.strategies[i].max_withdrawable(now)?);
                if take > 0 {
                    self.strategies[i].withdraw(id, take, now)?;
                    need -= take;
                }
            }
            debug_assert!(need == 0);
            self.lifetime_withdrawn.try_add(assets)?;
            Ok(assets)
        }

        pub fn add_strategy(
            &mut self,
            venue_key: [u8; 32],
            kind: u8,
            apy_bps: u64,
            maturity_ts: u64,
            now: u64,
        ) -> Result<usize, VaultError> {
            if kind > VENUE_FIXED_TERM {
                return Err(VaultError::InvalidAmount);
            }
            let n = self.strategy_count as usize;
            for i in 0..n {
                if self.strategies[i].venue_key == venue_key {
                    return Err(VaultError::DuplicateStrategy);
                }
            }
            if n == MAX_STRATEGIES {
                return Err(VaultError::CapacityExceeded);
            }
            self.strategies[n] = Bridge {
                owner: self.id,
                venue_key,
                venue: VenueState {
                    kind,
                    _pad: [0; 7],
                    apy_bps,
                    maturity_ts,
                    last_update_ts: now,
                    principal: U128::ZERO,
                    accrued: U128::ZERO,
                    lifetime_accrued: U128::ZERO,
                },
            };
            self.strategy_count += 1;
            Ok(n)
        }

        /// Liquidates a strategy back to idle and drops it. The vacated index
        /// is backfilled from the tail, so previously read indices are stale
        /// after this returns.
        pub fn remove_strategy(&mut self, index: usize, now: u64) -> Result<u128, VaultError> {
            let n = self.strategy_count as usize;
            if index >= n {
                return Err(VaultError::UnknownStrategy);
            }
            let b = &mut self.strategies[index];
            b.venue.checkpoint(now)?;
            let held = b
                .venue
                .principal
                .get()
                .checked_add(b.venue.accrued.get())
                .ok_or(VaultError::Overflow)?;
            let freed = if b.venue.locked(now) { 0 } else { held };
            let residual = held - freed;
            if residual > DUST_TOLERANCE {
                return Err(VaultError::InsufficientLiquidity);
            }
            let lifetime = b.venue.lifetime_accrued.get();
            b.venue.principal.set(0);
            b.venue.accrued.set(0);
            self.idle.try_add(freed)?;
            self.retired_accrued.try_add(lifetime)?;
            self.dust_written_off.try_add(residual)?;
            self.strategies[index] = self.strategies[n - 1];
            self.strategies[n - 1] = Bridge::zeroed();
            self.strategy_count -= 1;
            Ok(freed)
        }

        /// APY-weighted reallocation. Returns whether any funds moved; a
        /// drift below the configured gap is a silent no-op.
        pub fn rebalance(&mut self, now: u64) -> Result<bool, VaultError> {
            let n = self.strategy_count as usize;
            if n == 0 {
                return Ok(false);
            }
            let mut balances = [0u128; MAX_STRATEGIES];
            let mut total = self.idle.get();
            for i in 0..n {
                balances[i] = self.strategies[i].balance_of(now)?;
                total = total.checked_add(balances[i]).ok_or(VaultError::Overflow)?;
            }
            if total == 0 {
                return Ok(false);
            }

            let mut scores = [0u128; MAX_STRATEGIES];
            let mut score_sum: u128 = 0;
            for i in 0..n {
                scores[i] = (self.strategies[i].apy_bps() as u128)
                    .checked_mul(balances[i])
                    .ok_or(VaultError::Overflow)?;
                score_sum = score_sum.checked_add(scores[i]).ok_or(VaultError::Overflow)?;
            }

            // A dead score board (fresh vault, or every venue at zero) falls
            // back to an equal split so capital still deploys.
            let mut targets = [0u128; MAX_STRATEGIES];
            for i in 0..n {
                targets[i] = if score_sum == 0 {
                    total / n as u128
                } else {
                    mul_div(scores[i], total, score_sum)?
                };
            }

            let threshold = mul_div(total, self.min_rebalance_gap_bps as u128, BPS_DENOM as u128)?;
            let mut max_gap: u128 = 0;
            for i in 0..n {
                let gap = balances[i].abs_diff(targets[i]);
                if gap > max_gap {
                    max_gap = gap;
                }
            }
            if max_gap <= threshold {
                return Ok(false);
            }

            let id = self.id;
            let mut pool = self.idle.get();
            self.idle.set(0);
            for i in 0..n {
                if balances[i] > targets[i] {
                    let want = balances[i] - targets[i];
                    // Locked venues fill what they can; never revert on a
                    // partially illiquid surplus.
                    let take = want.min(self.strategies[i].max_withdrawable(now)?);
                    if take > 0 {
                        self.strategies[i].withdraw(id, take, now)?;
                        pool = pool.checked_add(take).ok_or(VaultError::Overflow)?;
                    }
                }
            }

            let mut deficit_sum: u128 = 0;
            for i in 0..n {
                if targets[i] > balances[i] {
                    deficit_sum = deficit_sum
                        .checked_add(targets[i] - balances[i])
                        .ok_or(VaultError::Overflow)?;
                }
            }
            if deficit_sum > 0 {
                let grant_total = pool.min(deficit_sum);
                for i in 0..n {
                    if targets[i] > balances[i] {
                        let need = targets[i] - balances[i];
                        let grant = if pool >= deficit_sum {
                            need
                        } else {
                            mul_div(need, grant_total, deficit_sum)?
                        };
                        if grant > 0 {
                            self.strategies[i].deposit(id, grant, now)?;
                            pool -= grant;
                        }
                    }
                }
            }
            self.idle.set(pool);
            self.last_report_ts = now;
            self.last_report_assets.set(total);
            Ok(true)
        }

        /// Harvests every bridge and mints the performance fee to the fee
        /// recipient as shares, diluting holders by exactly the fee amount.
        pub fn compound(&mut self, now: u64) -> Result<u128, VaultError> {
            let id = self.id;
            let mut realized: u128 = 0;
            for i in 0..self.strategy_count as usize {
                realized = realized
                    .checked_add(self.strategies[i].harvest(id, now)?)
                    .ok_or(VaultError::Overflow)?;
            }
            if realized == 0 || self.performance_fee_bps == 0 || self.total_shares.get() == 0 {
                return Ok(0);
            }
            let fee_assets = mul_div(realized, self.performance_fee_bps as u128, BPS_DENOM as u128)?;
            if fee_assets == 0 {
                return Ok(0);
            }
            let total = self.total_assets(now)?;
            let denom = total.checked_sub(fee_assets).ok_or(VaultError::Overflow)?;
            if denom == 0 {
                return Ok(0);
            }
            let fee_shares = mul_div(fee_assets, self.total_shares.get(), denom)?;
            if fee_shares == 0 {
                return Ok(0);
            }
            let recipient = self.fee_recipient;
            self.credit_shares(&recipient, fee_shares)?;
            self.total_shares.try_add(fee_shares)?;
            Ok(fee_shares)
        }

        pub fn set_strategy_apy(&mut self, index: usize, apy_bps: u64, now: u64) -> Result<(), VaultError> {
            if index >= self.strategy_count as usize {
                return Err(VaultError::UnknownStrategy);
            }
            let id = self.id;
            self.strategies[index].set_apy(id, apy_bps, now)
        }

        /// Exact integer conservation: the ledger's share supply matches the
        /// per-account sum, and held assets reconcile against the lifetime
        /// flow counters.
        pub fn check_conservation(&self) -> bool {
            let mut share_sum: u128 = 0;
            for a in self.accounts.iter() {
                share_sum = match share_sum.checked_add(a.shares.get()) {
                    Some(s) => s,
                    None => return false,
                };
            }
            if share_sum != self.total_shares.get() {
                return false;
            }
            let mut held = self.idle.get();
            let mut accrued_total: u128 = 0;
            for i in 0..self.strategy_count as usize {
                let v = &self.strategies[i].venue;
                held = match held
                    .checked_add(v.principal.get())
                    .and_then(|h| h.checked_add(v.accrued.get()))
                {
                    Some(h) => h,
                    None => return false,
                };
                accrued_total = match accrued_total.checked_add(v.lifetime_accrued.get()) {
                    Some(a) => a,
                    None => return false,
                };
            }
            let rhs = self
                .lifetime_deposited
                .get()
                .checked_sub(self.lifetime_withdrawn.get())
                .and_then(|r| r.checked_add(accrued_total))
                .and_then(|r| r.checked_add(self.retired_accrued.get()))
                .and_then(|r| r.checked_sub(self.dust_written_off.get()));
            rhs == Some(held)
        }
    }

    #[repr(C)]
    #[derive(Clone, Copy, Zeroable)]
    pub struct PendingEntry {
        pub owner: [u8; 32],
        pub amount: U128,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Zeroable)]
    pub struct ClaimEntry {
        pub owner: [u8; 32],
        pub shares: U128,
        pub assets: U128,
    }

    /// Request queues and settled-but-unclaimed balances for one tier.
    /// Deposit and withdraw batches run on independent cadences.
    #[repr(C)]
    #[derive(Clone, Copy, Zeroable)]
    pub struct TierQueue {
        pub deposit_count: u64,
        pub withdraw_count: u64,
        pub last_deposit_batch_ts: u64,
        pub last_withdraw_batch_ts: u64,
        pub pending_deposit_total: U128,
        pub pending_withdraw_shares: U128,
        pub dust_assets: U128,
        pub deposits: [PendingEntry; MAX_PENDING],
        pub withdraws: [PendingEntry; MAX_PENDING],
        pub claims: [ClaimEntry; MAX_ACCOUNTS],
    }

    impl TierQueue {
        fn find_claim(&self, owner: &[u8; 32]) -> Option<usize> {
            self.claims.iter().position(|c| c.owner == *owner)
        }

        fn free_claim_slots(&self) -> usize {
            self.claims.iter().filter(|c| c.owner == NO_OWNER).count()
        }

        fn claim_or_create(&mut self, owner: &[u8; 32]) -> Result<usize, VaultError> {
            if let Some(i) = self.find_claim(owner) {
                return Ok(i);
            }
            let i = self
                .claims
                .iter()
                .position(|c| c.owner == NO_OWNER)
                .ok_or(VaultError::CapacityExceeded)?;
            self.claims[i] = ClaimEntry {
                owner: *owner,
                shares: U128::ZERO,
                assets: U128::ZERO,
            };
            Ok(i)
        }

        fn release_claim_if_empty(&mut self, i: usize) {
            if self.claims[i].shares.get() == 0 && self.claims[i].assets.get() == 0 {
                self.claims[i] = ClaimEntry::zeroed();
            }
        }

        /// Claim slots a batch of these entries would newly occupy.
        fn claim_slots_needed(&self, entries: &[PendingEntry], n: usize) -> usize {
            entries[..n]
                .iter()
                .filter(|e| self.find_claim(&e.owner).is_none())
                .count()
        }

        fn enqueue(
            entries: &mut [PendingEntry],
            count: &mut u64,
            owner: &[u8; 32],
            amount: u128,
        ) -> Result<(), VaultError> {
            let n = *count as usize;
            for e in entries[..n].iter_mut() {
                if e.owner == *owner {
                    return e.amount.try_add(amount);
                }
            }
            if n == MAX_PENDING {
                return Err(VaultError::CapacityExceeded);
            }
            entries[n] = PendingEntry {
                owner: *owner,
                amount: U128::new(amount),
            };
            *count += 1;
            Ok(())
        }
    }

    #[repr(C)]
    #[derive(Clone, Copy, Zeroable)]
    pub struct Router {
        pub batch_interval: u64,
        pub tier_count: u64,
        pub tier_vault: [u64; MAX_TIERS],
        pub tiers: [TierQueue; MAX_TIERS],
    }

    #[derive(Clone, Copy, Debug)]
    pub struct PoolParams {
        pub num_tiers: u64,
        pub batch_interval: u64,
        pub min_rebalance_gap_bps: u64,
        pub performance_fee_bps: u64,
        pub fee_recipient: [u8; 32],
    }

    /// The whole pool: one router over per-tier vaults. Lives zero-copy
    /// inside the slab account; construct with `init` on zeroed storage.
    #[repr(C)]
    #[derive(Clone, Copy, Zeroable)]
    pub struct PoolEngine {
        pub vault_count: u64,
        pub router: Router,
        pub vaults: [Vault; MAX_TIERS],
    }

    impl PoolEngine {
        pub fn init(&mut self, params: &PoolParams, now: u64) -> Result<(), VaultError> {
            let tiers = params.num_tiers as usize;
            if tiers == 0 || tiers > MAX_TIERS {
                return Err(VaultError::UnknownTier);
            }
            if params.batch_interval == 0 {
                return Err(VaultError::InvalidAmount);
            }
            self.vault_count = params.num_tiers;
            self.router.batch_interval = params.batch_interval;
            self.router.tier_count = params.num_tiers;
            for t in 0..tiers {
                self.router.tier_vault[t] = t as u64;
                self.router.tiers[t].last_deposit_batch_ts = now;
                self.router.tiers[t].last_withdraw_batch_ts = now;
                let v = &mut self.vaults[t];
                v.id = t as u64;
                v.min_rebalance_gap_bps = params.min_rebalance_gap_bps;
                v.performance_fee_bps = params.performance_fee_bps;
                v.fee_recipient = params.fee_recipient;
            }
            Ok(())
        }

        pub fn batch_interval(&self) -> u64 {
            self.router.batch_interval
        }

        fn check_tier(&self, tier: usize) -> Result<usize, VaultError> {
            if tier >= self.router.tier_count as usize {
                return Err(VaultError::UnknownTier);
            }
            let vidx = self.router.tier_vault[tier] as usize;
            if vidx >= self.vault_count as usize {
                return Err(VaultError::UnknownTier);
            }
            Ok(vidx)
        }

        pub fn vault(&self, tier: usize) -> Result<&Vault, VaultError> {
            let vidx = self.check_tier(tier)?;
            Ok(&self.vaults[vidx])
        }

        pub fn vault_mut(&mut self, tier: usize) -> Result<&mut Vault, VaultError> {
            let vidx = self.check_tier(tier)?;
            Ok(&mut self.vaults[vidx])
        }

        fn tier_pair(&mut self, tier: usize) -> Result<(&mut TierQueue, &mut Vault), VaultError> {
            let vidx = self.check_tier(tier)?;
            let PoolEngine { router, vaults, .. } = self;
            Ok((&mut router.tiers[tier], &mut vaults[vidx]))
        }

        // --- direct vault surface ---

        pub fn vault_deposit(
            &mut self,
            tier: usize,
            owner: &[u8; 32],
            assets: u128,
            now: u64,
        ) -> Result<u128, VaultError> {
            self.vault_mut(tier)?.deposit(owner, assets, now)
        }

        pub fn vault_redeem(
            &mut self,
            tier: usize,
            owner: &[u8; 32],
            shares: u128,
            now: u64,
        ) -> Result<u128, VaultError> {
            self.vault_mut(tier)?.redeem(owner, shares, now)
        }

        pub fn add_strategy(
            &mut self,
            tier: usize,
            venue_key: [u8; 32],
            kind: u8,
            apy_bps: u64,
            maturity_ts: u64,
            now: u64,
        ) -> Result<usize, VaultError> {
            self.vault_mut(tier)?.add_strategy(venue_key, kind, apy_bps, maturity_ts, now)
        }

        pub fn remove_strategy(
            &mut self,
            tier: usize,
            index: usize,
            now: u64,
        ) -> Result<u128, VaultError> {
            self.vault_mut(tier)?.remove_strategy(index, now)
        }

        pub fn rebalance(&mut self, tier: usize, now: u64) -> Result<bool, VaultError> {
            self.vault_mut(tier)?.rebalance(now)
        }

        pub fn compound(&mut self, tier: usize, now: u64) -> Result<u128, VaultError> {
            self.vault_mut(tier)?.compound(now)
        }

        pub fn set_strategy_apy(
            &mut self,
            tier: usize,
            index: usize,
            apy_bps: u64,
            now: u64,
        ) -> Result<(), VaultError> {
            self.vault_mut(tier)?.set_strategy_apy(index, apy_bps, now)
        }

        /// Rebinding is only legal while the tier has no in-flight router
        /// state; queued requests and unclaimed balances reference shares
        /// held in the currently bound vault.
        pub fn set_tier_vault(&mut self, tier: usize, vault_idx: usize) -> Result<(), VaultError> {
            if tier >= self.router.tier_count as usize {
                return Err(VaultError::UnknownTier);
            }
            if vault_idx >= self.vault_count as usize {
                return Err(VaultError::InvalidAmount);
            }
            let q = &self.router.tiers[tier];
            if q.deposit_count != 0
                || q.withdraw_count != 0
                || q.claims.iter().any(|c| c.owner != NO_OWNER)
            {
                return Err(VaultError::InvalidAmount);
            }
            self.router.tier_vault[tier] = vault_idx as u64;
            Ok(())
        }

        // --- batching router ---

        pub fn router_deposit(
            &mut self,
            tier: usize,
            owner: &[u8; 32],
            amount: u64,
        ) -> Result<(), VaultError> {
            if amount == 0 {
                return Err(VaultError::InvalidAmount);
            }
            self.check_tier(tier)?;
            let q = &mut self.router.tiers[tier];
            TierQueue::enqueue(&mut q.deposits, &mut q.deposit_count, owner, amount as u128)?;
            q.pending_deposit_total.try_add(amount as u128)
        }

        pub fn router_withdraw(
            &mut self,
            tier: usize,
            owner: &[u8; 32],
            shares: u128,
        ) -> Result<(), VaultError> {
            if shares == 0 {
                return Err(VaultError::InvalidAmount);
            }
            let (q, vault) = self.tier_pair(tier)?;
            // Queue capacity first, so the share pull below cannot strand.
            let n = q.withdraw_count as usize;
            let have_slot = q.withdraws[..n].iter().any(|e| e.owner == *owner) || n < MAX_PENDING;
            if !have_slot {
                return Err(VaultError::CapacityExceeded);
            }
            vault.transfer_shares(owner, &ROUTER_HOLDER, shares)?;
            TierQueue::enqueue(&mut q.withdraws, &mut q.withdraw_count, owner, shares)?;
            q.pending_withdraw_shares.try_add(shares)
        }

        /// Settles the deposit queue in one vault deposit and apportions the
        /// minted shares pro-rata. The truncation remainder stays with the
        /// router's ledger key.
        pub fn execute_batch_deposits(&mut self, tier: usize, now: u64) -> Result<u128, VaultError> {
            let interval = self.router.batch_interval;
            let (q, vault) = self.tier_pair(tier)?;
            if now.saturating_sub(q.last_deposit_batch_ts) < interval {
                return Err(VaultError::BatchNotReady);
            }
            let n = q.deposit_count as usize;
            if n == 0 {
                return Err(VaultError::InvalidAmount);
            }
            if q.claim_slots_needed(&q.deposits, n) > q.free_claim_slots() {
                return Err(VaultError::CapacityExceeded);
            }
            if !vault.can_credit(&ROUTER_HOLDER) {
                return Err(VaultError::CapacityExceeded);
            }
            let aggregate = q.pending_deposit_total.get();
            let minted = vault.deposit(&ROUTER_HOLDER, aggregate, now)?;
            for i in 0..n {
                let entry = q.deposits[i];
                let part = mul_div(entry.amount.get(), minted, aggregate)?;
                if part > 0 {
                    let c = q.claim_or_create(&entry.owner)?;
                    q.claims[c].shares.try_add(part)?;
                }
                q.deposits[i] = PendingEntry::zeroed();
            }
            q.deposit_count = 0;
            q.pending_deposit_total.set(0);
            q.last_deposit_batch_ts = now;
            Ok(minted)
        }

        /// Settles the withdraw queue in one vault redemption. An illiquid
        /// vault fails the whole batch with the queue intact.
        pub fn execute_batch_withdraws(&mut self, tier: usize, now: u64) -> Result<u128, VaultError> {
            let interval = self.router.batch_interval;
            let (q, vault) = self.tier_pair(tier)?;
            if now.saturating_sub(q.last_withdraw_batch_ts) < interval {
                return Err(VaultError::BatchNotReady);
            }
            let n = q.withdraw_count as usize;
            if n == 0 {
                return Err(VaultError::InvalidAmount);
            }
            if q.claim_slots_needed(&q.withdraws, n) > q.free_claim_slots() {
                return Err(VaultError::CapacityExceeded);
            }
            let aggregate = q.pending_withdraw_shares.get();
            let assets = vault.redeem(&ROUTER_HOLDER, aggregate, now)?;
            let mut distributed: u128 = 0;
            for i in 0..n {
                let entry = q.withdraws[i];
                let part = mul_div(entry.amount.get(), assets, aggregate)?;
                if part > 0 {
                    let c = q.claim_or_create(&entry.owner)?;
                    q.claims[c].assets.try_add(part)?;
                    distributed = distributed.checked_add(part).ok_or(VaultError::Overflow)?;
                }
                q.withdraws[i] = PendingEntry::zeroed();
            }
            q.dust_assets.try_add(assets - distributed)?;
            q.withdraw_count = 0;
            q.pending_withdraw_shares.set(0);
            q.last_withdraw_batch_ts = now;
            Ok(assets)
        }

        /// Idempotent: claiming with nothing settled returns zero.
        pub fn claim_deposit_shares(
            &mut self,
            tier: usize,
            owner: &[u8; 32],
        ) -> Result<u128, VaultError> {
            let (q, vault) = self.tier_pair(tier)?;
            let i = match q.find_claim(owner) {
                Some(i) => i,
                None => return Ok(0),
            };
            let shares = q.claims[i].shares.get();
            if shares == 0 {
                return Ok(0);
            }
            vault.transfer_shares(&ROUTER_HOLDER, owner, shares)?;
            q.claims[i].shares.set(0);
            q.release_claim_if_empty(i);
            Ok(shares)
        }

        /// Idempotent; the caller is responsible for moving the returned
        /// token amount out of the pool's asset account.
        pub fn claim_withdraw_assets(
            &mut self,
            tier: usize,
            owner: &[u8; 32],
        ) -> Result<u128, VaultError> {
            self.check_tier(tier)?;
            let q = &mut self.router.tiers[tier];
            let i = match q.find_claim(owner) {
                Some(i) => i,
                None => return Ok(0),
            };
            let assets = q.claims[i].assets.get();
            if assets == 0 {
                return Ok(0);
            }
            q.claims[i].assets.set(0);
            q.release_claim_if_empty(i);
            Ok(assets)
        }

        // --- views ---

        pub fn total_assets(&self, tier: usize, now: u64) -> Result<u128, VaultError> {
            self.vault(tier)?.total_assets(now)
        }

        pub fn share_price_e6(&self, tier: usize, now: u64) -> Result<u128, VaultError> {
            self.vault(tier)?.share_price_e6(now)
        }

        pub fn shares_of(&self, tier: usize, owner: &[u8; 32]) -> Result<u128, VaultError> {
            Ok(self.vault(tier)?.shares_of(owner))
        }

        pub fn total_pending_deposits(&self, tier: usize) -> Result<u128, VaultError> {
            self.check_tier(tier)?;
            Ok(self.router.tiers[tier].pending_deposit_total.get())
        }

        pub fn total_pending_withdraw_shares(&self, tier: usize) -> Result<u128, VaultError> {
            self.check_tier(tier)?;
            Ok(self.router.tiers[tier].pending_withdraw_shares.get())
        }

        pub fn claimable(&self, tier: usize, owner: &[u8; 32]) -> Result<(u128, u128), VaultError> {
            self.check_tier(tier)?;
            let q = &self.router.tiers[tier];
            Ok(match q.find_claim(owner) {
                Some(i) => (q.claims[i].shares.get(), q.claims[i].assets.get()),
                None => (0, 0),
            })
        }

        /// Every vault's ledger and flow identity, plus the router never
        /// promising more shares than it holds.
        pub fn check_conservation(&self) -> bool {
            for t in 0..self.vault_count as usize {
                if !self.vaults[t].check_conservation() {
                    return false;
                }
            }
            for t in 0..self.router.tier_count as usize {
                let vidx = self.router.tier_vault[t] as usize;
                let q = &self.router.tiers[t];
                let mut promised: u128 = 0;
                for c in q.claims.iter() {
                    promised = match promised.checked_add(c.shares.get()) {
                        Some(p) => p,
                        None => return false,
                    };
                }
                let holding = self.vaults[vidx]
                    .shares_of(&ROUTER_HOLDER)
                    .checked_sub(q.pending_withdraw_shares.get());
                match holding {
                    Some(free) => {
                        if promised > free {
                            return false;
                        }
                    }
                    None => return false,
                }
            }
            true
        }
    }
}

// 3. mod zc (Zero-Copy unsafe island)
#[allow(unsafe_code)]
pub mod zc {
    use solana_program::program_error::ProgramError;
    use crate::constants::{ENGINE_ALIGN, ENGINE_LEN, ENGINE_OFF};
    use crate::engine::PoolEngine;

    #[inline]
    pub fn engine_ref<'a>(data: &'a [u8]) -> Result<&'a PoolEngine, ProgramError> {
        if data.len() < ENGINE_OFF + ENGINE_LEN {
            return Err(ProgramError::InvalidAccountData);
        }
        let ptr = unsafe { data.as_ptr().add(ENGINE_OFF) };
        if (ptr as usize) % ENGINE_ALIGN != 0 {
            return Err(ProgramError::InvalidAccountData);
        }
        Ok(unsafe { &*(ptr as *const PoolEngine) })
    }

    #[inline]
    pub fn engine_mut<'a>(data: &'a mut [u8]) -> Result<&'a mut PoolEngine, ProgramError> {
        if data.len() < ENGINE_OFF + ENGINE_LEN {
            return Err(ProgramError::InvalidAccountData);
        }
        let ptr = unsafe { data.as_mut_ptr().add(ENGINE_OFF) };
        if (ptr as usize) % ENGINE_ALIGN != 0 {
            return Err(ProgramError::InvalidAccountData);
        }
        Ok(unsafe { &mut *(ptr as *mut PoolEngine) })
    }
}

// 4. mod error
pub mod error {
    use num_derive::FromPrimitive;
    use solana_program::program_error::ProgramError;
    use crate::engine::VaultError;

    #[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
    pub enum ReservoirError {
        InvalidMagic,
        InvalidVersion,
        AlreadyInitialized,
        NotInitialized,
        InvalidSlabLen,
        InvalidVaultAta,
        InvalidMint,
        ExpectedSigner,
        ExpectedWritable,
        Unauthorized,
        InvalidTier,
        // Engine errors mapped:
        EngineInsufficientLiquidity,
        EngineBatchNotReady,
        EngineInvalidAmount,
        EngineDuplicateStrategy,
        EngineUnknownStrategy,
        EngineUnknownTier,
        EngineUnauthorized,
        EngineCapacityExceeded,
        EngineAccountNotFound,
        EngineOverflow,
    }

    impl From<ReservoirError> for ProgramError {
        fn from(e: ReservoirError) -> Self {
            ProgramError::Custom(e as u32)
        }
    }

    pub fn map_vault_error(e: VaultError) -> ProgramError {
        let err = match e {
            VaultError::InsufficientLiquidity => ReservoirError::EngineInsufficientLiquidity,
            VaultError::BatchNotReady => ReservoirError::EngineBatchNotReady,
            VaultError::InvalidAmount => ReservoirError::EngineInvalidAmount,
            VaultError::DuplicateStrategy => ReservoirError::EngineDuplicateStrategy,
            VaultError::UnknownStrategy => ReservoirError::EngineUnknownStrategy,
            VaultError::UnknownTier => ReservoirError::EngineUnknownTier,
            VaultError::Unauthorized => ReservoirError::EngineUnauthorized,
            VaultError::CapacityExceeded => ReservoirError::EngineCapacityExceeded,
            VaultError::AccountNotFound => ReservoirError::EngineAccountNotFound,
            VaultError::Overflow => ReservoirError::EngineOverflow,
        };
        ProgramError::Custom(err as u32)
    }
}

// 5. mod ix
pub mod ix {
    use arrayref::array_ref;
    use solana_program::{program_error::ProgramError, pubkey::Pubkey};

    #[derive(Debug)]
    pub enum Instruction {
        InitPool {
            num_tiers: u8,
            batch_interval: u64,
            min_rebalance_gap_bps: u16,
            performance_fee_bps: u16,
            fee_recipient: Pubkey,
        },
        VaultDeposit { tier: u8, amount: u64 },
        VaultRedeem { tier: u8, shares: u128 },
        AddStrategy {
            tier: u8,
            venue: Pubkey,
            kind: u8,
            apy_bps: u16,
            maturity_ts: u64,
        },
        RemoveStrategy { tier: u8, index: u8 },
        Rebalance { tier: u8 },
        Compound { tier: u8 },
        RouterDeposit { tier: u8, amount: u64 },
        RouterWithdraw { tier: u8, shares: u128 },
        ExecuteBatchDeposits { tier: u8 },
        ExecuteBatchWithdraws { tier: u8 },
        ClaimDepositShares { tier: u8 },
        ClaimWithdrawAssets { tier: u8 },
        SetVenueApy { tier: u8, index: u8, apy_bps: u16 },
        SetTierVault { tier: u8, vault: u8 },
    }

    impl Instruction {
        pub fn decode(input: &[u8]) -> Result<Self, ProgramError> {
            let (&tag, mut rest) = input
                .split_first()
                .ok_or(ProgramError::InvalidInstructionData)?;

            match tag {
                0 => {
                    let num_tiers = read_u8(&mut rest)?;
                    let batch_interval = read_u64(&mut rest)?;
                    let min_rebalance_gap_bps = read_u16(&mut rest)?;
                    let performance_fee_bps = read_u16(&mut rest)?;
                    let fee_recipient = read_pubkey(&mut rest)?;
                    Ok(Instruction::InitPool {
                        num_tiers,
                        batch_interval,
                        min_rebalance_gap_bps,
                        performance_fee_bps,
                        fee_recipient,
                    })
                }
                1 => {
                    let tier = read_u8(&mut rest)?;
                    let amount = read_u64(&mut rest)?;
                    Ok(Instruction::VaultDeposit { tier, amount })
                }
                2 => {
                    let tier = read_u8(&mut rest)?;
                    let shares = read_u128(&mut rest)?;
                    Ok(Instruction::VaultRedeem { tier, shares })
                }
                3 => {
                    let tier = read_u8(&mut rest)?;
                    let venue = read_pubkey(&mut rest)?;
                    let kind = read_u8(&mut rest)?;
                    let apy_bps = read_u16(&mut rest)?;
                    let maturity_ts = read_u64(&mut rest)?;
                    Ok(Instruction::AddStrategy { tier, venue, kind, apy_bps, maturity_ts })
                }
                4 => {
                    let tier = read_u8(&mut rest)?;
                    let index = read_u8(&mut rest)?;
                    Ok(Instruction::RemoveStrategy { tier, index })
                }
                5 => {
                    let tier = read_u8(&mut rest)?;
                    Ok(Instruction::Rebalance { tier })
                }
                6 => {
                    let tier = read_u8(&mut rest)?;
                    Ok(Instruction::Compound { tier })
                }
                7 => {
                    let tier = read_u8(&mut rest)?;
                    let amount = read_u64(&mut rest)?;
                    Ok(Instruction::RouterDeposit { tier, amount })
                }
                8 => {
                    let tier = read_u8(&mut rest)?;
                    let shares = read_u128(&mut rest)?;
                    Ok(Instruction::RouterWithdraw { tier, shares })
                }
                9 => {
                    let tier = read_u8(&mut rest)?;
                    Ok(Instruction::ExecuteBatchDeposits { tier })
                }
                10 => {
                    let tier = read_u8(&mut rest)?;
                    Ok(Instruction::ExecuteBatchWithdraws { tier })
                }
                11 => {
                    let tier = read_u8(&mut rest)?;
                    Ok(Instruction::ClaimDepositShares { tier })
                }
                12 => {
                    let tier = read_u8(&mut rest)?;
                    Ok(Instruction::ClaimWithdrawAssets { tier })
                }
                13 => {
                    let tier = read_u8(&mut rest)?;
                    let index = read_u8(&mut rest)?;
                    let apy_bps = read_u16(&mut rest)?;
                    Ok(Instruction::SetVenueApy { tier, index, apy_bps })
                }
                14 => {
                    let tier = read_u8(&mut rest)?;
                    let vault = read_u8(&mut rest)?;
                    Ok(Instruction::SetTierVault { tier, vault })
                }
                _ => Err(ProgramError::InvalidInstructionData),
            }
        }
    }

    fn read_u8(input: &mut &[u8]) -> Result<u8, ProgramError> {
        let (&val, rest) = input
            .split_first()
            .ok_or(ProgramError::InvalidInstructionData)?;
        *input = rest;
        Ok(val)
    }

    fn read_u16(input: &mut &[u8]) -> Result<u16, ProgramError> {
        if input.len() < 2 {
            return Err(ProgramError::InvalidInstructionData);
        }
        let val = u16::from_le_bytes(*array_ref![input, 0, 2]);
        *input = &input[2..];
        Ok(val)
    }

    fn read_u64(input: &mut &[u8]) -> Result<u64, ProgramError> {
        if input.len() < 8 {
            return Err(ProgramError::InvalidInstructionData);
        }
        let val = u64::from_le_bytes(*array_ref![input, 0, 8]);
        *input = &input[8..];
        Ok(val)
    }

    fn read_u128(input: &mut &[u8]) -> Result<u128, ProgramError> {
        if input.len() < 16 {
            return Err(ProgramError::InvalidInstructionData);
        }
        let val = u128::from_le_bytes(*array_ref![input, 0, 16]);
        *input = &input[16..];
        Ok(val)
    }

    fn read_pubkey(input: &mut &[u8]) -> Result<Pubkey, ProgramError> {
        if input.len() < 32 {
            return Err(ProgramError::InvalidInstructionData);
        }
        let val = Pubkey::new_from_array(*array_ref![input, 0, 32]);
        *input = &input[32..];
        Ok(val)
    }
}

// 6. mod accounts
pub mod accounts {
    use solana_program::{account_info::AccountInfo, program_error::ProgramError, pubkey::Pubkey};
    use crate::error::ReservoirError;

    pub fn expect_len(accounts: &[AccountInfo], n: usize) -> Result<(), ProgramError> {
        if accounts.len() < n {
            return Err(ProgramError::NotEnoughAccountKeys);
        }
        Ok(())
    }

    pub fn expect_signer(ai: &AccountInfo) -> Result<(), ProgramError> {
        if !ai.is_signer {
            return Err(ReservoirError::ExpectedSigner.into());
        }
        Ok(())
    }

    pub fn expect_writable(ai: &AccountInfo) -> Result<(), ProgramError> {
        if !ai.is_writable {
            return Err(ReservoirError::ExpectedWritable.into());
        }
        Ok(())
    }

    pub fn expect_owner(ai: &AccountInfo, owner: &Pubkey) -> Result<(), ProgramError> {
        if ai.owner != owner {
            return Err(ProgramError::IllegalOwner);
        }
        Ok(())
    }

    pub fn expect_key(ai: &AccountInfo, expected: &Pubkey) -> Result<(), ProgramError> {
        if ai.key != expected {
            return Err(ProgramError::InvalidArgument);
        }
        Ok(())
    }

    pub fn derive_vault_authority(program_id: &Pubkey, slab_key: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[b"vault", slab_key.as_ref()], program_id)
    }
}

// 7. mod state
pub mod state {
    use bytemuck::{Pod, Zeroable};
    use core::cell::RefMut;
    use solana_program::account_info::AccountInfo;
    use solana_program::program_error::ProgramError;
    use crate::constants::{CONFIG_LEN, HEADER_LEN};

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct SlabHeader {
        pub magic: u64,
        pub version: u32,
        pub bump: u8,
        pub _padding: [u8; 3],
        pub admin: [u8; 32],
        pub _reserved: [u8; 16],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    pub struct PoolConfig {
        pub asset_mint: [u8; 32],
        pub vault_pubkey: [u8; 32],
        pub vault_authority_bump: u8,
        pub _padding: [u8; 7],
    }

    pub fn slab_data_mut<'a, 'b>(
        ai: &'b AccountInfo<'a>,
    ) -> Result<RefMut<'b, &'a mut [u8]>, ProgramError> {
        Ok(ai.try_borrow_mut_data()?)
    }

    pub fn read_header(data: &[u8]) -> SlabHeader {
        let mut h = SlabHeader::zeroed();
        let src = &data[..HEADER_LEN];
        let dst = bytemuck::bytes_of_mut(&mut h);
        dst.copy_from_slice(src);
        h
    }

    pub fn write_header(data: &mut [u8], h: &SlabHeader) {
        let src = bytemuck::bytes_of(h);
        let dst = &mut data[..HEADER_LEN];
        dst.copy_from_slice(src);
    }

    pub fn read_config(data: &[u8]) -> PoolConfig {
        let mut c = PoolConfig::zeroed();
        let src = &data[HEADER_LEN..HEADER_LEN + CONFIG_LEN];
        let dst = bytemuck::bytes_of_mut(&mut c);
        dst.copy_from_slice(src);
        c
    }

    pub fn write_config(data: &mut [u8], c: &PoolConfig) {
        let src = bytemuck::bytes_of(c);
        let dst = &mut data[HEADER_LEN..HEADER_LEN + CONFIG_LEN];
        dst.copy_from_slice(src);
    }
}

// 8. mod collateral
pub mod collateral {
    use solana_program::{account_info::AccountInfo, program_error::ProgramError};

    #[cfg(target_os = "solana")]
    use solana_program::program::{invoke, invoke_signed};

    #[cfg(not(target_os = "solana"))]
    use solana_program::program_pack::Pack;
    #[cfg(not(target_os = "solana"))]
    use spl_token::state::Account as TokenAccount;

    pub fn deposit<'a>(
        _token_program: &AccountInfo<'a>,
        source: &AccountInfo<'a>,
        dest: &AccountInfo<'a>,
        _authority: &AccountInfo<'a>,
        amount: u64,
    ) -> Result<(), ProgramError> {
        #[cfg(target_os = "solana")]
        {
            let ix = spl_token::instruction::transfer(
                _token_program.key,
                source.key,
                dest.key,
                _authority.key,
                &[],
                amount,
            )?;
            invoke(
                &ix,
                &[source.clone(), dest.clone(), _authority.clone(), _token_program.clone()],
            )
        }
        #[cfg(not(target_os = "solana"))]
        {
            let mut src_data = source.try_borrow_mut_data()?;
            let mut src_state = TokenAccount::unpack(&src_data)?;
            src_state.amount = src_state
                .amount
                .checked_sub(amount)
                .ok_or(ProgramError::InsufficientFunds)?;
            TokenAccount::pack(src_state, &mut src_data)?;

            let mut dst_data = dest.try_borrow_mut_data()?;
            let mut dst_state = TokenAccount::unpack(&dst_data)?;
            dst_state.amount = dst_state
                .amount
                .checked_add(amount)
                .ok_or(ProgramError::InvalidAccountData)?;
            TokenAccount::pack(dst_state, &mut dst_data)?;
            Ok(())
        }
    }

    pub fn withdraw<'a>(
        _token_program: &AccountInfo<'a>,
        source: &AccountInfo<'a>,
        dest: &AccountInfo<'a>,
        _authority: &AccountInfo<'a>,
        amount: u64,
        _signer_seeds: &[&[&[u8]]],
    ) -> Result<(), ProgramError> {
        #[cfg(target_os = "solana")]
        {
            let ix = spl_token::instruction::transfer(
                _token_program.key,
                source.key,
                dest.key,
                _authority.key,
                &[],
                amount,
            )?;
            invoke_signed(
                &ix,
                &[source.clone(), dest.clone(), _authority.clone(), _token_program.clone()],
                _signer_seeds,
            )
        }
        #[cfg(not(target_os = "solana"))]
        {
            let mut src_data = source.try_borrow_mut_data()?;
            let mut src_state = TokenAccount::unpack(&src_data)?;
            src_state.amount = src_state
                .amount
                .checked_sub(amount)
                .ok_or(ProgramError::InsufficientFunds)?;
            TokenAccount::pack(src_state, &mut src_data)?;

            let mut dst_data = dest.try_borrow_mut_data()?;
            let mut dst_state = TokenAccount::unpack(&dst_data)?;
            dst_state.amount = dst_state
                .amount
                .checked_add(amount)
                .ok_or(ProgramError::InvalidAccountData)?;
            TokenAccount::pack(dst_state, &mut dst_data)?;
            Ok(())
        }
    }
}

// 9. mod processor
pub mod processor {
    // msg! with format args expands to an unqualified format! call.
    use alloc::format;
    use solana_program::{
        account_info::AccountInfo,
        entrypoint::ProgramResult,
        msg,
        program_error::ProgramError,
        program_pack::Pack,
        pubkey::Pubkey,
        sysvar::{clock::Clock, Sysvar},
    };
    use crate::{
        accounts, collateral,
        constants::{MAGIC, SLAB_LEN, VERSION},
        engine::{PoolParams, VaultError},
        error::{map_vault_error, ReservoirError},
        ix::Instruction,
        state::{self, PoolConfig, SlabHeader},
        zc,
    };

    fn slab_guard(program_id: &Pubkey, slab: &AccountInfo, data: &[u8]) -> Result<(), ProgramError> {
        accounts::expect_owner(slab, program_id)?;
        if data.len() != SLAB_LEN {
            return Err(ReservoirError::InvalidSlabLen.into());
        }
        Ok(())
    }

    fn require_initialized(data: &[u8]) -> Result<(), ProgramError> {
        let h = state::read_header(data);
        if h.magic != MAGIC {
            return Err(ReservoirError::NotInitialized.into());
        }
        if h.version != VERSION {
            return Err(ReservoirError::InvalidVersion.into());
        }
        Ok(())
    }

    fn require_admin(data: &[u8], signer: &AccountInfo) -> Result<(), ProgramError> {
        let h = state::read_header(data);
        if h.admin != signer.key.to_bytes() {
            return Err(ReservoirError::Unauthorized.into());
        }
        Ok(())
    }

    fn unix_now(a_clock: &AccountInfo) -> Result<u64, ProgramError> {
        let clock = Clock::from_account_info(a_clock)?;
        Ok(clock.unix_timestamp.max(0) as u64)
    }

    fn verify_vault(
        a_vault: &AccountInfo,
        expected_owner: &Pubkey,
        expected_mint: &Pubkey,
        expected_pubkey: &Pubkey,
    ) -> Result<(), ProgramError> {
        if a_vault.key != expected_pubkey {
            return Err(ReservoirError::InvalidVaultAta.into());
        }
        if a_vault.owner != &spl_token::ID {
            return Err(ReservoirError::InvalidVaultAta.into());
        }
        if a_vault.data_len() != spl_token::state::Account::LEN {
            return Err(ReservoirError::InvalidVaultAta.into());
        }

        let data = a_vault.try_borrow_data()?;
        let tok = spl_token::state::Account::unpack(&data)?;
        if tok.mint != *expected_mint {
            return Err(ReservoirError::InvalidMint.into());
        }
        if tok.owner != *expected_owner {
            return Err(ReservoirError::InvalidVaultAta.into());
        }
        Ok(())
    }

    fn u64_amount(v: u128) -> Result<u64, ProgramError> {
        v.try_into().map_err(|_| ReservoirError::EngineOverflow.into())
    }

    pub fn process_instruction<'a, 'b>(
        program_id: &Pubkey,
        accounts: &'b [AccountInfo<'a>],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = Instruction::decode(instruction_data)?;

        match instruction {
            Instruction::InitPool {
                num_tiers,
                batch_interval,
                min_rebalance_gap_bps,
                performance_fee_bps,
                fee_recipient,
            } => {
                accounts::expect_len(accounts, 6)?;
                let a_admin = &accounts[0];
                let a_slab = &accounts[1];
                let a_mint = &accounts[2];
                let a_vault = &accounts[3];
                let a_clock = &accounts[5];

                accounts::expect_signer(a_admin)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;

                let header = state::read_header(&data);
                if header.magic == MAGIC {
                    return Err(ReservoirError::AlreadyInitialized.into());
                }

                let (auth, bump) = accounts::derive_vault_authority(program_id, a_slab.key);
                verify_vault(a_vault, &auth, a_mint.key, a_vault.key)?;

                let now = unix_now(a_clock)?;

                for b in data.iter_mut() {
                    *b = 0;
                }

                let engine = zc::engine_mut(&mut data)?;
                let params = PoolParams {
                    num_tiers: num_tiers as u64,
                    batch_interval,
                    min_rebalance_gap_bps: min_rebalance_gap_bps as u64,
                    performance_fee_bps: performance_fee_bps as u64,
                    fee_recipient: fee_recipient.to_bytes(),
                };
                engine.init(&params, now).map_err(map_vault_error)?;

                let config = PoolConfig {
                    asset_mint: a_mint.key.to_bytes(),
                    vault_pubkey: a_vault.key.to_bytes(),
                    vault_authority_bump: bump,
                    _padding: [0; 7],
                };
                state::write_config(&mut data, &config);

                let new_header = SlabHeader {
                    magic: MAGIC,
                    version: VERSION,
                    bump,
                    _padding: [0; 3],
                    admin: a_admin.key.to_bytes(),
                    _reserved: [0; 16],
                };
                state::write_header(&mut data, &new_header);
            }
            Instruction::VaultDeposit { tier, amount } => {
                accounts::expect_len(accounts, 6)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];
                let a_user_ata = &accounts[2];
                let a_vault = &accounts[3];
                let a_token = &accounts[4];
                let a_clock = &accounts[5];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                let config = state::read_config(&data);

                let (auth, _) = accounts::derive_vault_authority(program_id, a_slab.key);
                verify_vault(
                    a_vault,
                    &auth,
                    &Pubkey::new_from_array(config.asset_mint),
                    &Pubkey::new_from_array(config.vault_pubkey),
                )?;

                let now = unix_now(a_clock)?;
                let engine = zc::engine_mut(&mut data)?;

                collateral::deposit(a_token, a_user_ata, a_vault, a_user, amount)?;
                engine
                    .vault_deposit(tier as usize, &a_user.key.to_bytes(), amount as u128, now)
                    .map_err(map_vault_error)?;
            }
            Instruction::VaultRedeem { tier, shares } => {
                accounts::expect_len(accounts, 7)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];
                let a_vault = &accounts[2];
                let a_user_ata = &accounts[3];
                let a_vault_pda = &accounts[4];
                let a_token = &accounts[5];
                let a_clock = &accounts[6];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                let config = state::read_config(&data);

                let (derived_pda, _) = accounts::derive_vault_authority(program_id, a_slab.key);
                accounts::expect_key(a_vault_pda, &derived_pda)?;
                verify_vault(
                    a_vault,
                    &derived_pda,
                    &Pubkey::new_from_array(config.asset_mint),
                    &Pubkey::new_from_array(config.vault_pubkey),
                )?;

                let now = unix_now(a_clock)?;
                let engine = zc::engine_mut(&mut data)?;

                let assets = engine
                    .vault_redeem(tier as usize, &a_user.key.to_bytes(), shares, now)
                    .map_err(map_vault_error)?;
                let amount = u64_amount(assets)?;

                let seed1: &[u8] = b"vault";
                let seed2: &[u8] = a_slab.key.as_ref();
                let bump_arr: [u8; 1] = [config.vault_authority_bump];
                let seed3: &[u8] = &bump_arr;
                let seeds: [&[u8]; 3] = [seed1, seed2, seed3];
                let signer_seeds: [&[&[u8]]; 1] = [&seeds];

                collateral::withdraw(a_token, a_vault, a_user_ata, a_vault_pda, amount, &signer_seeds)?;
            }
            Instruction::AddStrategy { tier, venue, kind, apy_bps, maturity_ts } => {
                accounts::expect_len(accounts, 3)?;
                let a_admin = &accounts[0];
                let a_slab = &accounts[1];
                let a_clock = &accounts[2];

                accounts::expect_signer(a_admin)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                require_admin(&data, a_admin)?;

                let now = unix_now(a_clock)?;
                let engine = zc::engine_mut(&mut data)?;
                engine
                    .add_strategy(
                        tier as usize,
                        venue.to_bytes(),
                        kind,
                        apy_bps as u64,
                        maturity_ts,
                        now,
                    )
                    .map_err(map_vault_error)?;
            }
            Instruction::RemoveStrategy { tier, index } => {
                accounts::expect_len(accounts, 3)?;
                let a_admin = &accounts[0];
                let a_slab = &accounts[1];
                let a_clock = &accounts[2];

                accounts::expect_signer(a_admin)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                require_admin(&data, a_admin)?;

                let now = unix_now(a_clock)?;
                let engine = zc::engine_mut(&mut data)?;
                let freed = engine
                    .remove_strategy(tier as usize, index as usize, now)
                    .map_err(map_vault_error)?;
                msg!("strategy removed, freed {}", freed);
            }
            Instruction::Rebalance { tier } => {
                accounts::expect_len(accounts, 3)?;
                let a_caller = &accounts[0];
                let a_slab = &accounts[1];
                let a_clock = &accounts[2];

                accounts::expect_signer(a_caller)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;

                let now = unix_now(a_clock)?;
                let engine = zc::engine_mut(&mut data)?;
                let moved = engine.rebalance(tier as usize, now).map_err(map_vault_error)?;
                if moved {
                    msg!("rebalanced tier {}", tier);
                }
            }
            Instruction::Compound { tier } => {
                accounts::expect_len(accounts, 3)?;
                let a_caller = &accounts[0];
                let a_slab = &accounts[1];
                let a_clock = &accounts[2];

                accounts::expect_signer(a_caller)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;

                let now = unix_now(a_clock)?;
                let engine = zc::engine_mut(&mut data)?;
                let fee_shares = engine.compound(tier as usize, now).map_err(map_vault_error)?;
                if fee_shares > 0 {
                    msg!("compounded tier {}, fee shares {}", tier, fee_shares);
                }
            }
            Instruction::RouterDeposit { tier, amount } => {
                accounts::expect_len(accounts, 5)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];
                let a_user_ata = &accounts[2];
                let a_vault = &accounts[3];
                let a_token = &accounts[4];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                let config = state::read_config(&data);

                let (auth, _) = accounts::derive_vault_authority(program_id, a_slab.key);
                verify_vault(
                    a_vault,
                    &auth,
                    &Pubkey::new_from_array(config.asset_mint),
                    &Pubkey::new_from_array(config.vault_pubkey),
                )?;

                let engine = zc::engine_mut(&mut data)?;
                // Queue first so a full queue never strands tokens.
                engine
                    .router_deposit(tier as usize, &a_user.key.to_bytes(), amount)
                    .map_err(map_vault_error)?;
                collateral::deposit(a_token, a_user_ata, a_vault, a_user, amount)?;
            }
            Instruction::RouterWithdraw { tier, shares } => {
                accounts::expect_len(accounts, 2)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;

                let engine = zc::engine_mut(&mut data)?;
                engine
                    .router_withdraw(tier as usize, &a_user.key.to_bytes(), shares)
                    .map_err(map_vault_error)?;
            }
            Instruction::ExecuteBatchDeposits { tier } => {
                accounts::expect_len(accounts, 3)?;
                let a_caller = &accounts[0];
                let a_slab = &accounts[1];
                let a_clock = &accounts[2];

                accounts::expect_signer(a_caller)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;

                let now = unix_now(a_clock)?;
                let engine = zc::engine_mut(&mut data)?;
                let minted = engine
                    .execute_batch_deposits(tier as usize, now)
                    .map_err(map_vault_error)?;
                msg!("deposit batch settled, minted {}", minted);
            }
            Instruction::ExecuteBatchWithdraws { tier } => {
                accounts::expect_len(accounts, 3)?;
                let a_caller = &accounts[0];
                let a_slab = &accounts[1];
                let a_clock = &accounts[2];

                accounts::expect_signer(a_caller)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;

                let now = unix_now(a_clock)?;
                let engine = zc::engine_mut(&mut data)?;
                let assets = engine
                    .execute_batch_withdraws(tier as usize, now)
                    .map_err(map_vault_error)?;
                msg!("withdraw batch settled, released {}", assets);
            }
            Instruction::ClaimDepositShares { tier } => {
                accounts::expect_len(accounts, 2)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;

                let engine = zc::engine_mut(&mut data)?;
                engine
                    .claim_deposit_shares(tier as usize, &a_user.key.to_bytes())
                    .map_err(map_vault_error)?;
            }
            Instruction::ClaimWithdrawAssets { tier } => {
                accounts::expect_len(accounts, 6)?;
                let a_user = &accounts[0];
                let a_slab = &accounts[1];
                let a_vault = &accounts[2];
                let a_user_ata = &accounts[3];
                let a_vault_pda = &accounts[4];
                let a_token = &accounts[5];

                accounts::expect_signer(a_user)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                let config = state::read_config(&data);

                let (derived_pda, _) = accounts::derive_vault_authority(program_id, a_slab.key);
                accounts::expect_key(a_vault_pda, &derived_pda)?;
                verify_vault(
                    a_vault,
                    &derived_pda,
                    &Pubkey::new_from_array(config.asset_mint),
                    &Pubkey::new_from_array(config.vault_pubkey),
                )?;

                let engine = zc::engine_mut(&mut data)?;
                let assets = engine
                    .claim_withdraw_assets(tier as usize, &a_user.key.to_bytes())
                    .map_err(map_vault_error)?;
                if assets == 0 {
                    return Ok(());
                }
                let amount = u64_amount(assets)?;

                let seed1: &[u8] = b"vault";
                let seed2: &[u8] = a_slab.key.as_ref();
                let bump_arr: [u8; 1] = [config.vault_authority_bump];
                let seed3: &[u8] = &bump_arr;
                let seeds: [&[u8]; 3] = [seed1, seed2, seed3];
                let signer_seeds: [&[&[u8]]; 1] = [&seeds];

                collateral::withdraw(a_token, a_vault, a_user_ata, a_vault_pda, amount, &signer_seeds)?;
            }
            Instruction::SetVenueApy { tier, index, apy_bps } => {
                accounts::expect_len(accounts, 3)?;
                let a_admin = &accounts[0];
                let a_slab = &accounts[1];
                let a_clock = &accounts[2];

                accounts::expect_signer(a_admin)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                require_admin(&data, a_admin)?;

                let now = unix_now(a_clock)?;
                let engine = zc::engine_mut(&mut data)?;
                engine
                    .set_strategy_apy(tier as usize, index as usize, apy_bps as u64, now)
                    .map_err(map_vault_error)?;
            }
            Instruction::SetTierVault { tier, vault } => {
                accounts::expect_len(accounts, 2)?;
                let a_admin = &accounts[0];
                let a_slab = &accounts[1];

                accounts::expect_signer(a_admin)?;
                accounts::expect_writable(a_slab)?;

                let mut data = state::slab_data_mut(a_slab)?;
                slab_guard(program_id, a_slab, &data)?;
                require_initialized(&data)?;
                require_admin(&data, a_admin)?;

                let engine = zc::engine_mut(&mut data)?;
                engine
                    .set_tier_vault(tier as usize, vault as usize)
                    .map_err(map_vault_error)?;
            }
        }
        Ok(())
    }

    // Keeps the engine error type nameable from the program surface.
    pub fn custom_code(e: VaultError) -> u32 {
        match map_vault_error(e) {
            ProgramError::Custom(c) => c,
            _ => u32::MAX,
        }
    }
}

// 10. mod entrypoint
#[cfg(not(feature = "no-entrypoint"))]
pub mod entrypoint {
    use solana_program::{
        account_info::AccountInfo, entrypoint, entrypoint::ProgramResult, pubkey::Pubkey,
    };
    use crate::processor;

    entrypoint!(process_instruction);

    fn process_instruction<'a>(
        program_id: &Pubkey,
        accounts: &'a [AccountInfo<'a>],
        instruction_data: &[u8],
    ) -> ProgramResult {
        processor::process_instruction(program_id, accounts, instruction_data)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    extern crate alloc;
    use alloc::{vec, vec::Vec};
    use super::*;
    use solana_program::{
        account_info::AccountInfo, clock::Clock, program_pack::Pack, pubkey::Pubkey,
    };
    use spl_token::state::{Account as TokenAccount, AccountState};
    use crate::{
        constants::{MAGIC, SLAB_LEN, VERSION},
        engine::{VaultError, ROUTER_HOLDER},
        error::ReservoirError,
        processor::{custom_code, process_instruction},
        state, zc,
    };
    use solana_program::program_error::ProgramError;

    // --- Harness ---

    struct TestAccount {
        key: Pubkey,
        owner: Pubkey,
        lamports: u64,
        data: Vec<u8>,
        is_signer: bool,
        is_writable: bool,
    }

    impl TestAccount {
        fn new(key: Pubkey, owner: Pubkey, lamports: u64, data: Vec<u8>) -> Self {
            Self { key, owner, lamports, data, is_signer: false, is_writable: false }
        }
        fn signer(mut self) -> Self {
            self.is_signer = true;
            self
        }
        fn writable(mut self) -> Self {
            self.is_writable = true;
            self
        }

        fn to_info<'a>(&'a mut self) -> AccountInfo<'a> {
            AccountInfo::new(
                &self.key,
                self.is_signer,
                self.is_writable,
                &mut self.lamports,
                &mut self.data,
                &self.owner,
                false,
                0,
            )
        }
    }

    // --- Builders ---

    fn make_token_account(mint: Pubkey, owner: Pubkey, amount: u64) -> Vec<u8> {
        let mut data = vec![0u8; TokenAccount::LEN];
        let mut account = TokenAccount::default();
        account.mint = mint;
        account.owner = owner;
        account.amount = amount;
        account.state = AccountState::Initialized;
        TokenAccount::pack(account, &mut data).unwrap();
        data
    }

    fn make_clock(unix_timestamp: i64) -> Vec<u8> {
        let clock = Clock { unix_timestamp, ..Clock::default() };
        bincode::serialize(&clock).unwrap()
    }

    struct PoolFixture {
        program_id: Pubkey,
        admin: TestAccount,
        slab: TestAccount,
        mint: TestAccount,
        vault: TestAccount,
        token_prog: TestAccount,
        clock: TestAccount,
        fee_recipient: Pubkey,
        vault_pda: Pubkey,
    }

    fn setup_pool() -> PoolFixture {
        let program_id = Pubkey::new_unique();
        let slab_key = Pubkey::new_unique();
        let (vault_pda, _) =
            Pubkey::find_program_address(&[b"vault", slab_key.as_ref()], &program_id);
        let mint_key = Pubkey::new_unique();

        PoolFixture {
            program_id,
            admin: TestAccount::new(
                Pubkey::new_unique(),
                solana_program::system_program::id(),
                0,
                vec![],
            )
            .signer(),
            slab: TestAccount::new(slab_key, program_id, 0, vec![0u8; SLAB_LEN]).writable(),
            mint: TestAccount::new(mint_key, solana_program::system_program::id(), 0, vec![]),
            vault: TestAccount::new(
                Pubkey::new_unique(),
                spl_token::ID,
                0,
                make_token_account(mint_key, vault_pda, 0),
            )
            .writable(),
            token_prog: TestAccount::new(spl_token::ID, Pubkey::default(), 0, vec![]),
            clock: TestAccount::new(
                solana_program::sysvar::clock::id(),
                solana_program::sysvar::id(),
                0,
                make_clock(1_000),
            ),
            fee_recipient: Pubkey::new_unique(),
            vault_pda,
        }
    }

    fn warp(f: &mut PoolFixture, unix_timestamp: i64) {
        f.clock.data = make_clock(unix_timestamp);
    }

    // --- Encoders ---

    fn encode_u16(val: u16, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&val.to_le_bytes());
    }
    fn encode_u64(val: u64, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&val.to_le_bytes());
    }
    fn encode_u128(val: u128, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&val.to_le_bytes());
    }
    fn encode_pubkey(val: &Pubkey, buf: &mut Vec<u8>) {
        buf.extend_from_slice(val.as_ref());
    }

    fn encode_init_pool(f: &PoolFixture, num_tiers: u8, batch_interval: u64) -> Vec<u8> {
        let mut data = vec![0u8, num_tiers];
        encode_u64(batch_interval, &mut data);
        encode_u16(100, &mut data); // min_rebalance_gap_bps
        encode_u16(1_000, &mut data); // performance_fee_bps
        encode_pubkey(&f.fee_recipient, &mut data);
        data
    }

    fn encode_vault_deposit(tier: u8, amount: u64) -> Vec<u8> {
        let mut data = vec![1u8, tier];
        encode_u64(amount, &mut data);
        data
    }

    fn encode_vault_redeem(tier: u8, shares: u128) -> Vec<u8> {
        let mut data = vec![2u8, tier];
        encode_u128(shares, &mut data);
        data
    }

    fn encode_add_strategy(tier: u8, venue: &Pubkey, kind: u8, apy_bps: u16, maturity: u64) -> Vec<u8> {
        let mut data = vec![3u8, tier];
        encode_pubkey(venue, &mut data);
        data.push(kind);
        encode_u16(apy_bps, &mut data);
        encode_u64(maturity, &mut data);
        data
    }

    fn encode_router_deposit(tier: u8, amount: u64) -> Vec<u8> {
        let mut data = vec![7u8, tier];
        encode_u64(amount, &mut data);
        data
    }

    fn encode_execute_batch_deposits(tier: u8) -> Vec<u8> {
        vec![9u8, tier]
    }

    fn encode_claim_deposit_shares(tier: u8) -> Vec<u8> {
        vec![11u8, tier]
    }

    fn init_pool(f: &mut PoolFixture, num_tiers: u8, batch_interval: u64) {
        let data = encode_init_pool(f, num_tiers, batch_interval);
        let accs = vec![
            f.admin.to_info(),
            f.slab.to_info(),
            f.mint.to_info(),
            f.vault.to_info(),
            f.token_prog.to_info(),
            f.clock.to_info(),
        ];
        process_instruction(&f.program_id, &accs, &data).unwrap();
    }

    // --- Tests ---

    #[test]
    fn test_init_pool() {
        let mut f = setup_pool();
        init_pool(&mut f, 2, 3_600);

        let header = state::read_header(&f.slab.data);
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.version, VERSION);

        let engine = zc::engine_ref(&f.slab.data).unwrap();
        assert_eq!(engine.vault_count, 2);
        assert_eq!(engine.batch_interval(), 3_600);
        assert!(engine.check_conservation());
    }

    #[test]
    fn test_init_pool_rejects_foreign_vault() {
        let mut f = setup_pool();
        f.vault.owner = solana_program::system_program::id();
        let data = encode_init_pool(&f, 1, 3_600);
        let accs = vec![
            f.admin.to_info(),
            f.slab.to_info(),
            f.mint.to_info(),
            f.vault.to_info(),
            f.token_prog.to_info(),
            f.clock.to_info(),
        ];
        let res = process_instruction(&f.program_id, &accs, &data);
        assert_eq!(res, Err(ReservoirError::InvalidVaultAta.into()));
    }

    #[test]
    fn test_vault_deposit_and_redeem() {
        let mut f = setup_pool();
        init_pool(&mut f, 1, 3_600);

        let mut user = TestAccount::new(
            Pubkey::new_unique(),
            solana_program::system_program::id(),
            0,
            vec![],
        )
        .signer();
        let mut user_ata = TestAccount::new(
            Pubkey::new_unique(),
            spl_token::ID,
            0,
            make_token_account(f.mint.key, user.key, 1_000),
        )
        .writable();

        {
            let accs = vec![
                user.to_info(),
                f.slab.to_info(),
                user_ata.to_info(),
                f.vault.to_info(),
                f.token_prog.to_info(),
                f.clock.to_info(),
            ];
            process_instruction(&f.program_id, &accs, &encode_vault_deposit(0, 500)).unwrap();
        }

        {
            let engine = zc::engine_ref(&f.slab.data).unwrap();
            assert_eq!(engine.shares_of(0, &user.key.to_bytes()).unwrap(), 500);
            assert!(engine.check_conservation());
        }
        let vault_state = TokenAccount::unpack(&f.vault.data).unwrap();
        assert_eq!(vault_state.amount, 500);

        {
            let mut vault_pda = TestAccount::new(
                f.vault_pda,
                solana_program::system_program::id(),
                0,
                vec![],
            );
            let accs = vec![
                user.to_info(),
                f.slab.to_info(),
                f.vault.to_info(),
                user_ata.to_info(),
                vault_pda.to_info(),
                f.token_prog.to_info(),
                f.clock.to_info(),
            ];
            process_instruction(&f.program_id, &accs, &encode_vault_redeem(0, 200)).unwrap();
        }

        let vault_state = TokenAccount::unpack(&f.vault.data).unwrap();
        assert_eq!(vault_state.amount, 300);
        let user_state = TokenAccount::unpack(&user_ata.data).unwrap();
        assert_eq!(user_state.amount, 700);
    }

    #[test]
    fn test_add_strategy_requires_admin() {
        let mut f = setup_pool();
        init_pool(&mut f, 1, 3_600);

        let mut outsider = TestAccount::new(
            Pubkey::new_unique(),
            solana_program::system_program::id(),
            0,
            vec![],
        )
        .signer();
        let venue = Pubkey::new_unique();
        let accs = vec![outsider.to_info(), f.slab.to_info(), f.clock.to_info()];
        let res = process_instruction(
            &f.program_id,
            &accs,
            &encode_add_strategy(0, &venue, engine::VENUE_SIMPLE, 800, 0),
        );
        assert_eq!(res, Err(ReservoirError::Unauthorized.into()));
    }

    #[test]
    fn test_batch_deposit_flow() {
        let mut f = setup_pool();
        init_pool(&mut f, 1, 3_600);

        let mut user = TestAccount::new(
            Pubkey::new_unique(),
            solana_program::system_program::id(),
            0,
            vec![],
        )
        .signer();
        let mut user_ata = TestAccount::new(
            Pubkey::new_unique(),
            spl_token::ID,
            0,
            make_token_account(f.mint.key, user.key, 1_000),
        )
        .writable();

        {
            let accs = vec![
                user.to_info(),
                f.slab.to_info(),
                user_ata.to_info(),
                f.vault.to_info(),
                f.token_prog.to_info(),
            ];
            process_instruction(&f.program_id, &accs, &encode_router_deposit(0, 400)).unwrap();
        }
        {
            let engine = zc::engine_ref(&f.slab.data).unwrap();
            assert_eq!(engine.total_pending_deposits(0).unwrap(), 400);
        }

        // Too early for the batch window.
        {
            let accs = vec![user.to_info(), f.slab.to_info(), f.clock.to_info()];
            let res = process_instruction(&f.program_id, &accs, &encode_execute_batch_deposits(0));
            assert_eq!(
                res,
                Err(ProgramError::Custom(custom_code(VaultError::BatchNotReady)))
            );
        }

        warp(&mut f, 1_000 + 3_600);
        {
            let accs = vec![user.to_info(), f.slab.to_info(), f.clock.to_info()];
            process_instruction(&f.program_id, &accs, &encode_execute_batch_deposits(0)).unwrap();
        }
        {
            let engine = zc::engine_ref(&f.slab.data).unwrap();
            assert_eq!(engine.total_pending_deposits(0).unwrap(), 0);
            let (shares, _) = engine.claimable(0, &user.key.to_bytes()).unwrap();
            assert_eq!(shares, 400);
            assert_eq!(engine.shares_of(0, &ROUTER_HOLDER).unwrap(), 400);
        }

        {
            let accs = vec![user.to_info(), f.slab.to_info()];
            process_instruction(&f.program_id, &accs, &encode_claim_deposit_shares(0)).unwrap();
        }
        let engine = zc::engine_ref(&f.slab.data).unwrap();
        assert_eq!(engine.shares_of(0, &user.key.to_bytes()).unwrap(), 400);
        assert_eq!(engine.shares_of(0, &ROUTER_HOLDER).unwrap(), 0);
        assert!(engine.check_conservation());
    }

    #[test]
    fn test_slab_len_guard() {
        let mut f = setup_pool();
        f.slab.data = vec![0u8; SLAB_LEN - 1];
        let data = encode_init_pool(&f, 1, 3_600);
        let accs = vec![
            f.admin.to_info(),
            f.slab.to_info(),
            f.mint.to_info(),
            f.vault.to_info(),
            f.token_prog.to_info(),
            f.clock.to_info(),
        ];
        let res = process_instruction(&f.program_id, &accs, &data);
        assert_eq!(res, Err(ReservoirError::InvalidSlabLen.into()));
    }
}
