//! Account materialisation: a baseline balance plus an append-only list of
//! transactions merged into it as they stream in.
//!
//! Records for one account are assumed to arrive in order (baseline before
//! its transactions); a transaction for an account with no baseline yet is
//! logged and dropped rather than inventing a zero baseline.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::sink::MapSink;

/// The opening state of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBaseline {
    pub owner: String,
    /// Date of the last amendment, advanced by each applied transaction.
    pub when: NaiveDate,
    pub balance: Decimal,
}

impl AccountBaseline {
    /// Parse the wire form `id,owner,date,balance` -> (id, baseline),
    /// e.g. `"1,Neil,2018-01-01,100.00"`.
    pub fn parse(line: &str) -> Result<(String, Self)> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(anyhow!("account baseline needs 4 fields: {line:?}"));
        }
        Ok((
            fields[0].to_string(),
            Self {
                owner: fields[1].to_string(),
                when: fields[2]
                    .parse()
                    .with_context(|| format!("bad date in baseline {line:?}"))?,
                balance: fields[3]
                    .parse()
                    .map_err(|e| anyhow!("bad balance in baseline {line:?}: {e}"))?,
            },
        ))
    }
}

/// One movement on an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountTransaction {
    pub when: NaiveDate,
    pub amount: Decimal,
    /// Debits subtract from the balance, credits add.
    pub debit: bool,
}

impl AccountTransaction {
    /// Parse the wire form `id,date,amount,debit|credit` -> (id, transaction),
    /// e.g. `"1,2018-02-01,25.00,debit"`.
    pub fn parse(line: &str) -> Result<(String, Self)> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(anyhow!("account transaction needs 4 fields: {line:?}"));
        }
        let debit = match fields[3] {
            "debit" => true,
            "credit" => false,
            other => return Err(anyhow!("bad transaction kind {other:?} in {line:?}")),
        };
        Ok((
            fields[0].to_string(),
            Self {
                when: fields[1]
                    .parse()
                    .with_context(|| format!("bad date in transaction {line:?}"))?,
                amount: fields[2]
                    .parse()
                    .map_err(|e| anyhow!("bad amount in transaction {line:?}: {e}"))?,
                debit,
            },
        ))
    }
}

/// An account as materialised: the (amended) baseline plus every
/// transaction applied so far, newest last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub baseline: AccountBaseline,
    pub transactions: Vec<AccountTransaction>,
}

impl AccountEntry {
    pub fn new(baseline: AccountBaseline) -> Self {
        Self {
            baseline,
            transactions: Vec::new(),
        }
    }

    /// Append one transaction: adjust the balance, advance the amendment
    /// date, keep the transaction for the record.
    pub fn apply(&mut self, transaction: AccountTransaction) {
        self.baseline.when = transaction.when;
        if transaction.debit {
            self.baseline.balance -= transaction.amount;
        } else {
            self.baseline.balance += transaction.amount;
        }
        self.transactions.push(transaction);
    }
}

/// The account map plus its merge rules.
#[derive(Debug, Clone)]
pub struct AccountLedger {
    accounts: MapSink<String, AccountEntry>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self {
            accounts: MapSink::new("account"),
        }
    }

    /// A baseline record replaces whatever was there, transactions included.
    pub fn upsert_baseline(&self, id: String, baseline: AccountBaseline) {
        self.accounts.put(id, AccountEntry::new(baseline));
    }

    /// Merge one transaction into the account's entry. A transaction for an
    /// account with no baseline is logged and dropped.
    pub fn apply_transaction(&self, id: &str, transaction: AccountTransaction) {
        let applied = self
            .accounts
            .update_if_present(&id.to_string(), |entry| entry.apply(transaction));
        if !applied {
            tracing::warn!(id, "transaction for unknown account dropped");
        }
    }

    pub fn get(&self, id: &str) -> Option<AccountEntry> {
        self.accounts.get(&id.to_string())
    }
}

impl Default for AccountLedger {
    fn default() -> Self {
        Self::new()
    }
}
