//! Subgraph Readers
//!
//! GraphQL lookups against the staking subgraph. Entity names differ per
//! pool (`stakingUser`, `haiBoldCurveLPStakingUser`, ...), so every query is
//! built from the pool's configured entity and aliased to a fixed response
//! key.

use async_trait::async_trait;
use eyre::{eyre, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace};

use crate::units::Wei;

// ============================================
// CONSTANTS
// ============================================

/// Timeout for subgraph calls
const SUBGRAPH_TIMEOUT_SECS: u64 = 10;

/// Max entities per page (graph-node hard limit)
const PAGE_SIZE: usize = 1000;

// ============================================
// TYPES
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Cancelled,
    Completed,
}

/// `pendingWithdrawal { amount timestamp status }` as reported upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWithdrawalRecord {
    pub amount: Wei,
    pub timestamp: u64,
    pub status: WithdrawalStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionKind {
    Stake,
    Withdraw,
    InitiateWithdrawal,
    CancelWithdrawal,
}

/// One row of a user's `stakingPositions` history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingPosition {
    pub amount: Wei,
    pub kind: PositionKind,
    pub timestamp: u64,
}

// ============================================
// RAW RESPONSE SHAPES
// ============================================

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    pending_withdrawal: Option<RawPendingWithdrawal>,
    #[serde(default)]
    staking_positions: Vec<RawPosition>,
}

#[derive(Debug, Deserialize)]
struct RawPendingWithdrawal {
    amount: String,
    timestamp: String,
    status: WithdrawalStatus,
}

#[derive(Debug, Deserialize)]
struct RawPosition {
    amount: String,
    #[serde(rename = "type")]
    kind: PositionKind,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStakedBalance {
    id: String,
    staked_balance: String,
}

impl RawPendingWithdrawal {
    fn into_record(self) -> Result<PendingWithdrawalRecord> {
        Ok(PendingWithdrawalRecord {
            amount: Wei::from_dec_str(&self.amount)?,
            timestamp: parse_timestamp(&self.timestamp)?,
            status: self.status,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|e| eyre!("invalid subgraph timestamp {:?}: {}", raw, e))
}

// ============================================
// CLIENT TRAIT
// ============================================

#[async_trait]
pub trait SubgraphClient: Send + Sync {
    /// `None` when the user entity does not exist or has no pending withdrawal
    async fn pending_withdrawal(
        &self,
        user_entity: &str,
        id: &str,
    ) -> Result<Option<PendingWithdrawalRecord>>;

    /// Lower-cased address -> staked balance (human decimal string)
    async fn staked_balances(&self, user_entity: &str) -> Result<HashMap<String, String>>;

    /// Newest first
    async fn staking_positions(&self, user_entity: &str, id: &str) -> Result<Vec<StakingPosition>>;
}

// ============================================
// HTTP IMPLEMENTATION
// ============================================

pub struct HttpSubgraphClient {
    http_client: Client,
    url: String,
}

impl HttpSubgraphClient {
    pub fn new(url: String) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(SUBGRAPH_TIMEOUT_SECS))
            .build()?;

        Ok(Self { http_client, url })
    }

    async fn query(&self, document: &str, variables: Value) -> Result<Value> {
        trace!("subgraph query: {}", document);

        let response: GraphQlResponse = self
            .http_client
            .post(&self.url)
            .json(&json!({ "query": document, "variables": variables }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
            let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
            return Err(eyre!("subgraph error: {}", messages.join("; ")));
        }

        response.data.ok_or_else(|| eyre!("subgraph returned no data"))
    }

    async fn user(&self, user_entity: &str, id: &str, selection: &str) -> Result<Option<RawUser>> {
        check_entity_name(user_entity)?;
        let document = format!(
            "query User($id: ID!) {{ user: {}(id: $id) {{ {} }} }}",
            user_entity, selection
        );

        let data = self.query(&document, json!({ "id": id })).await?;
        match data.get("user") {
            None | Some(Value::Null) => Ok(None),
            Some(user) => Ok(Some(serde_json::from_value(user.clone())?)),
        }
    }
}

#[async_trait]
impl SubgraphClient for HttpSubgraphClient {
    async fn pending_withdrawal(
        &self,
        user_entity: &str,
        id: &str,
    ) -> Result<Option<PendingWithdrawalRecord>> {
        let user = self
            .user(user_entity, id, "pendingWithdrawal { amount timestamp status }")
            .await?;

        user.and_then(|u| u.pending_withdrawal)
            .map(RawPendingWithdrawal::into_record)
            .transpose()
    }

    async fn staked_balances(&self, user_entity: &str) -> Result<HashMap<String, String>> {
        check_entity_name(user_entity)?;
        let document = format!(
            "query Users($first: Int!, $last: ID!) {{ users: {}s(first: $first, orderBy: id, orderDirection: asc, where: {{ id_gt: $last }}) {{ id stakedBalance }} }}",
            user_entity
        );

        let balances = collect_staked_balances(|last| {
            let document = &document;
            async move {
                let data = self
                    .query(document, json!({ "first": PAGE_SIZE, "last": last }))
                    .await?;
                let rows: Vec<RawStakedBalance> = match data.get("users") {
                    Some(users) => serde_json::from_value(users.clone())?,
                    None => Vec::new(),
                };
                Ok::<_, eyre::Report>(rows)
            }
        })
        .await?;

        debug!("Fetched {} staked balances from {}s", balances.len(), user_entity);
        Ok(balances)
    }

    async fn staking_positions(&self, user_entity: &str, id: &str) -> Result<Vec<StakingPosition>> {
        let user = self
            .user(
                user_entity,
                id,
                "stakingPositions(orderBy: timestamp, orderDirection: desc) { amount type timestamp }",
            )
            .await?;

        user.map(|u| u.staking_positions)
            .unwrap_or_default()
            .into_iter()
            .map(|p| {
                Ok(StakingPosition {
                    amount: Wei::from_dec_str(&p.amount)?,
                    kind: p.kind,
                    timestamp: parse_timestamp(&p.timestamp)?,
                })
            })
            .collect()
    }
}

/// Walk an id-ordered entity list page by page. `fetch_page` receives the
/// last id seen (empty for the first page) and returns the next rows.
async fn collect_staked_balances<F, Fut>(mut fetch_page: F) -> Result<HashMap<String, String>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<RawStakedBalance>>>,
{
    let mut balances = HashMap::new();
    let mut last = String::new();

    loop {
        let rows = fetch_page(last.clone()).await?;
        let fetched = rows.len();

        let cursor = match rows.last() {
            Some(row) => row.id.clone(),
            None => break,
        };
        for row in rows {
            // Composite ids carry the address first
            let address = row.id.split('-').next().unwrap_or_default().to_lowercase();
            balances.insert(address, row.staked_balance);
        }

        if fetched < PAGE_SIZE || cursor <= last {
            break;
        }
        last = cursor;
    }

    Ok(balances)
}

/// Entity names are interpolated into the document, so they must be plain
/// GraphQL identifiers
fn check_entity_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(eyre!("invalid subgraph entity name: {:?}", name))
    }
}
