use crate::error::ApiError;
use crate::models::{SubscriptionTier, TokenLedger};
use chrono::{DateTime, Duration, Utc};
use elasticsearch::{Elasticsearch, GetParts, IndexParts};
use log::{info, warn};
use serde_json::{json, Value};
use tokio::sync::watch;

pub const TOKENS_INDEX: &str = "user_tokens";

pub const INITIAL_TOKENS: i64 = 3;
pub const DAILY_REFILL: i64 = 3;
pub const PRO_GRANT: i64 = 100;
pub const PREMIUM_GRANT: i64 = 300;

const SUBSCRIPTION_DAYS: i64 = 30;

pub fn new_ledger(user_id: &str, now: DateTime<Utc>) -> TokenLedger {
    TokenLedger {
        user_id: user_id.to_string(),
        tokens: INITIAL_TOKENS,
        subscription: SubscriptionTier::Free,
        last_daily_reset: now,
        subscription_expires_at: None,
        total_tokens_earned: INITIAL_TOKENS,
        total_tokens_used: 0,
    }
}

/// Lazy refill, evaluated on every read. Free accounts gain +3 (added, not
/// reset) once 24h have elapsed; every other tier only advances the reset
/// marker so a later downgrade cannot double-refill. Returns whether the
/// ledger changed and needs persisting.
pub fn apply_daily_refill(ledger: &mut TokenLedger, now: DateTime<Utc>) -> bool {
    if now - ledger.last_daily_reset < Duration::hours(24) {
        return false;
    }
    ledger.last_daily_reset = now;
    if ledger.subscription == SubscriptionTier::Free {
        ledger.tokens += DAILY_REFILL;
        ledger.total_tokens_earned += DAILY_REFILL;
    }
    true
}

/// Token cost of one summary. Lifetime accounts always pass without a
/// decrement; everyone else needs a positive balance.
pub fn apply_consume(ledger: &mut TokenLedger) -> bool {
    if ledger.subscription == SubscriptionTier::Lifetime {
        return true;
    }
    if ledger.tokens <= 0 {
        return false;
    }
    ledger.tokens -= 1;
    ledger.total_tokens_used += 1;
    true
}

pub fn grant_for_tier(tier: SubscriptionTier) -> i64 {
    match tier {
        SubscriptionTier::Pro => PRO_GRANT,
        SubscriptionTier::Premium => PREMIUM_GRANT,
        SubscriptionTier::Free | SubscriptionTier::Lifetime => 0,
    }
}

/// Purchase grants stack on top of the existing balance.
pub fn apply_purchase(ledger: &mut TokenLedger, tier: SubscriptionTier, now: DateTime<Utc>) {
    ledger.subscription = tier;
    ledger.subscription_expires_at = match tier {
        SubscriptionTier::Pro | SubscriptionTier::Premium => {
            Some(now + Duration::days(SUBSCRIPTION_DAYS))
        }
        SubscriptionTier::Free | SubscriptionTier::Lifetime => None,
    };
    let grant = grant_for_tier(tier);
    ledger.tokens += grant;
    ledger.total_tokens_earned += grant;
}

/// Cancellation reverts the tier to free. The remaining balance is kept
/// as-is; purchased tokens stay spendable under the free tier's rules.
pub fn apply_cancel(ledger: &mut TokenLedger) {
    ledger.subscription = SubscriptionTier::Free;
    ledger.subscription_expires_at = None;
}

async fn fetch_ledger(
    es_client: &Elasticsearch,
    user_id: &str,
) -> Result<Option<TokenLedger>, ApiError> {
    let response = es_client
        .get(GetParts::IndexId(TOKENS_INDEX, user_id))
        .send()
        .await?;

    if !response.status_code().is_success() {
        return Ok(None);
    }

    let payload: Value = response.json().await?;
    match payload.get("_source") {
        Some(source) => Ok(serde_json::from_value(source.clone()).ok()),
        None => Ok(None),
    }
}

async fn store_ledger(es_client: &Elasticsearch, ledger: &TokenLedger) -> Result<(), ApiError> {
    let response = es_client
        .index(IndexParts::IndexId(TOKENS_INDEX, &ledger.user_id))
        .body(json!(ledger))
        .send()
        .await?;

    if !response.status_code().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Provider(format!(
            "failed to store token ledger for {}: {body}",
            ledger.user_id
        )));
    }
    Ok(())
}

/// Fetch a user's ledger, creating it on first access. The document id is
/// the user id, so a racing double-create converges on the same initial
/// document instead of forking.
pub async fn get_or_create(
    es_client: &Elasticsearch,
    user_id: &str,
) -> Result<TokenLedger, ApiError> {
    match fetch_ledger(es_client, user_id).await? {
        Some(mut ledger) => {
            if apply_daily_refill(&mut ledger, Utc::now()) {
                store_ledger(es_client, &ledger).await?;
                info!(
                    "Daily refill processed for user {user_id} (balance now {})",
                    ledger.tokens
                );
            }
            Ok(ledger)
        }
        None => {
            let ledger = new_ledger(user_id, Utc::now());
            store_ledger(es_client, &ledger).await?;
            info!("Created token ledger for user {user_id}");
            Ok(ledger)
        }
    }
}

pub async fn can_consume(es_client: &Elasticsearch, user_id: &str) -> Result<bool, ApiError> {
    let ledger = get_or_create(es_client, user_id).await?;
    Ok(ledger.subscription == SubscriptionTier::Lifetime || ledger.tokens > 0)
}

pub async fn consume(es_client: &Elasticsearch, user_id: &str) -> Result<bool, ApiError> {
    let mut ledger = get_or_create(es_client, user_id).await?;
    let before = ledger.tokens;
    if !apply_consume(&mut ledger) {
        return Ok(false);
    }
    if ledger.tokens != before {
        store_ledger(es_client, &ledger).await?;
    }
    Ok(true)
}

pub async fn purchase(
    es_client: &Elasticsearch,
    user_id: &str,
    tier: SubscriptionTier,
) -> Result<TokenLedger, ApiError> {
    if tier == SubscriptionTier::Free {
        return Err(ApiError::Validation(
            "the free tier cannot be purchased".to_string(),
        ));
    }
    let mut ledger = get_or_create(es_client, user_id).await?;
    apply_purchase(&mut ledger, tier, Utc::now());
    store_ledger(es_client, &ledger).await?;
    info!("User {user_id} purchased {tier:?} (balance now {})", ledger.tokens);
    Ok(ledger)
}

pub async fn cancel(es_client: &Elasticsearch, user_id: &str) -> Result<TokenLedger, ApiError> {
    let mut ledger = get_or_create(es_client, user_id).await?;
    apply_cancel(&mut ledger);
    store_ledger(es_client, &ledger).await?;
    info!("User {user_id} cancelled their subscription");
    Ok(ledger)
}

/// Watch a user's ledger for changes. A background task polls the store
/// and publishes every changed snapshot; dropping all receivers stops it.
pub async fn subscribe(
    es_client: Elasticsearch,
    user_id: String,
    poll_interval: std::time::Duration,
) -> Result<watch::Receiver<TokenLedger>, ApiError> {
    let initial = get_or_create(&es_client, &user_id).await?;
    let (tx, rx) = watch::channel(initial);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.tick().await; // immediate first tick
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }
            match get_or_create(&es_client, &user_id).await {
                Ok(ledger) => {
                    tx.send_if_modified(|current| {
                        if *current != ledger {
                            *current = ledger;
                            true
                        } else {
                            false
                        }
                    });
                }
                Err(e) => warn!("Ledger poll for user {user_id} failed: {e:?}"),
            }
        }
    });

    Ok(rx)
}
