use crate::model::company::PayRules;
use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use std::time::Duration;
use tracing::{debug, info};

/// company id => effective pay rules
pub static PAY_RULES_CACHE: Lazy<Cache<u64, PayRules>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(10_000)
        .time_to_live(Duration::from_secs(3600))
        .build()
});

/// Pay rules of a company, loading them on a miss.
/// `None` when the company does not exist.
pub async fn get_or_load(pool: &MySqlPool, com_id: u64) -> Result<Option<PayRules>, sqlx::Error> {
    if let Some(rules) = PAY_RULES_CACHE.get(&com_id).await {
        return Ok(Some(rules));
    }

    let row = sqlx::query_as::<_, (Decimal, Decimal, Decimal)>(
        "SELECT basic, hrent, medical FROM companies WHERE id = ?",
    )
    .bind(com_id)
    .fetch_optional(pool)
    .await?;

    let Some((basic, hrent, medical)) = row else {
        return Ok(None);
    };

    let rules = PayRules::new(basic, hrent, medical);
    PAY_RULES_CACHE.insert(com_id, rules).await;
    debug!(com_id, "Pay rules cached");

    Ok(Some(rules))
}

/// Drop a company's rules after its rates changed or it was deleted.
pub async fn invalidate(com_id: u64) {
    PAY_RULES_CACHE.invalidate(&com_id).await;
}

/// Load the pay rules of every active company
pub async fn warmup_pay_rules_cache(pool: &MySqlPool) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (u64, Decimal, Decimal, Decimal)>(
        r#"
        SELECT id, basic, hrent, medical
        FROM companies
        WHERE is_inactive = FALSE
        "#,
    )
    .fetch(pool);

    let mut total = 0usize;
    while let Some(row) = stream.next().await {
        let (id, basic, hrent, medical) = row?;
        PAY_RULES_CACHE
            .insert(id, PayRules::new(basic, hrent, medical))
            .await;
        total += 1;
    }

    info!(companies = total, "Pay rules cache warmup complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[actix_web::test]
    async fn invalidate_removes_entry() {
        let rules = PayRules::new(dec!(60), dec!(20), dec!(10));
        PAY_RULES_CACHE.insert(9_001, rules).await;
        assert_eq!(PAY_RULES_CACHE.get(&9_001).await, Some(rules));

        invalidate(9_001).await;
        assert_eq!(PAY_RULES_CACHE.get(&9_001).await, None);
    }
}
