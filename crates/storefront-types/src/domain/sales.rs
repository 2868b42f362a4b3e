use std::collections::BTreeMap;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use super::order::Order;

/// Sales figures for one calendar month, keyed `YYYY-MM`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthlySales {
    pub date: String,
    pub total_sales_cents: i64,
    pub order_count: u64,
}

/// Groups orders by the month they were placed, oldest month first.
pub fn monthly_sales(orders: &[Order]) -> Vec<MonthlySales> {
    let mut buckets: BTreeMap<(i32, u32), (i64, u64)> = BTreeMap::new();
    for order in orders {
        let key = (order.ordered_at.year(), order.ordered_at.month());
        let entry = buckets.entry(key).or_default();
        entry.0 = entry.0.saturating_add(order.total_cents);
        entry.1 += 1;
    }
    buckets
        .into_iter()
        .map(|((year, month), (total, count))| MonthlySales {
            date: format!("{year}-{month:02}"),
            total_sales_cents: total,
            order_count: count,
        })
        .collect()
}
