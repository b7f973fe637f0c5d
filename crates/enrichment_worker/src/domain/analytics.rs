use common::domain::{AnalyticsTotals, CategorySummary, Transaction, TransactionAnalytics};
use std::collections::BTreeMap;

const UNCATEGORISED: &str = "uncategorised";

/// Compute the per-category analytics document for a transaction.
///
/// Pure function of the transaction row: no clock reads, no randomness,
/// and category summaries emitted in lexicographic order, so the same
/// transaction always produces the same analytics value. Persist-time
/// timestamps are stamped by the document store, not here.
pub fn build_analytics(transaction: &Transaction) -> TransactionAnalytics {
    let mut categories: BTreeMap<String, CategorySummary> = BTreeMap::new();

    for item in &transaction.items {
        let category = item
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(UNCATEGORISED)
            .to_string();

        let revenue = (item.unit_price * rust_decimal::Decimal::from(item.quantity)).round_dp(2);

        let summary = categories
            .entry(category.clone())
            .or_insert_with(|| CategorySummary {
                category,
                revenue: rust_decimal::Decimal::ZERO,
                quantity: 0,
            });
        summary.revenue += revenue;
        summary.quantity += item.quantity;
    }

    let items = transaction.items.iter().map(|item| item.quantity).sum();

    TransactionAnalytics {
        transaction_id: transaction.id,
        customer_id: transaction.customer_id,
        created_at: transaction.created_at,
        currency: transaction.currency.clone(),
        totals: AnalyticsTotals {
            subtotal: transaction.subtotal.round_dp(2),
            tax: transaction.tax.round_dp(2),
            discount: transaction.discount.round_dp(2),
            total: transaction.total.round_dp(2),
            items,
        },
        category_breakdown: categories.into_values().collect(),
    }
}
