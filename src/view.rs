//! Read-only views over the state machine: the paginated number grid,
//! participant search and dashboard counters.

use crate::models::TicketNumber;
use crate::state_manager::RaffleState;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Tickets per grid page
pub const PAGE_SIZE: u32 = 100;

/// Maximum tickets returned by a text search
pub const SEARCH_RESULT_LIMIT: usize = 100;

/// How a search query was interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberQuery {
    Page(u32),
    Ticket(u64),
    Text(String),
}

impl NumberQuery {
    pub fn parse(query: &str, page: u32) -> Self {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return NumberQuery::Page(page);
        }
        if query.chars().all(|c| c.is_ascii_digit()) {
            // Saturate absurdly long digit strings; they fail the range check anyway.
            return NumberQuery::Ticket(query.parse().unwrap_or(u64::MAX));
        }
        NumberQuery::Text(query)
    }
}

/// Tickets to show for a query, or for `page` when the query is blank
pub fn numbers_to_display(state: &RaffleState, query: &str, page: u32) -> Vec<TicketNumber> {
    let total = state.config().total_numbers;

    match NumberQuery::parse(query, page) {
        NumberQuery::Page(page) => {
            let start = u64::from(page) * u64::from(PAGE_SIZE);
            let end = (start + u64::from(PAGE_SIZE)).min(u64::from(total));
            (start..end)
                .map(|n| TicketNumber::new(n as u32))
                .collect()
        }
        NumberQuery::Ticket(n) if n < u64::from(total) => vec![TicketNumber::new(n as u32)],
        NumberQuery::Ticket(_) => Vec::new(),
        NumberQuery::Text(needle) => {
            let shared = state.shared();
            let found: BTreeSet<TicketNumber> = shared
                .participants()
                .filter(|p| p.matches(&needle))
                .flat_map(|p| shared.tickets_for_participant(&p.id).iter().copied())
                .collect();
            found.into_iter().take(SEARCH_RESULT_LIMIT).collect()
        }
    }
}

/// Number of grid pages for a pool of `total` tickets
pub fn page_count(total: u32) -> u32 {
    total.div_ceil(PAGE_SIZE)
}

/// Dashboard counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total: u32,
    pub sold: usize,
    pub reserved: usize,
    /// `sold × price_per_number`
    pub revenue: Decimal,
    /// Percent of the pool sold, 4 decimal places
    pub sold_percentage: Decimal,
    pub reserved_percentage: Decimal,
}

impl DashboardStats {
    pub fn from_state(state: &RaffleState) -> Self {
        let config = state.config();
        let sold = state.sold_count();
        let reserved = state.reservation_count();

        Self {
            total: config.total_numbers,
            sold,
            reserved,
            revenue: Decimal::from(sold as u64) * config.price_per_number,
            sold_percentage: percentage(sold, config.total_numbers),
            reserved_percentage: percentage(reserved, config.total_numbers),
        }
    }
}

fn percentage(count: usize, total: u32) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(count as u64) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CampaignConfig, Contact};

    fn t(n: u32) -> TicketNumber {
        TicketNumber::new(n)
    }

    fn populated() -> RaffleState {
        let config = CampaignConfig {
            max_entries_per_phone: 3,
            max_purchase_limit: 3,
            price_per_number: Decimal::new(250, 2),
            ..CampaignConfig::default()
        };
        let mut state = RaffleState::new(config);
        for n in [30, 10, 20] {
            state.reserve(t(n), 0).unwrap();
        }
        state
            .purchase(&[t(30), t(10)], &Contact::new("Ana Souza", "(11) 9999", "ana@x.com"), 0)
            .unwrap();
        state
            .purchase(&[t(20)], &Contact::new("Bruno", "21 8888", "bruno@y.com"), 0)
            .unwrap();
        state
    }

    #[test]
    fn test_blank_query_pages() {
        let state = populated();
        let page = numbers_to_display(&state, "  ", 2);
        assert_eq!(page.len(), 100);
        assert_eq!(page[0], t(200));
        assert_eq!(page[99], t(299));
    }

    #[test]
    fn test_last_page_is_clipped() {
        let state = RaffleState::new(CampaignConfig {
            total_numbers: 250,
            ..CampaignConfig::default()
        });
        assert_eq!(numbers_to_display(&state, "", 2).len(), 50);
        assert!(numbers_to_display(&state, "", 3).is_empty());
        assert_eq!(page_count(250), 3);
    }

    #[test]
    fn test_numeric_query() {
        let state = populated();
        assert_eq!(numbers_to_display(&state, "42", 0), vec![t(42)]);
        assert!(numbers_to_display(&state, "1000000", 0).is_empty());
        assert!(numbers_to_display(&state, "99999999999999999999999", 0).is_empty());
    }

    #[test]
    fn test_text_query_matches_sorted_and_deduplicated() {
        let state = populated();
        assert_eq!(numbers_to_display(&state, "ANA", 0), vec![t(10), t(30)]);
        assert_eq!(numbers_to_display(&state, "21 8888", 0), vec![t(20)]);
        assert_eq!(numbers_to_display(&state, "@", 0), vec![t(10), t(20), t(30)]);
        assert!(numbers_to_display(&state, "zoe", 0).is_empty());
    }

    #[test]
    fn test_digit_only_phone_fragment_is_ticket_lookup() {
        let state = populated();
        assert_eq!(numbers_to_display(&state, "8888", 0), vec![t(8888)]);
    }

    #[test]
    fn test_dashboard_stats() {
        let mut state = populated();
        state.reserve(t(1), 0).unwrap();
        let stats = DashboardStats::from_state(&state);
        assert_eq!(stats.sold, 3);
        assert_eq!(stats.reserved, 1);
        assert_eq!(stats.revenue, Decimal::new(750, 2));
        assert_eq!(stats.sold_percentage, Decimal::new(3, 4));
        assert_eq!(stats.reserved_percentage, Decimal::new(1, 4));
    }
}
