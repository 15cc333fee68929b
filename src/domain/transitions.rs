use super::order::OrderStatus;
use crate::error::{OrderError, Result};
use std::collections::{HashMap, HashSet};

/// Immutable adjacency structure of the order status graph.
///
/// Built once at startup and shared (`Arc<TransitionTable>`) with the
/// state machine. A pair is legal only if it appears here.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    edges: HashMap<OrderStatus, HashSet<OrderStatus>>,
}

impl TransitionTable {
    pub fn new(edges: impl IntoIterator<Item = (OrderStatus, Vec<OrderStatus>)>) -> Self {
        Self {
            edges: edges
                .into_iter()
                .map(|(from, to)| (from, to.into_iter().collect()))
                .collect(),
        }
    }

    /// The storefront order lifecycle, including the legacy `PENDING` and
    /// `CONFIRMED` aliases.
    pub fn standard() -> Self {
        use OrderStatus::*;
        Self::new([
            (Draft, vec![PendingPayment, Cancelled]),
            (PendingPayment, vec![Paid, Cancelled]),
            (Paid, vec![Processing, Cancelled, Refunded]),
            (Processing, vec![Ready, Shipped, Cancelled, Refunded]),
            (Ready, vec![Shipped, Delivered, Cancelled]),
            (Shipped, vec![Delivered, Cancelled]),
            (Delivered, vec![Refunded]),
            (Cancelled, vec![]),
            (Refunded, vec![]),
            (Pending, vec![PendingPayment, Cancelled]),
            (Confirmed, vec![Processing, Cancelled]),
        ])
    }

    pub fn is_allowed(&self, from: OrderStatus, to: OrderStatus) -> bool {
        self.edges.get(&from).is_some_and(|next| next.contains(&to))
    }

    pub fn validate(&self, from: OrderStatus, to: OrderStatus) -> Result<()> {
        if self.is_allowed(from, to) {
            Ok(())
        } else {
            Err(OrderError::IllegalTransition { from, to })
        }
    }

    pub fn allowed_from(&self, from: OrderStatus) -> impl Iterator<Item = OrderStatus> + '_ {
        self.edges.get(&from).into_iter().flatten().copied()
    }

    pub fn is_terminal(&self, status: OrderStatus) -> bool {
        self.allowed_from(status).next().is_none()
    }
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::standard()
    }
}
