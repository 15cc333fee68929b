use crate::domain::order::{Order, OrderStatus, StatusHistoryEntry};
use crate::domain::ports::SharedOrderStore;
use crate::domain::transitions::TransitionTable;
use crate::error::{OrderError, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How many times a transition is re-validated after losing a
/// compare-and-set race before giving up.
const MAX_CONFLICT_RETRIES: usize = 3;

/// Validates and applies order status transitions.
///
/// The only path through which an order's status changes. Every applied
/// transition appends exactly one history row, atomically with the status
/// update.
pub struct OrderStateMachine {
    table: Arc<TransitionTable>,
    orders: SharedOrderStore,
}

impl OrderStateMachine {
    pub fn new(table: Arc<TransitionTable>, orders: SharedOrderStore) -> Self {
        Self { table, orders }
    }

    pub fn validate_transition(&self, current: OrderStatus, next: OrderStatus) -> Result<()> {
        self.table.validate(current, next)
    }

    /// Moves the order to `next`.
    ///
    /// A request for the status the order already has is validated like any
    /// other edge and rejected. Concurrent writers are detected by the
    /// store's compare-and-set; the loser re-reads and re-validates.
    pub async fn apply_transition(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        comment: Option<String>,
    ) -> Result<Order> {
        self.transition(order_id, next, comment, false).await
    }

    /// Like [`apply_transition`](Self::apply_transition), but an order that
    /// is already in `next` is returned unchanged. Used for gateway
    /// confirmations, which are retried.
    pub async fn ensure_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        comment: Option<String>,
    ) -> Result<Order> {
        self.transition(order_id, next, comment, true).await
    }

    async fn transition(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        comment: Option<String>,
        idempotent: bool,
    ) -> Result<Order> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let order = self
                .orders
                .find_by_id(order_id)
                .await?
                .ok_or_else(|| OrderError::order_not_found(order_id))?;

            if idempotent && order.status == next {
                debug!(order_id = %order_id, status = %next, "Order already in requested status");
                return Ok(order);
            }
            self.validate_transition(order.status, next)?;

            let entry = StatusHistoryEntry::new(order.status, next, comment.clone());
            match self
                .orders
                .update_status_and_append_history(order_id, order.status, entry)
                .await
            {
                Ok(updated) => {
                    info!(
                        order_id = %order_id,
                        from = %order.status,
                        to = %next,
                        "Order status changed"
                    );
                    return Ok(updated);
                }
                Err(OrderError::Conflict(_)) => {
                    warn!(order_id = %order_id, "Lost status update race, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(OrderError::Conflict(order_id))
    }
}
