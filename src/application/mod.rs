//! Application layer orchestrating the order lifecycle.
//!
//! [`Services`] wires the state machine, the payment ledger and the gateway
//! reconciler on top of whichever storage adapters the caller provides.

pub mod ledger;
pub mod locks;
pub mod reconciler;
pub mod redactor;
pub mod state_machine;

use crate::domain::ports::{SharedOrderStore, SharedPaymentStore, SharedSettingsStore};
use crate::domain::transitions::TransitionTable;
use ledger::PaymentLedger;
use locks::OrderLocks;
use reconciler::{GatewayContext, GatewayReconciler};
use state_machine::OrderStateMachine;
use std::sync::Arc;

#[derive(Clone)]
pub struct Services {
    pub orders: SharedOrderStore,
    pub ledger: PaymentLedger,
    pub state_machine: Arc<OrderStateMachine>,
    pub reconciler: Arc<GatewayReconciler>,
}

impl Services {
    pub fn new(
        orders: SharedOrderStore,
        payments: SharedPaymentStore,
        settings: SharedSettingsStore,
        strict: bool,
    ) -> Self {
        let table = Arc::new(TransitionTable::standard());
        let state_machine = Arc::new(OrderStateMachine::new(table, orders.clone()));
        let ledger = PaymentLedger::new(payments);
        let reconciler = Arc::new(GatewayReconciler::new(GatewayContext {
            orders: orders.clone(),
            ledger: ledger.clone(),
            state_machine: state_machine.clone(),
            settings,
            locks: OrderLocks::new(),
            strict,
        }));

        Self {
            orders,
            ledger,
            state_machine,
            reconciler,
        }
    }
}
