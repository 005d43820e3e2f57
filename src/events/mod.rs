use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::TransactionType;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes an event for an already committed change. A closed channel
    /// is logged and otherwise ignored.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(err) = self.send(event).await {
            counter!("stockroom_events.dropped", 1, "event" => name);
            warn!(event = name, error = %err, "domain event dropped");
        }
    }
}

/// Domain events emitted after ledger writes commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ItemCreated {
        item_id: Uuid,
        owner_id: Uuid,
        quantity: i32,
    },
    ItemUpdated {
        item_id: Uuid,
        owner_id: Uuid,
    },
    ItemDeleted {
        item_id: Uuid,
        owner_id: Uuid,
    },
    StockMoved {
        item_id: Uuid,
        transaction_id: Uuid,
        transaction_type: TransactionType,
        quantity: i32,
        new_quantity: i32,
    },
    LowStockRaised {
        item_id: Uuid,
        alert_id: Uuid,
        quantity: i32,
        reorder_point: i32,
    },
    LowStockCleared {
        item_id: Uuid,
        quantity: i32,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ItemCreated { .. } => "item_created",
            Event::ItemUpdated { .. } => "item_updated",
            Event::ItemDeleted { .. } => "item_deleted",
            Event::StockMoved {
                transaction_type: TransactionType::StockIn,
                ..
            } => "stock_received",
            Event::StockMoved {
                transaction_type: TransactionType::StockOut,
                ..
            } => "stock_issued",
            Event::LowStockRaised { .. } => "low_stock_raised",
            Event::LowStockCleared { .. } => "low_stock_cleared",
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        let name = event.name();
        counter!("stockroom_events.processed", 1, "event" => name);

        match &event {
            Event::LowStockRaised {
                item_id,
                quantity,
                reorder_point,
                ..
            } => {
                warn!(
                    %item_id,
                    quantity,
                    reorder_point,
                    "item at or below reorder point"
                );
            }
            Event::StockMoved {
                item_id,
                transaction_type,
                quantity,
                new_quantity,
                ..
            } => {
                info!(
                    %item_id,
                    %transaction_type,
                    quantity,
                    new_quantity,
                    "stock moved"
                );
            }
            other => info!(event = name, payload = ?other, "domain event"),
        }
    }

    info!("Event processing loop stopped");
}
