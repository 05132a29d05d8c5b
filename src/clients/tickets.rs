use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Support ticket raised when a collected sample is rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportTicket {
    pub oms_order_id: String,
    pub subject: String,
    pub reason: String,
    pub oms_test_ids: Vec<String>,
}

#[async_trait]
pub trait TicketService: Send + Sync {
    async fn create_ticket(&self, ticket: SupportTicket) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct RecordingTicketService {
    tickets: Mutex<Vec<SupportTicket>>,
}

impl RecordingTicketService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tickets(&self) -> Vec<SupportTicket> {
        self.tickets.lock().clone()
    }
}

#[async_trait]
impl TicketService for RecordingTicketService {
    async fn create_ticket(&self, ticket: SupportTicket) -> Result<()> {
        self.tickets.lock().push(ticket);
        Ok(())
    }
}
