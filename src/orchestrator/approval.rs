use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

use crate::core::{Machine, PaymentDetails};

/// What a human is asked to authorize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub task_id: String,
    pub intent: String,
    pub machine: Machine,
    pub capability_id: String,
    pub details: PaymentDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteDecision {
    Approved,
    Denied { reason: String },
}

pub trait QuoteApprover: Send + Sync {
    fn review<'a>(
        &'a self,
        request: &'a QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<QuoteDecision>> + Send + 'a>>;
}

pub struct AutoDenyApprover {
    pub reason: String,
}

impl QuoteApprover for AutoDenyApprover {
    fn review<'a>(
        &'a self,
        _request: &'a QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<QuoteDecision>> + Send + 'a>> {
        Box::pin(async move {
            Ok(QuoteDecision::Denied {
                reason: self.reason.clone(),
            })
        })
    }
}

/// Approves every quote. Only for explicit `--yes` style consent.
pub struct AutoApprove;

impl QuoteApprover for AutoApprove {
    fn review<'a>(
        &'a self,
        request: &'a QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<QuoteDecision>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                task = %request.task_id,
                amount = %request.details.amount,
                "quote approved without prompting"
            );
            Ok(QuoteDecision::Approved)
        })
    }
}
