use console::style;
use std::future::Future;
use std::io::IsTerminal;
use std::pin::Pin;
use tollgate::orchestrator::{QuoteApprover, QuoteDecision, QuoteRequest};

/// Asks on the terminal before paying a quote.
pub struct TerminalApprover;

impl TerminalApprover {
    fn prompt(request: &QuoteRequest) -> anyhow::Result<QuoteDecision> {
        if !std::io::stdin().is_terminal() {
            return Ok(QuoteDecision::Denied {
                reason: "no terminal to confirm payment (use --yes)".into(),
            });
        }
        print_quote(request);
        let approved = dialoguer::Confirm::new()
            .with_prompt("  Authorize this payment?")
            .default(false)
            .interact()?;
        Ok(if approved {
            QuoteDecision::Approved
        } else {
            QuoteDecision::Denied {
                reason: "declined at prompt".into(),
            }
        })
    }
}

impl QuoteApprover for TerminalApprover {
    fn review<'a>(
        &'a self,
        request: &'a QuoteRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<QuoteDecision>> + Send + 'a>> {
        let request = request.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || Self::prompt(&request)).await?
        })
    }
}

pub fn print_quote(request: &QuoteRequest) {
    let details = &request.details;
    println!();
    println!("  {}", style("Payment required").yellow().bold());
    println!(
        "  {} {} {}",
        style("Amount:").dim(),
        style(details.amount).bold(),
        details.token_symbol
    );
    println!(
        "  {} {} ({})",
        style("Machine:").dim(),
        request.machine.display_name,
        request.capability_id
    );
    println!(
        "  {} {} on {} ({})",
        style("Recipient:").dim(),
        details.recipient_address,
        details.chain_name,
        details.chain_id
    );
    if !details.description.is_empty() {
        println!("  {} {}", style("For:").dim(), details.description);
    }
    println!();
}
