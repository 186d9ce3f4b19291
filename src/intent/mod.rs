//! Intent classification.
//!
//! The orchestrator consumes any `IntentParser`. A keyword parser is always
//! available; a remote parser endpoint can be configured in front of it.

pub mod keyword;
pub mod remote;

pub use keyword::KeywordIntentParser;
pub use remote::RemoteIntentParser;

use std::future::Future;
use std::pin::Pin;

use crate::core::ParsedIntent;
use crate::error::Result;

pub trait IntentParser: Send + Sync {
    fn parse<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ParsedIntent>> + Send + 'a>>;
}
