pub mod gateway;
pub mod policy;
pub mod rpc;
pub mod wallet;

pub use gateway::{
    Execution, ExecutionOutcome, GatewayPhase, PaymentGateway, PaymentMode, parse_payment_details,
};
pub use policy::{
    Clock, ManualClock, SpendPolicy, SpendPolicyState, SpendReservation, SystemClock,
};
pub use rpc::JsonRpcClient;
pub use wallet::{BalanceSource, ConfirmationWatcher, NoWallet, PaymentSigner, RpcWallet};
