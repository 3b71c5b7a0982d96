//! Data transfer objects for the API

pub mod account;
pub mod billing;
pub mod common;

pub use account::{BalanceResponse, HistoryParams, TopupRequest};
pub use billing::{
    FinalizeRequest, FinalizeResponse, StartResponse, TerminateRequest, TerminateResponse,
};
pub use common::ApiResponse;
