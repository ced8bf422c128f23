//! Market Data Types
//!
//! Core domain types for the two relay paths:
//!
//! - **Live path**: provider offer rows become [`Tick`]s.
//! - **History path**: a [`HistoryRequest`] becomes a provider snapshot whose
//!   rows are relayed as a [`HistorySegment`], correlated back to the caller
//!   through a [`PendingRequest`].

mod history;
mod tick;
mod timeframe;

pub use history::{
    FailureKind, HistoryPoint, HistoryRequest, HistorySegment, PendingRequest, PendingState,
    ProviderRequestId, RequestError, SNAPSHOT_PAGE_SIZE,
};
pub use tick::{OfferRow, Tick, normalize_pair};
pub use timeframe::Timeframe;
